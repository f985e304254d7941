use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

use ffmpeg_next::format::context::Input;
use ffmpeg_next::format::stream::Disposition;
use ffmpeg_next::media::Type;
use ffmpeg_next::{Packet, Rational};

use crate::configuration::SeekMode;
use crate::error::StillframeError;
use crate::ffmpeg::FfmpegDecoderSession;
use crate::source::{Sample, SampleSource, SeekHint};

/// Reads the packets of a file's best video stream as [`Sample`]s.
pub struct FfmpegSampleSource {
    input: Input,
    path: PathBuf,
    stream_index: usize,
    time_base: Rational,
}

impl Debug for FfmpegSampleSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegSampleSource")
            .field("path", &self.path)
            .field("stream_index", &self.stream_index)
            .field("time_base", &self.time_base)
            .finish()
    }
}

impl FfmpegSampleSource {
    /// Open `path` and select its video stream.
    ///
    /// # Errors
    ///
    /// [`StillframeError::SourceError`] if the file cannot be opened,
    /// [`StillframeError::UnsupportedFormat`] if it has no video stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StillframeError> {
        let path = path.as_ref().to_path_buf();
        super::initialise()?;

        let input = ffmpeg_next::format::input(&path).map_err(|error| {
            StillframeError::SourceError(format!("cannot open {}: {error}", path.display()))
        })?;
        let (stream_index, time_base) = input
            .streams()
            .filter(|stream| stream.parameters().medium() == Type::Video)
            .find(|stream| !stream.disposition().contains(Disposition::ATTACHED_PIC))
            .map(|stream| (stream.index(), stream.time_base()))
            .ok_or_else(|| {
                StillframeError::UnsupportedFormat(format!(
                    "{} has no video stream",
                    path.display()
                ))
            })?;

        log::debug!(
            "Reading samples of stream {stream_index} from {}",
            path.display()
        );
        Ok(Self {
            input,
            path,
            stream_index,
            time_base,
        })
    }

    /// Index of the stream being read.
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// A decoder session for this source's stream.
    ///
    /// # Errors
    ///
    /// [`StillframeError::SourceError`] if the stream disappeared, FFmpeg
    /// errors if its codec parameters are unusable.
    pub fn decoder_session(&self) -> Result<FfmpegDecoderSession, StillframeError> {
        let stream = self.input.stream(self.stream_index).ok_or_else(|| {
            StillframeError::SourceError(format!("stream {} is gone", self.stream_index))
        })?;
        FfmpegDecoderSession::from_parameters(stream.parameters())
    }
}

impl SampleSource for FfmpegSampleSource {
    fn seek(&mut self, hint: SeekHint) -> Result<(), StillframeError> {
        let timestamp = hint.time_us;
        if timestamp <= 0 {
            return Ok(());
        }

        // Timestamps are in AV_TIME_BASE units, i.e. microseconds.
        let result = match hint.mode {
            SeekMode::PreviousSync | SeekMode::Closest => self.input.seek(timestamp, ..=timestamp),
            SeekMode::NextSync => self.input.seek(timestamp, timestamp..),
            SeekMode::ClosestSync => self.input.seek(timestamp, ..),
        };
        result.map_err(|error| {
            StillframeError::SourceError(format!(
                "seek to {timestamp}us in {} failed: {error}",
                self.path.display()
            ))
        })
    }

    fn next_sample(&mut self) -> Result<Option<Sample>, StillframeError> {
        loop {
            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(error) => {
                    return Err(StillframeError::SourceError(format!(
                        "reading {} failed: {error}",
                        self.path.display()
                    )));
                }
            }
            if packet.stream() != self.stream_index {
                continue;
            }

            let pts = packet.pts().or(packet.dts()).unwrap_or(0);
            let duration = packet.duration();
            return Ok(Some(Sample {
                data: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
                pts_us: super::to_micros(pts, self.time_base),
                duration_us: (duration > 0).then(|| super::to_micros(duration, self.time_base)),
                is_sync: packet.is_key(),
            }));
        }
    }
}
