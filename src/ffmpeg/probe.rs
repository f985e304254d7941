use std::path::Path;
use std::time::Duration;

use ffmpeg_next::codec::Id;
use ffmpeg_next::format::stream::Disposition;
use ffmpeg_next::media::Type;

use crate::error::StillframeError;
use crate::track::{CodecId, EmbeddedThumbnail, Rotation, TrackDescriptor};

/// Container formats whose video stream is a single still picture.
const IMAGE_DEMUXERS: &[&str] = &["image2", "png_pipe", "jpeg_pipe", "webp_pipe", "bmp_pipe"];

/// Describe the best video stream of a file.
///
/// Still-image containers produce an image track; everything else a video
/// track. Cover art stored as an attached picture becomes the embedded
/// thumbnail.
///
/// # Errors
///
/// [`StillframeError::SourceError`] if the file cannot be opened,
/// [`StillframeError::UnsupportedFormat`] if it has no video stream.
///
/// # Example
///
/// ```no_run
/// let track = stillframe::ffmpeg::probe_track("input.mp4")?;
/// println!("{} {}x{}", track.codec, track.width, track.height);
/// # Ok::<(), stillframe::StillframeError>(())
/// ```
pub fn probe_track<P: AsRef<Path>>(path: P) -> Result<TrackDescriptor, StillframeError> {
    let path = path.as_ref();
    super::initialise()?;
    log::debug!("Probing {}", path.display());

    let mut input = ffmpeg_next::format::input(&path).map_err(|error| {
        StillframeError::SourceError(format!("cannot open {}: {error}", path.display()))
    })?;

    let stream = input
        .streams()
        .filter(|stream| stream.parameters().medium() == Type::Video)
        .find(|stream| !stream.disposition().contains(Disposition::ATTACHED_PIC))
        .ok_or_else(|| {
            StillframeError::UnsupportedFormat(format!("{} has no video stream", path.display()))
        })?;

    let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?
        .decoder()
        .video()?;
    let (width, height) = (decoder.width(), decoder.height());
    let codec = codec_id(stream.parameters().id());

    let frame_rate = stream.avg_frame_rate();
    let frames_per_second = if frame_rate.denominator() != 0 && frame_rate.numerator() > 0 {
        Some(f64::from(frame_rate.numerator()) / f64::from(frame_rate.denominator()))
    } else {
        None
    };

    let rotation = match stream.metadata().get("rotate").map(str::parse::<i32>) {
        Some(Ok(degrees)) => Rotation::from_degrees(degrees).unwrap_or_else(|error| {
            log::warn!("Ignoring rotation tag: {error}");
            Rotation::None
        }),
        _ => Rotation::None,
    };

    let duration_us = input.duration();
    let is_image = IMAGE_DEMUXERS.contains(&input.format().name());

    let mut track = if is_image {
        TrackDescriptor::image(codec, width, height)
    } else {
        TrackDescriptor::video(codec, width, height)
    }
    .with_rotation(rotation);
    if duration_us > 0 {
        track = track.with_duration(Duration::from_micros(duration_us as u64));
    }
    if let Some(rate) = frames_per_second {
        track = track.with_frame_rate(rate);
    }

    let cover_index = input
        .streams()
        .find(|stream| stream.disposition().contains(Disposition::ATTACHED_PIC))
        .map(|stream| stream.index());
    if let Some(index) = cover_index {
        let cover = input
            .packets()
            .find(|(stream, _)| stream.index() == index)
            .and_then(|(_, packet)| packet.data().map(<[u8]>::to_vec));
        if let Some(bytes) = cover {
            log::debug!("Found {} byte cover picture", bytes.len());
            track = track.with_embedded_thumbnail(EmbeddedThumbnail::Encoded(bytes));
        }
    }

    log::info!(
        "Probed {}: {} {} track {width}x{height}",
        path.display(),
        track.codec,
        if is_image { "image" } else { "video" }
    );
    Ok(track)
}

pub(crate) fn codec_id(id: Id) -> CodecId {
    match id {
        Id::H264 => CodecId::Avc,
        Id::HEVC => CodecId::Hevc,
        Id::AV1 => CodecId::Av1,
        Id::VP9 => CodecId::Vp9,
        Id::VP8 => CodecId::Vp8,
        Id::MPEG4 => CodecId::Mpeg4,
        Id::MJPEG => CodecId::Jpeg,
        other => CodecId::Other(format!("{other:?}").to_lowercase()),
    }
}
