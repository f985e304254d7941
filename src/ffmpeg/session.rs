use std::collections::VecDeque;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::codec::{Parameters, packet};
use ffmpeg_next::decoder::Video as VideoDecoder;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::Packet;

use crate::conversion::PixelLayout;
use crate::error::StillframeError;
use crate::session::{
    BufferFlags, DecodedBuffer, DecoderSession, InputSlot, OutputEvent, OutputFormat,
    SessionConfig,
};

/// Decoded pictures allowed to wait in the output queue before input stops
/// being accepted.
const MAX_PENDING_OUTPUTS: usize = 4;

struct Inner {
    context: Option<CodecContext>,
    decoder: Option<VideoDecoder>,
    pending: VecDeque<OutputEvent>,
    format: Option<OutputFormat>,
    running: bool,
    input_ended: bool,
    next_index: usize,
}

impl Inner {
    fn accepts_input(&self) -> bool {
        self.running && !self.input_ended && self.pending.len() < MAX_PENDING_OUTPUTS
    }

    fn decoder(&mut self) -> Result<&mut VideoDecoder, StillframeError> {
        self.decoder
            .as_mut()
            .ok_or_else(|| StillframeError::DecodeFailed("decoder is not configured".to_string()))
    }

    /// Move every frame the decoder has ready into the output queue.
    fn collect_frames(&mut self) -> Result<(), StillframeError> {
        let mut frame = VideoFrame::empty();
        while self.decoder()?.receive_frame(&mut frame).is_ok() {
            let (format, data) = pack_frame(&frame)?;
            if self.format != Some(format) {
                self.format = Some(format);
                self.pending.push_back(OutputEvent::FormatChanged(format));
            }
            let index = self.next_index;
            self.next_index += 1;
            self.pending.push_back(OutputEvent::Buffer(DecodedBuffer {
                index,
                pts_us: frame.pts().unwrap_or(0),
                flags: BufferFlags::default(),
                data,
            }));
        }
        Ok(())
    }
}

/// A libavcodec video decoder behind the [`DecoderSession`] contract.
///
/// Decoding happens synchronously inside
/// [`queue_input`](DecoderSession::queue_input); the resulting pictures wait
/// in a small queue until drained. YUV 4:2:0 pictures are handed out as
/// packed I420, everything else is converted to RGBA first. Rendering to a
/// surface is not supported.
pub struct FfmpegDecoderSession {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl Debug for FfmpegDecoderSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegDecoderSession").finish_non_exhaustive()
    }
}

impl FfmpegDecoderSession {
    /// A session for a stream with these codec parameters.
    ///
    /// # Errors
    ///
    /// FFmpeg errors if the parameters cannot be applied.
    pub fn from_parameters(parameters: Parameters) -> Result<Self, StillframeError> {
        let context = CodecContext::from_parameters(parameters)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                context: Some(context),
                decoder: None,
                pending: VecDeque::new(),
                format: None,
                running: false,
                input_ended: false,
                next_index: 0,
            }),
            changed: Condvar::new(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StillframeError> {
        self.inner
            .lock()
            .map_err(|_| StillframeError::DecodeFailed("session lock poisoned".to_string()))
    }
}

impl DecoderSession for FfmpegDecoderSession {
    fn configure(&mut self, config: &SessionConfig) -> Result<(), StillframeError> {
        if config.surface.is_some() {
            return Err(StillframeError::Unsupported(
                "FFmpeg sessions only produce CPU buffers".to_string(),
            ));
        }
        let mut inner = self.lock()?;
        let context = inner.context.take().ok_or_else(|| {
            StillframeError::Unsupported("session was already configured".to_string())
        })?;
        let decoder = context.decoder().video()?;
        log::debug!(
            "Opened {} decoder for {}x{} ({:?})",
            config.codec,
            decoder.width(),
            decoder.height(),
            decoder.format()
        );
        inner.decoder = Some(decoder);
        Ok(())
    }

    fn start(&mut self) -> Result<(), StillframeError> {
        let mut inner = self.lock()?;
        inner.decoder()?;
        inner.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), StillframeError> {
        let mut inner = self.lock()?;
        inner.running = false;
        if let Some(decoder) = inner.decoder.as_mut() {
            decoder.flush();
        }
        self.changed.notify_all();
        Ok(())
    }

    fn release(&mut self) {
        if let Ok(mut inner) = self.lock() {
            inner.decoder = None;
            inner.context = None;
            inner.pending.clear();
        }
    }

    fn has_free_input(&self) -> bool {
        self.lock().map(|inner| inner.accepts_input()).unwrap_or(false)
    }

    fn has_ready_output(&self) -> bool {
        self.lock()
            .map(|inner| !inner.pending.is_empty())
            .unwrap_or(false)
    }

    fn dequeue_input(&self, timeout: Duration) -> Result<Option<InputSlot>, StillframeError> {
        let inner = self.lock()?;
        let (inner, _) = self
            .changed
            .wait_timeout_while(inner, timeout, |inner| {
                inner.running && !inner.accepts_input()
            })
            .map_err(|_| StillframeError::DecodeFailed("session lock poisoned".to_string()))?;
        Ok(inner.accepts_input().then_some(InputSlot {
            index: 0,
            capacity: usize::MAX,
        }))
    }

    fn queue_input(
        &self,
        _slot: InputSlot,
        data: &[u8],
        pts_us: i64,
        flags: BufferFlags,
    ) -> Result<(), StillframeError> {
        let mut inner = self.lock()?;
        if !data.is_empty() {
            let mut packet = Packet::copy(data);
            packet.set_pts(Some(pts_us));
            packet.set_dts(None);
            if flags.sync {
                packet.set_flags(packet::Flags::KEY);
            }
            inner.decoder()?.send_packet(&packet)?;
            inner.collect_frames()?;
        }
        if flags.end_of_stream {
            inner.input_ended = true;
            inner.decoder()?.send_eof()?;
            inner.collect_frames()?;
            inner.pending.push_back(OutputEvent::EndOfStream);
        }
        self.changed.notify_all();
        Ok(())
    }

    fn dequeue_output(&self, timeout: Duration) -> Result<OutputEvent, StillframeError> {
        let inner = self.lock()?;
        let (mut inner, _) = self
            .changed
            .wait_timeout_while(inner, timeout, |inner| {
                inner.running && inner.pending.is_empty()
            })
            .map_err(|_| StillframeError::DecodeFailed("session lock poisoned".to_string()))?;
        let event = inner.pending.pop_front().unwrap_or(OutputEvent::TryAgain);
        self.changed.notify_all();
        Ok(event)
    }

    fn release_output(&self, _index: usize, _render: bool) -> Result<(), StillframeError> {
        Ok(())
    }
}

/// Copy a decoded frame into one contiguous buffer.
fn pack_frame(frame: &VideoFrame) -> Result<(OutputFormat, Vec<u8>), StillframeError> {
    let (width, height) = (frame.width(), frame.height());
    if matches!(frame.format(), Pixel::YUV420P | Pixel::YUVJ420P) {
        let format = OutputFormat::packed(width, height, PixelLayout::Yuv420Planar);
        let chroma = (width.div_ceil(2), height.div_ceil(2));
        let mut data = Vec::with_capacity(format.layout.buffer_len(height, format.stride));
        copy_plane(frame, 0, width as usize, height as usize, &mut data);
        copy_plane(frame, 1, chroma.0 as usize, chroma.1 as usize, &mut data);
        copy_plane(frame, 2, chroma.0 as usize, chroma.1 as usize, &mut data);
        return Ok((format, data));
    }

    let mut scaler = ScalingContext::get(
        frame.format(),
        width,
        height,
        Pixel::RGBA,
        width,
        height,
        ScalingFlags::BILINEAR,
    )?;
    let mut rgba = VideoFrame::empty();
    scaler.run(frame, &mut rgba)?;

    let format = OutputFormat::packed(width, height, PixelLayout::Rgba32);
    let mut data = Vec::with_capacity(format.stride * height as usize);
    copy_plane(&rgba, 0, format.stride, height as usize, &mut data);
    Ok((format, data))
}

fn copy_plane(frame: &VideoFrame, plane: usize, row_bytes: usize, rows: usize, out: &mut Vec<u8>) {
    let stride = frame.stride(plane);
    let data = frame.data(plane);
    for row in 0..rows {
        out.extend_from_slice(&data[row * stride..row * stride + row_bytes]);
    }
}
