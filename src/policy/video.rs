//! Single video frame extraction.

use std::collections::BTreeMap;

use crate::configuration::{ExtractOptions, ExtractionRequest, PixelFormat, SeekMode};
use crate::conversion::{PixelLayout, convert_pixels};
use crate::error::StillframeError;
use crate::frame::{FrameRect, OutputFrame};
use crate::policy::{ExtractionPolicy, InputAction, InputHandler, OutputHandler, SessionPlan};
use crate::progress::OperationType;
use crate::session::{
    BufferFlags, CaptureLayer, DecodedBuffer, OutputFormat, SessionConfig, SurfaceHandle,
};
use crate::source::{Sample, SeekHint};
use crate::track::{Rotation, TrackDescriptor, TrackKind};

/// Keeps the first decoded frame at (or, in non-`Closest` modes, around) the
/// requested time.
///
/// Leading non-sync samples are skipped so decoding always starts on a sync
/// sample. For AVC and HEVC tracks outside `Closest` mode the first sync
/// sample is queued with end-of-stream set, since one IDR picture is enough.
/// In `Closest` mode every frame presented before the target is dropped.
///
/// `Rgba1010102` output is rendered to a session surface and read back
/// through a [`CaptureLayer`] supplied with
/// [`with_capture_layer`](crate::VideoFrameDecoder::with_capture_layer).
#[derive(Default)]
pub struct VideoFramePolicy {
    capture: Option<Box<dyn CaptureLayer>>,
    surface: Option<SurfaceHandle>,
    destination: PixelFormat,
    drop_before_us: Option<i64>,
    single_idr: bool,
    default_duration_us: i64,
    sample_durations: BTreeMap<i64, i64>,
    sync_sent: bool,
    display: (u32, u32),
    rotation: Rotation,
    frame: Option<OutputFrame>,
}

impl std::fmt::Debug for VideoFramePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFramePolicy")
            .field("capture", &self.capture.is_some())
            .field("surface", &self.surface)
            .field("destination", &self.destination)
            .field("drop_before_us", &self.drop_before_us)
            .field("single_idr", &self.single_idr)
            .field("sync_sent", &self.sync_sent)
            .finish_non_exhaustive()
    }
}

impl VideoFramePolicy {
    /// A policy without a capture layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `layer` to read back surface-rendered frames.
    #[must_use]
    pub fn with_capture_layer(mut self, layer: Box<dyn CaptureLayer>) -> Self {
        self.capture = Some(layer);
        self
    }

    pub(crate) fn set_capture_layer(&mut self, layer: Box<dyn CaptureLayer>) {
        self.capture = Some(layer);
    }

    fn sample_duration(track: &TrackDescriptor, options: &ExtractOptions) -> i64 {
        if let Some(duration) = track.default_sample_duration_us.filter(|d| *d > 0) {
            return duration;
        }
        match track.frame_rate {
            Some(rate) if rate > 0.0 => (1_000_000.0 / rate).round() as i64,
            _ => options.fallback_sample_duration_us,
        }
    }

    fn capture(&mut self, format: &OutputFormat) -> Result<Vec<u8>, StillframeError> {
        let surface = self.surface.ok_or_else(|| {
            StillframeError::CaptureFailed("no render surface was attached".to_string())
        })?;
        let capture = self.capture.as_mut().ok_or_else(|| {
            StillframeError::CaptureFailed("no capture layer was supplied".to_string())
        })?;

        let pixels = capture
            .capture(surface, format.width, format.height, self.destination)
            .map_err(|error| match error {
                StillframeError::CaptureFailed(_) => error,
                other => StillframeError::CaptureFailed(other.to_string()),
            })?;

        let expected =
            format.width as usize * format.height as usize * self.destination.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(StillframeError::CaptureFailed(format!(
                "captured {} bytes, a {}x{} {:?} frame needs {expected}",
                pixels.len(),
                format.width,
                format.height,
                self.destination
            )));
        }
        Ok(pixels)
    }
}

impl InputHandler for VideoFramePolicy {
    fn on_input_received(
        &mut self,
        sample: &Sample,
        _first_sample: bool,
    ) -> Result<InputAction, StillframeError> {
        if !self.sync_sent {
            if !sample.is_sync {
                log::trace!("Skipping non-sync sample at {}us", sample.pts_us);
                return Ok(InputAction::Skip);
            }
            self.sync_sent = true;
        }

        let duration = sample
            .duration_us
            .filter(|d| *d > 0)
            .unwrap_or(self.default_duration_us);
        self.sample_durations.insert(sample.pts_us, duration);

        let flags = BufferFlags {
            sync: sample.is_sync,
            end_of_stream: false,
        };
        if self.single_idr && sample.is_sync {
            log::debug!("Decoding single IDR sample at {}us", sample.pts_us);
            return Ok(InputAction::Finish(flags));
        }
        Ok(InputAction::Queue(flags))
    }

    fn on_input_exhausted(&mut self) -> Result<(), StillframeError> {
        if self.sync_sent {
            Ok(())
        } else {
            Err(StillframeError::NoSyncSampleFound)
        }
    }
}

impl OutputHandler for VideoFramePolicy {
    fn should_drop_output(&self, pts_us: i64) -> bool {
        matches!(self.drop_before_us, Some(target) if pts_us < target)
    }

    fn on_output_dropped(&mut self, pts_us: i64) {
        self.sample_durations.remove(&pts_us);
    }

    fn on_output_received(
        &mut self,
        buffer: &DecodedBuffer,
        format: &OutputFormat,
    ) -> Result<bool, StillframeError> {
        let data = if self.surface.is_some() {
            self.capture(format)?
        } else {
            convert_pixels(&buffer.data, format.geometry(), self.destination)?
        };

        let mut frame = OutputFrame::packed(format.width, format.height, self.destination, data);
        frame.display_width = self.display.0;
        frame.display_height = self.display.1;
        frame.rotation = self.rotation;
        frame.pts_us = Some(buffer.pts_us);
        frame.duration_us = self.sample_durations.remove(&buffer.pts_us);

        log::debug!(
            "Accepted {}x{} frame at {}us",
            format.width,
            format.height,
            buffer.pts_us
        );
        self.frame = Some(frame);
        Ok(true)
    }
}

impl ExtractionPolicy for VideoFramePolicy {
    fn prepare(
        &mut self,
        track: &TrackDescriptor,
        request: &ExtractionRequest,
        options: &ExtractOptions,
    ) -> Result<SessionPlan, StillframeError> {
        if track.kind != TrackKind::Video {
            return Err(StillframeError::UnsupportedFormat(
                "frame extraction needs a video track".to_string(),
            ));
        }

        let needs_surface = request.pixel_format.requires_gpu_conversion();
        if needs_surface && self.capture.is_none() {
            return Err(StillframeError::UnsupportedFormat(format!(
                "{:?} output needs a capture layer",
                request.pixel_format
            )));
        }

        let seek_time_us = request.target_time_us.unwrap_or_else(|| {
            track
                .thumbnail_time_us
                .filter(|time| *time >= 0)
                .unwrap_or(0)
        });
        let closest = request.seek_mode == SeekMode::Closest;

        self.destination = request.pixel_format;
        self.drop_before_us = if closest { request.target_time_us } else { None };
        self.single_idr = track.codec.has_idr_pictures() && !closest;
        self.default_duration_us = Self::sample_duration(track, options);
        self.display = (track.width, track.height);
        self.rotation = track.rotation;

        log::debug!(
            "Planning {} frame extraction at {seek_time_us}us ({:?}, single IDR: {})",
            track.codec,
            request.seek_mode,
            self.single_idr
        );

        Ok(SessionPlan {
            seek: SeekHint {
                time_us: seek_time_us,
                mode: request.seek_mode,
            },
            config: SessionConfig {
                codec: track.codec.clone(),
                width: track.width,
                height: track.height,
                rotation: track.rotation,
                preferred_layout: PixelLayout::Yuv420Planar,
                surface: None,
                is_image: false,
            },
            needs_surface,
        })
    }

    fn attach_surface(&mut self, surface: SurfaceHandle) {
        self.surface = Some(surface);
    }

    fn extract_rect(&mut self, rect: Option<FrameRect>) -> Result<(), StillframeError> {
        match rect {
            None => Ok(()),
            Some(rect) => Err(StillframeError::Unsupported(format!(
                "video frames are extracted whole, cannot crop to {rect}"
            ))),
        }
    }

    fn operation(&self) -> OperationType {
        OperationType::FrameExtraction
    }

    fn take_frame(&mut self) -> Result<OutputFrame, StillframeError> {
        self.frame
            .take()
            .ok_or_else(|| StillframeError::DecodeFailed("no frame was accepted".to_string()))
    }
}
