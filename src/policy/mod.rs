//! Extraction policies.
//!
//! The engine in [`crate::engine`] knows how to move samples into a
//! [`DecoderSession`](crate::DecoderSession) and decoded pictures out of it.
//! What to feed, what to keep and when to stop is decided by an
//! [`ExtractionPolicy`]:
//!
//! - [`VideoFramePolicy`] seeks to a sync sample and keeps the first decoded
//!   frame at or after the requested time.
//! - [`TiledImagePolicy`] feeds the tiles that intersect a rect and
//!   composites them onto one canvas, optionally feeding from a second
//!   thread.

mod tiled;
mod video;

pub use self::tiled::{TileProgress, TiledImagePolicy};
pub use self::video::VideoFramePolicy;

use crate::configuration::{ExtractOptions, ExtractionRequest};
use crate::engine::DecodeLoop;
use crate::error::StillframeError;
use crate::frame::{FrameRect, OutputFrame};
use crate::progress::OperationType;
use crate::session::{BufferFlags, DecodedBuffer, OutputFormat, SessionConfig, SurfaceHandle};
use crate::source::{Sample, SeekHint};
use crate::track::TrackDescriptor;

/// What to do with a sample just read from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    /// Queue the sample with these flags.
    Queue(BufferFlags),
    /// Discard the sample and read the next one into the same slot.
    Skip,
    /// Queue the sample as the last input. End-of-stream is added to the
    /// flags and no further samples are read.
    Finish(BufferFlags),
}

/// Input side of a policy.
pub trait InputHandler {
    /// Decide what to do with `sample`. `first_sample` is set until a sample
    /// has actually been queued.
    ///
    /// # Errors
    ///
    /// Any error aborts the extraction.
    fn on_input_received(
        &mut self,
        sample: &Sample,
        first_sample: bool,
    ) -> Result<InputAction, StillframeError>;

    /// Called once when the source runs dry, before the end-of-stream
    /// marker is queued.
    ///
    /// # Errors
    ///
    /// Any error aborts the extraction.
    fn on_input_exhausted(&mut self) -> Result<(), StillframeError> {
        Ok(())
    }
}

/// Output side of a policy.
pub trait OutputHandler {
    /// Whether the buffer presented at `pts_us` should be released unseen.
    fn should_drop_output(&self, _pts_us: i64) -> bool {
        false
    }

    /// Called after a buffer was released unseen.
    fn on_output_dropped(&mut self, _pts_us: i64) {}

    /// Consume a decoded picture. Returns `true` once the extraction is
    /// complete.
    ///
    /// # Errors
    ///
    /// Any error aborts the extraction.
    fn on_output_received(
        &mut self,
        buffer: &DecodedBuffer,
        format: &OutputFormat,
    ) -> Result<bool, StillframeError>;
}

/// What a policy needs from the engine before it starts the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    /// Where the source should start reading.
    pub seek: SeekHint,
    /// How the session is configured. `surface` is filled in by the engine.
    pub config: SessionConfig,
    /// Whether decoded pictures must be rendered to a surface and captured.
    pub needs_surface: bool,
}

/// A complete extraction strategy plugged into
/// [`FrameDecoder`](crate::FrameDecoder).
///
/// The engine calls, in order: [`prepare`](Self::prepare),
/// [`attach_surface`](Self::attach_surface) if a surface was requested,
/// [`extract_rect`](Self::extract_rect),
/// [`extract_internal`](Self::extract_internal) and finally
/// [`take_frame`](Self::take_frame).
pub trait ExtractionPolicy: InputHandler + OutputHandler {
    /// Validate the track against the request and plan the session.
    ///
    /// # Errors
    ///
    /// [`StillframeError::UnsupportedFormat`] when the track cannot be
    /// handled by this policy.
    fn prepare(
        &mut self,
        track: &TrackDescriptor,
        request: &ExtractionRequest,
        options: &ExtractOptions,
    ) -> Result<SessionPlan, StillframeError>;

    /// Receive the surface the session renders into.
    fn attach_surface(&mut self, _surface: SurfaceHandle) {}

    /// Select the region to extract before any sample is fed.
    ///
    /// # Errors
    ///
    /// [`StillframeError::InvalidRect`] or
    /// [`StillframeError::Unsupported`] when the policy cannot honour it.
    fn extract_rect(&mut self, rect: Option<FrameRect>) -> Result<(), StillframeError>;

    /// The kind of work reported to progress callbacks.
    fn operation(&self) -> OperationType;

    /// How many outputs the policy expects to handle, if known.
    fn progress_total(&self) -> Option<u64> {
        None
    }

    /// Drive the feed/drain loop to completion. The default runs it on the
    /// calling thread.
    ///
    /// # Errors
    ///
    /// Propagates every loop error.
    fn extract_internal(&mut self, decode_loop: DecodeLoop<'_>) -> Result<(), StillframeError>
    where
        Self: Sized,
    {
        decode_loop.run(self)
    }

    /// Hand over the finished frame.
    ///
    /// # Errors
    ///
    /// [`StillframeError::DecodeFailed`] when the loop ended without a
    /// complete frame.
    fn take_frame(&mut self) -> Result<OutputFrame, StillframeError>;
}
