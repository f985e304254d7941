//! Decoder session and capture layer contracts.
//!
//! A [`DecoderSession`] is the external component that turns compressed
//! samples into decoded pictures through two bounded queues. The engine owns
//! one session exclusively for one extraction; the `ffmpeg` feature provides
//! [`FfmpegDecoderSession`](crate::ffmpeg::FfmpegDecoderSession).
//!
//! Queue methods take `&self` and the trait requires [`Sync`]: while a tiled
//! image is extracted, one thread feeds input and another drains output, so
//! implementations synchronise their queues internally.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

use crate::configuration::PixelFormat;
use crate::conversion::{PictureGeometry, PixelLayout};
use crate::error::StillframeError;
use crate::track::{CodecId, Rotation};

/// Lifecycle of the decoder session as driven by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Not configured yet.
    Unconfigured,
    /// Configured but not started.
    Configured,
    /// Started; the control loop is feeding and draining.
    Running,
    /// The loop finished and the result is being finalised.
    Draining,
    /// Stopped and released.
    Stopped,
    /// A fatal error occurred; the session is released on exit.
    Failed,
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            SessionState::Unconfigured => "unconfigured",
            SessionState::Configured => "configured",
            SessionState::Running => "running",
            SessionState::Draining => "draining",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Flags attached to queued input and dequeued output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferFlags {
    /// The buffer holds a sync sample.
    pub sync: bool,
    /// No further buffers follow.
    pub end_of_stream: bool,
}

impl BufferFlags {
    /// Flags for a sync sample.
    pub const SYNC: Self = Self {
        sync: true,
        end_of_stream: false,
    };

    /// Flags for the end-of-stream marker.
    pub const END_OF_STREAM: Self = Self {
        sync: false,
        end_of_stream: true,
    };

    /// These flags with `end_of_stream` set.
    #[must_use]
    pub fn with_end_of_stream(mut self) -> Self {
        self.end_of_stream = true;
        self
    }
}

/// Opaque handle to a render target created by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(u64);

impl SurfaceHandle {
    /// Wrap a session-specific surface identifier.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The session-specific identifier.
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Everything a session needs to be configured.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Codec of the samples that will be queued.
    pub codec: CodecId,
    /// Width of the pictures to decode (one tile for grid images).
    pub width: u32,
    /// Height of the pictures to decode (one tile for grid images).
    pub height: u32,
    /// Display rotation of the track, for sessions that rotate while
    /// rendering.
    pub rotation: Rotation,
    /// Preferred layout for CPU-visible output.
    pub preferred_layout: PixelLayout,
    /// Surface to render into instead of producing CPU-visible buffers.
    pub surface: Option<SurfaceHandle>,
    /// Whether the samples are independent still-image tiles.
    pub is_image: bool,
}

/// A free input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlot {
    /// Session-specific slot index.
    pub index: usize,
    /// Largest sample the slot can hold, in bytes.
    pub capacity: usize,
}

/// Geometry of the pictures the session currently produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    /// Picture width.
    pub width: u32,
    /// Picture height.
    pub height: u32,
    /// Bytes per row of the first plane.
    pub stride: usize,
    /// Memory layout.
    pub layout: PixelLayout,
}

impl OutputFormat {
    /// Tightly packed format for a `width` × `height` picture.
    pub fn packed(width: u32, height: u32, layout: PixelLayout) -> Self {
        Self {
            width,
            height,
            stride: layout.min_stride(width),
            layout,
        }
    }

    pub(crate) fn geometry(&self) -> PictureGeometry {
        PictureGeometry {
            width: self.width,
            height: self.height,
            stride: self.stride,
            layout: self.layout,
        }
    }
}

/// One decoded picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBuffer {
    /// Session-specific buffer index, handed back to
    /// [`DecoderSession::release_output`].
    pub index: usize,
    /// Presentation timestamp in microseconds.
    pub pts_us: i64,
    /// Buffer flags.
    pub flags: BufferFlags,
    /// Picture bytes in the current [`OutputFormat`]. Empty when rendering
    /// to a surface.
    pub data: Vec<u8>,
}

/// What a call to [`DecoderSession::dequeue_output`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// A decoded picture.
    Buffer(DecodedBuffer),
    /// Subsequent buffers use this format.
    FormatChanged(OutputFormat),
    /// Nothing became ready within the timeout.
    TryAgain,
    /// Every queued input has been decoded after an end-of-stream input.
    EndOfStream,
}

/// The external decoder component.
///
/// `configure`, `start`, `stop` and `release` are called from the thread that
/// owns the engine. The queue methods may be called concurrently from a
/// feeder thread (input side) and the owning thread (output side).
pub trait DecoderSession: Send + Sync {
    /// Apply codec parameters and, optionally, a render surface.
    ///
    /// # Errors
    ///
    /// Any error makes [`init`](crate::FrameDecoder::init) fail with
    /// [`StillframeError::DecoderInitFailed`].
    fn configure(&mut self, config: &SessionConfig) -> Result<(), StillframeError>;

    /// Create a surface decoded pictures can be rendered into.
    ///
    /// # Errors
    ///
    /// The default implementation reports that rendering is unsupported.
    fn create_render_surface(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<SurfaceHandle, StillframeError> {
        Err(StillframeError::Unsupported(format!(
            "session cannot render {width}x{height} pictures to a surface"
        )))
    }

    /// Start decoding.
    ///
    /// # Errors
    ///
    /// Any error makes [`init`](crate::FrameDecoder::init) fail with
    /// [`StillframeError::DecoderInitFailed`].
    fn start(&mut self) -> Result<(), StillframeError>;

    /// Stop decoding. Called once on every exit path after a successful
    /// start.
    ///
    /// # Errors
    ///
    /// Errors are logged and otherwise ignored.
    fn stop(&mut self) -> Result<(), StillframeError>;

    /// Free every resource the session holds.
    fn release(&mut self) {}

    /// Whether [`dequeue_input`](DecoderSession::dequeue_input) would return
    /// a slot without waiting.
    fn has_free_input(&self) -> bool;

    /// Whether [`dequeue_output`](DecoderSession::dequeue_output) would
    /// return something other than `TryAgain` without waiting. While input
    /// slots are free the engine keeps feeding instead of waiting on output.
    fn has_ready_output(&self) -> bool;

    /// Wait up to `timeout` for a free input slot.
    ///
    /// # Errors
    ///
    /// Fatal session errors.
    fn dequeue_input(&self, timeout: Duration) -> Result<Option<InputSlot>, StillframeError>;

    /// Queue a sample (or an empty end-of-stream marker) into `slot`.
    ///
    /// # Errors
    ///
    /// Fatal session errors.
    fn queue_input(
        &self,
        slot: InputSlot,
        data: &[u8],
        pts_us: i64,
        flags: BufferFlags,
    ) -> Result<(), StillframeError>;

    /// Wait up to `timeout` for the next output event.
    ///
    /// # Errors
    ///
    /// Fatal session errors.
    fn dequeue_output(&self, timeout: Duration) -> Result<OutputEvent, StillframeError>;

    /// Give an output buffer back, rendering it to the configured surface
    /// first when `render` is set.
    ///
    /// # Errors
    ///
    /// Fatal session errors.
    fn release_output(&self, index: usize, render: bool) -> Result<(), StillframeError>;
}

/// Reads rendered pictures back into CPU memory.
pub trait CaptureLayer: Send {
    /// Read the picture most recently rendered to `surface` as tightly
    /// packed pixels of `format`.
    ///
    /// # Errors
    ///
    /// Any error surfaces as [`StillframeError::CaptureFailed`].
    fn capture(
        &mut self,
        surface: SurfaceHandle,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Vec<u8>, StillframeError>;
}
