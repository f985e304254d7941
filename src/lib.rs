//! # stillframe
//!
//! Single-frame extraction: drive a decoder just far enough to produce one
//! thumbnail from a video track, or one (possibly tiled) still image.
//!
//! `stillframe` does not demux or decode by itself. You hand the engine a
//! [`TrackDescriptor`], a [`SampleSource`] of compressed samples and a
//! [`DecoderSession`]; it seeks, feeds, drains, and stops as soon as the
//! requested picture is complete. The optional `ffmpeg` feature provides
//! all three on top of [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next).
//!
//! ## Quick Start
//!
//! ### Extract a Video Thumbnail
//!
//! ```no_run
//! # #[cfg(feature = "ffmpeg")]
//! # fn main() -> Result<(), stillframe::StillframeError> {
//! use stillframe::ffmpeg::{FfmpegSampleSource, probe_track};
//! use stillframe::{ExtractionRequest, SeekMode, VideoFrameDecoder};
//!
//! let track = probe_track("input.mp4")?;
//! let mut source = FfmpegSampleSource::open("input.mp4")?;
//! let mut session = source.decoder_session()?;
//!
//! let request = ExtractionRequest::new()
//!     .at_time_us(5_000_000)
//!     .with_seek_mode(SeekMode::Closest);
//! let frame = VideoFrameDecoder::video("ffmpeg", &track, &mut source, &mut session)
//!     .extract(&request)?;
//! frame.save("thumbnail.png")?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "ffmpeg"))]
//! # fn main() {}
//! ```
//!
//! ### Extract Part of a Tiled Image
//!
//! ```no_run
//! use stillframe::{
//!     DecoderSession, ExtractionRequest, FrameRect, ImageDecoder, SampleSource, TrackDescriptor,
//! };
//!
//! # fn run(track: &TrackDescriptor, source: &mut dyn SampleSource, session: &mut dyn DecoderSession) -> Result<(), stillframe::StillframeError> {
//! // Top-left 512x512 of a grid of 256x256 tiles.
//! let request = ExtractionRequest::new().with_rect(FrameRect::new(0, 0, 512, 512));
//! let frame = ImageDecoder::image("heif", track, source, session).extract(&request)?;
//! assert_eq!((frame.width, frame.height), (512, 512));
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Seek modes**: previous, next or closest sync sample, or the exact
//!   frame at a time
//! - **Single IDR fast path** for AVC and HEVC thumbnails
//! - **Tile composition** of grid images, optionally feeding from a second
//!   thread
//! - **Pixel formats**: RGB8, RGBA8, BGRA8, RGB565, GRAY8, and RGBA 10:10:10:2
//!   through a render surface and a [`CaptureLayer`]
//! - **Embedded thumbnails** via [`metadata_only`] without touching a decoder
//! - **Progress callbacks** for every handled decoder output
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ffmpeg` | FFmpeg-backed probe, sample source and decoder session, plus the `stillframe-cli` binary |
//! | `async` | [`extract_blocking`] runs an extraction on Tokio's blocking pool |
//! | `full` | Enables all of the above |

#[cfg(feature = "async")]
pub mod blocking;
pub mod configuration;
mod conversion;
pub mod engine;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod frame;
pub mod policy;
pub mod progress;
pub mod session;
pub mod source;
pub mod track;

#[cfg(feature = "async")]
pub use blocking::{BlockingExtraction, extract_blocking};
pub use configuration::{
    DEFAULT_BUFFER_TIMEOUT, DEFAULT_RETRY_COUNT, DEFAULT_SAMPLE_DURATION_US, ExtractOptions,
    ExtractionRequest, PixelFormat, SeekMode, ThreadingMode,
};
pub use conversion::{PictureGeometry, PixelLayout, convert_pixels};
pub use engine::{DecodeLoop, FrameDecoder, ImageDecoder, VideoFrameDecoder, metadata_only};
pub use error::StillframeError;
pub use frame::{FrameRect, OutputFrame};
pub use policy::{
    ExtractionPolicy, InputAction, InputHandler, OutputHandler, SessionPlan, TileProgress,
    TiledImagePolicy, VideoFramePolicy,
};
pub use progress::{OperationType, ProgressCallback, ProgressInfo};
pub use session::{
    BufferFlags, CaptureLayer, DecodedBuffer, DecoderSession, InputSlot, OutputEvent,
    OutputFormat, SessionConfig, SessionState, SurfaceHandle,
};
pub use source::{MemorySampleSource, Sample, SampleSource, SeekHint};
pub use track::{CodecId, EmbeddedThumbnail, GridLayout, Rotation, TrackDescriptor, TrackKind};
