//! Error types for the `stillframe` crate.
//!
//! This module defines [`StillframeError`], the single error type returned by
//! every fallible operation in the crate. Whatever goes wrong inside the
//! engine, a policy, or one of the collaborators surfaces as exactly one of
//! these variants from [`init`](crate::FrameDecoder::init),
//! [`extract_frame`](crate::FrameDecoder::extract_frame) or
//! [`metadata_only`](crate::FrameDecoder::metadata_only).

use std::io::Error as IoError;

use image::ImageError;
use thiserror::Error;

use crate::frame::FrameRect;

/// The unified error type for all `stillframe` operations.
///
/// Partial progress is never returned alongside an error: a failed tiled
/// extraction discards whatever tiles were already composited.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StillframeError {
    /// The track metadata is incompatible with the requested extraction
    /// (missing codec, inconsistent grid, wrong track kind, ...).
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The decoder session could not be configured or started.
    #[error("Failed to initialise decoder {component}: {reason}")]
    DecoderInitFailed {
        /// Name of the decoder component that was being configured.
        component: String,
        /// Underlying reason reported by the session.
        reason: String,
    },

    /// The decoder session reported a fatal error, timed out, or reached the
    /// end of the stream before the extraction completed.
    #[error("Failed to decode frame: {0}")]
    DecodeFailed(String),

    /// The sample source ran out before yielding a synchronization sample.
    #[error("No sync sample found before the end of the track")]
    NoSyncSampleFound,

    /// The track carries no embedded thumbnail or preview image.
    #[error("Track has no embedded frame")]
    NoEmbeddedFrame,

    /// Reading pixels back from the render surface failed.
    #[error("Failed to capture render surface: {0}")]
    CaptureFailed(String),

    /// The requested rectangle is degenerate, out of bounds, or not aligned to
    /// tile boundaries.
    #[error("Invalid rect {rect}: {reason}")]
    InvalidRect {
        /// The rectangle that was requested.
        rect: FrameRect,
        /// Why it was rejected.
        reason: String,
    },

    /// The operation is not supported by this extraction kind or in the
    /// engine's current state.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The compressed sample source failed to read or seek.
    #[error("Sample source error: {0}")]
    SourceError(String),

    /// An error from the `image` crate while decoding an embedded thumbnail
    /// or encoding an output frame.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error originating from the FFmpeg libraries.
    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for StillframeError {
    fn from(error: ffmpeg_next::Error) -> Self {
        StillframeError::FfmpegError(error.to_string())
    }
}
