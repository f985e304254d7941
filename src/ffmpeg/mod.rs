//! FFmpeg-backed collaborators (feature `ffmpeg`).
//!
//! - [`probe_track`] builds a [`TrackDescriptor`](crate::TrackDescriptor)
//!   from the best video stream of a file.
//! - [`FfmpegSampleSource`] reads that stream's packets as samples.
//! - [`FfmpegDecoderSession`] decodes them with libavcodec behind the
//!   bounded-queue [`DecoderSession`](crate::DecoderSession) contract.
//!
//! FFmpeg prints its own diagnostics to stderr, separately from the `log`
//! crate. [`set_ffmpeg_log_level`] tunes or silences that output.
//!
//! # Example
//!
//! ```no_run
//! use stillframe::ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
//!
//! set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! ```

mod probe;
mod session;
mod source;

pub use self::probe::probe_track;
pub use self::session::FfmpegDecoderSession;
pub use self::source::FfmpegSampleSource;

use ffmpeg_next::util::log::Level;

use crate::error::StillframeError;

/// FFmpeg internal log verbosity, most quiet first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Only errors the process cannot survive.
    Panic,
    /// Unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
    /// Everything.
    Trace,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

/// Set FFmpeg's own log verbosity. Does not affect `log` crate output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Initialise FFmpeg. Safe to call repeatedly.
pub(crate) fn initialise() -> Result<(), StillframeError> {
    ffmpeg_next::init().map_err(|error| StillframeError::DecoderInitFailed {
        component: "ffmpeg".to_string(),
        reason: format!("FFmpeg initialisation failed: {error}"),
    })
}

/// Convert a timestamp in `time_base` units to microseconds.
pub(crate) fn to_micros(value: i64, time_base: ffmpeg_next::Rational) -> i64 {
    if time_base.denominator() == 0 {
        return value;
    }
    (i128::from(value) * i128::from(time_base.numerator()) * 1_000_000
        / i128::from(time_base.denominator())) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micros_from_common_time_bases() {
        assert_eq!(to_micros(90_000, ffmpeg_next::Rational::new(1, 90_000)), 1_000_000);
        assert_eq!(to_micros(3, ffmpeg_next::Rational::new(1001, 30_000)), 100_100);
    }
}
