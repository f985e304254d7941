//! Extraction configuration.
//!
//! Two builders live here. [`ExtractionRequest`] says *what* to extract
//! (which timestamp, how to seek, which pixel format, which region) and is
//! immutable once extraction starts. [`ExtractOptions`] says *how* the engine
//! should behave while doing it (threading, timeouts, retry budget, progress
//! reporting) without polluting every function signature.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use stillframe::{ExtractOptions, ExtractionRequest, PixelFormat, SeekMode, ThreadingMode};
//!
//! let request = ExtractionRequest::new()
//!     .at_time_us(2_500_000)
//!     .with_seek_mode(SeekMode::Closest)
//!     .with_pixel_format(PixelFormat::Rgba8);
//!
//! let options = ExtractOptions::new()
//!     .with_threading(ThreadingMode::MultiThreaded)
//!     .with_output_timeout(Duration::from_millis(20));
//! # let _ = (request, options);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use crate::frame::FrameRect;
use crate::progress::{NoOpProgress, ProgressCallback};

/// Frame duration assumed when a track declares neither per-sample durations
/// nor a frame rate (30 fps).
pub const DEFAULT_SAMPLE_DURATION_US: i64 = 33_333;

/// How long a single blocking session call may wait by default.
pub const DEFAULT_BUFFER_TIMEOUT: Duration = Duration::from_millis(10);

/// How many consecutive empty output polls are tolerated by default.
pub const DEFAULT_RETRY_COUNT: u32 = 100;

/// Destination pixel format for extracted frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 8-bit RGB (24 bpp). This is the default.
    #[default]
    Rgb8,
    /// 8-bit RGBA with alpha pre-set to 255 (32 bpp).
    Rgba8,
    /// 8-bit BGRA, the native layout of most display surfaces (32 bpp).
    Bgra8,
    /// 5-6-5 packed RGB, little-endian (16 bpp).
    Rgb565,
    /// 8-bit grayscale (8 bpp).
    Gray8,
    /// 10-bit-per-channel RGB with 2-bit alpha, little-endian (32 bpp).
    ///
    /// Video extraction produces this format through a render surface and
    /// the configured [`CaptureLayer`](crate::CaptureLayer).
    Rgba1010102,
}

impl PixelFormat {
    /// Number of bytes one pixel occupies.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 | PixelFormat::Rgba1010102 => 4,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Gray8 => 1,
        }
    }

    /// Whether video extraction must go through a render surface and a
    /// capture layer rather than a CPU conversion.
    pub fn requires_gpu_conversion(self) -> bool {
        matches!(self, PixelFormat::Rgba1010102)
    }

    /// Write one RGBA pixel into `out` (exactly `bytes_per_pixel` bytes).
    pub(crate) fn pack_rgba(self, [r, g, b, a]: [u8; 4], out: &mut [u8]) {
        match self {
            PixelFormat::Rgb8 => out.copy_from_slice(&[r, g, b]),
            PixelFormat::Rgba8 => out.copy_from_slice(&[r, g, b, a]),
            PixelFormat::Bgra8 => out.copy_from_slice(&[b, g, r, a]),
            PixelFormat::Rgb565 => {
                let packed = ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3);
                out.copy_from_slice(&packed.to_le_bytes());
            }
            PixelFormat::Gray8 => {
                out[0] = ((77 * r as u32 + 150 * g as u32 + 29 * b as u32 + 128) >> 8) as u8;
            }
            PixelFormat::Rgba1010102 => {
                let widen = |c: u8| ((c as u32) << 2) | (c as u32 >> 6);
                let packed =
                    widen(r) | (widen(g) << 10) | (widen(b) << 20) | ((a as u32 >> 6) << 30);
                out.copy_from_slice(&packed.to_le_bytes());
            }
        }
    }

    /// Read one pixel (exactly `bytes_per_pixel` bytes) back as 8-bit RGBA.
    pub(crate) fn unpack_rgba(self, pixel: &[u8]) -> [u8; 4] {
        match self {
            PixelFormat::Rgb8 => [pixel[0], pixel[1], pixel[2], 255],
            PixelFormat::Rgba8 => [pixel[0], pixel[1], pixel[2], pixel[3]],
            PixelFormat::Bgra8 => [pixel[2], pixel[1], pixel[0], pixel[3]],
            PixelFormat::Rgb565 => {
                let packed = u16::from_le_bytes([pixel[0], pixel[1]]);
                let r5 = (packed >> 11) as u8 & 0x1f;
                let g6 = (packed >> 5) as u8 & 0x3f;
                let b5 = packed as u8 & 0x1f;
                [
                    (r5 << 3) | (r5 >> 2),
                    (g6 << 2) | (g6 >> 4),
                    (b5 << 3) | (b5 >> 2),
                    255,
                ]
            }
            PixelFormat::Gray8 => [pixel[0], pixel[0], pixel[0], 255],
            PixelFormat::Rgba1010102 => {
                let packed = u32::from_le_bytes([pixel[0], pixel[1], pixel[2], pixel[3]]);
                let narrow = |shift: u32| ((packed >> shift) & 0x3ff) as u16 >> 2;
                [
                    narrow(0) as u8,
                    narrow(10) as u8,
                    narrow(20) as u8,
                    ((packed >> 30) as u8) * 85,
                ]
            }
        }
    }
}

/// Where the sample source should land relative to the target timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SeekMode {
    /// The sync sample at or before the target. This is the default.
    #[default]
    PreviousSync,
    /// The sync sample at or after the target.
    NextSync,
    /// Whichever sync sample is nearest to the target.
    ClosestSync,
    /// The frame at or just after the target: seek to the previous sync
    /// sample, then decode and discard frames until the target is reached.
    Closest,
}

/// Whether tiled images are fed and drained from one thread or two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThreadingMode {
    /// Use a dedicated feeder thread whenever more than one tile is needed.
    #[default]
    Auto,
    /// Feed and drain from the calling thread.
    SingleThreaded,
    /// Always feed from a dedicated thread while the caller drains.
    MultiThreaded,
}

/// What to extract.
///
/// # Example
///
/// ```
/// use stillframe::{ExtractionRequest, FrameRect, PixelFormat};
///
/// // Whole thumbnail at the track's preferred thumbnail time.
/// let thumbnail = ExtractionRequest::new();
/// assert!(thumbnail.target_time_us.is_none());
///
/// // Top-left 512x512 of a tiled still image, as grayscale.
/// let region = ExtractionRequest::new()
///     .with_pixel_format(PixelFormat::Gray8)
///     .with_rect(FrameRect::new(0, 0, 512, 512));
/// # let _ = region;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[must_use]
pub struct ExtractionRequest {
    /// Target presentation time in microseconds. `None` seeks to the
    /// track's thumbnail time (or the start) and accepts the first decoded
    /// frame.
    pub target_time_us: Option<i64>,
    /// How the sample source should seek.
    pub seek_mode: SeekMode,
    /// Destination pixel format.
    pub pixel_format: PixelFormat,
    /// Sub-region of the canvas to extract. `None` extracts everything.
    pub rect: Option<FrameRect>,
}

impl ExtractionRequest {
    /// A request for the default frame in RGB8 with previous-sync seeking.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a presentation time in microseconds.
    pub fn at_time_us(mut self, time_us: i64) -> Self {
        self.target_time_us = Some(time_us);
        self
    }

    /// Target a presentation time given as a [`Duration`].
    pub fn at_time(self, time: Duration) -> Self {
        self.at_time_us(i64::try_from(time.as_micros()).unwrap_or(i64::MAX))
    }

    /// Set the seek mode.
    pub fn with_seek_mode(mut self, seek_mode: SeekMode) -> Self {
        self.seek_mode = seek_mode;
        self
    }

    /// Set the destination pixel format.
    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    /// Restrict extraction to a canvas sub-region.
    pub fn with_rect(mut self, rect: FrameRect) -> Self {
        self.rect = Some(rect);
        self
    }
}

/// How the engine behaves while extracting.
///
/// An engine uses the defaults unless
/// [`FrameDecoder::with_options`](crate::FrameDecoder::with_options) says
/// otherwise.
#[derive(Clone)]
pub struct ExtractOptions {
    pub(crate) threading: ThreadingMode,
    pub(crate) input_timeout: Duration,
    pub(crate) output_timeout: Duration,
    pub(crate) retry_count: u32,
    pub(crate) fallback_sample_duration_us: i64,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) batch_size: u64,
}

impl Debug for ExtractOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExtractOptions")
            .field("threading", &self.threading)
            .field("input_timeout", &self.input_timeout)
            .field("output_timeout", &self.output_timeout)
            .field("retry_count", &self.retry_count)
            .field("fallback_sample_duration_us", &self.fallback_sample_duration_us)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractOptions {
    /// Create options with default settings.
    ///
    /// Defaults: automatic threading, 10 ms session timeouts, a budget of
    /// 100 empty output polls, 33 333 µs fallback sample duration, no
    /// progress callback.
    pub fn new() -> Self {
        Self {
            threading: ThreadingMode::Auto,
            input_timeout: DEFAULT_BUFFER_TIMEOUT,
            output_timeout: DEFAULT_BUFFER_TIMEOUT,
            retry_count: DEFAULT_RETRY_COUNT,
            fallback_sample_duration_us: DEFAULT_SAMPLE_DURATION_US,
            progress: Arc::new(NoOpProgress),
            batch_size: 1,
        }
    }

    /// Choose single- or multi-threaded tile decoding.
    #[must_use]
    pub fn with_threading(mut self, threading: ThreadingMode) -> Self {
        self.threading = threading;
        self
    }

    /// How long to wait for a free input slot per attempt.
    #[must_use]
    pub fn with_input_timeout(mut self, timeout: Duration) -> Self {
        self.input_timeout = timeout;
        self
    }

    /// How long to wait for a decoded output per attempt.
    #[must_use]
    pub fn with_output_timeout(mut self, timeout: Duration) -> Self {
        self.output_timeout = timeout;
        self
    }

    /// How many consecutive empty output polls are tolerated before the
    /// extraction fails as timed out. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries.max(1);
        self
    }

    /// Sample duration assumed when neither the sample nor the track's frame
    /// rate says otherwise. Non-positive values are ignored.
    #[must_use]
    pub fn with_fallback_sample_duration_us(mut self, duration_us: i64) -> Self {
        if duration_us > 0 {
            self.fallback_sample_duration_us = duration_us;
        }
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Fire the progress callback every `size` handled outputs. Clamped to a
    /// minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// The configured threading mode.
    pub fn threading(&self) -> ThreadingMode {
        self.threading
    }

    /// The configured retry budget.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// The configured fallback sample duration in microseconds.
    pub fn fallback_sample_duration_us(&self) -> i64 {
        self.fallback_sample_duration_us
    }
}
