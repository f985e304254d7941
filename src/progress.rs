//! Progress reporting.
//!
//! This module provides [`ProgressCallback`] for monitoring an extraction and
//! [`ProgressInfo`] for progress snapshots. A video extraction reports every
//! decoded frame it inspects (kept or dropped is decided later, so `total` is
//! unknown); a tiled image reports every composited tile against the number
//! of tiles it needs.
//!
//! The engine has no asynchronous cancellation: callbacks observe, they
//! cannot stop an extraction.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use stillframe::{ExtractOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{:?}] {pct:.1}% complete", info.operation);
//!         }
//!     }
//! }
//!
//! let options = ExtractOptions::new().with_progress(Arc::new(PrintProgress));
//! # let _ = options;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

/// The kind of extraction currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Decoding towards a single video frame.
    FrameExtraction,
    /// Decoding and compositing the tiles of a still image.
    TileComposition,
}

/// A snapshot of extraction progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// How many decoder outputs have been handled so far.
    pub current: u64,
    /// Total outputs expected, if known ahead of time.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the extraction loop started.
    pub elapsed: Duration,
    /// Presentation time of the most recent output, in microseconds.
    pub current_pts_us: Option<i64>,
}

/// Trait for receiving progress updates during extraction.
///
/// Implementations must be [`Send`] and [`Sync`]: tiled images are drained
/// on the calling thread while a feeder thread runs alongside, and the
/// options carrying the callback are shared with it.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during an extraction.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. The default callback.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Tracks progress timing and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    items_since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            items_since_last_report: 0,
        }
    }

    /// Record one handled output and fire the callback if the batch
    /// threshold is reached.
    pub(crate) fn advance(&mut self, pts_us: Option<i64>) {
        self.current += 1;
        self.items_since_last_report += 1;

        if self.items_since_last_report >= self.batch_size {
            self.report(pts_us);
            self.items_since_last_report = 0;
        }
    }

    /// Unconditionally emit a final report.
    pub(crate) fn finish(&mut self) {
        self.report(None);
    }

    fn report(&self, pts_us: Option<i64>) {
        let percentage = self
            .total
            .filter(|&total| total > 0)
            .map(|total| (self.current as f32 / total as f32) * 100.0);

        self.callback.on_progress(&ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            percentage,
            elapsed: self.start_time.elapsed(),
            current_pts_us: pts_us,
        });
    }
}
