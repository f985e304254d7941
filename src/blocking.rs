//! Extraction from async code (feature `async`).
//!
//! The engine blocks on its decoder session, so [`extract_blocking`] moves a
//! whole extraction onto Tokio's blocking thread pool. Everything the engine
//! borrows is owned by [`BlockingExtraction`] for the duration of the task.
//!
//! # Example
//!
//! ```no_run
//! use stillframe::{BlockingExtraction, ExtractionRequest, StillframeError};
//!
//! # async fn example(job: BlockingExtraction) -> Result<(), StillframeError> {
//! let frame = stillframe::extract_blocking(job).await?;
//! println!("{}x{}", frame.width, frame.height);
//! # Ok(())
//! # }
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::configuration::{ExtractOptions, ExtractionRequest};
use crate::engine::{ImageDecoder, VideoFrameDecoder};
use crate::error::StillframeError;
use crate::frame::OutputFrame;
use crate::session::{CaptureLayer, DecoderSession};
use crate::source::SampleSource;
use crate::track::{TrackDescriptor, TrackKind};

/// Everything one extraction needs, owned.
pub struct BlockingExtraction {
    /// Name used in logs and errors.
    pub component: String,
    /// The track to extract from.
    pub track: TrackDescriptor,
    /// Compressed samples of the track.
    pub source: Box<dyn SampleSource>,
    /// The decoder session to drive.
    pub session: Box<dyn DecoderSession>,
    /// What to extract.
    pub request: ExtractionRequest,
    /// Engine options.
    pub options: ExtractOptions,
    /// Read-back for surface-rendered video frames.
    pub capture: Option<Box<dyn CaptureLayer>>,
}

impl Debug for BlockingExtraction {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("BlockingExtraction")
            .field("component", &self.component)
            .field("track", &self.track)
            .field("request", &self.request)
            .field("options", &self.options)
            .field("capture", &self.capture.is_some())
            .finish_non_exhaustive()
    }
}

impl BlockingExtraction {
    /// An extraction with default options and no capture layer.
    pub fn new(
        component: impl Into<String>,
        track: TrackDescriptor,
        source: Box<dyn SampleSource>,
        session: Box<dyn DecoderSession>,
        request: ExtractionRequest,
    ) -> Self {
        Self {
            component: component.into(),
            track,
            source,
            session,
            request,
            options: ExtractOptions::default(),
            capture: None,
        }
    }

    /// Replace the default options.
    #[must_use]
    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    /// Supply a capture layer for surface-rendered video frames.
    #[must_use]
    pub fn with_capture_layer(mut self, layer: Box<dyn CaptureLayer>) -> Self {
        self.capture = Some(layer);
        self
    }

    /// Run the extraction on the current thread.
    ///
    /// # Errors
    ///
    /// Everything [`FrameDecoder::extract`](crate::FrameDecoder::extract)
    /// reports.
    pub fn run(self) -> Result<OutputFrame, StillframeError> {
        let Self {
            component,
            track,
            mut source,
            mut session,
            request,
            options,
            capture,
        } = self;

        match track.kind {
            TrackKind::Video => {
                let mut decoder =
                    VideoFrameDecoder::video(component, &track, &mut *source, &mut *session)
                        .with_options(options);
                if let Some(layer) = capture {
                    decoder = decoder.with_capture_layer(layer);
                }
                decoder.extract(&request)
            }
            TrackKind::Image => {
                ImageDecoder::image(component, &track, &mut *source, &mut *session)
                    .with_options(options)
                    .extract(&request)
            }
        }
    }
}

/// Run `job` on Tokio's blocking pool and await its frame.
///
/// # Errors
///
/// Everything the extraction reports, or
/// [`StillframeError::DecodeFailed`] if the blocking task panicked or was
/// cancelled.
pub async fn extract_blocking(job: BlockingExtraction) -> Result<OutputFrame, StillframeError> {
    tokio::task::spawn_blocking(move || job.run())
        .await
        .map_err(|error| StillframeError::DecodeFailed(format!("extraction task failed: {error}")))?
}
