//! The extraction engine.
//!
//! [`FrameDecoder`] owns one [`DecoderSession`] for one extraction. It
//! configures and starts the session, runs the feed/drain loop on behalf of
//! an [`ExtractionPolicy`], and stops and releases the session on every exit
//! path, including drop.
//!
//! The loop itself is split in two pumps so a policy can drive them from
//! separate threads: [`InputPump`] moves samples from the source into free
//! input slots, [`OutputPump`] drains decoded pictures and counts down the
//! retry budget while the session has nothing ready.

use std::time::Duration;

use crate::configuration::{ExtractOptions, ExtractionRequest, PixelFormat};
use crate::conversion::{PictureGeometry, PixelLayout, convert_pixels};
use crate::error::StillframeError;
use crate::frame::{FrameRect, OutputFrame};
use crate::policy::{
    ExtractionPolicy, InputAction, InputHandler, OutputHandler, TiledImagePolicy,
    VideoFramePolicy,
};
use crate::progress::ProgressTracker;
use crate::session::{
    BufferFlags, CaptureLayer, DecoderSession, OutputEvent, OutputFormat, SessionState,
    SurfaceHandle,
};
use crate::source::SampleSource;
use crate::track::{EmbeddedThumbnail, TrackDescriptor};

/// Engine extracting one video frame.
pub type VideoFrameDecoder<'a> = FrameDecoder<'a, VideoFramePolicy>;

/// Engine extracting a rect of a (possibly tiled) still image.
pub type ImageDecoder<'a> = FrameDecoder<'a, TiledImagePolicy>;

/// Moves samples from the source into the session.
pub(crate) struct InputPump<'s> {
    source: &'s mut dyn SampleSource,
    session: &'s dyn DecoderSession,
    timeout: Duration,
    have_more: bool,
    queued: usize,
}

impl<'s> InputPump<'s> {
    fn new(
        source: &'s mut dyn SampleSource,
        session: &'s dyn DecoderSession,
        options: &ExtractOptions,
    ) -> Self {
        Self {
            source,
            session,
            timeout: options.input_timeout,
            have_more: true,
            queued: 0,
        }
    }

    /// Whether samples are still being fed.
    pub(crate) fn wants_more(&self) -> bool {
        self.have_more
    }

    /// Samples queued so far, not counting the end-of-stream marker.
    pub(crate) fn queued(&self) -> usize {
        self.queued
    }

    fn ready(&self) -> bool {
        self.have_more && self.session.has_free_input()
    }

    /// Fill at most one input slot.
    pub(crate) fn step<H: InputHandler + ?Sized>(
        &mut self,
        handler: &mut H,
    ) -> Result<(), StillframeError> {
        let Some(slot) = self.session.dequeue_input(self.timeout)? else {
            return Ok(());
        };

        loop {
            let Some(sample) = self.source.next_sample()? else {
                log::debug!("Sample source exhausted after {} queued samples", self.queued);
                self.have_more = false;
                handler.on_input_exhausted()?;
                return self
                    .session
                    .queue_input(slot, &[], 0, BufferFlags::END_OF_STREAM);
            };

            let flags = match handler.on_input_received(&sample, self.queued == 0)? {
                InputAction::Skip => continue,
                InputAction::Queue(flags) => flags,
                InputAction::Finish(flags) => {
                    self.have_more = false;
                    flags.with_end_of_stream()
                }
            };

            if sample.data.len() > slot.capacity {
                return Err(StillframeError::DecodeFailed(format!(
                    "sample of {} bytes does not fit a {} byte input slot",
                    sample.data.len(),
                    slot.capacity
                )));
            }
            self.session
                .queue_input(slot, &sample.data, sample.pts_us, flags)?;
            self.queued += 1;
            log::trace!(
                "Queued sample at {}us into slot {} (eos: {})",
                sample.pts_us,
                slot.index,
                flags.end_of_stream
            );
            return Ok(());
        }
    }
}

/// Drains decoded pictures from the session.
pub(crate) struct OutputPump<'s> {
    session: &'s dyn DecoderSession,
    timeout: Duration,
    retry_count: u32,
    retries_left: u32,
    format: OutputFormat,
    render: bool,
    reached_end: bool,
    handled: usize,
    tracker: ProgressTracker,
}

impl<'s> OutputPump<'s> {
    fn new(
        session: &'s dyn DecoderSession,
        options: &ExtractOptions,
        format: OutputFormat,
        render: bool,
        tracker: ProgressTracker,
    ) -> Self {
        Self {
            session,
            timeout: options.output_timeout,
            retry_count: options.retry_count,
            retries_left: options.retry_count,
            format,
            render,
            reached_end: false,
            handled: 0,
            tracker,
        }
    }

    fn has_ready(&self) -> bool {
        self.session.has_ready_output()
    }

    /// Whether the session signalled end-of-stream.
    pub(crate) fn reached_end(&self) -> bool {
        self.reached_end
    }

    /// Emit the final progress report.
    pub(crate) fn finish(&mut self) {
        self.tracker.finish();
    }

    /// The error for a stream that ended before the policy was satisfied.
    pub(crate) fn incomplete(&self) -> StillframeError {
        StillframeError::DecodeFailed(format!(
            "decoder reached end of stream after {} outputs without completing the frame",
            self.handled
        ))
    }

    /// Handle at most one output event. Returns `true` once the handler
    /// reports completion.
    pub(crate) fn step<H: OutputHandler + ?Sized>(
        &mut self,
        handler: &mut H,
    ) -> Result<bool, StillframeError> {
        let buffer = match self.session.dequeue_output(self.timeout)? {
            OutputEvent::TryAgain => {
                self.retries_left = self.retries_left.saturating_sub(1);
                if self.retries_left == 0 {
                    return Err(StillframeError::DecodeFailed(format!(
                        "timed out waiting for output after {} attempts",
                        self.retry_count
                    )));
                }
                return Ok(false);
            }
            OutputEvent::FormatChanged(format) => {
                log::debug!(
                    "Output format changed to {}x{} {:?} (stride {})",
                    format.width,
                    format.height,
                    format.layout,
                    format.stride
                );
                self.format = format;
                return Ok(false);
            }
            OutputEvent::EndOfStream => {
                self.reached_end = true;
                return Ok(false);
            }
            OutputEvent::Buffer(buffer) => buffer,
        };

        self.retries_left = self.retry_count;
        if buffer.flags.end_of_stream && buffer.data.is_empty() && !self.render {
            self.session.release_output(buffer.index, false)?;
            self.reached_end = true;
            return Ok(false);
        }

        self.handled += 1;
        self.tracker.advance(Some(buffer.pts_us));

        if handler.should_drop_output(buffer.pts_us) {
            log::trace!("Dropping output at {}us", buffer.pts_us);
            self.session.release_output(buffer.index, false)?;
            handler.on_output_dropped(buffer.pts_us);
            self.reached_end = buffer.flags.end_of_stream;
            return Ok(false);
        }

        let done = if self.render {
            self.session.release_output(buffer.index, true)?;
            handler.on_output_received(&buffer, &self.format)?
        } else {
            let done = handler.on_output_received(&buffer, &self.format);
            self.session.release_output(buffer.index, false)?;
            done?
        };

        if !done && buffer.flags.end_of_stream {
            self.reached_end = true;
        }
        Ok(done)
    }
}

/// One feed/drain loop over a started session, handed to
/// [`ExtractionPolicy::extract_internal`].
pub struct DecodeLoop<'s> {
    pub(crate) input: InputPump<'s>,
    pub(crate) output: OutputPump<'s>,
}

impl DecodeLoop<'_> {
    /// Alternate feeding and draining on the calling thread until `handler`
    /// reports completion.
    ///
    /// # Errors
    ///
    /// [`StillframeError::DecodeFailed`] when the retry budget runs out or
    /// the stream ends first, plus any handler or session error.
    pub fn run<H>(mut self, handler: &mut H) -> Result<(), StillframeError>
    where
        H: InputHandler + OutputHandler + ?Sized,
    {
        loop {
            if self.input.ready() {
                self.input.step(&mut *handler)?;
                // Nothing to drain yet, keep filling slots instead of waiting.
                if self.input.ready() && !self.output.has_ready() {
                    continue;
                }
            }
            if self.output.step(&mut *handler)? {
                self.output.finish();
                return Ok(());
            }
            if self.output.reached_end() {
                return Err(self.output.incomplete());
            }
        }
    }
}

/// Drives a [`DecoderSession`] until an [`ExtractionPolicy`] is satisfied.
///
/// The engine is single-use: [`init`](Self::init) once, then
/// [`extract_frame`](Self::extract_frame) once. The session is stopped and
/// released when extraction ends, whatever the outcome, or when the engine
/// is dropped.
///
/// # Example
///
/// ```no_run
/// use stillframe::{
///     CodecId, DecoderSession, ExtractionRequest, MemorySampleSource, TrackDescriptor,
///     VideoFrameDecoder,
/// };
///
/// # fn run(session: &mut dyn DecoderSession, samples: Vec<stillframe::Sample>) -> Result<(), stillframe::StillframeError> {
/// let track = TrackDescriptor::video(CodecId::Avc, 1920, 1080);
/// let mut source = MemorySampleSource::new(samples);
///
/// let frame = VideoFrameDecoder::video("example.decoder", &track, &mut source, session)
///     .extract(&ExtractionRequest::new().at_time_us(2_000_000))?;
/// frame.save("frame.png")?;
/// # Ok(())
/// # }
/// ```
pub struct FrameDecoder<'a, P: ExtractionPolicy> {
    component: String,
    track: &'a TrackDescriptor,
    source: &'a mut dyn SampleSource,
    session: &'a mut dyn DecoderSession,
    policy: P,
    options: ExtractOptions,
    state: SessionState,
    started: bool,
    released: bool,
    extracted: bool,
    surface: Option<SurfaceHandle>,
    initial_format: Option<OutputFormat>,
}

impl<'a> FrameDecoder<'a, VideoFramePolicy> {
    /// An engine extracting one frame of a video track.
    pub fn video(
        component: impl Into<String>,
        track: &'a TrackDescriptor,
        source: &'a mut dyn SampleSource,
        session: &'a mut dyn DecoderSession,
    ) -> Self {
        Self::with_policy(component, track, source, session, VideoFramePolicy::new())
    }

    /// Read back surface-rendered frames through `layer`. Needed for
    /// [`PixelFormat::Rgba1010102`].
    #[must_use]
    pub fn with_capture_layer(mut self, layer: Box<dyn CaptureLayer>) -> Self {
        self.policy.set_capture_layer(layer);
        self
    }

    /// Decode only the track's embedded thumbnail. See [`metadata_only`].
    ///
    /// # Errors
    ///
    /// See [`metadata_only`].
    pub fn metadata_only(
        track: &TrackDescriptor,
        format: PixelFormat,
        thumbnail: bool,
    ) -> Result<OutputFrame, StillframeError> {
        metadata_only(track, format, thumbnail)
    }
}

impl<'a> FrameDecoder<'a, TiledImagePolicy> {
    /// An engine extracting a rect of an image track.
    pub fn image(
        component: impl Into<String>,
        track: &'a TrackDescriptor,
        source: &'a mut dyn SampleSource,
        session: &'a mut dyn DecoderSession,
    ) -> Self {
        Self::with_policy(component, track, source, session, TiledImagePolicy::new())
    }
}

impl<'a, P: ExtractionPolicy> FrameDecoder<'a, P> {
    /// An engine running a custom policy.
    pub fn with_policy(
        component: impl Into<String>,
        track: &'a TrackDescriptor,
        source: &'a mut dyn SampleSource,
        session: &'a mut dyn DecoderSession,
        policy: P,
    ) -> Self {
        Self {
            component: component.into(),
            track,
            source,
            session,
            policy,
            options: ExtractOptions::default(),
            state: SessionState::Unconfigured,
            started: false,
            released: false,
            extracted: false,
            surface: None,
            initial_format: None,
        }
    }

    /// Replace the default options.
    #[must_use]
    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The policy, for inspecting what it observed.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Validate the track, position the source, then configure and start
    /// the session.
    ///
    /// # Errors
    ///
    /// [`StillframeError::UnsupportedFormat`] for tracks the policy cannot
    /// handle, [`StillframeError::DecoderInitFailed`] when the session
    /// cannot be set up, [`StillframeError::Unsupported`] when called
    /// twice.
    pub fn init(&mut self, request: &ExtractionRequest) -> Result<(), StillframeError> {
        if self.state != SessionState::Unconfigured || self.released {
            return Err(StillframeError::Unsupported(format!(
                "decoder {} was already initialised",
                self.component
            )));
        }

        let result = self.configure_and_start(request);
        if result.is_err() {
            self.set_state(SessionState::Failed);
            self.shutdown();
        }
        result
    }

    fn configure_and_start(&mut self, request: &ExtractionRequest) -> Result<(), StillframeError> {
        self.track.validate_common()?;
        let plan = self.policy.prepare(self.track, request, &self.options)?;

        log::debug!(
            "Initialising {} for {} {}x{}",
            self.component,
            self.track.codec,
            self.track.width,
            self.track.height
        );
        self.source.seek(plan.seek)?;

        let mut config = plan.config;
        if plan.needs_surface {
            let surface = self
                .session
                .create_render_surface(config.width, config.height)
                .map_err(|error| self.init_failed(error))?;
            log::debug!("Rendering to surface {}", surface.id());
            config.surface = Some(surface);
            self.surface = Some(surface);
            self.policy.attach_surface(surface);
        }

        self.session
            .configure(&config)
            .map_err(|error| self.init_failed(error))?;
        self.set_state(SessionState::Configured);

        self.session
            .start()
            .map_err(|error| self.init_failed(error))?;
        self.started = true;
        self.initial_format = Some(OutputFormat::packed(
            config.width,
            config.height,
            config.preferred_layout,
        ));
        self.set_state(SessionState::Running);
        Ok(())
    }

    /// Run the feed/drain loop and return the extracted frame.
    ///
    /// # Errors
    ///
    /// [`StillframeError::Unsupported`] before [`init`](Self::init) or on a
    /// second call, otherwise whatever the loop or the policy report.
    pub fn extract_frame(&mut self, rect: Option<FrameRect>) -> Result<OutputFrame, StillframeError> {
        if self.extracted || self.state != SessionState::Running {
            return Err(StillframeError::Unsupported(format!(
                "decoder {} is {} and cannot extract a frame",
                self.component, self.state
            )));
        }
        self.extracted = true;

        let result = self.run_loop(rect);
        match &result {
            Ok(frame) => log::info!(
                "{} extracted {}x{} {:?} frame",
                self.component,
                frame.width,
                frame.height,
                frame.pixel_format
            ),
            Err(error) => {
                log::warn!("{} failed to extract a frame: {error}", self.component);
                self.set_state(SessionState::Failed);
            }
        }
        self.shutdown();
        result
    }

    /// [`init`](Self::init) followed by
    /// [`extract_frame`](Self::extract_frame) with the request's rect.
    ///
    /// # Errors
    ///
    /// Everything either step reports.
    pub fn extract(mut self, request: &ExtractionRequest) -> Result<OutputFrame, StillframeError> {
        self.init(request)?;
        self.extract_frame(request.rect)
    }

    fn run_loop(&mut self, rect: Option<FrameRect>) -> Result<OutputFrame, StillframeError> {
        self.policy.extract_rect(rect)?;

        let format = self.initial_format.unwrap_or_else(|| {
            OutputFormat::packed(self.track.width, self.track.height, PixelLayout::default())
        });
        let tracker = ProgressTracker::new(
            self.options.progress.clone(),
            self.policy.operation(),
            self.policy.progress_total(),
            self.options.batch_size,
        );
        let session: &dyn DecoderSession = &*self.session;
        let decode_loop = DecodeLoop {
            input: InputPump::new(&mut *self.source, session, &self.options),
            output: OutputPump::new(session, &self.options, format, self.surface.is_some(), tracker),
        };

        self.policy.extract_internal(decode_loop)?;
        self.set_state(SessionState::Draining);
        self.policy.take_frame()
    }

    fn init_failed(&self, error: StillframeError) -> StillframeError {
        StillframeError::DecoderInitFailed {
            component: self.component.clone(),
            reason: error.to_string(),
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            log::debug!("{}: {} -> {}", self.component, self.state, state);
            self.state = state;
        }
    }

    /// Stop (if started) and release the session exactly once.
    fn shutdown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.started {
            if let Err(error) = self.session.stop() {
                log::warn!("{} failed to stop: {error}", self.component);
            }
        }
        self.session.release();
        if self.state != SessionState::Failed {
            self.set_state(SessionState::Stopped);
        }
    }
}

impl<P: ExtractionPolicy> Drop for FrameDecoder<'_, P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decode the track's embedded thumbnail without touching a session.
///
/// With `thumbnail` set the frame's display size is the thumbnail's own;
/// otherwise it reports the track's display size so callers can scale the
/// preview up.
///
/// # Errors
///
/// [`StillframeError::NoEmbeddedFrame`] when the track carries none,
/// conversion or image decoding errors otherwise.
pub fn metadata_only(
    track: &TrackDescriptor,
    format: PixelFormat,
    thumbnail: bool,
) -> Result<OutputFrame, StillframeError> {
    let embedded = track
        .embedded_thumbnail
        .as_ref()
        .ok_or(StillframeError::NoEmbeddedFrame)?;

    let (width, height, data) = match embedded {
        EmbeddedThumbnail::Raw {
            width,
            height,
            stride,
            layout,
            data,
        } => {
            let geometry = PictureGeometry {
                width: *width,
                height: *height,
                stride: *stride,
                layout: *layout,
            };
            (*width, *height, convert_pixels(data, geometry, format)?)
        }
        EmbeddedThumbnail::Encoded(bytes) => {
            let decoded = image::load_from_memory(bytes)?.to_rgba8();
            let (width, height) = decoded.dimensions();
            let geometry = PictureGeometry {
                width,
                height,
                stride: PixelLayout::Rgba32.min_stride(width),
                layout: PixelLayout::Rgba32,
            };
            (width, height, convert_pixels(decoded.as_raw(), geometry, format)?)
        }
    };

    log::debug!("Decoded {width}x{height} embedded thumbnail");
    let mut frame = OutputFrame::packed(width, height, format, data);
    frame.rotation = track.rotation;
    if !thumbnail {
        let (display_width, display_height) = track.display_dimensions();
        frame.display_width = display_width;
        frame.display_height = display_height;
    }
    Ok(frame)
}
