//! In-memory collaborators shared by the integration tests.
//!
//! [`FakeSession`] "decodes" by echoing every queued sample back as a
//! picture of the configured size, so tests choose pixel values through the
//! sample bytes. Everything the engine does to it is recorded.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use stillframe::{
    BufferFlags, CaptureLayer, DecodedBuffer, DecoderSession, ExtractOptions, InputSlot,
    OutputEvent, OutputFormat, PixelFormat, PixelLayout, Sample, SampleSource, SeekHint,
    SessionConfig, StillframeError, SurfaceHandle,
};

/// How a [`FakeSession`] behaves.
#[derive(Debug, Clone)]
pub struct Behaviour {
    pub layout: PixelLayout,
    pub input_slots: usize,
    pub slot_capacity: usize,
    pub swallow_output: bool,
    pub fail_configure: bool,
    pub fail_start: bool,
    pub supports_surface: bool,
    /// Keep an input slot busy until its output has been dequeued.
    pub hold_slots_until_drained: bool,
    /// Report this size instead of the configured one.
    pub format_size: Option<(u32, u32)>,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            layout: PixelLayout::Gray8,
            input_slots: 2,
            slot_capacity: 1 << 20,
            swallow_output: false,
            fail_configure: false,
            fail_start: false,
            supports_surface: false,
            hold_slots_until_drained: false,
            format_size: None,
        }
    }
}

/// One call to `queue_input`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedInput {
    pub pts_us: i64,
    pub flags: BufferFlags,
    pub len: usize,
    pub first_byte: Option<u8>,
}

#[derive(Default)]
struct FakeState {
    config: Option<SessionConfig>,
    running: bool,
    free_slots: usize,
    input_ended: bool,
    most_slots_busy: usize,
    format_sent: bool,
    next_index: usize,
    pending: VecDeque<OutputEvent>,
    queued: Vec<QueuedInput>,
    released: Vec<(usize, bool)>,
    configure_calls: usize,
    start_calls: usize,
    stop_calls: usize,
    release_calls: usize,
    feeder_threads: Vec<Option<String>>,
}

pub struct FakeSession {
    behaviour: Behaviour,
    state: Mutex<FakeState>,
    changed: Condvar,
    renders: Arc<AtomicUsize>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::with_behaviour(Behaviour::default())
    }

    pub fn with_behaviour(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            state: Mutex::new(FakeState::default()),
            changed: Condvar::new(),
            renders: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn queued(&self) -> Vec<QueuedInput> {
        self.state.lock().unwrap().queued.clone()
    }

    pub fn released(&self) -> Vec<(usize, bool)> {
        self.state.lock().unwrap().released.clone()
    }

    pub fn config(&self) -> Option<SessionConfig> {
        self.state.lock().unwrap().config.clone()
    }

    /// (configure, start, stop, release) call counts.
    pub fn lifecycle_calls(&self) -> (usize, usize, usize, usize) {
        let state = self.state.lock().unwrap();
        (
            state.configure_calls,
            state.start_calls,
            state.stop_calls,
            state.release_calls,
        )
    }

    /// Names of the threads that queued input.
    pub fn feeder_threads(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().feeder_threads.clone()
    }

    /// Shared counter of buffers released with `render` set.
    pub fn render_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.renders)
    }

    /// Largest number of input slots in use at once.
    pub fn most_slots_busy(&self) -> usize {
        self.state.lock().unwrap().most_slots_busy
    }

    fn format(&self, config: &SessionConfig) -> OutputFormat {
        let (width, height) = self
            .behaviour
            .format_size
            .unwrap_or((config.width, config.height));
        OutputFormat::packed(width, height, self.behaviour.layout)
    }
}

impl DecoderSession for FakeSession {
    fn configure(&mut self, config: &SessionConfig) -> Result<(), StillframeError> {
        let mut state = self.state.lock().unwrap();
        state.configure_calls += 1;
        if self.behaviour.fail_configure {
            return Err(StillframeError::Unsupported("codec rejected".to_string()));
        }
        state.config = Some(config.clone());
        Ok(())
    }

    fn create_render_surface(
        &mut self,
        _width: u32,
        _height: u32,
    ) -> Result<SurfaceHandle, StillframeError> {
        if self.behaviour.supports_surface {
            Ok(SurfaceHandle::new(7))
        } else {
            Err(StillframeError::Unsupported("no surfaces here".to_string()))
        }
    }

    fn start(&mut self) -> Result<(), StillframeError> {
        let mut state = self.state.lock().unwrap();
        state.start_calls += 1;
        if self.behaviour.fail_start {
            return Err(StillframeError::Unsupported("cannot start".to_string()));
        }
        state.running = true;
        state.free_slots = self.behaviour.input_slots;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), StillframeError> {
        let mut state = self.state.lock().unwrap();
        state.stop_calls += 1;
        state.running = false;
        self.changed.notify_all();
        Ok(())
    }

    fn release(&mut self) {
        self.state.lock().unwrap().release_calls += 1;
    }

    fn has_free_input(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.running && !state.input_ended && state.free_slots > 0
    }

    fn has_ready_output(&self) -> bool {
        !self.state.lock().unwrap().pending.is_empty()
    }

    fn dequeue_input(&self, timeout: Duration) -> Result<Option<InputSlot>, StillframeError> {
        let state = self.state.lock().unwrap();
        let (mut state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |state| {
                state.running && !state.input_ended && state.free_slots == 0
            })
            .unwrap();
        if !state.running || state.input_ended || state.free_slots == 0 {
            return Ok(None);
        }
        state.free_slots -= 1;
        let busy = self.behaviour.input_slots - state.free_slots;
        state.most_slots_busy = state.most_slots_busy.max(busy);
        Ok(Some(InputSlot {
            index: state.queued.len(),
            capacity: self.behaviour.slot_capacity,
        }))
    }

    fn queue_input(
        &self,
        _slot: InputSlot,
        data: &[u8],
        pts_us: i64,
        flags: BufferFlags,
    ) -> Result<(), StillframeError> {
        let mut state = self.state.lock().unwrap();
        if !self.behaviour.hold_slots_until_drained {
            state.free_slots += 1;
        }
        state
            .feeder_threads
            .push(std::thread::current().name().map(str::to_string));
        state.queued.push(QueuedInput {
            pts_us,
            flags,
            len: data.len(),
            first_byte: data.first().copied(),
        });
        if flags.end_of_stream {
            state.input_ended = true;
        }

        if !self.behaviour.swallow_output {
            if !data.is_empty() {
                let config = state.config.clone().unwrap_or_else(|| SessionConfig {
                    codec: stillframe::CodecId::Avc,
                    width: 0,
                    height: 0,
                    rotation: stillframe::Rotation::None,
                    preferred_layout: PixelLayout::Gray8,
                    surface: None,
                    is_image: false,
                });
                if !state.format_sent {
                    state.format_sent = true;
                    let format = self.format(&config);
                    state.pending.push_back(OutputEvent::FormatChanged(format));
                }
                let index = state.next_index;
                state.next_index += 1;
                let rendering = config.surface.is_some();
                state.pending.push_back(OutputEvent::Buffer(DecodedBuffer {
                    index,
                    pts_us,
                    flags,
                    data: if rendering { Vec::new() } else { data.to_vec() },
                }));
            } else if flags.end_of_stream {
                state.pending.push_back(OutputEvent::EndOfStream);
            }
        }
        self.changed.notify_all();
        Ok(())
    }

    fn dequeue_output(&self, timeout: Duration) -> Result<OutputEvent, StillframeError> {
        let state = self.state.lock().unwrap();
        let (mut state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |state| {
                state.running && state.pending.is_empty()
            })
            .unwrap();
        let event = state.pending.pop_front().unwrap_or(OutputEvent::TryAgain);
        if self.behaviour.hold_slots_until_drained
            && matches!(event, OutputEvent::Buffer(_) | OutputEvent::EndOfStream)
        {
            state.free_slots += 1;
            self.changed.notify_all();
        }
        Ok(event)
    }

    fn release_output(&self, index: usize, render: bool) -> Result<(), StillframeError> {
        if render {
            self.renders.fetch_add(1, Ordering::SeqCst);
        }
        self.state.lock().unwrap().released.push((index, render));
        Ok(())
    }
}

/// A capture layer that fills frames with one byte value and records
/// whether a render preceded every capture.
pub struct FakeCapture {
    pub fill: u8,
    pub fail: bool,
    pub renders: Arc<AtomicUsize>,
    pub captures: Arc<Mutex<Vec<(SurfaceHandle, bool)>>>,
}

impl FakeCapture {
    pub fn new(renders: Arc<AtomicUsize>) -> Self {
        Self {
            fill: 0xAB,
            fail: false,
            renders,
            captures: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl CaptureLayer for FakeCapture {
    fn capture(
        &mut self,
        surface: SurfaceHandle,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Vec<u8>, StillframeError> {
        let mut captures = self.captures.lock().unwrap();
        let rendered_before = self.renders.load(Ordering::SeqCst) > captures.len();
        captures.push((surface, rendered_before));
        if self.fail {
            return Err(StillframeError::Unsupported("GPU lost".to_string()));
        }
        Ok(vec![
            self.fill;
            width as usize * height as usize * format.bytes_per_pixel()
        ])
    }
}

/// A source that fails after handing out `good` samples.
pub struct FailingSource {
    pub good: Vec<Sample>,
}

impl SampleSource for FailingSource {
    fn seek(&mut self, _hint: SeekHint) -> Result<(), StillframeError> {
        Ok(())
    }

    fn next_sample(&mut self) -> Result<Option<Sample>, StillframeError> {
        if self.good.is_empty() {
            Err(StillframeError::SourceError("disk on fire".to_string()))
        } else {
            Ok(Some(self.good.remove(0)))
        }
    }
}

/// A gray picture sample of `len` bytes, all set to `value`.
pub fn gray_sample(pts_us: i64, value: u8, len: usize, sync: bool) -> Sample {
    if sync {
        Sample::sync(vec![value; len], pts_us)
    } else {
        Sample::new(vec![value; len], pts_us)
    }
}

/// Options that give up quickly when a session stalls.
pub fn impatient_options() -> ExtractOptions {
    ExtractOptions::new()
        .with_output_timeout(Duration::from_millis(1))
        .with_input_timeout(Duration::from_millis(1))
        .with_retry_count(5)
}

/// A source that ignores seeks (but records them) and plays samples in
/// order.
#[derive(Default)]
pub struct ScriptedSource {
    pub samples: VecDeque<Sample>,
    pub seeks: Arc<Mutex<Vec<SeekHint>>>,
}

impl ScriptedSource {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples: samples.into(),
            seeks: Arc::default(),
        }
    }
}

impl SampleSource for ScriptedSource {
    fn seek(&mut self, hint: SeekHint) -> Result<(), StillframeError> {
        self.seeks.lock().unwrap().push(hint);
        Ok(())
    }

    fn next_sample(&mut self) -> Result<Option<Sample>, StillframeError> {
        Ok(self.samples.pop_front())
    }
}
