//! Benchmarks for pixel conversion and the feed/drain loop.
//!
//! Run with: cargo bench
//!
//! The loop benchmarks use an in-memory session that echoes every sample
//! back as a decoded gray picture, so they measure engine overhead rather
//! than codec speed.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use stillframe::{
    BufferFlags, CodecId, DecodedBuffer, DecoderSession, ExtractOptions, ExtractionRequest,
    GridLayout, ImageDecoder, InputSlot, MemorySampleSource, OutputEvent, OutputFormat,
    PictureGeometry, PixelFormat, PixelLayout, Sample, SessionConfig, StillframeError,
    ThreadingMode, TrackDescriptor, VideoFrameDecoder, convert_pixels,
};

#[derive(Default)]
struct EchoState {
    size: (u32, u32),
    pending: VecDeque<OutputEvent>,
    next_index: usize,
    announced: bool,
}

/// Echoes queued samples as Gray8 pictures of the configured size.
#[derive(Default)]
struct EchoSession {
    state: Mutex<EchoState>,
}

impl DecoderSession for EchoSession {
    fn configure(&mut self, config: &SessionConfig) -> Result<(), StillframeError> {
        self.state.lock().unwrap().size = (config.width, config.height);
        Ok(())
    }

    fn start(&mut self) -> Result<(), StillframeError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), StillframeError> {
        Ok(())
    }

    fn has_free_input(&self) -> bool {
        self.state.lock().unwrap().pending.len() < 4
    }

    fn has_ready_output(&self) -> bool {
        !self.state.lock().unwrap().pending.is_empty()
    }

    fn dequeue_input(&self, _timeout: Duration) -> Result<Option<InputSlot>, StillframeError> {
        Ok(self.has_free_input().then_some(InputSlot {
            index: 0,
            capacity: usize::MAX,
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
        if data.is_empty() {
            state.pending.push_back(OutputEvent::EndOfStream);
            return Ok(());
        }
        if !state.announced {
            state.announced = true;
            let (width, height) = state.size;
            state.pending.push_back(OutputEvent::FormatChanged(OutputFormat::packed(
                width,
                height,
                PixelLayout::Gray8,
            )));
        }
        let index = state.next_index;
        state.next_index += 1;
        state.pending.push_back(OutputEvent::Buffer(DecodedBuffer {
            index,
            pts_us,
            flags,
            data: data.to_vec(),
        }));
        Ok(())
    }

    fn dequeue_output(&self, _timeout: Duration) -> Result<OutputEvent, StillframeError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .pending
            .pop_front()
            .unwrap_or(OutputEvent::TryAgain))
    }

    fn release_output(&self, _index: usize, _render: bool) -> Result<(), StillframeError> {
        Ok(())
    }
}

fn benchmark_pixel_conversion(criterion: &mut Criterion) {
    let (width, height) = (1920u32, 1080u32);
    let geometry = PictureGeometry {
        width,
        height,
        stride: width as usize,
        layout: PixelLayout::Yuv420Planar,
    };
    let yuv = vec![128u8; PixelLayout::Yuv420Planar.buffer_len(height, width as usize)];

    let mut group = criterion.benchmark_group("convert 1080p I420");
    for format in [PixelFormat::Rgb8, PixelFormat::Rgba8, PixelFormat::Gray8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{format:?}")),
            &format,
            |bencher, &format| {
                bencher.iter(|| convert_pixels(&yuv, geometry, format).unwrap());
            },
        );
    }
    group.finish();
}

fn benchmark_video_frame(criterion: &mut Criterion) {
    let track = TrackDescriptor::video(CodecId::Vp9, 320, 240).with_frame_rate(30.0);
    let samples: Vec<Sample> = (0..60)
        .map(|index: i64| {
            let data = vec![index as u8; 320 * 240];
            if index % 30 == 0 {
                Sample::sync(data, index * 33_333)
            } else {
                Sample::new(data, index * 33_333)
            }
        })
        .collect();

    criterion.bench_function("closest frame after 29 dropped frames", |bencher| {
        let request = ExtractionRequest::new()
            .at_time_us(29 * 33_333)
            .with_seek_mode(stillframe::SeekMode::Closest);
        bencher.iter(|| {
            let mut source = MemorySampleSource::new(samples.clone());
            let mut session = EchoSession::default();
            VideoFrameDecoder::video("bench.vp9", &track, &mut source, &mut session)
                .extract(&request)
                .unwrap()
        });
    });
}

fn benchmark_tiled_image(criterion: &mut Criterion) {
    let track = TrackDescriptor::image(CodecId::Hevc, 1024, 1024)
        .with_grid(GridLayout::new(4, 4, 256, 256));
    let tiles: Vec<Sample> = (0..16)
        .map(|index: i64| Sample::sync(vec![index as u8 * 16; 256 * 256], index))
        .collect();

    let mut group = criterion.benchmark_group("compose 4x4 grid");
    for threading in [ThreadingMode::SingleThreaded, ThreadingMode::MultiThreaded] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{threading:?}")),
            &threading,
            |bencher, &threading| {
                let options = ExtractOptions::new().with_threading(threading);
                bencher.iter(|| {
                    let mut source = MemorySampleSource::new(tiles.clone());
                    let mut session = EchoSession::default();
                    ImageDecoder::image("bench.heic", &track, &mut source, &mut session)
                        .with_options(options.clone())
                        .extract(&ExtractionRequest::new())
                        .unwrap()
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_pixel_conversion,
    benchmark_video_frame,
    benchmark_tiled_image
);
criterion_main!(benches);
