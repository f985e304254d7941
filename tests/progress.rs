//! ProgressCallback and ProgressInfo tests.

mod common;

use std::sync::{Arc, Mutex};

use common::{FakeSession, gray_sample};
use stillframe::{
    CodecId, ExtractOptions, ExtractionRequest, MemorySampleSource, OperationType,
    ProgressCallback, ProgressInfo, SeekMode, TrackDescriptor, VideoFrameDecoder,
};

struct RecordingProgress {
    infos: Mutex<Vec<ProgressInfo>>,
}

impl RecordingProgress {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            infos: Mutex::new(Vec::new()),
        })
    }
}

impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.infos.lock().unwrap().push(info.clone());
    }
}

/// Decode towards 160 ms with exact seeking: three frames are dropped
/// and the fourth is kept.
fn extract_closest(options: ExtractOptions) {
    let track = TrackDescriptor::video(CodecId::Vp9, 4, 2);
    let samples = (0..8)
        .map(|index| gray_sample(index * 25_000, index as u8, 8, index % 4 == 0))
        .collect();
    let mut source = MemorySampleSource::new(samples);
    let mut session = FakeSession::new();

    let request = ExtractionRequest::new()
        .at_time_us(160_000)
        .with_seek_mode(SeekMode::Closest);
    VideoFrameDecoder::video("test.vp9", &track, &mut source, &mut session)
        .with_options(options)
        .extract(&request)
        .unwrap();
}

// ── ProgressInfo ───────────────────────────────────────────────────

#[test]
fn progress_reports_frame_extraction_operation() {
    let recorder = RecordingProgress::new();
    extract_closest(ExtractOptions::new().with_progress(recorder.clone()));

    let infos = recorder.infos.lock().unwrap();
    assert!(!infos.is_empty(), "Expected progress callbacks");
    for info in infos.iter() {
        assert_eq!(info.operation, OperationType::FrameExtraction);
        assert_eq!(info.total, None);
        assert_eq!(info.percentage, None);
    }
}

#[test]
fn progress_counts_dropped_frames() {
    let recorder = RecordingProgress::new();
    extract_closest(ExtractOptions::new().with_progress(recorder.clone()));

    let infos = recorder.infos.lock().unwrap();
    // Four handled outputs plus the final report.
    assert_eq!(infos.len(), 5);
    let counts: Vec<u64> = infos.iter().map(|info| info.current).collect();
    assert_eq!(counts, vec![1, 2, 3, 4, 4]);

    let pts: Vec<Option<i64>> = infos.iter().map(|info| info.current_pts_us).collect();
    assert_eq!(
        pts,
        vec![Some(100_000), Some(125_000), Some(150_000), Some(175_000), None]
    );
}

#[test]
fn progress_respects_batch_size() {
    let recorder = RecordingProgress::new();
    extract_closest(
        ExtractOptions::new()
            .with_progress(recorder.clone())
            .with_batch_size(2),
    );

    let infos = recorder.infos.lock().unwrap();
    let counts: Vec<u64> = infos.iter().map(|info| info.current).collect();
    assert_eq!(counts, vec![2, 4, 4]);
}

#[test]
fn progress_elapsed_never_decreases() {
    let recorder = RecordingProgress::new();
    extract_closest(ExtractOptions::new().with_progress(recorder.clone()));

    let infos = recorder.infos.lock().unwrap();
    for pair in infos.windows(2) {
        assert!(pair[0].elapsed <= pair[1].elapsed);
    }
}

#[test]
fn failed_extraction_sends_no_final_report() {
    let recorder = RecordingProgress::new();
    let track = TrackDescriptor::video(CodecId::Vp9, 4, 2);
    let mut source = MemorySampleSource::new(vec![gray_sample(0, 1, 8, false)]);
    let mut session = FakeSession::new();

    let result = VideoFrameDecoder::video("test.vp9", &track, &mut source, &mut session)
        .with_options(ExtractOptions::new().with_progress(recorder.clone()))
        .extract(&ExtractionRequest::new());

    assert!(result.is_err());
    assert!(recorder.infos.lock().unwrap().is_empty());
}

// ── OperationType Debug ────────────────────────────────────────────

#[test]
fn operation_type_debug() {
    assert_eq!(
        format!("{:?}", OperationType::FrameExtraction),
        "FrameExtraction"
    );
    assert_eq!(
        format!("{:?}", OperationType::TileComposition),
        "TileComposition"
    );
}
