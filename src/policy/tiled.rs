//! Tiled still-image extraction.
//!
//! Grid images (HEIF, AVIF) store one compressed sample per tile in raster
//! order. Only the tiles that intersect the requested rect are fed; each
//! decoded tile is converted and pasted onto a canvas the size of the rect.
//!
//! The decoder emits tiles in the order they were fed, so the `k`-th
//! decoded tile belongs at the `k`-th target position. With more than one
//! target tile the feeding moves to a scoped thread so input and output
//! progress independently.

use std::thread;

use crossbeam_channel::{Receiver, TryRecvError};

use crate::configuration::{ExtractOptions, ExtractionRequest, PixelFormat, ThreadingMode};
use crate::conversion::{Canvas, PixelLayout, convert_pixels};
use crate::engine::{DecodeLoop, InputPump, OutputPump};
use crate::error::StillframeError;
use crate::frame::{FrameRect, OutputFrame};
use crate::policy::{ExtractionPolicy, InputAction, InputHandler, OutputHandler, SessionPlan};
use crate::progress::OperationType;
use crate::session::{BufferFlags, DecodedBuffer, OutputFormat, SessionConfig};
use crate::source::{Sample, SeekHint};
use crate::track::{GridLayout, Rotation, TrackDescriptor, TrackKind};

/// How far tile composition has come.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileProgress {
    decoded: usize,
    offsets: Vec<(u32, u32)>,
}

impl TileProgress {
    /// Tiles composited so far.
    pub fn decoded(&self) -> usize {
        self.decoded
    }

    /// Tiles the rect needs.
    pub fn target(&self) -> usize {
        self.offsets.len()
    }

    /// Canvas position of every target tile, in feed order.
    pub fn offsets(&self) -> &[(u32, u32)] {
        &self.offsets
    }

    /// Whether every target tile has been composited.
    pub fn is_complete(&self) -> bool {
        self.decoded == self.offsets.len()
    }
}

/// Input half: decides which raster-order samples are fed.
#[derive(Debug, Default)]
struct TileFeeder {
    wanted: Vec<bool>,
    target: usize,
    next_raster: usize,
    queued: usize,
}

impl InputHandler for TileFeeder {
    fn on_input_received(
        &mut self,
        sample: &Sample,
        _first_sample: bool,
    ) -> Result<InputAction, StillframeError> {
        let raster = self.next_raster;
        self.next_raster += 1;

        if !self.wanted.get(raster).copied().unwrap_or(false) {
            log::trace!("Skipping tile {raster} at {}us", sample.pts_us);
            return Ok(InputAction::Skip);
        }

        self.queued += 1;
        if self.queued == self.target {
            log::debug!("Queued last target tile ({raster})");
            Ok(InputAction::Finish(BufferFlags::SYNC))
        } else {
            Ok(InputAction::Queue(BufferFlags::SYNC))
        }
    }

    fn on_input_exhausted(&mut self) -> Result<(), StillframeError> {
        Err(StillframeError::DecodeFailed(format!(
            "track ended after {} of {} tiles, {} of them queued",
            self.next_raster, self.wanted.len(), self.queued
        )))
    }
}

/// Output half: pastes decoded tiles onto the canvas.
#[derive(Debug)]
struct TileCompositor {
    progress: TileProgress,
    canvas: Canvas,
    tile_size: (u32, u32),
    destination: PixelFormat,
}

impl OutputHandler for TileCompositor {
    fn on_output_received(
        &mut self,
        buffer: &DecodedBuffer,
        format: &OutputFormat,
    ) -> Result<bool, StillframeError> {
        let Some(&origin) = self.progress.offsets.get(self.progress.decoded) else {
            log::warn!("Ignoring surplus tile at {}us", buffer.pts_us);
            return Ok(true);
        };

        let pixels = convert_pixels(&buffer.data, format.geometry(), self.destination)?;
        self.canvas
            .paste(&pixels, (format.width, format.height), origin, self.tile_size);
        self.progress.decoded += 1;

        log::trace!(
            "Composited tile {}/{} at {:?}",
            self.progress.decoded,
            self.progress.target(),
            origin
        );
        Ok(self.progress.is_complete())
    }
}

/// Extracts a rect of a (possibly tiled) still image.
///
/// Images without a grid are treated as a single tile covering the whole
/// picture. Rects must be aligned to tile boundaries, except that the right
/// and bottom edges may coincide with the image edges.
#[derive(Debug, Default)]
pub struct TiledImagePolicy {
    grid: Option<GridLayout>,
    size: (u32, u32),
    rotation: Rotation,
    destination: PixelFormat,
    threading: ThreadingMode,
    feeder: TileFeeder,
    compositor: Option<TileCompositor>,
}

impl TiledImagePolicy {
    /// A policy waiting to be prepared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Composition progress, once a rect has been selected.
    pub fn progress(&self) -> Option<&TileProgress> {
        self.compositor.as_ref().map(|compositor| &compositor.progress)
    }

    fn validated_grid(track: &TrackDescriptor) -> Result<GridLayout, StillframeError> {
        let grid = track
            .grid
            .unwrap_or_else(|| GridLayout::new(1, 1, track.width, track.height));
        let GridLayout {
            rows,
            columns,
            tile_width,
            tile_height,
        } = grid;

        if rows == 0 || columns == 0 || tile_width == 0 || tile_height == 0 {
            return Err(StillframeError::UnsupportedFormat(format!(
                "degenerate {rows}x{columns} grid of {tile_width}x{tile_height} tiles"
            )));
        }
        let covers = |extent: u32, count: u32, tile: u32| {
            let full = u64::from(count) * u64::from(tile);
            let short = u64::from(count - 1) * u64::from(tile);
            u64::from(extent) <= full && u64::from(extent) > short
        };
        if !covers(track.width, columns, tile_width) || !covers(track.height, rows, tile_height) {
            return Err(StillframeError::UnsupportedFormat(format!(
                "{rows}x{columns} grid of {tile_width}x{tile_height} tiles does not fit a {}x{} image",
                track.width, track.height
            )));
        }
        Ok(grid)
    }

    fn split(&mut self) -> Result<(&mut TileFeeder, &mut TileCompositor), StillframeError> {
        let compositor = self.compositor.as_mut().ok_or_else(|| {
            StillframeError::Unsupported("no rect was selected before decoding".to_string())
        })?;
        Ok((&mut self.feeder, compositor))
    }

    fn compositor(&mut self) -> Result<&mut TileCompositor, StillframeError> {
        self.split().map(|(_, compositor)| compositor)
    }
}

impl InputHandler for TiledImagePolicy {
    fn on_input_received(
        &mut self,
        sample: &Sample,
        first_sample: bool,
    ) -> Result<InputAction, StillframeError> {
        self.feeder.on_input_received(sample, first_sample)
    }

    fn on_input_exhausted(&mut self) -> Result<(), StillframeError> {
        self.feeder.on_input_exhausted()
    }
}

impl OutputHandler for TiledImagePolicy {
    fn on_output_received(
        &mut self,
        buffer: &DecodedBuffer,
        format: &OutputFormat,
    ) -> Result<bool, StillframeError> {
        self.compositor()?.on_output_received(buffer, format)
    }
}

impl ExtractionPolicy for TiledImagePolicy {
    fn prepare(
        &mut self,
        track: &TrackDescriptor,
        request: &ExtractionRequest,
        options: &ExtractOptions,
    ) -> Result<SessionPlan, StillframeError> {
        if track.kind != TrackKind::Image {
            return Err(StillframeError::UnsupportedFormat(
                "tile composition needs an image track".to_string(),
            ));
        }
        let grid = Self::validated_grid(track)?;

        self.grid = Some(grid);
        self.size = (track.width, track.height);
        self.rotation = track.rotation;
        self.destination = request.pixel_format;
        self.threading = options.threading;

        log::debug!(
            "Planning {} image {}x{} as {}x{} grid of {}x{} tiles",
            track.codec,
            track.width,
            track.height,
            grid.rows,
            grid.columns,
            grid.tile_width,
            grid.tile_height
        );

        Ok(SessionPlan {
            seek: SeekHint::start(),
            config: SessionConfig {
                codec: track.codec.clone(),
                width: grid.tile_width,
                height: grid.tile_height,
                rotation: track.rotation,
                preferred_layout: PixelLayout::Yuv420Planar,
                surface: None,
                is_image: true,
            },
            needs_surface: false,
        })
    }

    fn extract_rect(&mut self, rect: Option<FrameRect>) -> Result<(), StillframeError> {
        if self.compositor.is_some() {
            return Err(StillframeError::Unsupported(
                "a rect was already selected".to_string(),
            ));
        }
        let grid = self.grid.ok_or_else(|| {
            StillframeError::Unsupported("image policy was not prepared".to_string())
        })?;
        let (width, height) = self.size;
        let (tile_width, tile_height) = (grid.tile_width, grid.tile_height);

        let region = match rect {
            None => FrameRect::full(width, height),
            Some(rect) => {
                rect.validate_within(width, height)?;
                let aligned = rect.left % tile_width == 0
                    && rect.top % tile_height == 0
                    && (rect.right % tile_width == 0 || rect.right == width)
                    && (rect.bottom % tile_height == 0 || rect.bottom == height);
                if !aligned {
                    return Err(rect.invalid(format!(
                        "not aligned to the {tile_width}x{tile_height} tile grid"
                    )));
                }
                rect
            }
        };

        let mut wanted = vec![false; grid.tile_count()];
        let mut offsets = Vec::new();
        for row in 0..grid.rows {
            for column in 0..grid.columns {
                let left = column * tile_width;
                let top = row * tile_height;
                let tile = FrameRect::new(
                    left,
                    top,
                    (left + tile_width).min(width),
                    (top + tile_height).min(height),
                );
                if tile.intersects(&region) {
                    wanted[(row * grid.columns + column) as usize] = true;
                    offsets.push((left - region.left, top - region.top));
                }
            }
        }

        log::debug!(
            "Rect {region} needs {} of {} tiles",
            offsets.len(),
            grid.tile_count()
        );

        self.feeder = TileFeeder {
            target: offsets.len(),
            wanted,
            ..TileFeeder::default()
        };
        self.compositor = Some(TileCompositor {
            progress: TileProgress {
                decoded: 0,
                offsets,
            },
            canvas: Canvas::new(region.width(), region.height(), self.destination),
            tile_size: (tile_width, tile_height),
            destination: self.destination,
        });
        Ok(())
    }

    fn operation(&self) -> OperationType {
        OperationType::TileComposition
    }

    fn progress_total(&self) -> Option<u64> {
        self.progress().map(|progress| progress.target() as u64)
    }

    fn extract_internal(&mut self, decode_loop: DecodeLoop<'_>) -> Result<(), StillframeError> {
        let target = self.progress().map_or(0, TileProgress::target);
        let multi_threaded = match self.threading {
            ThreadingMode::Auto => target > 1,
            ThreadingMode::SingleThreaded => false,
            ThreadingMode::MultiThreaded => true,
        };
        if !multi_threaded {
            log::debug!("Decoding {target} tile(s) on the calling thread");
            return decode_loop.run(self);
        }

        log::debug!("Decoding {target} tiles with a feeder thread");
        let (feeder, compositor) = self.split()?;
        feed_and_drain(decode_loop.input, decode_loop.output, feeder, compositor)
    }

    fn take_frame(&mut self) -> Result<OutputFrame, StillframeError> {
        let compositor = self.compositor.take().ok_or_else(|| {
            StillframeError::DecodeFailed("no tiles were composited".to_string())
        })?;
        if !compositor.progress.is_complete() {
            return Err(StillframeError::DecodeFailed(format!(
                "only {} of {} tiles were decoded",
                compositor.progress.decoded,
                compositor.progress.target()
            )));
        }

        let (tile_width, tile_height) = compositor.tile_size;
        let canvas = compositor.canvas;
        let mut frame = OutputFrame::packed(canvas.width, canvas.height, self.destination, canvas.data);
        frame.display_width = self.size.0;
        frame.display_height = self.size.1;
        frame.tile_width = tile_width;
        frame.tile_height = tile_height;
        frame.rotation = self.rotation;
        Ok(frame)
    }
}

/// Feed from a scoped thread while the calling thread drains.
///
/// The feeder reports how its side ended over `events`. Dropping the stop
/// sender tells it to quit early once the drainer is done, successful or
/// not.
fn feed_and_drain(
    mut input: InputPump<'_>,
    mut output: OutputPump<'_>,
    feeder: &mut TileFeeder,
    compositor: &mut TileCompositor,
) -> Result<(), StillframeError> {
    let (event_sender, events) = crossbeam_channel::bounded::<Result<usize, StillframeError>>(1);
    let (stop_sender, stop) = crossbeam_channel::bounded::<()>(0);

    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("stillframe-feeder".to_string())
            .spawn_scoped(scope, move || {
                let result = feed(&mut input, feeder, &stop).map(|()| input.queued());
                let _ = event_sender.send(result);
            })
            .map_err(|error| {
                StillframeError::DecodeFailed(format!("could not start feeder thread: {error}"))
            })?;

        let drained = drain(&mut output, compositor, &events);
        drop(stop_sender);

        if handle.join().is_err() {
            return Err(StillframeError::DecodeFailed(
                "feeder thread panicked".to_string(),
            ));
        }
        drained
    })
}

fn feed(
    input: &mut InputPump<'_>,
    feeder: &mut TileFeeder,
    stop: &Receiver<()>,
) -> Result<(), StillframeError> {
    while input.wants_more() {
        match stop.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Disconnected) => {
                log::debug!("Feeder stopped after {} samples", input.queued());
                return Ok(());
            }
        }
        input.step(&mut *feeder)?;
    }
    Ok(())
}

fn drain(
    output: &mut OutputPump<'_>,
    compositor: &mut TileCompositor,
    events: &Receiver<Result<usize, StillframeError>>,
) -> Result<(), StillframeError> {
    loop {
        match events.try_recv() {
            Ok(Ok(queued)) => log::debug!("Feeder finished after queueing {queued} tiles"),
            Ok(Err(error)) => return Err(error),
            Err(_) => {}
        }
        if output.step(&mut *compositor)? {
            output.finish();
            return Ok(());
        }
        if output.reached_end() {
            return Err(output.incomplete());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::CodecId;

    fn policy_for(track: &TrackDescriptor) -> TiledImagePolicy {
        let mut policy = TiledImagePolicy::new();
        policy
            .prepare(track, &ExtractionRequest::new(), &ExtractOptions::default())
            .unwrap();
        policy
    }

    fn grid_track() -> TrackDescriptor {
        TrackDescriptor::image(CodecId::Hevc, 500, 300).with_grid(GridLayout::new(2, 2, 256, 256))
    }

    #[test]
    fn full_rect_targets_every_tile() {
        let mut policy = policy_for(&grid_track());
        policy.extract_rect(None).unwrap();
        let progress = policy.progress().unwrap();
        assert_eq!(progress.target(), 4);
        assert_eq!(progress.offsets(), &[(0, 0), (256, 0), (0, 256), (256, 256)]);
    }

    #[test]
    fn aligned_rect_targets_intersecting_tiles() {
        let mut policy = policy_for(&grid_track());
        policy
            .extract_rect(Some(FrameRect::new(256, 0, 500, 300)))
            .unwrap();
        let progress = policy.progress().unwrap();
        assert_eq!(progress.offsets(), &[(0, 0), (0, 256)]);
        assert_eq!(policy.feeder.wanted, vec![false, true, false, true]);
    }

    #[test]
    fn unaligned_rect_is_rejected() {
        let mut policy = policy_for(&grid_track());
        assert!(matches!(
            policy.extract_rect(Some(FrameRect::new(10, 0, 256, 256))),
            Err(StillframeError::InvalidRect { .. })
        ));
    }

    #[test]
    fn grid_that_overshoots_the_image_is_rejected() {
        let track = TrackDescriptor::image(CodecId::Hevc, 200, 200)
            .with_grid(GridLayout::new(1, 2, 256, 256));
        let mut policy = TiledImagePolicy::new();
        assert!(matches!(
            policy.prepare(&track, &ExtractionRequest::new(), &ExtractOptions::default()),
            Err(StillframeError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn feeder_finishes_on_last_target() {
        let mut feeder = TileFeeder {
            wanted: vec![false, true, true],
            target: 2,
            ..TileFeeder::default()
        };
        let sample = Sample::sync(vec![0], 0);
        assert_eq!(feeder.on_input_received(&sample, true).unwrap(), InputAction::Skip);
        assert_eq!(
            feeder.on_input_received(&sample, true).unwrap(),
            InputAction::Queue(BufferFlags::SYNC)
        );
        assert_eq!(
            feeder.on_input_received(&sample, false).unwrap(),
            InputAction::Finish(BufferFlags::SYNC)
        );
    }
}
