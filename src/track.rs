//! Track metadata consumed by the engine.
//!
//! A [`TrackDescriptor`] is produced by whatever parses the container (the
//! `ffmpeg` feature ships [`probe_track`](crate::ffmpeg::probe_track)) and is
//! only ever borrowed by the engine for the duration of one extraction.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

use crate::conversion::PixelLayout;
use crate::error::StillframeError;

/// Compressed bitstream format of a track.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CodecId {
    /// H.264 / AVC.
    Avc,
    /// H.265 / HEVC (also the usual HEIF image codec).
    Hevc,
    /// AV1 (also the AVIF image codec).
    Av1,
    /// VP9.
    Vp9,
    /// VP8.
    Vp8,
    /// MPEG-4 Part 2.
    Mpeg4,
    /// JPEG / Motion JPEG.
    Jpeg,
    /// Any other codec, by name.
    Other(String),
}

impl CodecId {
    /// Whether a single sync sample of this codec is known to decode to a
    /// complete picture on its own (an IDR picture).
    pub(crate) fn has_idr_pictures(&self) -> bool {
        matches!(self, CodecId::Avc | CodecId::Hevc)
    }
}

impl Display for CodecId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CodecId::Avc => f.write_str("avc"),
            CodecId::Hevc => f.write_str("hevc"),
            CodecId::Av1 => f.write_str("av1"),
            CodecId::Vp9 => f.write_str("vp9"),
            CodecId::Vp8 => f.write_str("vp8"),
            CodecId::Mpeg4 => f.write_str("mpeg4"),
            CodecId::Jpeg => f.write_str("jpeg"),
            CodecId::Other(name) => f.write_str(name),
        }
    }
}

/// Whether a track is a timed sequence or a still image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// A timed sequence of frames.
    Video,
    /// A still image, possibly stored as a grid of tiles.
    Image,
}

/// Clockwise display rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    /// Display as stored.
    #[default]
    None,
    /// Rotate 90° clockwise.
    Clockwise90,
    /// Rotate 180°.
    Rotate180,
    /// Rotate 270° clockwise.
    Clockwise270,
}

impl Rotation {
    /// Parse a rotation in degrees. Negative angles and multiples of 360 are
    /// normalised.
    ///
    /// # Errors
    ///
    /// Returns [`StillframeError::UnsupportedFormat`] for angles that are not
    /// a multiple of 90.
    pub fn from_degrees(degrees: i32) -> Result<Self, StillframeError> {
        match degrees.rem_euclid(360) {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Clockwise90),
            180 => Ok(Rotation::Rotate180),
            270 => Ok(Rotation::Clockwise270),
            _ => Err(StillframeError::UnsupportedFormat(format!(
                "rotation of {degrees} degrees"
            ))),
        }
    }

    /// The rotation in degrees.
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Clockwise270 => 270,
        }
    }
}

/// Tile grid of a still image.
///
/// Tiles are stored row-major: tile `i` sits at row `i / columns`, column
/// `i % columns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridLayout {
    /// Number of tile rows.
    pub rows: u32,
    /// Number of tile columns.
    pub columns: u32,
    /// Width of every tile.
    pub tile_width: u32,
    /// Height of every tile.
    pub tile_height: u32,
}

impl GridLayout {
    /// Describe a `rows` × `columns` grid of `tile_width` × `tile_height`
    /// tiles.
    pub fn new(rows: u32, columns: u32, tile_width: u32, tile_height: u32) -> Self {
        Self {
            rows,
            columns,
            tile_width,
            tile_height,
        }
    }

    /// Total number of tiles.
    pub fn tile_count(&self) -> usize {
        self.rows as usize * self.columns as usize
    }
}

/// A low-resolution picture carried in the track's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddedThumbnail {
    /// Uncompressed pixels.
    Raw {
        /// Picture width.
        width: u32,
        /// Picture height.
        height: u32,
        /// Bytes per row of the first plane.
        stride: usize,
        /// Memory layout of `data`.
        layout: PixelLayout,
        /// Pixel bytes.
        data: Vec<u8>,
    },
    /// A compressed still (JPEG, PNG, ...) that the `image` crate can read.
    Encoded(Vec<u8>),
}

/// Read-only description of the track being extracted from.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use stillframe::{CodecId, GridLayout, TrackDescriptor};
///
/// let video = TrackDescriptor::video(CodecId::Avc, 1920, 1080)
///     .with_duration(Duration::from_secs(12))
///     .with_frame_rate(25.0);
///
/// let heif = TrackDescriptor::image(CodecId::Hevc, 1024, 768)
///     .with_grid(GridLayout::new(3, 4, 256, 256));
/// assert_eq!(heif.grid.unwrap().tile_count(), 12);
/// # let _ = video;
/// ```
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct TrackDescriptor {
    /// Codec of the compressed samples.
    pub codec: CodecId,
    /// Timed sequence or still image.
    pub kind: TrackKind,
    /// Picture width (the full canvas for tiled images).
    pub width: u32,
    /// Picture height (the full canvas for tiled images).
    pub height: u32,
    /// Track duration.
    pub duration: Duration,
    /// Duration to assume for samples that carry none, in microseconds.
    pub default_sample_duration_us: Option<i64>,
    /// Nominal frame rate.
    pub frame_rate: Option<f64>,
    /// Display rotation.
    pub rotation: Rotation,
    /// Preferred thumbnail time in microseconds, used when no target is
    /// requested.
    pub thumbnail_time_us: Option<i64>,
    /// Tile layout for grid images.
    pub grid: Option<GridLayout>,
    /// Embedded preview picture, if the container carries one.
    pub embedded_thumbnail: Option<EmbeddedThumbnail>,
}

impl TrackDescriptor {
    fn new(codec: CodecId, kind: TrackKind, width: u32, height: u32) -> Self {
        Self {
            codec,
            kind,
            width,
            height,
            duration: Duration::ZERO,
            default_sample_duration_us: None,
            frame_rate: None,
            rotation: Rotation::None,
            thumbnail_time_us: None,
            grid: None,
            embedded_thumbnail: None,
        }
    }

    /// Describe a video track.
    pub fn video(codec: CodecId, width: u32, height: u32) -> Self {
        Self::new(codec, TrackKind::Video, width, height)
    }

    /// Describe a still-image track.
    pub fn image(codec: CodecId, width: u32, height: u32) -> Self {
        Self::new(codec, TrackKind::Image, width, height)
    }

    /// Set the track duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the duration assumed for samples without one.
    pub fn with_default_sample_duration_us(mut self, duration_us: i64) -> Self {
        self.default_sample_duration_us = Some(duration_us);
        self
    }

    /// Set the nominal frame rate.
    pub fn with_frame_rate(mut self, frames_per_second: f64) -> Self {
        self.frame_rate = Some(frames_per_second);
        self
    }

    /// Set the display rotation.
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set the preferred thumbnail time.
    pub fn with_thumbnail_time_us(mut self, time_us: i64) -> Self {
        self.thumbnail_time_us = Some(time_us);
        self
    }

    /// Declare a tile grid.
    pub fn with_grid(mut self, grid: GridLayout) -> Self {
        self.grid = Some(grid);
        self
    }

    /// Attach an embedded preview picture.
    pub fn with_embedded_thumbnail(mut self, thumbnail: EmbeddedThumbnail) -> Self {
        self.embedded_thumbnail = Some(thumbnail);
        self
    }

    /// Width and height as displayed, i.e. swapped for quarter-turn
    /// rotations.
    pub fn display_dimensions(&self) -> (u32, u32) {
        match self.rotation {
            Rotation::Clockwise90 | Rotation::Clockwise270 => (self.height, self.width),
            Rotation::None | Rotation::Rotate180 => (self.width, self.height),
        }
    }

    /// Check the fields every extraction kind relies on.
    pub(crate) fn validate_common(&self) -> Result<(), StillframeError> {
        if let CodecId::Other(name) = &self.codec {
            if name.trim().is_empty() {
                return Err(StillframeError::UnsupportedFormat(
                    "track has no codec".to_string(),
                ));
            }
        }
        if self.width == 0 || self.height == 0 {
            return Err(StillframeError::UnsupportedFormat(format!(
                "track has invalid dimensions {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}
