//! Extracted frames and canvas rectangles.
//!
//! [`OutputFrame`] is the single result of a successful extraction. It owns a
//! tightly packed pixel buffer in the requested [`PixelFormat`] and can be
//! turned into an [`image::DynamicImage`] or written straight to disk.
//! [`FrameRect`] names a sub-region of a canvas.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageBuffer, RgbImage, RgbaImage};

use crate::configuration::PixelFormat;
use crate::error::StillframeError;
use crate::track::Rotation;

/// A rectangle in canvas coordinates.
///
/// The rectangle is half-open: `left` and `top` are inclusive, `right` and
/// `bottom` are exclusive, so its width is `right - left`.
///
/// # Example
///
/// ```
/// use stillframe::FrameRect;
///
/// let rect = FrameRect::new(0, 0, 512, 256);
/// assert_eq!(rect.width(), 512);
/// assert!(rect.validate_within(1024, 1024).is_ok());
/// assert!(rect.validate_within(256, 256).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRect {
    /// Left edge (inclusive).
    pub left: u32,
    /// Top edge (inclusive).
    pub top: u32,
    /// Right edge (exclusive).
    pub right: u32,
    /// Bottom edge (exclusive).
    pub bottom: u32,
}

impl FrameRect {
    /// Create a rectangle from its four edges.
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle covering a whole `width` × `height` canvas.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Horizontal extent. Zero for degenerate rectangles.
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    /// Vertical extent. Zero for degenerate rectangles.
    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Whether this rectangle and `other` share at least one pixel.
    pub fn intersects(&self, other: &FrameRect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Check that the rectangle is non-empty and lies inside a
    /// `width` × `height` canvas.
    ///
    /// # Errors
    ///
    /// Returns [`StillframeError::InvalidRect`] otherwise.
    pub fn validate_within(&self, width: u32, height: u32) -> Result<(), StillframeError> {
        if self.left >= self.right || self.top >= self.bottom {
            return Err(self.invalid("rectangle is empty"));
        }
        if self.right > width || self.bottom > height {
            return Err(self.invalid(format!("rectangle exceeds the {width}x{height} canvas")));
        }
        Ok(())
    }

    pub(crate) fn invalid(&self, reason: impl Into<String>) -> StillframeError {
        StillframeError::InvalidRect {
            rect: *self,
            reason: reason.into(),
        }
    }
}

impl Display for FrameRect {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "[{}, {}) x [{}, {})",
            self.left, self.right, self.top, self.bottom
        )
    }
}

/// A single decoded frame or composited still image.
///
/// Produced exactly once per successful extraction. For tiled images,
/// `width`/`height` describe the composited canvas while
/// `tile_width`/`tile_height` describe one decoded tile; for everything else
/// the tile size equals the frame size.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct OutputFrame {
    /// Width of the pixel buffer.
    pub width: u32,
    /// Height of the pixel buffer.
    pub height: u32,
    /// Width of the full picture this frame was taken from. Differs from
    /// `width` when a sub-rectangle or a thumbnail was extracted.
    pub display_width: u32,
    /// Height of the full picture this frame was taken from.
    pub display_height: u32,
    /// Width of one decoded tile.
    pub tile_width: u32,
    /// Height of one decoded tile.
    pub tile_height: u32,
    /// Clockwise rotation the picture should be displayed with.
    pub rotation: Rotation,
    /// Bytes per row of `data`.
    pub stride: usize,
    /// Bytes per pixel of `data`.
    pub bytes_per_pixel: usize,
    /// Pixel layout of `data`.
    pub pixel_format: PixelFormat,
    /// Presentation timestamp of the decoded frame in microseconds, when the
    /// frame came from a timed sample.
    pub pts_us: Option<i64>,
    /// Duration of the sample that produced this frame, in microseconds.
    pub duration_us: Option<i64>,
    /// Tightly packed pixel data, `stride * height` bytes.
    pub data: Vec<u8>,
}

impl OutputFrame {
    /// Wrap a tightly packed buffer.
    pub(crate) fn packed(width: u32, height: u32, pixel_format: PixelFormat, data: Vec<u8>) -> Self {
        let bytes_per_pixel = pixel_format.bytes_per_pixel();
        debug_assert_eq!(data.len(), width as usize * height as usize * bytes_per_pixel);
        Self {
            width,
            height,
            display_width: width,
            display_height: height,
            tile_width: width,
            tile_height: height,
            rotation: Rotation::None,
            stride: width as usize * bytes_per_pixel,
            bytes_per_pixel,
            pixel_format,
            pts_us: None,
            duration_us: None,
            data,
        }
    }

    /// Borrow one row of pixels.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * self.bytes_per_pixel]
    }

    /// Borrow the bytes of the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate lies outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let start = x as usize * self.bytes_per_pixel;
        &self.row(y)[start..start + self.bytes_per_pixel]
    }

    /// Convert into an [`image::DynamicImage`] without applying rotation.
    ///
    /// BGRA, RGB565 and RGBA 10:10:10:2 buffers are expanded to the nearest
    /// 8-bit RGB(A) layout.
    ///
    /// # Errors
    ///
    /// Returns [`StillframeError::UnsupportedFormat`] if the buffer is
    /// shorter than its declared dimensions.
    pub fn to_image(&self) -> Result<DynamicImage, StillframeError> {
        let (width, height) = (self.width, self.height);
        let short = || {
            StillframeError::UnsupportedFormat(format!(
                "frame buffer of {} bytes is too small for {width}x{height} {:?}",
                self.data.len(),
                self.pixel_format
            ))
        };

        let image = match self.pixel_format {
            PixelFormat::Rgb8 => DynamicImage::ImageRgb8(
                RgbImage::from_raw(width, height, self.packed_rows()).ok_or_else(short)?,
            ),
            PixelFormat::Rgba8 => DynamicImage::ImageRgba8(
                RgbaImage::from_raw(width, height, self.packed_rows()).ok_or_else(short)?,
            ),
            PixelFormat::Gray8 => DynamicImage::ImageLuma8(
                GrayImage::from_raw(width, height, self.packed_rows()).ok_or_else(short)?,
            ),
            PixelFormat::Bgra8 | PixelFormat::Rgb565 | PixelFormat::Rgba1010102 => {
                let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
                for y in 0..height {
                    for pixel in self.row(y).chunks_exact(self.bytes_per_pixel) {
                        rgba.extend_from_slice(&self.pixel_format.unpack_rgba(pixel));
                    }
                }
                DynamicImage::ImageRgba8(
                    ImageBuffer::from_raw(width, height, rgba).ok_or_else(short)?,
                )
            }
        };
        Ok(image)
    }

    /// Convert into an [`image::DynamicImage`] with [`rotation`](Self::rotation)
    /// applied, i.e. the way the picture is meant to be displayed.
    ///
    /// # Errors
    ///
    /// Same as [`to_image`](Self::to_image).
    pub fn to_oriented_image(&self) -> Result<DynamicImage, StillframeError> {
        let image = self.to_image()?;
        Ok(match self.rotation {
            Rotation::None => image,
            Rotation::Clockwise90 => image.rotate90(),
            Rotation::Rotate180 => image.rotate180(),
            Rotation::Clockwise270 => image.rotate270(),
        })
    }

    /// Save the frame to disk. The format is inferred from the extension.
    ///
    /// # Errors
    ///
    /// Returns [`StillframeError::ImageError`] if encoding or writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), StillframeError> {
        let image = self.to_oriented_image()?;
        // JPEG and friends cannot store alpha.
        let image = if matches!(image, DynamicImage::ImageRgba8(_))
            && !has_alpha_extension(path.as_ref())
        {
            DynamicImage::ImageRgb8(image.to_rgb8())
        } else {
            image
        };
        image.save(path)?;
        Ok(())
    }

    fn packed_rows(&self) -> Vec<u8> {
        let row_bytes = self.width as usize * self.bytes_per_pixel;
        if self.stride == row_bytes {
            return self.data[..row_bytes * self.height as usize].to_vec();
        }
        let mut buffer = Vec::with_capacity(row_bytes * self.height as usize);
        for y in 0..self.height {
            buffer.extend_from_slice(self.row(y));
        }
        buffer
    }
}

fn has_alpha_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            matches!(
                extension.to_ascii_lowercase().as_str(),
                "png" | "webp" | "tiff" | "tif" | "tga" | "ico"
            )
        })
}
