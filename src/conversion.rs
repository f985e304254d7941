//! CPU pixel conversion.
//!
//! Decoders hand back pictures in whatever layout suits them, usually planar
//! YUV 4:2:0. This module turns those buffers into tightly packed pixels of
//! the requested [`PixelFormat`].
//!
//! Planar layouts are contiguous in one buffer: the luma plane (`stride`
//! bytes per row, `height` rows) is followed by the chroma plane(s). For
//! [`PixelLayout::Yuv420Planar`] each chroma plane has `(stride + 1) / 2`
//! bytes per row and `(height + 1) / 2` rows, U before V. For
//! [`PixelLayout::Nv12`] a single interleaved UV plane follows with `stride`
//! bytes per row.

use crate::configuration::PixelFormat;
use crate::error::StillframeError;

/// Memory layout of a decoded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelLayout {
    /// Planar Y, U, V with 2×2 chroma subsampling (I420).
    #[default]
    Yuv420Planar,
    /// Planar Y followed by interleaved UV with 2×2 subsampling.
    Nv12,
    /// Packed 8-bit R, G, B.
    Rgb24,
    /// Packed 8-bit R, G, B, A.
    Rgba32,
    /// Packed 8-bit B, G, R, A.
    Bgra32,
    /// Single 8-bit luma plane.
    Gray8,
}

impl PixelLayout {
    /// Smallest valid stride (bytes per row of the first plane) for a
    /// picture `width` pixels wide.
    pub fn min_stride(self, width: u32) -> usize {
        let width = width as usize;
        match self {
            PixelLayout::Yuv420Planar | PixelLayout::Nv12 | PixelLayout::Gray8 => width,
            PixelLayout::Rgb24 => width * 3,
            PixelLayout::Rgba32 | PixelLayout::Bgra32 => width * 4,
        }
    }

    /// Number of bytes a picture of this layout occupies.
    pub fn buffer_len(self, height: u32, stride: usize) -> usize {
        let height = height as usize;
        let chroma_rows = height.div_ceil(2);
        match self {
            PixelLayout::Yuv420Planar => stride * height + 2 * stride.div_ceil(2) * chroma_rows,
            PixelLayout::Nv12 => stride * height + stride * chroma_rows,
            PixelLayout::Rgb24 | PixelLayout::Rgba32 | PixelLayout::Bgra32 | PixelLayout::Gray8 => {
                stride * height
            }
        }
    }

    /// The destination format that needs no conversion from this layout.
    fn identity_format(self) -> Option<PixelFormat> {
        match self {
            PixelLayout::Rgb24 => Some(PixelFormat::Rgb8),
            PixelLayout::Rgba32 => Some(PixelFormat::Rgba8),
            PixelLayout::Bgra32 => Some(PixelFormat::Bgra8),
            PixelLayout::Gray8 => Some(PixelFormat::Gray8),
            PixelLayout::Yuv420Planar | PixelLayout::Nv12 => None,
        }
    }
}

/// Geometry of a buffer handed to [`convert_pixels`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureGeometry {
    /// Picture width in pixels.
    pub width: u32,
    /// Picture height in pixels.
    pub height: u32,
    /// Bytes per row of the first plane.
    pub stride: usize,
    /// Memory layout.
    pub layout: PixelLayout,
}

/// Convert a decoded picture into tightly packed pixels of `format`.
///
/// YUV input is interpreted as BT.601 limited range.
///
/// # Errors
///
/// Returns [`StillframeError::DecodeFailed`] if the stride is smaller than a
/// row or the buffer is shorter than the geometry requires.
///
/// # Example
///
/// ```
/// use stillframe::{PixelFormat, PixelLayout, convert_pixels, PictureGeometry};
///
/// // A 2x2 white I420 picture: four luma bytes, one U and one V byte.
/// let yuv = [235, 235, 235, 235, 128, 128];
/// let geometry = PictureGeometry { width: 2, height: 2, stride: 2, layout: PixelLayout::Yuv420Planar };
/// let rgb = convert_pixels(&yuv, geometry, PixelFormat::Rgb8)?;
/// assert_eq!(rgb, vec![255; 12]);
/// # Ok::<(), stillframe::StillframeError>(())
/// ```
pub fn convert_pixels(
    source: &[u8],
    geometry: PictureGeometry,
    format: PixelFormat,
) -> Result<Vec<u8>, StillframeError> {
    let PictureGeometry {
        width,
        height,
        stride,
        layout,
    } = geometry;

    if width == 0 || height == 0 {
        return Err(StillframeError::DecodeFailed(format!(
            "cannot convert an empty {width}x{height} picture"
        )));
    }
    if stride < layout.min_stride(width) {
        return Err(StillframeError::DecodeFailed(format!(
            "stride {stride} is too small for a {width} pixel wide {layout:?} picture"
        )));
    }
    let required = layout.buffer_len(height, stride);
    if source.len() < required {
        return Err(StillframeError::DecodeFailed(format!(
            "{layout:?} buffer holds {} bytes, {width}x{height} needs {required}",
            source.len()
        )));
    }

    let (width, height) = (width as usize, height as usize);
    let bytes_per_pixel = format.bytes_per_pixel();
    let row_bytes = width * bytes_per_pixel;
    let mut output = vec![0u8; row_bytes * height];

    if layout.identity_format() == Some(format) {
        for (y, row) in output.chunks_exact_mut(row_bytes).enumerate() {
            row.copy_from_slice(&source[y * stride..y * stride + row_bytes]);
        }
        return Ok(output);
    }

    let chroma_stride = stride.div_ceil(2);
    let chroma_rows = height.div_ceil(2);
    let luma_len = stride * height;

    for (y, row) in output.chunks_exact_mut(row_bytes).enumerate() {
        for (x, out) in row.chunks_exact_mut(bytes_per_pixel).enumerate() {
            let rgba = match layout {
                PixelLayout::Yuv420Planar => {
                    let chroma = (y / 2) * chroma_stride + x / 2;
                    let u = source[luma_len + chroma];
                    let v = source[luma_len + chroma_stride * chroma_rows + chroma];
                    yuv_to_rgba(source[y * stride + x], u, v)
                }
                PixelLayout::Nv12 => {
                    let chroma = luma_len + (y / 2) * stride + (x / 2) * 2;
                    yuv_to_rgba(source[y * stride + x], source[chroma], source[chroma + 1])
                }
                PixelLayout::Rgb24 => {
                    let p = &source[y * stride + x * 3..];
                    [p[0], p[1], p[2], 255]
                }
                PixelLayout::Rgba32 => {
                    let p = &source[y * stride + x * 4..];
                    [p[0], p[1], p[2], p[3]]
                }
                PixelLayout::Bgra32 => {
                    let p = &source[y * stride + x * 4..];
                    [p[2], p[1], p[0], p[3]]
                }
                PixelLayout::Gray8 => {
                    let luma = source[y * stride + x];
                    [luma, luma, luma, 255]
                }
            };
            format.pack_rgba(rgba, out);
        }
    }

    Ok(output)
}

/// A packed destination picture that blocks are pasted into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Canvas {
    pub(crate) data: Vec<u8>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) bytes_per_pixel: usize,
}

impl Canvas {
    /// A zero-filled canvas.
    pub(crate) fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let bytes_per_pixel = format.bytes_per_pixel();
        Self {
            data: vec![0; width as usize * height as usize * bytes_per_pixel],
            width,
            height,
            bytes_per_pixel,
        }
    }

    /// Copy the top-left `extent` of a packed block that is `block_size`
    /// pixels large to `origin`, clipping whatever falls outside the canvas.
    pub(crate) fn paste(
        &mut self,
        block: &[u8],
        block_size: (u32, u32),
        origin: (u32, u32),
        extent: (u32, u32),
    ) {
        let (left, top) = origin;
        if left >= self.width || top >= self.height {
            return;
        }
        let copy_width = block_size.0.min(extent.0).min(self.width - left) as usize;
        let copy_height = block_size.1.min(extent.1).min(self.height - top) as usize;
        let copy_bytes = copy_width * self.bytes_per_pixel;
        let block_stride = block_size.0 as usize * self.bytes_per_pixel;
        let canvas_stride = self.width as usize * self.bytes_per_pixel;

        for row in 0..copy_height {
            let src = row * block_stride;
            let dst = (top as usize + row) * canvas_stride + left as usize * self.bytes_per_pixel;
            self.data[dst..dst + copy_bytes].copy_from_slice(&block[src..src + copy_bytes]);
        }
    }
}

fn yuv_to_rgba(y: u8, u: u8, v: u8) -> [u8; 4] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |value: i32| value.clamp(0, 255) as u8;
    [
        clamp((298 * c + 409 * e + 128) >> 8),
        clamp((298 * c - 100 * d - 208 * e + 128) >> 8),
        clamp((298 * c + 516 * d + 128) >> 8),
        255,
    ]
}
