//! Pixel conversion and OutputFrame export tests.

use image::DynamicImage;
use stillframe::{
    CodecId, EmbeddedThumbnail, OutputFrame, PictureGeometry, PixelFormat, PixelLayout, Rotation,
    StillframeError, TrackDescriptor, convert_pixels, metadata_only,
};

fn geometry(width: u32, height: u32, layout: PixelLayout) -> PictureGeometry {
    PictureGeometry {
        width,
        height,
        stride: layout.min_stride(width),
        layout,
    }
}

/// A frame built through the public API: a raw RGB thumbnail.
fn rgb_frame(width: u32, height: u32, rotation: Rotation) -> OutputFrame {
    let data = (0..width * height)
        .flat_map(|index| [index as u8, 100, 200])
        .collect();
    let track = TrackDescriptor::video(CodecId::Avc, width, height)
        .with_rotation(rotation)
        .with_embedded_thumbnail(EmbeddedThumbnail::Raw {
            width,
            height,
            stride: width as usize * 3,
            layout: PixelLayout::Rgb24,
            data,
        });
    metadata_only(&track, PixelFormat::Rgb8, true).unwrap()
}

// ── YUV input ──────────────────────────────────────────────────────

#[test]
fn i420_gray_becomes_neutral_rgb() {
    // Mid gray luma, neutral chroma.
    let yuv = [126, 126, 126, 126, 128, 128];
    let rgb = convert_pixels(&yuv, geometry(2, 2, PixelLayout::Yuv420Planar), PixelFormat::Rgb8)
        .unwrap();

    assert_eq!(rgb.len(), 12);
    for pixel in rgb.chunks_exact(3) {
        assert_eq!(pixel[0], pixel[1]);
        assert_eq!(pixel[1], pixel[2]);
    }
}

#[test]
fn nv12_and_i420_agree_on_neutral_chroma() {
    let i420 = [16, 60, 120, 235, 128, 128];
    let nv12 = [16, 60, 120, 235, 128, 128];

    let from_i420 =
        convert_pixels(&i420, geometry(2, 2, PixelLayout::Yuv420Planar), PixelFormat::Rgba8)
            .unwrap();
    let from_nv12 =
        convert_pixels(&nv12, geometry(2, 2, PixelLayout::Nv12), PixelFormat::Rgba8).unwrap();

    assert_eq!(from_i420, from_nv12);
    assert_eq!(&from_i420[..4], &[0, 0, 0, 255]);
    assert_eq!(&from_i420[12..], &[255, 255, 255, 255]);
}

#[test]
fn odd_sized_i420_uses_rounded_up_chroma() {
    // 3x3 luma, 2x2 chroma planes.
    let mut yuv = vec![235; 9];
    yuv.extend_from_slice(&[128; 8]);
    let gray = convert_pixels(&yuv, geometry(3, 3, PixelLayout::Yuv420Planar), PixelFormat::Gray8)
        .unwrap();
    assert_eq!(gray, vec![255; 9]);
}

// ── Packed input ───────────────────────────────────────────────────

#[test]
fn bgra_input_is_swizzled() {
    let bgra = [1, 2, 3, 4];
    let rgba = convert_pixels(&bgra, geometry(1, 1, PixelLayout::Bgra32), PixelFormat::Rgba8)
        .unwrap();
    assert_eq!(rgba, vec![3, 2, 1, 4]);

    let back = convert_pixels(&bgra, geometry(1, 1, PixelLayout::Bgra32), PixelFormat::Bgra8)
        .unwrap();
    assert_eq!(back, vec![1, 2, 3, 4]);
}

#[test]
fn rgb565_output_packs_little_endian() {
    let white = convert_pixels(&[255, 255, 255], geometry(1, 1, PixelLayout::Rgb24), PixelFormat::Rgb565)
        .unwrap();
    assert_eq!(white, vec![0xff, 0xff]);

    let red = convert_pixels(&[255, 0, 0], geometry(1, 1, PixelLayout::Rgb24), PixelFormat::Rgb565)
        .unwrap();
    assert_eq!(red, vec![0x00, 0xf8]);
}

#[test]
fn row_padding_is_dropped() {
    let padded = PictureGeometry {
        width: 2,
        height: 2,
        stride: 4,
        layout: PixelLayout::Gray8,
    };
    let gray = convert_pixels(&[1, 2, 0, 0, 3, 4, 0, 0], padded, PixelFormat::Gray8).unwrap();
    assert_eq!(gray, vec![1, 2, 3, 4]);
}

// ── Invalid geometry ───────────────────────────────────────────────

#[test]
fn narrow_stride_is_rejected() {
    let geometry = PictureGeometry {
        width: 4,
        height: 1,
        stride: 3,
        layout: PixelLayout::Gray8,
    };
    let result = convert_pixels(&[0; 16], geometry, PixelFormat::Rgb8);
    assert!(matches!(result, Err(StillframeError::DecodeFailed(_))));
}

#[test]
fn short_buffer_is_rejected() {
    let result = convert_pixels(&[0; 5], geometry(2, 2, PixelLayout::Yuv420Planar), PixelFormat::Rgb8);
    assert!(matches!(result, Err(StillframeError::DecodeFailed(_))));
}

// ── OutputFrame export ─────────────────────────────────────────────

#[test]
fn to_image_keeps_layout() {
    let frame = rgb_frame(4, 2, Rotation::None);
    let image = frame.to_image().unwrap();

    assert!(matches!(image, DynamicImage::ImageRgb8(_)));
    let rgb = image.to_rgb8();
    assert_eq!(rgb.dimensions(), (4, 2));
    assert_eq!(rgb.get_pixel(3, 1).0, [7, 100, 200]);
}

#[test]
fn oriented_image_applies_rotation() {
    let frame = rgb_frame(4, 2, Rotation::Clockwise90);
    let oriented = frame.to_oriented_image().unwrap().to_rgb8();

    assert_eq!(oriented.dimensions(), (2, 4));
    // The bottom-left source pixel ends up top-left.
    assert_eq!(oriented.get_pixel(0, 0).0, [4, 100, 200]);
}

#[test]
fn save_writes_a_readable_png() {
    let frame = rgb_frame(4, 2, Rotation::Rotate180);
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("frame.png");

    frame.save(&path).unwrap();

    let reloaded = image::open(&path).unwrap().to_rgb8();
    assert_eq!(reloaded.dimensions(), (4, 2));
    assert_eq!(reloaded.get_pixel(0, 0).0, [7, 100, 200]);
}

#[test]
fn save_drops_alpha_for_jpeg() {
    let track = TrackDescriptor::video(CodecId::Avc, 2, 2).with_embedded_thumbnail(
        EmbeddedThumbnail::Raw {
            width: 2,
            height: 2,
            stride: 2,
            layout: PixelLayout::Gray8,
            data: vec![128; 4],
        },
    );
    let frame = metadata_only(&track, PixelFormat::Rgba8, true).unwrap();
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("frame.jpg");

    frame.save(&path).unwrap();
    assert!(path.exists());
}

#[test]
fn ten_bit_frames_expand_to_rgba() {
    let track = TrackDescriptor::video(CodecId::Avc, 1, 1).with_embedded_thumbnail(
        EmbeddedThumbnail::Raw {
            width: 1,
            height: 1,
            stride: 4,
            layout: PixelLayout::Rgba32,
            data: vec![255, 0, 255, 255],
        },
    );
    let frame = metadata_only(&track, PixelFormat::Rgba1010102, true).unwrap();
    assert_eq!(frame.data.len(), 4);

    let rgba = frame.to_image().unwrap().to_rgba8();
    assert_eq!(rgba.get_pixel(0, 0).0, [255, 0, 255, 255]);
}
