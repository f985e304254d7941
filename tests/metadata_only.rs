//! Embedded thumbnail decoding, no decoder session involved.

use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use stillframe::{
    CodecId, EmbeddedThumbnail, PixelFormat, PixelLayout, Rotation, StillframeError,
    TrackDescriptor, VideoFrameDecoder, metadata_only,
};

fn raw_thumbnail() -> EmbeddedThumbnail {
    // 2x2 RGB with one padding byte per row.
    EmbeddedThumbnail::Raw {
        width: 2,
        height: 2,
        stride: 7,
        layout: PixelLayout::Rgb24,
        data: vec![
            255, 0, 0, 0, 255, 0, 0, //
            0, 0, 255, 9, 9, 9, 0,
        ],
    }
}

fn png_thumbnail() -> EmbeddedThumbnail {
    let picture = RgbImage::from_fn(3, 2, |x, _| Rgb([x as u8 * 100, 50, 25]));
    let mut bytes = Cursor::new(Vec::new());
    picture.write_to(&mut bytes, ImageFormat::Png).unwrap();
    EmbeddedThumbnail::Encoded(bytes.into_inner())
}

// ── Raw thumbnails ─────────────────────────────────────────────────

#[test]
fn raw_thumbnail_is_converted() {
    let track =
        TrackDescriptor::video(CodecId::Avc, 1920, 1080).with_embedded_thumbnail(raw_thumbnail());

    let frame = metadata_only(&track, PixelFormat::Rgba8, true).unwrap();

    assert_eq!((frame.width, frame.height), (2, 2));
    assert_eq!((frame.display_width, frame.display_height), (2, 2));
    assert_eq!(frame.pixel(0, 0), &[255, 0, 0, 255]);
    assert_eq!(frame.pixel(1, 0), &[0, 255, 0, 255]);
    assert_eq!(frame.pixel(1, 1), &[9, 9, 9, 255]);
    assert_eq!(frame.pts_us, None);
}

#[test]
fn preview_reports_track_display_size() {
    let track = TrackDescriptor::video(CodecId::Avc, 1920, 1080)
        .with_rotation(Rotation::Clockwise90)
        .with_embedded_thumbnail(raw_thumbnail());

    let frame = metadata_only(&track, PixelFormat::Rgb8, false).unwrap();

    assert_eq!((frame.width, frame.height), (2, 2));
    assert_eq!((frame.display_width, frame.display_height), (1080, 1920));
    assert_eq!(frame.rotation, Rotation::Clockwise90);
}

#[test]
fn decoder_alias_matches_free_function() {
    let track =
        TrackDescriptor::image(CodecId::Hevc, 64, 64).with_embedded_thumbnail(raw_thumbnail());

    let direct = metadata_only(&track, PixelFormat::Gray8, true).unwrap();
    let via_decoder = VideoFrameDecoder::metadata_only(&track, PixelFormat::Gray8, true).unwrap();
    assert_eq!(direct, via_decoder);
    assert_eq!(direct.bytes_per_pixel, 1);
}

// ── Encoded thumbnails ─────────────────────────────────────────────

#[test]
fn encoded_thumbnail_is_decoded() {
    let track =
        TrackDescriptor::video(CodecId::Hevc, 640, 480).with_embedded_thumbnail(png_thumbnail());

    let frame = metadata_only(&track, PixelFormat::Rgb8, true).unwrap();

    assert_eq!((frame.width, frame.height), (3, 2));
    assert_eq!(frame.pixel(0, 0), &[0, 50, 25]);
    assert_eq!(frame.pixel(2, 1), &[200, 50, 25]);
}

#[test]
fn corrupt_encoded_thumbnail_is_an_image_error() {
    let track = TrackDescriptor::video(CodecId::Hevc, 640, 480)
        .with_embedded_thumbnail(EmbeddedThumbnail::Encoded(vec![0xde, 0xad, 0xbe, 0xef]));

    let result = metadata_only(&track, PixelFormat::Rgb8, true);
    assert!(matches!(result, Err(StillframeError::ImageError(_))));
}

// ── Missing thumbnails ─────────────────────────────────────────────

#[test]
fn track_without_thumbnail_has_no_embedded_frame() {
    let track = TrackDescriptor::video(CodecId::Avc, 1920, 1080);

    let result = metadata_only(&track, PixelFormat::Rgb8, true);
    assert!(matches!(result, Err(StillframeError::NoEmbeddedFrame)));
}

#[test]
fn empty_raw_thumbnail_is_rejected() {
    let track = TrackDescriptor::video(CodecId::Avc, 1920, 1080).with_embedded_thumbnail(
        EmbeddedThumbnail::Raw {
            width: 0,
            height: 2,
            stride: 0,
            layout: PixelLayout::Rgb24,
            data: Vec::new(),
        },
    );

    let result = metadata_only(&track, PixelFormat::Rgb8, true);
    assert!(matches!(result, Err(StillframeError::DecodeFailed(_))));
}

#[test]
fn short_raw_thumbnail_is_rejected() {
    let track = TrackDescriptor::video(CodecId::Avc, 1920, 1080).with_embedded_thumbnail(
        EmbeddedThumbnail::Raw {
            width: 4,
            height: 4,
            stride: 4,
            layout: PixelLayout::Gray8,
            data: vec![0; 8],
        },
    );

    let result = metadata_only(&track, PixelFormat::Rgb8, true);
    assert!(matches!(result, Err(StillframeError::DecodeFailed(_))));
}
