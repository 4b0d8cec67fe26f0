//! Shared test utilities for the pixgraph test suite.
//!
//! Every fixture is synthesized in memory: solid and gradient images,
//! encoded files, EXIF orientation blobs spliced into JPEG and PNG bytes,
//! and multi-frame GIF/APNG animations, including frame-differenced ones.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let jpeg = inject_jpeg_exif(&encode(&quadrants(64, 32), ImageFormat::Jpeg), 6);
//! let image = Image::new(&registry, file_state(StateType::JPEG_FILE, jpeg));
//! ```

use image::metadata::Orientation;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;

use crate::backends::files::FileState;
use crate::state::{ImageState, StateType};

// =========================================================================
// Images
// =========================================================================

pub fn solid_rgb(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
}

pub fn solid_rgba(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
}

/// Smooth gradient; compresses well at high quality and badly at low.
pub fn gradient_rgb(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

pub const RED: [u8; 3] = [255, 0, 0];
pub const GREEN: [u8; 3] = [0, 255, 0];
pub const BLUE: [u8; 3] = [0, 0, 255];
pub const WHITE: [u8; 3] = [255, 255, 255];

/// Four saturated quadrants: red top-left, green top-right, blue
/// bottom-left, white bottom-right. Survives JPEG when blocks are 16-aligned.
pub fn quadrants(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        let right = x >= width / 2;
        let bottom = y >= height / 2;
        Rgb(match (right, bottom) {
            (false, false) => RED,
            (true, false) => GREEN,
            (false, true) => BLUE,
            (true, true) => WHITE,
        })
    }))
}

/// Colour of the quadrant containing `(x, y)` in [`quadrants`].
pub fn quadrant_color(width: u32, height: u32, x: u32, y: u32) -> [u8; 3] {
    match (x >= width / 2, y >= height / 2) {
        (false, false) => RED,
        (true, false) => GREEN,
        (false, true) => BLUE,
        (true, true) => WHITE,
    }
}

/// Assert two colours are within `tolerance` per channel.
pub fn assert_close(actual: [u8; 3], expected: [u8; 3], tolerance: u8, context: &str) {
    for c in 0..3 {
        let diff = actual[c].abs_diff(expected[c]);
        assert!(
            diff <= tolerance,
            "{context}: got {actual:?}, expected {expected:?} (channel {c} off by {diff})"
        );
    }
}

/// Small lossless image with a distinct value at every pixel, non-square.
pub fn upright_reference() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(5, 3, |x, y| {
        Rgb([(x * 50) as u8, (y * 100) as u8, (x + y * 5) as u8])
    }))
}

/// Produce the pixels a camera would store for `upright` tagged with
/// `orientation`, by direct coordinate mapping.
pub fn store_with_orientation(upright: &DynamicImage, orientation: Orientation) -> DynamicImage {
    let u = upright.to_rgb8();
    let (w, h) = u.dimensions();
    let px = |x: u32, y: u32| *u.get_pixel(x, y);
    let stored = match orientation {
        Orientation::NoTransforms => u.clone(),
        Orientation::FlipHorizontal => RgbImage::from_fn(w, h, |x, y| px(w - 1 - x, y)),
        Orientation::Rotate180 => RgbImage::from_fn(w, h, |x, y| px(w - 1 - x, h - 1 - y)),
        Orientation::FlipVertical => RgbImage::from_fn(w, h, |x, y| px(x, h - 1 - y)),
        Orientation::Rotate90FlipH => RgbImage::from_fn(h, w, |x, y| px(y, x)),
        Orientation::Rotate90 => RgbImage::from_fn(h, w, |x, y| px(w - 1 - y, x)),
        Orientation::Rotate270FlipH => {
            RgbImage::from_fn(h, w, |x, y| px(w - 1 - y, h - 1 - x))
        }
        Orientation::Rotate270 => RgbImage::from_fn(h, w, |x, y| px(y, h - 1 - x)),
    };
    DynamicImage::ImageRgb8(stored)
}

// =========================================================================
// Encoded files
// =========================================================================

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap_or_else(|e| panic!("encoding fixture as {format:?} failed: {e}"));
    bytes
}

pub fn file_state(state_type: StateType, bytes: Vec<u8>) -> Box<dyn ImageState> {
    Box::new(FileState::from_bytes(state_type, bytes))
}

/// Animated GIF with one solid full-canvas frame per colour.
pub fn gif_bytes(width: u32, height: u32, colors: &[[u8; 4]]) -> Vec<u8> {
    use image::codecs::gif::{GifEncoder, Repeat};
    use image::{Delay, Frame};

    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut bytes);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        let frames = colors.iter().map(|&c| {
            Frame::from_parts(
                RgbaImage::from_pixel(width, height, Rgba(c)),
                0,
                0,
                Delay::from_numer_denom_ms(100, 1),
            )
        });
        encoder.encode_frames(frames).unwrap();
    }
    bytes
}

/// Two-frame GIF: a solid `base` canvas, then a `patch_size` square of
/// `patch` stored at (`left`, `top`) as a frame-differenced sub-image.
pub fn gif_with_patch(
    width: u32,
    height: u32,
    base: [u8; 4],
    patch: [u8; 4],
    (left, top, patch_size): (u16, u16, u32),
) -> Vec<u8> {
    use image::codecs::gif::{GifEncoder, Repeat};
    use image::{Delay, Frame};

    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut bytes);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        let frame = |buffer| Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(100, 1));
        encoder
            .encode_frame(frame(RgbaImage::from_pixel(width, height, Rgba(base))))
            .unwrap();
        encoder
            .encode_frame(frame(RgbaImage::from_pixel(patch_size, patch_size, Rgba(patch))))
            .unwrap();
    }
    // The encoder places every image at the origin; move the second one.
    let descriptor = gif_image_descriptors(&bytes)[1];
    bytes[descriptor + 1..descriptor + 3].copy_from_slice(&left.to_le_bytes());
    bytes[descriptor + 3..descriptor + 5].copy_from_slice(&top.to_le_bytes());
    bytes
}

/// Offsets of every image descriptor (`0x2C`) in a GIF stream.
fn gif_image_descriptors(gif: &[u8]) -> Vec<usize> {
    fn skip_sub_blocks(gif: &[u8], mut pos: usize) -> usize {
        while gif[pos] != 0 {
            pos += gif[pos] as usize + 1;
        }
        pos + 1
    }
    let color_table = |flags: u8| -> usize {
        if flags & 0x80 != 0 {
            3 << ((flags & 0x07) + 1)
        } else {
            0
        }
    };

    // header (6) + logical screen descriptor (7)
    let mut pos = 13 + color_table(gif[10]);
    let mut found = Vec::new();
    loop {
        match gif[pos] {
            0x21 => pos = skip_sub_blocks(gif, pos + 2),
            0x2C => {
                found.push(pos);
                // descriptor (10) + color table + LZW minimum code size (1)
                pos = skip_sub_blocks(gif, pos + 10 + color_table(gif[pos + 9]) + 1);
            }
            0x3B => return found,
            other => panic!("unexpected GIF block {other:#04x} at {pos}"),
        }
    }
}

/// Animated PNG with one solid frame per colour.
pub fn apng_bytes(width: u32, height: u32, colors: &[[u8; 4]]) -> Vec<u8> {
    let mut bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut bytes, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_animated(colors.len() as u32, 0).unwrap();
        let mut writer = encoder.write_header().unwrap();
        for &c in colors {
            let frame = RgbaImage::from_pixel(width, height, Rgba(c));
            writer.write_image_data(frame.as_raw()).unwrap();
        }
        writer.finish().unwrap();
    }
    bytes
}

// =========================================================================
// EXIF splicing
// =========================================================================

/// TIFF structure holding a single IFD0 entry: Orientation = `value`.
pub fn exif_orientation_blob(value: u16, big_endian: bool) -> Vec<u8> {
    let u16b = |v: u16| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
    let u32b = |v: u32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };

    let mut blob = Vec::new();
    blob.extend_from_slice(if big_endian { b"MM" } else { b"II" });
    blob.extend_from_slice(&u16b(42));
    blob.extend_from_slice(&u32b(8));
    // IFD0: one entry
    blob.extend_from_slice(&u16b(1));
    blob.extend_from_slice(&u16b(0x0112));
    blob.extend_from_slice(&u16b(3));
    blob.extend_from_slice(&u32b(1));
    blob.extend_from_slice(&u16b(value));
    blob.extend_from_slice(&[0, 0]);
    // no next IFD
    blob.extend_from_slice(&u32b(0));
    blob
}

/// Insert an APP1/Exif segment carrying `orientation` right after SOI.
pub fn inject_jpeg_exif(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "not a JPEG");
    let mut payload = b"Exif\0\0".to_vec();
    payload.extend(exif_orientation_blob(orientation, true));
    let seg_len = (payload.len() + 2) as u16;

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&seg_len.to_be_bytes());
    out.extend(payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Insert an `eXIf` chunk carrying `orientation` right after IHDR.
pub fn inject_png_exif(png: &[u8], orientation: u16) -> Vec<u8> {
    // signature (8) + IHDR chunk (4 + 4 + 13 + 4)
    const AFTER_IHDR: usize = 33;
    let data = exif_orientation_blob(orientation, false);
    let mut chunk = (data.len() as u32).to_be_bytes().to_vec();
    let mut typed = b"eXIf".to_vec();
    typed.extend(&data);
    chunk.extend(&typed);
    chunk.extend_from_slice(&crc32(&typed).to_be_bytes());

    let mut out = png[..AFTER_IHDR].to_vec();
    out.extend(chunk);
    out.extend_from_slice(&png[AFTER_IHDR..]);
    out
}

/// A lossless PNG of [`upright_reference`] tagged with `orientation`.
pub fn png_with_exif(orientation: u16) -> Vec<u8> {
    inject_png_exif(&encode(&upright_reference(), ImageFormat::Png), orientation)
}

/// CRC-32 (IEEE) as used by PNG chunks.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

#[test]
fn crc32_matches_known_vector() {
    assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    assert_eq!(crc32(b"IEND"), 0xAE42_6082);
}
