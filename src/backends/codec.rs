//! Encoding and pixel plumbing shared by the `image`-crate backends.
//!
//! Every save goes through a disposable copy of the source pixels, so none
//! of these functions can mutate the state they encode.

use crate::state::{ChannelOrder, PixelBuffer, Quality, Size, StateError, StateType};
use image::codecs::bmp::BmpEncoder;
use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::codecs::png::{PngDecoder, PngEncoder};
use image::metadata::Orientation;
use image::{DynamicImage, Frame, ImageDecoder, ImageFormat, RgbImage, RgbaImage};
use std::io::{Cursor, Write};

/// The container format behind a file state type.
pub fn file_format(state: StateType) -> Option<ImageFormat> {
    match state {
        StateType::JPEG_FILE => Some(ImageFormat::Jpeg),
        StateType::PNG_FILE => Some(ImageFormat::Png),
        StateType::GIF_FILE => Some(ImageFormat::Gif),
        StateType::BMP_FILE => Some(ImageFormat::Bmp),
        _ => None,
    }
}

/// Stored EXIF orientation of an encoded file, as its decoder reports it.
///
/// A missing, undefined or unreadable tag reads as normal.
pub(crate) fn stored_orientation(bytes: &[u8], state: StateType) -> Orientation {
    let read = match state {
        StateType::JPEG_FILE => {
            JpegDecoder::new(Cursor::new(bytes)).and_then(|mut decoder| decoder.orientation())
        }
        StateType::PNG_FILE => {
            PngDecoder::new(Cursor::new(bytes)).and_then(|mut decoder| decoder.orientation())
        }
        _ => return Orientation::NoTransforms,
    };
    read.unwrap_or_else(|e| {
        log::debug!("{state}: orientation unreadable, assuming normal: {e}");
        Orientation::NoTransforms
    })
}

/// Decode a single still image in the format `state` names.
pub(crate) fn decode_still(bytes: &[u8], state: StateType) -> Result<DynamicImage, StateError> {
    let format = file_format(state).ok_or_else(|| StateError::InvalidArgument {
        operation: "open",
        message: format!("{state} is not an encoded file state"),
    })?;
    image::load_from_memory_with_format(bytes, format).map_err(|e| StateError::decode("open", e))
}

pub(crate) fn encode_jpeg(
    image: &DynamicImage,
    sink: &mut dyn Write,
    quality: Quality,
) -> Result<(), StateError> {
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    rgb.write_with_encoder(JpegEncoder::new_with_quality(sink, quality.value()))
        .map_err(|e| StateError::encode("save_as_jpeg", e))
}

pub(crate) fn encode_png(image: &DynamicImage, sink: &mut dyn Write) -> Result<(), StateError> {
    image
        .write_with_encoder(PngEncoder::new(sink))
        .map_err(|e| StateError::encode("save_as_png", e))
}

pub(crate) fn encode_bmp(image: &DynamicImage, mut sink: &mut dyn Write) -> Result<(), StateError> {
    let flat = if image.color().has_alpha() {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    };
    flat.write_with_encoder(BmpEncoder::new(&mut sink))
        .map_err(|e| StateError::encode("save_as_bmp", e))
}

/// Write `frames` as a looping GIF with their original delays.
pub(crate) fn encode_gif(frames: Vec<Frame>, sink: &mut dyn Write) -> Result<(), StateError> {
    let encode = |e| StateError::encode("save_as_gif", e);
    let mut encoder = GifEncoder::new(sink);
    encoder.set_repeat(Repeat::Infinite).map_err(encode)?;
    encoder.encode_frames(frames).map_err(encode)
}

pub(crate) fn image_size(image: &DynamicImage) -> Size {
    Size::new(image.width(), image.height())
}

/// Flatten a decoded image into a buffer of the requested channel order.
pub(crate) fn to_pixel_buffer(
    image: &DynamicImage,
    order: ChannelOrder,
) -> Result<PixelBuffer, StateError> {
    let pixels = match order {
        ChannelOrder::Rgb => image.to_rgb8().into_raw(),
        ChannelOrder::Rgba => image.to_rgba8().into_raw(),
    };
    PixelBuffer::new(image_size(image), pixels, order)
}

/// Wrap a buffer's pixels as a decoded image without copying.
pub(crate) fn from_pixel_buffer(buffer: PixelBuffer) -> Result<DynamicImage, StateError> {
    let Size { width, height } = buffer.size;
    let image = match buffer.channel_order {
        ChannelOrder::Rgb => {
            RgbImage::from_raw(width, height, buffer.pixels).map(DynamicImage::ImageRgb8)
        }
        ChannelOrder::Rgba => {
            RgbaImage::from_raw(width, height, buffer.pixels).map(DynamicImage::ImageRgba8)
        }
    };
    image.ok_or_else(|| StateError::InvalidArgument {
        operation: "buffer",
        message: format!("pixel data too short for {width}x{height}"),
    })
}
