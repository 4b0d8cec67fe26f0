//! Backend adapters. Each one bridges one codec library into the state graph.
//!
//! | Backend | States | Library |
//! |---|---|---|
//! | [`files`] | `jpeg-file`, `png-file`, `gif-file`, `bmp-file` | none (byte source) |
//! | [`buffer`] | `rgb-buffer`, `rgba-buffer` | none (raw pixels) |
//! | [`raster`] | `raster` | `image::DynamicImage` |
//! | [`frames`] | `frames` | `image::Frame` stacks (GIF, APNG) |
//! | [`png_backend`] | `png-image` | `png` crate |
//!
//! [`default_backends`] returns them in that order, which is also the
//! router's tie-break order.

pub mod buffer;
mod codec;
pub mod files;
pub mod frames;
pub mod png_backend;
pub mod raster;

pub use buffer::{BufferBackend, BufferState};
pub use codec::file_format;
pub use files::{FileState, FilesBackend, ImageSource};
pub use frames::{FramesBackend, FramesState};
pub use png_backend::{PngBackend, PngState};
pub use raster::{RasterBackend, RasterState};

use crate::config::Config;
use crate::state::{Backend, StateType};
use image::ImageFormat;

/// The built-in backends configured by `config`, in registration order.
///
/// Backends named in `backends.disabled` are still returned; the registry
/// builder records them as excluded.
pub fn default_backends(config: &Config) -> Vec<Box<dyn Backend>> {
    let filter = config.resize.filter.filter_type();
    let strategy = config.orientation.strategy;
    vec![
        Box::new(FilesBackend),
        Box::new(BufferBackend),
        Box::new(RasterBackend::new(filter, strategy)),
        Box::new(FramesBackend::new(filter, strategy)),
        Box::new(PngBackend::new(strategy)),
    ]
}

/// Detect the file state type of encoded bytes.
///
/// Recognizes JPEG (including a bare `FF D8` start), PNG, GIF and BMP.
pub fn sniff_format(bytes: &[u8]) -> Option<StateType> {
    if bytes.starts_with(&[0xFF, 0xD8]) {
        return Some(StateType::JPEG_FILE);
    }
    match image::guess_format(bytes).ok()? {
        ImageFormat::Jpeg => Some(StateType::JPEG_FILE),
        ImageFormat::Png => Some(StateType::PNG_FILE),
        ImageFormat::Gif => Some(StateType::GIF_FILE),
        ImageFormat::Bmp => Some(StateType::BMP_FILE),
        _ => None,
    }
}
