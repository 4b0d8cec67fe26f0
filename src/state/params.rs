//! Parameter types for state operations.
//!
//! These types describe *what* an operation is asked to do. Backends decide
//! *how*. Keeping them free of codec types lets the registry reason about
//! operations (by [`OperationKind`]) without knowing any backend.
//!
//! ## Types
//!
//! - [`Size`]: pixel dimensions.
//! - [`Rect`]: crop rectangle, `left`/`top` inclusive, `right`/`bottom` exclusive.
//! - [`Quality`]: lossy encoding quality (1–100, default 85). Clamped on construction.
//! - [`ChannelOrder`] / [`PixelBuffer`]: the raw-buffer export shape.
//! - [`OperationKind`] / [`Operation`] / [`Outcome`]: the dispatch vocabulary.
//! - [`SaveFormat`]: name-based save target.

use super::backend::StateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = String;

    /// Parse `WIDTHxHEIGHT`, e.g. `800x600`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let width = w.trim().parse().map_err(|_| format!("bad width in '{s}'"))?;
        let height = h.trim().parse().map_err(|_| format!("bad height in '{s}'"))?;
        Ok(Self { width, height })
    }
}

/// Crop rectangle in pixel coordinates.
///
/// `left`/`top` are inclusive, `right`/`bottom` exclusive, so the cropped
/// size is `(right - left, bottom - top)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

impl FromStr for Rect {
    type Err = String;

    /// Parse `LEFT,TOP,RIGHT,BOTTOM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [l, t, r, b] = parts.as_slice() else {
            return Err(format!("expected LEFT,TOP,RIGHT,BOTTOM, got '{s}'"));
        };
        let parse = |v: &str| v.parse::<u32>().map_err(|_| format!("bad coordinate '{v}'"));
        Ok(Self::new(parse(*l)?, parse(*t)?, parse(*r)?, parse(*b)?))
    }
}

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Channel layout of a [`PixelBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelOrder {
    #[serde(rename = "RGB")]
    Rgb,
    #[serde(rename = "RGBA")]
    Rgba,
}

impl ChannelOrder {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ChannelOrder::Rgb => 3,
            ChannelOrder::Rgba => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChannelOrder::Rgb => "RGB",
            ChannelOrder::Rgba => "RGBA",
        }
    }
}

/// Flat, tightly packed 8-bit pixel data with its dimensions.
///
/// This is the terminal bridge to pixel-level consumers; see
/// [`Image::to_buffer_rgb`](crate::Image::to_buffer_rgb).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub size: Size,
    pub pixels: Vec<u8>,
    pub channel_order: ChannelOrder,
}

impl PixelBuffer {
    /// Wrap raw pixels, rejecting a length that does not match `size`.
    pub fn new(
        size: Size,
        pixels: Vec<u8>,
        channel_order: ChannelOrder,
    ) -> Result<Self, StateError> {
        let expected = super::calculations::buffer_len(size, channel_order).ok_or_else(|| {
            StateError::InvalidArgument {
                operation: "buffer",
                message: format!("{size} overflows a pixel buffer"),
            }
        })?;
        if pixels.len() != expected {
            return Err(StateError::InvalidArgument {
                operation: "buffer",
                message: format!(
                    "{} buffer of {size} needs {expected} bytes, got {}",
                    channel_order.name(),
                    pixels.len()
                ),
            });
        }
        Ok(Self {
            size,
            pixels,
            channel_order,
        })
    }
}

/// The name of an operation a state type may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    GetSize,
    HasAlpha,
    HasAnimation,
    Resize,
    Crop,
    SaveAsJpeg,
    SaveAsPng,
    SaveAsGif,
    SaveAsBmp,
}

impl OperationKind {
    pub const ALL: [OperationKind; 9] = [
        OperationKind::GetSize,
        OperationKind::HasAlpha,
        OperationKind::HasAnimation,
        OperationKind::Resize,
        OperationKind::Crop,
        OperationKind::SaveAsJpeg,
        OperationKind::SaveAsPng,
        OperationKind::SaveAsGif,
        OperationKind::SaveAsBmp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OperationKind::GetSize => "get_size",
            OperationKind::HasAlpha => "has_alpha",
            OperationKind::HasAnimation => "has_animation",
            OperationKind::Resize => "resize",
            OperationKind::Crop => "crop",
            OperationKind::SaveAsJpeg => "save_as_jpeg",
            OperationKind::SaveAsPng => "save_as_png",
            OperationKind::SaveAsGif => "save_as_gif",
            OperationKind::SaveAsBmp => "save_as_bmp",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown operation '{s}'"))
    }
}

/// An operation together with its arguments.
///
/// Save operations borrow the caller's sink for the duration of the call and
/// never close it.
pub enum Operation<'a> {
    GetSize,
    HasAlpha,
    HasAnimation,
    Resize(Size),
    Crop(Rect),
    SaveAsJpeg {
        sink: &'a mut dyn Write,
        quality: Quality,
    },
    SaveAsPng {
        sink: &'a mut dyn Write,
    },
    SaveAsGif {
        sink: &'a mut dyn Write,
    },
    SaveAsBmp {
        sink: &'a mut dyn Write,
    },
}

impl Operation<'_> {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::GetSize => OperationKind::GetSize,
            Operation::HasAlpha => OperationKind::HasAlpha,
            Operation::HasAnimation => OperationKind::HasAnimation,
            Operation::Resize(_) => OperationKind::Resize,
            Operation::Crop(_) => OperationKind::Crop,
            Operation::SaveAsJpeg { .. } => OperationKind::SaveAsJpeg,
            Operation::SaveAsPng { .. } => OperationKind::SaveAsPng,
            Operation::SaveAsGif { .. } => OperationKind::SaveAsGif,
            Operation::SaveAsBmp { .. } => OperationKind::SaveAsBmp,
        }
    }
}

/// What an operation produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Size(Size),
    Flag(bool),
    /// The state was mutated in place or written to a sink.
    Done,
}

/// Encoded output format for [`Image::save`](crate::Image::save).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
}

impl SaveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Png => "png",
            SaveFormat::Gif => "gif",
            SaveFormat::Bmp => "bmp",
        }
    }

    pub fn operation(self) -> OperationKind {
        match self {
            SaveFormat::Jpeg => OperationKind::SaveAsJpeg,
            SaveFormat::Png => OperationKind::SaveAsPng,
            SaveFormat::Gif => OperationKind::SaveAsGif,
            SaveFormat::Bmp => OperationKind::SaveAsBmp,
        }
    }
}

impl FromStr for SaveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(SaveFormat::Jpeg),
            "png" => Ok(SaveFormat::Png),
            "gif" => Ok(SaveFormat::Gif),
            "bmp" => Ok(SaveFormat::Bmp),
            other => Err(format!("unsupported output format '{other}'")),
        }
    }
}
