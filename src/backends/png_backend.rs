//! PNG-specific backend built directly on the `png` crate.
//!
//! Decodes to 8-bit RGB or RGBA (palette and low bit depths expanded,
//! 16-bit stripped, grayscale widened) and encodes straight from those
//! pixels. An animated PNG opens as its default image with the animation
//! flag set.

use super::buffer::{BufferState, buffer_state_type, take_buffer};
use super::codec;
use super::files::read_file_state;
use crate::state::orientation::{self, OrientStrategy};
use crate::state::{
    Backend, ChannelOrder, Converter, ImageState, Operation, OperationKind, Outcome, PixelBuffer,
    Size, StateDecl, StateError, StateType,
};
use image::metadata::Orientation;
use std::any::Any;
use std::io::{Cursor, Write};

const PNG_OPERATIONS: &[OperationKind] = &[
    OperationKind::GetSize,
    OperationKind::HasAlpha,
    OperationKind::HasAnimation,
    OperationKind::SaveAsPng,
];

/// Decoded PNG pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PngState {
    buffer: PixelBuffer,
    animated: bool,
    orientation: Orientation,
}

impl PngState {
    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }
}

impl ImageState for PngState {
    fn state_type(&self) -> StateType {
        StateType::PNG_IMAGE
    }

    fn perform(&mut self, op: Operation<'_>) -> Result<Outcome, StateError> {
        match op {
            Operation::GetSize => Ok(Outcome::Size(self.buffer.size)),
            Operation::HasAlpha => Ok(Outcome::Flag(
                self.buffer.channel_order == ChannelOrder::Rgba,
            )),
            Operation::HasAnimation => Ok(Outcome::Flag(self.animated)),
            Operation::SaveAsPng { sink } => {
                encode(&self.buffer, sink)?;
                Ok(Outcome::Done)
            }
            other => Err(StateError::unsupported(other.kind(), StateType::PNG_IMAGE)),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A decoded default image and what the header chunks said about it.
struct Decoded {
    buffer: PixelBuffer,
    animated: bool,
    /// From the `eXIf` chunk; undefined reads as normal.
    orientation: Orientation,
}

/// Decode the default image of a PNG to 8-bit RGB/RGBA.
fn decode(bytes: &[u8]) -> Result<Decoded, StateError> {
    let fail = |e| StateError::decode("open", e);
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().map_err(fail)?;
    let info = reader.info();
    let animated = info.animation_control.is_some();
    let orientation = info
        .exif_metadata
        .as_deref()
        .and_then(Orientation::from_exif_chunk)
        .unwrap_or(Orientation::NoTransforms);

    let mut pixels = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut pixels).map_err(fail)?;
    pixels.truncate(frame.buffer_size());

    let (pixels, order) = match frame.color_type {
        png::ColorType::Rgb => (pixels, ChannelOrder::Rgb),
        png::ColorType::Rgba => (pixels, ChannelOrder::Rgba),
        png::ColorType::Grayscale => (
            pixels.iter().flat_map(|&v| [v, v, v]).collect(),
            ChannelOrder::Rgb,
        ),
        png::ColorType::GrayscaleAlpha => (
            pixels
                .chunks_exact(2)
                .flat_map(|p| [p[0], p[0], p[0], p[1]])
                .collect(),
            ChannelOrder::Rgba,
        ),
        png::ColorType::Indexed => {
            return Err(StateError::decode("open", "palette was not expanded"));
        }
    };
    Ok(Decoded {
        buffer: PixelBuffer::new(Size::new(frame.width, frame.height), pixels, order)?,
        animated,
        orientation,
    })
}

fn encode(buffer: &PixelBuffer, sink: &mut dyn Write) -> Result<(), StateError> {
    let fail = |e| StateError::encode("save_as_png", e);
    let mut encoder = png::Encoder::new(sink, buffer.size.width, buffer.size.height);
    encoder.set_color(match buffer.channel_order {
        ChannelOrder::Rgb => png::ColorType::Rgb,
        ChannelOrder::Rgba => png::ColorType::Rgba,
    });
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().map_err(fail)?;
    writer.write_image_data(&buffer.pixels).map_err(fail)?;
    writer.finish().map_err(fail)
}

/// Re-pack pixels into another channel order. Alpha is dropped or set opaque.
fn convert_order(buffer: PixelBuffer, order: ChannelOrder) -> Result<PixelBuffer, StateError> {
    if buffer.channel_order == order {
        return Ok(buffer);
    }
    let pixels = match order {
        ChannelOrder::Rgb => buffer
            .pixels
            .chunks_exact(4)
            .flat_map(|p| [p[0], p[1], p[2]])
            .collect(),
        ChannelOrder::Rgba => buffer
            .pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], u8::MAX])
            .collect(),
    };
    PixelBuffer::new(buffer.size, pixels, order)
}

/// Backend wrapping the `png` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngBackend {
    strategy: OrientStrategy,
}

impl PngBackend {
    pub fn new(strategy: OrientStrategy) -> Self {
        Self { strategy }
    }

    pub fn open(&self, state: Box<dyn ImageState>) -> Result<PngState, StateError> {
        let bytes = read_file_state(state, StateType::PNG_FILE)?;
        let Decoded {
            mut buffer,
            animated,
            orientation: stored,
        } = decode(&bytes)?;
        if stored != Orientation::NoTransforms {
            let order = buffer.channel_order;
            let image = codec::from_pixel_buffer(buffer)?;
            let image = orientation::normalize(image, stored, self.strategy);
            buffer = codec::to_pixel_buffer(&image, order)?;
        }
        Ok(PngState {
            buffer,
            animated,
            orientation: Orientation::NoTransforms,
        })
    }

    pub fn from_buffer(&self, state: Box<dyn ImageState>) -> Result<PngState, StateError> {
        let from = state.state_type();
        Ok(PngState {
            buffer: take_buffer(state, from)?,
            animated: false,
            orientation: Orientation::NoTransforms,
        })
    }
}

/// Export a PNG state as a buffer in `order`.
pub fn to_buffer(
    state: Box<dyn ImageState>,
    order: ChannelOrder,
) -> Result<BufferState, StateError> {
    let png = crate::state::downcast_state::<PngState>(state, StateType::PNG_IMAGE)?;
    Ok(BufferState::new(convert_order(png.buffer, order)?))
}

impl Backend for PngBackend {
    fn name(&self) -> &'static str {
        "png"
    }

    /// Encode and decode a 1×1 image.
    fn check(&self) -> Result<(), StateError> {
        let unavailable = |reason: String| StateError::UnavailableBackend {
            backend: "png",
            reason,
        };
        let probe = PixelBuffer::new(Size::new(1, 1), vec![1, 2, 3, 4], ChannelOrder::Rgba)?;
        let mut bytes = Vec::new();
        encode(&probe, &mut bytes).map_err(|e| unavailable(e.to_string()))?;
        let decoded = decode(&bytes).map_err(|e| unavailable(e.to_string()))?;
        if decoded.buffer != probe {
            return Err(unavailable("self-test produced different pixels".into()));
        }
        Ok(())
    }

    fn states(&self) -> Vec<StateDecl> {
        vec![StateDecl::new(StateType::PNG_IMAGE, PNG_OPERATIONS)]
    }

    fn converters(&self) -> Vec<Converter> {
        let backend = *self;
        let mut converters = vec![Converter::new(
            StateType::PNG_FILE,
            StateType::PNG_IMAGE,
            "open",
            move |state| Ok(Box::new(backend.open(state)?)),
        )];
        for order in [ChannelOrder::Rgb, ChannelOrder::Rgba] {
            converters.push(Converter::new(
                buffer_state_type(order),
                StateType::PNG_IMAGE,
                "from_buffer",
                move |state| Ok(Box::new(backend.from_buffer(state)?)),
            ));
        }
        // Drops alpha; costs more than the RGBA export.
        converters.push(
            Converter::new(
                StateType::PNG_IMAGE,
                StateType::RGB_BUFFER,
                "to_buffer_rgb",
                |state| Ok(Box::new(to_buffer(state, ChannelOrder::Rgb)?)),
            )
            .with_cost(2),
        );
        converters.push(Converter::new(
            StateType::PNG_IMAGE,
            StateType::RGBA_BUFFER,
            "to_buffer_rgba",
            |state| Ok(Box::new(to_buffer(state, ChannelOrder::Rgba)?)),
        ));
        converters
    }
}
