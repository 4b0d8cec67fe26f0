//! General-purpose decoded image backend, built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Open (JPEG, PNG, BMP, GIF first frame) | `image::load_from_memory_with_format` |
//! | Orientation | `ImageDecoder::orientation`, then [`orientation::normalize`] |
//! | Resize | `DynamicImage::resize_exact` with the configured filter |
//! | Crop | `DynamicImage::crop_imm` |
//! | Encode | `JpegEncoder`, `PngEncoder`, `GifEncoder`, `BmpEncoder` |
//!
//! ## Edges
//!
//! | From | To | Cost |
//! |---|---|---|
//! | `jpeg-file`, `png-file`, `bmp-file` | `raster` | 1 |
//! | `gif-file` (first frame only) | `raster` | 3 |
//! | `rgb-buffer`, `rgba-buffer` | `raster` | 1 |
//! | `raster` | `rgba-buffer` | 1 |
//! | `raster` | `rgb-buffer` (drops alpha) | 2 |
//!
//! File edges exist only for formats whose decoder is compiled in.

use super::buffer::{BufferState, buffer_state_type, take_buffer};
use super::codec;
use super::files::{FILE_STATES, read_file_state};
use crate::state::orientation::{self, OrientStrategy};
use crate::state::{
    Backend, ChannelOrder, Converter, ImageState, Operation, OperationKind, Outcome, StateDecl,
    StateError, StateType, validate_crop, validate_resize,
};
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, Frame, ImageFormat};
use std::any::Any;
use std::sync::LazyLock;

/// File states this build can decode, in registration order.
static READABLE_FILES: LazyLock<Vec<StateType>> = LazyLock::new(|| {
    FILE_STATES
        .into_iter()
        .filter(|&state| codec::file_format(state).is_some_and(|f| f.reading_enabled()))
        .collect()
});

/// A decoded still image.
#[derive(Debug, Clone)]
pub struct RasterState {
    image: DynamicImage,
    orientation: Orientation,
    filter: FilterType,
}

impl RasterState {
    pub fn new(image: DynamicImage, filter: FilterType) -> Self {
        Self {
            image,
            orientation: Orientation::NoTransforms,
            filter,
        }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    /// The stored orientation tag; always normal once opened.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Apply the pending orientation and reset the tag.
    fn oriented(mut self, strategy: OrientStrategy) -> Self {
        if self.orientation != Orientation::NoTransforms {
            self.image = orientation::normalize(self.image, self.orientation, strategy);
            self.orientation = Orientation::NoTransforms;
        }
        self
    }
}

impl ImageState for RasterState {
    fn state_type(&self) -> StateType {
        StateType::RASTER
    }

    fn perform(&mut self, op: Operation<'_>) -> Result<Outcome, StateError> {
        match op {
            Operation::GetSize => Ok(Outcome::Size(codec::image_size(&self.image))),
            Operation::HasAlpha => Ok(Outcome::Flag(self.image.color().has_alpha())),
            Operation::HasAnimation => Ok(Outcome::Flag(false)),
            Operation::Resize(size) => {
                let size = validate_resize(size)?;
                self.image = self.image.resize_exact(size.width, size.height, self.filter);
                Ok(Outcome::Done)
            }
            Operation::Crop(rect) => {
                let cropped = validate_crop(rect, codec::image_size(&self.image))?;
                self.image = self
                    .image
                    .crop_imm(rect.left, rect.top, cropped.width, cropped.height);
                Ok(Outcome::Done)
            }
            Operation::SaveAsJpeg { sink, quality } => {
                codec::encode_jpeg(&self.image, sink, quality)?;
                Ok(Outcome::Done)
            }
            Operation::SaveAsPng { sink } => {
                codec::encode_png(&self.image, sink)?;
                Ok(Outcome::Done)
            }
            Operation::SaveAsGif { sink } => {
                codec::encode_gif(vec![Frame::new(self.image.to_rgba8())], sink)?;
                Ok(Outcome::Done)
            }
            Operation::SaveAsBmp { sink } => {
                codec::encode_bmp(&self.image, sink)?;
                Ok(Outcome::Done)
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Backend wrapping `image::DynamicImage`.
#[derive(Debug, Clone, Copy)]
pub struct RasterBackend {
    filter: FilterType,
    strategy: OrientStrategy,
}

impl RasterBackend {
    pub fn new(filter: FilterType, strategy: OrientStrategy) -> Self {
        Self { filter, strategy }
    }

    /// Decode a file state, correcting its orientation.
    pub fn open(&self, state: Box<dyn ImageState>) -> Result<RasterState, StateError> {
        let from = state.state_type();
        let bytes = read_file_state(state, from)?;
        let image = codec::decode_still(&bytes, from)?;
        let opened = RasterState {
            image,
            orientation: codec::stored_orientation(&bytes, from),
            filter: self.filter,
        };
        log::trace!("raster: opened {from} ({}x{})", opened.image.width(), opened.image.height());
        Ok(opened.oriented(self.strategy))
    }

    pub fn from_buffer(&self, state: Box<dyn ImageState>) -> Result<RasterState, StateError> {
        let from = state.state_type();
        let image = codec::from_pixel_buffer(take_buffer(state, from)?)?;
        Ok(RasterState::new(image, self.filter))
    }

    fn save_operations() -> Vec<OperationKind> {
        [
            (ImageFormat::Jpeg, OperationKind::SaveAsJpeg),
            (ImageFormat::Png, OperationKind::SaveAsPng),
            (ImageFormat::Gif, OperationKind::SaveAsGif),
            (ImageFormat::Bmp, OperationKind::SaveAsBmp),
        ]
        .into_iter()
        .filter(|(format, _)| format.writing_enabled())
        .map(|(_, kind)| kind)
        .collect()
    }
}

impl Default for RasterBackend {
    fn default() -> Self {
        Self::new(FilterType::Lanczos3, OrientStrategy::Auto)
    }
}

/// Export a raster state as a buffer in `order`.
pub fn to_buffer(
    state: Box<dyn ImageState>,
    order: ChannelOrder,
) -> Result<BufferState, StateError> {
    let raster = crate::state::downcast_state::<RasterState>(state, StateType::RASTER)?;
    Ok(BufferState::new(codec::to_pixel_buffer(&raster.image, order)?))
}

impl Backend for RasterBackend {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn check(&self) -> Result<(), StateError> {
        if READABLE_FILES.is_empty() {
            return Err(StateError::UnavailableBackend {
                backend: "raster",
                reason: "no image decoders compiled in".into(),
            });
        }
        Ok(())
    }

    fn states(&self) -> Vec<StateDecl> {
        let mut operations = vec![
            OperationKind::GetSize,
            OperationKind::HasAlpha,
            OperationKind::HasAnimation,
            OperationKind::Resize,
            OperationKind::Crop,
        ];
        operations.extend(Self::save_operations());
        vec![StateDecl::new(StateType::RASTER, &operations)]
    }

    fn converters(&self) -> Vec<Converter> {
        let mut converters: Vec<Converter> = READABLE_FILES
            .iter()
            .map(|&from| {
                let backend = *self;
                // GIF decodes to its first frame only; prefer the frames backend
                let cost = if from == StateType::GIF_FILE { 3 } else { 1 };
                Converter::new(from, StateType::RASTER, "open", move |state| {
                    Ok(Box::new(backend.open(state)?))
                })
                .with_cost(cost)
            })
            .collect();

        for order in [ChannelOrder::Rgb, ChannelOrder::Rgba] {
            let backend = *self;
            converters.push(Converter::new(
                buffer_state_type(order),
                StateType::RASTER,
                "from_buffer",
                move |state| Ok(Box::new(backend.from_buffer(state)?)),
            ));
        }
        // Drops alpha; costs more than the RGBA export.
        converters.push(
            Converter::new(
                StateType::RASTER,
                StateType::RGB_BUFFER,
                "to_buffer_rgb",
                |state| Ok(Box::new(to_buffer(state, ChannelOrder::Rgb)?)),
            )
            .with_cost(2),
        );
        converters.push(Converter::new(
            StateType::RASTER,
            StateType::RGBA_BUFFER,
            "to_buffer_rgba",
            |state| Ok(Box::new(to_buffer(state, ChannelOrder::Rgba)?)),
        ));
        converters
    }
}
