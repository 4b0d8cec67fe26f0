//! Multi-frame, animation-aware backend.
//!
//! Decodes every frame of a GIF or animated PNG and coalesces them onto a
//! full canvas, so each stored frame is self-contained: cropping or resizing
//! one never exposes the differencing a GIF uses on disk. Still images open
//! as a single frame.
//!
//! `save_as_gif` writes every frame with its original delay, looping
//! forever. The other encoders write the first frame. BMP output is not
//! offered.

use super::buffer::BufferState;
use super::codec;
use super::files::read_file_state;
use crate::state::orientation::{self, OrientStrategy};
use crate::state::{
    Backend, ChannelOrder, Converter, ImageState, Operation, OperationKind, Outcome, Size,
    StateDecl, StateError, StateType, validate_crop, validate_resize,
};
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::imageops::{self, FilterType};
use image::metadata::Orientation;
use image::{AnimationDecoder, DynamicImage, Frame, ImageDecoder, ImageFormat, RgbaImage};
use std::any::Any;
use std::io::Cursor;

/// Composite `frames` onto a `width`×`height` canvas in order.
///
/// A full-size frame at the origin replaces the canvas; anything smaller is
/// drawn over what came before. Every returned frame is canvas-sized at the
/// origin.
pub fn coalesce(frames: Vec<Frame>, width: u32, height: u32) -> Vec<Frame> {
    let mut canvas = RgbaImage::new(width, height);
    frames
        .into_iter()
        .map(|frame| {
            let delay = frame.delay();
            let (left, top) = (frame.left(), frame.top());
            let buffer = frame.into_buffer();
            if left == 0 && top == 0 && buffer.dimensions() == (width, height) {
                canvas = buffer;
            } else {
                imageops::overlay(&mut canvas, &buffer, i64::from(left), i64::from(top));
            }
            Frame::from_parts(canvas.clone(), 0, 0, delay)
        })
        .collect()
}

/// A coalesced stack of RGBA frames.
pub struct FramesState {
    frames: Vec<Frame>,
    size: Size,
    /// Whether the source carried an alpha channel.
    alpha: bool,
    orientation: Orientation,
    filter: FilterType,
}

impl std::fmt::Debug for FramesState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramesState")
            .field("frames", &self.frames.len())
            .field("size", &self.size)
            .field("alpha", &self.alpha)
            .field("orientation", &self.orientation)
            .finish_non_exhaustive()
    }
}

fn copy_frames(frames: &[Frame]) -> Vec<Frame> {
    frames
        .iter()
        .map(|f| Frame::from_parts(f.buffer().clone(), f.left(), f.top(), f.delay()))
        .collect()
}

impl FramesState {
    /// Wrap already coalesced frames. Fails on an empty stack.
    ///
    /// The frames are RGBA, so the state reports an alpha channel.
    pub fn new(frames: Vec<Frame>, filter: FilterType) -> Result<Self, StateError> {
        let first = frames
            .first()
            .ok_or_else(|| StateError::decode("open", "image has no frames"))?;
        let size = Size::new(first.buffer().width(), first.buffer().height());
        Ok(Self {
            frames,
            size,
            alpha: true,
            orientation: Orientation::NoTransforms,
            filter,
        })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    fn first_frame(&self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.frames[0].buffer().clone())
    }

    fn map_frames(&mut self, f: impl Fn(&RgbaImage) -> RgbaImage) {
        self.frames = self
            .frames
            .iter()
            .map(|frame| Frame::from_parts(f(frame.buffer()), 0, 0, frame.delay()))
            .collect();
        let first = self.frames[0].buffer();
        self.size = Size::new(first.width(), first.height());
    }

    fn oriented(mut self, strategy: OrientStrategy) -> Self {
        let stored = self.orientation;
        if stored != Orientation::NoTransforms {
            self.map_frames(|buffer| {
                orientation::normalize(DynamicImage::ImageRgba8(buffer.clone()), stored, strategy)
                    .into_rgba8()
            });
            self.orientation = Orientation::NoTransforms;
        }
        self
    }
}

impl ImageState for FramesState {
    fn state_type(&self) -> StateType {
        StateType::FRAMES
    }

    fn perform(&mut self, op: Operation<'_>) -> Result<Outcome, StateError> {
        match op {
            Operation::GetSize => Ok(Outcome::Size(self.size)),
            // Channel presence in the source, as `raster` and `png-image` report it
            Operation::HasAlpha => Ok(Outcome::Flag(self.alpha)),
            Operation::HasAnimation => Ok(Outcome::Flag(self.frames.len() > 1)),
            Operation::Resize(size) => {
                let size = validate_resize(size)?;
                let filter = self.filter;
                self.map_frames(|buffer| imageops::resize(buffer, size.width, size.height, filter));
                Ok(Outcome::Done)
            }
            Operation::Crop(rect) => {
                let cropped = validate_crop(rect, self.size)?;
                self.map_frames(|buffer| {
                    imageops::crop_imm(buffer, rect.left, rect.top, cropped.width, cropped.height)
                        .to_image()
                });
                Ok(Outcome::Done)
            }
            Operation::SaveAsJpeg { sink, quality } => {
                codec::encode_jpeg(&self.first_frame(), sink, quality)?;
                Ok(Outcome::Done)
            }
            Operation::SaveAsPng { sink } => {
                codec::encode_png(&self.first_frame(), sink)?;
                Ok(Outcome::Done)
            }
            Operation::SaveAsGif { sink } => {
                codec::encode_gif(copy_frames(&self.frames), sink)?;
                Ok(Outcome::Done)
            }
            other => Err(StateError::unsupported(other.kind(), StateType::FRAMES)),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

fn collect_animation(
    frames: image::Frames<'_>,
    width: u32,
    height: u32,
) -> Result<Vec<Frame>, StateError> {
    let frames = frames
        .collect_frames()
        .map_err(|e| StateError::decode("open", e))?;
    Ok(coalesce(frames, width, height))
}

/// Decode every frame of `bytes`, coalesced, and whether the source has alpha.
fn decode_frames(bytes: &[u8], from: StateType) -> Result<(Vec<Frame>, bool), StateError> {
    let decode = |e| StateError::decode("open", e);
    match from {
        StateType::GIF_FILE => {
            let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(decode)?;
            let (width, height) = decoder.dimensions();
            let alpha = decoder.color_type().has_alpha();
            Ok((collect_animation(decoder.into_frames(), width, height)?, alpha))
        }
        StateType::PNG_FILE => {
            let mut decoder = PngDecoder::new(Cursor::new(bytes)).map_err(decode)?;
            let alpha = decoder.color_type().has_alpha();
            if decoder.is_apng().map_err(decode)? {
                let (width, height) = decoder.dimensions();
                let apng = decoder.apng().map_err(decode)?;
                Ok((collect_animation(apng.into_frames(), width, height)?, alpha))
            } else {
                let image = DynamicImage::from_decoder(decoder).map_err(decode)?;
                Ok((vec![Frame::new(image.into_rgba8())], alpha))
            }
        }
        _ => {
            let image = codec::decode_still(bytes, from)?;
            let alpha = image.color().has_alpha();
            Ok((vec![Frame::new(image.into_rgba8())], alpha))
        }
    }
}

/// Backend storing a `Vec<image::Frame>`.
#[derive(Debug, Clone, Copy)]
pub struct FramesBackend {
    filter: FilterType,
    strategy: OrientStrategy,
}

impl FramesBackend {
    pub fn new(filter: FilterType, strategy: OrientStrategy) -> Self {
        Self { filter, strategy }
    }

    /// Decode all frames of a file state, coalesce and orient them.
    pub fn open(&self, state: Box<dyn ImageState>) -> Result<FramesState, StateError> {
        let from = state.state_type();
        let bytes = read_file_state(state, from)?;
        let (frames, alpha) = decode_frames(&bytes, from)?;
        let mut opened = FramesState::new(frames, self.filter)?;
        opened.alpha = alpha;
        opened.orientation = codec::stored_orientation(&bytes, from);
        log::trace!("frames: opened {from} with {} frame(s)", opened.frames.len());
        Ok(opened.oriented(self.strategy))
    }
}

impl Default for FramesBackend {
    fn default() -> Self {
        Self::new(FilterType::Lanczos3, OrientStrategy::Auto)
    }
}

/// Export the first frame as a buffer in `order`.
pub fn to_buffer(
    state: Box<dyn ImageState>,
    order: ChannelOrder,
) -> Result<BufferState, StateError> {
    let frames = crate::state::downcast_state::<FramesState>(state, StateType::FRAMES)?;
    Ok(BufferState::new(codec::to_pixel_buffer(&frames.first_frame(), order)?))
}

impl Backend for FramesBackend {
    fn name(&self) -> &'static str {
        "frames"
    }

    fn check(&self) -> Result<(), StateError> {
        if !ImageFormat::Gif.reading_enabled() || !ImageFormat::Gif.writing_enabled() {
            return Err(StateError::UnavailableBackend {
                backend: "frames",
                reason: "GIF codec not compiled in".into(),
            });
        }
        Ok(())
    }

    fn states(&self) -> Vec<StateDecl> {
        let operations: Vec<OperationKind> = OperationKind::ALL
            .into_iter()
            .filter(|&kind| kind != OperationKind::SaveAsBmp)
            .collect();
        vec![StateDecl::new(StateType::FRAMES, &operations)]
    }

    fn converters(&self) -> Vec<Converter> {
        let sources = [
            (StateType::GIF_FILE, 1),
            (StateType::JPEG_FILE, 2),
            (StateType::PNG_FILE, 2),
            (StateType::BMP_FILE, 2),
        ];
        let mut converters: Vec<Converter> = sources
            .into_iter()
            .filter(|&(from, _)| codec::file_format(from).is_some_and(|f| f.reading_enabled()))
            .map(|(from, cost)| {
                let backend = *self;
                Converter::new(from, StateType::FRAMES, "open", move |state| {
                    Ok(Box::new(backend.open(state)?))
                })
                .with_cost(cost)
            })
            .collect();
        // Drops alpha; costs more than the RGBA export.
        converters.push(
            Converter::new(
                StateType::FRAMES,
                StateType::RGB_BUFFER,
                "to_buffer_rgb",
                |state| Ok(Box::new(to_buffer(state, ChannelOrder::Rgb)?)),
            )
            .with_cost(2),
        );
        converters.push(Converter::new(
            StateType::FRAMES,
            StateType::RGBA_BUFFER,
            "to_buffer_rgba",
            |state| Ok(Box::new(to_buffer(state, ChannelOrder::Rgba)?)),
        ));
        converters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::RasterBackend;
    use crate::state::{Quality, Rect};
    use crate::test_helpers::*;
    use image::{Delay, Rgba};

    fn open(state_type: StateType, bytes: Vec<u8>) -> FramesState {
        FramesBackend::default()
            .open(file_state(state_type, bytes))
            .unwrap()
    }

    fn solid_frame(width: u32, height: u32, color: [u8; 4], (left, top): (u32, u32)) -> Frame {
        let buffer = RgbaImage::from_pixel(width, height, Rgba(color));
        Frame::from_parts(buffer, left, top, Delay::from_numer_denom_ms(50, 1))
    }

    #[test]
    fn coalesce_draws_partial_frame_over_previous() {
        let base = solid_frame(4, 4, [255, 0, 0, 255], (0, 0));
        let patch = solid_frame(2, 2, [0, 0, 255, 255], (1, 1));
        let frames = coalesce(vec![base, patch], 4, 4);

        assert_eq!(frames.len(), 2);
        let second = frames[1].buffer();
        assert_eq!(second.dimensions(), (4, 4));
        assert_eq!((frames[1].left(), frames[1].top()), (0, 0));
        assert_eq!(second.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(second.get_pixel(1, 1).0, [0, 0, 255, 255]);
        assert_eq!(second.get_pixel(2, 2).0, [0, 0, 255, 255]);
        assert_eq!(second.get_pixel(3, 3).0, [255, 0, 0, 255]);
    }

    #[test]
    fn coalesce_transparent_patch_keeps_canvas() {
        let base = solid_frame(3, 3, [0, 255, 0, 255], (0, 0));
        let clear = solid_frame(1, 1, [0, 0, 0, 0], (2, 2));
        let frames = coalesce(vec![base, clear], 3, 3);
        assert_eq!(frames[1].buffer().get_pixel(2, 2).0, [0, 255, 0, 255]);
    }

    #[test]
    fn cropping_a_coalesced_frame_shows_no_differencing() {
        let base = solid_frame(4, 4, [255, 0, 0, 255], (0, 0));
        let patch = solid_frame(1, 1, [0, 0, 255, 255], (3, 3));
        let frames = coalesce(vec![base, patch], 4, 4);
        let mut state = FramesState::new(frames, FilterType::Nearest).unwrap();
        state.perform(Operation::Crop(Rect::new(0, 0, 2, 2))).unwrap();
        for frame in state.frames() {
            assert!(frame.buffer().pixels().all(|p| p.0 == [255, 0, 0, 255]));
        }
    }

    #[test]
    fn open_gif_keeps_every_frame() {
        let gif = gif_bytes(8, 6, &[[255, 0, 0, 255], [0, 0, 255, 255], [0, 255, 0, 255]]);
        let mut state = open(StateType::GIF_FILE, gif);
        assert_eq!(state.frames().len(), 3);
        assert_eq!(state.perform(Operation::HasAnimation).unwrap(), Outcome::Flag(true));
        assert_eq!(
            state.perform(Operation::GetSize).unwrap(),
            Outcome::Size(Size::new(8, 6))
        );
        for frame in state.frames() {
            assert_eq!(frame.buffer().dimensions(), (8, 6));
        }
        let last = state.frames()[2].buffer().get_pixel(4, 3).0;
        assert_close([last[0], last[1], last[2]], GREEN, 8, "third frame");
    }

    #[test]
    fn open_coalesces_frame_differenced_gif() {
        let gif = gif_with_patch(6, 6, [255, 0, 0, 255], [0, 0, 255, 255], (3, 2, 2));
        let mut state = open(StateType::GIF_FILE, gif);
        assert_eq!(state.frames().len(), 2);
        for frame in state.frames() {
            assert_eq!(frame.buffer().dimensions(), (6, 6));
            assert_eq!((frame.left(), frame.top()), (0, 0));
        }

        let second = state.frames()[1].buffer();
        let rgb = |x, y| {
            let [r, g, b, _] = second.get_pixel(x, y).0;
            [r, g, b]
        };
        assert_close(rgb(3, 2), BLUE, 8, "patch corner");
        assert_close(rgb(4, 3), BLUE, 8, "patch corner");
        assert_close(rgb(0, 0), RED, 8, "base left of patch");
        assert_close(rgb(5, 5), RED, 8, "base below patch");

        state.perform(Operation::Crop(Rect::new(0, 0, 3, 2))).unwrap();
        for (i, frame) in state.frames().iter().enumerate() {
            assert_eq!(frame.buffer().dimensions(), (3, 2));
            for pixel in frame.buffer().pixels() {
                let [r, g, b, a] = pixel.0;
                assert_close([r, g, b], RED, 8, &format!("frame {i} outside patch"));
                assert_eq!(a, u8::MAX);
            }
        }
    }

    #[test]
    fn has_alpha_matches_raster_for_the_same_file() {
        let sources = [
            solid_rgba(3, 3, [1, 2, 3, 255]),
            solid_rgba(3, 3, [1, 2, 3, 0]),
            solid_rgb(3, 3, [1, 2, 3]),
        ];
        for source in sources {
            let png = encode(&source, ImageFormat::Png);
            let mut frames = open(StateType::PNG_FILE, png.clone());
            let mut raster = RasterBackend::default()
                .open(file_state(StateType::PNG_FILE, png))
                .unwrap();
            assert_eq!(
                frames.perform(Operation::HasAlpha).unwrap(),
                raster.perform(Operation::HasAlpha).unwrap(),
                "{:?}",
                source.color()
            );
        }
    }

    #[test]
    fn open_apng_decodes_animation() {
        let png = apng_bytes(5, 5, &[[10, 20, 30, 255], [40, 50, 60, 255]]);
        let mut state = open(StateType::PNG_FILE, png);
        assert_eq!(state.frames().len(), 2);
        assert_eq!(state.perform(Operation::HasAnimation).unwrap(), Outcome::Flag(true));
        assert_eq!(state.frames()[1].buffer().get_pixel(0, 0).0, [40, 50, 60, 255]);
    }

    #[test]
    fn still_png_opens_as_single_frame() {
        let mut state = open(
            StateType::PNG_FILE,
            encode(&solid_rgba(3, 3, [1, 2, 3, 100]), ImageFormat::Png),
        );
        assert_eq!(state.frames().len(), 1);
        assert_eq!(state.perform(Operation::HasAnimation).unwrap(), Outcome::Flag(false));
        assert_eq!(state.perform(Operation::HasAlpha).unwrap(), Outcome::Flag(true));
    }

    #[test]
    fn opaque_frames_report_no_alpha() {
        let mut state = open(
            StateType::BMP_FILE,
            encode(&solid_rgb(3, 3, [1, 2, 3]), ImageFormat::Bmp),
        );
        assert_eq!(state.perform(Operation::HasAlpha).unwrap(), Outcome::Flag(false));
    }

    #[test]
    fn png_orientation_applies_to_frames() {
        let upright = upright_reference();
        let stored = store_with_orientation(&upright, Orientation::Rotate270);
        let png = inject_png_exif(&encode(&stored, ImageFormat::Png), 8);
        let state = open(StateType::PNG_FILE, png);
        assert_eq!(state.orientation(), Orientation::NoTransforms);
        let frame = DynamicImage::ImageRgba8(state.frames()[0].buffer().clone());
        assert_eq!(frame.to_rgb8().as_raw(), upright.to_rgb8().as_raw());
    }

    #[test]
    fn resize_applies_to_every_frame() {
        let gif = gif_bytes(8, 8, &[[255, 0, 0, 255], [0, 0, 255, 255]]);
        let mut state = open(StateType::GIF_FILE, gif);
        state.perform(Operation::Resize(Size::new(3, 5))).unwrap();
        assert!(state.frames().iter().all(|f| f.buffer().dimensions() == (3, 5)));
        assert_eq!(
            state.perform(Operation::GetSize).unwrap(),
            Outcome::Size(Size::new(3, 5))
        );
    }

    #[test]
    fn invalid_crop_leaves_frames_untouched() {
        let gif = gif_bytes(4, 4, &[[255, 0, 0, 255], [0, 0, 255, 255]]);
        let mut state = open(StateType::GIF_FILE, gif);
        let before: Vec<Vec<u8>> = state.frames().iter().map(|f| f.buffer().to_vec()).collect();
        assert!(state.perform(Operation::Crop(Rect::new(0, 0, 5, 4))).is_err());
        let after: Vec<Vec<u8>> = state.frames().iter().map(|f| f.buffer().to_vec()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn save_as_gif_writes_all_frames() {
        let gif = gif_bytes(4, 4, &[[255, 0, 0, 255], [0, 0, 255, 255]]);
        let mut state = open(StateType::GIF_FILE, gif);
        let mut out = Vec::new();
        state.perform(Operation::SaveAsGif { sink: &mut out }).unwrap();
        let reopened = open(StateType::GIF_FILE, out);
        assert_eq!(reopened.frames().len(), 2);
    }

    #[test]
    fn save_as_bmp_is_not_supported() {
        let mut state = open(StateType::GIF_FILE, gif_bytes(2, 2, &[[1, 2, 3, 255]]));
        let mut out = Vec::new();
        let err = state.perform(Operation::SaveAsBmp { sink: &mut out }).unwrap_err();
        assert!(matches!(
            err,
            StateError::OperationNotSupported {
                operation: OperationKind::SaveAsBmp,
                state: StateType::FRAMES
            }
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn save_as_jpeg_writes_first_frame() {
        let gif = gif_bytes(16, 16, &[[255, 0, 0, 255], [0, 0, 255, 255]]);
        let mut state = open(StateType::GIF_FILE, gif);
        let mut out = Vec::new();
        state
            .perform(Operation::SaveAsJpeg {
                sink: &mut out,
                quality: Quality::default(),
            })
            .unwrap();
        let decoded = image::load_from_memory_with_format(&out, ImageFormat::Jpeg).unwrap();
        assert_close(decoded.to_rgb8().get_pixel(8, 8).0, RED, 40, "first frame");
    }

    #[test]
    fn buffer_export_uses_first_frame() {
        let gif = gif_bytes(2, 2, &[[0, 255, 0, 255], [0, 0, 255, 255]]);
        let state = open(StateType::GIF_FILE, gif);
        let buffer = to_buffer(Box::new(state), ChannelOrder::Rgba)
            .unwrap()
            .into_buffer();
        assert_eq!(buffer.channel_order, ChannelOrder::Rgba);
        assert_eq!(buffer.pixels.len(), 16);
        let first = [buffer.pixels[0], buffer.pixels[1], buffer.pixels[2]];
        assert_close(first, GREEN, 8, "first frame");
    }

    #[test]
    fn declared_operations_exclude_bmp() {
        let decl = &FramesBackend::default().states()[0];
        assert!(!decl.operations.contains(&OperationKind::SaveAsBmp));
        assert_eq!(decl.operations.len(), OperationKind::ALL.len() - 1);
    }

    #[test]
    fn gif_edge_is_cheapest() {
        let converters = FramesBackend::default().converters();
        let cost = |from| converters.iter().find(|c| c.from == from).map(|c| c.cost);
        assert_eq!(cost(StateType::GIF_FILE), Some(1));
        assert_eq!(cost(StateType::JPEG_FILE), Some(2));
    }
}
