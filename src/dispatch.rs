//! The user-facing image handle.
//!
//! [`Image`] pairs a registry with the current state. Every operation goes
//! through [`Image::dispatch`]: when the current state type does not declare
//! the operation, the handle converts itself to the nearest state type that
//! does, keeps the converted state, and runs the operation there.
//!
//! ```text
//! jpeg-file ──open──▶ raster ──crop──▶ raster ──save_as_png──▶ sink
//! ```
//!
//! Mutating helpers (`resize`, `crop`, `convert`) take `self` by value and
//! hand back the handle, so a chain reads left to right and a failed step
//! cannot leave a half-converted image in the caller's hands.

use crate::backends::{BufferState, FileState, sniff_format};
use crate::registry::Registry;
use crate::router;
use crate::state::{
    ChannelOrder, ImageState, Operation, OperationKind, Outcome, PixelBuffer, Quality, Rect,
    SaveFormat, Size, StateError, StateType, downcast_state,
};
use std::io::Write;
use std::path::Path;

pub struct Image<'r> {
    registry: &'r Registry,
    state: Option<Box<dyn ImageState>>,
}

impl<'r> Image<'r> {
    pub fn new(registry: &'r Registry, state: Box<dyn ImageState>) -> Self {
        Self {
            registry,
            state: Some(state),
        }
    }

    /// Wrap encoded bytes, detecting the container format.
    pub fn from_bytes(registry: &'r Registry, bytes: Vec<u8>) -> Result<Self, StateError> {
        let state_type = sniff_format(&bytes).ok_or_else(|| StateError::Decode {
            operation: "open",
            message: "unrecognized image format".into(),
        })?;
        Ok(Self::new(
            registry,
            Box::new(FileState::from_bytes(state_type, bytes)),
        ))
    }

    /// Read a file from disk, detecting its format from the content.
    pub fn open_path(registry: &'r Registry, path: &Path) -> Result<Self, StateError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(registry, bytes)
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Type of the current state, or `None` after a failed conversion.
    pub fn state_type(&self) -> Option<StateType> {
        self.state.as_ref().map(|s| s.state_type())
    }

    pub fn state(&self) -> Option<&dyn ImageState> {
        self.state.as_deref()
    }

    pub fn into_state(self) -> Result<Box<dyn ImageState>, StateError> {
        self.state.ok_or(StateError::Consumed)
    }

    /// Run `op` on the current state, converting first if needed.
    ///
    /// When no reachable state type implements the operation the current
    /// state is left untouched. When a conversion step fails the state is
    /// lost and later calls return [`StateError::Consumed`].
    pub fn dispatch(&mut self, op: Operation<'_>) -> Result<Outcome, StateError> {
        let kind = op.kind();
        let state = self.state.take().ok_or(StateError::Consumed)?;
        let current = state.state_type();

        let mut state = if self.registry.supports(current, kind) {
            state
        } else {
            let registry = self.registry;
            let Some(path) = router::find_nearest(registry, current, |s| registry.supports(s, kind))
            else {
                self.state = Some(state);
                return Err(StateError::unsupported(kind, current));
            };
            log::debug!("{kind}: converting {path}");
            router::execute(registry, state, &path)?
        };

        let result = state.perform(op);
        self.state = Some(state);
        result
    }

    pub fn get_size(&mut self) -> Result<Size, StateError> {
        match self.dispatch(Operation::GetSize)? {
            Outcome::Size(size) => Ok(size),
            outcome => Err(unexpected(OperationKind::GetSize, outcome)),
        }
    }

    pub fn has_alpha(&mut self) -> Result<bool, StateError> {
        self.flag(Operation::HasAlpha)
    }

    pub fn has_animation(&mut self) -> Result<bool, StateError> {
        self.flag(Operation::HasAnimation)
    }

    fn flag(&mut self, op: Operation<'_>) -> Result<bool, StateError> {
        let kind = op.kind();
        match self.dispatch(op)? {
            Outcome::Flag(flag) => Ok(flag),
            outcome => Err(unexpected(kind, outcome)),
        }
    }

    pub fn resize(mut self, size: Size) -> Result<Self, StateError> {
        self.dispatch(Operation::Resize(size))?;
        Ok(self)
    }

    /// Crop to `rect`; `left`/`top` inclusive, `right`/`bottom` exclusive.
    pub fn crop(mut self, rect: Rect) -> Result<Self, StateError> {
        self.dispatch(Operation::Crop(rect))?;
        Ok(self)
    }

    pub fn save_as_jpeg(
        &mut self,
        sink: &mut dyn Write,
        quality: Quality,
    ) -> Result<(), StateError> {
        self.dispatch(Operation::SaveAsJpeg { sink, quality })?;
        Ok(())
    }

    pub fn save_as_png(&mut self, sink: &mut dyn Write) -> Result<(), StateError> {
        self.dispatch(Operation::SaveAsPng { sink })?;
        Ok(())
    }

    pub fn save_as_gif(&mut self, sink: &mut dyn Write) -> Result<(), StateError> {
        self.dispatch(Operation::SaveAsGif { sink })?;
        Ok(())
    }

    pub fn save_as_bmp(&mut self, sink: &mut dyn Write) -> Result<(), StateError> {
        self.dispatch(Operation::SaveAsBmp { sink })?;
        Ok(())
    }

    /// Save in `format`, with the default JPEG quality.
    pub fn save(&mut self, format: SaveFormat, sink: &mut dyn Write) -> Result<(), StateError> {
        self.save_with_quality(format, sink, Quality::default())
    }

    /// Save in `format`. `quality` only affects JPEG.
    pub fn save_with_quality(
        &mut self,
        format: SaveFormat,
        sink: &mut dyn Write,
        quality: Quality,
    ) -> Result<(), StateError> {
        match format {
            SaveFormat::Jpeg => self.save_as_jpeg(sink, quality),
            SaveFormat::Png => self.save_as_png(sink),
            SaveFormat::Gif => self.save_as_gif(sink),
            SaveFormat::Bmp => self.save_as_bmp(sink),
        }
    }

    /// Convert the current state to `target` along the cheapest path.
    pub fn convert(mut self, target: StateType) -> Result<Self, StateError> {
        let state = self.state.take().ok_or(StateError::Consumed)?;
        self.state = Some(router::convert(self.registry, state, target)?);
        Ok(self)
    }

    pub fn to_buffer_rgb(self) -> Result<PixelBuffer, StateError> {
        self.to_buffer(ChannelOrder::Rgb)
    }

    pub fn to_buffer_rgba(self) -> Result<PixelBuffer, StateError> {
        self.to_buffer(ChannelOrder::Rgba)
    }

    fn to_buffer(self, order: ChannelOrder) -> Result<PixelBuffer, StateError> {
        let target = crate::backends::buffer::buffer_state_type(order);
        let state = self.convert(target)?.into_state()?;
        Ok(downcast_state::<BufferState>(state, target)?.into_buffer())
    }
}

fn unexpected(operation: OperationKind, outcome: Outcome) -> StateError {
    StateError::UnexpectedOutcome { operation, outcome }
}

impl std::fmt::Debug for Image<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("state", &self.state_type())
            .finish()
    }
}
