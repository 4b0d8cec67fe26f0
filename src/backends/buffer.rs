//! Raw pixel-buffer states.
//!
//! The bridge between codec handles and pixel-level consumers. Decoding
//! backends declare `to_buffer_rgb`/`to_buffer_rgba` edges into these states
//! and, where they can wrap raw pixels, edges out of them.

use crate::state::{
    Backend, ChannelOrder, Converter, ImageState, Operation, OperationKind, Outcome, PixelBuffer,
    StateDecl, StateError, StateType,
};
use std::any::Any;

const BUFFER_OPERATIONS: &[OperationKind] = &[
    OperationKind::GetSize,
    OperationKind::HasAlpha,
    OperationKind::HasAnimation,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferState {
    buffer: PixelBuffer,
}

impl BufferState {
    pub fn new(buffer: PixelBuffer) -> Self {
        Self { buffer }
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn into_buffer(self) -> PixelBuffer {
        self.buffer
    }
}

/// State type holding a buffer of the given channel order.
pub fn buffer_state_type(order: ChannelOrder) -> StateType {
    match order {
        ChannelOrder::Rgb => StateType::RGB_BUFFER,
        ChannelOrder::Rgba => StateType::RGBA_BUFFER,
    }
}

impl ImageState for BufferState {
    fn state_type(&self) -> StateType {
        buffer_state_type(self.buffer.channel_order)
    }

    fn perform(&mut self, op: Operation<'_>) -> Result<Outcome, StateError> {
        match op {
            Operation::GetSize => Ok(Outcome::Size(self.buffer.size)),
            Operation::HasAlpha => Ok(Outcome::Flag(
                self.buffer.channel_order == ChannelOrder::Rgba,
            )),
            Operation::HasAnimation => Ok(Outcome::Flag(false)),
            other => Err(StateError::unsupported(other.kind(), self.state_type())),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Unwrap a buffer state into its pixels.
pub(crate) fn take_buffer(
    state: Box<dyn ImageState>,
    expected: StateType,
) -> Result<PixelBuffer, StateError> {
    Ok(crate::state::downcast_state::<BufferState>(state, expected)?.into_buffer())
}

/// Declares the RGB and RGBA buffer states. Always available.
pub struct BufferBackend;

impl Backend for BufferBackend {
    fn name(&self) -> &'static str {
        "buffer"
    }

    fn check(&self) -> Result<(), StateError> {
        Ok(())
    }

    fn states(&self) -> Vec<StateDecl> {
        vec![
            StateDecl::new(StateType::RGB_BUFFER, BUFFER_OPERATIONS),
            StateDecl::new(StateType::RGBA_BUFFER, BUFFER_OPERATIONS),
        ]
    }

    fn converters(&self) -> Vec<Converter> {
        Vec::new()
    }
}
