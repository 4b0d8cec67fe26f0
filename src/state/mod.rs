//! The state interface: what every image representation exposes.
//!
//! | Concern | Item |
//! |---|---|
//! | **Identity** | [`StateType`] |
//! | **Behaviour** | [`ImageState`] trait (`perform` one [`Operation`]) |
//! | **Declaration** | [`Backend`] trait, [`StateDecl`], [`Converter`] |
//! | **Failures** | [`StateError`] |
//!
//! The module is split into:
//! - **Backend**: the [`ImageState`] / [`Backend`] traits and errors
//! - **Parameters**: sizes, rectangles, quality, operations, pixel buffers
//! - **Calculations**: pure argument checks (crop bounds, buffer lengths)
//! - **Orientation**: EXIF orientation table and strategy probe

pub mod backend;
mod calculations;
pub mod orientation;
mod params;

pub use backend::{
    Backend, ConvertFn, Converter, ImageState, StateDecl, StateError, StateType, downcast_state,
};
pub use calculations::{buffer_len, validate_crop, validate_resize};
pub use orientation::OrientStrategy;
pub use params::{
    ChannelOrder, Operation, OperationKind, Outcome, PixelBuffer, Quality, Rect, SaveFormat, Size,
};
