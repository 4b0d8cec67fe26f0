//! # pixgraph
//!
//! Route raster images between codec backends through a cost-weighted graph
//! of representations.
//!
//! An image is always in exactly one *state*: encoded file bytes, a decoded
//! `image` raster, a stack of animation frames, a `png`-crate decode, or a
//! raw pixel buffer. Each state implements some operations (size, alpha,
//! crop, save, ...). Asking for an operation the current state lacks converts
//! the image to the nearest state that has it.
//!
//! ```text
//! gif-file ──open (1)──▶ frames ──(1)──▶ rgba-buffer ──(1)──▶ raster ──▶ save_as_bmp
//! ```
//!
//! # Architecture
//!
//! ```text
//! Backend ──declares──▶ RegistryBuilder ──build──▶ Registry (immutable graph)
//!                                                     │
//!                               Image::dispatch ──▶ router (Dijkstra) ──▶ Converter chain
//! ```
//!
//! - **Backends** declare state types, the operations each implements, and
//!   weighted conversion edges. They never call one another.
//! - The **registry** probes each backend once and keeps only available ones.
//! - The **router** finds the cheapest path; ties go to registration order.
//! - The **dispatcher** ([`Image`]) converts on demand and keeps the
//!   converted state for later operations.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`state`] | State interface: `StateType`, `ImageState`, `Backend`, operations, errors |
//! | [`backends`] | Built-in adapters: files, buffer, raster, frames, png |
//! | [`registry`] | Backend registration, availability probing, graph indexing |
//! | [`router`] | Cheapest-path search and path execution |
//! | [`dispatch`] | The [`Image`] handle and operation dispatch |
//! | [`batch`] | Parallel file conversion behind `pixgraph convert` |
//! | [`config`] | `pixgraph.toml` loading, merging, and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Explicit Registration
//!
//! Backends are added with [`RegistryBuilder::register`], in order. The
//! order is part of the contract: it is the router's tie-break, so a
//! rebuilt registry routes identically.
//!
//! ## Conversions Consume Their Input
//!
//! A [`state::Converter`] takes the boxed state by value. A converted state
//! cannot be reused, and each intermediate is dropped at its step boundary.
//!
//! ## Orientation Is Normalized on Decode
//!
//! Decoded states are always upright. The EXIF orientation tag is applied
//! (through the `image` crate or a manual transform table) and then reset,
//! so no later operation has to care about it.

pub mod backends;
pub mod batch;
pub mod config;
pub mod dispatch;
pub mod output;
pub mod registry;
pub mod router;
pub mod state;

pub use backends::{FileState, sniff_format};
pub use dispatch::Image;
pub use registry::{Registry, RegistryBuilder};
pub use router::{ConversionPath, Step};
pub use state::{
    Backend, ImageState, Operation, OperationKind, Outcome, PixelBuffer, Quality, Rect,
    SaveFormat, Size, StateError, StateType,
};

#[cfg(test)]
pub(crate) mod test_helpers;
