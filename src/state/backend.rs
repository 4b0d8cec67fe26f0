//! The state interface and the backend contract.
//!
//! An [`ImageState`] is one concrete representation of an image: encoded
//! file bytes, a decoded codec handle, or a raw pixel buffer. A [`Backend`]
//! bridges one codec library into this interface by declaring:
//!
//! - an availability probe ([`Backend::check`]),
//! - the state types it owns and the operations each one implements
//!   ([`Backend::states`]),
//! - the conversion edges it can perform ([`Backend::converters`]), both
//!   *into* its own states and *out of* them.
//!
//! The [`Registry`](crate::Registry) turns these declarations into a graph.

use super::params::{Operation, OperationKind, Outcome};
use std::any::Any;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("backend '{backend}' unavailable: {reason}")]
    UnavailableBackend {
        backend: &'static str,
        reason: String,
    },
    #[error("{operation}: decode failed: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
    #[error("{operation}: encode failed: {message}")]
    Encode {
        operation: &'static str,
        message: String,
    },
    #[error("{operation}: invalid argument: {message}")]
    InvalidArgument {
        operation: &'static str,
        message: String,
    },
    #[error("no conversion path from {from} to {to}")]
    NoConversionPath { from: StateType, to: StateType },
    #[error("operation '{operation}' not supported by any state reachable from {state}")]
    OperationNotSupported {
        operation: OperationKind,
        state: StateType,
    },
    #[error("converter expected {expected}, got {found}")]
    WrongState {
        expected: StateType,
        found: StateType,
    },
    #[error("operation '{operation}' returned {outcome:?}")]
    UnexpectedOutcome {
        operation: OperationKind,
        outcome: Outcome,
    },
    #[error("image state was consumed by a failed conversion")]
    Consumed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StateError {
    pub(crate) fn decode(operation: &'static str, err: impl fmt::Display) -> Self {
        StateError::Decode {
            operation,
            message: err.to_string(),
        }
    }

    pub(crate) fn encode(operation: &'static str, err: impl fmt::Display) -> Self {
        StateError::Encode {
            operation,
            message: err.to_string(),
        }
    }

    pub(crate) fn unsupported(operation: OperationKind, state: StateType) -> Self {
        StateError::OperationNotSupported { operation, state }
    }
}

/// Identifier of a representation kind.
///
/// Built-in types are associated constants; third-party backends (and tests)
/// mint their own with [`StateType::new`]. Identifiers must be unique within
/// a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateType(&'static str);

impl StateType {
    pub const JPEG_FILE: StateType = StateType("jpeg-file");
    pub const PNG_FILE: StateType = StateType("png-file");
    pub const GIF_FILE: StateType = StateType("gif-file");
    pub const BMP_FILE: StateType = StateType("bmp-file");
    pub const RGB_BUFFER: StateType = StateType("rgb-buffer");
    pub const RGBA_BUFFER: StateType = StateType("rgba-buffer");
    pub const RASTER: StateType = StateType("raster");
    pub const FRAMES: StateType = StateType("frames");
    pub const PNG_IMAGE: StateType = StateType("png-image");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A concrete image representation.
///
/// Operations that logically mutate (resize, crop) replace the wrapped codec
/// handle in place. Conversions are not methods here: they consume the boxed
/// state through a [`Converter`], so a converted state can never be reused.
///
/// States are `Send` but deliberately not `Sync`: one conversion chain owns
/// its state at a time.
pub trait ImageState: Any + Send {
    fn state_type(&self) -> StateType;

    /// Run one operation. Kinds the state does not declare return
    /// [`StateError::OperationNotSupported`].
    fn perform(&mut self, op: Operation<'_>) -> Result<Outcome, StateError>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl fmt::Debug for dyn ImageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageState({})", self.state_type())
    }
}

/// Take ownership of a boxed state as its concrete type.
pub fn downcast_state<T: ImageState>(
    state: Box<dyn ImageState>,
    expected: StateType,
) -> Result<Box<T>, StateError> {
    let found = state.state_type();
    state
        .into_any()
        .downcast::<T>()
        .map_err(|_| StateError::WrongState { expected, found })
}

/// A state type owned by a backend, with the operations it implements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDecl {
    pub state: StateType,
    pub operations: Vec<OperationKind>,
}

impl StateDecl {
    pub fn new(state: StateType, operations: &[OperationKind]) -> Self {
        Self {
            state,
            operations: operations.to_vec(),
        }
    }
}

pub type ConvertFn =
    Box<dyn Fn(Box<dyn ImageState>) -> Result<Box<dyn ImageState>, StateError> + Send + Sync>;

/// A directed conversion edge `from → to`.
pub struct Converter {
    pub from: StateType,
    pub to: StateType,
    /// Relative cost used by the router. Defaults to 1.
    pub cost: u32,
    /// Name of the conversion, e.g. `open` or `to_buffer_rgb`.
    pub name: &'static str,
    pub(crate) convert: ConvertFn,
}

impl Converter {
    pub fn new<F>(from: StateType, to: StateType, name: &'static str, convert: F) -> Self
    where
        F: Fn(Box<dyn ImageState>) -> Result<Box<dyn ImageState>, StateError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            from,
            to,
            cost: 1,
            name,
            convert: Box::new(convert),
        }
    }

    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// Run the conversion, checking the produced state has the declared type.
    pub fn apply(&self, state: Box<dyn ImageState>) -> Result<Box<dyn ImageState>, StateError> {
        let found = state.state_type();
        if found != self.from {
            return Err(StateError::WrongState {
                expected: self.from,
                found,
            });
        }
        let converted = (self.convert)(state)?;
        let produced = converted.state_type();
        if produced != self.to {
            return Err(StateError::WrongState {
                expected: self.to,
                found: produced,
            });
        }
        Ok(converted)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("cost", &self.cost)
            .field("name", &self.name)
            .finish()
    }
}

/// A codec library bridged into the state interface.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Availability probe, run once at registry build time. A failure
    /// excludes the backend and all of its edges.
    fn check(&self) -> Result<(), StateError>;

    fn states(&self) -> Vec<StateDecl>;

    fn converters(&self) -> Vec<Converter>;
}
