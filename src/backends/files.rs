//! Encoded file states.
//!
//! A [`FileState`] is the entry point of every chain: it owns the caller's
//! byte source and does nothing else. Decoding backends declare `open`
//! converters out of these states.

use crate::state::{
    Backend, Converter, ImageState, Operation, Outcome, StateDecl, StateError, StateType,
};
use std::any::Any;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

/// Readable, seekable byte source a decoder can consume.
pub trait ImageSource: BufRead + Seek + Send {}

impl<T: BufRead + Seek + Send> ImageSource for T {}

/// Every file state type, in registration order.
pub const FILE_STATES: [StateType; 4] = [
    StateType::JPEG_FILE,
    StateType::PNG_FILE,
    StateType::GIF_FILE,
    StateType::BMP_FILE,
];

pub struct FileState {
    state_type: StateType,
    source: Box<dyn ImageSource>,
}

impl FileState {
    pub fn from_reader(state_type: StateType, source: impl ImageSource + 'static) -> Self {
        Self {
            state_type,
            source: Box::new(source),
        }
    }

    pub fn from_bytes(state_type: StateType, bytes: Vec<u8>) -> Self {
        Self::from_reader(state_type, Cursor::new(bytes))
    }

    pub fn open_path(state_type: StateType, path: &Path) -> Result<Self, StateError> {
        let file = File::open(path)?;
        Ok(Self::from_reader(state_type, BufReader::new(file)))
    }

    /// Read the whole source from its start.
    pub fn read_all(&mut self) -> Result<Vec<u8>, StateError> {
        self.source.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        self.source.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl fmt::Debug for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileState")
            .field("state_type", &self.state_type)
            .finish_non_exhaustive()
    }
}

impl ImageState for FileState {
    fn state_type(&self) -> StateType {
        self.state_type
    }

    fn perform(&mut self, op: Operation<'_>) -> Result<Outcome, StateError> {
        Err(StateError::unsupported(op.kind(), self.state_type))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Take the bytes out of a file state, as every `open` converter does.
pub(crate) fn read_file_state(
    state: Box<dyn ImageState>,
    expected: StateType,
) -> Result<Vec<u8>, StateError> {
    let mut file = crate::state::downcast_state::<FileState>(state, expected)?;
    file.read_all()
}

/// Declares the encoded file states. Always available.
pub struct FilesBackend;

impl Backend for FilesBackend {
    fn name(&self) -> &'static str {
        "files"
    }

    fn check(&self) -> Result<(), StateError> {
        Ok(())
    }

    fn states(&self) -> Vec<StateDecl> {
        FILE_STATES
            .iter()
            .map(|&state| StateDecl::new(state, &[]))
            .collect()
    }

    fn converters(&self) -> Vec<Converter> {
        Vec::new()
    }
}
