//! Error types for brickstream

use thiserror::Error;

use crate::compression::CodecError;
use crate::layout::LayoutError;
use crate::store::{BrickKey, DatasetError, StoreError};
use crate::wire::{ResponseStatus, WireError};

/// Main error type returned by session operations
#[derive(Debug, Error)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection lost: {0}")]
    ConnectionLost(#[source] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    OutOfDomain(#[from] LayoutError),

    #[error("brick {0:?} not found")]
    NotFound(BrickKey),

    #[error("dataset has no LOD {0}")]
    UnknownLod(u32),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// The server answered a command with a failure status
    #[error("server reported {status:?}: {message}")]
    Remote {
        status: ResponseStatus,
        message: String,
    },

    /// The call is not valid in the session's current state
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<WireError> for Error {
    fn from(e: WireError) -> Self {
        match e {
            WireError::ConnectionLost(io) => Error::ConnectionLost(io),
            other => Error::Protocol(other.to_string()),
        }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => Error::NotFound(key),
            StoreError::UnknownLod(lod) => Error::UnknownLod(lod),
            StoreError::Layout(e) => Error::OutOfDomain(e),
            StoreError::Codec(e) => Error::Codec(e),
            StoreError::Dataset(e) => Error::Dataset(e),
        }
    }
}

impl Error {
    /// Whether the session that produced this error is no longer usable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ConnectionLost(_) | Error::Protocol(_))
    }
}
