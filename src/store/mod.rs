//! Server-side brick storage
//!
//! A dataset is a container file holding per-LOD brick grids, a brick table
//! and the compressed brick payloads (see [`dataset_file`]). [`BrickStore`]
//! serves one open dataset; [`DatasetRegistry`] shares stores between
//! connections.

pub mod metadata;
pub mod dataset_file;
pub mod minmax;
pub mod brick_store;
pub mod registry;

pub use metadata::{
    BrickKey, BrickMetadata, DatasetMetadata, LodGrid, MinMaxEntry, MinMaxRecord, MinMaxTable,
    NetDataType, TypeInfo,
};
pub use dataset_file::{DatasetWriter, DATASET_EXTENSION};
pub use brick_store::BrickStore;
pub use registry::DatasetRegistry;

use std::path::PathBuf;

use thiserror::Error;

use crate::compression::CodecError;
use crate::layout::LayoutError;

/// Failures opening, parsing or writing a dataset
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset {} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("dataset {} has unsupported element type {type_info:?}", .path.display())]
    UnsupportedType { path: PathBuf, type_info: TypeInfo },

    #[error("dataset {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("I/O error on dataset {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rejected input while building a dataset or naming one
    #[error("invalid dataset request: {0}")]
    Invalid(String),
}

/// Failures serving bricks from an open dataset
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("brick {0:?} not found")]
    NotFound(BrickKey),

    #[error("dataset has no LOD {0}")]
    UnknownLod(u32),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}
