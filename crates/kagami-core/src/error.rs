use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during Kagami operations.
#[derive(Debug, Error)]
pub enum KagamiError {
    /// A vector or query row does not have the configured feature dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The store's feature dimension.
        expected: usize,
        /// The width that was supplied.
        actual: usize,
    },

    /// Query input is not a well-formed 2D matrix.
    #[error("invalid query shape: {0}")]
    InvalidShape(String),

    /// A persisted index exists but cannot be parsed.
    #[error("corrupt index at {path:?}: {reason}")]
    CorruptIndex {
        /// The index file that failed to load.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// The label file holds more entries than the index holds vectors.
    #[error("label ledger out of step with index: {vectors} vectors, {labels} labels")]
    LedgerMismatch {
        /// Vectors recorded in the index.
        vectors: usize,
        /// Labels recorded in the ledger.
        labels: usize,
    },

    /// A label cannot be stored in the line-oriented label file.
    #[error("invalid label {0:?}")]
    InvalidLabel(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The embedder produced no usable vector for a sample.
    #[error("embedding is empty")]
    EmptyEmbedding,

    /// The embedder failed on a sample.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The model weights file could not be loaded.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Candle ML framework error.
    #[error("ML inference error: {0}")]
    Candle(String),

    /// An image could not be opened or decoded.
    #[error("image error: {0}")]
    Image(String),

    /// A class directory already exists.
    #[error("class {0:?} already exists")]
    ClassExists(String),

    /// A class directory does not exist.
    #[error("class {0:?} does not exist")]
    ClassNotFound(String),

    /// The data root is not a directory.
    #[error("{0:?} is not a directory")]
    NotADirectory(PathBuf),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<candle_core::Error> for KagamiError {
    fn from(err: candle_core::Error) -> Self {
        Self::Candle(err.to_string())
    }
}

impl From<image::ImageError> for KagamiError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err.to_string())
    }
}

/// Result type alias for Kagami operations.
pub type Result<T> = std::result::Result<T, KagamiError>;
