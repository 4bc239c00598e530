use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Duplicate coordinate '{0}' in validation key")]
    DuplicateCoordinate(String),

    #[error("Coordinate '{name}' must be an integer, got '{value}'")]
    NonIntegerCoordinate { name: String, value: String },

    #[error("Malformed key token '{0}': expected KEY=VALUE")]
    MalformedToken(String),
}

/// Errors raised by [`crate::Store`] implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Dataset {dataset_type} not found for {key}")]
    NotFound { dataset_type: String, key: String },

    #[error("Dataset {dataset_type} could not be deserialized: {message}")]
    Deserialize {
        dataset_type: String,
        message: String,
    },

    #[error("Unsupported persisted format for {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Key {key} lacks dimension '{dimension}' required by {dataset_type}")]
    IncompleteKey {
        dataset_type: String,
        key: String,
        dimension: String,
    },

    #[error("Store root {0} is not a directory")]
    InvalidRoot(PathBuf),

    #[error("Invalid store registry {path}: {message}")]
    InvalidRegistry { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_deserialize(&self) -> bool {
        matches!(self, StoreError::Deserialize { .. })
    }
}
