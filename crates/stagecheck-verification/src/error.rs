//! Error types for configuring a validation run

use std::path::PathBuf;
use stagecheck_core::{CoreError, StoreError};
use thiserror::Error;

/// Problems detected before any dataset is read.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown validation variant '{name}' (known: {known})")]
    UnknownVariant { name: String, known: String },

    #[error("Malformed validation key: {0}")]
    MalformedKey(#[from] CoreError),

    #[error("Cannot open store: {0}")]
    Store(#[source] StoreError),

    #[error("Cannot load reference catalog {path}: {source}")]
    ReferenceCatalog {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
}

/// Inconsistent variant declarations, caught when the registry is built.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Validation variant '{0}' is registered twice")]
    DuplicateVariant(String),

    #[error("Variant '{variant}' declares catalog check '{check}' but has no source dataset")]
    CatalogCheckWithoutSource { variant: String, check: String },

    #[error("Variant name must not be empty")]
    EmptyName,
}
