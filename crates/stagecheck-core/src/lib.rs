//! Core data model and read-only store access for stagecheck
//!
//! A validation run addresses pipeline outputs by dataset type and a
//! [`ValidationKey`]. Everything the engine reads goes through the
//! [`Store`] trait, which exposes exactly three read-only operations.

pub mod artifact;
pub mod dataset;
pub mod error;
pub mod file_store;
pub mod key;
pub mod store;

pub use artifact::{Artifact, Catalog, Exposure, PackageManifest, PropertySet, TransmissionCurve};
pub use dataset::{DatasetRef, METADATA_SUFFIX};
pub use error::{CoreError, StoreError};
pub use file_store::{read_artifact, FileStore, StoreLocation};
pub use key::{KeyValue, ValidationKey, ValidationKeyBuilder, NUMERIC_COORDINATES};
pub use store::{MemoryStore, Store};
