use serde::{Deserialize, Serialize};
use std::fmt;

use crate::key::ValidationKey;

/// Dataset types ending with this suffix are best-effort task metadata
/// sidecars.
pub const METADATA_SUFFIX: &str = "_metadata";

/// A named, read-only handle into the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub dataset_type: String,
    pub key: ValidationKey,
}

impl DatasetRef {
    pub fn new(dataset_type: impl Into<String>, key: ValidationKey) -> Self {
        Self {
            dataset_type: dataset_type.into(),
            key,
        }
    }

    /// Whether this dataset follows the metadata-sidecar naming convention.
    pub fn is_metadata(&self) -> bool {
        self.dataset_type.ends_with(METADATA_SUFFIX)
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.dataset_type, self.key)
    }
}
