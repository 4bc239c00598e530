//! The read-only store interface consumed by the validation engine

use std::collections::HashMap;
use std::path::PathBuf;

use crate::artifact::Artifact;
use crate::dataset::DatasetRef;
use crate::error::StoreError;

/// Read-only access to a versioned dataset store.
///
/// Implementations must not apply any leniency of their own: a dataset that
/// exists but cannot be read is reported as [`StoreError::Deserialize`] and
/// the caller decides what that means.
pub trait Store {
    /// Whether a dataset is present for the given key.
    fn exists(&self, dataset: &DatasetRef) -> Result<bool, StoreError>;

    /// Fetch and deserialize a dataset.
    fn get(&self, dataset: &DatasetRef) -> Result<Artifact, StoreError>;

    /// Resolve the on-disk location backing a dataset.
    fn get_uri(&self, dataset: &DatasetRef) -> Result<PathBuf, StoreError>;
}

impl<S: Store + ?Sized> Store for &S {
    fn exists(&self, dataset: &DatasetRef) -> Result<bool, StoreError> {
        (**self).exists(dataset)
    }

    fn get(&self, dataset: &DatasetRef) -> Result<Artifact, StoreError> {
        (**self).get(dataset)
    }

    fn get_uri(&self, dataset: &DatasetRef) -> Result<PathBuf, StoreError> {
        (**self).get_uri(dataset)
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Artifact(Artifact),
    Unreadable(String),
    File(PathBuf),
}

/// In-memory store, for tests and for embedding the engine in other tools.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<(String, String), Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(dataset: &DatasetRef) -> (String, String) {
        (dataset.dataset_type.clone(), dataset.key.canonical())
    }

    pub fn insert(&mut self, dataset: &DatasetRef, artifact: Artifact) {
        self.entries
            .insert(Self::slot(dataset), Entry::Artifact(artifact));
    }

    /// Register a dataset that exists but fails to deserialize.
    pub fn insert_unreadable(&mut self, dataset: &DatasetRef, message: impl Into<String>) {
        self.entries
            .insert(Self::slot(dataset), Entry::Unreadable(message.into()));
    }

    /// Register a file-backed dataset living at `path`.
    pub fn insert_file(&mut self, dataset: &DatasetRef, path: impl Into<PathBuf>) {
        self.entries
            .insert(Self::slot(dataset), Entry::File(path.into()));
    }

    pub fn remove(&mut self, dataset: &DatasetRef) {
        self.entries.remove(&Self::slot(dataset));
    }

    fn entry(&self, dataset: &DatasetRef) -> Result<&Entry, StoreError> {
        self.entries
            .get(&Self::slot(dataset))
            .ok_or_else(|| StoreError::NotFound {
                dataset_type: dataset.dataset_type.clone(),
                key: dataset.key.to_string(),
            })
    }
}

impl Store for MemoryStore {
    fn exists(&self, dataset: &DatasetRef) -> Result<bool, StoreError> {
        Ok(self.entries.contains_key(&Self::slot(dataset)))
    }

    fn get(&self, dataset: &DatasetRef) -> Result<Artifact, StoreError> {
        match self.entry(dataset)? {
            Entry::Artifact(artifact) => Ok(artifact.clone()),
            Entry::Unreadable(message) => Err(StoreError::Deserialize {
                dataset_type: dataset.dataset_type.clone(),
                message: message.clone(),
            }),
            Entry::File(path) => Err(StoreError::UnsupportedFormat(path.clone())),
        }
    }

    fn get_uri(&self, dataset: &DatasetRef) -> Result<PathBuf, StoreError> {
        match self.entry(dataset)? {
            Entry::File(path) => Ok(path.clone()),
            _ => Ok(PathBuf::from(format!(
                "memory://{}/{}",
                dataset.dataset_type,
                dataset.key.canonical()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Catalog;
    use crate::key::ValidationKey;

    fn src_ref() -> DatasetRef {
        DatasetRef::new(
            "src",
            ValidationKey::builder().coord("visit", 903334).coord("ccd", 16).build(),
        )
    }

    #[test]
    fn test_lookup_ignores_coordinate_order() {
        let mut store = MemoryStore::new();
        store.insert(&src_ref(), Artifact::Catalog(Catalog::default()));

        let reordered = DatasetRef::new(
            "src",
            ValidationKey::builder().coord("ccd", 16).coord("visit", 903334).build(),
        );
        assert!(store.exists(&reordered).unwrap());
        assert!(store.get(&reordered).is_ok());
    }

    #[test]
    fn test_missing_dataset_is_not_found() {
        let store = MemoryStore::new();
        assert!(!store.exists(&src_ref()).unwrap());
        assert!(store.get(&src_ref()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_unreadable_dataset_exists_but_fails_to_deserialize() {
        let mut store = MemoryStore::new();
        store.insert_unreadable(&src_ref(), "truncated");
        assert!(store.exists(&src_ref()).unwrap());
        assert!(store.get(&src_ref()).unwrap_err().is_deserialize());
    }

    #[test]
    fn test_store_is_usable_through_reference() {
        let mut store = MemoryStore::new();
        store.insert(&src_ref(), Artifact::Catalog(Catalog::default()));
        let by_ref: &dyn Store = &store;
        assert!(by_ref.exists(&src_ref()).unwrap());
    }
}
