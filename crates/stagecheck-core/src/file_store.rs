//! File-backed store reader
//!
//! Layout under the data root:
//!
//! ```text
//! <root>/registry.yaml                       optional dataset-type dimensions
//! <root>[/rerun/<rerun>][/<collection>]/     data root
//!     <dataset_type>/<stem>.<ext>
//! ```
//!
//! The stem is the key's coordinates sorted by name as `name=value` joined
//! with `,` (`ccd=16,visit=903334`), or `global` for the empty key. Documents
//! with a `.json`, `.yaml` or `.yml` extension can be fetched; any other file
//! can only be located.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::artifact::Artifact;
use crate::dataset::DatasetRef;
use crate::error::StoreError;
use crate::key::ValidationKey;
use crate::store::Store;

const REGISTRY_FILE: &str = "registry.yaml";
const GLOBAL_STEM: &str = "global";

/// Parse a persisted document by extension.
///
/// `.json` goes through `serde_json`, `.yaml`/`.yml` through `serde_yaml`;
/// anything else is [`StoreError::UnsupportedFormat`]. Content that does not
/// parse, invalid UTF-8 included, is [`StoreError::Deserialize`].
pub fn read_artifact(path: &Path, dataset_type: &str) -> Result<Artifact, StoreError> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let parsed = match extension.as_str() {
        "json" => serde_json::from_slice::<Artifact>(&fs::read(path)?).map_err(|e| e.to_string()),
        "yaml" | "yml" => {
            serde_yaml::from_slice::<Artifact>(&fs::read(path)?).map_err(|e| e.to_string())
        }
        _ => return Err(StoreError::UnsupportedFormat(path.to_path_buf())),
    };

    parsed.map_err(|message| StoreError::Deserialize {
        dataset_type: dataset_type.to_string(),
        message,
    })
}

/// Where a repository lives and which of its outputs to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreLocation {
    pub root: PathBuf,
    pub rerun: Option<String>,
    pub collection: Option<String>,
}

impl StoreLocation {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            rerun: None,
            collection: None,
        }
    }

    pub fn with_rerun(mut self, rerun: impl Into<String>) -> Self {
        self.rerun = Some(rerun.into());
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn data_root(&self) -> PathBuf {
        let mut path = self.root.clone();
        if let Some(ref rerun) = self.rerun {
            path = path.join("rerun").join(rerun);
        }
        if let Some(ref collection) = self.collection {
            path = path.join(collection);
        }
        path
    }
}

#[derive(Debug, Default, Deserialize)]
struct StoreRegistry {
    #[serde(default)]
    dataset_types: BTreeMap<String, Vec<String>>,
}

/// Reads datasets persisted as files under a repository root.
#[derive(Debug)]
pub struct FileStore {
    data_root: PathBuf,
    registry: StoreRegistry,
}

impl FileStore {
    pub fn open(location: &StoreLocation) -> Result<Self, StoreError> {
        let data_root = location.data_root();
        if !data_root.is_dir() {
            return Err(StoreError::InvalidRoot(data_root));
        }

        let registry_path = location.root.join(REGISTRY_FILE);
        let registry = if registry_path.is_file() {
            let content = fs::read_to_string(&registry_path)?;
            serde_yaml::from_str(&content).map_err(|e| StoreError::InvalidRegistry {
                path: registry_path.clone(),
                message: e.to_string(),
            })?
        } else {
            StoreRegistry::default()
        };

        debug!(
            "Opened store at {} ({} declared dataset types)",
            data_root.display(),
            registry.dataset_types.len()
        );

        Ok(Self {
            data_root,
            registry,
        })
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// The key actually used to address `dataset`, after projecting onto
    /// the dimensions declared for its type.
    fn storage_key(&self, dataset: &DatasetRef) -> Result<ValidationKey, StoreError> {
        match self.registry.dataset_types.get(&dataset.dataset_type) {
            Some(dimensions) => {
                dataset
                    .key
                    .project(dimensions)
                    .map_err(|dimension| StoreError::IncompleteKey {
                        dataset_type: dataset.dataset_type.clone(),
                        key: dataset.key.to_string(),
                        dimension,
                    })
            }
            None => Ok(dataset.key.clone()),
        }
    }

    /// File stem under which `key` is persisted.
    pub fn stem(key: &ValidationKey) -> String {
        if key.is_empty() {
            GLOBAL_STEM.to_string()
        } else {
            key.canonical()
        }
    }

    fn locate(&self, dataset: &DatasetRef) -> Result<Option<PathBuf>, StoreError> {
        let key = self.storage_key(dataset)?;
        let dir = self.data_root.join(&dataset.dataset_type);
        if !dir.is_dir() {
            return Ok(None);
        }

        let stem = Self::stem(&key);
        let pattern = format!(
            "{}/{}.*",
            glob::Pattern::escape(&dir.to_string_lossy()),
            glob::Pattern::escape(&stem)
        );
        let paths = glob::glob(&pattern).map_err(|e| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                e.to_string(),
            ))
        })?;

        for entry in paths {
            let path = entry.map_err(glob::GlobError::into_error)?;
            let exact = path.file_stem().map_or(false, |s| s.to_string_lossy() == stem);
            if exact && path.is_file() {
                debug!("Resolved {} to {}", dataset, path.display());
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    fn not_found(dataset: &DatasetRef) -> StoreError {
        StoreError::NotFound {
            dataset_type: dataset.dataset_type.clone(),
            key: dataset.key.to_string(),
        }
    }
}

impl Store for FileStore {
    fn exists(&self, dataset: &DatasetRef) -> Result<bool, StoreError> {
        Ok(self.locate(dataset)?.is_some())
    }

    fn get(&self, dataset: &DatasetRef) -> Result<Artifact, StoreError> {
        let path = self
            .locate(dataset)?
            .ok_or_else(|| Self::not_found(dataset))?;

        read_artifact(&path, &dataset.dataset_type)
    }

    fn get_uri(&self, dataset: &DatasetRef) -> Result<PathBuf, StoreError> {
        self.locate(dataset)?
            .ok_or_else(|| Self::not_found(dataset))
    }
}
