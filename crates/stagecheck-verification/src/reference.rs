//! Optional reference-catalog collaborator for cross-match checks
//!
//! Match datasets only carry reference ids. Resolving them requires a
//! reference catalog, which is not always installed alongside the
//! repository; when it is absent the cross-match step is skipped.

use std::collections::HashSet;
use std::path::Path;

use stagecheck_core::artifact::field_i64;
use stagecheck_core::{read_artifact, Artifact, Catalog, StoreError};
use tracing::info;

const REFERENCE_ID_COLUMN: &str = "id";

pub trait ReferenceCatalog {
    fn name(&self) -> &str;

    /// Whether a reference object with this id exists.
    fn contains(&self, ref_id: i64) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reference catalog indexed by the `id` column of a persisted catalog.
#[derive(Debug, Clone)]
pub struct FileReferenceCatalog {
    name: String,
    ids: HashSet<i64>,
}

impl FileReferenceCatalog {
    pub fn from_catalog(name: impl Into<String>, catalog: &Catalog) -> Self {
        let ids = catalog
            .records()
            .filter_map(|r| field_i64(r, REFERENCE_ID_COLUMN))
            .collect();
        Self {
            name: name.into(),
            ids,
        }
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "reference".to_string());

        match read_artifact(path, &name)? {
            Artifact::Catalog(catalog) => {
                let refcat = Self::from_catalog(name, &catalog);
                info!("Loaded reference catalog {} ({} objects)", refcat.name, refcat.ids.len());
                Ok(refcat)
            }
            other => Err(StoreError::Deserialize {
                dataset_type: name,
                message: format!("expected a catalog, found {}", other.kind_name()),
            }),
        }
    }
}

impl ReferenceCatalog for FileReferenceCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn contains(&self, ref_id: i64) -> bool {
        self.ids.contains(&ref_id)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}
