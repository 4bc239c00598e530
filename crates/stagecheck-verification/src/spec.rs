//! Declarative description of what to check for one pipeline stage

use std::fmt;
use std::sync::Arc;

use stagecheck_core::{Artifact, Catalog, DatasetRef, Exposure, Store, ValidationKey};

use crate::error::RegistryError;
use crate::reporter::{AssertionFailure, CheckResult, Reporter};

pub const DEFAULT_MIN_SOURCES: usize = 100;
pub const DEFAULT_MIN_MATCHES: usize = 10;

pub type CatalogCheckFn = dyn Fn(&Catalog, &mut Reporter) -> CheckResult + Send + Sync;
pub type StoreCheckFn = dyn Fn(&CheckContext<'_>, &mut Reporter) -> CheckResult + Send + Sync;

/// A stage-specific assertion computed from artifact contents.
#[derive(Clone)]
pub enum DerivedCheck {
    /// Runs against the catalog already fetched by the source check.
    Catalog {
        name: &'static str,
        check: Arc<CatalogCheckFn>,
    },
    /// Fetches whatever it needs for the current key.
    Store {
        name: &'static str,
        check: Arc<StoreCheckFn>,
    },
}

impl DerivedCheck {
    pub fn catalog<F>(name: &'static str, check: F) -> Self
    where
        F: Fn(&Catalog, &mut Reporter) -> CheckResult + Send + Sync + 'static,
    {
        DerivedCheck::Catalog {
            name,
            check: Arc::new(check),
        }
    }

    pub fn store<F>(name: &'static str, check: F) -> Self
    where
        F: Fn(&CheckContext<'_>, &mut Reporter) -> CheckResult + Send + Sync + 'static,
    {
        DerivedCheck::Store {
            name,
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DerivedCheck::Catalog { name, .. } | DerivedCheck::Store { name, .. } => *name,
        }
    }

    pub fn needs_catalog(&self) -> bool {
        matches!(self, DerivedCheck::Catalog { .. })
    }
}

impl fmt::Debug for DerivedCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.needs_catalog() { "Catalog" } else { "Store" };
        f.debug_struct(kind).field("name", &self.name()).finish()
    }
}

/// What a derived check can see: the store and the key under validation.
pub struct CheckContext<'a> {
    pub store: &'a dyn Store,
    pub key: &'a ValidationKey,
}

impl<'a> CheckContext<'a> {
    pub fn new(store: &'a dyn Store, key: &'a ValidationKey) -> Self {
        Self { store, key }
    }

    pub fn dataset(&self, dataset_type: &str) -> DatasetRef {
        DatasetRef::new(dataset_type, self.key.clone())
    }

    /// Fetch a dataset that must be readable; a failure is recorded as
    /// `"<dataset> readable"` and aborts the key.
    pub fn fetch(
        &self,
        reporter: &mut Reporter,
        dataset_type: &str,
    ) -> Result<Artifact, AssertionFailure> {
        match self.store.get(&self.dataset(dataset_type)) {
            Ok(artifact) if artifact.is_readable() => Ok(artifact),
            Ok(artifact) => Err(reporter.fail(
                format!("{} readable ({})", dataset_type, artifact.kind_name()),
                None,
            )),
            Err(e) => Err(reporter.fail(format!("{} readable", dataset_type), Some(e.to_string()))),
        }
    }

    /// Fetch a dataset that must be a catalog.
    pub fn fetch_catalog(
        &self,
        reporter: &mut Reporter,
        dataset_type: &str,
    ) -> Result<Catalog, AssertionFailure> {
        match self.fetch(reporter, dataset_type)? {
            Artifact::Catalog(catalog) => Ok(catalog),
            other => Err(reporter.fail(
                format!("{} is a catalog ({})", dataset_type, other.kind_name()),
                None,
            )),
        }
    }

    pub fn fetch_exposure(
        &self,
        reporter: &mut Reporter,
        dataset_type: &str,
    ) -> Result<Exposure, AssertionFailure> {
        match self.fetch(reporter, dataset_type)? {
            Artifact::Exposure(exposure) => Ok(exposure),
            other => Err(reporter.fail(
                format!("{} is an exposure ({})", dataset_type, other.kind_name()),
                None,
            )),
        }
    }
}

/// Static declaration of the checks for one pipeline stage.
#[derive(Debug, Clone)]
pub struct ValidatorSpec {
    pub name: String,
    pub description: String,
    /// Must exist and be readable.
    pub required_datasets: Vec<String>,
    /// Must exist on disk with non-zero size.
    pub required_files: Vec<String>,
    pub source_dataset: Option<String>,
    /// Strict lower bound on the source count.
    pub min_source_count: usize,
    pub match_dataset: Option<String>,
    pub match_full_dataset: Option<String>,
    /// Strict lower bound on match counts.
    pub min_match_count: usize,
    pub derived_checks: Vec<DerivedCheck>,
}

impl ValidatorSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required_datasets: Vec::new(),
            required_files: Vec::new(),
            source_dataset: None,
            min_source_count: DEFAULT_MIN_SOURCES,
            match_dataset: None,
            match_full_dataset: None,
            min_match_count: DEFAULT_MIN_MATCHES,
            derived_checks: Vec::new(),
        }
    }

    pub fn datasets<I, S>(mut self, datasets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_datasets.extend(datasets.into_iter().map(Into::into));
        self
    }

    pub fn files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_files.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn source(mut self, dataset: impl Into<String>) -> Self {
        self.source_dataset = Some(dataset.into());
        self
    }

    pub fn min_sources(mut self, count: usize) -> Self {
        self.min_source_count = count;
        self
    }

    pub fn matches(mut self, dataset: impl Into<String>) -> Self {
        self.match_dataset = Some(dataset.into());
        self
    }

    pub fn full_matches(mut self, dataset: impl Into<String>) -> Self {
        self.match_full_dataset = Some(dataset.into());
        self
    }

    pub fn min_matches(mut self, count: usize) -> Self {
        self.min_match_count = count;
        self
    }

    pub fn derive(mut self, check: DerivedCheck) -> Self {
        self.derived_checks.push(check);
        self
    }

    /// Reject declarations the engine cannot honour.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.source_dataset.is_none() {
            if let Some(check) = self.derived_checks.iter().find(|c| c.needs_catalog()) {
                return Err(RegistryError::CatalogCheckWithoutSource {
                    variant: self.name.clone(),
                    check: check.name().to_string(),
                });
            }
        }
        Ok(())
    }
}
