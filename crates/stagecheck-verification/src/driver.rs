//! Runs one variant over a list of validation keys

use serde::Serialize;
use std::path::Path;
use tracing::{error, info, info_span};

use stagecheck_core::{FileStore, Store, StoreLocation, ValidationKey};

use crate::error::ConfigError;
use crate::reference::{FileReferenceCatalog, ReferenceCatalog};
use crate::registry::Registry;
use crate::spec::ValidatorSpec;
use crate::validator::{KeyOutcome, Validator};

/// Per-key outcomes of one driver run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub variant: String,
    pub outcomes: Vec<KeyOutcome>,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(KeyOutcome::passed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    pub fn failed_keys(&self) -> impl Iterator<Item = &KeyOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }
}

pub struct Driver<'a> {
    registry: &'a Registry,
    store: &'a dyn Store,
    reference: Option<&'a dyn ReferenceCatalog>,
}

impl<'a> Driver<'a> {
    pub fn new(registry: &'a Registry, store: &'a dyn Store) -> Self {
        Self {
            registry,
            store,
            reference: None,
        }
    }

    pub fn with_reference_catalog(mut self, reference: Option<&'a dyn ReferenceCatalog>) -> Self {
        self.reference = reference;
        self
    }

    pub fn run(&self, variant: &str, keys: &[ValidationKey]) -> Result<RunSummary, ConfigError> {
        let spec = self.registry.resolve(variant)?;
        Ok(self.run_spec(spec, keys))
    }

    /// Validate every key in order. A failed key does not stop the run;
    /// no keys means one run with the empty key.
    pub fn run_spec(&self, spec: &ValidatorSpec, keys: &[ValidationKey]) -> RunSummary {
        let empty = [ValidationKey::empty()];
        let keys = if keys.is_empty() { &empty[..] } else { keys };

        let validator = Validator::new(spec, self.store).with_reference_catalog(self.reference);
        let mut outcomes = Vec::with_capacity(keys.len());

        for key in keys {
            let span = info_span!("validate", variant = %spec.name, key = %key);
            let _enter = span.enter();

            info!("Validating {} for {}", spec.name, key);
            let outcome = validator.run(key);
            match outcome.failure {
                Some(ref failure) => error!("{} failed for {}: {}", spec.name, key, failure),
                None => info!("{} passed for {}", spec.name, key),
            }
            outcomes.push(outcome);
        }

        RunSummary {
            variant: spec.name.clone(),
            outcomes,
        }
    }
}

/// Resolve `variant`, open the repository at `location` and validate `keys`.
///
/// The variant is resolved before the store is touched, so an unknown name
/// fails without any I/O.
pub fn validate(
    registry: &Registry,
    variant: &str,
    location: &StoreLocation,
    reference: Option<&Path>,
    keys: &[ValidationKey],
) -> Result<RunSummary, ConfigError> {
    let spec = registry.resolve(variant)?;
    let store = FileStore::open(location).map_err(ConfigError::Store)?;

    let refcat = reference
        .map(|path| {
            FileReferenceCatalog::load(path).map_err(|source| ConfigError::ReferenceCatalog {
                path: path.to_path_buf(),
                source,
            })
        })
        .transpose()?;

    let driver = Driver::new(registry, &store)
        .with_reference_catalog(refcat.as_ref().map(|r| r as &dyn ReferenceCatalog));
    Ok(driver.run_spec(spec, keys))
}
