//! Static registry of validator specs, looked up by variant name

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{ConfigError, RegistryError};
use crate::spec::ValidatorSpec;
use crate::variants;

/// Factories for every built-in variant, in pipeline order.
pub const BUILTIN_VARIANTS: &[fn() -> ValidatorSpec] = &[
    variants::raw,
    variants::detrend,
    variants::sfm,
    variants::skymap,
    variants::warp,
    variants::coadd,
    variants::detection,
    variants::merge_detections,
    variants::measure,
    variants::merge_measurements,
    variants::forced_phot_coadd,
    variants::forced_phot_ccd,
    variants::version,
];

#[derive(Debug, Default)]
pub struct Registry {
    variants: IndexMap<String, ValidatorSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in variant.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for factory in BUILTIN_VARIANTS {
            registry.register(factory())?;
        }
        debug!("Registered {} built-in variants", registry.len());
        Ok(registry)
    }

    /// Add a spec. Names are unique and specs must pass
    /// [`ValidatorSpec::validate`].
    pub fn register(&mut self, spec: ValidatorSpec) -> Result<(), RegistryError> {
        spec.validate()?;
        if self.variants.contains_key(&spec.name) {
            return Err(RegistryError::DuplicateVariant(spec.name));
        }
        self.variants.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ValidatorSpec> {
        self.variants.get(name)
    }

    pub fn resolve(&self, name: &str) -> Result<&ValidatorSpec, ConfigError> {
        self.get(name).ok_or_else(|| ConfigError::UnknownVariant {
            name: name.to_string(),
            known: self.names().collect::<Vec<_>>().join(", "),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidatorSpec> {
        self.variants.values()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}
