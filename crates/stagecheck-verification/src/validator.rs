//! The generic validation engine
//!
//! One [`Validator`] runs one [`ValidatorSpec`] against one key, stepping
//! through a fixed sequence of states. A state is skipped when the
//! [`ValidatorSpec`] configures nothing for it; the first failed assertion aborts the sequence.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use tracing::{debug, info, warn};

use stagecheck_core::artifact::field_i64;
use stagecheck_core::{Artifact, Catalog, DatasetRef, Store, StoreError, ValidationKey};

use crate::reference::ReferenceCatalog;
use crate::reporter::{AssertionFailure, CheckRecord, CheckResult, Reporter};
use crate::spec::{CheckContext, DerivedCheck, ValidatorSpec};

/// Column holding the reference id of a denormalised match.
const MATCH_REF_ID_COLUMN: &str = "ref_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Init,
    DatasetChecks,
    FileChecks,
    SourceCheck,
    MatchCheck,
    MatchFullCheck,
    DerivedChecks,
    Done,
}

/// A fetch result after the metadata leniency rule has been applied.
#[derive(Debug)]
pub enum Fetched {
    Loaded(Artifact),
    /// A metadata sidecar that failed to deserialize.
    Tolerated(StoreError),
    Fatal(StoreError),
}

impl Fetched {
    pub fn classify(dataset: &DatasetRef, result: Result<Artifact, StoreError>) -> Self {
        match result {
            Ok(artifact) => Fetched::Loaded(artifact),
            Err(e) if e.is_deserialize() && dataset.is_metadata() => Fetched::Tolerated(e),
            Err(e) => Fetched::Fatal(e),
        }
    }
}

/// Result of validating one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyOutcome {
    pub key: ValidationKey,
    pub records: Vec<CheckRecord>,
    /// `Done` on success, otherwise the state the run aborted in.
    pub state: State,
    #[serde(skip)]
    pub failure: Option<AssertionFailure>,
}

impl KeyOutcome {
    pub fn passed(&self) -> bool {
        self.state == State::Done
    }
}

pub struct Validator<'a> {
    spec: &'a ValidatorSpec,
    store: &'a dyn Store,
    reference: Option<&'a dyn ReferenceCatalog>,
}

impl<'a> Validator<'a> {
    pub fn new(spec: &'a ValidatorSpec, store: &'a dyn Store) -> Self {
        Self {
            spec,
            store,
            reference: None,
        }
    }

    pub fn with_reference_catalog(mut self, reference: Option<&'a dyn ReferenceCatalog>) -> Self {
        self.reference = reference;
        self
    }

    pub fn run(&self, key: &ValidationKey) -> KeyOutcome {
        let mut reporter = Reporter::new();
        let mut state = State::Init;

        let result = self.execute(key, &mut reporter, &mut state);
        if result.is_ok() {
            state = State::Done;
        }

        KeyOutcome {
            key: key.clone(),
            records: reporter.into_records(),
            state,
            failure: result.err(),
        }
    }

    fn execute(
        &self,
        key: &ValidationKey,
        reporter: &mut Reporter,
        state: &mut State,
    ) -> CheckResult {
        let ctx = CheckContext::new(self.store, key);

        *state = State::DatasetChecks;
        for dataset in &self.spec.required_datasets {
            info!("*** Validating dataset {} for {}", dataset, key);
            self.validate_dataset(&ctx, reporter, dataset)?;
        }

        *state = State::FileChecks;
        for dataset in &self.spec.required_files {
            info!("*** Validating file {} for {}", dataset, key);
            self.validate_file(&ctx, reporter, dataset)?;
        }

        *state = State::SourceCheck;
        let catalog = match self.spec.source_dataset {
            Some(ref dataset) => {
                info!("*** Validating source output for {}", key);
                Some(self.validate_sources(&ctx, reporter, dataset)?)
            }
            None => None,
        };

        *state = State::MatchCheck;
        if let Some(ref dataset) = self.spec.match_dataset {
            info!("*** Validating matches output for {}", key);
            let matches = ctx.fetch_catalog(reporter, dataset)?;
            reporter.assert_greater("Number of matches", matches.len(), self.spec.min_match_count)?;
        }

        *state = State::MatchFullCheck;
        if let Some(ref dataset) = self.spec.match_full_dataset {
            info!("*** Validating denormalized matches for {}", key);
            self.validate_full_matches(&ctx, reporter, dataset)?;
        }

        *state = State::DerivedChecks;
        for check in &self.spec.derived_checks {
            debug!("Running derived check {}", check.name());
            match (check, catalog.as_ref()) {
                (DerivedCheck::Catalog { check, .. }, Some(catalog)) => {
                    (**check)(catalog, reporter)?
                }
                (DerivedCheck::Catalog { name, .. }, None) => {
                    debug!("No source catalog for {}, not running {}", self.spec.name, name);
                }
                (DerivedCheck::Store { check, .. }, _) => (**check)(&ctx, reporter)?,
            }
        }

        Ok(())
    }

    fn validate_dataset(
        &self,
        ctx: &CheckContext<'_>,
        reporter: &mut Reporter,
        dataset_type: &str,
    ) -> CheckResult {
        let dataset = ctx.dataset(dataset_type);

        let description = format!("{} exists", dataset_type);
        match self.store.exists(&dataset) {
            Ok(exists) => reporter.record(description, exists)?,
            Err(e) => return Err(reporter.fail(description, Some(e.to_string()))),
        }

        match Fetched::classify(&dataset, self.store.get(&dataset)) {
            Fetched::Loaded(artifact) => reporter.record(
                format!("{} readable ({})", dataset_type, artifact.kind_name()),
                artifact.is_readable(),
            ),
            Fetched::Tolerated(e) => {
                warn!(
                    "Unable to read {}; metadata sidecars are read on a best-effort basis",
                    dataset_type
                );
                reporter.warn(format!("{} readable", dataset_type), e.to_string());
                Ok(())
            }
            Fetched::Fatal(e) => {
                Err(reporter.fail(format!("{} readable", dataset_type), Some(e.to_string())))
            }
        }
    }

    fn validate_file(
        &self,
        ctx: &CheckContext<'_>,
        reporter: &mut Reporter,
        dataset_type: &str,
    ) -> CheckResult {
        let description = format!("{} exists on disk", dataset_type);
        let path = match self.store.get_uri(&ctx.dataset(dataset_type)) {
            Ok(path) => path,
            Err(e) => return Err(reporter.fail(description, Some(e.to_string()))),
        };

        let size = match fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(reporter.fail(description, Some(path.display().to_string())));
            }
            Err(e) => {
                let context = format!("{}: {}", path.display(), e);
                return Err(reporter.fail(description, Some(context)));
            }
        };
        reporter.record(description, true)?;

        reporter.assert_greater(&format!("{} has non-zero size", dataset_type), size, 0)
    }

    /// Fetch the source catalog once and check its size; the catalog is
    /// handed back for the derived checks.
    fn validate_sources(
        &self,
        ctx: &CheckContext<'_>,
        reporter: &mut Reporter,
        dataset_type: &str,
    ) -> Result<Catalog, AssertionFailure> {
        let catalog = ctx.fetch_catalog(reporter, dataset_type)?;
        reporter.assert_greater("Number of sources", catalog.len(), self.spec.min_source_count)?;
        Ok(catalog)
    }

    fn validate_full_matches(
        &self,
        ctx: &CheckContext<'_>,
        reporter: &mut Reporter,
        dataset_type: &str,
    ) -> CheckResult {
        let matches = ctx.fetch_catalog(reporter, dataset_type)?;
        let min = self.spec.min_match_count;
        reporter.assert_greater("Number of full matches", matches.len(), min)?;

        match self.reference {
            Some(reference) => {
                let resolved = matches
                    .records()
                    .filter_map(|r| field_i64(r, MATCH_REF_ID_COLUMN))
                    .filter(|id| reference.contains(*id))
                    .count();
                reporter.assert_greater(
                    &format!("Number of matches resolved in {}", reference.name()),
                    resolved,
                    self.spec.min_match_count,
                )
            }
            None => {
                reporter.skip(format!(
                    "Reference catalog unavailable; {} cross-match skipped",
                    dataset_type
                ));
                Ok(())
            }
        }
    }
}
