//! Stagecheck verification engine
//!
//! Acceptance checks for the outputs of one pipeline stage, run after the
//! stage has written into the data store.
//!
//! The engine is one generic [`Validator`] parameterised by a
//! [`ValidatorSpec`]: which datasets must exist and be readable, which
//! files must be non-empty, how many sources and matches a catalog must
//! hold, and a list of stage-specific derived checks. Specs are looked up by
//! name in a static [`Registry`] and driven over one or more validation keys
//! by the [`Driver`].
//!
//! Checks are hard assertions: the first failure aborts the remaining checks
//! for that key.
//!
//! # Example
//!
//! ```no_run
//! use stagecheck_core::{StoreLocation, ValidationKey};
//! use stagecheck_verification::{validate, Registry};
//!
//! let registry = Registry::builtin().expect("builtin variants are consistent");
//! let key = ValidationKey::builder().coord("visit", 903334).coord("detector", 16).build();
//! let summary = validate(&registry, "RawValidation", &StoreLocation::new("DATA"), None, &[key])?;
//!
//! assert!(summary.success());
//! # Ok::<(), stagecheck_verification::ConfigError>(())
//! ```

pub mod checks;
pub mod driver;
pub mod reference;
pub mod registry;
pub mod report;
pub mod reporter;
pub mod spec;
pub mod validator;
pub mod variants;

mod error;

pub use driver::{validate, Driver, RunSummary};
pub use error::{ConfigError, RegistryError};
pub use reference::{FileReferenceCatalog, ReferenceCatalog};
pub use registry::Registry;
pub use report::RunReport;
pub use reporter::{AssertionFailure, CheckRecord, CheckResult, Outcome, Reporter};
pub use spec::{CheckContext, DerivedCheck, ValidatorSpec};
pub use validator::{Fetched, KeyOutcome, State, Validator};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::driver::{validate, Driver, RunSummary};
    pub use crate::registry::Registry;
    pub use crate::reporter::{Outcome, Reporter};
    pub use crate::spec::ValidatorSpec;
    pub use crate::validator::Validator;
    pub use crate::{ConfigError, RegistryError};
    pub use stagecheck_core::{FileStore, MemoryStore, Store, StoreLocation, ValidationKey};
}
