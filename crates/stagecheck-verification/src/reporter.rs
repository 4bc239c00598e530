//! Assertion reporting
//!
//! Every check goes through [`Reporter::record`], which writes one log line
//! (`*** <description>: PASS|FAIL`) and keeps a [`CheckRecord`]. A failed
//! check comes back as `Err(AssertionFailure)` so the caller can stop with
//! `?`; nothing after the first failure runs for the same key.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pass,
    Fail,
    Warn,
    Skip,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Outcome::Pass => "PASS",
            Outcome::Fail => "FAIL",
            Outcome::Warn => "WARN",
            Outcome::Skip => "SKIP",
        };
        f.write_str(label)
    }
}

/// Outcome of one check, as logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub description: String,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl fmt::Display for CheckRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "*** {}: {}", self.description, self.outcome)?;
        if let Some(ref context) = self.context {
            write!(f, " [{}]", context)?;
        }
        Ok(())
    }
}

/// A declared invariant did not hold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed test: {description}")]
pub struct AssertionFailure {
    pub description: String,
    pub context: Option<String>,
}

pub type CheckResult = Result<(), AssertionFailure>;

#[derive(Debug, Default)]
pub struct Reporter {
    records: Vec<CheckRecord>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, description: impl Into<String>, passed: bool) -> CheckResult {
        self.record_with_context(description, passed, None)
    }

    /// Like [`Reporter::record`], attaching detail that explains the outcome.
    pub fn record_with_context(
        &mut self,
        description: impl Into<String>,
        passed: bool,
        context: Option<String>,
    ) -> CheckResult {
        if !passed {
            return Err(self.fail(description, context));
        }

        let record = CheckRecord {
            description: description.into(),
            outcome: Outcome::Pass,
            context,
        };
        info!("{}", record);
        self.records.push(record);
        Ok(())
    }

    /// Record a failed check and hand back the failure for propagation.
    pub fn fail(
        &mut self,
        description: impl Into<String>,
        context: Option<String>,
    ) -> AssertionFailure {
        let description = description.into();
        let record = CheckRecord {
            description: description.clone(),
            outcome: Outcome::Fail,
            context: context.clone(),
        };
        error!("{}", record);
        self.records.push(record);
        AssertionFailure {
            description,
            context,
        }
    }

    pub fn assert_true(&mut self, description: impl Into<String>, condition: bool) -> CheckResult {
        self.record(description, condition)
    }

    pub fn assert_false(&mut self, description: impl Into<String>, condition: bool) -> CheckResult {
        self.record(description, !condition)
    }

    pub fn assert_equal<T: PartialEq + fmt::Display>(
        &mut self,
        description: &str,
        left: T,
        right: T,
    ) -> CheckResult {
        let passed = left == right;
        self.record(format!("{} ({} = {})", description, left, right), passed)
    }

    pub fn assert_greater<T: PartialOrd + fmt::Display>(
        &mut self,
        description: &str,
        left: T,
        right: T,
    ) -> CheckResult {
        let passed = left > right;
        self.record(format!("{} ({} > {})", description, left, right), passed)
    }

    pub fn assert_less<T: PartialOrd + fmt::Display>(
        &mut self,
        description: &str,
        left: T,
        right: T,
    ) -> CheckResult {
        let passed = left < right;
        self.record(format!("{} ({} < {})", description, left, right), passed)
    }

    pub fn assert_greater_equal<T: PartialOrd + fmt::Display>(
        &mut self,
        description: &str,
        left: T,
        right: T,
    ) -> CheckResult {
        let passed = left >= right;
        self.record(format!("{} ({} >= {})", description, left, right), passed)
    }

    pub fn assert_less_equal<T: PartialOrd + fmt::Display>(
        &mut self,
        description: &str,
        left: T,
        right: T,
    ) -> CheckResult {
        let passed = left <= right;
        self.record(format!("{} ({} <= {})", description, left, right), passed)
    }

    /// Record a tolerated problem; the run continues.
    pub fn warn(&mut self, description: impl Into<String>, context: impl Into<String>) {
        let record = CheckRecord {
            description: description.into(),
            outcome: Outcome::Warn,
            context: Some(context.into()),
        };
        warn!("{}", record);
        self.records.push(record);
    }

    /// Record a check that was deliberately not performed.
    pub fn skip(&mut self, description: impl Into<String>) {
        let record = CheckRecord {
            description: description.into(),
            outcome: Outcome::Skip,
            context: None,
        };
        info!("{}", record);
        self.records.push(record);
    }

    pub fn records(&self) -> &[CheckRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<CheckRecord> {
        self.records
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }
}
