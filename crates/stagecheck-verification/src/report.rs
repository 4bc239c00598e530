//! Run report generation
//!
//! Generates human-readable and machine-readable reports of a driver run.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::driver::RunSummary;
use crate::reporter::{CheckRecord, Outcome};
use crate::validator::State;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: String,
    pub variant: String,
    pub summary: ReportSummary,
    pub keys: Vec<KeyReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub success: bool,
    pub keys: usize,
    pub failed_keys: usize,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyReport {
    pub key: String,
    pub passed: bool,
    pub state: State,
    pub records: Vec<CheckRecord>,
}

impl RunReport {
    pub fn from_summary(run: &RunSummary) -> Self {
        let mut summary = ReportSummary {
            success: run.success(),
            keys: run.outcomes.len(),
            ..Default::default()
        };

        let keys = run
            .outcomes
            .iter()
            .map(|outcome| {
                if !outcome.passed() {
                    summary.failed_keys += 1;
                }
                for record in &outcome.records {
                    match record.outcome {
                        Outcome::Pass => summary.passed += 1,
                        Outcome::Fail => summary.failed += 1,
                        Outcome::Warn => summary.warnings += 1,
                        Outcome::Skip => summary.skipped += 1,
                    }
                }
                KeyReport {
                    key: outcome.key.to_string(),
                    passed: outcome.passed(),
                    state: outcome.state,
                    records: outcome.records.clone(),
                }
            })
            .collect();

        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            variant: run.variant.clone(),
            summary,
            keys,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Generate markdown report
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!("# Stagecheck Report: {}\n\n", self.variant));
        md.push_str(&format!("**Generated:** {}\n\n", self.timestamp));

        md.push_str("## Summary\n\n");
        if self.summary.success {
            md.push_str("✅ **PASS** - All keys passed\n\n");
        } else {
            md.push_str(&format!(
                "❌ **FAIL** - {} of {} keys failed\n\n",
                self.summary.failed_keys, self.summary.keys
            ));
        }

        md.push_str(&format!("- **Keys:** {}\n", self.summary.keys));
        md.push_str(&format!("- **Passed checks:** {}\n", self.summary.passed));
        md.push_str(&format!("- **Failed checks:** {}\n", self.summary.failed));
        md.push_str(&format!("- **Warnings:** {}\n", self.summary.warnings));
        md.push_str(&format!("- **Skipped:** {}\n\n", self.summary.skipped));

        for key in &self.keys {
            let mark = if key.passed { "✅" } else { "❌" };
            md.push_str(&format!("## {} {}\n\n", mark, key.key));
            if !key.passed {
                md.push_str(&format!("Aborted in `{:?}`\n\n", key.state));
            }
            for record in &key.records {
                md.push_str(&format!("- {}: {}", record.outcome, record.description));
                if let Some(ref context) = record.context {
                    md.push_str(&format!(" ({})", context));
                }
                md.push('\n');
            }
            md.push('\n');
        }

        md
    }

    /// Generate JSON report
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_markdown())
    }
}
