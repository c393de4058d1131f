//! Check outcome types.
//!
//! Every conformance check produces exactly one [`CheckOutcome`]. Outcomes
//! are never dropped; a run aggregates them into a [`RunReport`] whose
//! overall status is the worst outcome observed.

use serde::{Deserialize, Serialize};

/// Result of a single conformance check.
///
/// - `Pass` - the requirement was verified.
/// - `Fail` - a firm requirement was violated.
/// - `Warn` - an advisory mismatch that does not invalidate conformance.
/// - `Skip` - insufficient evidence to judge (no resources, prerequisite
///   interaction unsupported, missing must-support coverage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum CheckOutcome {
    Pass,
    Fail(String),
    Warn(String),
    Skip(String),
}

impl CheckOutcome {
    pub fn fail(reason: impl Into<String>) -> Self {
        CheckOutcome::Fail(reason.into())
    }

    pub fn warn(reason: impl Into<String>) -> Self {
        CheckOutcome::Warn(reason.into())
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        CheckOutcome::Skip(reason.into())
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, CheckOutcome::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, CheckOutcome::Fail(_))
    }

    /// Severity rank used for aggregation: Pass < Skip < Warn < Fail.
    pub fn severity(&self) -> u8 {
        match self {
            CheckOutcome::Pass => 0,
            CheckOutcome::Skip(_) => 1,
            CheckOutcome::Warn(_) => 2,
            CheckOutcome::Fail(_) => 3,
        }
    }

    /// Fold a set of outcomes into the worst one. An empty set is a pass.
    pub fn worst(outcomes: impl IntoIterator<Item = CheckOutcome>) -> CheckOutcome {
        outcomes
            .into_iter()
            .max_by_key(CheckOutcome::severity)
            .unwrap_or(CheckOutcome::Pass)
    }
}

impl std::fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckOutcome::Pass => write!(f, "pass"),
            CheckOutcome::Fail(reason) => write!(f, "fail: {reason}"),
            CheckOutcome::Warn(reason) => write!(f, "warn: {reason}"),
            CheckOutcome::Skip(reason) => write!(f, "skip: {reason}"),
        }
    }
}

/// A named check outcome, as reported to the host harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    /// Stable check identifier (e.g. `"resource-read"`).
    pub name: String,
    pub outcome: CheckOutcome,
}

impl CheckReport {
    pub fn new(name: impl Into<String>, outcome: CheckOutcome) -> Self {
        Self {
            name: name.into(),
            outcome,
        }
    }
}

/// Ordered reports from one sequence run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub reports: Vec<CheckReport>,
}

impl RunReport {
    pub fn new(reports: Vec<CheckReport>) -> Self {
        Self { reports }
    }

    /// Aggregate run status: the worst outcome among all checks.
    pub fn status(&self) -> CheckOutcome {
        CheckOutcome::worst(self.reports.iter().map(|r| r.outcome.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(CheckOutcome::Pass.severity() < CheckOutcome::skip("x").severity());
        assert!(CheckOutcome::skip("x").severity() < CheckOutcome::warn("x").severity());
        assert!(CheckOutcome::warn("x").severity() < CheckOutcome::fail("x").severity());
    }

    #[test]
    fn test_worst_of_empty_is_pass() {
        assert_eq!(CheckOutcome::worst(Vec::new()), CheckOutcome::Pass);
    }

    #[test]
    fn test_worst_picks_fail_over_warn() {
        let worst = CheckOutcome::worst(vec![
            CheckOutcome::Pass,
            CheckOutcome::warn("advisory"),
            CheckOutcome::fail("violated"),
            CheckOutcome::skip("no data"),
        ]);
        assert_eq!(worst, CheckOutcome::fail("violated"));
    }

    #[test]
    fn test_run_report_status() {
        let report = RunReport::new(vec![
            CheckReport::new("read", CheckOutcome::Pass),
            CheckReport::new("bindings", CheckOutcome::warn("extensible miss")),
        ]);
        assert_eq!(report.status(), CheckOutcome::warn("extensible miss"));
    }
}
