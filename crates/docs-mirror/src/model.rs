use std::collections::BTreeMap;
use std::fmt::Display;

use serde::Serialize;
use serde_json::Value;

use crate::config::MAX_SAMPLES;

/// Verdict of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    /// Passed, but with tolerated drift or an informational finding.
    Warn,
    Fail,
}

/// Result of one independent check, with enough context to diagnose a failure
/// without re-running it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    pub check: &'static str,
    pub outcome: Outcome,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offending: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<&'static str, Value>,
    /// First offending entries, at most `MAX_SAMPLES`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<String>,
}

impl CheckReport {
    fn new(check: &'static str, outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            check,
            outcome,
            message: message.into(),
            total: None,
            offending: None,
            percentage: None,
            details: BTreeMap::new(),
            samples: Vec::new(),
        }
    }

    pub fn pass(check: &'static str, message: impl Into<String>) -> Self {
        Self::new(check, Outcome::Pass, message)
    }

    pub fn warn(check: &'static str, message: impl Into<String>) -> Self {
        Self::new(check, Outcome::Warn, message)
    }

    pub fn fail(check: &'static str, message: impl Into<String>) -> Self {
        Self::new(check, Outcome::Fail, message)
    }

    /// Failure caused by an input artifact that could not be loaded.
    pub fn unavailable(check: &'static str, error: &impl Display) -> Self {
        Self::fail(check, format!("input unavailable: {error}"))
    }

    pub fn with_drift(mut self, drift: Drift) -> Self {
        self.total = Some(drift.total);
        self.offending = Some(drift.offending);
        self.percentage = Some(drift.percentage());
        self
    }

    pub fn with_detail(mut self, key: &'static str, value: impl Into<Value>) -> Self {
        self.details.insert(key, value.into());
        self
    }

    pub fn with_samples<I, S>(mut self, samples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.samples = samples.into_iter().take(MAX_SAMPLES).map(Into::into).collect();
        self
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Fail
    }
}

/// Divergence measured against a total, tolerated below a percentage ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drift {
    pub total: usize,
    pub offending: usize,
}

impl Drift {
    pub fn new(total: usize, offending: usize) -> Self {
        Self { total, offending }
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.offending as f64 * 100.0 / self.total as f64
    }

    /// Strictly below the ceiling. Compared without division so that exact boundary
    /// values (e.g. 20 of 100 against 20%) are not subject to rounding.
    pub fn within(&self, ceiling_pct: f64) -> bool {
        self.total == 0 || (self.offending as f64) * 100.0 < ceiling_pct * self.total as f64
    }
}

/// All reports of one validation run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub passed: bool,
    pub reports: Vec<CheckReport>,
}

impl RunSummary {
    pub fn new(reports: Vec<CheckReport>) -> Self {
        let passed = !reports.iter().any(CheckReport::is_failure);
        Self { passed, reports }
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckReport> {
        self.reports.iter().filter(|r| r.is_failure())
    }

    pub fn find(&self, check: &str) -> Option<&CheckReport> {
        self.reports.iter().find(|r| r.check == check)
    }
}
