//! Rule-based threat detection over a bounded in-process event buffer.
//!
//! Events are scored against a fixed catalog of [`ThreatPattern`]s as they
//! arrive, and [`CorrelationRule`]s look for sets of event types that occur
//! together inside a time window. Nothing here is learned; every decision
//! is a deterministic predicate over the event fields and metadata.

mod correlation;
mod engine;
mod event;
mod indicator;
pub mod monitor;
mod pattern;

pub use correlation::{Correlation, CorrelationRule};
pub use engine::{Detection, Ingestion, RiskDistribution, ThreatDetectionEngine, ThreatIntelligence};
pub use event::{SecurityEvent, SecurityEventBuilder};
pub use indicator::Indicator;
pub use monitor::{MonitorSignal, SecurityMonitor};
pub use pattern::ThreatPattern;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Severity shared by threat patterns, correlation rules and alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown severity: {}", s))
    }
}

/// A security event rejected before it reached the buffer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_and_names() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!(
            serde_json::to_string(&Severity::High).unwrap(),
            "\"HIGH\""
        );
        assert!("severe".parse::<Severity>().is_err());
    }
}
