//! Tamper-evident audit trail and framework compliance reporting.
//!
//! Every [`AuditEvent`] is stamped with a SHA-256 over its own fields and
//! linked to its predecessor through `prev_hash`, then appended to a JSONL
//! log. [`ComplianceEngine`] scores the trail against a [`Framework`],
//! writes [`ComplianceReport`]s and exports CSV.

mod audit;
mod engine;
mod export;
mod framework;
mod report;

pub use audit::{AuditEvent, AuditRecord, AuditTrail, GENESIS_HASH, IntegrityViolation, LoadSummary};
pub use engine::{ComplianceEngine, ComplianceStatus};
pub use export::CSV_HEADERS;
pub use framework::Framework;
pub use report::{ActionCount, ComplianceReport, RecentEvent, ReportSection, ReportSummary, RiskCounts};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("unknown compliance framework: {0}")]
    UnknownFramework(String),

    #[error("invalid audit event: {0}")]
    Validation(String),

    #[error("{context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ComplianceError {
    pub(crate) fn io(context: impl Into<String>, source: impl Into<std::io::Error>) -> Self {
        ComplianceError::Persistence {
            context: context.into(),
            source: source.into(),
        }
    }
}

/// Risk level recorded on each audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(ComplianceError::Validation(format!(
                "unknown risk level: {}",
                other
            ))),
        }
    }
}
