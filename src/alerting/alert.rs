use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::detection::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    BruteForce,
    SuspiciousActivity,
    UnauthorizedAccess,
    DataBreach,
    SystemCompromise,
    ConfigurationError,
    DependencyVulnerability,
    AnomalousTraffic,
}

impl AlertType {
    pub const ALL: [AlertType; 8] = [
        AlertType::BruteForce,
        AlertType::SuspiciousActivity,
        AlertType::UnauthorizedAccess,
        AlertType::DataBreach,
        AlertType::SystemCompromise,
        AlertType::ConfigurationError,
        AlertType::DependencyVulnerability,
        AlertType::AnomalousTraffic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::BruteForce => "BRUTE_FORCE",
            AlertType::SuspiciousActivity => "SUSPICIOUS_ACTIVITY",
            AlertType::UnauthorizedAccess => "UNAUTHORIZED_ACCESS",
            AlertType::DataBreach => "DATA_BREACH",
            AlertType::SystemCompromise => "SYSTEM_COMPROMISE",
            AlertType::ConfigurationError => "CONFIGURATION_ERROR",
            AlertType::DependencyVulnerability => "DEPENDENCY_VULNERABILITY",
            AlertType::AnomalousTraffic => "ANOMALOUS_TRAFFIC",
        }
    }

    /// Alert type raised for a detected threat pattern.
    pub fn for_pattern(pattern_id: &str) -> Self {
        match pattern_id {
            "brute_force_attack" => AlertType::BruteForce,
            "privilege_escalation" => AlertType::UnauthorizedAccess,
            "data_exfiltration" => AlertType::DataBreach,
            "sql_injection_attempt" | "xss_attack" => AlertType::SystemCompromise,
            "anomalous_behavior" => AlertType::AnomalousTraffic,
            _ => AlertType::SuspiciousActivity,
        }
    }

    /// Alert type raised when a correlation rule fires.
    pub fn for_correlation(rule_name: &str) -> Self {
        match rule_name {
            "multi_stage_attack" => AlertType::SystemCompromise,
            "lateral_movement" => AlertType::UnauthorizedAccess,
            "data_theft_campaign" => AlertType::DataBreach,
            _ => AlertType::SuspiciousActivity,
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        AlertType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| format!("unknown alert type: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub alert_id: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub source_ip: Option<String>,
    pub user_id: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
}

impl SecurityAlert {
    pub fn is_active(&self) -> bool {
        !self.resolved
    }
}

/// Alert contents supplied by the caller of [`super::AlertingSystem::trigger`].
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub source_ip: Option<String>,
    pub user_id: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl NewAlert {
    pub fn new(alert_type: AlertType, severity: Severity, title: &str, description: &str) -> Self {
        Self {
            alert_type,
            severity,
            title: title.to_string(),
            description: description.to_string(),
            source_ip: None,
            user_id: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn source_ip(mut self, ip: impl Into<String>) -> Self {
        self.source_ip = Some(ip.into());
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub(crate) fn into_alert(self, alert_id: String, timestamp: DateTime<Utc>) -> SecurityAlert {
        SecurityAlert {
            alert_id,
            alert_type: self.alert_type,
            severity: self.severity,
            title: self.title,
            description: self.description,
            timestamp,
            source_ip: self.source_ip,
            user_id: self.user_id,
            metadata: self.metadata,
            acknowledged: false,
            acknowledged_by: None,
            resolved: false,
            resolved_at: None,
            resolution: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_type_names() {
        assert_eq!(
            serde_json::to_string(&AlertType::BruteForce).unwrap(),
            "\"BRUTE_FORCE\""
        );
        assert_eq!(
            "data-breach".parse::<AlertType>().unwrap(),
            AlertType::DataBreach
        );
        assert!("PHISHING".parse::<AlertType>().is_err());
    }

    #[test]
    fn pattern_mapping() {
        assert_eq!(AlertType::for_pattern("xss_attack"), AlertType::SystemCompromise);
        assert_eq!(AlertType::for_pattern("unknown"), AlertType::SuspiciousActivity);
    }
}
