use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use super::{SecurityEvent, Severity};

/// Fires when every required event type appears within `time_window`.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationRule {
    pub name: String,
    pub description: String,
    pub required_event_types: BTreeSet<String>,
    #[serde(serialize_with = "serialize_secs")]
    pub time_window: Duration,
    pub severity: Severity,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(d.num_seconds())
}

/// One firing of a correlation rule.
#[derive(Debug, Clone, Serialize)]
pub struct Correlation {
    pub rule_name: String,
    pub description: String,
    pub severity: Severity,
    /// Contributing events, newest first
    pub event_ids: Vec<String>,
    /// Source IPs seen among the contributing events
    pub source_ips: Vec<String>,
    /// Required types over contributing events: 1.0 when each required type
    /// appears exactly once, lower when the window is noisy
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
}

impl CorrelationRule {
    pub fn new(
        name: &str,
        description: &str,
        required: &[&str],
        time_window: Duration,
        severity: Severity,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required_event_types: required.iter().map(|s| s.to_string()).collect(),
            time_window,
            severity,
        }
    }

    pub fn defaults() -> Vec<CorrelationRule> {
        vec![
            CorrelationRule::new(
                "multi_stage_attack",
                "Multi-stage attack pattern",
                &["reconnaissance", "initial_compromise", "privilege_escalation"],
                Duration::hours(1),
                Severity::Critical,
            ),
            CorrelationRule::new(
                "lateral_movement",
                "Lateral movement within network",
                &["successful_login", "file_access", "network_scan"],
                Duration::minutes(30),
                Severity::High,
            ),
            CorrelationRule::new(
                "data_theft_campaign",
                "Coordinated data theft attempt",
                &["large_download", "encryption_attempt", "data_access"],
                Duration::hours(2),
                Severity::Critical,
            ),
        ]
    }

    /// Scan `newest_first` back to the window edge and fire if every
    /// required type was seen. Events must be in ingestion (time) order.
    pub fn evaluate<'a, I>(&self, newest_first: I, now: DateTime<Utc>) -> Option<Correlation>
    where
        I: IntoIterator<Item = &'a Arc<SecurityEvent>>,
    {
        if self.required_event_types.is_empty() {
            return None;
        }
        let cutoff = now - self.time_window;

        let mut found: HashSet<&str> = HashSet::new();
        let mut contributing: Vec<&SecurityEvent> = Vec::new();

        for event in newest_first {
            if event.timestamp < cutoff {
                break;
            }
            // Ignore events stamped after the evaluation point
            if event.timestamp > now {
                continue;
            }
            if self.required_event_types.contains(&event.event_type) {
                found.insert(event.event_type.as_str());
                contributing.push(event);
            }
        }

        if found.len() < self.required_event_types.len() {
            return None;
        }

        let mut source_ips: Vec<String> = contributing
            .iter()
            .filter_map(|e| e.source_ip.clone())
            .collect();
        source_ips.sort();
        source_ips.dedup();

        Some(Correlation {
            rule_name: self.name.clone(),
            description: self.description.clone(),
            severity: self.severity,
            confidence: self.required_event_types.len() as f64 / contributing.len() as f64,
            event_ids: contributing.iter().map(|e| e.event_id.clone()).collect(),
            source_ips,
            detected_at: now,
        })
    }
}
