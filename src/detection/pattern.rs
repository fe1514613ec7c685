use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use super::{Indicator, SecurityEvent, Severity};

/// Correlated event ids kept per pattern; older ids are dropped first.
pub(crate) const MAX_CORRELATED_IDS: usize = 1000;

/// Static description of one catalog entry.
struct PatternDef {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    severity: Severity,
    indicators: &'static [Indicator],
    confidence_threshold: f64,
}

static CATALOG: [PatternDef; 6] = [
    PatternDef {
        id: "brute_force_attack",
        name: "Brute Force Attack",
        description: "Multiple failed authentication attempts",
        severity: Severity::High,
        indicators: &[Indicator::FailedLogin, Indicator::RateLimitExceeded],
        confidence_threshold: 0.8,
    },
    PatternDef {
        id: "privilege_escalation",
        name: "Privilege Escalation Attempt",
        description: "Attempt to gain higher privileges",
        severity: Severity::Critical,
        indicators: &[Indicator::UnauthorizedAccess, Indicator::AdminFunctionAccess],
        confidence_threshold: 0.9,
    },
    PatternDef {
        id: "data_exfiltration",
        name: "Data Exfiltration",
        description: "Large data transfers or unusual file access",
        severity: Severity::High,
        indicators: &[Indicator::LargeFileDownload, Indicator::UnusualFileAccess],
        confidence_threshold: 0.7,
    },
    PatternDef {
        id: "sql_injection_attempt",
        name: "SQL Injection Attempt",
        description: "Query text carrying SQL injection markers",
        severity: Severity::Critical,
        indicators: &[Indicator::SuspiciousSqlPattern, Indicator::DatabaseError],
        confidence_threshold: 0.95,
    },
    PatternDef {
        id: "xss_attack",
        name: "Cross-Site Scripting Attack",
        description: "Script or HTML markup in user input",
        severity: Severity::High,
        indicators: &[Indicator::ScriptInjection, Indicator::HtmlInjection],
        confidence_threshold: 0.85,
    },
    PatternDef {
        id: "anomalous_behavior",
        name: "Anomalous User Behavior",
        description: "Access at an unusual hour or from an unusual location",
        severity: Severity::Medium,
        indicators: &[Indicator::UnusualTimeAccess, Indicator::UnusualLocation],
        confidence_threshold: 0.6,
    },
];

impl PatternDef {
    fn bonus(&self, event: &SecurityEvent) -> f64 {
        let over = |key: &str, limit: f64| event.metadata_f64(key).is_some_and(|v| v > limit);
        match self.id {
            "brute_force_attack" if over("attempt_count", 5.0) => 0.3,
            "data_exfiltration" if over("transfer_rate", 1_000_000.0) => 0.4,
            "sql_injection_attempt" if over("query_length", 1000.0) => 0.2,
            _ => 0.0,
        }
    }

    fn score(&self, event: &SecurityEvent) -> f64 {
        if self.indicators.is_empty() {
            return 0.0;
        }
        let hits = self.indicators.iter().filter(|i| i.matches(event)).count();
        let ratio = hits as f64 / self.indicators.len() as f64;
        (ratio + self.bonus(event)).min(1.0)
    }
}

/// Highest match score of `event` across the catalog.
pub(crate) fn max_match_score(event: &SecurityEvent) -> f64 {
    CATALOG
        .iter()
        .map(|def| def.score(event))
        .fold(0.0, f64::max)
}

/// A catalog pattern plus what has been observed against it.
#[derive(Debug, Clone, Serialize)]
pub struct ThreatPattern {
    pub pattern_id: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub indicators: Vec<Indicator>,
    pub confidence_threshold: f64,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub occurrences: u64,
    pub correlated_event_ids: VecDeque<String>,
    #[serde(skip)]
    catalog_index: usize,
}

impl ThreatPattern {
    /// Fresh copies of the built-in catalog.
    pub fn catalog() -> Vec<ThreatPattern> {
        CATALOG
            .iter()
            .enumerate()
            .map(|(catalog_index, def)| ThreatPattern {
                pattern_id: def.id.to_string(),
                name: def.name.to_string(),
                description: def.description.to_string(),
                severity: def.severity,
                indicators: def.indicators.to_vec(),
                confidence_threshold: def.confidence_threshold,
                first_seen: None,
                last_seen: None,
                occurrences: 0,
                correlated_event_ids: VecDeque::new(),
                catalog_index,
            })
            .collect()
    }

    /// Indicator ratio plus metadata bonus, clamped to 1.
    pub fn match_score(&self, event: &SecurityEvent) -> f64 {
        CATALOG[self.catalog_index].score(event)
    }

    /// Threshold check with a little slack for float rounding in `ratio + bonus`.
    pub fn is_detected(&self, score: f64) -> bool {
        score + 1e-9 >= self.confidence_threshold
    }

    /// Record a detection of this pattern.
    pub(crate) fn record(&mut self, event_id: &str, now: DateTime<Utc>) {
        self.occurrences += 1;
        self.first_seen.get_or_insert(now);
        self.last_seen = Some(now);
        if self.correlated_event_ids.len() >= MAX_CORRELATED_IDS {
            self.correlated_event_ids.pop_front();
        }
        self.correlated_event_ids.push_back(event_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon(kind: &str, action: &str, result: &str) -> crate::detection::SecurityEventBuilder {
        SecurityEvent::builder(kind)
            .timestamp(Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap())
            .resource("/r")
            .action(action)
            .result(result)
    }

    fn pattern(id: &str) -> ThreatPattern {
        ThreatPattern::catalog()
            .into_iter()
            .find(|p| p.pattern_id == id)
            .unwrap()
    }

    #[test]
    fn catalog_has_six_patterns() {
        let catalog = ThreatPattern::catalog();
        assert_eq!(catalog.len(), 6);
        assert!(catalog.iter().all(|p| p.indicators.len() == 2));
    }

    #[test]
    fn brute_force_needs_bonus_to_cross_threshold() {
        let p = pattern("brute_force_attack");
        let plain = at_noon("authentication", "login", "failed").build().unwrap();
        assert!((p.match_score(&plain) - 0.5).abs() < 1e-9);

        let repeated = at_noon("authentication", "login", "failed")
            .meta("attempt_count", 8)
            .build()
            .unwrap();
        let score = p.match_score(&repeated);
        assert!((score - 0.8).abs() < 1e-9);
        assert!(p.is_detected(score));
    }

    #[test]
    fn exfiltration_score_is_clamped() {
        let p = pattern("data_exfiltration");
        let e = SecurityEvent::builder("file_access")
            .resource("/bin/secret.exe")
            .action("download")
            .result("success")
            .meta("file_size", 5_000_000)
            .meta("transfer_rate", 2_000_000)
            .build()
            .unwrap();
        assert_eq!(p.match_score(&e), 1.0);
    }

    #[test]
    fn privilege_escalation_full_match() {
        let p = pattern("privilege_escalation");
        let e = at_noon("access", "admin_panel", "denied").build().unwrap();
        assert_eq!(p.match_score(&e), 1.0);
    }

    #[test]
    fn record_caps_correlated_ids() {
        let mut p = pattern("xss_attack");
        let now = Utc::now();
        for i in 0..(MAX_CORRELATED_IDS + 5) {
            p.record(&format!("e{}", i), now);
        }
        assert_eq!(p.correlated_event_ids.len(), MAX_CORRELATED_IDS);
        assert_eq!(p.correlated_event_ids.front().map(String::as_str), Some("e5"));
        assert_eq!(p.occurrences as usize, MAX_CORRELATED_IDS + 5);
    }
}
