use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::{AlertType, AlertingSystem};
use crate::detection::Severity;

const RECENT_ALERTS: usize = 10;
const BUSY_ACTIVE_ALERTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl SecurityLevel {
    pub fn from_score(score: u32) -> Self {
        match score {
            90.. => SecurityLevel::Excellent,
            80..=89 => SecurityLevel::Good,
            70..=79 => SecurityLevel::Fair,
            60..=69 => SecurityLevel::Poor,
            _ => SecurityLevel::Critical,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityScore {
    pub score: u32,
    pub level: SecurityLevel,
    pub active_alerts: usize,
    pub total_alerts: usize,
}

impl SecurityScore {
    /// `100 - 5 * active - min(0.5 * total, 20)`, clamped to `0..=100`.
    pub fn compute(active_alerts: usize, total_alerts: usize) -> Self {
        let active_penalty = 5.0 * active_alerts as f64;
        let history_penalty = (0.5 * total_alerts as f64).min(20.0);
        let score = (100.0 - active_penalty - history_penalty).clamp(0.0, 100.0) as u32;
        Self {
            score,
            level: SecurityLevel::from_score(score),
            active_alerts,
            total_alerts,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertSummary {
    pub id: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub generated_at: DateTime<Utc>,
    pub active_alerts: usize,
    pub total_today: usize,
    /// Active alerts per severity
    pub by_severity: BTreeMap<Severity, usize>,
    /// Newest first
    pub recent: Vec<AlertSummary>,
    pub monitoring_active: bool,
    pub handlers: usize,
    pub security_score: SecurityScore,
    pub recommendations: Vec<String>,
}

impl AlertingSystem {
    pub fn dashboard(&self) -> DashboardSnapshot {
        self.dashboard_at(Utc::now())
    }

    pub fn dashboard_at(&self, now: DateTime<Utc>) -> DashboardSnapshot {
        let active = self.active_alerts();
        let history = self.history();
        let today = now.date_naive();

        let mut by_severity = BTreeMap::new();
        for alert in &active {
            *by_severity.entry(alert.severity).or_insert(0) += 1;
        }

        let recent = history
            .iter()
            .rev()
            .take(RECENT_ALERTS)
            .map(|a| AlertSummary {
                id: a.alert_id.clone(),
                alert_type: a.alert_type,
                severity: a.severity,
                title: a.title.clone(),
                timestamp: a.timestamp,
                acknowledged: a.acknowledged,
            })
            .collect();

        let monitoring_active = self.is_monitoring_active();
        let mut recommendations = Vec::new();
        if active.len() > BUSY_ACTIVE_ALERTS {
            recommendations.push("High number of active alerts: urgent review required".to_string());
        }
        if !monitoring_active {
            recommendations.push("Security monitoring is not running: start the daemon".to_string());
        }

        DashboardSnapshot {
            generated_at: now,
            active_alerts: active.len(),
            total_today: history
                .iter()
                .filter(|a| a.timestamp.date_naive() == today)
                .count(),
            by_severity,
            recent,
            monitoring_active,
            handlers: self.handler_count(),
            security_score: SecurityScore::compute(active.len(), history.len()),
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::NewAlert;

    #[test]
    fn score_formula_and_levels() {
        assert_eq!(SecurityScore::compute(0, 0).score, 100);
        assert_eq!(SecurityScore::compute(0, 0).level, SecurityLevel::Excellent);
        // 100 - 10 - 2.5
        assert_eq!(SecurityScore::compute(2, 5).score, 87);
        assert_eq!(SecurityScore::compute(2, 5).level, SecurityLevel::Good);
        // history penalty saturates at 20
        assert_eq!(SecurityScore::compute(0, 1000).score, 80);
        assert_eq!(SecurityScore::compute(6, 10).level, SecurityLevel::Poor);
        assert_eq!(SecurityScore::compute(30, 100).score, 0);
        assert_eq!(SecurityScore::compute(30, 100).level, SecurityLevel::Critical);
    }

    #[test]
    fn snapshot_reflects_alerts() {
        let system = AlertingSystem::default();
        let now = Utc::now();
        for i in 0..7 {
            system.trigger_at(
                NewAlert::new(AlertType::SuspiciousActivity, Severity::Medium, "t", "d")
                    .source_ip(format!("10.0.3.{}", i)),
                now,
            );
        }
        system.trigger_at(
            NewAlert::new(AlertType::DataBreach, Severity::Critical, "leak", "d"),
            now,
        );

        let snap = system.dashboard_at(now);
        assert_eq!(snap.active_alerts, 8);
        assert_eq!(snap.total_today, 8);
        assert_eq!(snap.by_severity[&Severity::Medium], 7);
        assert_eq!(snap.by_severity[&Severity::Critical], 1);
        assert_eq!(snap.recent.len(), 8);
        assert_eq!(snap.recent[0].title, "leak");
        // 100 - 40 - 4
        assert_eq!(snap.security_score.score, 56);
        assert_eq!(snap.recommendations.len(), 2);

        system.set_monitoring_active(true);
        let snap = system.dashboard_at(now);
        assert!(snap.monitoring_active);
        assert_eq!(snap.recommendations.len(), 1);
    }
}
