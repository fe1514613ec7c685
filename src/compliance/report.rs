use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::audit::hex;
use super::{AuditEvent, ComplianceError, Framework, RiskLevel};

const REPORT_PREFIX: &str = "compliance_report_";
const TOP_ACTIONS: usize = 5;
const RECENT_EVENTS: usize = 5;
const HIGH_RISK_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl RiskCounts {
    fn add(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::Low => self.low += 1,
            RiskLevel::Medium => self.medium += 1,
            RiskLevel::High => self.high += 1,
            RiskLevel::Critical => self.critical += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCount {
    pub action: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentEvent {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub result: String,
    pub risk_level: RiskLevel,
    pub details: serde_json::Value,
}

/// Per-category slice of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub category: String,
    pub events_count: usize,
    /// Percentage of `success` results; 0 for an empty category
    pub success_rate: f64,
    pub risk_distribution: RiskCounts,
    pub top_actions: Vec<ActionCount>,
    /// Newest first
    pub recent_events: Vec<RecentEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub report_id: String,
    pub generated_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub framework: Framework,
    pub overall_score: f64,
    pub sections: Vec<ReportSection>,
    pub recommendations: Vec<String>,
    /// SHA-256 over the concatenated hashes of the events in the period
    pub audit_trail_hash: String,
    pub events_considered: usize,
}

/// Lightweight view of a saved report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    #[serde(skip_deserializing)]
    pub file_name: String,
    pub report_id: String,
    pub framework: Framework,
    pub generated_at: DateTime<Utc>,
    pub overall_score: f64,
}

impl ComplianceReport {
    /// Build a report from the events that fall in `[period_start, period_end]`.
    pub fn generate(
        framework: Framework,
        events: &[AuditEvent],
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let in_period: Vec<&AuditEvent> = events
            .iter()
            .filter(|e| e.timestamp >= period_start && e.timestamp <= period_end)
            .collect();

        let sections: Vec<ReportSection> = framework
            .categories()
            .iter()
            .map(|category| section(category, &in_period))
            .collect();

        let overall_score = overall_score(&sections);

        Self {
            report_id: format!("report_{}", uuid::Uuid::new_v4().simple()),
            generated_at,
            period_start,
            period_end,
            framework,
            overall_score,
            recommendations: recommendations(framework, overall_score, &in_period),
            audit_trail_hash: trail_hash(in_period.iter().copied()),
            events_considered: in_period.len(),
            sections,
        }
    }

    /// `compliance_report_<FW>_<YYYYmmdd_HHMMSS>_<id>.json`, where `<id>` is
    /// the uuid part of `report_id`.
    pub fn file_name(&self) -> String {
        let id = self
            .report_id
            .strip_prefix("report_")
            .unwrap_or(&self.report_id);
        format!(
            "{}{}_{}_{}.json",
            REPORT_PREFIX,
            self.framework.id(),
            self.generated_at.format("%Y%m%d_%H%M%S"),
            id
        )
    }

    /// Write the report as pretty JSON into `dir`. An existing file is
    /// never replaced.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, ComplianceError> {
        fs::create_dir_all(dir)
            .map_err(|e| ComplianceError::io(format!("Failed to create {}", dir.display()), e))?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ComplianceError::io("Failed to serialize report", e))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| ComplianceError::io(format!("Failed to create {}", path.display()), e))?;
        file.write_all(json.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| ComplianceError::io(format!("Failed to write {}", path.display()), e))?;
        info!("Compliance report saved: {}", path.display());
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self, ComplianceError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ComplianceError::io(format!("Failed to read {}", path.display()), e))?;
        serde_json::from_str(&content)
            .map_err(|e| ComplianceError::io(format!("Failed to parse {}", path.display()), e))
    }

    pub fn section(&self, category: &str) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.category == category)
    }
}

fn section(category: &str, events: &[&AuditEvent]) -> ReportSection {
    let matching: Vec<&AuditEvent> = events
        .iter()
        .copied()
        .filter(|e| e.category == category)
        .collect();

    let mut risk_distribution = RiskCounts::default();
    for event in &matching {
        risk_distribution.add(event.risk_level);
    }

    let mut recent = matching.clone();
    recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let recent_events = recent
        .into_iter()
        .take(RECENT_EVENTS)
        .map(|e| RecentEvent {
            timestamp: e.timestamp,
            action: e.action.clone(),
            result: e.result.clone(),
            risk_level: e.risk_level,
            details: e.details.clone(),
        })
        .collect();

    ReportSection {
        category: category.to_string(),
        events_count: matching.len(),
        success_rate: success_rate(&matching),
        risk_distribution,
        top_actions: top_actions(&matching),
        recent_events,
    }
}

fn success_rate(events: &[&AuditEvent]) -> f64 {
    if events.is_empty() {
        return 0.0;
    }
    let ok = events.iter().filter(|e| e.is_success()).count();
    ok as f64 / events.len() as f64 * 100.0
}

/// Unweighted mean over every framework category; empty categories count as 0.
fn overall_score(sections: &[ReportSection]) -> f64 {
    if sections.is_empty() {
        return 0.0;
    }
    sections.iter().map(|s| s.success_rate).sum::<f64>() / sections.len() as f64
}

/// Most frequent actions; ties are broken alphabetically.
fn top_actions(events: &[&AuditEvent]) -> Vec<ActionCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for event in events {
        *counts.entry(event.action.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<ActionCount> = counts
        .into_iter()
        .map(|(action, count)| ActionCount {
            action: action.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.action.cmp(&b.action)));
    ranked.truncate(TOP_ACTIONS);
    ranked
}

fn recommendations(framework: Framework, score: f64, events: &[&AuditEvent]) -> Vec<String> {
    let mut out = Vec::new();

    if score < 70.0 {
        out.push("Critical compliance score: immediate review required".to_string());
    }
    if score < 85.0 {
        out.push("Improve security controls and monitoring".to_string());
    }

    let has_action = |action: &str| events.iter().any(|e| e.action == action);
    let has_category = |category: &str| events.iter().any(|e| e.category == category);

    match framework {
        Framework::Gdpr => {
            if !has_action("data_encryption") {
                out.push(
                    "No data_encryption activity recorded: GDPR encryption requirement at risk"
                        .to_string(),
                );
            }
            if !has_action("consent_management") {
                out.push(
                    "No consent_management activity recorded: user consent handling missing"
                        .to_string(),
                );
            }
        }
        Framework::Iso27001 => {
            if !has_category("risk_assessment") {
                out.push(
                    "No risk_assessment events recorded: ISO 27001 requires regular risk assessment"
                        .to_string(),
                );
            }
        }
        Framework::Nist => {
            if !has_action("incident_response") {
                out.push(
                    "No incident_response activity recorded: incident response plan missing"
                        .to_string(),
                );
            }
        }
        Framework::PciDss => {}
    }

    let high_risk = events
        .iter()
        .filter(|e| matches!(e.risk_level, RiskLevel::High | RiskLevel::Critical))
        .count();
    if high_risk > HIGH_RISK_LIMIT {
        out.push(format!(
            "{} high or critical risk events in period: investigation required",
            high_risk
        ));
    }

    out
}

/// SHA-256 (hex) over the concatenated `hash` fields, in trail order.
pub(crate) fn trail_hash<'a>(events: impl IntoIterator<Item = &'a AuditEvent>) -> String {
    let mut hasher = Sha256::new();
    for event in events {
        hasher.update(event.hash.as_bytes());
    }
    hex(&hasher.finalize())
}

/// Saved reports in `dir`, newest first. Unreadable files are skipped.
pub(crate) fn recent_reports(dir: &Path, limit: usize) -> Result<Vec<ReportSummary>, ComplianceError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(ComplianceError::io(
                format!("Failed to list {}", dir.display()),
                e,
            ));
        }
    };

    let mut reports = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !file_name.starts_with(REPORT_PREFIX) || !file_name.ends_with(".json") {
            continue;
        }
        let parsed = fs::read_to_string(entry.path())
            .map_err(|e| e.to_string())
            .and_then(|c| serde_json::from_str::<ReportSummary>(&c).map_err(|e| e.to_string()));
        match parsed {
            Ok(mut summary) => {
                summary.file_name = file_name;
                reports.push(summary);
            }
            Err(e) => warn!("Skipping unreadable report {}: {}", file_name, e),
        }
    }

    reports.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
    reports.truncate(limit);
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::{AuditRecord, AuditTrail};
    use chrono::Duration;

    fn period() -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (now - Duration::days(30), now + Duration::seconds(1))
    }

    #[test]
    fn empty_categories_score_zero_and_count_in_mean() {
        let trail = AuditTrail::in_memory();
        trail
            .append(AuditRecord::new("data_encryption", "/db", "success", "data_protection"))
            .unwrap();
        trail
            .append(AuditRecord::new("data_encryption", "/db", "failed", "data_protection"))
            .unwrap();

        let (start, end) = period();
        let report = ComplianceReport::generate(Framework::Gdpr, &trail.events(), start, end, end);

        // data_protection 50%, privacy/consent/breach_notification empty
        assert_eq!(report.sections.len(), 4);
        assert_eq!(report.section("data_protection").unwrap().success_rate, 50.0);
        assert_eq!(report.section("privacy").unwrap().events_count, 0);
        assert_eq!(report.section("privacy").unwrap().success_rate, 0.0);
        assert!((report.overall_score - 12.5).abs() < 1e-9);
    }

    #[test]
    fn no_events_scores_zero() {
        let (start, end) = period();
        let report = ComplianceReport::generate(Framework::Nist, &[], start, end, end);
        assert_eq!(report.overall_score, 0.0);
        assert_eq!(report.events_considered, 0);
        assert_eq!(report.sections.len(), 5);
        assert!(
            report
                .recommendations
                .iter()
                .any(|r| r.contains("incident_response"))
        );
    }

    #[test]
    fn section_details() {
        let trail = AuditTrail::in_memory();
        for (action, result, risk) in [
            ("login", "success", RiskLevel::Low),
            ("login", "failed", RiskLevel::High),
            ("logout", "success", RiskLevel::Low),
            ("login", "success", RiskLevel::Critical),
            ("grant", "success", RiskLevel::Medium),
            ("revoke", "success", RiskLevel::Low),
            ("audit", "success", RiskLevel::Low),
            ("admin", "success", RiskLevel::Low),
        ] {
            trail
                .append(AuditRecord::new(action, "/r", result, "access_control").risk(risk))
                .unwrap();
        }

        let (start, end) = period();
        let report = ComplianceReport::generate(Framework::Iso27001, &trail.events(), start, end, end);
        let section = report.section("access_control").unwrap();

        assert_eq!(section.events_count, 8);
        assert_eq!(section.success_rate, 87.5);
        assert_eq!(
            section.risk_distribution,
            RiskCounts {
                low: 5,
                medium: 1,
                high: 1,
                critical: 1
            }
        );
        assert_eq!(section.top_actions.len(), 5);
        assert_eq!(
            section.top_actions[0],
            ActionCount {
                action: "login".into(),
                count: 3
            }
        );
        assert_eq!(section.top_actions[1].action, "admin");
        assert_eq!(section.recent_events.len(), 5);
        assert!(section.recent_events[0].timestamp >= section.recent_events[4].timestamp);
    }

    #[test]
    fn recommendations_follow_framework_rules() {
        let trail = AuditTrail::in_memory();
        for _ in 0..11 {
            trail
                .append(
                    AuditRecord::new("consent_management", "/u", "success", "consent")
                        .risk(RiskLevel::High),
                )
                .unwrap();
        }
        let (start, end) = period();
        let report = ComplianceReport::generate(Framework::Gdpr, &trail.events(), start, end, end);

        let recs = report.recommendations.join("\n");
        assert!(recs.contains("Critical compliance score"));
        assert!(recs.contains("data_encryption"));
        assert!(!recs.contains("consent_management"));
        assert!(recs.contains("11 high or critical"));

        let iso = ComplianceReport::generate(Framework::Iso27001, &trail.events(), start, end, end);
        assert!(iso.recommendations.iter().any(|r| r.contains("risk_assessment")));
    }

    #[test]
    fn events_outside_period_are_ignored() {
        let trail = AuditTrail::in_memory();
        let event = trail
            .append(AuditRecord::new("x", "/r", "success", "privacy"))
            .unwrap();

        let end = event.timestamp - Duration::seconds(1);
        let report = ComplianceReport::generate(
            Framework::Gdpr,
            &trail.events(),
            end - Duration::days(1),
            end,
            end,
        );
        assert_eq!(report.events_considered, 0);
        assert_eq!(report.audit_trail_hash, trail_hash(&Vec::<AuditEvent>::new()));
    }

    #[test]
    fn saved_reports_are_listed_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let (start, end) = period();

        let older = ComplianceReport::generate(Framework::Gdpr, &[], start, end, end - Duration::hours(1));
        let newer = ComplianceReport::generate(Framework::Nist, &[], start, end, end);
        let path = older.save(tmp.path()).unwrap();
        newer.save(tmp.path()).unwrap();
        fs::write(tmp.path().join("compliance_report_bad.json"), "{").unwrap();

        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("compliance_report_GDPR_")
        );
        assert_eq!(ComplianceReport::load(&path).unwrap(), older);

        let listed = recent_reports(tmp.path(), 5).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].report_id, newer.report_id);
        assert_eq!(listed[1].framework, Framework::Gdpr);

        assert_eq!(recent_reports(tmp.path(), 1).unwrap().len(), 1);
        assert!(recent_reports(&tmp.path().join("missing"), 5).unwrap().is_empty());
    }

    #[test]
    fn same_second_reports_get_separate_files() {
        let tmp = tempfile::tempdir().unwrap();
        let (start, end) = period();

        let first = ComplianceReport::generate(Framework::Gdpr, &[], start, end, end);
        let second = ComplianceReport::generate(Framework::Gdpr, &[], start, end, end);
        let a = first.save(tmp.path()).unwrap();
        let b = second.save(tmp.path()).unwrap();
        assert_ne!(a, b);
        assert_eq!(ComplianceReport::load(&a).unwrap(), first);
        assert_eq!(ComplianceReport::load(&b).unwrap(), second);

        // Saving the same report again must not clobber the file
        assert!(first.save(tmp.path()).is_err());
        assert_eq!(recent_reports(tmp.path(), 5).unwrap().len(), 2);
    }
}
