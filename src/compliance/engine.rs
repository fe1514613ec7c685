use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::audit::verify_events;
use super::report::{recent_reports, trail_hash};
use super::{
    AuditEvent, AuditRecord, AuditTrail, ComplianceError, ComplianceReport, Framework,
    IntegrityViolation, ReportSummary, RiskLevel, export,
};

const STATUS_REPORTS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceStatus {
    pub total_audit_events: usize,
    pub frameworks_supported: Vec<Framework>,
    pub last_audit_event: Option<DateTime<Utc>>,
    pub audit_integrity: bool,
    pub integrity_violations: usize,
    pub recent_reports: Vec<ReportSummary>,
    pub audit_log: Option<PathBuf>,
}

/// Audit trail plus report generation and export.
pub struct ComplianceEngine {
    trail: AuditTrail,
    reports_dir: Option<PathBuf>,
}

impl ComplianceEngine {
    /// Nothing touches the filesystem; reports are not saved.
    pub fn in_memory() -> Self {
        Self {
            trail: AuditTrail::in_memory(),
            reports_dir: None,
        }
    }

    pub fn open(
        audit_log: &Path,
        reports_dir: &Path,
        max_log_bytes: u64,
    ) -> Result<Self, ComplianceError> {
        let (trail, summary) = AuditTrail::open(audit_log, max_log_bytes)?;
        if summary.skipped > 0 {
            warn!(
                target: "security_event",
                "Audit log {} has {} corrupt line(s)",
                audit_log.display(),
                summary.skipped
            );
        }
        info!(
            "Compliance engine ready: {} audit events from {}",
            summary.loaded,
            audit_log.display()
        );
        Ok(Self {
            trail,
            reports_dir: Some(reports_dir.to_path_buf()),
        })
    }

    pub fn trail(&self) -> &AuditTrail {
        &self.trail
    }

    pub fn reports_dir(&self) -> Option<&Path> {
        self.reports_dir.as_deref()
    }

    pub fn log_event(&self, record: AuditRecord) -> Result<AuditEvent, ComplianceError> {
        let event = self.trail.append(record)?;
        if matches!(event.risk_level, RiskLevel::High | RiskLevel::Critical) {
            warn!(
                target: "security_event",
                action = %event.action,
                resource = %event.resource,
                result = %event.result,
                "High-risk audit event {}",
                event.event_id
            );
        } else {
            debug!("Audit event {} ({})", event.event_id, event.action);
        }
        Ok(event)
    }

    pub fn verify_integrity(&self) -> (bool, Vec<IntegrityViolation>) {
        self.trail.verify()
    }

    /// Score the last `days` days against `framework` and save the report
    /// when a reports directory is configured.
    pub fn generate_report(
        &self,
        framework: Framework,
        days: u32,
    ) -> Result<ComplianceReport, ComplianceError> {
        self.generate_report_at(framework, days, Utc::now())
    }

    pub fn generate_report_at(
        &self,
        framework: Framework,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<ComplianceReport, ComplianceError> {
        let start = now - Duration::days(i64::from(days));
        let events = self.trail.events_between(start, now);
        let report = ComplianceReport::generate(framework, &events, start, now, now);

        info!(
            "{} compliance report: score {:.1} over {} events",
            framework, report.overall_score, report.events_considered
        );
        if let Some(dir) = &self.reports_dir {
            report.save(dir)?;
        }
        Ok(report)
    }

    /// True when the trail still holds exactly the events the report hashed
    /// and those events are intact.
    pub fn verify_report(&self, report: &ComplianceReport) -> bool {
        let events = self
            .trail
            .events_between(report.period_start, report.period_end);
        let intact = events.iter().all(|e| e.compute_hash() == e.hash);
        intact && trail_hash(&events) == report.audit_trail_hash
    }

    /// Export events from the last `days` days. Returns the row count.
    pub fn export_csv(&self, path: &Path, days: u32) -> Result<usize, ComplianceError> {
        let now = Utc::now();
        let events = self
            .trail
            .events_between(now - Duration::days(i64::from(days)), now);
        let rows = export::write_csv(path, &events)?;
        info!("Exported {} audit events to {}", rows, path.display());
        Ok(rows)
    }

    pub fn recent_reports(&self, limit: usize) -> Result<Vec<ReportSummary>, ComplianceError> {
        match &self.reports_dir {
            Some(dir) => recent_reports(dir, limit),
            None => Ok(Vec::new()),
        }
    }

    pub fn status(&self) -> ComplianceStatus {
        let events = self.trail.events();
        let violations = verify_events(&events);
        let recent_reports = self.recent_reports(STATUS_REPORTS).unwrap_or_else(|e| {
            warn!("Failed to list compliance reports: {}", e);
            Vec::new()
        });

        ComplianceStatus {
            total_audit_events: events.len(),
            frameworks_supported: Framework::ALL.to_vec(),
            last_audit_event: events.last().map(|e| e.timestamp),
            audit_integrity: violations.is_empty(),
            integrity_violations: violations.len(),
            recent_reports,
            audit_log: self.trail.path().map(Path::to_path_buf),
        }
    }
}
