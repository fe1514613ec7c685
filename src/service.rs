//! Service object owning one instance of every component.
//!
//! ```text
//!  submit_event ──▶ ThreatDetectionEngine ──┐
//!        │     └──▶ SecurityMonitor ────────┼──▶ AlertingSystem
//!        └────────▶ ComplianceEngine (audit)│
//!                                           │
//!  monitors: correlation tick ──────────────┘
//!            alert cleanup tick, key expiry tick
//! ```
//!
//! Build it once with [`SecurityCore::init`], optionally start the
//! background monitors, and call [`SecurityCore::shutdown`] on exit.

use anyhow::{Context, Result};
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::alerting::{
    AlertSettings, AlertType, AlertingSystem, DashboardSnapshot, NewAlert,
};
use crate::breaker::{BreakerRegistry, CircuitError};
use crate::compliance::{
    AuditEvent, AuditRecord, ComplianceEngine, ComplianceError, ComplianceReport, Framework,
    IntegrityViolation, RiskLevel,
};
use crate::config::Config;
use crate::crypto::{Algorithm, Ciphertext, CryptoError, KeyManager, KeySettings, KeyStore};
use crate::detection::{
    Correlation, Detection, MonitorSignal, SecurityEvent, SecurityMonitor, Severity,
    ThreatDetectionEngine, ValidationError,
};

/// What one submitted event produced downstream.
#[derive(Debug, Clone, Serialize)]
pub struct EventOutcome {
    pub event_id: String,
    pub risk_score: f64,
    pub detections: Vec<Detection>,
    pub correlations: Vec<Correlation>,
    pub signals: Vec<MonitorSignal>,
    /// Ids returned by the alerting system, including suppressed ones
    pub alert_ids: Vec<String>,
    /// None when the audit write failed
    pub audit_event_id: Option<String>,
}

#[derive(Debug, Clone)]
struct MonitorIntervals {
    correlation: Duration,
    alert_cleanup: Duration,
    key_check: Duration,
}

enum Monitors {
    Idle,
    Running {
        stop: watch::Sender<bool>,
        tasks: Vec<JoinHandle<()>>,
    },
    Stopped,
}

pub struct SecurityCore {
    config: Config,
    keys: Arc<KeyManager>,
    breakers: BreakerRegistry,
    detection: Arc<ThreatDetectionEngine>,
    monitor: SecurityMonitor,
    compliance: Arc<ComplianceEngine>,
    alerts: Arc<AlertingSystem>,
    intervals: MonitorIntervals,
    monitors: Mutex<Monitors>,
}

impl SecurityCore {
    /// Open the key store and audit log under `config.paths`.
    pub fn init(config: Config) -> Result<Self> {
        config.paths.ensure_dirs()?;
        let paths = &config.paths;

        let key_settings = KeySettings::from_config(&config.keys).context("Invalid [keys]")?;
        let keys = KeyManager::open(KeyStore::new(paths.key_store()), key_settings)
            .context("Failed to open key store")?;

        let compliance = ComplianceEngine::open(
            &paths.audit_log(),
            &paths.reports_dir(),
            config.compliance.max_log_bytes,
        )
        .context("Failed to open audit trail")?;

        let core = Self::assemble(config, keys, compliance)?;
        info!(
            "Security core initialized (state: {})",
            core.config.paths.state_dir.display()
        );
        Ok(core)
    }

    /// Everything in memory; nothing is read from or written to disk.
    pub fn in_memory(config: Config) -> Result<Self> {
        let key_settings = KeySettings::from_config(&config.keys).context("Invalid [keys]")?;
        Self::assemble(
            config,
            KeyManager::in_memory(key_settings),
            ComplianceEngine::in_memory(),
        )
    }

    fn assemble(config: Config, keys: KeyManager, compliance: ComplianceEngine) -> Result<Self> {
        let breakers = BreakerRegistry::new(config.breaker_settings()?);
        let alerts = AlertingSystem::new(
            AlertSettings::from_config(&config.alerting).context("Invalid [alerting]")?,
        );
        let intervals = MonitorIntervals {
            correlation: config.monitors.correlation_interval()?,
            alert_cleanup: config.monitors.alert_cleanup_interval()?,
            key_check: config.monitors.key_check_interval()?,
        };

        Ok(Self {
            keys: Arc::new(keys),
            breakers,
            detection: Arc::new(ThreatDetectionEngine::new(config.detection.buffer_capacity)),
            monitor: SecurityMonitor::from_config(&config.detection),
            compliance: Arc::new(compliance),
            alerts: Arc::new(alerts),
            intervals,
            monitors: Mutex::new(Monitors::Idle),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    pub fn detection(&self) -> &ThreatDetectionEngine {
        &self.detection
    }

    pub fn monitor(&self) -> &SecurityMonitor {
        &self.monitor
    }

    pub fn compliance(&self) -> &ComplianceEngine {
        &self.compliance
    }

    pub fn alerts(&self) -> &AlertingSystem {
        &self.alerts
    }

    // ── Encryption ──

    pub fn encrypt(
        &self,
        plaintext: &[u8],
        algorithm: Option<Algorithm>,
    ) -> Result<Ciphertext, CryptoError> {
        self.keys.encrypt(plaintext, algorithm)
    }

    pub fn decrypt(&self, ciphertext: &Ciphertext) -> Result<Vec<u8>, CryptoError> {
        self.keys.decrypt(ciphertext)
    }

    /// Rotate and record the rotation in the audit trail.
    pub fn rotate_keys(&self) -> String {
        let key_id = self.keys.rotate();
        record_rotation(&self.compliance, &key_id, "manual");
        key_id
    }

    // ── Circuit breakers ──

    /// Guard `op` with the named breaker, optionally with a tighter deadline
    /// than the breaker's own.
    pub async fn call_through<F, Fut, T, E>(
        &self,
        breaker_id: &str,
        op: F,
        timeout: Option<Duration>,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.breakers.call_through(breaker_id, op, timeout).await
    }

    // ── Events ──

    /// Run an event through detection, the activity monitor and the audit
    /// trail, then raise alerts for whatever fired.
    pub fn submit_event(&self, event: SecurityEvent) -> Result<EventOutcome, ValidationError> {
        let ingestion = self.detection.ingest(event)?;
        let event = ingestion.event;
        let signals = self.monitor.observe(&event);

        let record = audit_record_for(&event, &ingestion.detections);
        let audit_event_id = match self.compliance.log_event(record) {
            Ok(audit) => Some(audit.event_id),
            Err(e) => {
                warn!(
                    target: "security_event",
                    event_id = %event.event_id,
                    "Failed to audit security event: {}",
                    e
                );
                None
            }
        };

        let mut alert_ids = Vec::new();
        for detection in &ingestion.detections {
            alert_ids.push(self.alerts.trigger(detection_alert(&event, detection)));
        }
        alert_ids.extend(raise_correlation_alerts(&self.alerts, &ingestion.correlations));
        for signal in &signals {
            alert_ids.push(self.alerts.trigger(signal_alert(signal)));
        }

        Ok(EventOutcome {
            event_id: event.event_id.clone(),
            risk_score: event.risk_score(),
            detections: ingestion.detections,
            correlations: ingestion.correlations,
            signals,
            alert_ids,
            audit_event_id,
        })
    }

    // ── Compliance ──

    pub fn append_audit_event(&self, record: AuditRecord) -> Result<AuditEvent, ComplianceError> {
        self.compliance.log_event(record)
    }

    pub fn verify_audit_integrity(&self) -> (bool, Vec<IntegrityViolation>) {
        self.compliance.verify_integrity()
    }

    pub fn generate_compliance_report(
        &self,
        framework: Framework,
        days: u32,
    ) -> Result<ComplianceReport, ComplianceError> {
        self.compliance.generate_report(framework, days)
    }

    pub fn export_audit_csv(&self, path: &Path, days: u32) -> Result<usize, ComplianceError> {
        self.compliance.export_csv(path, days)
    }

    // ── Alerts ──

    pub fn trigger_alert(&self, alert: NewAlert) -> String {
        self.alerts.trigger(alert)
    }

    pub fn acknowledge_alert(&self, alert_id: &str, user_id: &str) -> bool {
        self.alerts.acknowledge(alert_id, user_id)
    }

    pub fn resolve_alert(&self, alert_id: &str, reason: &str, user_id: &str) -> bool {
        self.alerts.resolve(alert_id, reason, user_id)
    }

    pub fn dashboard_snapshot(&self) -> DashboardSnapshot {
        self.alerts.dashboard()
    }

    // ── Background monitors ──

    fn lock_monitors(&self) -> MutexGuard<'_, Monitors> {
        self.monitors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the correlation, alert-cleanup and key-expiry loops on the
    /// current tokio runtime. Monitors cannot be restarted after shutdown.
    pub fn start_monitors(&self) -> Result<()> {
        let mut monitors = self.lock_monitors();
        match *monitors {
            Monitors::Running { .. } => anyhow::bail!("Security monitors are already running"),
            Monitors::Stopped => anyhow::bail!("Security monitors were stopped and cannot restart"),
            Monitors::Idle => {}
        }

        let (stop, stop_rx) = watch::channel(false);

        let detection = self.detection.clone();
        let alerts = self.alerts.clone();
        let correlation = spawn_monitor(
            "correlation",
            self.intervals.correlation,
            stop_rx.clone(),
            move || {
                let fired = detection.evaluate_correlations();
                raise_correlation_alerts(&alerts, &fired);
            },
        );

        let alerts = self.alerts.clone();
        let cleanup = spawn_monitor(
            "alert_cleanup",
            self.intervals.alert_cleanup,
            stop_rx.clone(),
            move || {
                alerts.cleanup();
            },
        );

        let keys = self.keys.clone();
        let compliance = self.compliance.clone();
        let key_check = spawn_monitor("key_expiry", self.intervals.key_check, stop_rx, move || {
            if let Some(key_id) = keys.rotate_if_expired_at(chrono::Utc::now()) {
                record_rotation(&compliance, &key_id, "expiry");
            }
        });

        *monitors = Monitors::Running {
            stop,
            tasks: vec![correlation, cleanup, key_check],
        };
        drop(monitors);

        self.alerts.set_monitoring_active(true);
        info!(
            "Security monitors started (correlation {:?}, cleanup {:?}, key check {:?})",
            self.intervals.correlation, self.intervals.alert_cleanup, self.intervals.key_check
        );
        Ok(())
    }

    pub fn monitors_running(&self) -> bool {
        matches!(*self.lock_monitors(), Monitors::Running { .. })
    }

    /// Stop the monitors and wait for them to exit (at most one tick each).
    pub async fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.lock_monitors(), Monitors::Stopped);
        let Monitors::Running { stop, tasks } = previous else {
            return;
        };

        let _ = stop.send(true);
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Security monitor task failed: {}", e);
            }
        }
        self.alerts.set_monitoring_active(false);
        info!("Security monitors stopped");
    }
}

/// Run `tick` every `interval` until `stop` flips.
fn spawn_monitor<F>(
    name: &'static str,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    tokio::spawn(async move {
        debug!("Monitor {} running every {:?}", name, interval);
        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = sleep(interval) => tick(),
            }
        }
        debug!("Monitor {} exited", name);
    })
}

fn raise_correlation_alerts(alerts: &AlertingSystem, correlations: &[Correlation]) -> Vec<String> {
    correlations
        .iter()
        .map(|c| {
            let mut alert = NewAlert::new(
                AlertType::for_correlation(&c.rule_name),
                c.severity,
                &c.description,
                &format!(
                    "Correlation rule {} matched {} events (confidence {:.2})",
                    c.rule_name,
                    c.event_ids.len(),
                    c.confidence
                ),
            )
            .meta("rule", c.rule_name.as_str())
            .meta("event_ids", c.event_ids.clone());
            if let [ip] = c.source_ips.as_slice() {
                alert = alert.source_ip(ip.as_str());
            }
            alerts.trigger(alert)
        })
        .collect()
}

fn detection_alert(event: &SecurityEvent, detection: &Detection) -> NewAlert {
    let mut alert = NewAlert::new(
        AlertType::for_pattern(&detection.pattern_id),
        detection.severity,
        &detection.name,
        &format!(
            "{} on {} matched {} (score {:.2})",
            event.event_type, event.resource, detection.pattern_id, detection.score
        ),
    )
    .meta("event_id", event.event_id.as_str())
    .meta("pattern_id", detection.pattern_id.as_str());
    if let Some(ip) = &event.source_ip {
        alert = alert.source_ip(ip.as_str());
    }
    if let Some(user) = &event.user_id {
        alert = alert.user(user.as_str());
    }
    alert
}

fn signal_alert(signal: &MonitorSignal) -> NewAlert {
    match signal {
        MonitorSignal::BruteForce {
            source_ip,
            attempts,
        } => NewAlert::new(
            AlertType::BruteForce,
            Severity::High,
            "Repeated failures from one source",
            &format!("{} suspicious attempts from {}", attempts, source_ip),
        )
        .source_ip(source_ip.as_str())
        .meta("attempts", *attempts),
        MonitorSignal::HighActivity { event_type, count } => NewAlert::new(
            AlertType::SuspiciousActivity,
            Severity::Medium,
            "High suspicious activity",
            &format!("{} suspicious {} events", count, event_type),
        )
        .meta("event_type", event_type.as_str())
        .meta("count", *count),
    }
}

/// Audit category a security event is filed under.
fn audit_category(event_type: &str) -> &'static str {
    match event_type {
        "authentication" => "access_control",
        "file_access" | "data_access" | "database" => "data_protection",
        t if t.starts_with("network") => "transmission",
        "admin_action" | "system" => "operations",
        _ => "detect",
    }
}

fn risk_level(score: f64) -> RiskLevel {
    if score >= 0.95 {
        RiskLevel::Critical
    } else if score >= 0.8 {
        RiskLevel::High
    } else if score >= 0.6 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn audit_record_for(event: &SecurityEvent, detections: &[Detection]) -> AuditRecord {
    let mut record = AuditRecord::new(
        &event.action,
        &event.resource,
        &event.result,
        audit_category(&event.event_type),
    )
    .risk(risk_level(event.risk_score()))
    .details(serde_json::json!({
        "security_event_id": event.event_id,
        "event_type": event.event_type,
        "source_ip": event.source_ip,
        "risk_score": event.risk_score(),
        "detections": detections.iter().map(|d| d.pattern_id.as_str()).collect::<Vec<_>>(),
    }));
    if let Some(user) = &event.user_id {
        record = record.user(user.as_str());
    }
    record
}

fn record_rotation(compliance: &ComplianceEngine, key_id: &str, trigger: &str) {
    let record = AuditRecord::new("key_rotation", key_id, "success", "cryptography")
        .risk(RiskLevel::Medium)
        .details(serde_json::json!({ "trigger": trigger }));
    if let Err(e) = compliance.log_event(record) {
        warn!(target: "security_event", "Failed to audit key rotation: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::Paths;

    fn failed_login(ip: &str, attempts: u32) -> SecurityEvent {
        SecurityEvent::builder("authentication")
            .resource("/login")
            .action("login")
            .result("failed")
            .source_ip(ip)
            .user_id("mallory")
            .meta("attempt_count", attempts)
            .build()
            .unwrap()
    }

    #[test]
    fn submit_event_routes_to_every_component() {
        let core = SecurityCore::in_memory(Config::default()).unwrap();

        let outcome = core.submit_event(failed_login("10.9.0.1", 8)).unwrap();
        assert!(
            outcome
                .detections
                .iter()
                .any(|d| d.pattern_id == "brute_force_attack")
        );
        assert!(outcome.audit_event_id.is_some());
        assert!(!outcome.alert_ids.is_empty());

        let audit = core.compliance().trail().events();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].category, "access_control");
        assert_eq!(audit[0].user_id.as_deref(), Some("mallory"));
        assert_eq!(audit[0].details["detections"][0], "brute_force_attack");

        let active = core.alerts().active_alerts();
        assert!(active.iter().any(|a| a.alert_type == AlertType::BruteForce));
        assert_eq!(core.detection().buffered_events(), 1);
    }

    #[test]
    fn repeated_failures_raise_monitor_signal() {
        let core = SecurityCore::in_memory(Config::default()).unwrap();
        let mut signals = Vec::new();
        for _ in 0..5 {
            signals.extend(core.submit_event(failed_login("10.9.0.2", 1)).unwrap().signals);
        }
        assert!(signals.contains(&MonitorSignal::BruteForce {
            source_ip: "10.9.0.2".into(),
            attempts: 5
        }));
        // Cooldown keeps the brute-force alert for this source to one
        let brute: Vec<_> = core
            .alerts()
            .active_alerts()
            .into_iter()
            .filter(|a| a.alert_type == AlertType::BruteForce)
            .collect();
        assert_eq!(brute.len(), 1);
    }

    #[test]
    fn invalid_event_is_not_audited() {
        let core = SecurityCore::in_memory(Config::default()).unwrap();
        let mut event = failed_login("10.9.0.3", 1);
        event.action.clear();
        assert_eq!(
            core.submit_event(event).unwrap_err(),
            ValidationError::MissingField("action")
        );
        assert!(core.compliance().trail().is_empty());
        assert_eq!(core.detection().buffered_events(), 0);
    }

    #[test]
    fn rotation_is_audited_and_old_ciphertext_still_opens() {
        let core = SecurityCore::in_memory(Config::default()).unwrap();
        let sealed = core.encrypt(b"patient record", None).unwrap();
        let new_id = core.rotate_keys();

        assert_eq!(core.decrypt(&sealed).unwrap(), b"patient record");
        let audit = core.compliance().trail().events();
        assert_eq!(audit.last().unwrap().action, "key_rotation");
        assert_eq!(audit.last().unwrap().resource, new_id);
        assert!(core.verify_audit_integrity().0);
    }

    #[test]
    fn init_persists_under_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            paths: Paths::rooted(tmp.path()),
            ..Config::default()
        };
        let key_id = {
            let core = SecurityCore::init(config.clone()).unwrap();
            core.append_audit_event(AuditRecord::new("login", "/s", "success", "access_control"))
                .unwrap();
            core.keys().current_key().key_id.clone()
        };

        let core = SecurityCore::init(config.clone()).unwrap();
        assert_eq!(core.keys().current_key().key_id, key_id);
        assert_eq!(core.compliance().trail().len(), 1);
        assert!(config.paths.key_store().exists());
        assert!(config.paths.audit_log().exists());
    }

    #[tokio::test]
    async fn call_through_uses_named_breaker() {
        let core = SecurityCore::in_memory(Config::default()).unwrap();
        let ok: Result<u32, CircuitError<String>> =
            core.call_through("network", || async { Ok(7) }, None).await;
        assert_eq!(ok.unwrap(), 7);

        let missing: Result<u32, CircuitError<String>> =
            core.call_through("nope", || async { Ok(1) }, None).await;
        assert!(matches!(missing, Err(CircuitError::Unknown(_))));

        let short = Duration::from_millis(10);
        let slow: Result<u32, CircuitError<String>> = core
            .call_through(
                "network",
                || async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(1)
                },
                Some(short),
            )
            .await;
        assert!(matches!(slow, Err(CircuitError::Timeout(d)) if d == short));
    }

    #[tokio::test]
    async fn monitors_start_stop_once() {
        let mut config = Config::default();
        config.monitors.correlation_interval = "20ms".into();
        config.monitors.alert_cleanup_interval = "20ms".into();
        config.monitors.key_check_interval = "20ms".into();
        let core = SecurityCore::in_memory(config).unwrap();

        core.start_monitors().unwrap();
        assert!(core.monitors_running());
        assert!(core.alerts().is_monitoring_active());
        assert!(core.start_monitors().is_err());

        tokio::time::sleep(Duration::from_millis(60)).await;
        core.shutdown().await;
        assert!(!core.monitors_running());
        assert!(!core.alerts().is_monitoring_active());
        assert!(core.start_monitors().is_err());
    }
}
