use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{AlertType, NewAlert, RESOLVED_LIMIT, RESOLVED_TIMEOUT, SecurityAlert};
use crate::config::AlertingConfig;
use crate::detection::Severity;

pub type AlertHandler = Arc<dyn Fn(&SecurityAlert) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSettings {
    pub cooldown: Duration,
    pub max_active_alerts: usize,
    pub auto_resolve: Duration,
    pub history_limit: usize,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(5 * 60),
            max_active_alerts: 50,
            auto_resolve: Duration::from_secs(24 * 60 * 60),
            history_limit: 1000,
        }
    }
}

impl AlertSettings {
    pub fn from_config(config: &AlertingConfig) -> anyhow::Result<Self> {
        Ok(Self {
            cooldown: config.cooldown()?,
            max_active_alerts: config.max_active_alerts.max(1),
            auto_resolve: config.auto_resolve()?,
            history_limit: config.history_limit.max(1),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertStatistics {
    pub total_alerts: usize,
    pub active_alerts: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_type: BTreeMap<AlertType, usize>,
    pub most_recent: Option<SecurityAlert>,
}

#[derive(Default)]
struct AlertState {
    /// Unresolved alerts, oldest first
    active: Vec<SecurityAlert>,
    /// Every stored alert, oldest first, bounded by `history_limit`
    history: VecDeque<SecurityAlert>,
    /// When each (type, source) last stored an alert; pruned past the cooldown
    last_raised: HashMap<(AlertType, Option<String>), DateTime<Utc>>,
}

impl AlertState {
    /// Mirror an alert's latest state into its history entry.
    fn sync_history(&mut self, alert: &SecurityAlert) {
        if let Some(entry) = self
            .history
            .iter_mut()
            .rev()
            .find(|a| a.alert_id == alert.alert_id)
        {
            *entry = alert.clone();
        }
    }

    fn resolve_index(&mut self, index: usize, reason: &str, now: DateTime<Utc>) -> SecurityAlert {
        let mut alert = self.active.remove(index);
        alert.resolved = true;
        alert.resolved_at = Some(now);
        alert.resolution = Some(reason.to_string());
        self.sync_history(&alert);
        alert
    }
}

pub struct AlertingSystem {
    settings: AlertSettings,
    state: Mutex<AlertState>,
    handlers: Mutex<HashMap<AlertType, Vec<AlertHandler>>>,
    monitoring_active: AtomicBool,
}

impl Default for AlertingSystem {
    fn default() -> Self {
        Self::new(AlertSettings::default())
    }
}

impl AlertingSystem {
    pub fn new(settings: AlertSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(AlertState::default()),
            handlers: Mutex::new(HashMap::new()),
            monitoring_active: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &AlertSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, AlertState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_handlers(&self) -> MutexGuard<'_, HashMap<AlertType, Vec<AlertHandler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `handler` for every stored alert of `alert_type`.
    pub fn register_handler<F>(&self, alert_type: AlertType, handler: F)
    where
        F: Fn(&SecurityAlert) + Send + Sync + 'static,
    {
        self.lock_handlers()
            .entry(alert_type)
            .or_default()
            .push(Arc::new(handler));
        info!("Alert handler registered for {}", alert_type);
    }

    pub fn handler_count(&self) -> usize {
        self.lock_handlers().values().map(Vec::len).sum()
    }

    pub fn set_monitoring_active(&self, active: bool) {
        self.monitoring_active.store(active, Ordering::SeqCst);
    }

    pub fn is_monitoring_active(&self) -> bool {
        self.monitoring_active.load(Ordering::SeqCst)
    }

    /// Raise an alert and return its id.
    ///
    /// Inside the cooldown for the same `(alert_type, source_ip)` the id is
    /// still returned but nothing is stored and no handler runs.
    pub fn trigger(&self, alert: NewAlert) -> String {
        self.trigger_at(alert, Utc::now())
    }

    pub fn trigger_at(&self, new: NewAlert, now: DateTime<Utc>) -> String {
        let alert_id = format!("alert_{}", uuid::Uuid::new_v4().simple());
        let cooldown = chrono::Duration::from_std(self.settings.cooldown)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let key = (new.alert_type, new.source_ip.clone());

        let alert = {
            let mut state = self.lock();
            state.last_raised.retain(|_, at| now - *at < cooldown);
            if state.last_raised.contains_key(&key) {
                debug!("Alert {} in cooldown, skipping", new.alert_type);
                return alert_id;
            }
            state.last_raised.insert(key, now);

            let alert = new.into_alert(alert_id.clone(), now);
            state.active.push(alert.clone());
            if state.history.len() >= self.settings.history_limit {
                state.history.pop_front();
            }
            state.history.push_back(alert.clone());

            if state.active.len() > self.settings.max_active_alerts {
                // Never evict the alert just raised
                let older = state.active.len() - 1;
                let index = state.active[..older]
                    .iter()
                    .position(|a| !a.acknowledged)
                    .unwrap_or(0);
                let evicted = state.resolve_index(index, RESOLVED_LIMIT, now);
                debug!("Active alert cap reached, resolved {}", evicted.alert_id);
            }
            alert
        };

        warn!(
            target: "security_event",
            alert_id = %alert.alert_id,
            source_ip = alert.source_ip.as_deref().unwrap_or("-"),
            "SECURITY ALERT [{}]: {} - {}",
            alert.severity,
            alert.title,
            alert.description
        );
        self.notify(&alert);
        alert_id
    }

    fn notify(&self, alert: &SecurityAlert) {
        let handlers: Vec<AlertHandler> = self
            .lock_handlers()
            .get(&alert.alert_type)
            .cloned()
            .unwrap_or_default();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(alert))).is_err() {
                error!(
                    "Alert handler for {} panicked on {}",
                    alert.alert_type, alert.alert_id
                );
            }
        }
    }

    /// Mark an active alert as seen. False if no such active alert.
    pub fn acknowledge(&self, alert_id: &str, user_id: &str) -> bool {
        let mut state = self.lock();
        let Some(alert) = state.active.iter_mut().find(|a| a.alert_id == alert_id) else {
            return false;
        };
        alert.acknowledged = true;
        alert.acknowledged_by = Some(user_id.to_string());
        let alert = alert.clone();
        state.sync_history(&alert);
        drop(state);

        info!("Alert {} acknowledged by {}", alert_id, user_id);
        true
    }

    /// Resolve an active alert. False if no such active alert.
    pub fn resolve(&self, alert_id: &str, reason: &str, user_id: &str) -> bool {
        let mut state = self.lock();
        let Some(index) = state.active.iter().position(|a| a.alert_id == alert_id) else {
            return false;
        };
        state.resolve_index(index, reason, Utc::now());
        drop(state);

        info!("Alert {} resolved by {}: {}", alert_id, user_id, reason);
        true
    }

    /// Resolve unacknowledged alerts older than `auto_resolve`. Returns how
    /// many were resolved.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let max_age = chrono::Duration::from_std(self.settings.auto_resolve)
            .unwrap_or_else(|_| chrono::Duration::MAX);
        let mut state = self.lock();
        let mut resolved = 0;
        let mut index = 0;
        while index < state.active.len() {
            let alert = &state.active[index];
            if !alert.acknowledged && now - alert.timestamp >= max_age {
                state.resolve_index(index, RESOLVED_TIMEOUT, now);
                resolved += 1;
            } else {
                index += 1;
            }
        }
        drop(state);

        if resolved > 0 {
            info!("Auto-resolved {} stale alert(s)", resolved);
        }
        resolved
    }

    pub fn get(&self, alert_id: &str) -> Option<SecurityAlert> {
        let state = self.lock();
        state
            .active
            .iter()
            .chain(state.history.iter().rev())
            .find(|a| a.alert_id == alert_id)
            .cloned()
    }

    /// Unresolved alerts, oldest first.
    pub fn active_alerts(&self) -> Vec<SecurityAlert> {
        self.lock().active.clone()
    }

    pub fn alerts_by_severity(&self, severity: Severity) -> Vec<SecurityAlert> {
        self.lock()
            .active
            .iter()
            .filter(|a| a.severity == severity)
            .cloned()
            .collect()
    }

    /// Stored alerts, oldest first.
    pub fn history(&self) -> Vec<SecurityAlert> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn statistics(&self) -> AlertStatistics {
        let state = self.lock();
        let mut by_severity = BTreeMap::new();
        let mut by_type = BTreeMap::new();
        for alert in &state.history {
            *by_severity.entry(alert.severity).or_insert(0) += 1;
            *by_type.entry(alert.alert_type).or_insert(0) += 1;
        }
        AlertStatistics {
            total_alerts: state.history.len(),
            active_alerts: state.active.len(),
            by_severity,
            by_type,
            most_recent: state.history.back().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn brute_force(ip: &str) -> NewAlert {
        NewAlert::new(
            AlertType::BruteForce,
            Severity::High,
            "Brute force",
            "Repeated failed logins",
        )
        .source_ip(ip)
    }

    #[test]
    fn cooldown_suppresses_repeats_per_source() {
        let system = AlertingSystem::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        system.register_handler(AlertType::BruteForce, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let now = Utc::now();
        let first = system.trigger_at(brute_force("10.0.0.1"), now);
        let second = system.trigger_at(brute_force("10.0.0.1"), now + chrono::Duration::minutes(1));
        assert_ne!(first, second);
        assert_eq!(system.active_alerts().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(system.get(&second).is_none());

        // Another source is not affected
        system.trigger_at(brute_force("10.0.0.2"), now + chrono::Duration::minutes(1));
        assert_eq!(system.active_alerts().len(), 2);

        // Past the cooldown the first source alerts again
        system.trigger_at(brute_force("10.0.0.1"), now + chrono::Duration::minutes(6));
        assert_eq!(system.active_alerts().len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn cap_resolves_oldest_unacknowledged() {
        let system = AlertingSystem::new(AlertSettings {
            max_active_alerts: 3,
            ..AlertSettings::default()
        });
        let now = Utc::now();
        let ids: Vec<String> = (0..3)
            .map(|i| system.trigger_at(brute_force(&format!("10.0.1.{}", i)), now))
            .collect();
        assert!(system.acknowledge(&ids[0], "analyst"));

        let newest = system.trigger_at(brute_force("10.0.1.9"), now);
        let active: Vec<String> = system
            .active_alerts()
            .into_iter()
            .map(|a| a.alert_id)
            .collect();
        assert_eq!(active, vec![ids[0].clone(), ids[2].clone(), newest]);

        let evicted = system.get(&ids[1]).unwrap();
        assert!(evicted.resolved);
        assert_eq!(evicted.resolution.as_deref(), Some(RESOLVED_LIMIT));
    }

    #[test]
    fn cap_falls_back_to_oldest_when_all_acknowledged() {
        let system = AlertingSystem::new(AlertSettings {
            max_active_alerts: 2,
            ..AlertSettings::default()
        });
        let now = Utc::now();
        let a = system.trigger_at(brute_force("a"), now);
        let b = system.trigger_at(brute_force("b"), now);
        system.acknowledge(&a, "u");
        system.acknowledge(&b, "u");

        system.trigger_at(brute_force("c"), now);
        assert!(system.get(&a).unwrap().resolved);
        assert!(!system.get(&b).unwrap().resolved);
    }

    #[test]
    fn cleanup_resolves_stale_unacknowledged() {
        let system = AlertingSystem::default();
        let then = Utc::now() - chrono::Duration::hours(25);
        let stale = system.trigger_at(brute_force("a"), then);
        let kept = system.trigger_at(brute_force("b"), then);
        system.acknowledge(&kept, "analyst");
        system.trigger_at(brute_force("c"), Utc::now());

        assert_eq!(system.cleanup(), 1);
        let resolved = system.get(&stale).unwrap();
        assert_eq!(resolved.resolution.as_deref(), Some(RESOLVED_TIMEOUT));
        assert_eq!(system.active_alerts().len(), 2);
        assert_eq!(system.cleanup(), 0);
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let system = AlertingSystem::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        system.register_handler(AlertType::DataBreach, |_| panic!("handler bug"));
        system.register_handler(AlertType::DataBreach, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(system.handler_count(), 2);

        system.trigger(NewAlert::new(
            AlertType::DataBreach,
            Severity::Critical,
            "Exfiltration",
            "Large transfer",
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(system.active_alerts().len(), 1);
    }

    #[test]
    fn acknowledge_and_resolve_update_history() {
        let system = AlertingSystem::default();
        let id = system.trigger(brute_force("10.0.0.5"));

        assert!(system.acknowledge(&id, "analyst"));
        assert!(system.resolve(&id, "false positive", "analyst"));
        assert!(!system.resolve(&id, "again", "analyst"));
        assert!(!system.acknowledge("alert_missing", "analyst"));

        let history = system.history();
        assert_eq!(history.len(), 1);
        assert!(history[0].acknowledged);
        assert_eq!(history[0].acknowledged_by.as_deref(), Some("analyst"));
        assert_eq!(history[0].resolution.as_deref(), Some("false positive"));
        assert!(system.active_alerts().is_empty());
    }

    #[test]
    fn history_is_bounded() {
        let system = AlertingSystem::new(AlertSettings {
            history_limit: 3,
            max_active_alerts: 100,
            ..AlertSettings::default()
        });
        for i in 0..5 {
            system.trigger(brute_force(&format!("10.0.2.{}", i)));
        }
        let stats = system.statistics();
        assert_eq!(stats.total_alerts, 3);
        assert_eq!(stats.active_alerts, 5);
        assert_eq!(stats.by_type[&AlertType::BruteForce], 3);
        assert_eq!(
            stats.most_recent.and_then(|a| a.source_ip).as_deref(),
            Some("10.0.2.4")
        );
    }
}
