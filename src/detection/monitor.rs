//! Per-source suspicious-activity counters.
//!
//! Each source IP gets a window counter that resets whenever it crosses
//! `max_failed_attempts` (one brute-force signal per crossing) and a
//! lifetime total that drives [`SecurityMonitor::is_ip_blocked`]. Event
//! types get a resetting counter for high-activity signals. Both tables
//! are bounded; the least recently touched key is evicted first.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

use super::SecurityEvent;
use crate::config::DetectionConfig;

pub const DEFAULT_MAX_TRACKED: usize = 4096;

/// Source recorded for events without an IP.
const LOCAL_SOURCE: &str = "localhost";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MonitorSignal {
    BruteForce { source_ip: String, attempts: u32 },
    HighActivity { event_type: String, count: u32 },
}

/// Fixed-capacity map evicting the least recently used key.
struct LruTable<V> {
    entries: HashMap<String, V>,
    order: VecDeque<String>,
    capacity: usize,
}

impl<V: Default> LruTable<V> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn touch(&mut self, key: &str) -> &mut V {
        if self.entries.contains_key(key) {
            if let Some(pos) = self.order.iter().position(|k| k == key) {
                self.order.remove(pos);
            }
        } else if self.entries.len() >= self.capacity
            && let Some(evicted) = self.order.pop_front()
        {
            self.entries.remove(&evicted);
        }
        self.order.push_back(key.to_string());
        self.entries.entry(key.to_string()).or_default()
    }

    fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SourceCounts {
    window: u32,
    total: u32,
}

struct MonitorState {
    sources: LruTable<SourceCounts>,
    activity: LruTable<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStats {
    pub tracked_sources: usize,
    pub tracked_event_types: usize,
    pub blocked_sources: Vec<String>,
    pub max_failed_attempts: u32,
    pub max_suspicious_activities: u32,
}

pub struct SecurityMonitor {
    state: Mutex<MonitorState>,
    max_failed_attempts: u32,
    max_suspicious_activities: u32,
}

impl Default for SecurityMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRACKED, 5, 10)
    }
}

impl SecurityMonitor {
    pub fn new(max_tracked: usize, max_failed_attempts: u32, max_suspicious_activities: u32) -> Self {
        Self {
            state: Mutex::new(MonitorState {
                sources: LruTable::new(max_tracked),
                activity: LruTable::new(max_tracked),
            }),
            max_failed_attempts: max_failed_attempts.max(1),
            max_suspicious_activities: max_suspicious_activities.max(1),
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(
            config.max_tracked_sources,
            config.max_failed_attempts,
            config.max_suspicious_activities,
        )
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the event if its result marks it as suspicious.
    pub fn observe(&self, event: &SecurityEvent) -> Vec<MonitorSignal> {
        if !is_suspicious_result(&event.result) {
            return Vec::new();
        }
        self.record_suspicious(
            &event.event_type,
            event.source_ip.as_deref().unwrap_or(LOCAL_SOURCE),
        )
    }

    /// Bump both counters and return any thresholds crossed.
    pub fn record_suspicious(&self, event_type: &str, source_ip: &str) -> Vec<MonitorSignal> {
        let mut signals = Vec::new();
        let mut state = self.lock();

        let count = state.activity.touch(event_type);
        *count += 1;
        if *count >= self.max_suspicious_activities {
            signals.push(MonitorSignal::HighActivity {
                event_type: event_type.to_string(),
                count: *count,
            });
            *count = 0;
        }

        let source = state.sources.touch(source_ip);
        source.window += 1;
        source.total = source.total.saturating_add(1);
        if source.window >= self.max_failed_attempts {
            signals.push(MonitorSignal::BruteForce {
                source_ip: source_ip.to_string(),
                attempts: source.window,
            });
            source.window = 0;
        }
        drop(state);

        for signal in &signals {
            warn!(target: "security_event", ?signal, "Security monitor threshold crossed");
        }
        signals
    }

    /// True once a source has accumulated twice the failed-attempt limit.
    pub fn is_ip_blocked(&self, ip: &str) -> bool {
        self.lock()
            .sources
            .get(ip)
            .is_some_and(|c| c.total >= self.max_failed_attempts.saturating_mul(2))
    }

    pub fn stats(&self) -> MonitorStats {
        let state = self.lock();
        let limit = self.max_failed_attempts.saturating_mul(2);
        let mut blocked_sources: Vec<String> = state
            .sources
            .entries
            .iter()
            .filter(|(_, c)| c.total >= limit)
            .map(|(ip, _)| ip.clone())
            .collect();
        blocked_sources.sort();

        MonitorStats {
            tracked_sources: state.sources.len(),
            tracked_event_types: state.activity.len(),
            blocked_sources,
            max_failed_attempts: self.max_failed_attempts,
            max_suspicious_activities: self.max_suspicious_activities,
        }
    }
}

fn is_suspicious_result(result: &str) -> bool {
    matches!(result, "failed" | "denied" | "error" | "exceeded")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brute_force_signal_resets_window() {
        let monitor = SecurityMonitor::new(16, 5, 100);
        let mut signals = Vec::new();
        for _ in 0..5 {
            signals.extend(monitor.record_suspicious("authentication", "10.0.0.1"));
        }
        assert_eq!(
            signals,
            vec![MonitorSignal::BruteForce {
                source_ip: "10.0.0.1".into(),
                attempts: 5
            }]
        );

        // Window starts over; the next four attempts are quiet
        for _ in 0..4 {
            assert!(monitor.record_suspicious("authentication", "10.0.0.1").is_empty());
        }
        assert!(!monitor.is_ip_blocked("10.0.0.1"));
        assert_eq!(monitor.record_suspicious("authentication", "10.0.0.1").len(), 1);
        assert!(monitor.is_ip_blocked("10.0.0.1"));
        assert!(!monitor.is_ip_blocked("10.0.0.2"));
    }

    #[test]
    fn high_activity_per_event_type() {
        let monitor = SecurityMonitor::new(16, 1000, 3);
        let mut signals = Vec::new();
        for i in 0..3 {
            signals.extend(monitor.record_suspicious("file_access", &format!("10.0.1.{}", i)));
        }
        assert_eq!(
            signals,
            vec![MonitorSignal::HighActivity {
                event_type: "file_access".into(),
                count: 3
            }]
        );
    }

    #[test]
    fn only_suspicious_results_count() {
        let monitor = SecurityMonitor::new(16, 1, 100);
        let ok = SecurityEvent::builder("authentication")
            .resource("/login")
            .action("login")
            .result("success")
            .source_ip("10.0.0.3")
            .build()
            .unwrap();
        assert!(monitor.observe(&ok).is_empty());

        let bad = SecurityEvent::builder("authentication")
            .resource("/login")
            .action("login")
            .result("failed")
            .build()
            .unwrap();
        let signals = monitor.observe(&bad);
        assert!(signals.contains(&MonitorSignal::BruteForce {
            source_ip: "localhost".into(),
            attempts: 1
        }));
    }

    #[test]
    fn table_evicts_least_recently_used() {
        let monitor = SecurityMonitor::new(2, 100, 100);
        monitor.record_suspicious("t", "a");
        monitor.record_suspicious("t", "b");
        monitor.record_suspicious("t", "a"); // a is now most recent
        monitor.record_suspicious("t", "c"); // evicts b

        let state = monitor.lock();
        assert_eq!(state.sources.len(), 2);
        assert!(state.sources.get("a").is_some());
        assert!(state.sources.get("b").is_none());
        assert!(state.sources.get("c").is_some());
    }
}
