use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use super::{Correlation, CorrelationRule, SecurityEvent, Severity, ThreatPattern, ValidationError};

pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

const RECENT_CORRELATIONS: usize = 100;
const RISK_SAMPLE: usize = 100;

/// A pattern that crossed its threshold for one event.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub pattern_id: String,
    pub name: String,
    pub severity: Severity,
    pub score: f64,
}

/// What ingesting one event produced.
#[derive(Debug, Clone)]
pub struct Ingestion {
    pub event: Arc<SecurityEvent>,
    pub detections: Vec<Detection>,
    pub correlations: Vec<Correlation>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RiskDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl RiskDistribution {
    fn add(&mut self, risk: f64) {
        if risk >= 0.95 {
            self.critical += 1;
        } else if risk >= 0.8 {
            self.high += 1;
        } else if risk >= 0.6 {
            self.medium += 1;
        } else {
            self.low += 1;
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreatIntelligence {
    /// Patterns detected at least once
    pub active_patterns: usize,
    pub total_occurrences: u64,
    pub most_active_pattern: Option<String>,
    pub recent_correlations: Vec<Correlation>,
    /// Over the most recent events in the buffer
    pub risk_distribution: RiskDistribution,
    pub buffered_events: usize,
}

struct EngineState {
    buffer: VecDeque<Arc<SecurityEvent>>,
    capacity: usize,
    patterns: Vec<ThreatPattern>,
    rules: Vec<CorrelationRule>,
    recent_correlations: VecDeque<Correlation>,
}

impl EngineState {
    fn push(&mut self, event: Arc<SecurityEvent>) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
    }

    fn correlate(&mut self, now: DateTime<Utc>) -> Vec<Correlation> {
        let fired: Vec<Correlation> = self
            .rules
            .iter()
            .filter_map(|rule| rule.evaluate(self.buffer.iter().rev(), now))
            .collect();

        for c in &fired {
            warn!(
                rule = %c.rule_name,
                severity = %c.severity,
                events = c.event_ids.len(),
                "Event correlation detected"
            );
            if self.recent_correlations.len() >= RECENT_CORRELATIONS {
                self.recent_correlations.pop_front();
            }
            self.recent_correlations.push_back(c.clone());
        }
        fired
    }
}

/// Pattern matching and correlation over a bounded ring buffer.
pub struct ThreatDetectionEngine {
    state: Mutex<EngineState>,
}

impl Default for ThreatDetectionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl ThreatDetectionEngine {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(EngineState {
                buffer: VecDeque::with_capacity(capacity.min(DEFAULT_BUFFER_CAPACITY)),
                capacity,
                patterns: ThreatPattern::catalog(),
                rules: CorrelationRule::defaults(),
                recent_correlations: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate, buffer, match against every pattern and evaluate the
    /// correlation rules as of the event's timestamp.
    pub fn ingest(&self, event: SecurityEvent) -> Result<Ingestion, ValidationError> {
        event.validate()?;
        let event = Arc::new(event);
        let now = Utc::now();

        let mut state = self.lock();
        state.push(event.clone());

        let mut detections = Vec::new();
        for pattern in state.patterns.iter_mut() {
            let score = pattern.match_score(&event);
            if pattern.is_detected(score) {
                pattern.record(&event.event_id, now);
                warn!(
                    pattern = %pattern.pattern_id,
                    event_id = %event.event_id,
                    "Threat detected: {} (confidence {:.2})",
                    pattern.name,
                    score
                );
                detections.push(Detection {
                    pattern_id: pattern.pattern_id.clone(),
                    name: pattern.name.clone(),
                    severity: pattern.severity,
                    score,
                });
            }
        }

        let correlations = state.correlate(event.timestamp);
        drop(state);

        debug!(
            event_type = %event.event_type,
            source_ip = event.source_ip.as_deref().unwrap_or("-"),
            "Security event ingested"
        );

        Ok(Ingestion {
            event,
            detections,
            correlations,
        })
    }

    /// Evaluate every correlation rule as of now.
    pub fn evaluate_correlations(&self) -> Vec<Correlation> {
        self.evaluate_correlations_at(Utc::now())
    }

    pub fn evaluate_correlations_at(&self, now: DateTime<Utc>) -> Vec<Correlation> {
        self.lock().correlate(now)
    }

    /// Add or replace a rule by name.
    pub fn add_rule(&self, rule: CorrelationRule) {
        let mut state = self.lock();
        state.rules.retain(|r| r.name != rule.name);
        state.rules.push(rule);
    }

    pub fn rules(&self) -> Vec<CorrelationRule> {
        self.lock().rules.clone()
    }

    pub fn patterns(&self) -> Vec<ThreatPattern> {
        self.lock().patterns.clone()
    }

    pub fn buffered_events(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Events with at least this risk, newest first.
    pub fn high_risk_events(&self, min_risk: f64, limit: usize) -> Vec<Arc<SecurityEvent>> {
        let recent: Vec<Arc<SecurityEvent>> = self.lock().buffer.iter().rev().cloned().collect();
        recent
            .into_iter()
            .filter(|e| e.risk_score() >= min_risk)
            .take(limit)
            .collect()
    }

    pub fn intelligence(&self) -> ThreatIntelligence {
        let (sample, patterns, recent, buffered) = {
            let state = self.lock();
            let sample: Vec<Arc<SecurityEvent>> =
                state.buffer.iter().rev().take(RISK_SAMPLE).cloned().collect();
            let recent: Vec<Correlation> =
                state.recent_correlations.iter().rev().take(10).cloned().collect();
            (sample, state.patterns.clone(), recent, state.buffer.len())
        };

        // Risk is computed outside the lock; it only reads the event
        let mut risk_distribution = RiskDistribution::default();
        for event in &sample {
            risk_distribution.add(event.risk_score());
        }

        let most_active_pattern = patterns
            .iter()
            .filter(|p| p.occurrences > 0)
            .max_by_key(|p| p.occurrences)
            .map(|p| p.pattern_id.clone());

        ThreatIntelligence {
            active_patterns: patterns.iter().filter(|p| p.occurrences > 0).count(),
            total_occurrences: patterns.iter().map(|p| p.occurrences).sum(),
            most_active_pattern,
            recent_correlations: recent,
            risk_distribution,
            buffered_events: buffered,
        }
    }
}
