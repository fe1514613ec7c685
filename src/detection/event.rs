use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::sync::OnceLock;
use uuid::Uuid;

use super::ValidationError;
use super::pattern;

const MIB: f64 = 1024.0 * 1024.0;

/// An observation submitted by a collaborator. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub resource: String,
    pub action: String,
    pub result: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(skip)]
    risk_score: OnceLock<f64>,
}

impl SecurityEvent {
    pub fn builder(event_type: impl Into<String>) -> SecurityEventBuilder {
        SecurityEventBuilder::new(event_type)
    }

    /// Reject events missing any required field or carrying a source
    /// address that is not an IPv4/IPv6 literal.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("event_id", &self.event_id),
            ("event_type", &self.event_type),
            ("resource", &self.resource),
            ("action", &self.action),
            ("result", &self.result),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField(name));
            }
        }
        if let Some(ip) = &self.source_ip {
            ip.parse::<IpAddr>()
                .map_err(|e| ValidationError::InvalidField {
                    field: "source_ip",
                    reason: format!("{:?}: {}", ip, e),
                })?;
        }
        Ok(())
    }

    pub fn metadata_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(Value::as_f64)
    }

    /// Metadata value rendered as text. Non-string values use their JSON form.
    pub fn metadata_text(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn metadata_flag(&self, key: &str) -> bool {
        self.metadata.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Risk in `[0, 1]`, computed on first access and cached.
    pub fn risk_score(&self) -> f64 {
        *self.risk_score.get_or_init(|| compute_risk(self))
    }
}

fn compute_risk(event: &SecurityEvent) -> f64 {
    let base = match event.event_type.as_str() {
        "authentication" => 0.3,
        "file_access" => 0.4,
        "network" => 0.5,
        "database" => 0.6,
        "admin_action" => 0.8,
        "system" => 0.7,
        _ => 0.1,
    };

    let penalty = match event.result.as_str() {
        "failed" => 0.3,
        "denied" => 0.4,
        "error" => 0.2,
        _ => 0.0,
    };

    let mut magnitude = 0.0;
    if let Some(size) = event.metadata_f64("file_size") {
        let mib = size / MIB;
        if mib > 100.0 {
            magnitude += 0.3;
        } else if mib > 10.0 {
            magnitude += 0.1;
        }
    }
    if let Some(attempts) = event.metadata_f64("attempt_count") {
        if attempts > 10.0 {
            magnitude += 0.4;
        } else if attempts > 5.0 {
            magnitude += 0.2;
        }
    }
    if let Some(rate) = event.metadata_f64("transfer_rate")
        && rate / MIB > 50.0
    {
        magnitude += 0.3;
    }

    let threat = pattern::max_match_score(event) * 0.5;

    (base + penalty + magnitude + threat).clamp(0.0, 1.0)
}

/// Builder for [`SecurityEvent`]. `build` validates.
#[derive(Debug, Clone)]
pub struct SecurityEventBuilder {
    event_id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    event_type: String,
    source_ip: Option<String>,
    user_id: Option<String>,
    resource: String,
    action: String,
    result: String,
    metadata: Map<String, Value>,
}

impl SecurityEventBuilder {
    fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_id: None,
            timestamp: None,
            event_type: event_type.into(),
            source_ip: None,
            user_id: None,
            resource: String::new(),
            action: String::new(),
            result: String::new(),
            metadata: Map::new(),
        }
    }

    pub fn event_id(mut self, id: impl Into<String>) -> Self {
        self.event_id = Some(id.into());
        self
    }

    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn source_ip(mut self, ip: impl Into<String>) -> Self {
        self.source_ip = Some(ip.into());
        self
    }

    pub fn user_id(mut self, user: impl Into<String>) -> Self {
        self.user_id = Some(user.into());
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    pub fn result(mut self, result: impl Into<String>) -> Self {
        self.result = result.into();
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn build(self) -> Result<SecurityEvent, ValidationError> {
        let event = SecurityEvent {
            event_id: self
                .event_id
                .unwrap_or_else(|| format!("evt_{}", Uuid::new_v4().simple())),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            event_type: self.event_type,
            source_ip: self.source_ip,
            user_id: self.user_id,
            resource: self.resource,
            action: self.action,
            result: self.result,
            metadata: self.metadata,
            risk_score: OnceLock::new(),
        };
        event.validate()?;
        Ok(event)
    }
}
