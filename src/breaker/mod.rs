//! Circuit breakers for calls to unreliable external services.
//!
//! ```text
//!            failure_threshold failures
//!   Closed ─────────────────────────────▶ Open
//!     ▲                                   │  recovery_timeout elapsed
//!     │ success_threshold successes       ▼  (checked on next call)
//!     └──────────────────────────────── HalfOpen
//!                  any failure: back to Open
//! ```

mod circuit;
mod registry;

pub use circuit::{BreakerMetrics, BreakerStatus, CircuitBreaker, StateChange};
pub use registry::BreakerRegistry;

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        })
    }
}

/// Thresholds and timeouts for one breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
#[error("invalid breaker settings: {0}")]
pub struct InvalidSettings(String);

impl BreakerSettings {
    /// AI inference backends.
    pub fn ai() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
            timeout: Duration::from_secs(15),
        }
    }

    /// Text-to-speech engines.
    pub fn tts() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
            timeout: Duration::from_secs(10),
        }
    }

    /// Generic network calls.
    pub fn network() -> Self {
        Self {
            failure_threshold: 10,
            recovery_timeout: Duration::from_secs(120),
            success_threshold: 5,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn presets() -> [(&'static str, BreakerSettings); 3] {
        [
            ("ai", Self::ai()),
            ("tts", Self::tts()),
            ("network", Self::network()),
        ]
    }

    pub fn validate(&self) -> Result<(), InvalidSettings> {
        if self.failure_threshold == 0 {
            return Err(InvalidSettings("failure_threshold must be at least 1".into()));
        }
        if self.success_threshold == 0 {
            return Err(InvalidSettings("success_threshold must be at least 1".into()));
        }
        if self.timeout.is_zero() {
            return Err(InvalidSettings("timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Outcome of a protected call that did not produce a value.
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// Rejected without invoking the operation.
    #[error("circuit breaker '{0}' is open")]
    Open(String),

    /// The operation did not finish in time. It may still be running.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The operation's own error.
    #[error("{0}")]
    Inner(E),

    #[error("no circuit breaker named '{0}'")]
    Unknown(String),
}

impl<E> CircuitError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CircuitError::Timeout(_))
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_documented_values() {
        let presets = BreakerSettings::presets();
        assert_eq!(presets[0].0, "ai");
        assert_eq!(presets[0].1.failure_threshold, 3);
        assert_eq!(presets[1].1.recovery_timeout, Duration::from_secs(60));
        assert_eq!(presets[2].1.timeout, Duration::from_secs(5));
        for (_, settings) in presets {
            settings.validate().unwrap();
        }
    }

    #[test]
    fn zero_thresholds_rejected() {
        let mut s = BreakerSettings::ai();
        s.failure_threshold = 0;
        assert!(s.validate().is_err());

        let mut s = BreakerSettings::ai();
        s.success_threshold = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn error_display() {
        let e: CircuitError<String> = CircuitError::Inner("boom".into());
        assert_eq!(e.to_string(), "boom");
        let e: CircuitError<String> = CircuitError::Open("ai".into());
        assert!(e.is_open());
        assert_eq!(e.to_string(), "circuit breaker 'ai' is open");
    }
}
