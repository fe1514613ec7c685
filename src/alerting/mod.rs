//! Security alerts with per-source cooldown, plus a dashboard view.
//!
//! Detections, correlations and monitor signals become [`SecurityAlert`]s
//! through [`AlertingSystem::trigger`]. Repeats of the same alert type from
//! the same source inside the cooldown are dropped, the number of active
//! alerts is capped, and stale unacknowledged alerts resolve themselves on
//! the cleanup tick.

mod alert;
mod dashboard;
mod system;

pub use alert::{AlertType, NewAlert, SecurityAlert};
pub use dashboard::{AlertSummary, DashboardSnapshot, SecurityLevel, SecurityScore};
pub use system::{AlertSettings, AlertStatistics, AlertingSystem};

/// Resolution recorded when the active-alert cap pushes an alert out.
pub const RESOLVED_LIMIT: &str = "limit exceeded";

/// Resolution recorded by the cleanup tick.
pub const RESOLVED_TIMEOUT: &str = "auto-resolved after timeout";
