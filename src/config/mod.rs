mod duration;

pub use duration::{format_duration, parse_duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::breaker::BreakerSettings;
use crate::paths::Paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Resolved XDG-compliant paths (not serialized)
    #[serde(skip)]
    pub paths: Paths,

    #[serde(default)]
    pub keys: KeysConfig,

    /// Named circuit breakers. Missing presets (`ai`, `tts`, `network`) are
    /// filled in by [`Config::breaker_settings`].
    #[serde(default)]
    pub breakers: BTreeMap<String, BreakerConfig>,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub compliance: ComplianceConfig,

    #[serde(default)]
    pub alerting: AlertingConfig,

    #[serde(default)]
    pub monitors: MonitorsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Days until a freshly generated key expires and is rotated
    #[serde(default = "default_rotation_days")]
    pub rotation_days: u32,

    /// Algorithm for new keys: "AES-256-GCM" | "AES-256-CBC" | "ChaCha20-Poly1305"
    #[serde(default = "default_algorithm")]
    pub default_algorithm: String,

    /// Retired keys older than this many days are purged
    #[serde(default = "default_purge_after_days")]
    pub purge_after_days: u32,

    /// Also accept AES-256-CBC payloads without an HMAC tag (`iv|ciphertext`)
    #[serde(default)]
    pub accept_legacy_cbc: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,

    /// Time in Open before a trial call is allowed, e.g. "30s"
    pub recovery_timeout: String,

    pub success_threshold: u32,

    /// Per-call timeout, e.g. "15s"
    pub timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Ring buffer capacity (oldest events dropped first)
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Maximum distinct sources tracked by the activity monitor
    #[serde(default = "default_max_tracked_sources")]
    pub max_tracked_sources: usize,

    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,

    #[serde(default = "default_max_suspicious_activities")]
    pub max_suspicious_activities: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceConfig {
    /// Rotate the audit log once it grows past this many bytes (0 = never)
    #[serde(default = "default_max_log_bytes")]
    pub max_log_bytes: u64,

    /// Default report window in days
    #[serde(default = "default_report_days")]
    pub report_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    /// Suppress repeats of the same (type, source_ip) within this window
    #[serde(default = "default_cooldown")]
    pub cooldown: String,

    #[serde(default = "default_max_active_alerts")]
    pub max_active_alerts: usize,

    /// Unacknowledged alerts are resolved after this long
    #[serde(default = "default_auto_resolve")]
    pub auto_resolve: String,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_correlation_interval")]
    pub correlation_interval: String,

    #[serde(default = "default_alert_cleanup_interval")]
    pub alert_cleanup_interval: String,

    #[serde(default = "default_key_check_interval")]
    pub key_check_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "text" (default) or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_rotation_days() -> u32 {
    30
}
fn default_algorithm() -> String {
    "AES-256-GCM".to_string()
}
fn default_purge_after_days() -> u32 {
    365
}
fn default_buffer_capacity() -> usize {
    10_000
}
fn default_max_tracked_sources() -> usize {
    4096
}
fn default_max_failed_attempts() -> u32 {
    5
}
fn default_max_suspicious_activities() -> u32 {
    10
}
fn default_max_log_bytes() -> u64 {
    10 * 1024 * 1024 // 10MB
}
fn default_report_days() -> u32 {
    30
}
fn default_cooldown() -> String {
    "5m".to_string()
}
fn default_max_active_alerts() -> usize {
    50
}
fn default_auto_resolve() -> String {
    "24h".to_string()
}
fn default_history_limit() -> usize {
    1000
}
fn default_true() -> bool {
    true
}
fn default_correlation_interval() -> String {
    "60s".to_string()
}
fn default_alert_cleanup_interval() -> String {
    "30s".to_string()
}
fn default_key_check_interval() -> String {
    "1h".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            rotation_days: default_rotation_days(),
            default_algorithm: default_algorithm(),
            purge_after_days: default_purge_after_days(),
            accept_legacy_cbc: false,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            max_tracked_sources: default_max_tracked_sources(),
            max_failed_attempts: default_max_failed_attempts(),
            max_suspicious_activities: default_max_suspicious_activities(),
        }
    }
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            max_log_bytes: default_max_log_bytes(),
            report_days: default_report_days(),
        }
    }
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            cooldown: default_cooldown(),
            max_active_alerts: default_max_active_alerts(),
            auto_resolve: default_auto_resolve(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for MonitorsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            correlation_interval: default_correlation_interval(),
            alert_cleanup_interval: default_alert_cleanup_interval(),
            key_check_interval: default_key_check_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl BreakerConfig {
    fn from_settings(settings: &BreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            recovery_timeout: format_duration(settings.recovery_timeout),
            success_threshold: settings.success_threshold,
            timeout: format_duration(settings.timeout),
        }
    }

    pub fn to_settings(&self) -> Result<BreakerSettings> {
        let settings = BreakerSettings {
            failure_threshold: self.failure_threshold,
            recovery_timeout: parse_duration(&self.recovery_timeout)
                .map_err(|e| anyhow::anyhow!("Invalid recovery_timeout: {}", e))?,
            success_threshold: self.success_threshold,
            timeout: parse_duration(&self.timeout)
                .map_err(|e| anyhow::anyhow!("Invalid timeout: {}", e))?,
        };
        settings.validate()?;
        Ok(settings)
    }
}

impl AlertingConfig {
    pub fn cooldown(&self) -> Result<Duration> {
        parse_duration(&self.cooldown).map_err(|e| anyhow::anyhow!("Invalid cooldown: {}", e))
    }

    pub fn auto_resolve(&self) -> Result<Duration> {
        parse_duration(&self.auto_resolve)
            .map_err(|e| anyhow::anyhow!("Invalid auto_resolve: {}", e))
    }
}

impl MonitorsConfig {
    pub fn correlation_interval(&self) -> Result<Duration> {
        parse_duration(&self.correlation_interval)
            .map_err(|e| anyhow::anyhow!("Invalid correlation_interval: {}", e))
    }

    pub fn alert_cleanup_interval(&self) -> Result<Duration> {
        parse_duration(&self.alert_cleanup_interval)
            .map_err(|e| anyhow::anyhow!("Invalid alert_cleanup_interval: {}", e))
    }

    pub fn key_check_interval(&self) -> Result<Duration> {
        parse_duration(&self.key_check_interval)
            .map_err(|e| anyhow::anyhow!("Invalid key_check_interval: {}", e))
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Paths::resolve()?;
        Self::load_from(paths)
    }

    /// Load (or create on first run) the config file under the given paths.
    pub fn load_from(paths: Paths) -> Result<Self> {
        paths.ensure_dirs()?;
        let path = paths.config_file();

        if !path.exists() {
            // Create default config file on first run
            let config = Config {
                paths,
                ..Config::default()
            };
            config.save_with_template()?;
            return Ok(config);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.paths = paths;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = self.paths.config_file();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;

        Ok(())
    }

    /// Save config with a helpful template (for first-time setup)
    pub fn save_with_template(&self) -> Result<()> {
        let path = self.paths.config_file();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        tracing::info!("Created default config at {}", path.display());

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let paths = Paths::resolve()?;
        Ok(paths.config_file())
    }

    /// Effective breaker settings: built-in presets overlaid with `[breakers.*]`.
    pub fn breaker_settings(&self) -> Result<BTreeMap<String, BreakerSettings>> {
        let mut out: BTreeMap<String, BreakerSettings> = BreakerSettings::presets()
            .into_iter()
            .map(|(name, s)| (name.to_string(), s))
            .collect();

        for (name, cfg) in &self.breakers {
            let settings = cfg
                .to_settings()
                .with_context(|| format!("Invalid [breakers.{}]", name))?;
            out.insert(name.clone(), settings);
        }

        Ok(out)
    }

    /// Config with every breaker preset written out explicitly (for `config show`).
    pub fn with_explicit_breakers(&self) -> Self {
        let mut config = self.clone();
        for (name, settings) in BreakerSettings::presets() {
            config
                .breakers
                .entry(name.to_string())
                .or_insert_with(|| BreakerConfig::from_settings(&settings));
        }
        config
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["keys", "rotation_days"] => Ok(self.keys.rotation_days.to_string()),
            ["keys", "default_algorithm"] => Ok(self.keys.default_algorithm.clone()),
            ["keys", "purge_after_days"] => Ok(self.keys.purge_after_days.to_string()),
            ["keys", "accept_legacy_cbc"] => Ok(self.keys.accept_legacy_cbc.to_string()),
            ["detection", "buffer_capacity"] => Ok(self.detection.buffer_capacity.to_string()),
            ["compliance", "max_log_bytes"] => Ok(self.compliance.max_log_bytes.to_string()),
            ["compliance", "report_days"] => Ok(self.compliance.report_days.to_string()),
            ["alerting", "cooldown"] => Ok(self.alerting.cooldown.clone()),
            ["alerting", "max_active_alerts"] => Ok(self.alerting.max_active_alerts.to_string()),
            ["alerting", "auto_resolve"] => Ok(self.alerting.auto_resolve.clone()),
            ["monitors", "enabled"] => Ok(self.monitors.enabled.to_string()),
            ["logging", "level"] => Ok(self.logging.level.clone()),
            ["logging", "format"] => Ok(self.logging.format.clone()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["keys", "rotation_days"] => self.keys.rotation_days = value.parse()?,
            ["keys", "default_algorithm"] => self.keys.default_algorithm = value.to_string(),
            ["keys", "purge_after_days"] => self.keys.purge_after_days = value.parse()?,
            ["keys", "accept_legacy_cbc"] => self.keys.accept_legacy_cbc = value.parse()?,
            ["detection", "buffer_capacity"] => self.detection.buffer_capacity = value.parse()?,
            ["compliance", "max_log_bytes"] => self.compliance.max_log_bytes = value.parse()?,
            ["compliance", "report_days"] => self.compliance.report_days = value.parse()?,
            ["alerting", "cooldown"] => self.alerting.cooldown = value.to_string(),
            ["alerting", "max_active_alerts"] => {
                self.alerting.max_active_alerts = value.parse()?
            }
            ["alerting", "auto_resolve"] => self.alerting.auto_resolve = value.to_string(),
            ["monitors", "enabled"] => self.monitors.enabled = value.parse()?,
            ["logging", "level"] => self.logging.level = value.to_string(),
            ["logging", "format"] => self.logging.format = value.to_string(),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        Ok(())
    }
}

/// Default config template with helpful comments (used for first-time setup)
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# secops configuration
# Auto-created on first run. Edit as needed.

[keys]
rotation_days = 30
# AES-256-GCM | AES-256-CBC | ChaCha20-Poly1305
default_algorithm = "AES-256-GCM"
purge_after_days = 365
# Decrypt untagged AES-256-CBC ciphertext from older deployments (unauthenticated)
accept_legacy_cbc = false

# Circuit breakers. Presets `ai`, `tts` and `network` exist even when not listed.
# [breakers.ai]
# failure_threshold = 3
# recovery_timeout = "30s"
# success_threshold = 2
# timeout = "15s"

[detection]
buffer_capacity = 10000
max_tracked_sources = 4096
max_failed_attempts = 5
max_suspicious_activities = 10

[compliance]
max_log_bytes = 10485760
report_days = 30

[alerting]
cooldown = "5m"
max_active_alerts = 50
auto_resolve = "24h"
history_limit = 1000

[monitors]
enabled = true
correlation_interval = "60s"
alert_cleanup_interval = "30s"
key_check_interval = "1h"

[logging]
level = "info"
# text | json
format = "text"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_to_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.keys.rotation_days, 30);
        assert_eq!(config.keys.default_algorithm, "AES-256-GCM");
        assert_eq!(config.detection.buffer_capacity, 10_000);
        assert_eq!(config.alerting.max_active_alerts, 50);
        assert_eq!(config.alerting.cooldown().unwrap(), Duration::from_secs(300));
        assert!(config.breakers.is_empty());
    }

    #[test]
    fn load_creates_template_on_first_run() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths::rooted(tmp.path());

        let config = Config::load_from(paths.clone()).unwrap();
        assert!(paths.config_file().exists());
        assert_eq!(config.compliance.report_days, 30);

        // Second load reads the file back
        let again = Config::load_from(paths).unwrap();
        assert_eq!(again.logging.level, "info");
    }

    #[test]
    fn breaker_overrides_merge_with_presets() {
        let config: Config = toml::from_str(
            r#"
            [breakers.ai]
            failure_threshold = 2
            recovery_timeout = "1s"
            success_threshold = 2
            timeout = "500ms"

            [breakers.storage]
            failure_threshold = 4
            recovery_timeout = "10s"
            success_threshold = 1
            timeout = "2s"
            "#,
        )
        .unwrap();

        let settings = config.breaker_settings().unwrap();
        assert_eq!(settings["ai"].failure_threshold, 2);
        assert_eq!(settings["ai"].timeout, Duration::from_millis(500));
        assert_eq!(settings["tts"].failure_threshold, 5);
        assert_eq!(settings["network"].failure_threshold, 10);
        assert_eq!(settings["storage"].recovery_timeout, Duration::from_secs(10));
    }

    #[test]
    fn invalid_breaker_threshold_is_rejected() {
        let config: Config = toml::from_str(
            r#"
            [breakers.ai]
            failure_threshold = 0
            recovery_timeout = "1s"
            success_threshold = 1
            timeout = "1s"
            "#,
        )
        .unwrap();

        let err = config.breaker_settings().unwrap_err();
        assert!(format!("{:#}", err).contains("breakers.ai"));
    }

    #[test]
    fn get_and_set_values() {
        let mut config = Config::default();
        config.set_value("alerting.cooldown", "10m").unwrap();
        config.set_value("keys.rotation_days", "7").unwrap();

        assert_eq!(config.get_value("alerting.cooldown").unwrap(), "10m");
        assert_eq!(config.get_value("keys.rotation_days").unwrap(), "7");
        assert!(config.get_value("nope.nothing").is_err());
        assert!(config.set_value("keys.rotation_days", "soon").is_err());

        assert_eq!(config.get_value("keys.accept_legacy_cbc").unwrap(), "false");
        config.set_value("keys.accept_legacy_cbc", "true").unwrap();
        assert!(config.keys.accept_legacy_cbc);
    }
}
