//! XDG Base Directory Specification compliant path resolution.
//!
//! Every directory is resolved through a three-level fallback:
//! 1. secops-specific env var (SECOPS_CONFIG_DIR, etc.)
//! 2. XDG env var (XDG_CONFIG_HOME, etc.) via `etcetera`
//! 3. Platform default (~/.config, etc.)
//!
//! All paths are absolute. Relative paths from env vars are ignored per XDG spec.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Resolved directory paths for the security core.
///
/// Created once at startup, threaded through Config.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Config directory: config.toml lives here
    pub config_dir: PathBuf,

    /// Data directory: key store, compliance reports, exports
    pub data_dir: PathBuf,

    /// State directory: audit log
    pub state_dir: PathBuf,
}

impl Paths {
    /// Resolve all paths using real environment variables.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with_env(|key| std::env::var(key))
    }

    /// Resolve paths with a custom env var lookup (for testing).
    pub fn resolve_with_env<F>(env_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        use etcetera::BaseStrategy;

        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| anyhow::anyhow!("Failed to determine base directories: {}", e))?;

        let config_dir = env_or(&env_fn, "SECOPS_CONFIG_DIR", || {
            strategy.config_dir().join("secops")
        });

        let data_dir = env_or(&env_fn, "SECOPS_DATA_DIR", || {
            strategy.data_dir().join("secops")
        });

        let state_dir = env_or(&env_fn, "SECOPS_STATE_DIR", || {
            // state_dir() is None on platforms without XDG_STATE_HOME
            let base_state = strategy.state_dir().unwrap_or_else(|| strategy.data_dir());
            base_state.join("secops")
        });

        Ok(Self {
            config_dir,
            data_dir,
            state_dir,
        })
    }

    /// All three roots under one directory. Used by tests and `--root`.
    pub fn rooted(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            state_dir: root.join("state"),
        }
    }

    // ── Convenience accessors for specific files ──

    /// Config file: config_dir/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Key store: data_dir/keys/key_store.json
    pub fn key_store(&self) -> PathBuf {
        self.data_dir.join("keys").join("key_store.json")
    }

    /// Audit log: state_dir/audit/audit.jsonl
    pub fn audit_log(&self) -> PathBuf {
        self.state_dir.join("audit").join("audit.jsonl")
    }

    /// Compliance reports directory: data_dir/compliance
    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("compliance")
    }

    /// CSV export directory: data_dir/exports
    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    /// Create all directories with appropriate permissions.
    pub fn ensure_dirs(&self) -> Result<()> {
        let dirs = [
            self.config_dir.clone(),
            self.data_dir.clone(),
            self.state_dir.clone(),
            self.data_dir.join("keys"),
            self.state_dir.join("audit"),
            self.reports_dir(),
            self.exports_dir(),
        ];

        for dir in &dirs {
            create_dir_with_mode(dir)?;
        }

        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::resolve().unwrap_or_else(|_| {
            // Emergency fallback, should never happen in practice
            let home = etcetera::home_dir().unwrap_or_else(|_| PathBuf::from("."));
            Self {
                config_dir: home.join(".config").join("secops"),
                data_dir: home.join(".local").join("share").join("secops"),
                state_dir: home.join(".local").join("state").join("secops"),
            }
        })
    }
}

/// Resolve an env var with fallback. Ignores empty and relative paths per XDG spec.
fn env_or<F>(env_fn: &F, var: &str, default: impl FnOnce() -> PathBuf) -> PathBuf
where
    F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
{
    env_fn(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .filter(|p| p.is_absolute()) // XDG spec: ignore relative paths
        .unwrap_or_else(default)
}

/// Create a directory with mode 0700 per XDG spec.
pub(crate) fn create_dir_with_mode(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Helper: build an env_fn from a HashMap
    fn make_env(
        map: HashMap<&str, &str>,
    ) -> impl Fn(&str) -> std::result::Result<String, std::env::VarError> {
        move |key: &str| {
            map.get(key)
                .map(|v| v.to_string())
                .ok_or(std::env::VarError::NotPresent)
        }
    }

    #[test]
    fn default_paths_are_xdg_compliant() {
        let env: HashMap<&str, &str> = HashMap::new();
        let paths = Paths::resolve_with_env(make_env(env)).unwrap();

        assert!(paths.config_dir.ends_with("secops"), "{:?}", paths.config_dir);
        assert!(paths.data_dir.ends_with("secops"), "{:?}", paths.data_dir);
        assert!(paths.state_dir.ends_with("secops"), "{:?}", paths.state_dir);
    }

    #[test]
    fn secops_env_vars_override_xdg() {
        let mut env: HashMap<&str, &str> = HashMap::new();
        env.insert("SECOPS_CONFIG_DIR", "/custom/config");
        env.insert("SECOPS_DATA_DIR", "/custom/data");
        env.insert("SECOPS_STATE_DIR", "/custom/state");

        let paths = Paths::resolve_with_env(make_env(env)).unwrap();
        assert_eq!(paths.config_dir, PathBuf::from("/custom/config"));
        assert_eq!(paths.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(paths.state_dir, PathBuf::from("/custom/state"));
    }

    #[test]
    fn relative_paths_are_ignored() {
        let mut env: HashMap<&str, &str> = HashMap::new();
        env.insert("SECOPS_STATE_DIR", "relative/path");

        let paths = Paths::resolve_with_env(make_env(env)).unwrap();
        assert!(paths.state_dir.is_absolute());
        assert_ne!(paths.state_dir, PathBuf::from("relative/path"));
    }

    #[test]
    fn convenience_accessors() {
        let paths = Paths::rooted(Path::new("/srv/secops"));

        assert!(paths.config_file().ends_with("config/config.toml"));
        assert!(paths.key_store().ends_with("keys/key_store.json"));
        assert!(paths.audit_log().ends_with("audit/audit.jsonl"));
        assert!(paths.reports_dir().ends_with("data/compliance"));
        assert!(paths.exports_dir().ends_with("data/exports"));
    }

    #[cfg(unix)]
    #[test]
    fn ensure_dirs_creates_private_directories() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths::rooted(tmp.path());
        paths.ensure_dirs().unwrap();

        for dir in [&paths.config_dir, &paths.data_dir, &paths.state_dir] {
            let mode = std::fs::metadata(dir).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700, "{}", dir.display());
        }
        assert!(paths.reports_dir().is_dir());
        assert!(paths.audit_log().parent().unwrap().is_dir());
    }
}
