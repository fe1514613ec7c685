//! On-disk key store.
//!
//! A single JSON document holding every key (active and retired), the
//! current key id, and the time of the last write. The file is written
//! to a temp sibling with 0600 permissions and renamed into place.
//!
//! If the primary location cannot be written, the snapshot goes to a
//! fallback location instead: first `<stem>.fallback.json` next to the
//! primary, then a per-store file in the system temp dir. Loading picks
//! the newest readable candidate, so keys written to a fallback are
//! found again on the next start.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zeroize::Zeroize;

use super::{Algorithm, CryptoError, EncryptionKey};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoreFile {
    pub keys: Vec<KeyRecord>,
    pub current_key_id: Option<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct KeyRecord {
    key_id: String,
    /// Base64 key material
    key_data: String,
    algorithm: Algorithm,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
    rotation_count: u32,
}

impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl Drop for KeyRecord {
    fn drop(&mut self) {
        self.key_data.zeroize();
    }
}

impl From<&EncryptionKey> for KeyRecord {
    fn from(key: &EncryptionKey) -> Self {
        Self {
            key_id: key.key_id.clone(),
            key_data: BASE64.encode(key.key_bytes()),
            algorithm: key.algorithm,
            created_at: key.created_at,
            expires_at: key.expires_at,
            is_active: key.is_active,
            rotation_count: key.rotation_count,
        }
    }
}

impl KeyRecord {
    fn to_key(&self) -> Result<EncryptionKey, CryptoError> {
        let bytes = BASE64.decode(&self.key_data).map_err(|e| {
            CryptoError::Persistence(format!("key {} has invalid key_data: {}", self.key_id, e))
        })?;
        if bytes.len() != self.algorithm.key_len() {
            return Err(CryptoError::Persistence(format!(
                "key {} has {} bytes, expected {}",
                self.key_id,
                bytes.len(),
                self.algorithm.key_len()
            )));
        }
        Ok(EncryptionKey::from_parts(
            self.key_id.clone(),
            bytes,
            self.algorithm,
            self.created_at,
            self.expires_at,
            self.is_active,
            self.rotation_count,
        ))
    }
}

impl StoreFile {
    pub fn from_keys<'a>(
        keys: impl IntoIterator<Item = &'a EncryptionKey>,
        current_key_id: Option<String>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            keys: keys.into_iter().map(KeyRecord::from).collect(),
            current_key_id,
            last_updated,
        }
    }

    #[cfg(test)]
    pub fn to_keys(&self) -> Result<Vec<EncryptionKey>, CryptoError> {
        self.keys.iter().map(KeyRecord::to_key).collect()
    }

    /// Decode every record that can be decoded; the rest come back as errors.
    pub fn decode_keys(&self) -> (Vec<EncryptionKey>, Vec<CryptoError>) {
        let mut keys = Vec::with_capacity(self.keys.len());
        let mut bad = Vec::new();
        for record in &self.keys {
            match record.to_key() {
                Ok(key) => keys.push(key),
                Err(e) => bad.push(e),
            }
        }
        (keys, bad)
    }
}

/// Where a snapshot ended up.
#[derive(Debug)]
pub(crate) enum SaveOutcome {
    Primary,
    Fallback { path: PathBuf, error: String },
}

/// JSON key store at a fixed path.
#[derive(Debug, Clone)]
pub struct KeyStore {
    path: PathBuf,
    fallbacks: Vec<PathBuf>,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let fallbacks = vec![sibling_fallback(&path), temp_fallback(&path)];
        Self { path, fallbacks }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fallback_paths(&self) -> &[PathBuf] {
        &self.fallbacks
    }

    /// Load the newest readable snapshot.
    ///
    /// Returns `Ok(None)` when nothing usable exists. A candidate that
    /// exists but cannot be read or parsed is renamed to `<file>.corrupt`
    /// before a fresh store can take its place; if it cannot be moved the
    /// load fails rather than letting a later save overwrite it.
    pub(crate) fn load(&self) -> Result<Option<(StoreFile, PathBuf)>, CryptoError> {
        let mut best: Option<(StoreFile, PathBuf)> = None;

        for candidate in std::iter::once(&self.path).chain(self.fallbacks.iter()) {
            let content = match fs::read_to_string(candidate) {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(
                        target: "security_event",
                        path = %candidate.display(),
                        "Cannot read key store: {}",
                        e
                    );
                    quarantine(candidate)?;
                    continue;
                }
            };

            let parsed: StoreFile = match serde_json::from_str(&content) {
                Ok(f) => f,
                Err(e) => {
                    warn!(
                        target: "security_event",
                        path = %candidate.display(),
                        "Key store is corrupt: {}",
                        e
                    );
                    quarantine(candidate)?;
                    continue;
                }
            };

            let newer = best
                .as_ref()
                .is_none_or(|(f, _)| parsed.last_updated > f.last_updated);
            if newer {
                best = Some((parsed, candidate.clone()));
            }
        }

        if let Some((_, path)) = &best {
            debug!("Loaded key store from {}", path.display());
        }
        Ok(best)
    }

    /// Write a snapshot, falling back to the alternate locations on failure.
    pub(crate) fn save(&self, file: &StoreFile) -> Result<SaveOutcome, CryptoError> {
        let json = serde_json::to_string_pretty(file)
            .map_err(|e| CryptoError::Persistence(format!("serialize key store: {}", e)))?;

        let primary_err = match write_private(&self.path, &json) {
            Ok(()) => {
                // A stale fallback would shadow nothing (older timestamp), but
                // leaving key material around is pointless
                for fallback in &self.fallbacks {
                    let _ = fs::remove_file(fallback);
                }
                return Ok(SaveOutcome::Primary);
            }
            Err(e) => e,
        };

        let mut errors = vec![format!("{}: {}", self.path.display(), primary_err)];
        for fallback in &self.fallbacks {
            match write_private(fallback, &json) {
                Ok(()) => {
                    return Ok(SaveOutcome::Fallback {
                        path: fallback.clone(),
                        error: primary_err.to_string(),
                    });
                }
                Err(e) => errors.push(format!("{}: {}", fallback.display(), e)),
            }
        }

        Err(CryptoError::Persistence(errors.join("; ")))
    }

    /// Copy `source` (a snapshot some records of which were unusable) to a
    /// `.corrupt` sibling, leaving the original in place.
    pub(crate) fn preserve_copy(&self, source: &Path) -> Result<PathBuf, CryptoError> {
        let target = corrupt_target(source);
        fs::copy(source, &target).map_err(|e| {
            CryptoError::Persistence(format!(
                "cannot copy key store {} aside: {}",
                source.display(),
                e
            ))
        })?;
        warn!(
            target: "security_event",
            "Key store with unusable records copied to {}",
            target.display()
        );
        Ok(target)
    }
}

/// First free `<path>.corrupt`, `<path>.corrupt.1`, ...
fn corrupt_target(path: &Path) -> PathBuf {
    let mut base = path.as_os_str().to_owned();
    base.push(".corrupt");
    let first = PathBuf::from(&base);
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| {
            let mut name = base.clone();
            name.push(format!(".{}", n));
            PathBuf::from(name)
        })
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Move an unusable key store file out of the way.
fn quarantine(path: &Path) -> Result<PathBuf, CryptoError> {
    let target = corrupt_target(path);
    fs::rename(path, &target).map_err(|e| {
        CryptoError::Persistence(format!(
            "cannot move unusable key store {} aside: {}",
            path.display(),
            e
        ))
    })?;
    warn!(
        target: "security_event",
        "Unusable key store moved to {}",
        target.display()
    );
    Ok(target)
}

fn sibling_fallback(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "key_store".to_string());
    path.with_file_name(format!("{}.fallback.json", stem))
}

/// Temp-dir fallback, unique per primary path.
fn temp_fallback(path: &Path) -> PathBuf {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let tag: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
    std::env::temp_dir().join(format!("secops-{}.key_store.json", tag))
}

/// Write via temp file + rename with owner-only permissions.
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    fs::write(&tmp, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_file(now: DateTime<Utc>) -> (StoreFile, String) {
        let key = EncryptionKey::generate(Algorithm::Aes256Gcm, Duration::days(30), now);
        let id = key.key_id.clone();
        (StoreFile::from_keys([&key], Some(id.clone()), now), id)
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = KeyStore::new(tmp.path().join("keys").join("key_store.json"));
        let (file, id) = sample_file(Utc::now());

        assert!(matches!(store.save(&file).unwrap(), SaveOutcome::Primary));
        let (loaded, from) = store.load().unwrap().unwrap();
        assert_eq!(from, store.path());
        assert_eq!(loaded.current_key_id.as_deref(), Some(id.as_str()));

        let keys = loaded.to_keys().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].key_bytes(), file.to_keys().unwrap()[0].key_bytes());
    }

    #[test]
    fn missing_store_loads_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = KeyStore::new(tmp.path().join("key_store.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn store_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let store = KeyStore::new(tmp.path().join("key_store.json"));
        store.save(&sample_file(Utc::now()).0).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_primary_is_quarantined() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("key_store.json");
        fs::write(&path, "{ not json").unwrap();

        let store = KeyStore::new(&path);
        assert!(store.load().unwrap().is_none());
        assert!(!path.exists());
        assert!(tmp.path().join("key_store.json.corrupt").exists());
    }

    #[test]
    fn unwritable_primary_goes_to_sibling_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("key_store.json");
        // A directory in the way makes the final rename fail
        fs::create_dir_all(path.join("blocker")).unwrap();

        let store = KeyStore::new(&path);
        let (file, id) = sample_file(Utc::now());
        match store.save(&file).unwrap() {
            SaveOutcome::Fallback { path: used, .. } => {
                assert_eq!(used, tmp.path().join("key_store.fallback.json"));
            }
            other => panic!("expected fallback, got {:?}", other),
        }

        let (loaded, from) = store.load().unwrap().unwrap();
        assert_eq!(from, tmp.path().join("key_store.fallback.json"));
        assert_eq!(loaded.current_key_id.as_deref(), Some(id.as_str()));
    }

    #[test]
    fn newest_candidate_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let store = KeyStore::new(tmp.path().join("key_store.json"));
        let now = Utc::now();

        let (old, _) = sample_file(now - Duration::hours(1));
        let (new, new_id) = sample_file(now);
        store.save(&old).unwrap();
        fs::write(
            &store.fallback_paths()[0],
            serde_json::to_string(&new).unwrap(),
        )
        .unwrap();

        let (loaded, _) = store.load().unwrap().unwrap();
        assert_eq!(loaded.current_key_id, Some(new_id));
    }

    #[test]
    fn unreadable_primary_is_moved_aside_not_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("key_store.json");
        // Reading a directory fails with something other than NotFound
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("old-keys"), "keep me").unwrap();

        let store = KeyStore::new(&path);
        assert!(store.load().unwrap().is_none());
        let moved = tmp.path().join("key_store.json.corrupt");
        assert_eq!(fs::read_to_string(moved.join("old-keys")).unwrap(), "keep me");

        store.save(&sample_file(Utc::now()).0).unwrap();
        assert!(path.is_file());
        assert!(moved.join("old-keys").exists());
    }

    #[test]
    fn repeated_quarantine_keeps_earlier_copies() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("key_store.json");
        let store = KeyStore::new(&path);

        fs::write(&path, "first").unwrap();
        store.load().unwrap();
        fs::write(&path, "second").unwrap();
        store.load().unwrap();

        let corrupt = tmp.path().join("key_store.json.corrupt");
        assert_eq!(fs::read_to_string(&corrupt).unwrap(), "first");
        assert_eq!(
            fs::read_to_string(tmp.path().join("key_store.json.corrupt.1")).unwrap(),
            "second"
        );
    }

    #[test]
    fn bad_key_data_is_persistence_error() {
        let json = r#"{
            "keys": [{
                "key_id": "key_0000000000000000",
                "key_data": "***",
                "algorithm": "AES-256-GCM",
                "created_at": "2026-01-01T00:00:00Z",
                "expires_at": null,
                "is_active": true,
                "rotation_count": 0
            }],
            "current_key_id": "key_0000000000000000",
            "last_updated": "2026-01-01T00:00:00Z"
        }"#;
        let file: StoreFile = serde_json::from_str(json).unwrap();
        assert!(matches!(file.to_keys(), Err(CryptoError::Persistence(_))));
        let (keys, bad) = file.decode_keys();
        assert!(keys.is_empty());
        assert_eq!(bad.len(), 1);
    }
}
