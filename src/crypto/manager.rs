use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::algorithm::open_legacy_cbc;
use super::store::{SaveOutcome, StoreFile};
use super::{Algorithm, Cipher, CryptoError, EncryptionKey, KeyStore};
use crate::config::KeysConfig;

/// Lifecycle policy for generated keys.
#[derive(Debug, Clone)]
pub struct KeySettings {
    pub rotation: Duration,
    pub default_algorithm: Algorithm,
    pub purge_after: Duration,
    /// Fall back to MAC-less `iv|ciphertext` decoding for AES-256-CBC
    /// payloads that fail authentication.
    pub accept_legacy_cbc: bool,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            rotation: Duration::days(30),
            default_algorithm: Algorithm::Aes256Gcm,
            purge_after: Duration::days(365),
            accept_legacy_cbc: false,
        }
    }
}

impl KeySettings {
    pub fn from_config(config: &KeysConfig) -> Result<Self, CryptoError> {
        if config.rotation_days == 0 {
            return Err(CryptoError::Configuration(
                "keys.rotation_days must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            rotation: Duration::days(i64::from(config.rotation_days)),
            default_algorithm: config.default_algorithm.parse()?,
            purge_after: Duration::days(i64::from(config.purge_after_days)),
            accept_legacy_cbc: config.accept_legacy_cbc,
        })
    }
}

/// `ALGORITHM:key_id:base64(payload)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ciphertext(String);

impl Ciphertext {
    fn assemble(algorithm: Algorithm, key_id: &str, payload: &[u8]) -> Self {
        Self(format!("{}:{}:{}", algorithm.name(), key_id, BASE64.encode(payload)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Split the header. Every malformed input is a decryption failure.
    fn parts(&self) -> Result<(Algorithm, &str, Vec<u8>), CryptoError> {
        let mut split = self.0.splitn(3, ':');
        let (Some(alg), Some(key_id), Some(body)) = (split.next(), split.next(), split.next())
        else {
            return Err(CryptoError::Decryption(
                "missing ALGORITHM:key_id header".to_string(),
            ));
        };

        let algorithm: Algorithm = alg
            .parse()
            .map_err(|_| CryptoError::Decryption(format!("unknown algorithm in header: {}", alg)))?;
        if key_id.is_empty() {
            return Err(CryptoError::Decryption("empty key id in header".to_string()));
        }
        let payload = BASE64
            .decode(body.trim())
            .map_err(|e| CryptoError::Decryption(format!("invalid base64 payload: {}", e)))?;

        Ok((algorithm, key_id, payload))
    }
}

impl fmt::Display for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Ciphertext {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Ciphertext {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Snapshot returned by [`KeyManager::status`].
#[derive(Debug, Clone, Serialize)]
pub struct EncryptionStatus {
    pub current_key_id: Option<String>,
    pub current_algorithm: Option<Algorithm>,
    pub total_keys: usize,
    pub active_keys: usize,
    pub rotation_days: i64,
    pub supported_algorithms: Vec<&'static str>,
    /// Ids of keys expiring within the next 7 days
    pub expiring_soon: Vec<String>,
    pub store_path: Option<PathBuf>,
    pub last_persistence_error: Option<String>,
}

#[derive(Default)]
struct KeyTable {
    keys: HashMap<String, EncryptionKey>,
    current_key_id: Option<String>,
}

impl KeyTable {
    fn current(&self) -> Option<&EncryptionKey> {
        self.current_key_id.as_ref().and_then(|id| self.keys.get(id))
    }

    fn snapshot(&self, now: DateTime<Utc>) -> StoreFile {
        let mut keys: Vec<&EncryptionKey> = self.keys.values().collect();
        keys.sort_by_key(|k| k.created_at);
        StoreFile::from_keys(keys, self.current_key_id.clone(), now)
    }

    /// Install a fresh key as current and retire the previous one.
    fn install(&mut self, settings: &KeySettings, now: DateTime<Utc>) -> String {
        let mut key = EncryptionKey::generate(settings.default_algorithm, settings.rotation, now);

        if let Some(previous) = self
            .current_key_id
            .take()
            .and_then(|id| self.keys.get_mut(&id))
        {
            previous.is_active = false;
            previous.rotation_count += 1;
            key.rotation_count = previous.rotation_count;
        }

        let id = key.key_id.clone();
        self.keys.insert(id.clone(), key);
        self.current_key_id = Some(id.clone());
        id
    }
}

/// Owns every key, the rotation policy, and encryption/decryption.
///
/// Crypto work happens outside the table lock on a copy of the key bytes.
/// Persistence serializes a snapshot under the lock and writes it after
/// release, behind a writer lock that is always taken first.
pub struct KeyManager {
    settings: KeySettings,
    store: Option<KeyStore>,
    state: Mutex<KeyTable>,
    writer: Mutex<()>,
    persistence_error: Mutex<Option<String>>,
}

impl KeyManager {
    /// Manager without persistence. Keys live only as long as the process.
    pub fn in_memory(settings: KeySettings) -> Self {
        let manager = Self {
            settings,
            store: None,
            state: Mutex::new(KeyTable::default()),
            writer: Mutex::new(()),
            persistence_error: Mutex::new(None),
        };
        manager.lock_state().install(&manager.settings, Utc::now());
        manager
    }

    /// Open (or create) the key store and make sure a current key exists.
    pub fn open(store: KeyStore, settings: KeySettings) -> Result<Self, CryptoError> {
        let mut table = KeyTable::default();

        if let Some((file, from)) = store.load()? {
            let (keys, bad) = file.decode_keys();
            if !bad.is_empty() {
                for e in &bad {
                    warn!(target: "security_event", "Skipping unusable key record: {}", e);
                }
                store.preserve_copy(&from)?;
            }
            for key in keys {
                table.keys.insert(key.key_id.clone(), key);
            }
            table.current_key_id = file
                .current_key_id
                .filter(|id| table.keys.contains_key(id));
            info!(
                "Loaded {} encryption key(s) from {}",
                table.keys.len(),
                from.display()
            );
        }

        let needs_key = table.current().is_none();
        if needs_key {
            let id = table.install(&settings, Utc::now());
            warn!(
                target: "security_event",
                key_id = %id,
                "No usable current key in store, generated a new one"
            );
        }

        let manager = Self {
            settings,
            store: Some(store),
            state: Mutex::new(table),
            writer: Mutex::new(()),
            persistence_error: Mutex::new(None),
        };
        if needs_key {
            manager.persist();
        }
        Ok(manager)
    }

    pub fn settings(&self) -> &KeySettings {
        &self.settings
    }

    fn lock_state(&self) -> MutexGuard<'_, KeyTable> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current key, rotating first if it has expired.
    pub fn current_key(&self) -> EncryptionKey {
        self.current_key_at(Utc::now())
    }

    pub fn current_key_at(&self, now: DateTime<Utc>) -> EncryptionKey {
        self.rotate_if_expired_at(now);
        let table = self.lock_state();
        match table.current() {
            Some(key) => key.clone(),
            None => {
                // Only reachable if the table was emptied by purge; recover
                drop(table);
                self.rotate_at(now);
                self.current_key_at(now)
            }
        }
    }

    pub fn encrypt(
        &self,
        plaintext: &[u8],
        algorithm: Option<Algorithm>,
    ) -> Result<Ciphertext, CryptoError> {
        let key = self.current_key();
        let algorithm = algorithm.unwrap_or(key.algorithm);
        let payload = algorithm.seal(key.key_bytes(), plaintext)?;
        Ok(Ciphertext::assemble(algorithm, &key.key_id, &payload))
    }

    pub fn encrypt_str(
        &self,
        plaintext: &str,
        algorithm: Option<Algorithm>,
    ) -> Result<Ciphertext, CryptoError> {
        self.encrypt(plaintext.as_bytes(), algorithm)
    }

    /// Decrypt with whichever key the header names, active or retired.
    pub fn decrypt(&self, ciphertext: &Ciphertext) -> Result<Vec<u8>, CryptoError> {
        let (algorithm, key_id, payload) = ciphertext.parts()?;

        let key_bytes = {
            let table = self.lock_state();
            let key = table
                .keys
                .get(key_id)
                .ok_or_else(|| CryptoError::Decryption(format!("unknown key id: {}", key_id)))?;
            Zeroizing::new(key.key_bytes().to_vec())
        };

        let opened = match algorithm.open(&key_bytes, &payload) {
            Err(CryptoError::Decryption(_))
                if algorithm == Algorithm::Aes256Cbc && self.settings.accept_legacy_cbc =>
            {
                let plaintext = open_legacy_cbc(&key_bytes, &payload)?;
                warn!(
                    target: "security_event",
                    key_id,
                    "Decrypted unauthenticated legacy AES-256-CBC payload"
                );
                Ok(plaintext)
            }
            other => other,
        };
        opened.map_err(|e| {
            debug!(key_id, algorithm = %algorithm, "Decryption rejected: {}", e);
            match e {
                CryptoError::Configuration(msg) => CryptoError::Decryption(msg),
                other => other,
            }
        })
    }

    pub fn decrypt_str(&self, ciphertext: &Ciphertext) -> Result<String, CryptoError> {
        let bytes = self.decrypt(ciphertext)?;
        String::from_utf8(bytes)
            .map_err(|_| CryptoError::Decryption("plaintext is not valid UTF-8".to_string()))
    }

    /// Generate a new current key. The previous one stays decryptable.
    pub fn rotate(&self) -> String {
        self.rotate_at(Utc::now())
    }

    pub fn rotate_at(&self, now: DateTime<Utc>) -> String {
        let id = {
            let mut table = self.lock_state();
            table.install(&self.settings, now)
        };
        info!(key_id = %id, "Rotated encryption key");
        self.persist();
        id
    }

    /// Rotate when the current key has expired. Returns the new key id.
    ///
    /// The expiry check and the install share one lock acquisition, so
    /// concurrent callers rotate at most once.
    pub fn rotate_if_expired_at(&self, now: DateTime<Utc>) -> Option<String> {
        let id = {
            let mut table = self.lock_state();
            let expired = table.current().is_none_or(|k| k.is_expired_at(now));
            expired.then(|| table.install(&self.settings, now))?
        };
        info!(key_id = %id, "Rotated expired encryption key");
        self.persist();
        Some(id)
    }

    /// Delete retired keys created more than `max_age` ago. The current key
    /// is never purged. Returns the number of keys removed.
    pub fn purge_retired(&self, max_age: Duration) -> usize {
        self.purge_retired_at(max_age, Utc::now())
    }

    pub fn purge_retired_at(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - max_age;
        let removed = {
            let mut table = self.lock_state();
            let current = table.current_key_id.clone();
            let before = table.keys.len();
            table.keys.retain(|id, key| {
                key.is_active || Some(id) == current.as_ref() || key.created_at >= cutoff
            });
            before - table.keys.len()
        };

        if removed > 0 {
            info!("Purged {} retired key(s)", removed);
            self.persist();
        }
        removed
    }

    pub fn status(&self) -> EncryptionStatus {
        let now = Utc::now();
        let soon = now + Duration::days(7);
        let table = self.lock_state();
        let current = table.current();

        let mut expiring_soon: Vec<String> = table
            .keys
            .values()
            .filter(|k| k.is_active && k.expires_at.is_some_and(|exp| exp <= soon))
            .map(|k| k.key_id.clone())
            .collect();
        expiring_soon.sort();

        EncryptionStatus {
            current_key_id: current.map(|k| k.key_id.clone()),
            current_algorithm: current.map(|k| k.algorithm),
            total_keys: table.keys.len(),
            active_keys: table.keys.values().filter(|k| k.is_active).count(),
            rotation_days: self.settings.rotation.num_days(),
            supported_algorithms: Algorithm::ALL.iter().map(|a| a.name()).collect(),
            expiring_soon,
            store_path: self.store.as_ref().map(|s| s.path().to_path_buf()),
            last_persistence_error: self
                .persistence_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };

        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.lock_state().snapshot(Utc::now());

        let error = match store.save(&snapshot) {
            Ok(SaveOutcome::Primary) => None,
            Ok(SaveOutcome::Fallback { path, error }) => {
                warn!(
                    target: "security_event",
                    fallback = %path.display(),
                    "Key store write failed, snapshot saved to fallback: {}",
                    error
                );
                Some(error)
            }
            Err(e) => {
                warn!(target: "security_event", "Key store write failed everywhere: {}", e);
                Some(e.to_string())
            }
        };

        *self
            .persistence_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = error;
    }
}
