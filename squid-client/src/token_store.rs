//! Persistent access token storage
//!
//! Tokens are kept cookie-style: a string value under a key, with an
//! expiration after which reads no longer return it. The session writes the
//! same token under a customer scoped key and a global key, see
//! [`token_key`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use squid_model::CustomerId;

use crate::errors::StorageError;

/// Global token key, also the prefix of customer scoped keys.
pub const TOKEN_KEY: &str = "sq-token";
pub(crate) const TOKEN_FILE: &str = "tokens.json";

/// `sq-token_<customerId>`, or `sq-token` without a customer.
pub fn token_key(customer_id: Option<&CustomerId>) -> String {
    match customer_id {
        Some(customer_id) => format!("{TOKEN_KEY}_{customer_id}"),
        None => TOKEN_KEY.to_string(),
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait TokenStore: Send + Sync {
    /// Stores `value` under `key` until `expires_in` from now.
    fn write(&self, key: &str, value: &str, expires_in: Duration) -> Result<(), StorageError>;

    /// Unexpired value under `key`.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl StoredToken {
    fn new(value: &str, expires_in: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Utc::now() + expires_in,
        }
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// In-process store; tokens do not outlive the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, StoredToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn write(&self, key: &str, value: &str, expires_in: Duration) -> Result<(), StorageError> {
        self.entries
            .lock()
            .insert(key.to_string(), StoredToken::new(value, expires_in));
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut entries = self.entries.lock();
        let now = Utc::now();
        match entries.get(key) {
            Some(token) if token.is_live(now) => Ok(Some(token.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// JSON file store in the platform data directory.
///
/// The whole file is rewritten on every change. Expired entries are dropped
/// whenever the file is written.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTokenStore {
    /// Store under the user's data directory for this client.
    pub fn new() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("com", "squidsolutions", "squid-client").ok_or_else(|| {
            StorageError::InitFailed("Unable to determine data directory".to_string())
        })?;
        Ok(Self::at(dirs.data_dir().join(TOKEN_FILE)))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, StoredToken>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(StorageError::CorruptedData),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(StorageError::ReadFailed(e)),
        }
    }

    fn save(&self, entries: &HashMap<String, StoredToken>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::WriteFailed)?;
        }
        let json = serde_json::to_string_pretty(entries).map_err(StorageError::CorruptedData)?;
        std::fs::write(&self.path, json).map_err(StorageError::WriteFailed)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms).map_err(StorageError::WriteFailed)?;
        }
        Ok(())
    }

    fn modify<F>(&self, change: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut HashMap<String, StoredToken>),
    {
        let _guard = self.lock.lock();
        let mut entries = self.load()?;
        change(&mut entries);
        let now = Utc::now();
        entries.retain(|_, token| token.is_live(now));
        self.save(&entries)
    }
}

impl TokenStore for FileTokenStore {
    fn write(&self, key: &str, value: &str, expires_in: Duration) -> Result<(), StorageError> {
        log::debug!("[TokenStore] Persisting token under '{}'", key);
        self.modify(|entries| {
            entries.insert(key.to_string(), StoredToken::new(value, expires_in));
        })
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock();
        let now = Utc::now();
        Ok(self
            .load()?
            .remove(key)
            .filter(|token| token.is_live(now))
            .map(|token| token.value))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if !self.path.exists() {
            return Ok(());
        }
        self.modify(|entries| {
            entries.remove(key);
        })
    }
}
