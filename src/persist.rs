//! Durable account storage.
//!
//! The session core never owns a database. Connected sessions are written
//! out through [`AccountStore::save_account`], and the reconnection
//! coordinator reads them back on startup with
//! [`AccountStore::load_persisted_accounts`].
//!
//! Two implementations ship with the crate: [`MemoryAccountStore`] for tests
//! and embedding, and [`JsonFileAccountStore`] which keeps every account in a
//! single `accounts.json` file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::{AccountIdentity, Credentials};
use crate::{SessionId, SessionState, StoreError};

/// Account data handed to the store when a session connects or disconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMetadata {
    /// The linked account.
    pub account: AccountIdentity,
    /// Saved-session data; `None` keeps whatever was stored before.
    pub credentials: Option<Credentials>,
    /// State the session was in when saved.
    pub state: SessionState,
    /// When the session last connected.
    pub connected_at: Option<DateTime<Utc>>,
}

/// An account as read back from durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAccount {
    /// The linked account.
    pub account: AccountIdentity,
    /// Saved-session data for re-binding.
    pub credentials: Option<Credentials>,
    /// State at the time of the last save.
    pub last_known_state: SessionState,
    /// Session that last saved this account.
    pub session_id: SessionId,
    /// When the session last connected.
    #[serde(default)]
    pub connected_at: Option<DateTime<Utc>>,
    /// When this entry was written.
    pub saved_at: DateTime<Utc>,
}

impl PersistedAccount {
    /// Returns `true` if the account should be re-bound on startup.
    pub fn was_connected(&self) -> bool {
        self.last_known_state == SessionState::Connected && self.credentials.is_some()
    }

    fn merge(previous: Option<&PersistedAccount>, session_id: &SessionId, meta: &AccountMetadata) -> Self {
        let credentials = meta
            .credentials
            .clone()
            .or_else(|| previous.and_then(|p| p.credentials.clone()));
        let connected_at = meta
            .connected_at
            .or_else(|| previous.and_then(|p| p.connected_at));
        Self {
            account: meta.account.clone(),
            credentials,
            last_known_state: meta.state,
            session_id: session_id.clone(),
            connected_at,
            saved_at: Utc::now(),
        }
    }
}

/// Durable account storage injected into the session core.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Returns every stored account.
    async fn load_persisted_accounts(&self) -> Result<Vec<PersistedAccount>, StoreError>;

    /// Inserts or updates the account in `metadata`, keyed by account id.
    async fn save_account(
        &self,
        session_id: &SessionId,
        metadata: &AccountMetadata,
    ) -> Result<(), StoreError>;
}

/// Account store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<BTreeMap<String, PersistedAccount>>,
}

impl MemoryAccountStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-filled with `accounts`.
    pub fn with_accounts(accounts: impl IntoIterator<Item = PersistedAccount>) -> Self {
        let map = accounts
            .into_iter()
            .map(|a| (a.account.id.clone(), a))
            .collect();
        Self {
            accounts: Mutex::new(map),
        }
    }

    /// Returns the stored entry for `account_id`.
    pub fn get(&self, account_id: &str) -> Option<PersistedAccount> {
        let accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        accounts.get(account_id).cloned()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn load_persisted_accounts(&self) -> Result<Vec<PersistedAccount>, StoreError> {
        let accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        Ok(accounts.values().cloned().collect())
    }

    async fn save_account(
        &self,
        session_id: &SessionId,
        metadata: &AccountMetadata,
    ) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        let entry = PersistedAccount::merge(accounts.get(&metadata.account.id), session_id, metadata);
        accounts.insert(metadata.account.id.clone(), entry);
        Ok(())
    }
}

/// Account store backed by a single JSON file.
///
/// The whole file is rewritten on every save using a temp-file-then-rename
/// sequence, so readers never observe a half-written file. Disk I/O runs on
/// the blocking pool; saves are serialized by an async lock.
#[derive(Debug)]
pub struct JsonFileAccountStore {
    path: PathBuf,
    accounts: AsyncMutex<BTreeMap<String, PersistedAccount>>,
}

impl JsonFileAccountStore {
    /// Opens the store at `path`, loading existing accounts if the file exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] if the file exists but cannot be read and
    /// [`StoreError::Corrupt`] if it is not valid JSON.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let accounts = read_accounts(&path)?;

        tracing::info!(
            accounts = accounts.len(),
            path = %path.display(),
            "account store loaded"
        );

        Ok(Self {
            path,
            accounts: AsyncMutex::new(accounts),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, accounts: &BTreeMap<String, PersistedAccount>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(accounts).map_err(StoreError::Encode)?;
        let path = self.path.clone();

        match tokio::task::spawn_blocking(move || write_atomically(&path, &json)).await {
            Ok(result) => result,
            Err(e) => Err(StoreError::Write {
                path: self.path.clone(),
                source: std::io::Error::other(format!("account store write task failed: {e}")),
            }),
        }
    }
}

/// Writes `json` to a temp file next to `path`, syncs it and renames it over
/// `path`.
fn write_atomically(path: &Path, json: &str) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
    }

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, json).map_err(write_err)?;
    fs::File::open(&temp_path)
        .and_then(|file| file.sync_all())
        .map_err(write_err)?;
    fs::rename(&temp_path, path).map_err(write_err)?;
    Ok(())
}

/// Reads the account map at `path`; a missing file is an empty map.
pub fn read_accounts(path: &Path) -> Result<BTreeMap<String, PersistedAccount>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait]
impl AccountStore for JsonFileAccountStore {
    async fn load_persisted_accounts(&self) -> Result<Vec<PersistedAccount>, StoreError> {
        let accounts = self.accounts.lock().await;
        Ok(accounts.values().cloned().collect())
    }

    async fn save_account(
        &self,
        session_id: &SessionId,
        metadata: &AccountMetadata,
    ) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock().await;
        let entry = PersistedAccount::merge(accounts.get(&metadata.account.id), session_id, metadata);
        let previous = accounts.insert(metadata.account.id.clone(), entry);

        if let Err(e) = self.flush(&accounts).await {
            // Keep memory and disk in agreement.
            match previous {
                Some(prev) => accounts.insert(metadata.account.id.clone(), prev),
                None => accounts.remove(&metadata.account.id),
            };
            return Err(e);
        }
        Ok(())
    }
}
