use std::fmt;
use std::sync::{Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::claims::{self, Claims};

/// Access and refresh credential, always stored and replaced together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    #[serde(rename = "accessToken")]
    pub access: String,
    #[serde(rename = "refreshToken")]
    pub refresh: String,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Session storage unavailable: {0}")]
    Unavailable(String),
}

/// Backing slot for the credential pair.
///
/// Implementations hold the pair for the lifetime of the session only and
/// must not persist it anywhere that outlives the process.
pub trait SessionStorage: Send + Sync {
    fn load(&self) -> Result<Option<CredentialPair>, StorageError>;
    fn save(&self, pair: &CredentialPair) -> Result<(), StorageError>;
    fn remove(&self) -> Result<(), StorageError>;
}

/// In-process session storage.
#[derive(Default)]
pub struct MemoryStorage {
    slot: RwLock<Option<CredentialPair>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<CredentialPair>, StorageError> {
        let slot = self
            .slot
            .read()
            .map_err(|_| StorageError::Unavailable("session slot poisoned".to_string()))?;
        Ok(slot.clone())
    }

    fn save(&self, pair: &CredentialPair) -> Result<(), StorageError> {
        let mut slot = self
            .slot
            .write()
            .map_err(|_| StorageError::Unavailable("session slot poisoned".to_string()))?;
        *slot = Some(pair.clone());
        Ok(())
    }

    fn remove(&self) -> Result<(), StorageError> {
        let mut slot = self
            .slot
            .write()
            .map_err(|_| StorageError::Unavailable("session slot poisoned".to_string()))?;
        *slot = None;
        Ok(())
    }
}

/// Session-scoped owner of the credential pair.
///
/// Reads never fail: an unavailable backend reads as "not logged in".
/// Writes are serialized so read-modify-write updates (renewal) cannot
/// interleave with a login or logout.
pub struct CredentialStore {
    storage: Box<dyn SessionStorage>,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(storage: Box<dyn SessionStorage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStorage::new()))
    }

    /// Replace both members of the pair
    pub fn set_pair(&self, pair: CredentialPair) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = self.storage.save(&pair) {
            warn!(error = %e, "Failed to store credential pair");
        }
    }

    pub fn pair(&self) -> Option<CredentialPair> {
        match self.storage.load() {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Credential storage read failed, treating as signed out");
                None
            }
        }
    }

    pub fn access(&self) -> Option<String> {
        self.pair().map(|p| p.access)
    }

    pub fn refresh(&self) -> Option<String> {
        self.pair().map(|p| p.refresh)
    }

    /// Remove both members. Safe to call when nothing is stored.
    pub fn clear(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.remove_locked();
    }

    /// Swap in a renewed access credential, but only if the stored refresh
    /// credential is still the one the renewal was performed with.
    ///
    /// Returns `false` when the session was replaced or ended meanwhile.
    pub fn replace_access_if(&self, expected_refresh: &str, access: &str) -> bool {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.pair() {
            Some(pair) if pair.refresh == expected_refresh => {
                let renewed = CredentialPair::new(access, pair.refresh);
                match self.storage.save(&renewed) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "Failed to store renewed credential");
                        self.remove_locked();
                        false
                    }
                }
            }
            _ => false,
        }
    }

    /// Clear the pair only if it still holds `expected_refresh`.
    pub fn clear_if(&self, expected_refresh: &str) -> bool {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.pair() {
            Some(pair) if pair.refresh == expected_refresh => {
                self.remove_locked();
                true
            }
            _ => false,
        }
    }

    /// Decoded claims of the stored access credential
    pub fn claims(&self) -> Option<Claims> {
        self.access().and_then(|access| claims::decode(&access))
    }

    pub fn is_logged_in(&self) -> bool {
        self.pair().is_some()
    }

    fn remove_locked(&self) {
        match self.storage.remove() {
            Ok(()) => debug!("Credential pair cleared"),
            Err(e) => warn!(error = %e, "Failed to clear credential storage"),
        }
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
