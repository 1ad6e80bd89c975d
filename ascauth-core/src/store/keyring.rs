//! OS keyring-backed secret storage implementation.

use keyring::Entry;

use super::{Secret, SecretStore, StoreError};

/// Account name used for the availability probe entry.
const PROBE_ACCOUNT: &str = "__probe__";

/// OS keyring-backed secret store.
///
/// This store uses the platform's native keyring service:
/// - macOS: Keychain
/// - Linux: kernel keyutils
/// - Windows: Credential Manager
///
/// Each key maps to one keyring entry with the store's service name and
/// the key as the account.
pub struct KeyringStore {
    service_name: String,
}

impl KeyringStore {
    /// Try to create a new keyring store.
    ///
    /// Runs [`probe`](Self::probe) first, so a store is only returned when
    /// the keyring answered.
    pub fn try_new(service_name: &str) -> Result<Self, StoreError> {
        Self::probe(service_name)?;
        Ok(Self {
            service_name: service_name.to_string(),
        })
    }

    /// Check whether the keyring can currently be used.
    ///
    /// Reads a probe entry: a missing entry means the keyring answered and is
    /// usable, any other failure (locked, access denied, no backend) is
    /// reported as [`StoreError::BackendUnavailable`].
    pub fn probe(service_name: &str) -> Result<(), StoreError> {
        let entry = Entry::new(service_name, PROBE_ACCOUNT).map_err(|e| {
            StoreError::BackendUnavailable {
                message: format!("cannot open keyring entry: {}", e),
            }
        })?;

        match entry.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::BackendUnavailable {
                message: e.to_string(),
            }),
        }
    }

    /// Create a keyring entry for the given key.
    fn create_entry(&self, key: &str) -> Result<Entry, StoreError> {
        Entry::new(&self.service_name, key).map_err(|e| StoreError::BackendError {
            message: format!("failed to create keyring entry: {}", e),
        })
    }
}

impl std::fmt::Debug for KeyringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringStore")
            .field("service_name", &self.service_name)
            .finish()
    }
}

impl SecretStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        let entry = self.create_entry(key)?;

        match entry.get_password() {
            Ok(password) => Ok(Some(Secret::new(password))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::Ambiguous(_)) => Err(StoreError::BackendError {
                message: format!("ambiguous keyring entry for key: {}", key),
            }),
            Err(keyring::Error::NoStorageAccess(e)) => Err(StoreError::BackendUnavailable {
                message: e.to_string(),
            }),
            Err(keyring::Error::PlatformFailure(e)) => Err(StoreError::BackendError {
                message: format!("platform keyring failure: {}", e),
            }),
            Err(e) => Err(StoreError::BackendError {
                message: format!("keyring error: {}", e),
            }),
        }
    }

    fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        let entry = self.create_entry(key)?;

        entry
            .set_password(secret.expose())
            .map_err(|e| StoreError::BackendError {
                message: format!("failed to set keyring password: {}", e),
            })
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let entry = self.create_entry(key)?;

        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::BackendError {
                message: format!("failed to delete keyring entry: {}", e),
            }),
        }
    }
}
