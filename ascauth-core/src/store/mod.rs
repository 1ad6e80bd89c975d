//! Credential storage.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`SecretStore`] - Trait for raw secret storage backends
//! - [`MemoryStore`] - In-memory secret storage for testing
//! - [`KeyringStore`] - OS keyring secret storage (with `keyring-store` feature)
//! - [`CredentialStore`] - Named-credential operations over a [`ConfigDocument`]
//! - [`FileCredentialStore`] - Owner-only JSON config file backend
//! - [`KeychainCredentialStore`] - Secret-store backend holding the same document
//! - [`StoreSelector`] - Per-process backend selection
//!
//! # Backend Precedence
//!
//! Local config file, then global config file, then the platform secret
//! store. The first one present wins for reads and default writes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ConfigDocument, Credential, CredentialSource, StoredKey};

mod file;
mod keychain;
mod memory;
#[cfg(feature = "keyring-store")]
mod keyring;
mod select;

pub use file::{
    file_mode, mode_is_too_open, restrict_permissions, FileCredentialStore, PRIVATE_FILE_MODE,
};
pub use keychain::{KeychainCredentialStore, KEYCHAIN_ENTRY};
pub use memory::MemoryStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringStore;
pub use select::{KeychainStatus, StoreSelector, StoreSettings, WriteTarget};

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value.
#[derive(Clone, Serialize, Deserialize)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

impl Drop for Secret {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.0);
    }
}

/// Error type for credential store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A credential with this name already exists in the backend.
    #[error("credential '{name}' already exists")]
    AlreadyExists { name: String },

    /// No credential with this name exists.
    #[error("credential '{name}' not found")]
    NotFound { name: String },

    /// The operation conflicts with existing state.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// The entry is missing required fields.
    #[error("invalid credential: {message}")]
    InvalidEntry { message: String },

    /// The platform secret store could not be used.
    #[error("keychain not available: {message}")]
    BackendUnavailable { message: String },

    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// A config document could not be parsed.
    #[error("cannot parse {location}: {source}")]
    Corrupt {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O error reading or writing a config file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Abstraction over raw secret storage backends.
///
/// Implementations include:
/// - [`MemoryStore`] - In-memory storage for testing
/// - [`KeyringStore`] (with `keyring-store` feature) - OS keyring
pub trait SecretStore: Send + Sync {
    /// Retrieve a secret by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    fn get(&self, key: &str) -> Result<Option<Secret>, StoreError>;

    /// Store a secret at the given key.
    ///
    /// Overwrites any existing value.
    fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError>;

    /// Delete a secret by key.
    ///
    /// Returns `Ok(())` even if the key didn't exist.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

impl<S: SecretStore + ?Sized> SecretStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        (**self).set(key, secret)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }
}

/// Named-credential operations, independent of backend.
///
/// Backends only implement loading and saving a [`ConfigDocument`]; every
/// mutation is a load-modify-save over that document, so the default-flag
/// invariant is enforced by the document itself. There is no cross-process
/// locking: concurrent writers race and the last one wins.
pub trait CredentialStore: Send + Sync {
    /// Which backend this is.
    fn source(&self) -> CredentialSource;

    /// Config file path for file backends.
    fn source_path(&self) -> Option<&Path> {
        None
    }

    /// Human-readable location, for status output and logs.
    fn location(&self) -> String;

    /// Load the current document. A missing document loads as empty.
    fn load(&self) -> Result<ConfigDocument, StoreError>;

    /// Persist the document.
    fn save(&self, doc: &ConfigDocument) -> Result<(), StoreError>;

    /// All credentials in this backend, in stored order.
    fn list(&self) -> Result<Vec<Credential>, StoreError> {
        Ok(self.load()?.credentials(self.source(), self.source_path()))
    }

    /// Find a credential by name.
    fn get(&self, name: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.list()?.into_iter().find(|c| c.name == name))
    }

    /// The default credential, if any.
    fn default_credential(&self) -> Result<Option<Credential>, StoreError> {
        Ok(self.list()?.into_iter().find(|c| c.is_default))
    }

    /// Add a credential. The first credential of an empty store becomes default.
    fn add(&self, key: StoredKey) -> Result<Credential, StoreError> {
        let mut doc = self.load()?;
        let name = key.name.clone();
        doc.insert(key)?;
        self.save(&doc)?;
        tracing::debug!(name = %name, backend = %self.location(), "stored credential");

        doc.credentials(self.source(), self.source_path())
            .into_iter()
            .find(|c| c.name == name)
            .ok_or(StoreError::NotFound { name })
    }

    /// Make `name` the default credential.
    fn set_default(&self, name: &str) -> Result<(), StoreError> {
        let mut doc = self.load()?;
        doc.set_default(name)?;
        self.save(&doc)
    }

    /// Remove one credential.
    fn remove(&self, name: &str) -> Result<(), StoreError> {
        let mut doc = self.load()?;
        doc.remove(name)?;
        self.save(&doc)
    }

    /// Remove every credential. A no-op on an empty store.
    fn remove_all(&self) -> Result<(), StoreError> {
        let mut doc = self.load()?;
        if doc.is_empty() {
            return Ok(());
        }
        doc.clear();
        self.save(&doc)
    }
}
