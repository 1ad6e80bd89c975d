//! Domain model types for ascauth.
//!
//! This module defines the core types used throughout ascauth:
//! - [`Credential`] - A named signing identity as reported by a store
//! - [`CredentialSource`] - Which backend holds a credential
//! - [`StoredKey`] / [`ConfigDocument`] - The persisted representation
//! - [`ResolvedIdentity`] - The per-invocation result of resolution
//! - [`Origin`] - Where a resolved field came from

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::store::StoreError;

/// Backend that currently holds a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// Platform secret store.
    Keychain,

    /// Permission-restricted JSON config file.
    Config,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keychain => "keychain",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One named signing identity as reported by a store.
///
/// The key's bytes are never part of this type, only the path to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// User-chosen label, unique within a store.
    pub name: String,

    /// Platform API key identifier.
    pub key_id: String,

    /// Platform issuer identifier.
    pub issuer_id: String,

    /// Absolute path to the private key file. Empty when none was stored.
    pub key_path: PathBuf,

    /// Backend holding this entry.
    pub source: CredentialSource,

    /// Config file path, only set when `source` is [`CredentialSource::Config`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,

    /// Whether this is the store's default entry.
    pub is_default: bool,
}

impl Credential {
    /// The stored key path, if one was recorded.
    pub fn key_path(&self) -> Option<&Path> {
        if self.key_path.as_os_str().is_empty() {
            None
        } else {
            Some(&self.key_path)
        }
    }
}

/// A credential entry as persisted in a [`ConfigDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredKey {
    pub name: String,
    pub key_id: String,
    pub issuer_id: String,
    #[serde(default)]
    pub private_key_path: PathBuf,
}

impl StoredKey {
    /// Create a new entry.
    pub fn new(
        name: impl Into<String>,
        key_id: impl Into<String>,
        issuer_id: impl Into<String>,
        private_key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            key_id: key_id.into(),
            issuer_id: issuer_id.into(),
            private_key_path: private_key_path.into(),
        }
    }

    /// Names of required fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.key_id.trim().is_empty() {
            missing.push("key_id");
        }
        if self.issuer_id.trim().is_empty() {
            missing.push("issuer_id");
        }
        missing
    }
}

/// The persisted credential document shared by both backends.
///
/// `keys` keeps insertion order; `default_key_name` points at one of them.
/// All mutations go through the methods here so the default-flag invariant
/// holds regardless of backend: a non-empty document produced by these
/// operations always has exactly one default, an empty one has none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_key_name: Option<String>,

    #[serde(default)]
    pub keys: Vec<StoredKey>,
}

impl ConfigDocument {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.default_key_name.is_none()
    }

    /// Find an entry by name.
    pub fn get(&self, name: &str) -> Option<&StoredKey> {
        self.keys.iter().find(|k| k.name == name)
    }

    /// The entry the default pointer refers to, if it exists.
    pub fn default_entry(&self) -> Option<&StoredKey> {
        self.default_key_name
            .as_deref()
            .and_then(|name| self.get(name))
    }

    /// Whether the default pointer names an entry that is not present.
    pub fn has_dangling_default(&self) -> bool {
        self.default_key_name.is_some() && self.default_entry().is_none()
    }

    /// Add an entry. The first entry of an empty document becomes default.
    ///
    /// Returns `true` when the new entry became the default.
    pub fn insert(&mut self, key: StoredKey) -> Result<bool, StoreError> {
        let missing = key.missing_fields();
        if !missing.is_empty() {
            return Err(StoreError::InvalidEntry {
                message: format!("missing {}", missing.join(", ")),
            });
        }
        if self.get(&key.name).is_some() {
            return Err(StoreError::AlreadyExists { name: key.name });
        }

        let becomes_default = self.default_entry().is_none();
        if becomes_default {
            self.default_key_name = Some(key.name.clone());
        }
        self.keys.push(key);
        Ok(becomes_default)
    }

    /// Point the default at `name`, implicitly un-defaulting the previous one.
    pub fn set_default(&mut self, name: &str) -> Result<(), StoreError> {
        if self.get(name).is_none() {
            return Err(StoreError::NotFound {
                name: name.to_string(),
            });
        }
        self.default_key_name = Some(name.to_string());
        Ok(())
    }

    /// Remove an entry. Removing the default promotes the first remaining entry.
    pub fn remove(&mut self, name: &str) -> Result<StoredKey, StoreError> {
        let index = self
            .keys
            .iter()
            .position(|k| k.name == name)
            .ok_or_else(|| StoreError::NotFound {
                name: name.to_string(),
            })?;
        let removed = self.keys.remove(index);

        if self.default_entry().is_none() {
            self.default_key_name = self.keys.first().map(|k| k.name.clone());
        }
        Ok(removed)
    }

    /// Remove every entry and the default pointer.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.default_key_name = None;
    }

    /// Project the document into [`Credential`] records for a backend.
    pub fn credentials(
        &self,
        source: CredentialSource,
        source_path: Option<&Path>,
    ) -> Vec<Credential> {
        let default = self.default_entry().map(|k| k.name.as_str());
        self.keys
            .iter()
            .map(|k| Credential {
                name: k.name.clone(),
                key_id: k.key_id.clone(),
                issuer_id: k.issuer_id.clone(),
                key_path: k.private_key_path.clone(),
                source,
                source_path: source_path.map(Path::to_path_buf),
                is_default: default == Some(k.name.as_str()),
            })
            .collect()
    }
}

/// Where a resolved field came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum Origin {
    /// A stored credential (explicit profile or the default entry).
    Profile(String),

    /// An environment variable.
    Env(&'static str),
}

impl Origin {
    /// Origins that count as the same source for strict mode.
    pub(crate) fn source_class(&self) -> String {
        match self {
            Self::Profile(name) => format!("profile '{}'", name),
            Self::Env(_) => "environment".to_string(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profile(name) => write!(f, "profile '{}'", name),
            Self::Env(var) => write!(f, "${}", var),
        }
    }
}

/// Provenance of each field of a [`ResolvedIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldOrigins {
    pub key_id: Origin,
    pub issuer_id: Origin,
    pub key_path: Origin,
}

/// The ephemeral result of resolution for one invocation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedIdentity {
    pub key_id: String,
    pub issuer_id: String,
    pub key_path: PathBuf,

    /// The stored credential that contributed fields, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,

    pub origins: FieldOrigins,
}
