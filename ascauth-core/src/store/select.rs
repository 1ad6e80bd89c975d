//! Per-process backend selection.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::model::Credential;

use super::{
    CredentialStore, FileCredentialStore, KeychainCredentialStore, SecretStore, StoreError,
};

/// Inputs to backend selection.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Per-user config file (`~/.asc/config.json`).
    pub global_path: PathBuf,

    /// Per-working-directory config file (`./.asc/config.json`).
    pub local_path: PathBuf,

    /// Never use the secret store.
    pub bypass_keychain: bool,

    /// Secret-store service name.
    pub keychain_service: String,
}

/// Availability of the platform secret store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "detail")]
pub enum KeychainStatus {
    /// The probe succeeded.
    Available,

    /// Skipped because of the bypass toggle.
    Bypassed,

    /// Present but failing (locked, access denied, no backend).
    Unavailable(String),
}

impl KeychainStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Where `login` should write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteTarget {
    /// The backend reads would use.
    #[default]
    Auto,

    /// The local config file.
    Local,

    /// The global config file, skipping the secret store.
    Global,
}

/// Chooses the credential backend for this process.
///
/// Precedence is local config file, then global config file, then the
/// platform secret store, then the global config file as a fallback. The
/// selector never mixes backends within one operation: multi-backend
/// operations visit [`present`](Self::present) backends in order and act on
/// exactly one.
pub struct StoreSelector {
    settings: StoreSettings,
    secrets: Option<Arc<dyn SecretStore>>,
}

impl StoreSelector {
    /// Create a selector that uses the OS keyring when available.
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            settings,
            secrets: None,
        }
    }

    /// Use the given secret store instead of the OS keyring.
    pub fn with_secret_store(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// The local config file backend (whether or not the file exists).
    pub fn local(&self) -> FileCredentialStore {
        FileCredentialStore::new(&self.settings.local_path)
    }

    /// The global config file backend (whether or not the file exists).
    pub fn global(&self) -> FileCredentialStore {
        FileCredentialStore::new(&self.settings.global_path)
    }

    /// Probe the secret store.
    pub fn keychain_status(&self) -> KeychainStatus {
        if self.settings.bypass_keychain {
            return KeychainStatus::Bypassed;
        }
        if self.secrets.is_some() {
            return KeychainStatus::Available;
        }
        match probe_os_keyring(&self.settings.keychain_service) {
            Ok(()) => KeychainStatus::Available,
            Err(e) => KeychainStatus::Unavailable(e.to_string()),
        }
    }

    /// Open the secret-store backend.
    pub fn keychain(&self) -> Result<Box<dyn CredentialStore>, StoreError> {
        if self.settings.bypass_keychain {
            return Err(StoreError::BackendUnavailable {
                message: "bypassed".to_string(),
            });
        }
        let secrets = match &self.secrets {
            Some(secrets) => Arc::clone(secrets),
            None => open_os_keyring(&self.settings.keychain_service)?,
        };
        Ok(Box::new(KeychainCredentialStore::new(
            secrets,
            self.settings.keychain_service.clone(),
        )))
    }

    /// The backend reads and default writes use.
    pub fn select(&self) -> Box<dyn CredentialStore> {
        let local = self.local();
        if local.exists() {
            tracing::debug!(path = %local.path().display(), "using local config file");
            return Box::new(local);
        }

        let global = self.global();
        if global.exists() || self.settings.bypass_keychain {
            tracing::debug!(path = %global.path().display(), "using global config file");
            return Box::new(global);
        }

        match self.keychain() {
            Ok(store) => {
                tracing::debug!("using keychain");
                store
            }
            Err(e) => {
                tracing::warn!(
                    "Keychain unavailable ({}), falling back to {}",
                    e,
                    global.path().display()
                );
                Box::new(global)
            }
        }
    }

    /// The backend `login` writes to.
    pub fn for_write(&self, target: WriteTarget) -> Box<dyn CredentialStore> {
        match target {
            WriteTarget::Auto => self.select(),
            WriteTarget::Local => Box::new(self.local()),
            WriteTarget::Global => Box::new(self.global()),
        }
    }

    /// Every backend that currently holds (or may hold) credentials, in
    /// precedence order: existing local file, existing global file, then
    /// the secret store when available.
    pub fn present(&self) -> Vec<Box<dyn CredentialStore>> {
        let mut stores: Vec<Box<dyn CredentialStore>> = Vec::new();

        let local = self.local();
        if local.exists() {
            stores.push(Box::new(local));
        }
        let global = self.global();
        if global.exists() {
            stores.push(Box::new(global));
        }
        if let Ok(keychain) = self.keychain() {
            stores.push(keychain);
        }
        stores
    }

    /// Credentials from every present backend. Records from different
    /// backends are reported separately, never merged.
    pub fn list_all(&self) -> Result<Vec<Credential>, StoreError> {
        let mut all = Vec::new();
        for store in self.present() {
            all.extend(store.list()?);
        }
        Ok(all)
    }

    /// Find the first present backend holding `name`.
    pub fn find(&self, name: &str) -> Result<Option<Box<dyn CredentialStore>>, StoreError> {
        for store in self.present() {
            if store.get(name)?.is_some() {
                return Ok(Some(store));
            }
        }
        Ok(None)
    }

    /// Make `name` the default in the backend that holds it.
    ///
    /// Returns the location of that backend.
    pub fn set_default(&self, name: &str) -> Result<String, StoreError> {
        let store = self.find(name)?.ok_or_else(|| StoreError::NotFound {
            name: name.to_string(),
        })?;
        store.set_default(name)?;
        Ok(store.location())
    }

    /// Remove `name` from the backend that holds it.
    ///
    /// Returns the location of that backend.
    pub fn remove(&self, name: &str) -> Result<String, StoreError> {
        let store = self.find(name)?.ok_or_else(|| StoreError::NotFound {
            name: name.to_string(),
        })?;
        store.remove(name)?;
        Ok(store.location())
    }

    /// Clear every present backend. Returns how many credentials were removed.
    pub fn remove_all(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for store in self.present() {
            removed += store.list()?.len();
            store.remove_all()?;
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for StoreSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSelector")
            .field("settings", &self.settings)
            .field("injected_secret_store", &self.secrets.is_some())
            .finish()
    }
}

#[cfg(feature = "keyring-store")]
fn probe_os_keyring(service: &str) -> Result<(), StoreError> {
    super::KeyringStore::probe(service)
}

#[cfg(not(feature = "keyring-store"))]
fn probe_os_keyring(_service: &str) -> Result<(), StoreError> {
    Err(StoreError::BackendUnavailable {
        message: "built without keyring support".to_string(),
    })
}

#[cfg(feature = "keyring-store")]
fn open_os_keyring(service: &str) -> Result<Arc<dyn SecretStore>, StoreError> {
    Ok(Arc::new(super::KeyringStore::try_new(service)?))
}

#[cfg(not(feature = "keyring-store"))]
fn open_os_keyring(_service: &str) -> Result<Arc<dyn SecretStore>, StoreError> {
    Err(StoreError::BackendUnavailable {
        message: "built without keyring support".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CredentialSource, StoredKey};
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    fn settings(temp: &TempDir, bypass: bool) -> StoreSettings {
        StoreSettings {
            global_path: temp.path().join("home/.asc/config.json"),
            local_path: temp.path().join("repo/.asc/config.json"),
            bypass_keychain: bypass,
            keychain_service: "asc-test".to_string(),
        }
    }

    fn with_memory_keychain(temp: &TempDir) -> StoreSelector {
        StoreSelector::new(settings(temp, false)).with_secret_store(Arc::new(MemoryStore::new()))
    }

    fn key(name: &str) -> StoredKey {
        StoredKey::new(name, "KEY", "ISSUER", "/keys/AuthKey.p8")
    }

    #[test]
    fn test_keychain_selected_when_no_files() {
        let temp = TempDir::new().unwrap();
        let selector = with_memory_keychain(&temp);
        assert_eq!(selector.select().source(), CredentialSource::Keychain);
        assert_eq!(selector.keychain_status(), KeychainStatus::Available);
    }

    #[test]
    fn test_global_file_beats_keychain_and_local_beats_global() {
        let temp = TempDir::new().unwrap();
        let selector = with_memory_keychain(&temp);

        selector.global().init(false).unwrap();
        let selected = selector.select();
        assert_eq!(selected.source(), CredentialSource::Config);
        assert_eq!(selected.source_path(), Some(selector.settings().global_path.as_path()));

        selector.local().init(false).unwrap();
        let selected = selector.select();
        assert_eq!(selected.source_path(), Some(selector.settings().local_path.as_path()));
    }

    #[test]
    fn test_bypass_forces_global_file() {
        let temp = TempDir::new().unwrap();
        let selector = StoreSelector::new(settings(&temp, true))
            .with_secret_store(Arc::new(MemoryStore::new()));

        assert_eq!(selector.keychain_status(), KeychainStatus::Bypassed);
        let selected = selector.select();
        assert_eq!(selected.source_path(), Some(selector.settings().global_path.as_path()));
        assert!(selector.keychain().is_err());
    }

    #[test]
    fn test_list_all_reports_backends_distinctly() {
        let temp = TempDir::new().unwrap();
        let selector = with_memory_keychain(&temp);

        selector.keychain().unwrap().add(key("shared")).unwrap();
        selector.local().add(key("shared")).unwrap();

        let all = selector.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].source, CredentialSource::Config);
        assert_eq!(all[1].source, CredentialSource::Keychain);
        assert!(all.iter().all(|c| c.is_default));
    }

    #[test]
    fn test_set_default_searches_all_backends() {
        let temp = TempDir::new().unwrap();
        let selector = with_memory_keychain(&temp);

        let keychain = selector.keychain().unwrap();
        keychain.add(key("a")).unwrap();
        keychain.add(key("b")).unwrap();
        selector.local().add(key("c")).unwrap();

        selector.set_default("b").unwrap();
        assert_eq!(keychain.default_credential().unwrap().unwrap().name, "b");

        assert!(matches!(
            selector.set_default("missing"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_remove_all_clears_every_backend_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let selector = with_memory_keychain(&temp);

        selector.keychain().unwrap().add(key("a")).unwrap();
        selector.global().add(key("b")).unwrap();

        assert_eq!(selector.remove_all().unwrap(), 2);
        assert!(selector.list_all().unwrap().is_empty());
        assert_eq!(selector.remove_all().unwrap(), 0);
    }
}
