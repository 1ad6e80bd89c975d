//! Secret-store credential backend.

use crate::model::{ConfigDocument, CredentialSource};

use super::{CredentialStore, Secret, SecretStore, StoreError};

/// Secret-store key under which the credential document is kept.
pub const KEYCHAIN_ENTRY: &str = "credentials";

/// Credential backend that keeps the whole [`ConfigDocument`] as a single
/// JSON secret in a [`SecretStore`].
///
/// Clearing the last credential deletes the entry.
pub struct KeychainCredentialStore<S> {
    secrets: S,
    service: String,
}

impl<S: SecretStore> KeychainCredentialStore<S> {
    /// Wrap a secret store. `service` is only used for display.
    pub fn new(secrets: S, service: impl Into<String>) -> Self {
        Self {
            secrets,
            service: service.into(),
        }
    }

    /// The underlying secret store.
    pub fn secrets(&self) -> &S {
        &self.secrets
    }
}

impl<S> std::fmt::Debug for KeychainCredentialStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeychainCredentialStore")
            .field("service", &self.service)
            .finish()
    }
}

impl<S: SecretStore> CredentialStore for KeychainCredentialStore<S> {
    fn source(&self) -> CredentialSource {
        CredentialSource::Keychain
    }

    fn location(&self) -> String {
        format!("keychain ({}/{})", self.service, KEYCHAIN_ENTRY)
    }

    fn load(&self) -> Result<ConfigDocument, StoreError> {
        match self.secrets.get(KEYCHAIN_ENTRY)? {
            None => Ok(ConfigDocument::default()),
            Some(secret) => {
                serde_json::from_str(secret.expose()).map_err(|source| StoreError::Corrupt {
                    location: self.location(),
                    source,
                })
            }
        }
    }

    fn save(&self, doc: &ConfigDocument) -> Result<(), StoreError> {
        if doc.is_empty() {
            return self.secrets.delete(KEYCHAIN_ENTRY);
        }
        let json = serde_json::to_string(doc)?;
        self.secrets.set(KEYCHAIN_ENTRY, &Secret::new(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StoredKey;
    use crate::store::MemoryStore;

    fn test_store() -> KeychainCredentialStore<MemoryStore> {
        KeychainCredentialStore::new(MemoryStore::new(), "asc")
    }

    fn key(name: &str) -> StoredKey {
        StoredKey::new(name, "KEY123", "issuer-uuid", "/keys/AuthKey.p8")
    }

    #[test]
    fn test_keychain_lifecycle() {
        let store = test_store();
        store.add(key("personal")).unwrap();
        store.add(key("work")).unwrap();
        store.set_default("work").unwrap();

        let creds = store.list().unwrap();
        assert_eq!(creds.len(), 2);
        assert!(creds.iter().all(|c| c.source == CredentialSource::Keychain));
        assert!(creds.iter().all(|c| c.source_path.is_none()));
        assert_eq!(store.default_credential().unwrap().unwrap().name, "work");

        store.remove("work").unwrap();
        assert_eq!(store.default_credential().unwrap().unwrap().name, "personal");
    }

    #[test]
    fn test_remove_all_deletes_entry() {
        let store = test_store();
        store.add(key("personal")).unwrap();
        assert!(!store.secrets().is_empty());

        store.remove_all().unwrap();
        assert!(store.secrets().is_empty());
        assert!(store.list().unwrap().is_empty());

        store.remove_all().unwrap();
    }

    #[test]
    fn test_corrupt_entry_reported() {
        let store = test_store();
        store
            .secrets()
            .set(KEYCHAIN_ENTRY, &Secret::new("garbage"))
            .unwrap();
        assert!(matches!(store.list(), Err(StoreError::Corrupt { .. })));
    }
}
