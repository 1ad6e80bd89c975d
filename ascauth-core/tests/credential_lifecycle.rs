//! Integration tests for credential lifecycle operations.
//!
//! These tests verify the store contract over the config-file backend and
//! across backends through the selector:
//! - Adding credentials and the first-added default
//! - Switching and removing with the single-default invariant
//! - Idempotent removal of everything
//! - Backend precedence and distinct reporting

use std::sync::Arc;

use ascauth_core::{
    CredentialSource, CredentialStore, FileCredentialStore, MemoryStore, StoreError,
    StoreSelector, StoreSettings, StoredKey,
};
use tempfile::TempDir;

/// Helper to create a file store in a temporary directory.
fn test_store() -> (FileCredentialStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileCredentialStore::new(temp_dir.path().join(".asc/config.json"));
    (store, temp_dir)
}

fn test_key(name: &str) -> StoredKey {
    StoredKey::new(name, format!("{}-KEY", name), "issuer-uuid", "/keys/AuthKey.p8")
}

fn defaults(store: &dyn CredentialStore) -> Vec<String> {
    store
        .list()
        .unwrap()
        .into_iter()
        .filter(|c| c.is_default)
        .map(|c| c.name)
        .collect()
}

#[test]
fn test_add_first_credential_becomes_default() {
    let (store, _temp) = test_store();

    let added = store.add(test_key("A")).unwrap();
    assert!(added.is_default);
    assert_eq!(added.source, CredentialSource::Config);
    assert_eq!(added.source_path.as_deref(), Some(store.path()));

    let second = store.add(test_key("B")).unwrap();
    assert!(!second.is_default, "first-added stays default until switched");
    assert_eq!(defaults(&store), vec!["A"]);
}

#[test]
fn test_add_duplicate_fails() {
    let (store, _temp) = test_store();

    store.add(test_key("A")).unwrap();
    let result = store.add(test_key("A"));

    assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn test_single_default_through_operation_sequence() {
    let (store, _temp) = test_store();

    store.add(test_key("A")).unwrap();
    store.add(test_key("B")).unwrap();
    store.add(test_key("C")).unwrap();
    assert_eq!(defaults(&store).len(), 1);

    store.set_default("C").unwrap();
    assert_eq!(defaults(&store), vec!["C"]);

    store.remove("C").unwrap();
    assert_eq!(defaults(&store), vec!["A"]);

    store.remove("A").unwrap();
    assert_eq!(defaults(&store), vec!["B"]);

    store.remove("B").unwrap();
    assert!(defaults(&store).is_empty());
}

#[test]
fn test_remove_then_list_never_returns_name() {
    let (store, _temp) = test_store();

    store.add(test_key("A")).unwrap();
    store.add(test_key("B")).unwrap();
    store.remove("A").unwrap();

    let names: Vec<String> = store.list().unwrap().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["B"]);

    assert!(matches!(store.remove("A"), Err(StoreError::NotFound { .. })));
}

#[test]
fn test_remove_all_is_idempotent() {
    let (store, _temp) = test_store();

    store.remove_all().unwrap();

    store.add(test_key("A")).unwrap();
    store.add(test_key("B")).unwrap();
    store.remove_all().unwrap();
    assert!(store.list().unwrap().is_empty());

    store.remove_all().unwrap();
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_state_survives_reopen() {
    let (store, _temp) = test_store();
    store.add(test_key("A")).unwrap();
    store.add(test_key("B")).unwrap();
    store.set_default("B").unwrap();

    let reopened = FileCredentialStore::new(store.path());
    let creds = reopened.list().unwrap();
    assert_eq!(creds.len(), 2);
    assert_eq!(creds[0].key_id, "A-KEY");
    assert_eq!(defaults(&reopened), vec!["B"]);
}

#[test]
fn test_init_refuses_to_overwrite() {
    let (store, _temp) = test_store();

    store.init(false).unwrap();
    store.add(test_key("A")).unwrap();

    assert!(matches!(store.init(false), Err(StoreError::Conflict { .. })));
    assert_eq!(store.list().unwrap().len(), 1);

    store.init(true).unwrap();
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_selector_switch_and_logout_act_on_holding_backend() {
    let temp = TempDir::new().unwrap();
    let settings = StoreSettings {
        global_path: temp.path().join("home/.asc/config.json"),
        local_path: temp.path().join("repo/.asc/config.json"),
        bypass_keychain: false,
        keychain_service: "asc-test".to_string(),
    };
    let selector = StoreSelector::new(settings).with_secret_store(Arc::new(MemoryStore::new()));

    let keychain = selector.keychain().unwrap();
    keychain.add(test_key("kc")).unwrap();
    selector.global().add(test_key("g1")).unwrap();
    selector.global().add(test_key("g2")).unwrap();

    // The global file now exists, so it is selected over the keychain.
    assert_eq!(selector.select().source(), CredentialSource::Config);

    let location = selector.set_default("g2").unwrap();
    assert_eq!(location, selector.global().location());
    assert_eq!(defaults(&selector.global()), vec!["g2"]);
    assert_eq!(defaults(keychain.as_ref()), vec!["kc"]);

    let location = selector.remove("kc").unwrap();
    assert!(location.starts_with("keychain"));
    assert!(keychain.list().unwrap().is_empty());

    let all = selector.list_all().unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|c| c.source == CredentialSource::Config));
}
