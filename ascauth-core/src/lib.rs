//! # ascauth Core
//!
//! Credential resolution and request signing for the ascauth CLI.
//!
//! This crate provides:
//! - Named credential storage over the platform keychain or owner-only JSON files
//! - A deterministic resolver choosing exactly one signing identity per call
//! - ES256 request-token generation from P-256 private keys
//! - A diagnostic scanner with guarded permission repairs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ascauth_core::{
//!     ProcessEnv, ResolveOptions, Resolver, Settings, StoreSelector,
//!     generate_token, inline_key, load_private_key,
//! };
//!
//! fn sign() -> Result<String, ascauth_core::AuthError> {
//!     let env = ProcessEnv;
//!     let settings = Settings::from_env(&env, &std::env::current_dir().unwrap())?;
//!     let store = StoreSelector::new(settings.store_settings()).select();
//!     let identity = Resolver::new(store.as_ref(), &env, inline_key::process_cache())
//!         .resolve(&ResolveOptions::default())?;
//!     let key = load_private_key(&identity.key_path)?;
//!     let token = generate_token(&identity.key_id, &identity.issuer_id, &key)?;
//!     Ok(token.expose().to_string())
//! }
//! ```

pub mod doctor;
pub mod env;
pub mod error;
pub mod inline_key;
pub mod key;
pub mod model;
pub mod resolve;
pub mod settings;
pub mod store;
pub mod validate;

// Re-export commonly used types at crate root
pub use model::{
    ConfigDocument,
    Credential,
    CredentialSource,
    FieldOrigins,
    Origin,
    ResolvedIdentity,
    StoredKey,
};

pub use env::{Environment, MapEnv, ProcessEnv};

pub use store::{
    CredentialStore,
    FileCredentialStore,
    KeychainCredentialStore,
    KeychainStatus,
    MemoryStore,
    Secret,
    SecretStore,
    StoreError,
    StoreSelector,
    StoreSettings,
    WriteTarget,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;

pub use key::{
    KeyError,
    PrivateKey,
    SignedToken,
    generate_token,
    load_private_key,
    validate_key_file,
};

pub use inline_key::{CleanupGuard, InlineKeyCache};

pub use resolve::{ResolveError, ResolveOptions, Resolver};

pub use validate::{HttpValidator, NetworkValidator, ValidationError};

pub use settings::{ConfigError, Settings};

pub use error::AuthError;
