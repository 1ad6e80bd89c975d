//! Identity resolution.
//!
//! This module provides:
//! - [`ResolveOptions`] - Per-call profile selection and strict mode
//! - [`Resolver`] - The precedence pipeline producing a [`ResolvedIdentity`]
//! - [`ResolveError`] - Typed resolution failures
//!
//! # Precedence
//!
//! 1. The explicitly selected profile. A missing profile is an error; it
//!    never falls through to the environment.
//! 2. Otherwise the store's default entry.
//! 3. Environment variables, only for fields still missing.
//!
//! Each field is resolved as a chain of `Option` steps so the order above
//! is visible in one place. Inline key material is only materialized when
//! the key path is still missing after steps 1 and 2.

use std::collections::BTreeSet;
use std::path::PathBuf;

use thiserror::Error;

use crate::env::{self, Environment};
use crate::inline_key::{InlineEncoding, InlineKeyCache, decode_inline};
use crate::key::KeyError;
use crate::model::{Credential, FieldOrigins, Origin, ResolvedIdentity};
use crate::store::{CredentialStore, StoreError};

/// Error type for identity resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// One or more required fields are missing after every step.
    #[error("incomplete credentials: missing {}", missing.join(", "))]
    IncompleteCredentials { missing: Vec<&'static str> },

    /// The selected profile does not exist in the store.
    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

    /// Strict mode rejected an identity assembled from several sources.
    #[error("mixed credential sources: {}", sources.join(" + "))]
    MixedCredentialSources { sources: Vec<String> },

    /// Inline key material could not be decoded or written.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The store could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-call resolution inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Explicitly selected profile.
    pub profile: Option<String>,

    /// Reject identities whose fields come from more than one source.
    pub strict: bool,
}

/// A value together with where it came from.
#[derive(Debug, Clone)]
struct Sourced<T> {
    value: T,
    origin: Origin,
}

impl<T> Sourced<T> {
    fn from_profile(value: T, credential: &Credential) -> Self {
        Self {
            value,
            origin: Origin::Profile(credential.name.clone()),
        }
    }

    fn from_env(value: T, var: &'static str) -> Self {
        Self {
            value,
            origin: Origin::Env(var),
        }
    }
}

/// Resolves exactly one identity per call. Holds no state between calls
/// apart from the shared inline-key cache.
pub struct Resolver<'a> {
    store: &'a dyn CredentialStore,
    env: &'a dyn Environment,
    cache: &'a InlineKeyCache,
}

impl<'a> Resolver<'a> {
    pub fn new(
        store: &'a dyn CredentialStore,
        env: &'a dyn Environment,
        cache: &'a InlineKeyCache,
    ) -> Self {
        Self { store, env, cache }
    }

    /// Run the precedence pipeline.
    pub fn resolve(&self, options: &ResolveOptions) -> Result<ResolvedIdentity, ResolveError> {
        let stored = self.stored_credential(options.profile.as_deref())?;
        let stored = stored.as_ref();

        let key_id = stored
            .and_then(|c| non_empty(&c.key_id).map(|v| Sourced::from_profile(v, c)))
            .or_else(|| self.env_value(env::KEY_ID));
        let issuer_id = stored
            .and_then(|c| non_empty(&c.issuer_id).map(|v| Sourced::from_profile(v, c)))
            .or_else(|| self.env_value(env::ISSUER_ID));
        let key_path = match stored
            .and_then(|c| c.key_path().map(|p| Sourced::from_profile(p.to_path_buf(), c)))
        {
            Some(path) => Some(path),
            None => self.env_key_path()?,
        };

        let (key_id, issuer_id, key_path) = match (key_id, issuer_id, key_path) {
            (Some(k), Some(i), Some(p)) => (k, i, p),
            (k, i, p) => {
                let missing = [
                    ("key_id", k.is_none()),
                    ("issuer_id", i.is_none()),
                    ("key_path", p.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                return Err(ResolveError::IncompleteCredentials { missing });
            }
        };

        let origins = FieldOrigins {
            key_id: key_id.origin,
            issuer_id: issuer_id.origin,
            key_path: key_path.origin,
        };
        if options.strict {
            check_single_source(&origins)?;
        }

        let profile_name = [&origins.key_id, &origins.issuer_id, &origins.key_path]
            .into_iter()
            .find_map(|origin| match origin {
                Origin::Profile(name) => Some(name.clone()),
                Origin::Env(_) => None,
            });

        tracing::debug!(
            profile = ?profile_name,
            key_id = %origins.key_id,
            issuer_id = %origins.issuer_id,
            key_path = %origins.key_path,
            "resolved identity"
        );

        Ok(ResolvedIdentity {
            key_id: key_id.value,
            issuer_id: issuer_id.value,
            key_path: key_path.value,
            profile_name,
            origins,
        })
    }

    /// Steps 1 and 2: the selected profile, else the default entry.
    fn stored_credential(&self, profile: Option<&str>) -> Result<Option<Credential>, ResolveError> {
        match profile {
            Some(name) => self
                .store
                .get(name)?
                .map(Some)
                .ok_or_else(|| ResolveError::ProfileNotFound {
                    name: name.to_string(),
                }),
            None => Ok(self.store.default_credential()?),
        }
    }

    fn env_value(&self, var: &'static str) -> Option<Sourced<String>> {
        self.env.var(var).map(|v| Sourced::from_env(v.trim().to_string(), var))
    }

    /// Step 3 for the key path. Only the first set key variable is used.
    fn env_key_path(&self) -> Result<Option<Sourced<PathBuf>>, ResolveError> {
        let Some((var, value)) = env::PRIVATE_KEY_VARS
            .into_iter()
            .find_map(|var| self.env.var(var).map(|value| (var, value)))
        else {
            return Ok(None);
        };

        let path = match var {
            env::PRIVATE_KEY_PATH => PathBuf::from(value.trim()),
            env::PRIVATE_KEY => {
                let pem = decode_inline(&value, InlineEncoding::Pem)?;
                self.cache.materialize(&pem)?
            }
            _ => {
                let pem = decode_inline(&value, InlineEncoding::Base64)?;
                self.cache.materialize(&pem)?
            }
        };
        Ok(Some(Sourced::from_env(path, var)))
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn check_single_source(origins: &FieldOrigins) -> Result<(), ResolveError> {
    let sources: BTreeSet<String> = [&origins.key_id, &origins.issuer_id, &origins.key_path]
        .into_iter()
        .map(Origin::source_class)
        .collect();
    if sources.len() > 1 {
        return Err(ResolveError::MixedCredentialSources {
            sources: sources.into_iter().collect(),
        });
    }
    Ok(())
}
