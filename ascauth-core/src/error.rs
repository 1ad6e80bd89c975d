//! Top-level error type for ascauth.

use thiserror::Error;

use crate::key::KeyError;
use crate::resolve::ResolveError;
use crate::settings::ConfigError;
use crate::store::StoreError;
use crate::validate::ValidationError;

/// Top-level error type encompassing all ascauth errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Error from credential storage.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Error from key loading or signing.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Error from identity resolution.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Error from network validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Convenience alias.
pub type Result<T, E = AuthError> = std::result::Result<T, E>;
