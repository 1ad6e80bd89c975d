//! Exit codes.
//!
//! Commands return `anyhow::Error`; the binary walks the error chain and
//! maps the first typed error it recognises to an [`ExitStatus`].

use std::process::ExitCode;

use ascauth_core::{
    AuthError, ConfigError, KeyError, ResolveError, StoreError, ValidationError,
};
use thiserror::Error;

/// Process exit status taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success = 0,
    Failure = 1,
    Usage = 2,
    Auth = 3,
    NotFound = 4,
    Conflict = 5,
}

/// Exit status when interrupted by Ctrl-C.
pub const INTERRUPTED: u8 = 130;

impl ExitStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

/// Invalid combination of arguments that clap cannot express.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UsageError(pub String);

/// A command that already reported its result but must exit with the
/// authentication-failure status.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct AuthFailure(pub String);

/// Map an error to an exit status.
pub fn exit_status(err: &anyhow::Error) -> ExitStatus {
    err.chain()
        .find_map(|cause| {
            if cause.is::<UsageError>() {
                return Some(ExitStatus::Usage);
            }
            if cause.is::<AuthFailure>() {
                return Some(ExitStatus::Auth);
            }
            if let Some(e) = cause.downcast_ref::<AuthError>() {
                return Some(auth_error_status(e));
            }
            if let Some(e) = cause.downcast_ref::<StoreError>() {
                return Some(store_status(e));
            }
            if let Some(e) = cause.downcast_ref::<ResolveError>() {
                return Some(resolve_status(e));
            }
            if cause.is::<KeyError>() {
                return Some(ExitStatus::Auth);
            }
            if let Some(e) = cause.downcast_ref::<ValidationError>() {
                return Some(validation_status(e));
            }
            if cause.is::<ConfigError>() {
                return Some(ExitStatus::Usage);
            }
            None
        })
        .unwrap_or(ExitStatus::Failure)
}

fn auth_error_status(err: &AuthError) -> ExitStatus {
    match err {
        AuthError::Store(e) => store_status(e),
        AuthError::Key(_) => ExitStatus::Auth,
        AuthError::Resolve(e) => resolve_status(e),
        AuthError::Validation(e) => validation_status(e),
        AuthError::Config(_) => ExitStatus::Usage,
    }
}

fn store_status(err: &StoreError) -> ExitStatus {
    match err {
        StoreError::NotFound { .. } => ExitStatus::NotFound,
        StoreError::AlreadyExists { .. } | StoreError::Conflict { .. } => ExitStatus::Conflict,
        StoreError::InvalidEntry { .. } => ExitStatus::Usage,
        _ => ExitStatus::Failure,
    }
}

fn resolve_status(err: &ResolveError) -> ExitStatus {
    match err {
        ResolveError::Store(e) => store_status(e),
        _ => ExitStatus::Auth,
    }
}

fn validation_status(err: &ValidationError) -> ExitStatus {
    match err {
        ValidationError::Rejected { .. } => ExitStatus::Auth,
        _ => ExitStatus::Failure,
    }
}
