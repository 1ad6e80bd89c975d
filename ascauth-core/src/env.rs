//! Environment variable lookup.
//!
//! The resolver, settings loader and doctor never call [`std::env::var`]
//! directly; they go through [`Environment`] so tests can supply a fixed
//! map instead of mutating the process environment.

use std::collections::HashMap;

/// Key identifier fallback.
pub const KEY_ID: &str = "ASC_KEY_ID";
/// Issuer identifier fallback.
pub const ISSUER_ID: &str = "ASC_ISSUER_ID";
/// Private key file path (first of the three key variables consulted).
pub const PRIVATE_KEY_PATH: &str = "ASC_PRIVATE_KEY_PATH";
/// Inline PEM text (second).
pub const PRIVATE_KEY: &str = "ASC_PRIVATE_KEY";
/// Base64-encoded PEM bytes (third).
pub const PRIVATE_KEY_B64: &str = "ASC_PRIVATE_KEY_B64";
/// Profile selection.
pub const PROFILE: &str = "ASC_PROFILE";
/// Strict mode toggle.
pub const STRICT_AUTH: &str = "ASC_STRICT_AUTH";
/// Forces the config-file backend.
pub const BYPASS_KEYCHAIN: &str = "ASC_BYPASS_KEYCHAIN";
/// Overrides the global config file path.
pub const CONFIG_PATH: &str = "ASC_CONFIG_PATH";
/// API base URL used by network validation.
pub const BASE_URL: &str = "ASC_BASE_URL";
/// Network validation timeout.
pub const TIMEOUT: &str = "ASC_TIMEOUT";

/// Private key variables in the order they are consulted.
pub const PRIVATE_KEY_VARS: [&str; 3] = [PRIVATE_KEY_PATH, PRIVATE_KEY, PRIVATE_KEY_B64];

/// Source of environment variables.
pub trait Environment: Send + Sync {
    /// Look up a variable. Empty and whitespace-only values count as unset.
    fn var(&self, name: &str) -> Option<String>;

    /// Interpret a variable as a boolean toggle.
    ///
    /// Returns `Ok(false)` when unset and `Err(value)` when the value is not
    /// a recognised toggle.
    fn flag(&self, name: &str) -> Result<bool, String> {
        match self.var(name) {
            None => Ok(false),
            Some(value) => parse_flag(&value).ok_or(value),
        }
    }
}

/// Parse a toggle value such as `1`, `true`, `off`.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

/// A fixed set of variables, used by tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.insert(name.to_string(), value.into());
        self
    }

    /// Insert or replace a variable.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.vars.insert(name.to_string(), value.into());
    }
}

impl Environment for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars
            .get(name)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }
}
