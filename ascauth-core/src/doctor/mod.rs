//! Diagnostics.
//!
//! This module provides:
//! - [`DoctorInput`] - The read-only state a scan looks at
//! - [`run`] - Runs every section in display order and aggregates a [`Report`]
//! - [`apply_fixes`] - Applies the automatable repairs attached to a report
//!
//! Each section is a plain function from [`DoctorInput`] to [`Section`]
//! (see [`checks`]). Sections share no mutable state, and a failure inside
//! one becomes a [`Status::Fail`] entry instead of aborting the scan.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::env::Environment;
use crate::store::{CredentialStore, FileCredentialStore, KeychainStatus, StoreSelector};

pub mod checks;
mod fix;

pub use fix::{FixOutcome, apply_fixes};

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Info,
    Warn,
    Fail,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A repair that can be applied without touching credential contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Fix {
    /// Narrow a file's mode to `0600`.
    RestrictPermissions { path: PathBuf },
}

impl fmt::Display for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RestrictPermissions { path } => {
                write!(f, "chmod 600 {}", path.display())
            }
        }
    }
}

/// One diagnostic result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub name: String,
    pub status: Status,
    pub message: String,

    /// Suggested next step, surfaced as a recommendation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    /// Automated repair, applied only in confirmed fix mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<Fix>,
}

impl Check {
    pub fn new(name: impl Into<String>, status: Status, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            hint: None,
            fix: None,
        }
    }

    pub fn ok(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Status::Ok, message)
    }

    pub fn info(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Status::Info, message)
    }

    pub fn warn(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Status::Warn, message)
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Status::Fail, message)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_fix(mut self, fix: Fix) -> Self {
        self.fix = Some(fix);
        self
    }
}

/// A titled group of checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub title: &'static str,
    pub checks: Vec<Check>,
}

/// Counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub ok: usize,
    pub info: usize,
    pub warn: usize,
    pub fail: usize,
}

/// Aggregated scan result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub sections: Vec<Section>,
    pub summary: Summary,
    pub recommendations: Vec<String>,
}

impl Report {
    /// Reduce sections into a report.
    pub fn from_sections(sections: Vec<Section>) -> Self {
        let mut summary = Summary::default();
        let mut recommendations: Vec<String> = Vec::new();
        let mut fixable: Vec<&Fix> = Vec::new();

        for check in sections.iter().flat_map(|s| &s.checks) {
            match check.status {
                Status::Ok => summary.ok += 1,
                Status::Info => summary.info += 1,
                Status::Warn => summary.warn += 1,
                Status::Fail => summary.fail += 1,
            }
            if let Some(fix) = &check.fix {
                if !fixable.contains(&fix) {
                    fixable.push(fix);
                }
            }

            if check.status < Status::Warn {
                continue;
            }
            if let Some(hint) = &check.hint {
                if !recommendations.contains(hint) {
                    recommendations.push(hint.clone());
                }
            }
        }

        if !fixable.is_empty() {
            recommendations.push(format!(
                "Run `doctor --fix --confirm` to restrict permissions on {} file(s)",
                fixable.len()
            ));
        }

        Self {
            sections,
            summary,
            recommendations,
        }
    }

    /// Whether any check failed. Warnings alone never fail a scan.
    pub fn is_failure(&self) -> bool {
        self.summary.fail > 0
    }

    /// Every check, in display order.
    pub fn checks(&self) -> impl Iterator<Item = &Check> {
        self.sections.iter().flat_map(|s| s.checks.iter())
    }

    /// The automated repairs attached to checks, without duplicates.
    pub fn fixes(&self) -> Vec<&Fix> {
        let mut fixes: Vec<&Fix> = Vec::new();
        for fix in self.checks().filter_map(|c| c.fix.as_ref()) {
            if !fixes.contains(&fix) {
                fixes.push(fix);
            }
        }
        fixes
    }
}

/// A config file location the scan inspects.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// `local` or `global`.
    pub label: &'static str,
    pub store: FileCredentialStore,
}

impl ConfigFile {
    pub fn new(label: &'static str, path: impl Into<PathBuf>) -> Self {
        Self {
            label,
            store: FileCredentialStore::new(path),
        }
    }
}

/// Everything a scan reads.
pub struct DoctorInput<'a> {
    pub keychain_status: KeychainStatus,

    /// The secret-store backend, when it could be opened.
    pub keychain: Option<Box<dyn CredentialStore>>,

    /// Config file locations in precedence order.
    pub config_files: Vec<ConfigFile>,

    /// The backend resolution reads.
    pub selected: Box<dyn CredentialStore>,

    pub env: &'a dyn Environment,
}

impl<'a> DoctorInput<'a> {
    /// Gather input from a selector.
    pub fn from_selector(selector: &StoreSelector, env: &'a dyn Environment) -> Self {
        let keychain_status = selector.keychain_status();
        let keychain = if keychain_status.is_available() {
            selector.keychain().ok()
        } else {
            None
        };
        let settings = selector.settings();
        Self {
            keychain_status,
            keychain,
            config_files: vec![
                ConfigFile::new("local", &settings.local_path),
                ConfigFile::new("global", &settings.global_path),
            ],
            selected: selector.select(),
            env,
        }
    }

    /// Backends that exist, in precedence order.
    pub fn backends(&self) -> Vec<&dyn CredentialStore> {
        let mut backends: Vec<&dyn CredentialStore> = Vec::new();
        for file in self.config_files.iter().filter(|f| f.store.exists()) {
            backends.push(&file.store);
        }
        if let Some(keychain) = &self.keychain {
            backends.push(keychain.as_ref());
        }
        backends
    }
}

/// Run every section in display order.
pub fn run(input: &DoctorInput<'_>) -> Report {
    let sections = vec![
        checks::keychain(input),
        checks::config_files(input),
        checks::stored_credentials(input),
        checks::key_files(input),
        checks::environment(input),
    ];
    Report::from_sections(sections)
}
