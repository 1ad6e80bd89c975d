//! The diagnostic sections, in display order.
//!
//! Every function here only reads. Errors are turned into check entries.

use std::collections::BTreeSet;
use std::path::Path;

use crate::env::{self, Environment};
use crate::inline_key::{InlineEncoding, decode_inline};
use crate::key::{PrivateKey, validate_key_file};
use crate::model::{ConfigDocument, Credential};
use crate::store::{CredentialStore, KeychainStatus, file_mode, mode_is_too_open};

use super::{Check, DoctorInput, Fix, Section};

pub const KEYCHAIN: &str = "Keychain";
pub const CONFIG_FILES: &str = "Config files";
pub const STORED_CREDENTIALS: &str = "Stored credentials";
pub const KEY_FILES: &str = "Key files";
pub const ENVIRONMENT: &str = "Environment";

/// Secret-store availability.
pub fn keychain(input: &DoctorInput<'_>) -> Section {
    let check = match &input.keychain_status {
        KeychainStatus::Available => Check::ok("keychain", "available"),
        KeychainStatus::Bypassed => {
            Check::info("keychain", "bypassed, config files are used instead")
        }
        KeychainStatus::Unavailable(reason) => {
            Check::warn("keychain", format!("unavailable: {}", reason)).with_hint(format!(
                "Unlock the keychain, or set {}=1 to store credentials in a config file",
                env::BYPASS_KEYCHAIN
            ))
        }
    };
    Section {
        title: KEYCHAIN,
        checks: vec![check],
    }
}

/// Presence, permissions and parseability of both config files.
pub fn config_files(input: &DoctorInput<'_>) -> Section {
    let mut checks = Vec::new();

    for file in &input.config_files {
        let path = file.store.path();
        if !file.store.exists() {
            checks.push(Check::info(
                format!("{} config", file.label),
                format!("{} not present", path.display()),
            ));
            continue;
        }

        checks.extend(permission_check(
            format!("{} config permissions", file.label),
            path,
        ));

        let name = format!("{} config", file.label);
        match file.store.load() {
            Ok(doc) => checks.push(Check::ok(
                name,
                format!("{} ({} credential(s))", path.display(), doc.keys.len()),
            )),
            Err(e) => checks.push(Check::fail(name, e.to_string()).with_hint(format!(
                "Repair {} by hand, or recreate it with `init --force` and log in again",
                path.display()
            ))),
        }
    }

    Section {
        title: CONFIG_FILES,
        checks,
    }
}

/// Consistency of each present backend's document.
pub fn stored_credentials(input: &DoctorInput<'_>) -> Section {
    let backends = input.backends();
    let mut checks = Vec::new();

    if backends.is_empty() {
        checks.push(Check::info("credentials", "no credential store present").with_hint(
            "Run `login` to store a credential, or set ASC_KEY_ID, ASC_ISSUER_ID and a private key variable",
        ));
    }

    for backend in backends {
        let name = format!("credentials in {}", backend.location());
        match backend.load() {
            Ok(doc) => checks.extend(document_checks(&name, &doc)),
            Err(e) => checks.push(Check::fail(name, format!("cannot read: {}", e))),
        }
    }

    Section {
        title: STORED_CREDENTIALS,
        checks,
    }
}

fn document_checks(name: &str, doc: &ConfigDocument) -> Vec<Check> {
    let mut checks = Vec::new();

    let mut seen = BTreeSet::new();
    let duplicates: BTreeSet<&str> = doc
        .keys
        .iter()
        .filter(|k| !seen.insert(k.name.as_str()))
        .map(|k| k.name.as_str())
        .collect();
    for duplicate in duplicates {
        checks.push(
            Check::fail(name, format!("name '{}' appears more than once", duplicate))
                .with_hint(format!("Remove the duplicate with `logout --name {}`", duplicate)),
        );
    }

    for key in &doc.keys {
        let missing = key.missing_fields();
        if !missing.is_empty() {
            checks.push(
                Check::fail(
                    name,
                    format!("entry '{}' is missing {}", key.name, missing.join(", ")),
                )
                .with_hint("Remove the entry and run `login` again"),
            );
        }
    }

    if doc.has_dangling_default() {
        let pointer = doc.default_key_name.as_deref().unwrap_or_default();
        checks.push(
            Check::fail(
                name,
                format!("default '{}' does not name a stored credential", pointer),
            )
            .with_hint("Pick a new default with `switch --name <name>`"),
        );
    } else if doc.default_key_name.is_none() && !doc.keys.is_empty() {
        checks.push(
            Check::warn(name, "credentials stored but none is the default")
                .with_hint("Pick a default with `switch --name <name>`"),
        );
    }

    if checks.is_empty() {
        checks.push(match doc.default_entry() {
            Some(default) => Check::ok(
                name,
                format!(
                    "{} credential(s), default '{}'",
                    doc.keys.len(),
                    default.name
                ),
            ),
            None => Check::info(name, "no credentials stored"),
        });
    }
    checks
}

/// Each stored credential's private key.
pub fn key_files(input: &DoctorInput<'_>) -> Section {
    let credentials: Vec<Credential> = input
        .backends()
        .into_iter()
        .filter_map(|backend| backend.list().ok())
        .flatten()
        .collect();

    let mut checks = Vec::new();
    if credentials.is_empty() {
        checks.push(Check::info("keys", "no stored credentials to check"));
    }

    for credential in &credentials {
        let name = format!("key for '{}' ({})", credential.name, credential.source);
        let Some(path) = credential.key_path() else {
            checks.push(
                Check::warn(name, "no private key path stored").with_hint(format!(
                    "Set {} or log in again with --private-key",
                    env::PRIVATE_KEY_PATH
                )),
            );
            continue;
        };

        if let Err(e) = validate_key_file(path) {
            checks.push(Check::fail(name, e.to_string()).with_hint(format!(
                "Replace the key at {} or run `login` again with the right file",
                path.display()
            )));
            continue;
        }

        match permission_check(name.clone(), path) {
            Some(check) if check.status != super::Status::Ok => checks.push(check),
            _ => checks.push(Check::ok(name, format!("{} is a valid key", path.display()))),
        }
    }

    Section {
        title: KEY_FILES,
        checks,
    }
}

/// Consistency of the `ASC_*` variables.
pub fn environment(input: &DoctorInput<'_>) -> Section {
    let env = input.env;
    let mut checks = Vec::new();

    let key_id = env.var(env::KEY_ID);
    let issuer_id = env.var(env::ISSUER_ID);
    match (&key_id, &issuer_id) {
        (Some(_), None) | (None, Some(_)) => {
            let (set, unset) = if key_id.is_some() {
                (env::KEY_ID, env::ISSUER_ID)
            } else {
                (env::ISSUER_ID, env::KEY_ID)
            };
            checks.push(
                Check::warn("identifiers", format!("${} is set but ${} is not", set, unset))
                    .with_hint(format!("Set both ${} and ${}, or neither", set, unset)),
            );
        }
        (Some(_), Some(_)) => checks.push(Check::ok(
            "identifiers",
            format!("${} and ${} are set", env::KEY_ID, env::ISSUER_ID),
        )),
        (None, None) => {}
    }

    let key_vars: Vec<&'static str> = env::PRIVATE_KEY_VARS
        .into_iter()
        .filter(|var| env.var(var).is_some())
        .collect();
    if key_vars.len() > 1 {
        checks.push(
            Check::warn(
                "private key",
                format!(
                    "{} are all set; ${} wins",
                    key_vars
                        .iter()
                        .map(|v| format!("${}", v))
                        .collect::<Vec<_>>()
                        .join(", "),
                    key_vars[0]
                ),
            )
            .with_hint("Unset the private key variables you do not use"),
        );
    }
    for (index, var) in key_vars.iter().copied().enumerate() {
        let winner = index == 0;
        if let Some(check) = key_variable_check(env, var, winner) {
            checks.push(check);
        }
    }

    // Resolution only reads the selected backend, so both checks below do too.
    let selected = input.selected.as_ref();

    if let Some(profile) = env.var(env::PROFILE) {
        checks.push(profile_check(input, profile.trim()));
    }

    let env_credentials = key_id.is_some() || issuer_id.is_some() || !key_vars.is_empty();
    if env_credentials {
        if let Ok(Some(default)) = selected.default_credential() {
            checks.push(Check::info(
                "precedence",
                format!(
                    "stored default '{}' takes precedence; environment values only fill missing fields",
                    default.name
                ),
            ));
        }
    }

    for var in [env::STRICT_AUTH, env::BYPASS_KEYCHAIN] {
        if let Err(value) = env.flag(var) {
            checks.push(
                Check::warn(
                    "toggles",
                    format!("${}={:?} is not recognised and is treated as off", var, value),
                )
                .with_hint(format!("Set ${} to 1 or 0", var)),
            );
        }
    }

    if checks.is_empty() {
        checks.push(Check::info("variables", "no ASC_* credential variables set"));
    }

    Section {
        title: ENVIRONMENT,
        checks,
    }
}

/// Whether `$ASC_PROFILE` names a credential in the backend resolution reads.
fn profile_check(input: &DoctorInput<'_>, profile: &str) -> Check {
    let selected = input.selected.as_ref();
    match selected.get(profile) {
        Ok(Some(_)) => {
            return Check::ok(
                "profile",
                format!(
                    "${} selects '{}' ({})",
                    env::PROFILE,
                    profile,
                    selected.location()
                ),
            );
        }
        Ok(None) => {}
        Err(e) => {
            return Check::fail(
                "profile",
                format!("cannot look up '{}' in {}: {}", profile, selected.location(), e),
            );
        }
    }

    let shadowed = input
        .backends()
        .into_iter()
        .filter(|backend| backend.location() != selected.location())
        .find(|backend| matches!(backend.get(profile), Ok(Some(_))));

    match shadowed {
        Some(holder) => Check::fail(
            "profile",
            format!(
                "${} names '{}', which is stored in {} but {} takes precedence",
                env::PROFILE,
                profile,
                holder.location(),
                selected.location()
            ),
        )
        .with_hint(format!(
            "{} shadows {}; run `login --name {}` against it or remove it",
            selected.location(),
            holder.location(),
            profile
        )),
        None => Check::fail(
            "profile",
            format!("${} names '{}', which no store holds", env::PROFILE, profile),
        )
        .with_hint(format!(
            "Unset ${} or log in with `login --name {}`",
            env::PROFILE,
            profile
        )),
    }
}

/// Check one private key variable without writing anything to disk.
///
/// Only the winning variable is validated; a losing base64 variable is
/// still decoded so malformed material is reported.
fn key_variable_check(env: &dyn Environment, var: &'static str, winner: bool) -> Option<Check> {
    let value = env.var(var)?;
    let name = format!("${}", var);

    let parsed = match var {
        env::PRIVATE_KEY_PATH if winner => {
            validate_key_file(Path::new(value.trim())).map_err(|e| e.to_string())
        }
        env::PRIVATE_KEY if winner => decode_inline(&value, InlineEncoding::Pem)
            .map_err(|e| e.to_string())
            .and_then(|pem| parse_pem_bytes(&pem)),
        env::PRIVATE_KEY_B64 => match decode_inline(&value, InlineEncoding::Base64) {
            Err(e) => {
                return Some(Check::fail(name, e.to_string()).with_hint(format!(
                    "Re-encode the key with `base64 < AuthKey.p8` and set ${} again",
                    var
                )));
            }
            Ok(pem) if winner => parse_pem_bytes(&pem),
            Ok(_) => return None,
        },
        _ => return None,
    };

    Some(match parsed {
        Ok(()) => Check::ok(name, "holds a valid private key"),
        Err(reason) => Check::fail(name, reason)
            .with_hint(format!("Point ${} at a valid P-256 private key", var)),
    })
}

fn parse_pem_bytes(pem: &[u8]) -> Result<(), String> {
    let text = std::str::from_utf8(pem).map_err(|_| "decoded key is not PEM text".to_string())?;
    PrivateKey::from_pem(text).map(|_| ())
}

/// OK/WARN on a file's mode. `None` on platforms without Unix modes.
fn permission_check(name: String, path: &Path) -> Option<Check> {
    match file_mode(path) {
        Ok(Some(mode)) if mode_is_too_open(mode) => Some(
            Check::warn(
                name,
                format!(
                    "{} is mode {:o}; group or other users can access it",
                    path.display(),
                    mode
                ),
            )
            .with_fix(Fix::RestrictPermissions {
                path: path.to_path_buf(),
            }),
        ),
        Ok(Some(mode)) => Some(Check::ok(name, format!("mode {:o}", mode))),
        Ok(None) => None,
        Err(e) => Some(Check::fail(
            name,
            format!("cannot read metadata of {}: {}", path.display(), e),
        )),
    }
}
