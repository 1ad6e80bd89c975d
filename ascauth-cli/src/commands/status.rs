//! `status`: active backend, warnings and stored credentials.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use ascauth_core::store::{file_mode, mode_is_too_open};
use ascauth_core::{Credential, CredentialSource, KeychainStatus, env};
use clap::Args;
use serde::Serialize;

use crate::Context;

#[derive(Debug, Clone, Default, Args)]
pub struct StatusArgs {}

/// Everything `status` reports. Never contains key material.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Backend reads and default writes use.
    pub backend: CredentialSource,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
    pub keychain: KeychainStatus,
    pub warnings: Vec<String>,
    pub credentials: Vec<Credential>,
}

/// Gather the report without printing it.
pub fn collect(ctx: &Context) -> Result<StatusReport> {
    let active = ctx.selector.select();
    let credentials = ctx.selector.list_all()?;
    let mut warnings = Vec::new();

    for store in [ctx.selector.local(), ctx.selector.global()] {
        if !store.exists() {
            continue;
        }
        if let Ok(Some(mode)) = file_mode(store.path()) {
            if mode_is_too_open(mode) {
                warnings.push(format!(
                    "{} is mode {:o}; run `doctor --fix --confirm` to restrict it",
                    store.path().display(),
                    mode
                ));
            }
        }
    }

    for store in ctx.selector.present() {
        let doc = store.load()?;
        if doc.has_dangling_default() {
            warnings.push(format!(
                "default '{}' in {} does not name a stored credential",
                doc.default_key_name.as_deref().unwrap_or_default(),
                store.location()
            ));
        }
    }

    let env_vars: Vec<&str> = [env::KEY_ID, env::ISSUER_ID]
        .into_iter()
        .chain(env::PRIVATE_KEY_VARS)
        .filter(|var| ctx.env.var(var).is_some())
        .collect();
    if !env_vars.is_empty() && credentials.iter().any(|c| c.is_default) {
        warnings.push(format!(
            "{} set alongside stored credentials; they only fill missing fields",
            env_vars
                .iter()
                .map(|v| format!("${}", v))
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    Ok(StatusReport {
        backend: active.source(),
        location: active.location(),
        config_path: active.source_path().map(PathBuf::from),
        keychain: ctx.selector.keychain_status(),
        warnings,
        credentials,
    })
}

pub fn execute(ctx: &Context, _args: &StatusArgs, out: &mut dyn Write) -> Result<()> {
    let report = collect(ctx)?;
    if ctx.is_json() {
        return super::write_json(out, &report);
    }

    writeln!(out, "Backend:  {} ({})", report.backend, report.location)?;
    let keychain = match &report.keychain {
        KeychainStatus::Available => "available".to_string(),
        KeychainStatus::Bypassed => "bypassed".to_string(),
        KeychainStatus::Unavailable(reason) => format!("unavailable ({})", reason),
    };
    writeln!(out, "Keychain: {}", keychain)?;

    if !report.warnings.is_empty() {
        writeln!(out)?;
        writeln!(out, "Warnings:")?;
        for warning in &report.warnings {
            writeln!(out, "  ! {}", warning)?;
        }
    }

    writeln!(out)?;
    if report.credentials.is_empty() {
        writeln!(out, "No credentials stored")?;
        return Ok(());
    }
    writeln!(out, "Credentials:")?;
    for credential in &report.credentials {
        writeln!(
            out,
            "  {} {}  key_id={}  issuer_id={}  key={}  [{}]",
            if credential.is_default { "*" } else { " " },
            credential.name,
            credential.key_id,
            credential.issuer_id,
            credential.key_path.display(),
            credential
                .source_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| credential.source.to_string())
        )?;
    }
    Ok(())
}
