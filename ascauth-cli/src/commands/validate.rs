//! `validate`: resolve the current identity and prove it can sign.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use ascauth_core::{
    AuthError, FieldOrigins, HttpValidator, NetworkValidator, SignedToken, ValidationError,
    generate_token, load_private_key,
};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use tokio::time::Instant;

use crate::Context;

/// Slack between the validator's own timeout and the command deadline.
const DEADLINE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, Args)]
pub struct ValidateArgs {
    /// Also call the API with a signed token
    #[arg(long)]
    pub network: bool,
}

/// Outcome of `validate`, printed whether or not it succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origins: Option<FieldOrigins>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,
    /// `skipped`, `not_run`, `ok` or `failed`.
    pub network: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationReport {
    fn new(network: bool) -> Self {
        Self {
            valid: false,
            profile: None,
            key_id: None,
            issuer_id: None,
            key_path: None,
            origins: None,
            token_expires_at: None,
            network: if network { "not_run" } else { "skipped" },
            error: None,
        }
    }
}

/// One authenticated request, bounded by the configured timeout and by the
/// command deadline.
pub(crate) async fn check_network(ctx: &Context, token: &SignedToken) -> Result<(), ValidationError> {
    let timeout = ctx.settings.network_timeout;
    let deadline = Instant::now() + timeout + DEADLINE_GRACE;
    let validator = HttpValidator::new(&ctx.settings.base_url, timeout)?;
    validator.validate(token, Some(deadline)).await
}

pub async fn execute(ctx: &Context, args: &ValidateArgs, out: &mut dyn Write) -> Result<()> {
    let mut report = ValidationReport::new(args.network);
    let result = run(ctx, args, &mut report).await;
    if let Err(e) = &result {
        report.error = Some(e.to_string());
    }

    if ctx.is_json() {
        super::write_json(out, &report)?;
    } else {
        write_text(out, &report)?;
    }
    result.map_err(anyhow::Error::from)
}

async fn run(
    ctx: &Context,
    args: &ValidateArgs,
    report: &mut ValidationReport,
) -> Result<(), AuthError> {
    let identity = ctx.resolve()?;
    report.profile = identity.profile_name.clone();
    report.key_id = Some(identity.key_id.clone());
    report.issuer_id = Some(identity.issuer_id.clone());
    report.key_path = Some(identity.key_path.display().to_string());
    report.origins = Some(identity.origins.clone());

    let key = load_private_key(&identity.key_path)?;
    let token = generate_token(&identity.key_id, &identity.issuer_id, &key)?;
    report.token_expires_at = Some(token.expires_at);

    if args.network {
        report.network = "failed";
        check_network(ctx, &token).await?;
        report.network = "ok";
    }
    report.valid = true;
    Ok(())
}

fn write_text(out: &mut dyn Write, report: &ValidationReport) -> Result<()> {
    writeln!(out, "Valid:    {}", if report.valid { "yes" } else { "no" })?;
    if let Some(profile) = &report.profile {
        writeln!(out, "Profile:  {}", profile)?;
    }
    if let (Some(key_id), Some(origins)) = (&report.key_id, &report.origins) {
        writeln!(out, "Key ID:   {} (from {})", key_id, origins.key_id)?;
    }
    if let (Some(issuer_id), Some(origins)) = (&report.issuer_id, &report.origins) {
        writeln!(out, "Issuer:   {} (from {})", issuer_id, origins.issuer_id)?;
    }
    if let (Some(key_path), Some(origins)) = (&report.key_path, &report.origins) {
        writeln!(out, "Key:      {} (from {})", key_path, origins.key_path)?;
    }
    if let Some(expires_at) = report.token_expires_at {
        writeln!(out, "Token:    signed, expires {}", expires_at.to_rfc3339())?;
    }
    writeln!(out, "Network:  {}", report.network)?;
    if let Some(error) = &report.error {
        writeln!(out, "Error:    {}", error)?;
    }
    Ok(())
}
