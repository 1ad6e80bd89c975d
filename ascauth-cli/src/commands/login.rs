//! `login`: register a named credential.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use ascauth_core::{KeyError, StoredKey, WriteTarget, generate_token, load_private_key};
use clap::Args;

use super::validate::check_network;
use crate::Context;

#[derive(Debug, Clone, Args)]
pub struct LoginArgs {
    /// Name for the credential
    #[arg(long)]
    pub name: String,

    /// API key identifier
    #[arg(long)]
    pub key_id: String,

    /// Issuer identifier
    #[arg(long)]
    pub issuer_id: String,

    /// Path to the private key (.p8)
    #[arg(long, value_name = "PATH")]
    pub private_key: PathBuf,

    /// Store in ./.asc/config.json
    #[arg(long, conflicts_with = "bypass_keychain")]
    pub local: bool,

    /// Store in the per-user config file, never the keychain
    #[arg(long)]
    pub bypass_keychain: bool,

    /// Check the credential against the API before storing it
    #[arg(long)]
    pub network: bool,
}

impl LoginArgs {
    fn target(&self) -> WriteTarget {
        if self.local {
            WriteTarget::Local
        } else if self.bypass_keychain {
            WriteTarget::Global
        } else {
            WriteTarget::Auto
        }
    }
}

pub async fn execute(ctx: &Context, args: &LoginArgs, out: &mut dyn Write) -> Result<()> {
    // Only the path is stored, so it must not depend on the working directory.
    let key_path = args
        .private_key
        .canonicalize()
        .map_err(|e| KeyError::InvalidKey {
            path: args.private_key.clone(),
            reason: e.to_string(),
        })?;
    let key = load_private_key(&key_path)?;

    if args.network {
        let token = generate_token(&args.key_id, &args.issuer_id, &key)?;
        check_network(ctx, &token)
            .await
            .context("network validation failed; credential not stored")?;
    }
    drop(key);

    let store = ctx.selector.for_write(args.target());
    let credential = store.add(StoredKey::new(
        args.name.trim(),
        args.key_id.trim(),
        args.issuer_id.trim(),
        key_path,
    ))?;

    if ctx.is_json() {
        super::write_json(out, &credential)?;
    } else {
        writeln!(
            out,
            "Stored credential '{}' in {}{}",
            credential.name,
            store.location(),
            if credential.is_default { " (default)" } else { "" }
        )?;
    }
    Ok(())
}
