//! `init`: scaffold an empty config document.

use std::io::Write;

use anyhow::Result;
use ascauth_core::FileCredentialStore;
use clap::Args;
use serde_json::json;

use crate::Context;

#[derive(Debug, Clone, Default, Args)]
pub struct InitArgs {
    /// Create ./.asc/config.json instead of the per-user file
    #[arg(long)]
    pub local: bool,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

pub fn execute(ctx: &Context, args: &InitArgs, out: &mut dyn Write) -> Result<()> {
    let path = if args.local {
        &ctx.settings.local_config
    } else {
        &ctx.settings.global_config
    };
    let store = FileCredentialStore::new(path);
    store.init(args.force)?;
    tracing::info!(path = %path.display(), "initialized config file");

    if ctx.is_json() {
        super::write_json(out, &json!({ "path": path, "created": true }))?;
    } else {
        writeln!(out, "Created {}", path.display())?;
    }
    Ok(())
}
