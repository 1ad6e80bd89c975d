//! `logout`: remove one or all credentials.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::Context;

#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
pub struct LogoutArgs {
    /// Credential to remove
    #[arg(long)]
    pub name: Option<String>,

    /// Remove every credential from every store
    #[arg(long)]
    pub all: bool,
}

pub fn execute(ctx: &Context, args: &LogoutArgs, out: &mut dyn Write) -> Result<()> {
    match &args.name {
        Some(name) if !args.all => {
            let location = ctx.selector.remove(name)?;
            if ctx.is_json() {
                super::write_json(out, &json!({ "removed": [name], "location": location }))?;
            } else {
                writeln!(out, "Removed credential '{}' from {}", name, location)?;
            }
        }
        _ => {
            let removed = ctx.selector.remove_all()?;
            if ctx.is_json() {
                super::write_json(out, &json!({ "removed_count": removed }))?;
            } else if removed == 0 {
                writeln!(out, "No credentials stored")?;
            } else {
                writeln!(out, "Removed {} credential(s)", removed)?;
            }
        }
    }
    Ok(())
}
