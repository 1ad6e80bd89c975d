//! `switch`: change the default credential.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::Context;

#[derive(Debug, Clone, Args)]
pub struct SwitchArgs {
    /// Credential to make the default
    #[arg(long)]
    pub name: String,
}

pub fn execute(ctx: &Context, args: &SwitchArgs, out: &mut dyn Write) -> Result<()> {
    let location = ctx.selector.set_default(&args.name)?;

    if ctx.is_json() {
        super::write_json(out, &json!({ "default": args.name, "location": location }))?;
    } else {
        writeln!(out, "Default credential is now '{}' ({})", args.name, location)?;
    }
    Ok(())
}
