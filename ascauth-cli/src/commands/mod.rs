//! Command implementations.

pub mod doctor;
pub mod init;
pub mod login;
pub mod logout;
pub mod status;
pub mod switch;
pub mod validate;

use std::io::Write;

use anyhow::Result;
use serde::Serialize;

/// Write `value` as pretty JSON followed by a newline.
pub(crate) fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
