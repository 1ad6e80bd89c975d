//! `doctor`: full diagnostic scan with a guarded fix mode.

use std::io::Write;

use anyhow::Result;
use ascauth_core::doctor::{self, DoctorInput, FixOutcome, Report, Status};
use clap::Args;
use serde::Serialize;

use crate::Context;
use crate::exit::{AuthFailure, UsageError};

#[derive(Debug, Clone, Default, Args)]
pub struct DoctorArgs {
    /// Apply automated fixes (requires --confirm)
    #[arg(long)]
    pub fix: bool,

    /// Confirm that fixes may be applied
    #[arg(long)]
    pub confirm: bool,
}

#[derive(Debug, Serialize)]
struct DoctorOutput<'a> {
    report: &'a Report,
    #[serde(skip_serializing_if = "Option::is_none")]
    fixes: Option<&'a [FixOutcome]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    after: Option<&'a Report>,
}

pub fn execute(ctx: &Context, args: &DoctorArgs, out: &mut dyn Write) -> Result<()> {
    if args.fix != args.confirm {
        return Err(UsageError("--fix and --confirm must be given together".to_string()).into());
    }

    let input = DoctorInput::from_selector(&ctx.selector, ctx.env.as_ref());
    let report = doctor::run(&input);

    let (outcomes, after) = if args.fix {
        let outcomes = doctor::apply_fixes(&report);
        let after = doctor::run(&input);
        (Some(outcomes), Some(after))
    } else {
        (None, None)
    };

    if ctx.is_json() {
        super::write_json(
            out,
            &DoctorOutput {
                report: &report,
                fixes: outcomes.as_deref(),
                after: after.as_ref(),
            },
        )?;
    } else {
        write_report(out, &report)?;
        if let (Some(outcomes), Some(after)) = (&outcomes, &after) {
            writeln!(out)?;
            write_fixes(out, outcomes)?;
            writeln!(out)?;
            writeln!(out, "After fixes:")?;
            write_report(out, after)?;
        }
    }

    // The re-scan, when there is one, decides the outcome.
    let last = after.as_ref().unwrap_or(&report);
    if last.is_failure() {
        return Err(AuthFailure(format!(
            "doctor found {} failing check(s)",
            last.summary.fail
        ))
        .into());
    }
    Ok(())
}

fn write_report(out: &mut dyn Write, report: &Report) -> Result<()> {
    for section in &report.sections {
        writeln!(out, "{}", section.title)?;
        for check in &section.checks {
            writeln!(
                out,
                "  [{:<4}] {}: {}",
                check.status.as_str(),
                check.name,
                check.message
            )?;
        }
    }

    let summary = &report.summary;
    writeln!(out)?;
    writeln!(
        out,
        "Summary: {} ok, {} info, {} warning(s), {} failure(s)",
        summary.ok, summary.info, summary.warn, summary.fail
    )?;

    if !report.recommendations.is_empty() {
        writeln!(out)?;
        writeln!(out, "Recommendations:")?;
        for recommendation in &report.recommendations {
            writeln!(out, "  - {}", recommendation)?;
        }
    }
    Ok(())
}

fn write_fixes(out: &mut dyn Write, outcomes: &[FixOutcome]) -> Result<()> {
    if outcomes.is_empty() {
        writeln!(out, "No automated fixes to apply")?;
        return Ok(());
    }
    writeln!(out, "Fixes:")?;
    for outcome in outcomes {
        let result = match (&outcome.error, outcome.changed) {
            (Some(error), _) => format!("failed: {}", error),
            (None, true) => Status::Ok.as_str().to_string(),
            (None, false) => "already applied".to_string(),
        };
        writeln!(out, "  {} ... {}", outcome.fix, result)?;
    }
    Ok(())
}
