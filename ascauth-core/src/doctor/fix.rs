//! Guarded repairs.

use serde::Serialize;

use crate::store::restrict_permissions;

use super::{Fix, Report};

/// What happened when a fix was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixOutcome {
    pub fix: Fix,

    /// Whether anything changed. `false` when the fix was already in effect.
    pub changed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Apply every automated repair attached to `report`.
///
/// Repairs only change file modes, so credential contents are never
/// rewritten and no entry is created. Running this twice is harmless. A
/// repair that fails is reported in its outcome; the rest still run.
pub fn apply_fixes(report: &Report) -> Vec<FixOutcome> {
    report
        .fixes()
        .into_iter()
        .map(|fix| {
            let result = match fix {
                Fix::RestrictPermissions { path } => restrict_permissions(path),
            };
            match result {
                Ok(changed) => FixOutcome {
                    fix: fix.clone(),
                    changed,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!("fix '{}' failed: {}", fix, e);
                    FixOutcome {
                        fix: fix.clone(),
                        changed: false,
                        error: Some(e.to_string()),
                    }
                }
            }
        })
        .collect()
}
