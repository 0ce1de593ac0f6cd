//! Registry-driven removal of prior installations
//!
//! Every subkey under both uninstall roots whose lookup value equals the
//! configured one is uninstalled. Outcomes are collected first and folded into
//! the step result afterwards, so one failing entry never stops the others.

use log::{debug, info, warn};

use super::process::CommandRunner;
use super::registry::{
    QUIET_UNINSTALL_VALUE, UNINSTALL_ROOTS, UNINSTALL_VALUE, UninstallRegistry, subkey_path,
};
use crate::error::UninstallError;

/// Marker of Windows Installer command lines
const MSIEXEC_MARKER: &str = "msiexec.exe";
const QUIET_FLAG: &str = "/quiet";

/// What happened to one registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Uninstalled { key: String, output: String },
    Failed { key: String, reason: String },
    /// The entry could not be inspected
    Skipped { key: String, reason: String },
}

/// Result of the uninstall step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallSummary {
    /// No lookup key/value configured
    Disabled,
    /// Nothing in the registry matched
    NotFound,
    /// At least one matching entry was removed; `failures` lists the others
    Uninstalled { count: usize, failures: Vec<String> },
}

impl std::fmt::Display for UninstallSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UninstallSummary::Disabled => f.write_str("uninstall not configured"),
            UninstallSummary::NotFound => f.write_str("no matching installation found"),
            UninstallSummary::Uninstalled { count, failures } if failures.is_empty() => {
                write!(f, "uninstalled {count} program(s)")
            }
            UninstallSummary::Uninstalled { count, failures } => write!(
                f,
                "uninstalled {count} program(s), {} failed",
                failures.len()
            ),
        }
    }
}

/// Uninstall every installation whose `lookup_key` value equals `lookup_value`.
///
/// A blank key or value disables the step.
pub fn uninstall_matching(
    registry: &dyn UninstallRegistry,
    runner: &dyn CommandRunner,
    lookup_key: &str,
    lookup_value: &str,
) -> Result<UninstallSummary, UninstallError> {
    if lookup_key.trim().is_empty() || lookup_value.trim().is_empty() {
        return Ok(UninstallSummary::Disabled);
    }

    let outcomes = collect_outcomes(registry, runner, lookup_key, lookup_value);
    let summary = fold_outcomes(outcomes);
    match &summary {
        Ok(s) => info!("uninstall step: {s}"),
        Err(e) => warn!("{e}"),
    }
    summary
}

/// Walk both roots and uninstall each match, recording every outcome.
pub fn collect_outcomes(
    registry: &dyn UninstallRegistry,
    runner: &dyn CommandRunner,
    lookup_key: &str,
    lookup_value: &str,
) -> Vec<MatchOutcome> {
    let mut outcomes = Vec::new();

    for root in UNINSTALL_ROOTS {
        let subkeys = match registry.subkeys(root) {
            Ok(subkeys) => subkeys,
            Err(e) => {
                info!("could not open registry key {root}: {e}");
                continue;
            }
        };

        for subkey in subkeys {
            let key = subkey_path(root, &subkey);
            match registry.value(&key, lookup_key) {
                Ok(value) if value.to_string() == lookup_value => {}
                Ok(_) => continue,
                Err(e) => {
                    outcomes.push(MatchOutcome::Skipped {
                        key,
                        reason: e.to_string(),
                    });
                    continue;
                }
            }

            info!("found matching installation at {key}");
            outcomes.push(uninstall_entry(registry, runner, key));
        }
    }

    outcomes
}

/// Reduce collected outcomes to the step result.
///
/// Any success makes the step succeed. Failures without a success become an
/// error. No match at all is benign.
pub fn fold_outcomes(outcomes: Vec<MatchOutcome>) -> Result<UninstallSummary, UninstallError> {
    let mut count = 0;
    let mut failures = Vec::new();

    for outcome in outcomes {
        match outcome {
            MatchOutcome::Uninstalled { .. } => count += 1,
            MatchOutcome::Failed { key, reason } => failures.push(format!("{key}: {reason}")),
            MatchOutcome::Skipped { key, reason } => debug!("skipped {key}: {reason}"),
        }
    }

    if count > 0 {
        Ok(UninstallSummary::Uninstalled { count, failures })
    } else if !failures.is_empty() {
        Err(UninstallError { failures })
    } else {
        Ok(UninstallSummary::NotFound)
    }
}

/// Uninstall command for `key`: quiet variant first, blank counts as absent.
pub fn resolve_command(registry: &dyn UninstallRegistry, key: &str) -> Option<String> {
    [QUIET_UNINSTALL_VALUE, UNINSTALL_VALUE]
        .into_iter()
        .filter_map(|name| registry.value(key, name).ok())
        .map(|value| value.to_string())
        .find(|command| !command.trim().is_empty())
}

/// Append `/quiet` to Windows Installer commands that are not already silent.
pub fn force_quiet(command: &str) -> String {
    let lower = command.to_ascii_lowercase();
    if lower.contains(MSIEXEC_MARKER) && !lower.contains(QUIET_FLAG) && !lower.contains("/qn") {
        format!("{command} {QUIET_FLAG}")
    } else {
        command.to_string()
    }
}

fn uninstall_entry(
    registry: &dyn UninstallRegistry,
    runner: &dyn CommandRunner,
    key: String,
) -> MatchOutcome {
    let Some(command) = resolve_command(registry, &key) else {
        warn!("no uninstall command found for {key}");
        return MatchOutcome::Failed {
            key,
            reason: "no uninstall command found".to_string(),
        };
    };
    let command = force_quiet(&command);

    info!("running uninstall command: {command}");
    match runner.run_line(&command) {
        Ok(out) if out.success => {
            info!("uninstalled {key}");
            debug!("uninstall output: {}", out.output.trim());
            MatchOutcome::Uninstalled {
                key,
                output: out.output,
            }
        }
        Ok(out) => {
            let reason = format!(
                "`{command}` exited with code {}: {}",
                out.code.map_or_else(|| "none".to_string(), |c| c.to_string()),
                out.output.trim()
            );
            warn!("uninstall of {key} failed: {reason}");
            MatchOutcome::Failed { key, reason }
        }
        Err(e) => {
            let reason = format!("could not run `{command}`: {e}");
            warn!("uninstall of {key} failed: {reason}");
            MatchOutcome::Failed { key, reason }
        }
    }
}
