use serde::Serialize;
use std::fmt::Write as _;
use tracing::{info, warn};
use uupd_drivers::CommandResult;

/// Everything one run produced, in the order work was attempted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    /// Name of the selected system driver, if any.
    pub system_driver: Option<String>,
    pub system_update_available: bool,
    pub outdated: bool,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub results: Vec<CommandResult>,
}

impl RunReport {
    pub fn failures(&self) -> Vec<&CommandResult> {
        self.results.iter().filter(|r| r.failed()).collect()
    }

    pub fn successes(&self) -> Vec<&CommandResult> {
        self.results.iter().filter(|r| !r.failed()).collect()
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(CommandResult::failed)
    }

    pub fn failed_contexts(&self) -> Vec<&str> {
        self.failures()
            .into_iter()
            .map(CommandResult::context)
            .collect()
    }

    /// Results the summary shows: all of them when `verbose`, otherwise
    /// only the failures.
    pub fn emitted(&self, verbose: bool) -> Vec<&CommandResult> {
        if verbose {
            self.results.iter().collect()
        } else {
            self.failures()
        }
    }

    pub fn log(&self, verbose: bool) {
        if self.has_failures() {
            warn!("Updates Completed with Failures:");
        } else {
            info!("Updates Completed");
        }
        for result in self.emitted(verbose) {
            if result.failed() {
                warn!("{}", format_result(result));
            } else {
                info!("{}", format_result(result));
            }
        }
    }
}

/// Render one result with its command and indented captured output.
pub fn format_result(result: &CommandResult) -> String {
    let status = if result.failed() { "failed" } else { "ok" };
    let mut out = format!("---> {} ({status})", result.context());
    if !result.command_line().is_empty() {
        let _ = write!(out, "\n\t | Command: {}", result.command_line().join(" "));
    }
    if let Some(code) = result.exit_code() {
        let _ = write!(out, "\n\t | Exit code: {code}");
    }
    let output = result.output();
    if !output.is_empty() {
        out.push_str("\n\t | Output:");
        for line in output.lines() {
            let _ = write!(out, "\n\t |  {line}");
        }
    }
    out
}
