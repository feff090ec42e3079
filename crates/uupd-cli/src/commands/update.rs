use super::{hardware, json_pretty, mark_fail, mark_ok, EXIT_FAILURE, EXIT_SUCCESS};
use crate::host::SelectedHost;
use std::sync::Arc;
use tracing::info;
use uupd_core::{Orchestrator, RunOptions, RunReport};

pub fn run(
    options: RunOptions,
    host: &SelectedHost,
    hw_check: bool,
    json_output: bool,
) -> Result<u8, String> {
    let dry_run = options.dry_run;
    let notifier = host.notifier(&options.environment);
    let orchestrator = Orchestrator::new(options, Arc::clone(&host.host)).with_notifier(notifier);

    let report = orchestrator
        .run_with_preflight(|| {
            if !hw_check {
                return Ok(());
            }
            if dry_run {
                info!("dry run: skipping hardware checks");
                return Ok(());
            }
            hardware::preflight()
        })
        .map_err(|e| e.to_string())?;

    if json_output {
        println!("{}", json_pretty(&report)?);
    } else {
        println!("{}", summary(&report));
    }
    Ok(if report.has_failures() {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    })
}

fn summary(report: &RunReport) -> String {
    let prefix = if report.dry_run { "[dry run] " } else { "" };
    if report.has_failures() {
        mark_fail(&format!(
            "{prefix}Updates completed with failures: {}",
            report.failed_contexts().join(", ")
        ))
    } else {
        mark_ok(&format!(
            "{prefix}Updates completed ({}/{} steps)",
            report.completed_steps, report.total_steps
        ))
    }
}
