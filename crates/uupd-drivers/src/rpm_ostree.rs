use crate::command::{CommandResult, Invocation};
use crate::config::{DriverConfiguration, InitConfiguration};
use crate::driver::{run_units, ProgressSink, UpdateDriver, WorkUnit};
use crate::host::Host;
use crate::prereq::RPM_OSTREE;
use crate::system::older_than_a_month;
use crate::DriverError;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Exit status of `rpm-ostree upgrade --check` when nothing is pending.
const EXIT_NO_UPDATE: i32 = 77;

#[derive(Debug, Deserialize)]
struct RpmOstreeStatus {
    #[serde(default)]
    deployments: Vec<Deployment>,
}

#[derive(Debug, Deserialize)]
struct Deployment {
    timestamp: Option<i64>,
}

/// Legacy system driver for hosts not managed by bootc.
pub struct RpmOstreeDriver {
    config: DriverConfiguration,
    binary: PathBuf,
    host: Arc<dyn Host>,
}

impl RpmOstreeDriver {
    pub fn new(init: &InitConfiguration, host: Arc<dyn Host>) -> Result<Self, DriverError> {
        let mut config = DriverConfiguration::single_user("rpm-ostree", "System", init);
        config.enabled = !init.ci;
        let binary = RPM_OSTREE.locate(&config.environment, host.as_ref(), init.dry_run)?;
        debug!("rpm-ostree binary: {}", binary.display());
        Ok(Self {
            config,
            binary,
            host,
        })
    }
}

impl UpdateDriver for RpmOstreeDriver {
    fn config(&self) -> &DriverConfiguration {
        &self.config
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    fn check(&self) -> Result<bool, DriverError> {
        if self.config.dry_run {
            return Ok(true);
        }
        let invocation = Invocation::new(&self.binary, ["upgrade", "--check"]);
        let output = self.host.run(&invocation)?;
        match output.code {
            Some(0) => Ok(true),
            Some(EXIT_NO_UPDATE) => Ok(false),
            _ => Err(DriverError::ProbeFailed {
                command: invocation.to_string(),
                output: output.combined(),
            }),
        }
    }

    fn outdated(&self) -> Result<bool, DriverError> {
        if self.config.dry_run {
            return Ok(false);
        }
        let invocation = Invocation::new(&self.binary, ["status", "--json", "--booted"]);
        let output = self.host.run(&invocation)?;
        if !output.success() {
            return Err(DriverError::ProbeFailed {
                command: invocation.to_string(),
                output: output.combined(),
            });
        }
        let status: RpmOstreeStatus = serde_json::from_slice(&output.stdout)?;
        let booted = status
            .deployments
            .first()
            .and_then(|d| d.timestamp)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
        let Some(booted) = booted else {
            debug!("booted deployment has no usable timestamp");
            return Ok(false);
        };
        Ok(older_than_a_month(booted, Utc::now()))
    }

    fn update(&self, progress: &dyn ProgressSink) -> Result<Vec<CommandResult>, DriverError> {
        let unit = WorkUnit::new(
            &self.config,
            self.config.description,
            Invocation::new(&self.binary, ["upgrade"]),
        );
        Ok(run_units(
            self.host.as_ref(),
            progress,
            self.config.dry_run,
            &[unit],
        ))
    }
}
