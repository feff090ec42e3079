use crate::command::{CommandResult, Invocation};
use crate::config::{DriverConfiguration, InitConfiguration};
use crate::driver::{run_units, ProgressSink, UpdateDriver, WorkUnit};
use crate::host::Host;
use crate::prereq::BOOTC;
use crate::system::{older_than_a_month, parse_rfc3339};
use crate::DriverError;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

const NO_CHANGES_MARKER: &str = "No changes in:";

#[derive(Debug, Deserialize)]
struct BootcHost {
    #[serde(default)]
    status: HostStatus,
}

#[derive(Debug, Default, Deserialize)]
struct HostStatus {
    booted: Option<BootEntry>,
}

#[derive(Debug, Deserialize)]
struct BootEntry {
    #[serde(default)]
    incompatible: bool,
    image: Option<ImageStatus>,
}

#[derive(Debug, Deserialize)]
struct ImageStatus {
    timestamp: Option<String>,
}

/// Image-native system driver backed by `bootc`.
pub struct BootcDriver {
    config: DriverConfiguration,
    binary: PathBuf,
    host: Arc<dyn Host>,
}

impl BootcDriver {
    pub fn new(init: &InitConfiguration, host: Arc<dyn Host>) -> Result<Self, DriverError> {
        let mut config = DriverConfiguration::single_user("Bootc", "System Image", init);
        config.enabled = !init.ci;
        let binary = BOOTC.locate(&config.environment, host.as_ref(), init.dry_run)?;
        debug!("bootc binary: {}", binary.display());
        Ok(Self {
            config,
            binary,
            host,
        })
    }

    /// True when bootc manages the booted deployment. Read-only, also runs in
    /// dry-run.
    pub fn is_compatible(&self) -> Result<bool, DriverError> {
        let status = self.status()?;
        Ok(status.status.booted.is_some_and(|b| !b.incompatible))
    }

    fn status(&self) -> Result<BootcHost, DriverError> {
        let invocation = Invocation::new(&self.binary, ["status", "--format=json"]);
        let output = self.host.run(&invocation)?;
        if !output.success() {
            return Err(DriverError::ProbeFailed {
                command: invocation.to_string(),
                output: output.combined(),
            });
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

impl UpdateDriver for BootcDriver {
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
        if !output.success() {
            return Err(DriverError::ProbeFailed {
                command: invocation.to_string(),
                output: output.combined(),
            });
        }
        let text = output.combined();
        let necessary = !text.contains(NO_CHANGES_MARKER);
        debug!(necessary, "bootc update check: {}", text.trim());
        Ok(necessary)
    }

    fn outdated(&self) -> Result<bool, DriverError> {
        if self.config.dry_run {
            return Ok(false);
        }
        let status = self.status()?;
        let timestamp = status
            .status
            .booted
            .and_then(|b| b.image)
            .and_then(|i| i.timestamp);
        let Some(parsed) = timestamp.as_deref().and_then(parse_rfc3339) else {
            debug!("booted image timestamp unavailable: {timestamp:?}");
            return Ok(false);
        };
        Ok(older_than_a_month(parsed, chrono::Utc::now()))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ProcessOutput;
    use crate::driver::testing::RecordingProgress;
    use crate::mock::MockHost;

    fn status_json(timestamp: &str, incompatible: bool) -> String {
        format!(
            r#"{{"apiVersion":"org.containers.bootc/v1","kind":"BootcHost",
               "status":{{"staged":null,"booted":{{"image":{{"image":{{"image":"ghcr.io/ublue-os/bluefin:stable","transport":"registry"}},
               "version":"41.20241001","timestamp":"{timestamp}"}},"incompatible":{incompatible},"pinned":false}}}}}}"#
        )
    }

    fn driver(host: &Arc<MockHost>, dry_run: bool) -> BootcDriver {
        let init = InitConfiguration {
            dry_run,
            ..InitConfiguration::default()
        };
        let host: Arc<dyn Host> = host.clone();
        BootcDriver::new(&init, host).unwrap()
    }

    fn with_status(json: String) -> Arc<MockHost> {
        Arc::new(MockHost::new().respond(
            |inv| inv.args_start_with(&["status"]),
            ProcessOutput::ok(json),
        ))
    }

    #[test]
    fn old_image_is_outdated() {
        let host = with_status(status_json("2020-01-01T00:00:00.123456789Z", false));
        assert!(driver(&host, false).outdated().unwrap());
    }

    #[test]
    fn fresh_image_is_not_outdated() {
        let now = chrono::Utc::now().to_rfc3339();
        let host = with_status(status_json(&now, false));
        assert!(!driver(&host, false).outdated().unwrap());
    }

    #[test]
    fn dry_run_is_never_outdated() {
        let host = with_status(status_json("2020-01-01T00:00:00Z", false));
        assert!(!driver(&host, true).outdated().unwrap());
        assert!(host.invocations().is_empty());
    }

    #[test]
    fn unparseable_timestamp_is_not_outdated() {
        let host = with_status(status_json("last tuesday", false));
        assert!(!driver(&host, false).outdated().unwrap());
    }

    #[test]
    fn status_failure_propagates() {
        let host = Arc::new(MockHost::new().respond(
            |inv| inv.args_start_with(&["status"]),
            ProcessOutput::exit(1, "not booted via bootc"),
        ));
        assert!(matches!(
            driver(&host, false).outdated(),
            Err(DriverError::ProbeFailed { .. })
        ));
    }

    #[test]
    fn compatibility_probe() {
        let host = with_status(status_json("2024-10-01T04:43:01Z", false));
        assert!(driver(&host, false).is_compatible().unwrap());

        let host = with_status(status_json("2024-10-01T04:43:01Z", true));
        assert!(!driver(&host, false).is_compatible().unwrap());

        let host = with_status(r#"{"status":{"booted":null}}"#.to_owned());
        assert!(!driver(&host, false).is_compatible().unwrap());
    }

    #[test]
    fn check_detects_pending_update() {
        let host = Arc::new(MockHost::new().respond(
            |inv| inv.args_start_with(&["upgrade", "--check"]),
            ProcessOutput::ok("Update available for: docker://ghcr.io/ublue-os/bluefin:stable\n"),
        ));
        assert!(driver(&host, false).check().unwrap());

        let host = Arc::new(MockHost::new().respond(
            |inv| inv.args_start_with(&["upgrade", "--check"]),
            ProcessOutput::ok("No changes in: docker://ghcr.io/ublue-os/bluefin:stable\n"),
        ));
        assert!(!driver(&host, false).check().unwrap());
    }

    #[test]
    fn missing_binary_fails_construction() {
        let host: Arc<dyn Host> = Arc::new(MockHost::new().without_binary("/usr/bin/bootc"));
        assert!(BootcDriver::new(&InitConfiguration::default(), host).is_err());
    }

    #[test]
    fn ci_starts_disabled() {
        let init = InitConfiguration {
            ci: true,
            ..InitConfiguration::default()
        };
        let drv = BootcDriver::new(&init, Arc::new(MockHost::new())).unwrap();
        assert_eq!(drv.steps(), 0);
    }

    #[test]
    fn update_runs_upgrade() {
        let host = Arc::new(MockHost::new());
        let progress = RecordingProgress::default();
        let results = driver(&host, false).update(&progress).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].context(), "System Image");
        assert_eq!(results[0].command_line(), ["/usr/bin/bootc", "upgrade"]);
        assert_eq!(progress.labels(), ["Updating System Image (Bootc)"]);
    }
}
