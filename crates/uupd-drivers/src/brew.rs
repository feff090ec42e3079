use crate::command::{CommandResult, Invocation};
use crate::config::{DriverConfiguration, InitConfiguration};
use crate::driver::{run_units, ProgressSink, UpdateDriver, WorkUnit};
use crate::host::Host;
use crate::prereq::BREW;
use crate::DriverError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Used when the brew binary does not sit in `<prefix>/bin/brew`.
const DEFAULT_PREFIX: &str = "/home/linuxbrew/.linuxbrew";

/// Homebrew runs as whoever owns the installation, never as root.
pub struct BrewDriver {
    config: DriverConfiguration,
    binary: PathBuf,
    prefix: PathBuf,
    /// Owner of the brew installation; unknown in dry-run.
    owner_uid: Option<u32>,
    host: Arc<dyn Host>,
}

impl BrewDriver {
    pub fn new(init: &InitConfiguration, host: Arc<dyn Host>) -> Result<Self, DriverError> {
        let config = DriverConfiguration::single_user("Brew", "CLI Apps", init);
        let binary = BREW.locate(&config.environment, host.as_ref(), init.dry_run)?;
        let owner_uid = if init.dry_run {
            None
        } else {
            Some(host.owner_uid(&binary)?)
        };
        let prefix = prefix_of(&binary);
        debug!(
            "brew binary: {} (prefix {}, owner {owner_uid:?})",
            binary.display(),
            prefix.display()
        );
        Ok(Self {
            config,
            binary,
            prefix,
            owner_uid,
            host,
        })
    }

    fn invocation(&self) -> Invocation {
        let prefix = self.prefix.to_string_lossy();
        let invocation = Invocation::new(&self.binary, ["upgrade"])
            .with_env("HOMEBREW_PREFIX", prefix.to_string())
            .with_env("HOMEBREW_REPOSITORY", format!("{prefix}/Homebrew"))
            .with_env("HOMEBREW_CELLAR", format!("{prefix}/Cellar"));
        match self.owner_uid {
            Some(uid) => invocation.as_user(uid),
            None => invocation,
        }
    }
}

/// `<prefix>/bin/brew` -> `<prefix>`.
fn prefix_of(binary: &Path) -> PathBuf {
    binary
        .parent()
        .filter(|bin| bin.file_name().is_some_and(|n| n == "bin"))
        .and_then(Path::parent)
        .map_or_else(|| PathBuf::from(DEFAULT_PREFIX), Path::to_path_buf)
}

impl UpdateDriver for BrewDriver {
    fn config(&self) -> &DriverConfiguration {
        &self.config
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    fn check(&self) -> Result<bool, DriverError> {
        Ok(true)
    }

    fn update(&self, progress: &dyn ProgressSink) -> Result<Vec<CommandResult>, DriverError> {
        let unit = WorkUnit::new(&self.config, self.config.description, self.invocation());
        Ok(run_units(
            self.host.as_ref(),
            progress,
            self.config.dry_run,
            &[unit],
        ))
    }
}
