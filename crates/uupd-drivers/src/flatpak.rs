use crate::command::{CommandResult, Invocation};
use crate::config::{DriverConfiguration, InitConfiguration};
use crate::driver::{multi_user_units, run_units, ProgressSink, UpdateDriver};
use crate::host::Host;
use crate::prereq::FLATPAK;
use crate::session::User;
use crate::DriverError;
use std::path::PathBuf;
use std::sync::Arc;

/// System-wide flatpak installation first, then each user's.
pub struct FlatpakDriver {
    config: DriverConfiguration,
    binary: PathBuf,
    users: Vec<User>,
    host: Arc<dyn Host>,
}

impl FlatpakDriver {
    pub fn new(init: &InitConfiguration, host: Arc<dyn Host>) -> Result<Self, DriverError> {
        let config =
            DriverConfiguration::multi_user("Flatpak", "System Apps", "Apps for User:", init);
        let binary = FLATPAK.locate(&config.environment, host.as_ref(), init.dry_run)?;
        Ok(Self {
            config,
            binary,
            users: Vec::new(),
            host,
        })
    }
}

impl UpdateDriver for FlatpakDriver {
    fn config(&self) -> &DriverConfiguration {
        &self.config
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    fn set_users(&mut self, users: &[User]) {
        self.users = users.to_vec();
    }

    fn users(&self) -> &[User] {
        &self.users
    }

    fn check(&self) -> Result<bool, DriverError> {
        Ok(true)
    }

    fn update(&self, progress: &dyn ProgressSink) -> Result<Vec<CommandResult>, DriverError> {
        let update = || Invocation::new(&self.binary, ["update", "-y"]);
        let units = multi_user_units(&self.config, &self.users, update(), |user| {
            update().as_user(user.uid)
        });
        Ok(run_units(
            self.host.as_ref(),
            progress,
            self.config.dry_run,
            &units,
        ))
    }
}
