use crate::command::{CommandResult, Invocation};
use crate::config::{DriverConfiguration, InitConfiguration};
use crate::driver::{multi_user_units, run_units, ProgressSink, UpdateDriver};
use crate::host::Host;
use crate::prereq::DISTROBOX;
use crate::session::User;
use crate::DriverError;
use std::path::PathBuf;
use std::sync::Arc;

/// Rootful boxes first, then each user's boxes.
///
/// distrobox refuses to run under sudo, so even the rootful pass goes
/// through a uid 0 `systemd-run` session.
pub struct DistroboxDriver {
    config: DriverConfiguration,
    binary: PathBuf,
    users: Vec<User>,
    host: Arc<dyn Host>,
}

impl DistroboxDriver {
    pub fn new(init: &InitConfiguration, host: Arc<dyn Host>) -> Result<Self, DriverError> {
        let config = DriverConfiguration::multi_user(
            "Distrobox",
            "Rootful Distroboxes",
            "Distroboxes for User:",
            init,
        );
        let binary = DISTROBOX.locate(&config.environment, host.as_ref(), init.dry_run)?;
        Ok(Self {
            config,
            binary,
            users: Vec::new(),
            host,
        })
    }
}

impl UpdateDriver for DistroboxDriver {
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
        let upgrade = |uid| Invocation::new(&self.binary, ["upgrade", "-a"]).as_user(uid);
        let units = multi_user_units(&self.config, &self.users, upgrade(0), |user| {
            upgrade(user.uid)
        });
        Ok(run_units(
            self.host.as_ref(),
            progress,
            self.config.dry_run,
            &units,
        ))
    }
}
