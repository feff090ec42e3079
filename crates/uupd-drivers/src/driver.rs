use crate::command::{CommandResult, Invocation};
use crate::config::DriverConfiguration;
use crate::host::Host;
use crate::session::User;
use crate::DriverError;
use std::fmt;
use tracing::{debug, warn};

/// What is being worked on right now, as shown by the progress display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLabel {
    pub title: String,
    pub description: String,
}

impl ProgressLabel {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.to_owned(),
            description: description.to_owned(),
        }
    }
}

impl fmt::Display for ProgressLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Updating {} ({})", self.description, self.title)
    }
}

/// Receives progress events from drivers.
///
/// Every unit of work is announced with [`begin`](Self::begin) before it starts
/// and closed with [`step_done`](Self::step_done), success or not.
pub trait ProgressSink: Sync {
    fn begin(&self, label: &ProgressLabel);

    fn step_done(&self, failed: bool);
}

/// Contract every update driver satisfies.
pub trait UpdateDriver: Send {
    fn config(&self) -> &DriverConfiguration;

    fn set_enabled(&mut self, enabled: bool);

    /// Hand the user sessions to a multi-user driver. No-op for the others.
    fn set_users(&mut self, _users: &[User]) {}

    fn users(&self) -> &[User] {
        &[]
    }

    /// Units of work `update` will report: 0 when disabled, otherwise one for
    /// the system-wide pass plus one per user for multi-user drivers.
    fn steps(&self) -> usize {
        let config = self.config();
        if !config.enabled {
            return 0;
        }
        if config.multi_user {
            1 + self.users().len()
        } else {
            1
        }
    }

    /// Whether the driver should take part in this run. For system drivers
    /// this asks the tool whether an update is pending.
    fn check(&self) -> Result<bool, DriverError>;

    /// Whether the running system is more than a month old. Only system
    /// drivers can tell.
    fn outdated(&self) -> Result<bool, DriverError> {
        Ok(false)
    }

    /// Run the update. In dry-run the same progress events are emitted, no
    /// subprocess runs, and no results are returned.
    fn update(&self, progress: &dyn ProgressSink) -> Result<Vec<CommandResult>, DriverError>;
}

/// One labelled unit of update work.
#[derive(Debug, Clone)]
pub(crate) struct WorkUnit {
    pub label: ProgressLabel,
    pub invocation: Invocation,
}

impl WorkUnit {
    pub(crate) fn new(config: &DriverConfiguration, context: &str, invocation: Invocation) -> Self {
        Self {
            label: ProgressLabel::new(config.title, context),
            invocation,
        }
    }
}

/// The system-wide unit followed by one unit per user.
pub(crate) fn multi_user_units<F>(
    config: &DriverConfiguration,
    users: &[User],
    root: Invocation,
    per_user: F,
) -> Vec<WorkUnit>
where
    F: Fn(&User) -> Invocation,
{
    let mut units = Vec::with_capacity(users.len() + 1);
    units.push(WorkUnit::new(config, config.description, root));
    for user in users {
        units.push(WorkUnit::new(config, &config.user_context(user), per_user(user)));
    }
    units
}

/// Run units strictly in order. A failed unit never stops the ones after it.
pub(crate) fn run_units(
    host: &dyn Host,
    progress: &dyn ProgressSink,
    dry_run: bool,
    units: &[WorkUnit],
) -> Vec<CommandResult> {
    let mut results = Vec::new();
    for unit in units {
        progress.begin(&unit.label);
        if dry_run {
            debug!("dry run: skipping {}", unit.invocation);
            progress.step_done(false);
            continue;
        }
        let result = CommandResult::from_outcome(
            &unit.label.description,
            &unit.invocation,
            host.run(&unit.invocation),
        );
        if result.failed() {
            warn!("{} failed ({})", unit.label.description, unit.invocation);
        }
        progress.step_done(result.failed());
        results.push(result);
    }
    results
}
