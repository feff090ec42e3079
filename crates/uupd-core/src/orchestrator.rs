use crate::concurrency::{InstanceLock, DEFAULT_LOCK_PATH};
use crate::lifecycle::{Phase, PhaseMachine};
use crate::notify::{Notifier, SessionNotifier};
use crate::progress::{ProgressDisplay, StepTracker};
use crate::report::RunReport;
use crate::CoreError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uupd_drivers::{
    list_users, select_system_driver, BrewDriver, CommandResult, DistroboxDriver, DriverError,
    FlatpakDriver, Host, InitConfiguration, UpdateDriver, User,
};

const STALE_IMAGE_WARNING: &str = "There hasn't been an update in over a month. Consider rebooting or running updates manually";

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    /// Running under CI; the system driver is disabled up front.
    pub ci: bool,
    /// Report every result, not only failures.
    pub verbose: bool,
    pub progress_enabled: bool,
    pub lock_path: PathBuf,
    /// Binary path overrides, see `uupd_drivers::prereq`.
    pub environment: HashMap<String, String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            ci: false,
            verbose: false,
            progress_enabled: true,
            lock_path: PathBuf::from(DEFAULT_LOCK_PATH),
            environment: HashMap::new(),
        }
    }
}

impl RunOptions {
    fn init_configuration(&self) -> InitConfiguration {
        InitConfiguration {
            dry_run: self.dry_run,
            ci: self.ci,
            environment: self.environment.clone(),
        }
    }
}

/// The drivers of one run, system driver first.
struct DriverSet {
    system: Option<Box<dyn UpdateDriver>>,
    system_name: Option<String>,
    others: Vec<Box<dyn UpdateDriver>>,
}

impl DriverSet {
    fn iter(&self) -> impl Iterator<Item = &dyn UpdateDriver> {
        self.system
            .iter()
            .chain(self.others.iter())
            .map(AsRef::as_ref)
    }

    fn total_steps(&self) -> usize {
        self.iter().map(UpdateDriver::steps).sum()
    }
}

#[derive(Debug, Default)]
struct ProbeOutcome {
    outdated: bool,
    system_update_available: bool,
}

/// Drives one complete update run.
pub struct Orchestrator {
    options: RunOptions,
    host: Arc<dyn Host>,
    notifier: Box<dyn Notifier>,
}

impl Orchestrator {
    /// Notifications go to every user session through `host` unless
    /// replaced with [`with_notifier`](Self::with_notifier).
    pub fn new(options: RunOptions, host: Arc<dyn Host>) -> Self {
        let notifier = SessionNotifier::new(Arc::clone(&host), &options.environment);
        Self {
            options,
            host,
            notifier: Box::new(notifier),
        }
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn run(&self) -> Result<RunReport, CoreError> {
        self.run_with_preflight(|| Ok(()))
    }

    /// Run every phase. `preflight` executes once the lock is held and
    /// before any driver is built; its error aborts the run.
    ///
    /// The lock is released and the display stopped on every return path, and
    /// an aborted run still ends in [`Phase::Done`].
    pub fn run_with_preflight<F>(&self, preflight: F) -> Result<RunReport, CoreError>
    where
        F: FnOnce() -> Result<(), CoreError>,
    {
        let mut phase = PhaseMachine::new();
        let outcome = self.run_phases(&mut phase, preflight);
        finish(&mut phase, outcome)
    }

    fn run_phases<F>(&self, phase: &mut PhaseMachine, preflight: F) -> Result<RunReport, CoreError>
    where
        F: FnOnce() -> Result<(), CoreError>,
    {
        let lock = InstanceLock::try_acquire(&self.options.lock_path)?;
        preflight()?;

        phase.advance(Phase::Initializing)?;
        let users = list_users(self.host.as_ref()).map_err(CoreError::Sessions)?;
        let mut drivers = self.build_drivers(&users);

        phase.advance(Phase::Probing)?;
        let probe = self.probe(&mut drivers, &users);

        phase.advance(Phase::Accounting)?;
        let tracker = Arc::new(plan_tracker(&self.options, drivers.total_steps()));
        info!("{} update step(s) planned", tracker.total());

        phase.advance(Phase::Executing)?;
        let display = self
            .options
            .progress_enabled
            .then(|| ProgressDisplay::start(Arc::clone(&tracker)));
        let results = execute(&drivers, &tracker);

        phase.advance(Phase::Reporting)?;
        if let Some(display) = display {
            display.stop();
        }
        let report = RunReport {
            dry_run: self.options.dry_run,
            system_driver: drivers.system_name.clone(),
            system_update_available: probe.system_update_available,
            outdated: probe.outdated,
            total_steps: tracker.total(),
            completed_steps: tracker.completed(),
            results,
        };
        report.log(self.options.verbose);
        if report.has_failures() && !self.options.dry_run {
            self.notifier.notify(
                &users,
                "Updates failed",
                &format!(
                    "uupd failed to update: {}, consider seeing logs with `journalctl -exu uupd.service`",
                    report.failed_contexts().join(", ")
                ),
            );
        }

        phase.advance(Phase::Done)?;
        drop(lock);
        Ok(report)
    }

    /// Ask the system driver whether an update is pending. Takes no lock.
    pub fn check_system_update(&self) -> Result<bool, CoreError> {
        Ok(self.system_driver()?.check()?)
    }

    /// Ask the system driver whether the booted image is stale. Takes no lock.
    pub fn image_outdated(&self) -> Result<bool, CoreError> {
        Ok(self.system_driver()?.outdated()?)
    }

    fn system_driver(&self) -> Result<Box<dyn UpdateDriver>, CoreError> {
        let init = InitConfiguration {
            ci: false,
            ..self.options.init_configuration()
        };
        select_system_driver(&init, &self.host)
            .driver
            .ok_or(CoreError::NoSystemDriver)
    }

    fn build_drivers(&self, users: &[User]) -> DriverSet {
        let init = self.options.init_configuration();
        let selection = select_system_driver(&init, &self.host);
        let system_name = selection
            .driver
            .as_ref()
            .map(|d| d.config().title.to_owned());

        let mut others = Vec::new();
        others.extend(constructed(
            "brew",
            BrewDriver::new(&init, Arc::clone(&self.host)),
        ));
        others.extend(constructed(
            "flatpak",
            FlatpakDriver::new(&init, Arc::clone(&self.host)),
        ));
        others.extend(constructed(
            "distrobox",
            DistroboxDriver::new(&init, Arc::clone(&self.host)),
        ));
        for driver in &mut others {
            driver.set_users(users);
        }

        DriverSet {
            system: selection.driver,
            system_name,
            others,
        }
    }

    fn probe(&self, drivers: &mut DriverSet, users: &[User]) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::default();

        if let Some(system) = drivers.system.as_mut() {
            if system.config().enabled {
                match system.outdated() {
                    Ok(true) => {
                        warn!("{STALE_IMAGE_WARNING}");
                        self.notifier
                            .notify(users, "System Warning", STALE_IMAGE_WARNING);
                        outcome.outdated = true;
                    }
                    Ok(false) => {}
                    Err(e) => warn!("unable to determine if the image is outdated: {e}"),
                }

                let title = system.config().title;
                info!("checking for system updates ({title})");
                match system.check() {
                    Ok(available) => {
                        info!("system updates available: {available} ({title})");
                        outcome.system_update_available = available;
                        system.set_enabled(available);
                    }
                    Err(e) => {
                        warn!("failed to check for system updates: {e}");
                        system.set_enabled(false);
                    }
                }
            } else {
                debug!("system driver disabled for this run");
            }
        }

        for driver in &mut drivers.others {
            let title = driver.config().title;
            match driver.check() {
                Ok(true) => {}
                Ok(false) => driver.set_enabled(false),
                Err(e) => {
                    warn!("{title} availability check failed: {e}");
                    driver.set_enabled(false);
                }
            }
        }

        outcome
    }
}

/// Close the phase machine. A run that failed before `Done` jumps there.
fn finish(
    phase: &mut PhaseMachine,
    outcome: Result<RunReport, CoreError>,
) -> Result<RunReport, CoreError> {
    if let Err(e) = &outcome {
        let aborted_in = phase.current();
        warn!("run aborted during {aborted_in}: {e}");
        if aborted_in != Phase::Done {
            phase.advance(Phase::Done)?;
        }
    }
    outcome
}

/// The tracker for a run of `total` steps. Without a progress display every
/// label is logged instead.
fn plan_tracker(options: &RunOptions, total: usize) -> StepTracker {
    StepTracker::new(total).with_label_logging(!options.progress_enabled)
}

fn constructed<D>(name: &str, driver: Result<D, DriverError>) -> Option<Box<dyn UpdateDriver>>
where
    D: UpdateDriver + 'static,
{
    match driver {
        Ok(driver) => Some(Box::new(driver)),
        Err(e) => {
            warn!("{name} disabled: {e}");
            None
        }
    }
}

/// Run every enabled driver in order. Progress always advances by the
/// driver's full step count, whatever happened inside it.
fn execute(drivers: &DriverSet, tracker: &StepTracker) -> Vec<CommandResult> {
    let mut results = Vec::new();
    for driver in drivers.iter() {
        let steps = driver.steps();
        if steps == 0 {
            continue;
        }
        let config = driver.config();
        let target = tracker.completed() + steps;
        match driver.update(tracker) {
            Ok(driver_results) => results.extend(driver_results),
            Err(e) => {
                warn!("{} update failed: {e}", config.title);
                results.push(CommandResult::driver_failure(config.description, &e));
            }
        }
        tracker.advance_to(target);
    }
    results
}
