//! Orchestration engine for uupd.
//!
//! Ties the drivers from `uupd-drivers` into a single run: takes the
//! host-wide [`InstanceLock`], builds and probes the drivers, fixes the total
//! step count, executes every enabled driver in order while a
//! [`StepTracker`] feeds the progress display, and aggregates the outcome
//! into a [`RunReport`].

pub mod concurrency;
pub mod lifecycle;
pub mod notify;
pub mod orchestrator;
pub mod progress;
pub mod report;

pub use concurrency::{InstanceLock, DEFAULT_LOCK_PATH};
pub use lifecycle::{validate_transition, Phase, PhaseMachine};
pub use notify::{Notifier, SessionNotifier};
pub use orchestrator::{Orchestrator, RunOptions};
pub use progress::{ProgressDisplay, ProgressSnapshot, StepTracker};
pub use report::{format_result, RunReport};

use std::path::PathBuf;
use thiserror::Error;
use uupd_drivers::DriverError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("another update run holds {}", .0.display())]
    AlreadyRunning(PathBuf),
    #[error("user session enumeration: {0}")]
    Sessions(#[source] DriverError),
    #[error("pre-flight check failed: {0}")]
    Preflight(String),
    #[error("no usable system update driver")]
    NoSystemDriver,
    #[error("invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
