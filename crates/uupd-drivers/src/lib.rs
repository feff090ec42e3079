//! Update drivers and host integration for uupd.
//!
//! Every tool uupd knows how to update (bootc or rpm-ostree for the system
//! image, brew, flatpak, distrobox) is wrapped behind the [`UpdateDriver`]
//! trait. Drivers never spawn processes directly: they describe an
//! [`Invocation`] and hand it to a [`Host`], which is either the real machine
//! ([`SystemHost`]) or a scripted [`MockHost`].

pub mod bootc;
pub mod brew;
pub mod command;
pub mod config;
pub mod distrobox;
pub mod driver;
pub mod flatpak;
pub mod host;
pub mod mock;
pub mod prereq;
pub mod rpm_ostree;
pub mod session;
pub mod system;

pub use bootc::BootcDriver;
pub use brew::BrewDriver;
pub use command::{CommandResult, Invocation, ProcessOutput, RunAs};
pub use config::{DriverConfiguration, InitConfiguration};
pub use distrobox::DistroboxDriver;
pub use driver::{ProgressLabel, ProgressSink, UpdateDriver};
pub use flatpak::FlatpakDriver;
pub use host::{Host, SystemHost};
pub use mock::MockHost;
pub use rpm_ostree::RpmOstreeDriver;
pub use session::{list_users, User};
pub use system::{choose_system_driver, select_system_driver, SystemDriverKind, SystemSelection};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("binary not installed: {}", .0.display())]
    BinaryMissing(PathBuf),
    #[error("'{command}' failed: {output}")]
    ProbeFailed { command: String, output: String },
    #[error("failed to decode tool output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to list user sessions: {0}")]
    Sessions(String),
}
