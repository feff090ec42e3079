use crate::host::Host;
use crate::DriverError;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// A compiled-in binary location and the variable that may override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinarySpec {
    pub name: &'static str,
    pub env_var: &'static str,
    pub default_path: &'static str,
}

pub const BOOTC: BinarySpec = BinarySpec {
    name: "bootc",
    env_var: "UUPD_BOOTC_BINARY",
    default_path: "/usr/bin/bootc",
};

pub const RPM_OSTREE: BinarySpec = BinarySpec {
    name: "rpm-ostree",
    env_var: "UUPD_RPMOSTREE_BINARY",
    default_path: "/usr/bin/rpm-ostree",
};

pub const BREW: BinarySpec = BinarySpec {
    name: "brew",
    env_var: "UUPD_BREW_BINARY",
    default_path: "/home/linuxbrew/.linuxbrew/bin/brew",
};

pub const FLATPAK: BinarySpec = BinarySpec {
    name: "flatpak",
    env_var: "UUPD_FLATPAK_BINARY",
    default_path: "/usr/bin/flatpak",
};

pub const DISTROBOX: BinarySpec = BinarySpec {
    name: "distrobox",
    env_var: "UUPD_DISTROBOX_BINARY",
    default_path: "/usr/bin/distrobox",
};

pub const NOTIFY_SEND: BinarySpec = BinarySpec {
    name: "notify-send",
    env_var: "UUPD_NOTIFY_SEND_BINARY",
    default_path: "/usr/bin/notify-send",
};

impl fmt::Display for BinarySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, override with {})",
            self.name, self.default_path, self.env_var
        )
    }
}

impl BinarySpec {
    /// The override from `environment` when set and non-empty, else the default.
    pub fn resolve(&self, environment: &HashMap<String, String>) -> PathBuf {
        match environment.get(self.env_var) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(self.default_path),
        }
    }

    /// Resolve and, outside dry-run, require the binary to be present.
    pub fn locate(
        &self,
        environment: &HashMap<String, String>,
        host: &dyn Host,
        dry_run: bool,
    ) -> Result<PathBuf, DriverError> {
        let path = self.resolve(environment);
        if !dry_run && !host.is_installed(&path) {
            return Err(DriverError::BinaryMissing(path));
        }
        Ok(path)
    }
}
