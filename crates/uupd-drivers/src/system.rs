//! System-driver fallback selection.
//!
//! Two structurally different tools can update the OS image: `bootc`
//! (image-native) and `rpm-ostree` (legacy). Exactly one of them is chosen at
//! startup and handed out as a plain [`UpdateDriver`]; nothing downstream
//! branches on which one it got.

use crate::bootc::BootcDriver;
use crate::config::InitConfiguration;
use crate::driver::UpdateDriver;
use crate::host::Host;
use crate::rpm_ostree::RpmOstreeDriver;
use chrono::{DateTime, Months, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemDriverKind {
    ImageNative,
    Legacy,
}

impl fmt::Display for SystemDriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImageNative => f.write_str("bootc"),
            Self::Legacy => f.write_str("rpm-ostree"),
        }
    }
}

/// Outcome of fallback selection.
///
/// `driver` is `None` only when the chosen implementation itself could not be
/// constructed; the run then has no system driver at all.
pub struct SystemSelection {
    pub kind: SystemDriverKind,
    pub driver: Option<Box<dyn UpdateDriver>>,
    /// The image-native driver was constructed.
    pub image_native_constructed: bool,
    /// The image-native compatibility probe reported the host as bootc-managed.
    pub image_native_compatible: bool,
}

/// Pick the implementation from the two independent probe outcomes.
pub fn choose_system_driver(constructed: bool, compatible: bool) -> SystemDriverKind {
    if constructed && compatible {
        SystemDriverKind::ImageNative
    } else {
        SystemDriverKind::Legacy
    }
}

pub fn select_system_driver(init: &InitConfiguration, host: &Arc<dyn Host>) -> SystemSelection {
    let bootc = BootcDriver::new(init, Arc::clone(host));
    let constructed = bootc.is_ok();
    let compatible = match &bootc {
        Ok(driver) => driver.is_compatible().unwrap_or_else(|e| {
            debug!("bootc compatibility probe failed: {e}");
            false
        }),
        Err(e) => {
            debug!("bootc driver unavailable: {e}");
            false
        }
    };

    // The legacy candidate is always constructed so its failure is visible
    // even when it ends up unused.
    let legacy = RpmOstreeDriver::new(init, Arc::clone(host));

    let kind = choose_system_driver(constructed, compatible);
    info!("system driver: {kind}");
    let driver: Option<Box<dyn UpdateDriver>> = match (kind, bootc, legacy) {
        (SystemDriverKind::ImageNative, Ok(bootc), _) => Some(Box::new(bootc)),
        (SystemDriverKind::Legacy, _, Ok(legacy)) => Some(Box::new(legacy)),
        (_, _, Err(e)) => {
            warn!("no usable system driver: {e}");
            None
        }
        (SystemDriverKind::ImageNative, Err(_), Ok(_)) => None,
    };

    SystemSelection {
        kind,
        driver,
        image_native_constructed: constructed,
        image_native_compatible: compatible,
    }
}

pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// True when `timestamp` lies more than one calendar month before `now`.
pub fn older_than_a_month(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.checked_sub_months(Months::new(1))
        .is_some_and(|cutoff| timestamp < cutoff)
}
