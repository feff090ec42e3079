use super::{json_pretty, mark_fail, mark_ok, mark_warn, EXIT_FAILURE, EXIT_SUCCESS};
use serde::Serialize;
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::{debug, info};
use uupd_core::CoreError;

const POWER_SUPPLY_DIR: &str = "/sys/class/power_supply";
const LOADAVG: &str = "/proc/loadavg";
const MEMINFO: &str = "/proc/meminfo";

pub const MIN_BATTERY_PERCENT: u8 = 20;
pub const MAX_LOAD_PERCENT: f64 = 50.0;
pub const MAX_MEMORY_PERCENT: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Fail,
    Warn,
}

#[derive(Debug, Clone, Serialize)]
pub struct Check {
    name: &'static str,
    status: Status,
    message: String,
}

impl Check {
    fn pass(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            status: Status::Pass,
            message: message.into(),
        }
    }

    fn fail(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            status: Status::Fail,
            message: message.into(),
        }
    }

    fn warn(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            status: Status::Warn,
            message: message.into(),
        }
    }

    fn failed(&self) -> bool {
        self.status == Status::Fail
    }
}

/// `uupd hw-check`
pub fn run(json_output: bool) -> Result<u8, String> {
    let checks = run_checks();
    let all_pass = !checks.iter().any(Check::failed);

    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks,
        });
        println!("{}", json_pretty(&json)?);
    } else {
        for check in &checks {
            let line = match check.status {
                Status::Pass => mark_ok(&check.message),
                Status::Fail => mark_fail(&check.message),
                Status::Warn => mark_warn(&check.message),
            };
            println!("  {line}");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

/// Run every check; any failure aborts the update run.
pub fn preflight() -> Result<(), CoreError> {
    let failures: Vec<String> = run_checks()
        .into_iter()
        .filter(Check::failed)
        .map(|c| c.message)
        .collect();
    if failures.is_empty() {
        info!("hardware checks passed");
        Ok(())
    } else {
        Err(CoreError::Preflight(failures.join("; ")))
    }
}

fn run_checks() -> Vec<Check> {
    let cpus = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    vec![
        check_battery(Path::new(POWER_SUPPLY_DIR)),
        check_load(fs::read_to_string(LOADAVG).ok().as_deref(), cpus),
        check_memory(fs::read_to_string(MEMINFO).ok().as_deref()),
    ]
}

fn read_attr(dir: &Path, attr: &str) -> Option<String> {
    fs::read_to_string(dir.join(attr))
        .ok()
        .map(|s| s.trim().to_owned())
}

/// Every battery that is discharging must hold at least
/// [`MIN_BATTERY_PERCENT`].
fn check_battery(power_supply: &Path) -> Check {
    let Ok(entries) = fs::read_dir(power_supply) else {
        return Check::pass("battery", "No power supply information (assuming AC power)");
    };

    let mut batteries = 0;
    let mut low = Vec::new();
    for entry in entries.flatten() {
        let dir = entry.path();
        if read_attr(&dir, "type").as_deref() != Some("Battery") {
            continue;
        }
        batteries += 1;
        let status = read_attr(&dir, "status").unwrap_or_default();
        let capacity = read_attr(&dir, "capacity").and_then(|c| c.parse::<u8>().ok());
        debug!(
            "battery {}: status {status}, capacity {capacity:?}",
            dir.display()
        );
        if status != "Discharging" {
            continue;
        }
        if let Some(capacity) = capacity.filter(|c| *c < MIN_BATTERY_PERCENT) {
            low.push(format!(
                "{} at {capacity}%",
                entry.file_name().to_string_lossy()
            ));
        }
    }

    if !low.is_empty() {
        return Check::fail(
            "battery",
            format!(
                "Battery too low to update while discharging: {} (minimum {MIN_BATTERY_PERCENT}%)",
                low.join(", ")
            ),
        );
    }
    if batteries == 0 {
        Check::pass("battery", "No battery present")
    } else {
        Check::pass("battery", "Battery level OK")
    }
}

/// 1-minute load average relative to the number of CPUs, in percent.
fn load_percent(loadavg: &str, cpus: usize) -> Option<f64> {
    let one_minute: f64 = loadavg.split_whitespace().next()?.parse().ok()?;
    let cpus = cpus.max(1) as f64;
    Some(one_minute / cpus * 100.0)
}

fn check_load(loadavg: Option<&str>, cpus: usize) -> Check {
    match loadavg.and_then(|l| load_percent(l, cpus)) {
        Some(pct) if pct >= MAX_LOAD_PERCENT => Check::fail(
            "cpu_load",
            format!("CPU load too high: {pct:.0}% (maximum {MAX_LOAD_PERCENT:.0}%)"),
        ),
        Some(pct) => Check::pass("cpu_load", format!("CPU load {pct:.0}%")),
        None => Check::warn("cpu_load", "Cannot read the load average"),
    }
}

fn meminfo_kb(meminfo: &str, key: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.strip_prefix(':')?;
        rest.split_whitespace().next()?.parse().ok()
    })
}

/// Used memory (`MemTotal - MemAvailable`) as a percentage of `MemTotal`.
fn memory_used_percent(meminfo: &str) -> Option<f64> {
    let total = meminfo_kb(meminfo, "MemTotal")?;
    let available = meminfo_kb(meminfo, "MemAvailable")?;
    if total == 0 {
        return None;
    }
    let used = total.saturating_sub(available) as f64 / total as f64;
    Some(used * 100.0)
}

fn check_memory(meminfo: Option<&str>) -> Check {
    match meminfo.and_then(memory_used_percent) {
        Some(pct) if pct >= MAX_MEMORY_PERCENT => Check::fail(
            "memory",
            format!("Memory usage too high: {pct:.0}% (maximum {MAX_MEMORY_PERCENT:.0}%)"),
        ),
        Some(pct) => Check::pass("memory", format!("Memory usage {pct:.0}%")),
        None => Check::warn("memory", "Cannot read memory information"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery(root: &Path, name: &str, status: &str, capacity: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("type"), "Battery\n").unwrap();
        fs::write(dir.join("status"), format!("{status}\n")).unwrap();
        fs::write(dir.join("capacity"), format!("{capacity}\n")).unwrap();
    }

    fn mains(root: &Path) {
        let dir = root.join("AC");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("type"), "Mains\n").unwrap();
        fs::write(dir.join("online"), "1\n").unwrap();
    }

    #[test]
    fn low_discharging_battery_fails() {
        let dir = tempfile::tempdir().unwrap();
        mains(dir.path());
        battery(dir.path(), "BAT0", "Discharging", "12");
        let check = check_battery(dir.path());
        assert!(check.failed());
        assert!(check.message.contains("BAT0 at 12%"));
    }

    #[test]
    fn low_charging_battery_passes() {
        let dir = tempfile::tempdir().unwrap();
        battery(dir.path(), "BAT0", "Charging", "5");
        assert!(!check_battery(dir.path()).failed());
    }

    #[test]
    fn threshold_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        battery(dir.path(), "BAT0", "Discharging", "20");
        assert!(!check_battery(dir.path()).failed());
    }

    #[test]
    fn any_low_battery_fails() {
        let dir = tempfile::tempdir().unwrap();
        battery(dir.path(), "BAT0", "Discharging", "80");
        battery(dir.path(), "BAT1", "Discharging", "3");
        assert!(check_battery(dir.path()).failed());
    }

    #[test]
    fn no_power_supply_passes() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!check_battery(&dir.path().join("missing")).failed());
        mains(dir.path());
        let check = check_battery(dir.path());
        assert_eq!(check.status, Status::Pass);
        assert_eq!(check.message, "No battery present");
    }

    #[test]
    fn load_relative_to_cpus() {
        let loadavg = "2.00 1.50 1.00 3/512 12345\n";
        assert_eq!(load_percent(loadavg, 8), Some(25.0));
        assert_eq!(load_percent(loadavg, 4), Some(50.0));
        assert!(load_percent("garbage", 4).is_none());
    }

    #[test]
    fn high_load_fails() {
        assert!(check_load(Some("6.0 1.0 1.0 1/1 1"), 8).failed());
        assert!(!check_load(Some("1.0 1.0 1.0 1/1 1"), 8).failed());
        assert_eq!(check_load(None, 8).status, Status::Warn);
    }

    const MEMINFO_SAMPLE: &str = "MemTotal:       16000000 kB\n\
                                  MemFree:         1000000 kB\n\
                                  MemAvailable:    4000000 kB\n\
                                  Buffers:          200000 kB\n";

    #[test]
    fn memory_percent_from_available() {
        assert_eq!(memory_used_percent(MEMINFO_SAMPLE), Some(75.0));
        assert!(!check_memory(Some(MEMINFO_SAMPLE)).failed());
    }

    #[test]
    fn high_memory_fails() {
        let meminfo = "MemTotal: 1000 kB\nMemAvailable: 50 kB\n";
        assert!(check_memory(Some(meminfo)).failed());
    }

    #[test]
    fn incomplete_meminfo_warns() {
        let check = check_memory(Some("MemTotal: 1000 kB\n"));
        assert_eq!(check.status, Status::Warn);
        assert_eq!(meminfo_kb("MemTotalX: 5 kB\nMemTotal: 7 kB", "MemTotal"), Some(7));
    }
}
