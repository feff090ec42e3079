use std::collections::HashMap;
use std::sync::Arc;
use uupd_core::{Notifier, SessionNotifier};
use uupd_drivers::{Host, MockHost, SystemHost};

/// The host commands run against, plus whether it is the scripted one.
pub struct SelectedHost {
    pub host: Arc<dyn Host>,
    pub mocked: bool,
}

impl SelectedHost {
    /// Per-session notifications through the host. Scripted hosts never
    /// fall back to the caller's own desktop.
    pub fn notifier(&self, environment: &HashMap<String, String>) -> Box<dyn Notifier> {
        let host = Arc::clone(&self.host);
        if self.mocked {
            Box::new(SessionNotifier::new(host, environment))
        } else {
            Box::new(crate::notify::DesktopNotifier::new(host, environment))
        }
    }
}

/// `UUPD_HOST=mock` swaps in a [`MockHost`] configured from
/// `UUPD_MOCK_USERS` (`uid:name,...`) and `UUPD_MOCK_FAIL` (comma-separated
/// program names that exit 1).
pub fn select(env: &HashMap<String, String>) -> Result<SelectedHost, String> {
    match env.get("UUPD_HOST").map(String::as_str) {
        None | Some("" | "system") => Ok(SelectedHost {
            host: Arc::new(SystemHost::new()),
            mocked: false,
        }),
        Some("mock") => Ok(SelectedHost {
            host: Arc::new(mock_from_env(env)?),
            mocked: true,
        }),
        Some(other) => Err(format!("unknown UUPD_HOST '{other}' (expected 'system' or 'mock')")),
    }
}

fn mock_from_env(env: &HashMap<String, String>) -> Result<MockHost, String> {
    let users = parse_mock_users(env.get("UUPD_MOCK_USERS").map_or("", String::as_str))?;
    let user_refs: Vec<(u32, &str)> = users.iter().map(|(uid, n)| (*uid, n.as_str())).collect();
    let mut host = MockHost::new().with_users(&user_refs);
    if let Some(failing) = env.get("UUPD_MOCK_FAIL") {
        for program in failing.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            host = host.failing_program(program);
        }
    }
    Ok(host)
}

fn parse_mock_users(value: &str) -> Result<Vec<(u32, String)>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (uid, name) = entry
                .split_once(':')
                .ok_or_else(|| format!("invalid UUPD_MOCK_USERS entry '{entry}' (expected uid:name)"))?;
            let uid = uid
                .parse::<u32>()
                .map_err(|e| format!("invalid uid in UUPD_MOCK_USERS entry '{entry}': {e}"))?;
            Ok((uid, name.to_owned()))
        })
        .collect()
}
