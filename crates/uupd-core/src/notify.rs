use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use uupd_drivers::prereq::NOTIFY_SEND;
use uupd_drivers::{Host, Invocation, User};

pub const APP_NAME: &str = "uupd";

/// Delivers user-facing notifications (staleness warnings, failure summaries)
/// to the logged-in users of the run.
///
/// Delivery is best effort: implementations must not fail the run.
pub trait Notifier: Send + Sync {
    fn notify(&self, users: &[User], summary: &str, body: &str);
}

/// Runs `notify-send` inside every user session through the [`Host`].
pub struct SessionNotifier {
    host: Arc<dyn Host>,
    binary: PathBuf,
}

impl SessionNotifier {
    pub fn new(host: Arc<dyn Host>, environment: &HashMap<String, String>) -> Self {
        Self {
            host,
            binary: NOTIFY_SEND.resolve(environment),
        }
    }

    fn invocation(&self, user: &User, summary: &str, body: &str) -> Invocation {
        Invocation::new(&self.binary, ["--app-name", APP_NAME, summary, body]).as_user(user.uid)
    }
}

impl Notifier for SessionNotifier {
    fn notify(&self, users: &[User], summary: &str, body: &str) {
        info!("{summary}: {body}");
        for user in users {
            let invocation = self.invocation(user, summary, body);
            match self.host.run(&invocation) {
                Ok(output) if output.success() => debug!("notified {}", user.name),
                Ok(output) => debug!(
                    "notification for {} not delivered: {}",
                    user.name,
                    output.combined().trim()
                ),
                Err(e) => debug!("notification for {} not delivered: {e}", user.name),
            }
        }
    }
}
