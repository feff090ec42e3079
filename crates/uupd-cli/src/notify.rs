use notify_rust::{Notification, Timeout};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uupd_core::notify::APP_NAME;
use uupd_core::{Notifier, SessionNotifier};
use uupd_drivers::{Host, User};

const TIMEOUT_MS: u32 = 5000;

/// Notifies every logged-in session through `notify-send`; with no session to
/// reach, falls back to the caller's own notification service.
pub struct DesktopNotifier {
    sessions: SessionNotifier,
}

impl DesktopNotifier {
    pub fn new(host: Arc<dyn Host>, environment: &HashMap<String, String>) -> Self {
        Self {
            sessions: SessionNotifier::new(host, environment),
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, users: &[User], summary: &str, body: &str) {
        if !users.is_empty() {
            self.sessions.notify(users, summary, body);
            return;
        }
        let shown = Notification::new()
            .appname(APP_NAME)
            .summary(summary)
            .body(body)
            .icon("software-update-available")
            .timeout(Timeout::Milliseconds(TIMEOUT_MS))
            .show();
        if let Err(e) = shown {
            debug!("notification '{summary}' not delivered: {e}");
        }
    }
}
