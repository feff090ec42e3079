use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use uupd_core::{CoreError, InstanceLock, Notifier, Orchestrator, RunOptions};
use uupd_drivers::{CommandResult, Host, MockHost, ProcessOutput, RunAs, User};

const BOOTC_COMPATIBLE: &str =
    r#"{"status":{"booted":{"incompatible":false,"image":{"timestamp":"2099-01-01T00:00:00Z"}}}}"#;
const BOOTC_STALE: &str =
    r#"{"status":{"booted":{"incompatible":false,"image":{"timestamp":"2020-01-01T00:00:00Z"}}}}"#;

#[derive(Clone, Default)]
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    fn summaries(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, _users: &[User], summary: &str, _body: &str) {
        self.sent.lock().unwrap().push(summary.to_owned());
    }
}

fn options(dir: &Path) -> RunOptions {
    RunOptions {
        progress_enabled: false,
        lock_path: dir.join("uupd.lock"),
        ..RunOptions::default()
    }
}

fn orchestrator(host: &Arc<MockHost>, options: RunOptions) -> Orchestrator {
    let host: Arc<dyn Host> = host.clone();
    Orchestrator::new(options, host)
}

fn bootc_host(status: &'static str) -> MockHost {
    MockHost::new().respond(
        |inv| inv.program().ends_with("bootc") && inv.args_start_with(&["status"]),
        ProcessOutput::ok(status),
    )
}

fn contexts(results: &[CommandResult]) -> Vec<&str> {
    results.iter().map(CommandResult::context).collect()
}

// One single-user driver, one multi-user driver with three sessions, no
// system driver: 1 + (1 + 3) steps.
#[test]
fn two_drivers_three_users_one_failure() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(
        MockHost::new()
            .with_users(&[(1000, "alice"), (1001, "bob"), (1002, "carol")])
            .without_binary("/usr/bin/distrobox")
            .respond(
                |inv| inv.program().ends_with("flatpak") && inv.run_as == RunAs::User(1001),
                ProcessOutput::exit(1, "error: bob's remote is gone"),
            ),
    );
    let opts = RunOptions {
        ci: true,
        ..options(dir.path())
    };

    let report = orchestrator(&host, opts).run().unwrap();

    assert_eq!(report.total_steps, 5);
    assert_eq!(report.completed_steps, 5);
    assert_eq!(report.failures().len(), 1);
    assert_eq!(report.failures()[0].context(), "Apps for User: bob");
    assert_eq!(
        contexts(&report.results),
        [
            "CLI Apps",
            "System Apps",
            "Apps for User: alice",
            "Apps for User: bob",
            "Apps for User: carol",
        ]
    );
}

#[test]
fn full_run_order_system_first() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(bootc_host(BOOTC_COMPATIBLE).with_users(&[(1000, "alice")]));

    let report = orchestrator(&host, options(dir.path())).run().unwrap();

    assert_eq!(report.system_driver.as_deref(), Some("Bootc"));
    assert!(report.system_update_available);
    assert_eq!(
        contexts(&report.results),
        [
            "System Image",
            "CLI Apps",
            "System Apps",
            "Apps for User: alice",
            "Rootful Distroboxes",
            "Distroboxes for User: alice",
        ]
    );
    assert_eq!(report.total_steps, 6);
    assert_eq!(report.completed_steps, 6);
    assert!(!report.has_failures());
}

#[test]
fn dry_run_runs_no_mutating_commands() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(MockHost::new().with_users(&[(1000, "alice"), (1001, "bob")]));
    let opts = RunOptions {
        dry_run: true,
        ..options(dir.path())
    };

    let report = orchestrator(&host, opts).run().unwrap();

    assert!(report.results.is_empty());
    assert!(host.mutating_invocations().is_empty());
    // rpm-ostree fallback + brew + flatpak (1 + 2) + distrobox (1 + 2)
    assert_eq!(report.total_steps, 8);
    assert_eq!(report.completed_steps, report.total_steps);
    assert!(!report.outdated);
}

#[test]
fn total_steps_match_enabled_drivers() {
    for user_count in 0..4u32 {
        for distrobox_installed in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let users: Vec<(u32, String)> = (0..user_count)
                .map(|i| (1000 + i, format!("user{i}")))
                .collect();
            let user_refs: Vec<(u32, &str)> =
                users.iter().map(|(uid, n)| (*uid, n.as_str())).collect();
            let mut mock = MockHost::new().with_users(&user_refs);
            if !distrobox_installed {
                mock = mock.without_binary("/usr/bin/distrobox");
            }
            let host = Arc::new(mock);
            let opts = RunOptions {
                ci: true,
                ..options(dir.path())
            };

            let report = orchestrator(&host, opts).run().unwrap();

            let per_multi_user = 1 + user_count as usize;
            let expected = 1 + per_multi_user + usize::from(distrobox_installed) * per_multi_user;
            assert_eq!(report.total_steps, expected);
            assert_eq!(report.completed_steps, expected);
            assert_eq!(report.results.len(), expected);
        }
    }
}

#[test]
fn held_lock_aborts_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let opts = options(dir.path());
    let _held = InstanceLock::try_acquire(&opts.lock_path).unwrap();
    let host = Arc::new(MockHost::new());

    let err = orchestrator(&host, opts).run().unwrap_err();

    assert!(matches!(err, CoreError::AlreadyRunning(_)));
    assert!(host.invocations().is_empty());
}

#[test]
fn failed_preflight_aborts_and_releases_lock() {
    let dir = tempfile::tempdir().unwrap();
    let opts = options(dir.path());
    let lock_path = opts.lock_path.clone();
    let host = Arc::new(MockHost::new());

    let err = orchestrator(&host, opts)
        .run_with_preflight(|| Err(CoreError::Preflight("battery at 5%".to_owned())))
        .unwrap_err();

    assert!(matches!(err, CoreError::Preflight(_)));
    assert!(host.invocations().is_empty());
    assert!(InstanceLock::try_acquire(&lock_path).is_ok());
}

#[test]
fn session_enumeration_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(MockHost::new().respond(
        |inv| inv.program().ends_with("loginctl"),
        ProcessOutput::exit(1, "Failed to connect to bus"),
    ));

    let err = orchestrator(&host, options(dir.path())).run().unwrap_err();

    assert!(matches!(err, CoreError::Sessions(_)));
    assert!(host.mutating_invocations().is_empty());
}

#[test]
fn no_pending_system_update_skips_system_driver() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(bootc_host(BOOTC_COMPATIBLE).respond(
        |inv| inv.args_start_with(&["upgrade", "--check"]),
        ProcessOutput::ok("No changes in: docker://ghcr.io/ublue-os/bluefin:stable"),
    ));

    let report = orchestrator(&host, options(dir.path())).run().unwrap();

    assert!(!report.system_update_available);
    assert!(!contexts(&report.results).contains(&"System Image"));
    assert_eq!(report.total_steps, 3);
}

#[test]
fn system_check_error_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(bootc_host(BOOTC_COMPATIBLE).respond(
        |inv| inv.args_start_with(&["upgrade", "--check"]),
        ProcessOutput::exit(1, "error: registry unreachable"),
    ));

    let report = orchestrator(&host, options(dir.path())).run().unwrap();

    assert!(!report.system_update_available);
    assert_eq!(contexts(&report.results), ["CLI Apps", "System Apps", "Rootful Distroboxes"]);
}

#[test]
fn stale_image_warns_and_still_updates() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(bootc_host(BOOTC_STALE));
    let notifier = RecordingNotifier::default();

    let report = orchestrator(&host, options(dir.path()))
        .with_notifier(Box::new(notifier.clone()))
        .run()
        .unwrap();

    assert!(report.outdated);
    assert_eq!(notifier.summaries(), ["System Warning"]);
    assert_eq!(report.results[0].context(), "System Image");
}

#[test]
fn stale_image_notifies_every_session() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(bootc_host(BOOTC_STALE).with_users(&[(1000, "alice"), (1001, "bob")]));

    let report = orchestrator(&host, options(dir.path())).run().unwrap();

    assert!(report.outdated);
    let notifications: Vec<_> = host
        .invocations()
        .into_iter()
        .filter(|inv| inv.program().ends_with("notify-send"))
        .collect();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0].run_as, RunAs::User(1000));
    assert_eq!(notifications[1].run_as, RunAs::User(1001));
    for notification in &notifications {
        assert!(notification.args_start_with(&["--app-name", "uupd", "System Warning"]));
    }
}

#[test]
fn failure_summary_reaches_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(
        MockHost::new()
            .with_users(&[(1000, "alice")])
            .failing_program("brew"),
    );
    let opts = RunOptions {
        ci: true,
        ..options(dir.path())
    };

    orchestrator(&host, opts).run().unwrap();

    let notifications: Vec<_> = host
        .invocations()
        .into_iter()
        .filter(|inv| inv.program().ends_with("notify-send"))
        .collect();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].args()[2], "Updates failed");
    assert!(notifications[0].args()[3].contains("CLI Apps"));
}

#[test]
fn dry_run_sends_no_notifications() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(
        bootc_host(BOOTC_STALE)
            .with_users(&[(1000, "alice")])
            .failing_program("flatpak"),
    );
    let opts = RunOptions {
        dry_run: true,
        ..options(dir.path())
    };

    orchestrator(&host, opts).run().unwrap();

    assert!(host
        .invocations()
        .iter()
        .all(|inv| !inv.program().ends_with("notify-send")));
}

#[test]
fn failures_are_notified_once() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(
        MockHost::new()
            .with_users(&[(1000, "alice")])
            .failing_program("distrobox"),
    );
    let notifier = RecordingNotifier::default();
    let opts = RunOptions {
        ci: true,
        ..options(dir.path())
    };

    let report = orchestrator(&host, opts)
        .with_notifier(Box::new(notifier.clone()))
        .run()
        .unwrap();

    assert_eq!(report.failures().len(), 2);
    assert_eq!(report.completed_steps, report.total_steps);
    assert_eq!(notifier.summaries(), ["Updates failed"]);
}

#[test]
fn binary_overrides_reach_drivers() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(MockHost::new().without_binary("/usr/bin/flatpak"));
    let opts = RunOptions {
        ci: true,
        environment: HashMap::from([(
            "UUPD_FLATPAK_BINARY".to_owned(),
            "/opt/flatpak/bin/flatpak".to_owned(),
        )]),
        ..options(dir.path())
    };

    let report = orchestrator(&host, opts).run().unwrap();

    let flatpak = report
        .results
        .iter()
        .find(|r| r.context() == "System Apps")
        .unwrap();
    assert_eq!(flatpak.command_line()[0], "/opt/flatpak/bin/flatpak");
}

#[test]
fn update_check_and_outdated_queries() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(bootc_host(BOOTC_STALE));
    let orch = orchestrator(&host, options(dir.path()));

    assert!(orch.check_system_update().unwrap());
    assert!(orch.image_outdated().unwrap());
}
