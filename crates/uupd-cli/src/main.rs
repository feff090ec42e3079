mod commands;
mod host;
mod notify;

use clap::{Parser, Subcommand};
use commands::{EXIT_ALREADY_RUNNING, EXIT_FAILURE, EXIT_PREFLIGHT};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use uupd_core::{RunOptions, DEFAULT_LOCK_PATH};
use uupd_drivers::InitConfiguration;

#[derive(Debug, Parser)]
#[command(
    name = "uupd",
    version,
    about = "Update the system image, CLI apps, flatpaks and distroboxes in one run"
)]
struct Cli {
    /// Go through every phase without running any update command.
    #[arg(long, default_value_t = false, global = true)]
    dry_run: bool,

    /// Check battery, CPU load and memory before updating.
    #[arg(long, default_value_t = false, global = true)]
    hw_check: bool,

    /// Report every command result instead of failures only.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Do not draw the progress bar; log each step instead.
    #[arg(long, default_value_t = false, global = true)]
    no_progress: bool,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Update everything (the default).
    Update,
    /// Report whether the system driver has a pending update.
    UpdateCheck,
    /// Report whether the booted image is more than a month old.
    ImageOutdated,
    /// Run the hardware checks only.
    HwCheck,
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("UUPD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let root = running_as_root();
    let init = InitConfiguration::from_process_env(cli.dry_run, ci_detected());
    let host = match host::select(&init.environment) {
        Ok(host) => host,
        Err(msg) => {
            eprintln!("error: {msg}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let options = RunOptions {
        dry_run: init.dry_run,
        ci: init.ci,
        verbose: cli.verbose,
        progress_enabled: !cli.no_progress && !cli.json,
        lock_path: lock_path(
            &init.environment,
            init.dry_run && !root,
            std::env::var("XDG_RUNTIME_DIR").ok().as_deref(),
        ),
        environment: init.environment,
    };

    let result = match cli.command.unwrap_or(Commands::Update) {
        Commands::Update => {
            if !cli.dry_run && !host.mocked && !root {
                eprintln!("error: uupd must be run as root (or with --dry-run)");
                return ExitCode::from(EXIT_FAILURE);
            }
            commands::update::run(options, &host, cli.hw_check, cli.json)
        }
        Commands::UpdateCheck => commands::query::update_check(options, &host, cli.json),
        Commands::ImageOutdated => commands::query::image_outdated(options, &host, cli.json),
        Commands::HwCheck => commands::hardware::run(cli.json),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("another update run") {
                EXIT_ALREADY_RUNNING
            } else if msg.starts_with("pre-flight check failed")
                || msg.starts_with("user session enumeration")
            {
                EXIT_PREFLIGHT
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

/// `UUPD_LOCK_FILE` when set. Unprivileged dry runs cannot create the lock
/// under /run, so they lock in the caller's runtime directory instead.
fn lock_path(
    environment: &HashMap<String, String>,
    unprivileged_dry_run: bool,
    runtime_dir: Option<&str>,
) -> PathBuf {
    if let Some(path) = environment.get("UUPD_LOCK_FILE").filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    match runtime_dir.filter(|d| !d.is_empty()) {
        Some(dir) if unprivileged_dry_run => PathBuf::from(dir).join("uupd.lock"),
        _ => PathBuf::from(DEFAULT_LOCK_PATH),
    }
}

fn ci_detected() -> bool {
    std::env::var("CI").is_ok_and(|v| is_truthy(&v))
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && !value.eq_ignore_ascii_case("false") && value != "0"
}

fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let euid = unsafe { libc::geteuid() };
    euid == 0
}
