use crate::command::{Invocation, ProcessOutput, RunAs};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::process::Command;
use tracing::debug;

pub const SYSTEMD_RUN: &str = "/usr/bin/systemd-run";

/// Everything a driver needs from the machine it runs on.
pub trait Host: Send + Sync {
    /// Launch a subprocess and wait for it. There is no timeout.
    fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput>;

    fn is_installed(&self, path: &Path) -> bool;

    fn owner_uid(&self, path: &Path) -> std::io::Result<u32>;
}

/// The real host: spawns processes and stats real files.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }
}

impl Host for SystemHost {
    fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
        let argv = launch_argv(invocation);
        debug!("running {invocation}");
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"))?;

        let mut cmd = Command::new(program);
        cmd.args(args);
        if invocation.run_as == RunAs::Caller {
            cmd.envs(invocation.env.iter().cloned());
        }
        cmd.output().map(ProcessOutput::from)
    }

    fn is_installed(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn owner_uid(&self, path: &Path) -> std::io::Result<u32> {
        Ok(std::fs::metadata(path)?.uid())
    }
}

/// The argv actually spawned for an invocation.
///
/// Commands for a user session go through `systemd-run --machine <uid>@` so
/// they see that user's environment and D-Bus session; environment variables
/// travel as `--setenv` because the caller's environment does not cross over.
pub fn launch_argv(invocation: &Invocation) -> Vec<String> {
    match invocation.run_as {
        RunAs::Caller => invocation.argv.clone(),
        RunAs::User(uid) => {
            let mut argv = vec![
                SYSTEMD_RUN.to_owned(),
                "--machine".to_owned(),
                format!("{uid}@"),
                "--pipe".to_owned(),
                "--quiet".to_owned(),
            ];
            if uid != 0 {
                argv.push("--user".to_owned());
            }
            for (key, value) in &invocation.env {
                argv.push(format!("--setenv={key}={value}"));
            }
            argv.extend(invocation.argv.iter().cloned());
            argv
        }
    }
}
