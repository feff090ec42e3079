use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Identity a subprocess is launched under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunAs {
    /// The orchestrator's own identity, spawned directly.
    Caller,
    /// A login session of the given uid, entered through `systemd-run`.
    User(u32),
}

/// A fully described subprocess launch, before it is handed to a [`Host`](crate::Host).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub run_as: RunAs,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new<I, S>(program: &Path, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = vec![program.to_string_lossy().into_owned()];
        argv.extend(args.into_iter().map(Into::into));
        Self {
            argv,
            run_as: RunAs::Caller,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn as_user(mut self, uid: u32) -> Self {
        self.run_as = RunAs::User(uid);
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_owned(), value.into()));
        self
    }

    /// The program being launched (first argv element).
    pub fn program(&self) -> &str {
        self.argv.first().map_or("", String::as_str)
    }

    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or(&[])
    }

    /// True when the argv after the program starts with `prefix`.
    pub fn args_start_with(&self, prefix: &[&str]) -> bool {
        let args = self.args();
        args.len() >= prefix.len() && args.iter().zip(prefix).all(|(a, p)| a == p)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))?;
        if let RunAs::User(uid) = self.run_as {
            write!(f, " (uid {uid})")?;
        }
        Ok(())
    }
}

/// Raw outcome of a subprocess that was launched successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    pub fn exit(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            code: Some(code),
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Stdout followed by stderr, for probes that only inspect text.
    pub fn combined(&self) -> String {
        let mut out = self.stdout_lossy();
        out.push_str(&self.stderr_lossy());
        out
    }
}

impl From<std::process::Output> for ProcessOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Immutable record of one unit of update work.
///
/// Exactly one is produced per attempted unit (root-level or per-user),
/// whether the subprocess succeeded, exited non-zero, or never launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    context: String,
    command_line: Vec<String>,
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
    failed: bool,
}

impl CommandResult {
    pub fn from_outcome(
        context: &str,
        invocation: &Invocation,
        outcome: std::io::Result<ProcessOutput>,
    ) -> Self {
        match outcome {
            Ok(output) => Self {
                context: context.to_owned(),
                command_line: invocation.argv.clone(),
                stdout: output.stdout_lossy(),
                stderr: output.stderr_lossy(),
                exit_code: output.code,
                failed: !output.success(),
            },
            Err(e) => Self {
                context: context.to_owned(),
                command_line: invocation.argv.clone(),
                stdout: String::new(),
                stderr: format!("failed to launch {}: {e}", invocation.program()),
                exit_code: None,
                failed: true,
            },
        }
    }

    /// A failure that happened inside a driver rather than in a subprocess.
    pub fn driver_failure(context: &str, error: &dyn std::error::Error) -> Self {
        Self {
            context: context.to_owned(),
            command_line: Vec::new(),
            stdout: String::new(),
            stderr: error.to_string(),
            exit_code: None,
            failed: true,
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn command_line(&self) -> &[String] {
        &self.command_line
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Captured stdout and stderr joined, trailing whitespace trimmed.
    pub fn output(&self) -> String {
        let mut out = String::new();
        for part in [self.stdout.trim_end(), self.stderr.trim_end()] {
            if part.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(part);
        }
        out
    }
}
