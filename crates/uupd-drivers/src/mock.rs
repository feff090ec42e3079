use crate::command::{Invocation, ProcessOutput};
use crate::host::Host;
use crate::session::LOGINCTL;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Matcher = Box<dyn Fn(&Invocation) -> bool + Send + Sync>;

struct Rule {
    matcher: Matcher,
    output: ProcessOutput,
}

/// A scripted host: records every invocation and answers from a rule list.
///
/// Rules are tried in the order they were added; the first match wins.
/// Unmatched `loginctl` calls list the configured users, every other
/// unmatched call succeeds with empty output. All binaries count as
/// installed unless removed with [`without_binary`](Self::without_binary).
pub struct MockHost {
    rules: Vec<Rule>,
    users: Vec<(u32, String)>,
    missing: HashSet<PathBuf>,
    owner_uid: u32,
    invocations: Mutex<Vec<Invocation>>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            users: Vec::new(),
            missing: HashSet::new(),
            owner_uid: 1000,
            invocations: Mutex::new(Vec::new()),
        }
    }
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn respond<F>(mut self, matcher: F, output: ProcessOutput) -> Self
    where
        F: Fn(&Invocation) -> bool + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            matcher: Box::new(matcher),
            output,
        });
        self
    }

    /// Make every invocation of a program whose file name is `name` exit 1.
    #[must_use]
    pub fn failing_program(self, name: &str) -> Self {
        let name = name.to_owned();
        self.respond(
            move |inv| Path::new(inv.program()).file_name() == Some(OsStr::new(&name)),
            ProcessOutput::exit(1, "mock failure"),
        )
    }

    #[must_use]
    pub fn with_users(mut self, users: &[(u32, &str)]) -> Self {
        self.users = users
            .iter()
            .map(|(uid, name)| (*uid, (*name).to_owned()))
            .collect();
        self
    }

    #[must_use]
    pub fn without_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.missing.insert(path.into());
        self
    }

    #[must_use]
    pub fn with_owner_uid(mut self, uid: u32) -> Self {
        self.owner_uid = uid;
        self
    }

    /// Every invocation seen so far, in launch order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.recorded().clone()
    }

    /// Invocations other than read-only probes (`loginctl`, `status`, `--check`).
    pub fn mutating_invocations(&self) -> Vec<Invocation> {
        self.recorded()
            .iter()
            .filter(|inv| !is_probe(inv))
            .cloned()
            .collect()
    }

    fn recorded(&self) -> MutexGuard<'_, Vec<Invocation>> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn users_json(&self) -> String {
        let entries: Vec<_> = self
            .users
            .iter()
            .map(|(uid, name)| serde_json::json!({ "uid": uid, "user": name, "state": "active" }))
            .collect();
        serde_json::Value::Array(entries).to_string()
    }
}

fn is_probe(inv: &Invocation) -> bool {
    inv.program() == LOGINCTL
        || inv.args_start_with(&["status"])
        || inv.args().iter().any(|a| a == "--check")
}

impl Host for MockHost {
    fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
        self.recorded().push(invocation.clone());

        if let Some(rule) = self.rules.iter().find(|r| (r.matcher)(invocation)) {
            return Ok(rule.output.clone());
        }
        if invocation.program() == LOGINCTL {
            return Ok(ProcessOutput::ok(self.users_json()));
        }
        Ok(ProcessOutput::ok(Vec::new()))
    }

    fn is_installed(&self, path: &Path) -> bool {
        !self.missing.contains(path)
    }

    fn owner_uid(&self, path: &Path) -> std::io::Result<u32> {
        if self.missing.contains(path) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ));
        }
        Ok(self.owner_uid)
    }
}
