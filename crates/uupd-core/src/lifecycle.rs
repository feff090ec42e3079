use crate::CoreError;
use std::fmt;
use tracing::debug;

/// Phases of one orchestration run, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Locking,
    Initializing,
    Probing,
    Accounting,
    Executing,
    Reporting,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Locking => "locking",
            Self::Initializing => "initializing",
            Self::Probing => "probing",
            Self::Accounting => "accounting",
            Self::Executing => "executing",
            Self::Reporting => "reporting",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Runs move strictly forward one phase at a time; any unfinished phase may
/// jump to `Done` when the run aborts.
pub fn validate_transition(from: Phase, to: Phase) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (Phase::Locking, Phase::Initializing)
            | (Phase::Initializing, Phase::Probing)
            | (Phase::Probing, Phase::Accounting)
            | (Phase::Accounting, Phase::Executing)
            | (Phase::Executing, Phase::Reporting)
    ) || (from != Phase::Done && to == Phase::Done);

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Current phase of a run, advanced only through valid transitions.
#[derive(Debug)]
pub struct PhaseMachine {
    current: Phase,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self {
            current: Phase::Locking,
        }
    }
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    pub fn advance(&mut self, to: Phase) -> Result<(), CoreError> {
        validate_transition(self.current, to)?;
        debug!("phase {} -> {to}", self.current);
        self.current = to;
        Ok(())
    }
}
