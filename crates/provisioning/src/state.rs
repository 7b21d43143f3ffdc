//! Provisioning run state machine.

use serde::{Deserialize, Serialize};

/// The state of a provisioning run in its lifecycle.
///
/// State transitions:
/// ```text
/// NotStarted ──► Running(step) ──┬──► Succeeded
///                                └──► RollingBack ──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum RunState {
    /// No step has been attempted yet.
    #[default]
    NotStarted,

    /// The step at this index of the plan is executing.
    Running(usize),

    /// A step failed or the run was cancelled; created resources are being deleted.
    RollingBack,

    /// All steps completed (terminal state).
    Succeeded,

    /// Rollback finished after a failure (terminal state).
    Failed,
}

impl RunState {
    /// Returns true if a step may start from this state.
    pub fn can_run(&self) -> bool {
        matches!(self, RunState::NotStarted | RunState::Running(_))
    }

    /// Returns true if rollback may begin from this state.
    pub fn can_roll_back(&self) -> bool {
        matches!(self, RunState::Running(_))
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::NotStarted => "NotStarted",
            RunState::Running(_) => "Running",
            RunState::RollingBack => "RollingBack",
            RunState::Succeeded => "Succeeded",
            RunState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Running(step) => write!(f, "Running({step})"),
            other => f.write_str(other.as_str()),
        }
    }
}
