use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a run.
///
/// ```text
/// Pending --spawn ok----> Running --exit(0)-------> Completed
///    |                       |----exit(!=0)------> Failed
///    |                       `----stop requested--> Stopped
///    `----spawn failed---> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    /// Run is registered, the process is not spawned yet.
    Pending,
    /// Process is alive and its output is being streamed.
    Running,
    /// Process exited with code 0.
    Completed,
    /// Process exited non-zero, or could not be spawned at all.
    Failed,
    /// Process was terminated on an explicit stop request.
    Stopped,
}

impl RunState {
    /// Returns `true` if the run will not transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Stopped
        )
    }

    /// Returns `true` if the run occupies the single active slot.
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Pending | RunState::Running)
    }

    /// Whether `self -> next` is an edge of the run state machine.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Pending, RunState::Running)
                | (RunState::Pending, RunState::Failed)
                | (RunState::Running, RunState::Completed)
                | (RunState::Running, RunState::Failed)
                | (RunState::Running, RunState::Stopped)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
