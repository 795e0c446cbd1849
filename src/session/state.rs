//! Execution session state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one command execution.
///
/// ```text
/// Pending --launch--> Running --(eof, exit=0)--> Succeeded
/// Pending --launch--> Running --(eof, exit!=0)--> Failed
/// Pending --launch--> Running --(timeout)--> TimedOut
/// Pending --launch--> Running --(cancel)--> Cancelled
/// Pending --(builtin / directory change)--> Succeeded | Failed
/// Pending --(credential declined / cancel)--> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, not yet launched (or waiting for a credential).
    #[default]
    Pending,
    /// The child process exists and its output is being streamed.
    Running,
    /// Finished with exit code 0, or a builtin completed.
    Succeeded,
    /// Finished with a nonzero exit code, or could not be launched.
    Failed,
    /// Killed after exceeding its timeout.
    TimedOut,
    /// Killed or abandoned at the caller's request.
    Cancelled,
}

impl SessionState {
    /// Check if transition to target state is valid.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Pending, Running)
                | (Pending, Succeeded)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Running, Cancelled)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::RunnerError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Succeeded
                | SessionState::Failed
                | SessionState::TimedOut
                | SessionState::Cancelled
        )
    }

    /// Whether an outcome in this state should be shown as an error.
    ///
    /// Cancellation is requested by the caller and is not an application error.
    pub fn is_error(&self) -> bool {
        matches!(self, SessionState::Failed | SessionState::TimedOut)
    }
}
