//! Error types for shell-runner.

use thiserror::Error;

/// Main error type for shell-runner operations.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Submitted command was empty or whitespace only.
    #[error("command is empty")]
    EmptyCommand,

    /// Session with the given ID was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::SessionState,
        to: crate::session::SessionState,
    },

    /// A credential was supplied for a session that is not waiting for one.
    #[error("session {0} is not awaiting a credential")]
    NotAwaitingCredential(String),

    /// The child process could not be created.
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// The engine was created outside of a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Convenience Result type for shell-runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_not_found_display() {
        let err = RunnerError::SessionNotFound("run-00000001".into());
        assert!(err.to_string().contains("run-00000001"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_empty_command_display() {
        assert_eq!(RunnerError::EmptyCommand.to_string(), "command is empty");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RunnerError = io_err.into();
        assert!(matches!(err, RunnerError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_launch_error_names_program() {
        let err = RunnerError::Launch {
            program: "/bin/does-not-exist".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let text = err.to_string();
        assert!(text.contains("/bin/does-not-exist"));
        assert!(text.contains("no such file"));
    }

    #[test]
    fn test_invalid_transition_display() {
        use crate::session::SessionState;
        let err = RunnerError::InvalidStateTransition {
            from: SessionState::Succeeded,
            to: SessionState::Running,
        };
        assert!(err.to_string().contains("Succeeded"));
        assert!(err.to_string().contains("Running"));
    }
}
