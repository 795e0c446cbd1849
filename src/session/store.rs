//! Session storage and management.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::{SessionId, SessionState};
use crate::error::RunnerError;
use crate::execution::Classification;
use crate::Result;

/// Bookkeeping for one submitted command.
///
/// The live process handle is owned by the session worker, never by the
/// record; the record only carries the process-group id so the lifecycle
/// watchdog can reach the group if the worker stops responding.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique identifier.
    pub id: SessionId,
    /// The trimmed command text.
    pub command: String,
    /// How the command is routed.
    pub classification: Classification,
    /// Current state.
    pub state: SessionState,
    /// Privileged command parked until a credential arrives.
    pub awaiting_credential: bool,
    /// Set once a cancellation has been acknowledged.
    pub cancel_requested: bool,
    /// PID (and process-group id) of the child while it runs.
    pub pid: Option<u32>,
    /// Exit code, populated only on Succeeded/Failed.
    pub exit_code: Option<i32>,
    /// Time of submission.
    pub created_at: Instant,
    /// Time the child process was started.
    pub started_at: Option<Instant>,
    /// Time of the terminal transition.
    pub finished_at: Option<Instant>,
}

impl Session {
    /// Create a new pending session.
    pub fn new(id: SessionId, command: impl Into<String>, classification: Classification) -> Self {
        Self {
            id,
            command: command.into(),
            classification,
            state: SessionState::Pending,
            awaiting_credential: false,
            cancel_requested: false,
            pid: None,
            exit_code: None,
            created_at: Instant::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Time spent running, up to now or up to the terminal transition.
    pub fn elapsed(&self) -> Option<Duration> {
        let started = self.started_at?;
        Some(match self.finished_at {
            Some(finished) => finished.saturating_duration_since(started),
            None => started.elapsed(),
        })
    }

    /// Whether the session has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Thread-safe storage for sessions.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl SessionStore {
    /// Create a new empty session store.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session.
    pub fn insert(&self, session: Session) -> Result<SessionId> {
        let id = session.id;
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| RunnerError::LockPoisoned)?;

        sessions.insert(id, session);
        Ok(id)
    }

    /// Get a clone of the session with the given ID.
    pub fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| RunnerError::LockPoisoned)?;
        Ok(sessions.get(id).cloned())
    }

    /// Update a session using a closure and return what the closure returns.
    ///
    /// The closure runs under the write lock, so check-and-set sequences
    /// inside it are atomic with respect to other updates.
    pub fn update<F, R>(&self, id: &SessionId, f: F) -> Result<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| RunnerError::LockPoisoned)?;

        let session = sessions
            .get_mut(id)
            .ok_or_else(|| RunnerError::SessionNotFound(id.to_string()))?;

        Ok(f(session))
    }

    /// IDs of all sessions that have not reached a terminal state.
    pub fn live_ids(&self) -> Result<Vec<SessionId>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| RunnerError::LockPoisoned)?;
        Ok(sessions
            .values()
            .filter(|s| !s.is_finished())
            .map(|s| s.id)
            .collect())
    }

    /// Find the oldest session parked on a credential for exactly this command.
    pub fn find_awaiting_credential(&self, command: &str) -> Result<Option<SessionId>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| RunnerError::LockPoisoned)?;
        Ok(sessions
            .values()
            .filter(|s| s.awaiting_credential && s.state == SessionState::Pending)
            .filter(|s| s.command == command)
            .map(|s| s.id)
            .min())
    }

    /// Remove all sessions matching a predicate.
    ///
    /// Returns the number of sessions removed.
    pub fn remove_matching<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&Session) -> bool,
    {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| RunnerError::LockPoisoned)?;

        let before = sessions.len();
        sessions.retain(|_, session| !predicate(session));
        Ok(before - sessions.len())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
