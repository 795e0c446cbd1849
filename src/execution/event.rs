//! Events delivered from session workers to the caller.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::session::{SessionId, SessionState};

/// Semantic kind of an output event, used by the caller for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Regular process output.
    Normal,
    /// Failure description.
    Error,
    /// Positive status message.
    Success,
    /// Instruction to clear the display; the payload is empty.
    ClearSignal,
}

/// One unit of streamed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEvent {
    /// A line including its terminator, or a trailing partial chunk.
    pub payload: String,
    /// How the caller should treat the payload.
    pub kind: EventKind,
}

impl OutputEvent {
    /// Create a new output event.
    pub fn new(payload: impl Into<String>, kind: EventKind) -> Self {
        Self {
            payload: payload.into(),
            kind,
        }
    }

    /// Regular process output.
    pub fn normal(payload: impl Into<String>) -> Self {
        Self::new(payload, EventKind::Normal)
    }

    /// A failure description.
    pub fn error(payload: impl Into<String>) -> Self {
        Self::new(payload, EventKind::Error)
    }

    /// A positive status message.
    pub fn success(payload: impl Into<String>) -> Self {
        Self::new(payload, EventKind::Success)
    }

    /// The clear-display instruction.
    pub fn clear() -> Self {
        Self::new(String::new(), EventKind::ClearSignal)
    }
}

/// Everything a caller can be told about a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Streamed output, in production order per session.
    Output {
        session: SessionId,
        event: OutputEvent,
    },
    /// A privileged command needs a credential before it can launch.
    CredentialRequired { session: SessionId, command: String },
    /// Terminal sentinel; exactly one per session.
    Finished {
        session: SessionId,
        state: SessionState,
        exit_code: Option<i32>,
    },
}

impl Notification {
    /// The session this notification belongs to.
    pub fn session(&self) -> SessionId {
        match self {
            Notification::Output { session, .. }
            | Notification::CredentialRequired { session, .. }
            | Notification::Finished { session, .. } => *session,
        }
    }
}

/// Receiving side of the engine's notification channel.
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl EventReceiver {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Notification>) -> Self {
        Self { rx }
    }

    /// Wait for the next notification. Returns `None` once the engine and all
    /// of its workers are gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Take a notification if one is ready.
    pub fn try_recv(&mut self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }

    /// Collect notifications for `session` until it stops making progress on
    /// its own: either it finishes or it asks for a credential.
    ///
    /// Notifications for other sessions are discarded, so this is meant for
    /// callers that run one command at a time.
    pub async fn transcript(&mut self, session: SessionId) -> Transcript {
        let mut transcript = Transcript::default();
        while let Some(notification) = self.rx.recv().await {
            if notification.session() != session {
                continue;
            }
            match notification {
                Notification::Output { event, .. } => transcript.events.push(event),
                Notification::CredentialRequired { .. } => {
                    transcript.credential_requested = true;
                    break;
                }
                Notification::Finished {
                    state, exit_code, ..
                } => {
                    transcript.state = Some(state);
                    transcript.exit_code = exit_code;
                    break;
                }
            }
        }
        transcript
    }
}

/// Everything one session reported, gathered by [`EventReceiver::transcript`].
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    /// Output events in emission order.
    pub events: Vec<OutputEvent>,
    /// Final state, if the session finished.
    pub state: Option<SessionState>,
    /// Exit code reported with the final state.
    pub exit_code: Option<i32>,
    /// Whether the session stopped to ask for a credential.
    pub credential_requested: bool,
}

impl Transcript {
    /// Concatenated payloads of the given kind.
    pub fn text_of(&self, kind: EventKind) -> String {
        self.events
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.payload.as_str())
            .collect()
    }

    /// Concatenated process output.
    pub fn output(&self) -> String {
        self.text_of(EventKind::Normal)
    }

    /// Concatenated payloads of every event.
    pub fn all_text(&self) -> String {
        self.events.iter().map(|e| e.payload.as_str()).collect()
    }

    /// Check if the session succeeded.
    pub fn success(&self) -> bool {
        self.state == Some(SessionState::Succeeded)
    }
}
