//! Timeout policy and process termination.

use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::process::{signal_process_group, KillSignal};
use crate::session::{SessionId, SessionStore};

/// Timeout for ordinary commands.
pub const DEFAULT_SHORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for package installation and upgrades.
pub const DEFAULT_LONG_TIMEOUT: Duration = Duration::from_secs(300);

/// Time between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Keywords that select the long timeout.
pub const DEFAULT_LONG_KEYWORDS: [&str; 3] = ["install", "upgrade", "update"];

/// Chooses a timeout from the command text.
///
/// The keyword match is a coarse stand-in for "this may take a while"; both
/// the keywords and the durations are configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Timeout for ordinary commands.
    pub short: Duration,
    /// Timeout for commands containing a long-running keyword.
    pub long: Duration,
    /// Lowercase substrings that select the long timeout.
    pub long_keywords: Vec<String>,
    /// Grace window between the polite and the forced signal.
    pub grace: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            short: DEFAULT_SHORT_TIMEOUT,
            long: DEFAULT_LONG_TIMEOUT,
            long_keywords: DEFAULT_LONG_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            grace: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl TimeoutPolicy {
    /// Timeout for the given command text (case-insensitive keyword match).
    pub fn timeout_for(&self, text: &str) -> Duration {
        let text = text.to_lowercase();
        let long = self
            .long_keywords
            .iter()
            .filter(|k| !k.is_empty())
            .any(|k| text.contains(&k.to_lowercase()));
        if long {
            self.long
        } else {
            self.short
        }
    }

    /// How long the watchdog waits before killing a command that was given
    /// `timeout`: the timeout plus two grace windows, saturating.
    pub fn watchdog_delay(&self, timeout: Duration) -> Duration {
        timeout.saturating_add(self.grace.saturating_mul(2))
    }
}

/// How a termination request played out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process had already exited.
    AlreadyExited,
    /// The process exited within the grace window after SIGTERM.
    Graceful,
    /// The process had to be killed.
    Forced,
}

/// Terminate a child and its process group, then reap it.
///
/// Sends SIGTERM to the group, waits up to `grace`, then SIGKILLs the group.
/// When this returns the child has been waited on and is not a zombie.
pub async fn terminate(child: &mut Child, pid: u32, grace: Duration) -> Termination {
    if let Ok(Some(_)) = child.try_wait() {
        // Leader is gone; stragglers in its group still get cleaned up.
        kill_group(pid);
        return Termination::AlreadyExited;
    }

    if pid > 0 {
        if let Err(e) = signal_process_group(pid, KillSignal::Term) {
            warn!(pid, error = %e, "SIGTERM to process group failed");
        }
    }
    #[cfg(not(unix))]
    let _ = child.start_kill();

    let outcome = match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(_)) => Termination::Graceful,
        _ => {
            debug!(pid, "grace window expired, killing");
            kill_group(pid);
            let _ = child.start_kill();
            Termination::Forced
        }
    };

    kill_group(pid);
    if let Err(e) = child.wait().await {
        warn!(pid, error = %e, "failed to reap child");
    }
    outcome
}

pub(crate) fn kill_group(pid: u32) {
    if pid == 0 {
        return;
    }
    if let Err(e) = signal_process_group(pid, KillSignal::Kill) {
        debug!(pid, error = %e, "SIGKILL to process group failed");
    }
}

/// Arm an independent kill switch for a session.
///
/// After `delay`, if the session has still not reached a terminal state, its
/// process group is killed directly. This does not depend on the session
/// worker making progress; the worker then observes the exit and reaps.
pub fn arm_watchdog(handle: &Handle, store: Arc<SessionStore>, id: SessionId, delay: Duration) {
    handle.spawn(async move {
        tokio::time::sleep(delay).await;
        let target = match store.get(&id) {
            Ok(Some(session)) if !session.is_finished() => session.pid,
            _ => None,
        };
        if let Some(pid) = target {
            warn!(session = %id, pid, "worker did not finish in time, killing process group");
            kill_group(pid);
        }
    });
}
