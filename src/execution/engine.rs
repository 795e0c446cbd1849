//! The command execution engine.
//!
//! Every submission becomes a session driven by its own tokio task. The task
//! owns the child process exclusively; the engine only keeps the session
//! record and a cancellation sender per session.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::classify::{directory_target, Classification};
use super::event::{EventReceiver, Notification, OutputEvent};
use super::launcher::{launch, LaunchSettings};
use super::lifecycle::{arm_watchdog, kill_group, terminate, TimeoutPolicy};
use super::request::{CommandRequest, Credential};
use super::streamer::{pump, Emitter, StreamOutcome, DEFAULT_MAX_CHUNK};
use crate::environment::WorkingDirectory;
use crate::error::RunnerError;
use crate::output::Redactor;
use crate::session::{Session, SessionId, SessionState, SessionStore};
use crate::Result;

/// Extra time the cancel watchdog allows on top of the grace window.
const WATCHDOG_MARGIN: Duration = Duration::from_secs(1);

/// Runtime settings for an [`Engine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Shell and privileged helper.
    pub launch: LaunchSettings,
    /// Timeouts and grace window.
    pub timeouts: TimeoutPolicy,
    /// Strip ANSI escape sequences and control bytes from process output.
    /// Off by default: payloads are the process output as written.
    pub strip_ansi: bool,
    /// Longest payload emitted for a line without a terminator.
    pub max_chunk: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            launch: LaunchSettings::default(),
            timeouts: TimeoutPolicy::default(),
            strip_ansi: false,
            max_chunk: DEFAULT_MAX_CHUNK,
        }
    }
}

/// What `cancel` found when it claimed a session.
enum CancelClaim {
    Finished,
    AlreadyRequested,
    Parked,
    Live,
}

struct Inner {
    config: EngineConfig,
    store: Arc<SessionStore>,
    cwd: Arc<dyn WorkingDirectory>,
    tx: mpsc::UnboundedSender<Notification>,
    handle: Handle,
    controls: Mutex<HashMap<SessionId, oneshot::Sender<()>>>,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
}

/// Runs commands in the background and reports on them through an
/// [`EventReceiver`].
///
/// All methods except [`shutdown`](Self::shutdown) are synchronous and never
/// block on a child process, so they can be called from any thread.
/// Dropping the engine cancels every live session.
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Create an engine on the current tokio runtime.
    pub fn new(
        config: EngineConfig,
        cwd: Arc<dyn WorkingDirectory>,
    ) -> Result<(Self, EventReceiver)> {
        let handle = Handle::try_current().map_err(|e| RunnerError::NoRuntime(e.to_string()))?;
        Ok(Self::with_handle(config, cwd, handle))
    }

    /// Create an engine that spawns its workers on `handle`.
    pub fn with_handle(
        config: EngineConfig,
        cwd: Arc<dyn WorkingDirectory>,
        handle: Handle,
    ) -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            config,
            store: Arc::new(SessionStore::new()),
            cwd,
            tx,
            handle,
            controls: Mutex::new(HashMap::new()),
            supervisors: Mutex::new(Vec::new()),
        });
        (Self { inner }, EventReceiver::new(rx))
    }

    /// Submit a command for execution.
    ///
    /// Fails only when `text` is empty or whitespace. A privileged command
    /// submitted with a credential resumes the oldest session that is waiting
    /// for a credential for the same text, and returns that session's id.
    pub fn submit(&self, text: &str, credential: Option<Credential>) -> Result<SessionId> {
        let request = CommandRequest::new(text)?.with_optional_credential(credential);

        if request.classification() == Classification::Privileged && request.credential().is_some()
        {
            if let Some(id) = self.inner.store.find_awaiting_credential(request.text())? {
                if self.inner.claim_parked(&id)?.is_some() {
                    info!(session = %id, "resuming privileged command with credential");
                    self.inner.start(id, request)?;
                    return Ok(id);
                }
            }
        }

        let id = SessionId::new();
        self.inner
            .store
            .insert(Session::new(id, request.text(), request.classification()))?;
        info!(
            session = %id,
            command = %request.text(),
            classification = ?request.classification(),
            "command submitted"
        );
        self.inner.start(id, request)?;
        Ok(id)
    }

    /// Provide the credential a parked privileged session asked for.
    ///
    /// An empty credential counts as none, and the session asks again.
    pub fn supply_credential(&self, id: SessionId, credential: impl Into<Credential>) -> Result<()> {
        let command = self
            .inner
            .claim_parked(&id)?
            .ok_or_else(|| RunnerError::NotAwaitingCredential(id.to_string()))?;

        let request = CommandRequest::new(&command)?.with_optional_credential(Some(credential.into()));
        debug!(session = %id, "credential supplied");
        self.inner.start(id, request)
    }

    /// Request termination of a session.
    ///
    /// Returns `true` if the request was acknowledged, in which case the
    /// session will end `Cancelled`. Terminal and unknown sessions return
    /// `false`; repeated calls are harmless.
    pub fn cancel(&self, id: SessionId) -> bool {
        self.inner.cancel(id)
    }

    /// Snapshot of a session record.
    pub fn session(&self, id: SessionId) -> Result<Option<Session>> {
        self.inner.store.get(&id)
    }

    /// IDs of sessions that have not reached a terminal state.
    pub fn live_sessions(&self) -> Result<Vec<SessionId>> {
        self.inner.store.live_ids()
    }

    /// The directory new processes start in.
    pub fn working_dir(&self) -> Result<PathBuf> {
        Ok(self.inner.cwd.current()?)
    }

    /// Forget every finished session. Returns how many were removed.
    pub fn prune_finished(&self) -> Result<usize> {
        self.inner.store.remove_matching(Session::is_finished)
    }

    /// Cancel every live session and wait for the workers to finish.
    ///
    /// The wait is bounded by twice the grace window plus a margin; workers
    /// still running after that are left to the watchdogs.
    pub async fn shutdown(&self) {
        let cancelled = self.inner.cancel_all();
        let supervisors = match self.inner.supervisors.lock() {
            Ok(mut supervisors) => std::mem::take(&mut *supervisors),
            Err(_) => Vec::new(),
        };
        info!(cancelled, workers = supervisors.len(), "shutting down");

        let bound = self
            .inner
            .config
            .timeouts
            .grace
            .saturating_mul(2)
            .saturating_add(WATCHDOG_MARGIN);
        let joined = tokio::time::timeout(bound, async {
            for supervisor in supervisors {
                let _ = supervisor.await;
            }
        })
        .await;
        if joined.is_err() {
            warn!("workers still running at shutdown deadline");
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.inner.cancel_all();
    }
}

impl Inner {
    fn start(self: &Arc<Self>, id: SessionId, request: CommandRequest) -> Result<()> {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.controls
            .lock()
            .map_err(|_| RunnerError::LockPoisoned)?
            .insert(id, cancel_tx);

        let worker = self.handle.spawn(Arc::clone(self).run(id, request, cancel_rx));
        let inner = Arc::clone(self);
        let supervisor = self.handle.spawn(async move {
            if let Err(e) = worker.await {
                if e.is_panic() {
                    inner.recover_from_panic(id);
                }
            }
        });

        let mut supervisors = self.supervisors.lock().map_err(|_| RunnerError::LockPoisoned)?;
        supervisors.retain(|s| !s.is_finished());
        supervisors.push(supervisor);
        Ok(())
    }

    async fn run(
        self: Arc<Self>,
        id: SessionId,
        request: CommandRequest,
        mut cancel: oneshot::Receiver<()>,
    ) {
        let redactor = request
            .credential()
            .map(Redactor::for_credential)
            .unwrap_or_default();
        let emitter = Emitter::new(self.tx.clone(), id, redactor, self.config.strip_ansi);

        match request.classification() {
            Classification::Builtin => {
                emitter.emit(OutputEvent::clear());
                self.finish(id, SessionState::Succeeded, None);
            }
            Classification::DirectoryChange => self.change_directory(id, &request, &emitter),
            Classification::Privileged if request.credential().is_none() => {
                self.park(id, &request)
            }
            Classification::Privileged | Classification::Normal => {
                self.execute(id, &request, &emitter, &mut cancel).await
            }
        }
    }

    fn change_directory(&self, id: SessionId, request: &CommandRequest, emitter: &Emitter) {
        let Some(target) = directory_target(request.text()) else {
            emitter.emit(OutputEvent::error("cd: missing directory\n"));
            self.finish(id, SessionState::Failed, None);
            return;
        };

        match self.cwd.change_to(&target) {
            Ok(dir) => {
                info!(session = %id, dir = %dir.display(), "working directory changed");
                emitter.emit(OutputEvent::success(format!(
                    "Directory changed to: {}\n",
                    dir.display()
                )));
                self.finish(id, SessionState::Succeeded, None);
            }
            Err(e) => {
                debug!(session = %id, target = %target.display(), error = %e, "cd failed");
                emitter.emit(OutputEvent::error(format!("cd: {}: {}\n", target.display(), e)));
                self.finish(id, SessionState::Failed, None);
            }
        }
    }

    /// Leave a privileged session pending until a credential arrives.
    fn park(&self, id: SessionId, request: &CommandRequest) {
        let parked = self.store.update(&id, |s| {
            if s.cancel_requested || s.is_finished() {
                false
            } else {
                s.awaiting_credential = true;
                true
            }
        });

        match parked {
            Ok(true) => {
                info!(session = %id, "credential required");
                let _ = self.tx.send(Notification::CredentialRequired {
                    session: id,
                    command: request.text().to_string(),
                });
            }
            _ => {
                self.finish(id, SessionState::Cancelled, None);
            }
        }
    }

    async fn execute(
        &self,
        id: SessionId,
        request: &CommandRequest,
        emitter: &Emitter,
        cancel: &mut oneshot::Receiver<()>,
    ) {
        let cwd = match self.cwd.current() {
            Ok(cwd) => cwd,
            Err(e) => {
                emitter.emit(OutputEvent::error(format!(
                    "Cannot determine working directory: {e}\n"
                )));
                self.finish(id, SessionState::Failed, None);
                return;
            }
        };

        if self.cancel_requested(&id) {
            emitter.emit(OutputEvent::normal("Command cancelled\n"));
            self.finish(id, SessionState::Cancelled, None);
            return;
        }

        let timeout = self.config.timeouts.timeout_for(request.text());
        let grace = self.config.timeouts.grace;

        let mut spawned = match launch(&self.config.launch, request, &cwd).await {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!(session = %id, error = %e, "launch failed");
                emitter.emit(OutputEvent::error(format!("{e}\n")));
                self.finish(id, SessionState::Failed, None);
                return;
            }
        };

        self.mark_running(&id, spawned.pid);
        arm_watchdog(
            &self.handle,
            Arc::clone(&self.store),
            id,
            self.config.timeouts.watchdog_delay(timeout),
        );
        debug!(session = %id, pid = spawned.pid, ?timeout, "running");

        let outcome = pump(&mut spawned, emitter, timeout, self.config.max_chunk, cancel).await;

        let (state, exit_code) = match outcome {
            StreamOutcome::Exited(status) => {
                let (state, exit_code, message) = exit_outcome(status);
                if let Some(message) = message {
                    emitter.emit(OutputEvent::error(message));
                } else if request.classification() == Classification::Privileged {
                    emitter.emit(OutputEvent::success(
                        "Privileged command completed successfully\n",
                    ));
                }
                (state, exit_code)
            }
            StreamOutcome::TimedOut => {
                let how = terminate(&mut spawned.child, spawned.pid, grace).await;
                warn!(session = %id, ?timeout, termination = ?how, "command timed out");
                emitter.emit(OutputEvent::error(format!(
                    "Command timed out after {timeout:?}\n"
                )));
                (SessionState::TimedOut, None)
            }
            StreamOutcome::Cancelled => {
                let how = terminate(&mut spawned.child, spawned.pid, grace).await;
                info!(session = %id, termination = ?how, "command cancelled");
                emitter.emit(OutputEvent::normal("Command cancelled\n"));
                (SessionState::Cancelled, None)
            }
            StreamOutcome::StreamFailed(e) | StreamOutcome::WaitFailed(e) => {
                terminate(&mut spawned.child, spawned.pid, grace).await;
                warn!(session = %id, error = %e, "lost track of child process");
                emitter.emit(OutputEvent::error(format!("Output stream failed: {e}\n")));
                (SessionState::Failed, None)
            }
        };

        // Pipes and the reaped child go away before the terminal notification.
        drop(spawned);
        self.finish(id, state, exit_code);
    }

    fn mark_running(&self, id: &SessionId, pid: u32) {
        let result = self.store.update(id, |s| {
            s.state.transition_to(SessionState::Running)?;
            s.pid = Some(pid);
            s.started_at = Some(Instant::now());
            Ok::<_, RunnerError>(())
        });
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) | Err(e) => warn!(session = %id, error = %e, "could not mark session running"),
        }
    }

    fn cancel_requested(&self, id: &SessionId) -> bool {
        matches!(self.store.get(id), Ok(Some(s)) if s.cancel_requested)
    }

    /// Atomically take a parked session out of the waiting state. Returns its
    /// command text, or `None` if it was not waiting.
    fn claim_parked(&self, id: &SessionId) -> Result<Option<String>> {
        self.store.update(id, |s| {
            if s.awaiting_credential && s.state == SessionState::Pending && !s.cancel_requested {
                s.awaiting_credential = false;
                Some(s.command.clone())
            } else {
                None
            }
        })
    }

    fn cancel(&self, id: SessionId) -> bool {
        let claim = self.store.update(&id, |s| {
            if s.is_finished() {
                return CancelClaim::Finished;
            }
            if s.cancel_requested {
                return CancelClaim::AlreadyRequested;
            }
            s.cancel_requested = true;
            if s.awaiting_credential {
                s.awaiting_credential = false;
                CancelClaim::Parked
            } else {
                CancelClaim::Live
            }
        });

        match claim {
            Ok(CancelClaim::Parked) => {
                info!(session = %id, "credential request abandoned");
                let _ = self.tx.send(Notification::Output {
                    session: id,
                    event: OutputEvent::normal("Command cancelled: no credential supplied\n"),
                });
                self.finish(id, SessionState::Cancelled, None);
                true
            }
            Ok(CancelClaim::Live) => {
                debug!(session = %id, "cancellation requested");
                let sender = self.controls.lock().ok().and_then(|mut c| c.remove(&id));
                if let Some(sender) = sender {
                    // The worker may have finished already; the flag still decides.
                    let _ = sender.send(());
                }
                arm_watchdog(
                    &self.handle,
                    Arc::clone(&self.store),
                    id,
                    self.config.timeouts.grace.saturating_add(WATCHDOG_MARGIN),
                );
                true
            }
            Ok(CancelClaim::AlreadyRequested) => true,
            Ok(CancelClaim::Finished) | Err(_) => false,
        }
    }

    fn cancel_all(&self) -> usize {
        self.store
            .live_ids()
            .unwrap_or_default()
            .into_iter()
            .filter(|id| self.cancel(*id))
            .count()
    }

    /// Record the terminal transition. Only the first call per session has
    /// any effect; it returns `true` and sends `Finished`.
    ///
    /// An acknowledged cancellation overrides whatever outcome the caller
    /// reports.
    fn finish(&self, id: SessionId, state: SessionState, exit_code: Option<i32>) -> bool {
        let transition = self.store.update(&id, |s| {
            if s.is_finished() {
                return None;
            }
            let state = if s.cancel_requested {
                SessionState::Cancelled
            } else {
                state
            };
            if s.state.transition_to(state).is_err() {
                s.state = SessionState::Failed;
            }
            s.exit_code = match s.state {
                SessionState::Succeeded | SessionState::Failed => exit_code,
                _ => None,
            };
            s.awaiting_credential = false;
            s.pid = None;
            s.finished_at = Some(Instant::now());
            Some((s.state, s.exit_code, s.elapsed()))
        });

        let Ok(Some((state, exit_code, elapsed))) = transition else {
            return false;
        };

        if let Ok(mut controls) = self.controls.lock() {
            controls.remove(&id);
        }
        if state.is_error() {
            warn!(session = %id, ?state, ?exit_code, ?elapsed, "session finished");
        } else {
            info!(session = %id, ?state, ?exit_code, ?elapsed, "session finished");
        }
        let _ = self.tx.send(Notification::Finished {
            session: id,
            state,
            exit_code,
        });
        true
    }

    fn recover_from_panic(&self, id: SessionId) {
        let Ok(Some(session)) = self.store.get(&id) else {
            return;
        };
        if session.is_finished() {
            return;
        }
        error!(session = %id, "session worker panicked");
        if let Some(pid) = session.pid {
            kill_group(pid);
        }
        let _ = self.tx.send(Notification::Output {
            session: id,
            event: OutputEvent::error("Internal error: command worker stopped unexpectedly\n"),
        });
        self.finish(id, SessionState::Failed, None);
    }
}

/// Terminal state, exit code and final message for a process that exited.
fn exit_outcome(status: ExitStatus) -> (SessionState, Option<i32>, Option<String>) {
    match status.code() {
        Some(0) => (SessionState::Succeeded, Some(0), None),
        Some(code) => (
            SessionState::Failed,
            Some(code),
            Some(format!("Command exited with code {code}\n")),
        ),
        None => (
            SessionState::Failed,
            None,
            Some(format!("Command terminated by {}\n", signal_name(&status))),
        ),
    }
}

#[cfg(unix)]
fn signal_name(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(libc::SIGTERM) => "SIGTERM".to_string(),
        Some(libc::SIGKILL) => "SIGKILL".to_string(),
        Some(libc::SIGINT) => "SIGINT".to_string(),
        Some(libc::SIGSEGV) => "SIGSEGV".to_string(),
        Some(signal) => format!("signal {signal}"),
        None => "an unknown signal".to_string(),
    }
}

#[cfg(not(unix))]
fn signal_name(_status: &ExitStatus) -> String {
    "an unknown signal".to_string()
}
