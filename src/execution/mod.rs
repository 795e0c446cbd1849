//! Command execution engine.
//!
//! This module turns command text into supervised background sessions:
//! - classification into builtin, directory change, privileged and normal
//! - launching through the shell with combined output in a fresh process group
//! - ordered per-line output events
//! - timeouts, cancellation and guaranteed reaping
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use shell_runner::environment::ProcessWorkingDirectory;
//! use shell_runner::execution::{Engine, EngineConfig};
//!
//! # async fn run() -> shell_runner::Result<()> {
//! let (engine, mut events) = Engine::new(
//!     EngineConfig::default(),
//!     Arc::new(ProcessWorkingDirectory::new()),
//! )?;
//!
//! let id = engine.submit("echo hello", None)?;
//! let transcript = events.transcript(id).await;
//! assert_eq!(transcript.output(), "hello\n");
//! # Ok(())
//! # }
//! ```

mod classify;
mod engine;
mod event;
mod launcher;
mod lifecycle;
mod request;
mod streamer;

pub use classify::{classify, directory_target, privileged_body, Classification};
pub use engine::{Engine, EngineConfig};
pub use event::{EventKind, EventReceiver, Notification, OutputEvent, Transcript};
pub use launcher::{default_shell, launch, LaunchSettings, SpawnedChild};
pub use lifecycle::{
    arm_watchdog, terminate, Termination, TimeoutPolicy, DEFAULT_GRACE_PERIOD,
    DEFAULT_LONG_KEYWORDS, DEFAULT_LONG_TIMEOUT, DEFAULT_SHORT_TIMEOUT,
};
pub use request::{CommandRequest, Credential};
pub use streamer::DEFAULT_MAX_CHUNK;
