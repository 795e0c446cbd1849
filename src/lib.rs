//! # shell-runner
//!
//! Asynchronous shell command execution with streamed output.
//!
//! Commands are submitted to an [`Engine`], which runs each one on its own
//! background task and reports back through an [`EventReceiver`]: ordered
//! output lines, requests for a `sudo` credential, and exactly one terminal
//! notification per session.
//!
//! ## Features
//!
//! - **Routing**: `clear`, `cd <dir>`, `sudo <cmd>` and plain shell commands
//! - **Streaming**: combined stdout/stderr, one event per line, in order
//! - **Lifecycle**: keyword-based timeouts, cancellation, guaranteed reaping
//! - **Credentials**: delivered on stdin and never present in any event
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use shell_runner::{Engine, EngineConfig, Notification, ProcessWorkingDirectory};
//!
//! #[tokio::main]
//! async fn main() -> shell_runner::Result<()> {
//!     shell_runner::logging::try_init().ok();
//!
//!     let (engine, mut events) = Engine::new(
//!         EngineConfig::default(),
//!         Arc::new(ProcessWorkingDirectory::new()),
//!     )?;
//!
//!     let id = engine.submit("ls -la", None)?;
//!     while let Some(notification) = events.recv().await {
//!         match notification {
//!             Notification::Output { event, .. } => print!("{}", event.payload),
//!             Notification::Finished { session, state, .. } if session == id => {
//!                 println!("{session}: {state:?}");
//!                 break;
//!             }
//!             _ => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod environment;
pub mod error;
pub mod execution;
pub mod logging;
pub mod output;
pub mod process;
pub mod session;

// Re-export commonly used types
pub use environment::{IsolatedWorkingDirectory, ProcessWorkingDirectory, WorkingDirectory};
pub use error::{Result, RunnerError};
pub use execution::{
    Classification, CommandRequest, Credential, Engine, EngineConfig, EventKind, EventReceiver,
    Notification, OutputEvent, Transcript,
};
pub use output::{OutputSanitizer, Redactor};
pub use session::{Session, SessionId, SessionState, SessionStore};
