//! Session management module.
//!
//! This module provides types for tracking command executions: session
//! identification, the lifecycle state machine, and a thread-safe store.

mod id;
mod state;
mod store;

pub use id::SessionId;
pub use state::SessionState;
pub use store::{Session, SessionStore};
