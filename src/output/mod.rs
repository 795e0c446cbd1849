//! Output processing.
//!
//! Streamed lines pass through two filters before they reach the caller:
//! - ANSI escape code stripping
//! - credential redaction for privileged sessions
//!
//! # Example
//!
//! ```
//! use shell_runner::execution::Credential;
//! use shell_runner::output::{OutputSanitizer, Redactor};
//!
//! let clean = OutputSanitizer::strip_ansi(b"\x1b[31mRed text\x1b[0m");
//! assert_eq!(clean, "Red text");
//!
//! let redactor = Redactor::for_credential(&Credential::new("s3cret"));
//! assert_eq!(redactor.redact("token s3cret"), "token ********");
//! ```

mod redact;
mod sanitizer;

pub use redact::Redactor;
pub use sanitizer::OutputSanitizer;
