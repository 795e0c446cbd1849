//! Session identifier type.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for session ID generation.
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for one command execution.
///
/// IDs come from a process-wide atomic counter, so every submitted command
/// gets a distinct ID for correlating its events. Displayed as `run-XXXXXXXX`
/// where X is a hexadecimal digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a new unique session ID.
    pub fn new() -> Self {
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Create a SessionId from a raw u64 value.
    ///
    /// This is primarily for testing.
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{:08x}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = crate::error::RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("run-")
            .and_then(|hex| u64::from_str_radix(hex, 16).ok())
            .map(SessionId)
            .ok_or_else(|| crate::error::RunnerError::SessionNotFound(s.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_uniqueness() {
        let mut ids = HashSet::new();
        for _ in 0..10_000 {
            let id = SessionId::new();
            assert!(ids.insert(id), "Duplicate ID generated: {}", id);
        }
    }

    #[test]
    fn test_display_format() {
        assert_eq!(SessionId::from_raw(255).to_string(), "run-000000ff");
        assert_eq!(SessionId::from_raw(0x12345678).to_string(), "run-12345678");
    }

    #[test]
    fn test_parse() {
        let id: SessionId = "run-000000ff".parse().unwrap();
        assert_eq!(id.as_u64(), 255);

        assert!("000000ff".parse::<SessionId>().is_err());
        assert!("sess-000000ff".parse::<SessionId>().is_err());
        assert!("run-gggggggg".parse::<SessionId>().is_err());
        assert!("".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_ids_are_increasing() {
        let first = SessionId::new();
        let second = SessionId::new();
        assert!(second > first);
    }
}
