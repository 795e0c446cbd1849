//! Command classification.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::environment::expand_home;

/// The word that clears the caller's display instead of running anything.
const CLEAR_BUILTIN: &str = "clear";

/// Prefix routed to a working-directory change.
const CD_PREFIX: &str = "cd ";

/// Prefix routed to the privileged-execution helper.
const SUDO_PREFIX: &str = "sudo ";

/// How a command is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Handled by the caller (`clear`); no subprocess.
    Builtin,
    /// Changes the shared working directory; no subprocess.
    DirectoryChange,
    /// Runs through the privileged helper and needs a credential.
    Privileged,
    /// Runs through the shell.
    Normal,
}

/// Classify a command string.
///
/// Deterministic and total: every string maps to exactly one class. The
/// input is trimmed first; empty strings are rejected before this point.
pub fn classify(text: &str) -> Classification {
    let text = text.trim();
    if text == CLEAR_BUILTIN {
        Classification::Builtin
    } else if text.starts_with(CD_PREFIX) {
        Classification::DirectoryChange
    } else if text.starts_with(SUDO_PREFIX) {
        Classification::Privileged
    } else {
        Classification::Normal
    }
}

/// Target of a `cd` command, with quotes stripped and `~` expanded.
pub fn directory_target(text: &str) -> Option<PathBuf> {
    let rest = text.trim().strip_prefix(CD_PREFIX)?.trim();
    Some(expand_home(strip_quotes(rest)))
}

/// The command line handed to the privileged helper (`sudo ` removed).
pub fn privileged_body(text: &str) -> Option<&str> {
    text.trim().strip_prefix(SUDO_PREFIX).map(str::trim)
}

fn strip_quotes(s: &str) -> &str {
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin() {
        assert_eq!(classify("clear"), Classification::Builtin);
        assert_eq!(classify("  clear  "), Classification::Builtin);
        assert_eq!(classify("clear -x"), Classification::Normal);
    }

    #[test]
    fn test_directory_change() {
        assert_eq!(classify("cd /tmp"), Classification::DirectoryChange);
        assert_eq!(classify("cd"), Classification::Normal);
        assert_eq!(classify("cdrecord"), Classification::Normal);
    }

    #[test]
    fn test_privileged() {
        assert_eq!(classify("sudo apt update"), Classification::Privileged);
        assert_eq!(classify("   sudo ls"), Classification::Privileged);
        assert_eq!(classify("sudoedit x"), Classification::Normal);
        assert_eq!(classify("echo sudo ls"), Classification::Normal);
    }

    #[test]
    fn test_normal() {
        assert_eq!(classify("ls -la"), Classification::Normal);
        assert_eq!(classify("echo clear"), Classification::Normal);
    }

    #[test]
    fn test_directory_target() {
        assert_eq!(directory_target("cd /var/log"), Some(PathBuf::from("/var/log")));
        assert_eq!(directory_target("cd   ../x  "), Some(PathBuf::from("../x")));
        assert_eq!(
            directory_target("cd \"My Documents\""),
            Some(PathBuf::from("My Documents"))
        );
        assert_eq!(directory_target("cd 'a b'"), Some(PathBuf::from("a b")));
        assert_eq!(directory_target("ls"), None);
    }

    #[test]
    fn test_directory_target_home() {
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                directory_target("cd ~/src"),
                Some(PathBuf::from(home).join("src"))
            );
        }
    }

    #[test]
    fn test_privileged_body() {
        assert_eq!(privileged_body("sudo apt install vim"), Some("apt install vim"));
        assert_eq!(privileged_body("ls"), None);
    }
}
