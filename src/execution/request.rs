//! Command requests and credentials.

use std::fmt;

use super::classify::{classify, Classification};
use crate::error::RunnerError;
use crate::Result;

/// A secret used to authenticate a privileged command.
///
/// `Debug` and `Display` never print the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The secret itself. Only the launcher and the redactor read this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Credential {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// One immutable command submission.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    text: String,
    credential: Option<Credential>,
    classification: Classification,
}

impl CommandRequest {
    /// Build a request from raw command text.
    ///
    /// Returns [`RunnerError::EmptyCommand`] for empty or whitespace-only text.
    pub fn new(text: impl AsRef<str>) -> Result<Self> {
        let text = text.as_ref().trim();
        if text.is_empty() {
            return Err(RunnerError::EmptyCommand);
        }
        Ok(Self {
            text: text.to_string(),
            credential: None,
            classification: classify(text),
        })
    }

    /// Attach a credential.
    pub fn with_credential(mut self, credential: impl Into<Credential>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Attach an optional credential; empty secrets count as absent.
    pub fn with_optional_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential.filter(|c| !c.is_empty());
        self
    }

    /// The trimmed command text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The attached credential, if any.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// How this request is routed.
    pub fn classification(&self) -> Classification {
        self.classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_trims_and_classifies() {
        let req = CommandRequest::new("  sudo apt update \n").unwrap();
        assert_eq!(req.text(), "sudo apt update");
        assert_eq!(req.classification(), Classification::Privileged);
        assert!(req.credential().is_none());
    }

    #[test]
    fn test_request_rejects_blank() {
        assert!(matches!(CommandRequest::new(""), Err(RunnerError::EmptyCommand)));
        assert!(matches!(CommandRequest::new(" \t\n"), Err(RunnerError::EmptyCommand)));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let req = CommandRequest::new("sudo ls").unwrap().with_credential("hunter2");
        let debug = format!("{:?}", req);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("Credential(***)"));
        assert_eq!(req.credential().map(Credential::expose), Some("hunter2"));
    }

    #[test]
    fn test_empty_credential_is_absent() {
        let req = CommandRequest::new("sudo ls")
            .unwrap()
            .with_optional_credential(Some(Credential::new("")));
        assert!(req.credential().is_none());
    }
}
