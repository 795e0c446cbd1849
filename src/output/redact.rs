//! Credential redaction for privileged sessions.
//!
//! Two layers with different strength:
//! - prompt suppression drops any line mentioning "password". It is a
//!   heuristic for hiding the helper's prompts and may drop legitimate output.
//! - secret masking replaces every occurrence of the credential. This one is
//!   a guarantee: no payload that passed through [`Redactor::redact`] contains
//!   the secret.

use crate::execution::Credential;

const MASK: &str = "********";
const ALT_MASK: &str = "[REDACTED]";
const PROMPT_MARKER: &str = "password";

/// Filters the output of one session.
#[derive(Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
    suppress_prompts: bool,
}

impl Redactor {
    /// A redactor that changes nothing.
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// A redactor for a privileged session using `credential`.
    ///
    /// A multi-line secret is masked line by line, since events never span
    /// a line break.
    pub fn for_credential(credential: &Credential) -> Self {
        let secrets = credential
            .expose()
            .split(['\n', '\r'])
            .filter(|piece| !piece.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            secrets,
            suppress_prompts: true,
        }
    }

    /// Length in bytes of the longest secret.
    pub fn longest_secret(&self) -> usize {
        self.secrets.iter().map(String::len).max().unwrap_or(0)
    }

    /// Mask every occurrence of every secret.
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            let mask = mask_for(secret);
            // A replacement can splice a new occurrence out of the mask and the
            // surrounding text; repeat until none is left. Each pass removes
            // characters the mask does not contain, so this terminates.
            while out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), mask);
            }
        }
        out
    }

    /// Byte-level masking for partially received output.
    pub fn redact_bytes(&self, bytes: &[u8]) -> Vec<u8> {
        let mut out = bytes.to_vec();
        for secret in &self.secrets {
            let needle = secret.as_bytes();
            let mask = mask_for(secret).as_bytes();
            while let Some(pos) = find(&out, needle) {
                out.splice(pos..pos + needle.len(), mask.iter().copied());
            }
        }
        out
    }

    /// Process one output line: `None` when it must be suppressed, otherwise
    /// the line with every secret masked.
    pub fn filter_line(&self, line: &str) -> Option<String> {
        if self.suppress_prompts && line.to_lowercase().contains(PROMPT_MARKER) {
            return None;
        }
        Some(self.redact(line))
    }
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("secrets", &self.secrets.len())
            .field("suppress_prompts", &self.suppress_prompts)
            .finish()
    }
}

fn mask_for(secret: &str) -> &'static str {
    if secret.chars().all(|c| c == '*') {
        ALT_MASK
    } else {
        MASK
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
