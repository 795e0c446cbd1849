//! Output sanitization for stripping ANSI escape codes.

use vte::{Params, Parser, Perform};

/// Output sanitizer using VTE parser.
pub struct OutputSanitizer;

impl OutputSanitizer {
    /// Strip ANSI escape codes from raw bytes.
    ///
    /// Returns UTF-8 text with control sequences removed. Newlines, carriage
    /// returns and tabs survive; text without any control bytes is returned
    /// unchanged.
    pub fn strip_ansi(input: &[u8]) -> String {
        if !Self::needs_sanitizing(input) {
            return String::from_utf8_lossy(input).into_owned();
        }

        let mut extractor = PlainTextExtractor::with_capacity(input.len());
        let mut parser = Parser::new();
        parser.advance(&mut extractor, input);
        extractor.into_string()
    }

    /// Strip ANSI codes from a string.
    pub fn strip_ansi_str(input: &str) -> String {
        Self::strip_ansi(input.as_bytes())
    }

    /// Whether the input contains control bytes other than `\n`, `\r`, `\t`.
    pub fn needs_sanitizing(input: &[u8]) -> bool {
        input
            .iter()
            .any(|&b| (b < 0x20 && !matches!(b, b'\n' | b'\r' | b'\t')) || b == 0x7f)
    }
}

/// VTE performer that keeps printable text only.
struct PlainTextExtractor {
    output: String,
}

impl PlainTextExtractor {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            output: String::with_capacity(capacity),
        }
    }

    fn into_string(self) -> String {
        self.output
    }
}

impl Perform for PlainTextExtractor {
    fn print(&mut self, c: char) {
        self.output.push(c);
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.output.push(byte as char);
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    fn put(&mut self, _byte: u8) {}

    fn unhook(&mut self) {}

    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}

    fn csi_dispatch(
        &mut self,
        _params: &Params,
        _intermediates: &[u8],
        _ignore: bool,
        _action: char,
    ) {
    }

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line_unchanged() {
        assert_eq!(OutputSanitizer::strip_ansi(b"hello world\n"), "hello world\n");
    }

    #[test]
    fn test_strip_color_codes() {
        assert_eq!(OutputSanitizer::strip_ansi(b"\x1b[31mred\x1b[0m\n"), "red\n");
    }

    #[test]
    fn test_strip_cursor_movement() {
        assert_eq!(OutputSanitizer::strip_ansi(b"\x1b[2J\x1b[Hcontent"), "content");
    }

    #[test]
    fn test_osc_title() {
        let input = b"\x1b]0;Window Title\x07actual content";
        assert_eq!(OutputSanitizer::strip_ansi(input), "actual content");
    }

    #[test]
    fn test_progress_carriage_return_kept() {
        let input = b"\x1b[32m 50%\r100%\x1b[0m\n";
        assert_eq!(OutputSanitizer::strip_ansi(input), " 50%\r100%\n");
    }

    #[test]
    fn test_tabs_kept() {
        assert_eq!(OutputSanitizer::strip_ansi(b"col1\tcol2\n"), "col1\tcol2\n");
    }

    #[test]
    fn test_utf8_passthrough() {
        assert_eq!(OutputSanitizer::strip_ansi_str("📂 día\n"), "📂 día\n");
        assert_eq!(
            OutputSanitizer::strip_ansi_str("\x1b[1m📂 día\x1b[0m\n"),
            "📂 día\n"
        );
    }

    #[test]
    fn test_needs_sanitizing() {
        assert!(!OutputSanitizer::needs_sanitizing(b"a\tb\r\n"));
        assert!(OutputSanitizer::needs_sanitizing(b"\x1b[0m"));
        assert!(OutputSanitizer::needs_sanitizing(b"bell\x07"));
    }

    #[test]
    fn test_only_escape_codes() {
        assert_eq!(OutputSanitizer::strip_ansi(b"\x1b[31m\x1b[0m\x1b[2J"), "");
    }
}
