//! Command-line interface for shell-runner.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Timeout for ordinary commands, in seconds.
    pub short_timeout: Option<u64>,
    /// Timeout for install/upgrade/update commands, in seconds.
    pub long_timeout: Option<u64>,
    /// Grace window between SIGTERM and SIGKILL, in milliseconds.
    pub grace_ms: Option<u64>,
    /// Command to run once; empty means interactive mode.
    pub command: Vec<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

impl Args {
    /// The one-shot command line, if one was given.
    pub fn command_line(&self) -> Option<String> {
        if self.command.is_empty() {
            None
        } else {
            Some(self.command.join(" "))
        }
    }
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
///
/// The first positional word starts the command; it and everything after it
/// are taken verbatim, so the command's own flags are not interpreted.
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Long("short-timeout") => {
                result.short_timeout = Some(number(&mut parser, "short-timeout")?);
            }
            Long("long-timeout") => {
                result.long_timeout = Some(number(&mut parser, "long-timeout")?);
            }
            Long("grace-ms") => {
                result.grace_ms = Some(number(&mut parser, "grace-ms")?);
            }
            Value(val) => {
                result.command.push(val.string()?);
                for raw in parser.raw_args()? {
                    result.command.push(raw.to_string_lossy().into_owned());
                }
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn number(parser: &mut lexopt::Parser, name: &'static str) -> Result<u64, ArgsError> {
    use lexopt::ValueExt;

    let value: String = parser.value()?.parse()?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidValue(name, value))
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"shell-runner {version}
Run shell commands with streamed output, timeouts and sudo support

USAGE:
    shell-runner [OPTIONS] [COMMAND]...

Without a command, reads commands from standard input, one per line.
Ctrl-C cancels the running command. `history` lists the commands entered
so far; `exit` or `quit` leaves.

OPTIONS:
    -c, --config <FILE>       Path to configuration file (JSON)
    -l, --log-level <LVL>     Log level (error, warn, info, debug, trace)
        --short-timeout <S>   Timeout for ordinary commands [default: 30]
        --long-timeout <S>    Timeout for install/upgrade/update [default: 300]
        --grace-ms <MS>       Wait between SIGTERM and SIGKILL [default: 3000]
    -h, --help                Print help
    -V, --version             Print version

ENVIRONMENT VARIABLES:
    SHELL_RUNNER_SHORT_TIMEOUT  Short timeout in seconds (overrides config)
    SHELL_RUNNER_LONG_TIMEOUT   Long timeout in seconds (overrides config)
    SHELL_RUNNER_SHELL          Shell program (overrides config)
    SHELL_RUNNER_LOG_LEVEL      Log level (overrides config)
    RUST_LOG                    Alternative log level setting

EXAMPLES:
    # Run one command
    shell-runner ls -la

    # Interactive, with a config file
    shell-runner -c ~/.config/shell-runner.json

    # Give slow commands more time
    shell-runner --short-timeout 120 make
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("shell-runner {}", env!("CARGO_PKG_VERSION"));
}

/// Commands entered in interactive mode, oldest first.
///
/// A command equal to the one entered just before it is not recorded again.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<String>,
}

impl History {
    /// Record a command. Returns `false` if it was blank or repeated the
    /// previous entry.
    pub fn push(&mut self, command: &str) -> bool {
        let command = command.trim();
        if command.is_empty() || self.entries.last().is_some_and(|last| last == command) {
            return false;
        }
        self.entries.push(command.to_string());
        true
    }

    /// Numbered listing, one command per line.
    pub fn listing(&self) -> String {
        self.entries
            .iter()
            .enumerate()
            .map(|(n, command)| format!("{:>5}  {command}\n", n + 1))
            .collect()
    }
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(args: &[&str]) -> Vec<OsString> {
        std::iter::once("shell-runner")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn test_history_skips_consecutive_duplicates() {
        let mut history = History::default();
        assert!(history.push("ls"));
        assert!(!history.push("ls"));
        assert!(!history.push("  ls "));
        assert!(history.push("pwd"));
        assert!(history.push("ls"));
        assert_eq!(history.listing(), "    1  ls\n    2  pwd\n    3  ls\n");
    }

    #[test]
    fn test_history_ignores_blank_lines() {
        let mut history = History::default();
        assert!(!history.push("   "));
        assert_eq!(history.listing(), "");
    }

    #[test]
    fn test_history_listing() {
        let mut history = History::default();
        history.push("cd /tmp");
        history.push("sudo apt update");
        assert_eq!(history.listing(), "    1  cd /tmp\n    2  sudo apt update\n");
    }

    #[test]
    fn test_default_args() {
        let result = parse_args_from(args(&[])).unwrap();
        assert!(result.command.is_empty());
        assert!(result.command_line().is_none());
        assert!(result.short_timeout.is_none());
    }

    #[test]
    fn test_config_file() {
        let result = parse_args_from(args(&["-c", "/etc/config.json"])).unwrap();
        assert_eq!(result.config, Some(PathBuf::from("/etc/config.json")));
    }

    #[test]
    fn test_timeouts() {
        let result = parse_args_from(args(&[
            "--short-timeout",
            "5",
            "--long-timeout",
            "600",
            "--grace-ms",
            "250",
        ]))
        .unwrap();
        assert_eq!(result.short_timeout, Some(5));
        assert_eq!(result.long_timeout, Some(600));
        assert_eq!(result.grace_ms, Some(250));
    }

    #[test]
    fn test_invalid_timeout() {
        let err = parse_args_from(args(&["--short-timeout", "soon"])).unwrap_err();
        assert!(err.to_string().contains("short-timeout"));
    }

    #[test]
    fn test_command_words_are_verbatim() {
        let result = parse_args_from(args(&["-l", "debug", "ls", "-l", "--help"])).unwrap();
        assert_eq!(result.log_level, Some("debug".to_string()));
        assert!(!result.help);
        assert_eq!(result.command_line(), Some("ls -l --help".to_string()));
    }

    #[test]
    fn test_double_dash_starts_command() {
        let result = parse_args_from(args(&["--", "-V"])).unwrap();
        assert!(!result.version);
        assert_eq!(result.command, vec!["-V"]);
    }

    #[test]
    fn test_help_flag() {
        let result = parse_args_from(args(&["-h"])).unwrap();
        assert!(result.help);

        let result = parse_args_from(args(&["--help"])).unwrap();
        assert!(result.help);
    }

    #[test]
    fn test_version_flag() {
        let result = parse_args_from(args(&["-V"])).unwrap();
        assert!(result.version);

        let result = parse_args_from(args(&["--version"])).unwrap();
        assert!(result.version);
    }

    #[test]
    fn test_unknown_option() {
        assert!(parse_args_from(args(&["--port", "80"])).is_err());
    }
}
