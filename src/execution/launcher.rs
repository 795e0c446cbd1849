//! Process launching.

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use super::classify::{privileged_body, Classification};
use super::request::{CommandRequest, Credential};
use crate::error::RunnerError;
use crate::Result;

/// Programs used to run commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    /// Shell program for normal commands.
    pub shell: String,
    /// Arguments placed before the command text (`-c`).
    pub shell_args: Vec<String>,
    /// Privileged-execution front-end (`sudo`).
    pub privileged_program: String,
    /// Arguments making the front-end read the credential from stdin.
    pub privileged_args: Vec<String>,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            shell: default_shell().to_string(),
            shell_args: default_shell_args(),
            privileged_program: "sudo".to_string(),
            // -S: read the password from stdin; -p "": no prompt text.
            privileged_args: vec!["-S".into(), "-p".into(), String::new()],
        }
    }
}

/// Shell used for normal commands on this platform.
pub fn default_shell() -> &'static str {
    #[cfg(unix)]
    {
        "/bin/sh"
    }
    #[cfg(windows)]
    {
        "cmd.exe"
    }
}

fn default_shell_args() -> Vec<String> {
    #[cfg(unix)]
    {
        vec!["-c".to_string()]
    }
    #[cfg(windows)]
    {
        vec!["/C".to_string()]
    }
}

/// A started child whose output has not been read yet.
pub struct SpawnedChild {
    /// The OS process; killed on drop if still running.
    pub child: Child,
    /// PID, which is also the process-group id on Unix.
    pub pid: u32,
    /// Combined stdout/stderr pipe.
    pub output: ChildStdout,
}

/// Start the subprocess for a `Normal` or `Privileged` request in `cwd`.
///
/// For privileged requests the credential is written to the child's stdin
/// followed by a newline, and stdin is closed.
pub async fn launch(
    settings: &LaunchSettings,
    request: &CommandRequest,
    cwd: &Path,
) -> Result<SpawnedChild> {
    let (mut command, program) = build_command(settings, request)?;
    command
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    if request.classification() == Classification::Privileged {
        command.stdin(Stdio::piped());
    } else {
        command.stdin(Stdio::null());
    }

    #[cfg(unix)]
    unsafe {
        command.pre_exec(crate::process::prepare_child);
    }

    let mut child = command.spawn().map_err(|source| RunnerError::Launch {
        program: program.clone(),
        source,
    })?;

    let pid = child.id().unwrap_or(0);
    let output = child.stdout.take().ok_or_else(|| RunnerError::Launch {
        program: program.clone(),
        source: std::io::Error::new(std::io::ErrorKind::Other, "stdout was not captured"),
    })?;
    debug!(pid, program = %program, cwd = %cwd.display(), "child spawned");

    if let Some(credential) = request.credential() {
        deliver_credential(&mut child, credential).await;
    }

    Ok(SpawnedChild { child, pid, output })
}

fn build_command(settings: &LaunchSettings, request: &CommandRequest) -> Result<(Command, String)> {
    match request.classification() {
        Classification::Normal => {
            let mut command = Command::new(&settings.shell);
            command
                .args(&settings.shell_args)
                .arg(shell_text(request.text()));
            Ok((command, settings.shell.clone()))
        }
        Classification::Privileged => {
            let body = privileged_body(request.text()).unwrap_or_default();
            let mut command = Command::new(&settings.privileged_program);
            command
                .args(&settings.privileged_args)
                .arg(&settings.shell)
                .args(&settings.shell_args)
                .arg(shell_text(body));
            Ok((command, settings.privileged_program.clone()))
        }
        other => Err(RunnerError::Launch {
            program: request.text().to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{other:?} commands do not start a process"),
            ),
        }),
    }
}

#[cfg(unix)]
fn shell_text(text: &str) -> String {
    text.to_string()
}

// cmd.exe has no pre-exec hook for merging stderr; ask the shell to do it.
#[cfg(not(unix))]
fn shell_text(text: &str) -> String {
    format!("{text} 2>&1")
}

async fn deliver_credential(child: &mut Child, credential: &Credential) {
    let Some(mut stdin) = child.stdin.take() else {
        return;
    };

    let mut line = String::with_capacity(credential.expose().len() + 1);
    line.push_str(credential.expose());
    line.push('\n');

    let written = async {
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await
    }
    .await;

    match written {
        Ok(()) => debug!("credential delivered"),
        // The helper may exit or skip authentication before reading stdin.
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
            debug!("credential not read: stdin closed early")
        }
        Err(e) => warn!(error = %e, "failed to deliver credential"),
    }
    // Dropping stdin closes the pipe.
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program_and_args(command: &Command) -> (String, Vec<String>) {
        let std = command.as_std();
        (
            std.get_program().to_string_lossy().into_owned(),
            std.get_args()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
        )
    }

    #[cfg(unix)]
    #[test]
    fn test_normal_command_runs_through_shell() {
        let request = CommandRequest::new("echo hi && ls").unwrap();
        let (command, program) = build_command(&LaunchSettings::default(), &request).unwrap();
        let (prog, args) = program_and_args(&command);

        assert_eq!(program, "/bin/sh");
        assert_eq!(prog, "/bin/sh");
        assert_eq!(args, vec!["-c", "echo hi && ls"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_privileged_command_uses_helper() {
        let request = CommandRequest::new("sudo apt install -y vim")
            .unwrap()
            .with_credential("pw");
        let (command, program) = build_command(&LaunchSettings::default(), &request).unwrap();
        let (prog, args) = program_and_args(&command);

        assert_eq!(program, "sudo");
        assert_eq!(prog, "sudo");
        assert_eq!(args, vec!["-S", "-p", "", "/bin/sh", "-c", "apt install -y vim"]);
        assert!(!args.iter().any(|a| a.contains("pw")));
    }

    #[test]
    fn test_builtin_cannot_be_launched() {
        let request = CommandRequest::new("clear").unwrap();
        assert!(build_command(&LaunchSettings::default(), &request).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_shell_is_launch_error() {
        let settings = LaunchSettings {
            shell: "/nonexistent/shell".into(),
            ..LaunchSettings::default()
        };
        let request = CommandRequest::new("true").unwrap();
        let cwd = std::env::temp_dir();

        let err = launch(&settings, &request, &cwd).await.err().unwrap();
        assert!(matches!(err, RunnerError::Launch { .. }));
        assert!(err.to_string().contains("/nonexistent/shell"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_is_merged_into_output() {
        use tokio::io::AsyncReadExt;

        let request = CommandRequest::new("echo out; echo err 1>&2").unwrap();
        let mut spawned = launch(&LaunchSettings::default(), &request, &std::env::temp_dir())
            .await
            .unwrap();

        let mut text = String::new();
        spawned.output.read_to_string(&mut text).await.unwrap();
        let status = spawned.child.wait().await.unwrap();

        assert!(status.success());
        assert_eq!(text, "out\nerr\n");
    }
}
