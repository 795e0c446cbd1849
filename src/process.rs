//! Process-group helpers for reliable child cleanup.
//!
//! Every child is started as the leader of its own process group, so a
//! termination signal reaches the command and anything it spawned, not
//! only the immediate shell.

use std::io;

/// Signals used by the lifecycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSignal {
    /// SIGTERM - allows graceful shutdown.
    Term,
    /// SIGKILL - immediate termination.
    Kill,
}

#[cfg(unix)]
impl KillSignal {
    fn as_libc_signal(self) -> libc::c_int {
        match self {
            KillSignal::Term => libc::SIGTERM,
            KillSignal::Kill => libc::SIGKILL,
        }
    }
}

/// Runs in the forked child before exec.
///
/// Makes the child a process-group leader and points stderr at the stdout
/// pipe, so both streams arrive interleaved in production order.
///
/// Only async-signal-safe calls are allowed here.
#[cfg(unix)]
pub(crate) fn prepare_child() -> io::Result<()> {
    if unsafe { libc::setpgid(0, 0) } == -1 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Send a signal to a whole process group (best-effort).
///
/// A group that no longer exists is not an error.
#[cfg(unix)]
pub fn signal_process_group(process_group_id: u32, signal: KillSignal) -> io::Result<()> {
    let pgid = process_group_id as libc::pid_t;
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "refusing to signal process group 0",
        ));
    }

    if unsafe { libc::killpg(pgid, signal.as_libc_signal()) } == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

/// No process groups on this platform; the child itself is killed by the caller.
#[cfg(not(unix))]
pub fn signal_process_group(_process_group_id: u32, _signal: KillSignal) -> io::Result<()> {
    Ok(())
}

/// Check if a process (by PID) still exists, zombies included.
#[cfg(unix)]
pub fn is_process_running(pid: u32) -> bool {
    // Signal 0 only checks existence.
    if unsafe { libc::kill(pid as libc::pid_t, 0) } == 0 {
        return true;
    }
    // EPERM: exists but belongs to someone else.
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn is_process_running(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_self_is_running() {
        assert!(is_process_running(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonexistent_is_not_running() {
        assert!(!is_process_running(2_000_000_000));
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_missing_group_is_ok() {
        assert!(signal_process_group(2_000_000_000, KillSignal::Term).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_refuses_group_zero() {
        assert!(signal_process_group(0, KillSignal::Kill).is_err());
    }

    #[test]
    fn test_signals_distinct() {
        assert_ne!(KillSignal::Term, KillSignal::Kill);
    }
}
