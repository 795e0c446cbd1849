//! Working-directory context shared by all sessions.
//!
//! Directory changes are the only state that outlives a single command. The
//! engine reads and writes it exclusively through [`WorkingDirectory`], so the
//! real process cwd can be swapped for an in-memory one in tests.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Serializes mutations of the real process working directory.
static PROCESS_CWD_LOCK: Mutex<()> = Mutex::new(());

/// Source of the directory new child processes start in.
pub trait WorkingDirectory: Send + Sync {
    /// The current working directory.
    fn current(&self) -> io::Result<PathBuf>;

    /// Change the working directory and return the resolved new directory.
    ///
    /// Relative targets resolve against [`current`](Self::current). On error
    /// the directory is left unchanged.
    fn change_to(&self, target: &Path) -> io::Result<PathBuf>;
}

/// The hosting process's own current directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessWorkingDirectory;

impl ProcessWorkingDirectory {
    /// Create a handle to the process working directory.
    pub fn new() -> Self {
        Self
    }
}

impl WorkingDirectory for ProcessWorkingDirectory {
    fn current(&self) -> io::Result<PathBuf> {
        std::env::current_dir()
    }

    fn change_to(&self, target: &Path) -> io::Result<PathBuf> {
        let _guard = PROCESS_CWD_LOCK
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "working directory lock poisoned"))?;
        std::env::set_current_dir(target)?;
        std::env::current_dir()
    }
}

/// A working directory tracked in memory, independent of the process cwd.
#[derive(Debug)]
pub struct IsolatedWorkingDirectory {
    cwd: Mutex<PathBuf>,
}

impl IsolatedWorkingDirectory {
    /// Start in the given directory.
    pub fn new(initial: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Mutex::new(initial.into()),
        }
    }
}

impl WorkingDirectory for IsolatedWorkingDirectory {
    fn current(&self) -> io::Result<PathBuf> {
        self.cwd
            .lock()
            .map(|cwd| cwd.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "working directory lock poisoned"))
    }

    fn change_to(&self, target: &Path) -> io::Result<PathBuf> {
        let mut cwd = self
            .cwd
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "working directory lock poisoned"))?;

        let resolved = std::fs::canonicalize(cwd.join(target))?;
        if !std::fs::metadata(&resolved)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("not a directory: {}", resolved.display()),
            ));
        }

        *cwd = resolved.clone();
        Ok(resolved)
    }
}

/// Expand a leading `~` to the user's home directory.
///
/// `~user` forms are left untouched.
pub fn expand_home(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (path, home) {
        ("~", Some(home)) => home,
        (p, Some(home)) if p.starts_with("~/") => home.join(&p[2..]),
        (p, _) => PathBuf::from(p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolated_change_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = IsolatedWorkingDirectory::new("/");

        let changed = ctx.change_to(dir.path()).unwrap();
        assert_eq!(changed, std::fs::canonicalize(dir.path()).unwrap());
        assert_eq!(ctx.current().unwrap(), changed);
    }

    #[test]
    fn test_isolated_change_relative() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("child")).unwrap();
        let ctx = IsolatedWorkingDirectory::new(std::fs::canonicalize(dir.path()).unwrap());

        let changed = ctx.change_to(Path::new("child")).unwrap();
        assert!(changed.ends_with("child"));

        let back = ctx.change_to(Path::new("..")).unwrap();
        assert_eq!(back, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_isolated_missing_leaves_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = IsolatedWorkingDirectory::new(dir.path());

        let err = ctx.change_to(Path::new("does/not/exist")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(ctx.current().unwrap(), dir.path());
    }

    #[test]
    fn test_isolated_file_is_not_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();
        let ctx = IsolatedWorkingDirectory::new(dir.path());

        let err = ctx.change_to(&file).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
        assert_eq!(ctx.current().unwrap(), dir.path());
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = std::env::var_os("HOME") {
            let home = PathBuf::from(home);
            assert_eq!(expand_home("~"), home);
            assert_eq!(expand_home("~/projects"), home.join("projects"));
        }
        assert_eq!(expand_home("/tmp"), PathBuf::from("/tmp"));
        assert_eq!(expand_home("~other/x"), PathBuf::from("~other/x"));
    }
}
