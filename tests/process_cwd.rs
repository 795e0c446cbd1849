//! Directory changes against the real process working directory.
//!
//! Kept in its own test binary: it changes the cwd of the whole process.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use shell_runner::{Engine, EngineConfig, ProcessWorkingDirectory, SessionState};

#[tokio::test]
async fn test_cd_changes_process_directory() {
    let original = std::env::current_dir().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let target = std::fs::canonicalize(dir.path()).unwrap();

    let (engine, mut events) =
        Engine::new(EngineConfig::default(), Arc::new(ProcessWorkingDirectory::new())).unwrap();

    let id = engine
        .submit(&format!("cd {}", target.display()), None)
        .unwrap();
    let t = tokio::time::timeout(Duration::from_secs(10), events.transcript(id))
        .await
        .unwrap();
    assert_eq!(t.state, Some(SessionState::Succeeded));
    assert_eq!(std::env::current_dir().unwrap(), target);

    let id = engine.submit("pwd -P", None).unwrap();
    let t = tokio::time::timeout(Duration::from_secs(10), events.transcript(id))
        .await
        .unwrap();
    assert_eq!(t.output(), format!("{}\n", target.display()));

    let id = engine.submit("cd /definitely/not/here", None).unwrap();
    let t = tokio::time::timeout(Duration::from_secs(10), events.transcript(id))
        .await
        .unwrap();
    assert_eq!(t.state, Some(SessionState::Failed));
    assert_eq!(std::env::current_dir().unwrap(), target);

    std::env::set_current_dir(original).unwrap();
}
