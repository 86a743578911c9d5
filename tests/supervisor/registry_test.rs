//! Integration tests for the supervisor registry.

use std::fs;

use hatlink::config::WorkerConfig;
use hatlink::supervisor::{SupervisorError, SupervisorRegistry};
use hatlink::worker::SpawnError;

#[cfg(unix)]
fn executable(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join(name);
    fs::write(&path, "#!/bin/sh\ncat\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
#[tokio::test]
async fn same_worker_path_shares_supervisor() {
    let dir = tempfile::tempdir().unwrap();
    let config = WorkerConfig::with_path(executable(&dir, "worker"));
    let registry = SupervisorRegistry::new();

    let a = registry.get_or_init(&config).unwrap();
    let b = registry.get_or_init(&config).unwrap();

    assert!(a.ptr_eq(&b));
    assert_eq!(registry.len(), 1);
    assert!(registry.get(&config.path).unwrap().ptr_eq(&a));
}

#[cfg(unix)]
#[tokio::test]
async fn different_worker_paths_get_separate_supervisors() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SupervisorRegistry::new();

    let a = registry
        .get_or_init(&WorkerConfig::with_path(executable(&dir, "left")))
        .unwrap();
    let b = registry
        .get_or_init(&WorkerConfig::with_path(executable(&dir, "right")))
        .unwrap();

    assert!(!a.ptr_eq(&b));
    assert_eq!(registry.len(), 2);
}

#[test]
fn missing_worker_is_not_registered() {
    let registry = SupervisorRegistry::new();
    let config = WorkerConfig::with_path("/nonexistent/automationhatlink.o1");

    let err = registry.get_or_init(&config).unwrap_err();

    assert!(matches!(
        err,
        SupervisorError::Worker(SpawnError::NotFound { .. })
    ));
    assert!(registry.is_empty());
}

#[cfg(unix)]
#[test]
fn non_executable_worker_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("worker");
    fs::write(&path, "not a program").unwrap();
    let registry = SupervisorRegistry::new();

    let err = registry
        .get_or_init(&WorkerConfig::with_path(&path))
        .unwrap_err();

    assert!(matches!(
        err,
        SupervisorError::Worker(SpawnError::NotExecutable { .. })
    ));
    assert!(err.to_string().contains("worker"));
}

#[cfg(unix)]
#[tokio::test]
async fn shutdown_all_closes_every_supervisor() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SupervisorRegistry::new();
    let a = registry
        .get_or_init(&WorkerConfig::with_path(executable(&dir, "left")))
        .unwrap();
    let b = registry
        .get_or_init(&WorkerConfig::with_path(executable(&dir, "right")))
        .unwrap();

    registry.shutdown_all().await;

    assert!(registry.is_empty());
    assert!(a.is_closed());
    assert!(b.is_closed());
}
