//! Integration tests for launching real worker processes.

use std::collections::BTreeMap;

use tokio_stream::StreamExt;

use hatlink::worker::{
    check_executable, classified_lines, diagnostic_chunks, write_line, CommandLauncher, Launcher,
    Line, LineLevel, SpawnError, WorkerExit,
};

#[test]
fn missing_executable_is_rejected() {
    let err = CommandLauncher::new("/nonexistent/automationhatlink.o1", BTreeMap::new())
        .unwrap_err();
    assert!(matches!(err, SpawnError::NotFound { .. }));
}

#[cfg(unix)]
#[test]
fn executable_bit_is_required() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("worker");
    std::fs::write(&path, "#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
    let err = tokio_test::assert_err!(check_executable(&path));
    assert!(matches!(err, SpawnError::NotExecutable { .. }));

    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    tokio_test::assert_ok!(check_executable(&path));
}

#[cfg(unix)]
#[tokio::test]
async fn launched_worker_echoes_input() {
    let launcher = CommandLauncher::new("/bin/cat", BTreeMap::new()).unwrap();
    assert_eq!(launcher.name(), "cat");
    let mut worker = launcher.launch().unwrap();

    write_line(&mut worker.stdin, "INFO: relay on\n").await.unwrap();
    write_line(&mut worker.stdin, "\n").await.unwrap();
    write_line(&mut worker.stdin, "ERROR relay stuck\n").await.unwrap();
    drop(worker.stdin);

    let lines: Vec<Line> = classified_lines(worker.stdout)
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(
        lines,
        vec![
            Line {
                level: LineLevel::Informational,
                text: "INFO: relay on".to_string(),
            },
            Line {
                level: LineLevel::Error,
                text: "ERROR relay stuck".to_string(),
            },
        ]
    );
    assert_eq!(worker.control.wait().await.unwrap(), WorkerExit::code(0));
}

#[cfg(unix)]
#[tokio::test]
async fn worker_receives_configured_env() {
    let env = BTreeMap::from([("HAT_RELAY".to_string(), "3".to_string())]);
    let launcher = CommandLauncher::new("/bin/sh", env).unwrap();
    let mut worker = launcher.launch().unwrap();

    write_line(&mut worker.stdin, "echo \"INFO: relay $HAT_RELAY\"\n")
        .await
        .unwrap();
    write_line(&mut worker.stdin, "exit 0\n").await.unwrap();

    let lines: Vec<Line> = classified_lines(worker.stdout)
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].text, "INFO: relay 3");
}

#[cfg(unix)]
#[tokio::test]
async fn stderr_is_read_as_raw_chunks() {
    let launcher = CommandLauncher::new("/bin/sh", BTreeMap::new()).unwrap();
    let mut worker = launcher.launch().unwrap();

    write_line(&mut worker.stdin, "echo oops 1>&2\n").await.unwrap();
    write_line(&mut worker.stdin, "exit 0\n").await.unwrap();

    let text: String = diagnostic_chunks(worker.stderr)
        .map(Result::unwrap)
        .collect::<Vec<_>>()
        .await
        .concat();
    assert_eq!(text, "oops\n");
}

#[cfg(unix)]
#[tokio::test]
async fn kill_reports_signal() {
    let launcher = CommandLauncher::new("/bin/cat", BTreeMap::new()).unwrap();
    let mut worker = launcher.launch().unwrap();
    assert!(worker.control.id().is_some());

    let exit = worker.control.kill().await.unwrap();

    assert_eq!(exit, WorkerExit::signal(9));
    assert!(exit.to_string().contains("SIGKILL"));
}
