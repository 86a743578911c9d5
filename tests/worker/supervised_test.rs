//! End-to-end tests supervising a shell as the worker.

use std::time::Duration;

use hatlink::config::WorkerConfig;
use hatlink::supervisor::{ClientHandle, LinkState, LinkStatus, Supervisor};
use hatlink::worker::Payload;

const WAIT: Duration = Duration::from_secs(10);

fn shell_config() -> WorkerConfig {
    WorkerConfig {
        reconnect_delay_ms: 60_000,
        ..WorkerConfig::with_path("/bin/sh")
    }
}

async fn wait_for_state(supervisor: &Supervisor, expected: LinkState) {
    let mut states = supervisor.subscribe();
    tokio::time::timeout(WAIT, states.wait_for(|state| *state == expected))
        .await
        .expect("timed out waiting for state")
        .expect("supervisor dropped");
}

#[cfg(unix)]
#[tokio::test]
async fn fatal_line_from_worker_triggers_reconnect() {
    let supervisor = Supervisor::new(&shell_config()).unwrap();
    let (handle, status) = ClientHandle::watch();

    assert_eq!(supervisor.register(handle), LinkStatus::Connected);
    assert!(supervisor.pid().is_some());

    supervisor.send(&Payload::from("echo FATAL: relay stuck"));
    wait_for_state(&supervisor, LinkState::ReconnectPending).await;

    assert_eq!(*status.borrow(), LinkStatus::Disconnected);
    assert_eq!(supervisor.stats().device_faults, 1);
    assert_eq!(supervisor.stats().unexpected_exits, 1);

    supervisor.shutdown().await;
    assert_eq!(supervisor.state(), LinkState::Disconnected);
}

#[cfg(unix)]
#[tokio::test]
async fn stderr_from_worker_triggers_reconnect() {
    let supervisor = Supervisor::new(&shell_config()).unwrap();
    let (handle, status) = ClientHandle::watch();
    supervisor.register(handle);

    supervisor.send(&Payload::from("echo oops 1>&2"));
    wait_for_state(&supervisor, LinkState::ReconnectPending).await;

    assert_eq!(*status.borrow(), LinkStatus::Disconnected);
    assert_eq!(supervisor.stats().device_faults, 1);
}

#[cfg(unix)]
#[tokio::test]
async fn idle_worker_is_torn_down() {
    let config = WorkerConfig {
        teardown_delay_ms: 100,
        ..shell_config()
    };
    let supervisor = Supervisor::new(&config).unwrap();
    let (handle, _status) = ClientHandle::watch();
    let id = handle.id();
    supervisor.register(handle);

    supervisor.unregister(id);
    assert_eq!(supervisor.state(), LinkState::TeardownPending);
    wait_for_state(&supervisor, LinkState::Disconnected).await;

    assert_eq!(supervisor.stats().teardowns, 1);
    assert_eq!(supervisor.stats().unexpected_exits, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn worker_exiting_on_its_own_is_unexpected() {
    let supervisor = Supervisor::new(&shell_config()).unwrap();
    let (handle, _status) = ClientHandle::watch();
    supervisor.register(handle);

    supervisor.send(&Payload::from("exit 3"));
    wait_for_state(&supervisor, LinkState::ReconnectPending).await;

    assert_eq!(supervisor.stats().unexpected_exits, 1);
    assert_eq!(supervisor.stats().device_faults, 0);
}
