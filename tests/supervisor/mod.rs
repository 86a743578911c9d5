//! Supervisor module tests.

mod node_test;
mod registry_test;

/// Verify all public supervisor types are exported from the library.
#[test]
fn test_all_supervisor_types_exported() {
    use hatlink::supervisor::{
        ClientHandle, ClientId, Fill, LinkState, LinkStats, LinkStatus, Shape, StatusIndicator,
        Supervisor, SupervisorError, SupervisorRegistry, Timings, DEFAULT_RECONNECT_DELAY,
        DEFAULT_TEARDOWN_DELAY, STOP_DIRECTIVE,
    };

    let _ = SupervisorRegistry::new();
    let _ = ClientId::new();
    let (handle, _status) = ClientHandle::watch();
    let _ = handle.id();

    let indicator: StatusIndicator = LinkStatus::Disconnected.indicator();
    assert_eq!(indicator.fill, Fill::Red);
    assert_eq!(indicator.shape, Shape::Ring);
    assert_eq!(LinkState::default(), LinkState::Disconnected);
    assert_eq!(LinkStats::default().spawns, 0);
    assert_eq!(Timings::default().reconnect_delay, DEFAULT_RECONNECT_DELAY);
    assert_eq!(Timings::default().teardown_delay, DEFAULT_TEARDOWN_DELAY);
    assert_eq!(STOP_DIRECTIVE, "stop");

    let _: fn(&hatlink::config::WorkerConfig) -> Result<Supervisor, SupervisorError> =
        Supervisor::new;
}
