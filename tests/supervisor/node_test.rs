//! Integration tests for the host-side output node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;

use hatlink::node::OutputNode;
use hatlink::supervisor::{LinkState, LinkStatus};

use crate::common::{settle, supervisor};

#[tokio::test(start_paused = true)]
async fn open_reports_connected_status() {
    let (supervisor, launcher) = supervisor();
    let (handle_tx, status) = tokio::sync::watch::channel(LinkStatus::Disconnected);

    let node = OutputNode::open(&supervisor, move |s: LinkStatus| {
        handle_tx.send_replace(s);
    });

    assert_eq!(node.initial_status(), LinkStatus::Connected);
    assert_eq!(*status.borrow(), LinkStatus::Connected);
    assert_eq!(launcher.spawned(), 1);
    assert_eq!(supervisor.client_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn input_forwards_scalar_payloads() {
    let (supervisor, launcher) = supervisor();
    let node = OutputNode::open(&supervisor, |_: LinkStatus| {});

    assert!(node.input(&json!(true)));
    assert!(node.input(&json!(42)));
    assert!(node.input(&json!(1.5)));
    assert!(node.input(&json!("toggle")));
    settle().await;

    assert_eq!(launcher.worker(0).input(), "true\n42\n1.5\ntoggle\n");
}

#[tokio::test(start_paused = true)]
async fn input_ignores_structured_payloads() {
    let (supervisor, launcher) = supervisor();
    let node = OutputNode::open(&supervisor, |_: LinkStatus| {});

    assert!(!node.input(&json!(null)));
    assert!(!node.input(&json!({"relay": 1})));
    assert!(!node.input(&json!([1, 2])));
    settle().await;

    assert_eq!(launcher.worker(0).input(), "");
}

#[tokio::test(start_paused = true)]
async fn close_unregisters_and_signals_done() {
    let (supervisor, _launcher) = supervisor();
    let node = OutputNode::open(&supervisor, |_: LinkStatus| {});
    let other = OutputNode::open(&supervisor, |_: LinkStatus| {});
    let done = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&done);
    node.close(move || flag.store(true, Ordering::SeqCst));

    assert!(done.load(Ordering::SeqCst));
    assert_eq!(supervisor.client_count(), 1);
    assert_eq!(supervisor.state(), LinkState::Connected);

    other.close(|| {});
    assert_eq!(supervisor.state(), LinkState::TeardownPending);
}
