//! Host-side output node.
//!
//! An [`OutputNode`] is what a host integration creates per configured
//! device output. It registers with the shared supervisor when opened,
//! forwards accepted messages and unregisters when closed.

use serde_json::Value;

use crate::supervisor::{ClientHandle, ClientId, LinkStatus, StatusSink, Supervisor};
use crate::worker::Payload;

/// A client of the supervisor that forwards host messages to the worker.
#[derive(Debug)]
pub struct OutputNode {
    supervisor: Supervisor,
    handle: ClientHandle,
    initial_status: LinkStatus,
}

impl OutputNode {
    /// Register a new node with `supervisor`.
    ///
    /// `sink` receives every status change for this node, starting with the
    /// status at registration.
    pub fn open(supervisor: &Supervisor, sink: impl StatusSink + 'static) -> Self {
        let handle = ClientHandle::new(sink);
        let initial_status = supervisor.register(handle.clone());
        tracing::trace!(client = %handle.id(), ?initial_status, "Output node opened");
        Self {
            supervisor: supervisor.clone(),
            handle,
            initial_status,
        }
    }

    #[must_use]
    pub fn id(&self) -> ClientId {
        self.handle.id()
    }

    /// Status reported when the node was opened.
    #[must_use]
    pub fn initial_status(&self) -> LinkStatus {
        self.initial_status
    }

    /// Handle an incoming message payload.
    ///
    /// Booleans, numbers and strings are sent to the worker; other values are
    /// ignored. Returns whether the payload was accepted.
    pub fn input(&self, payload: &Value) -> bool {
        let Some(payload) = Payload::from_value(payload) else {
            tracing::trace!(client = %self.id(), "Ignoring payload that is not a boolean, number or string");
            return false;
        };
        tracing::trace!(client = %self.id(), %payload, "Sending payload to worker");
        self.supervisor.send(&payload);
        true
    }

    /// Unregister from the supervisor, then signal completion.
    pub fn close<F: FnOnce()>(self, done: F) {
        self.supervisor.unregister(self.handle.id());
        done();
    }
}
