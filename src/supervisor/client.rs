//! Client handles registered with a supervisor.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::supervisor::LinkStatus;

/// Identity of a registered client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives status updates for one client.
///
/// Called with the supervisor lock held; implementations must not call back
/// into the supervisor.
pub trait StatusSink: Send + Sync {
    fn update(&self, status: LinkStatus);
}

impl<F> StatusSink for F
where
    F: Fn(LinkStatus) + Send + Sync,
{
    fn update(&self, status: LinkStatus) {
        self(status);
    }
}

/// A client's registration token.
///
/// Clones share the identity, so any clone can be used to unregister.
#[derive(Clone)]
pub struct ClientHandle {
    id: ClientId,
    sink: Arc<dyn StatusSink>,
}

impl ClientHandle {
    /// Create a handle with a fresh identity.
    pub fn new(sink: impl StatusSink + 'static) -> Self {
        Self {
            id: ClientId::new(),
            sink: Arc::new(sink),
        }
    }

    /// Create a handle that publishes its status on a watch channel.
    #[must_use]
    pub fn watch() -> (Self, watch::Receiver<LinkStatus>) {
        let (tx, rx) = watch::channel(LinkStatus::Disconnected);
        let handle = Self::new(move |status: LinkStatus| {
            tx.send_replace(status);
        });
        (handle, rx)
    }

    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Deliver a status update to this client.
    pub fn notify(&self, status: LinkStatus) {
        self.sink.update(status);
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle").field("id", &self.id).finish()
    }
}

impl PartialEq for ClientHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ClientHandle {}
