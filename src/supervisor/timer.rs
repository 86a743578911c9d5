//! One-shot cancelable timers.

use std::time::Duration;

use tokio_util::sync::{CancellationToken, DropGuard};

/// A scheduled callback that is canceled when the timer is dropped.
///
/// Cancellation races with firing: a callback that already started still
/// runs, so callers identify timers by [`Timer::id`] and ignore stale fires.
#[derive(Debug)]
pub(crate) struct Timer {
    id: u64,
    _guard: DropGuard,
}

impl Timer {
    /// Run `on_fire` after `delay` unless the timer is dropped first.
    ///
    /// Must be called within a tokio runtime.
    pub(crate) fn schedule<F>(id: u64, delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;

                () = cancelled.cancelled() => {}
                () = tokio::time::sleep(delay) => on_fire(),
            }
        });

        Self {
            id,
            _guard: token.drop_guard(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}
