//! Startup gate latch.
//!
//! The API server must not accept requests until the connector catalog has
//! been reconciled somewhere in the fleet. This latch releases exactly once
//! per process, either when this replica's startup reconcile completes or
//! when the probe observes a peer's completion.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// One-shot readiness latch, shared between the reconciler (writer) and any
/// number of waiting tasks (readers).
#[derive(Clone)]
pub struct ReadyCondition {
    inner: Arc<ReadyInner>,
}

struct ReadyInner {
    released: AtomicBool,
    notify: Notify,
}

impl ReadyCondition {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ReadyInner {
                released: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Release the latch. Idempotent; only the first call wakes waiters.
    pub fn release(&self) {
        if !self.inner.released.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Wait until the latch releases. Returns immediately once released.
    pub async fn released(&self) {
        while !self.inner.released.load(Ordering::Acquire) {
            let notified = self.inner.notify.notified();
            // Re-check after registering: a release between the check and the
            // registration must not strand this waiter.
            if self.inner.released.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ReadyCondition {
    fn default() -> Self {
        Self::new()
    }
}
