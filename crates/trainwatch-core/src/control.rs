//! Shared control state between the reconciliation loop and its clients.
//!
//! The loop task owns the engine exclusively. Anything else that wants to
//! change it (the observer API, the shutdown handler) goes through
//! [`EngineControl`]: a stop flag and a queue of requests drained at the
//! start of each tick.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Notify};
use trainwatch_types::EntityId;

/// A request applied by the loop at its next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// Select an entity for the details panel.
    Select(EntityId),
    /// Clear the selection.
    ClearSelection,
    /// Cancel every running interpolation.
    ResetViewport {
        /// Snap interrupted markers to their targets.
        snap_to_target: bool,
    },
}

/// Stop flag and request queue shared with the reconciliation loop.
#[derive(Debug, Default)]
pub struct EngineControl {
    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Wakes the loop when a stop is requested.
    stop_notify: Notify,

    /// Requests waiting for the next tick.
    requests: Mutex<Vec<ControlRequest>>,
}

impl EngineControl {
    /// Fresh control state: running, no pending requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop (and anything else waiting on [`stopped`](Self::stopped))
    /// to stop. Safe to call more than once.
    pub fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::AcqRel) {
            self.stop_notify.notify_waiters();
        }
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Resolve once a stop has been requested. Any number of tasks may wait.
    pub async fn stopped(&self) {
        loop {
            // Register before checking the flag so a concurrent stop is not missed.
            let notified = self.stop_notify.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    /// Queue a request for the next tick.
    pub async fn submit(&self, request: ControlRequest) {
        self.requests.lock().await.push(request);
    }

    /// Take every queued request in submission order.
    pub async fn drain(&self) -> Vec<ControlRequest> {
        std::mem::take(&mut *self.requests.lock().await)
    }
}
