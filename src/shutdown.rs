//! Cooperative cancellation
//!
//! The orchestrator observes the shutdown flag at the top of each phase and
//! during the inter-cycle sleep; in-flight external calls are allowed to
//! finish. No hard preemption.

use tokio::sync::watch;

/// Controller half: request shutdown from outside the cycle loop.
#[derive(Clone)]
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

/// Observer half: held by the orchestrator.
#[derive(Clone)]
pub struct ShutdownHandle {
    rx: watch::Receiver<bool>,
}

/// Create a linked controller/handle pair.
pub fn shutdown_pair() -> (ShutdownController, ShutdownHandle) {
    let (tx, rx) = watch::channel(false);
    (ShutdownController { tx }, ShutdownHandle { rx })
}

impl ShutdownController {
    /// Request graceful shutdown. Idempotent.
    pub fn request(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

impl ShutdownHandle {
    /// Non-blocking checkpoint test.
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when shutdown is requested (or the controller is gone).
    pub async fn requested(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        // A closed channel means the controller was dropped; treat as shutdown.
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }
}
