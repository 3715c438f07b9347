//! Shutdown signalling for broker-owned background tasks.
//!
//! A thin wrapper over a `tokio::sync::watch` channel. The broker holds the
//! sender; long-lived tasks (the heartbeat scheduler) hold receivers and
//! select on `changed()` alongside their main loop.

use tokio::sync::watch;

/// One-way, idempotent shutdown signal.
#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Returns a receiver that resolves once the signal is triggered.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Triggers the signal. Subsequent calls are no-ops.
    pub fn trigger(&self) {
        // Ignore send errors -- all receivers may have been dropped.
        let _ = self.tx.send(true);
    }

    /// Whether the signal has been triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
