//! In-memory transport for exercising the broker without sockets.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::traits::{Transport, TransportError};

/// Records everything the broker writes, with injectable failure modes.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    frames: Mutex<Vec<Bytes>>,
    closes: Mutex<Vec<(Option<u16>, Option<String>)>>,
    fail_sends: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    blocked: AtomicUsize,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// All frames delivered so far.
    pub(crate) fn frames(&self) -> Vec<Bytes> {
        self.frames.lock().clone()
    }

    /// Frames decoded as UTF-8, for wire-format assertions.
    pub(crate) fn frames_as_strings(&self) -> Vec<String> {
        self.frames()
            .iter()
            .map(|f| String::from_utf8(f.to_vec()).unwrap())
            .collect()
    }

    /// How many times `close_raw` has been invoked.
    pub(crate) fn close_calls(&self) -> usize {
        self.closes.lock().len()
    }

    /// Arguments of the most recent `close_raw` call.
    pub(crate) fn last_close(&self) -> Option<(Option<u16>, Option<String>)> {
        self.closes.lock().last().cloned()
    }

    /// Makes every subsequent `send_raw` fail.
    pub(crate) fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Installs a zero-permit gate: every `send_raw` parks until a permit
    /// is added. Returns the gate.
    pub(crate) fn gated(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Waits until at least one sender is parked on the gate.
    pub(crate) async fn wait_for_blocked(&self) {
        while self.blocked.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_raw(&self, frame: Bytes) -> Result<(), TransportError> {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            self.blocked.fetch_add(1, Ordering::SeqCst);
            let permit = gate
                .acquire()
                .await
                .map_err(|_| TransportError::Closed)?;
            permit.forget();
            self.blocked.fetch_sub(1, Ordering::SeqCst);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Write("simulated write failure".to_string()));
        }
        self.frames.lock().push(frame);
        Ok(())
    }

    async fn close_raw(
        &self,
        code: Option<u16>,
        reason: Option<&str>,
    ) -> Result<(), TransportError> {
        self.closes
            .lock()
            .push((code, reason.map(str::to_string)));
        Ok(())
    }
}
