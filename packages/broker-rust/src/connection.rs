//! Per-connection record: identity, transport hooks, and send serialization.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use bytes::Bytes;
use fanout_core::EncodeError;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::registry::ConnectionRegistry;
use crate::traits::{Transport, TransportError};

/// Which wire protocol a connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// One-way `text/event-stream` connection.
    Sse,
    /// Full-duplex WebSocket connection.
    WebSocket,
}

/// Error returned when sending a message to a connection fails.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The connection has been removed; no further frames are delivered.
    #[error("connection is closed")]
    Closed,
    /// No connection with the given id is registered.
    #[error("no connection with id {id}")]
    UnknownConnection {
        /// The id that was looked up.
        id: String,
    },
    /// The message could not be encoded into a frame.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// The transport write failed; the connection has been closed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// One live client connection.
///
/// Records are created by the registry and shared via `Arc`: the registry's
/// indices hold one reference, and publishers hold more while iterating a
/// snapshot. All mutability is confined to the two atomic flags and the
/// per-connection send lock, so a record can be used freely across tasks.
pub struct ConnectionRecord {
    id: String,
    user_id: Option<String>,
    channel: Option<String>,
    kind: TransportKind,
    connected_at: Instant,
    transport: Arc<dyn Transport>,
    /// Serializes frame writes so frames never interleave on one wire.
    send_lock: Mutex<()>,
    /// True while the record is present in the registry's indices.
    alive: AtomicBool,
    /// Set by the first `close()`; guards `close_raw` to exactly one call.
    closed: AtomicBool,
    /// Deregistration back-link; `Weak` so records never keep the registry
    /// (and thus themselves) alive.
    registry: Weak<ConnectionRegistry>,
}

impl ConnectionRecord {
    pub(crate) fn new(
        id: String,
        user_id: Option<String>,
        channel: Option<String>,
        kind: TransportKind,
        transport: Arc<dyn Transport>,
        registry: Weak<ConnectionRegistry>,
    ) -> Self {
        Self {
            id,
            user_id,
            channel,
            kind,
            connected_at: Instant::now(),
            transport,
            send_lock: Mutex::new(()),
            alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            registry,
        }
    }

    /// The caller-supplied connection id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The user this connection belongs to, if it is not anonymous.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// The channel this connection subscribed to at registration.
    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Which wire protocol this connection speaks.
    #[must_use]
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// When this connection was registered.
    #[must_use]
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Whether the connection is still registered.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Flips `alive` off. Called by the registry on removal.
    pub(crate) fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Writes one encoded frame to this connection's wire.
    ///
    /// The per-connection send lock guarantees that two concurrent `send`
    /// calls on the same record appear on the wire in lock-acquisition
    /// order and never interleave at byte level. Sends to different
    /// connections proceed in parallel.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] when the record has been removed, or
    /// [`SendError::Transport`] when the write fails -- in which case the
    /// connection is closed and deregistered before returning.
    pub async fn send(&self, frame: Bytes) -> Result<(), SendError> {
        if !self.is_alive() {
            return Err(SendError::Closed);
        }
        let result = {
            let _guard = self.send_lock.lock().await;
            self.transport.send_raw(frame).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(id = %self.id, error = %err, "transport write failed, closing connection");
                self.close(None, None).await;
                Err(SendError::Transport(err))
            }
        }
    }

    /// Closes the transport and deregisters the connection.
    ///
    /// The first call invokes the transport's `close_raw` (errors are
    /// swallowed) and removes the record from the registry; later calls are
    /// no-ops. Safe to call after the record was already removed.
    pub async fn close(&self, code: Option<u16>, reason: Option<&str>) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            if let Err(err) = self.transport.close_raw(code, reason).await {
                debug!(id = %self.id, error = %err, "close_raw failed");
            }
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_connection(&self.id);
        }
    }
}

impl fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("channel", &self.channel)
            .field("kind", &self.kind)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}
