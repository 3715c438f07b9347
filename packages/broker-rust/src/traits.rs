//! The transport seam between the broker and the accept loop.
//!
//! The broker never owns sockets. The embedding accept loop establishes a
//! transport (an SSE response body, a WebSocket sink), wraps it in a
//! [`Transport`], and registers it. Everything the broker does to the wire
//! goes through these two methods.

use async_trait::async_trait;
use bytes::Bytes;

/// Error returned by a transport implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote end is gone; no further writes can succeed.
    #[error("transport closed")]
    Closed,
    /// A write failed for a transport-specific reason.
    #[error("transport write failed: {0}")]
    Write(String),
}

/// Write side of one established client transport.
///
/// Implementations must be safe to call from multiple tasks; the broker
/// serializes `send_raw` calls per connection, but `close_raw` may race a
/// final `send_raw`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Writes one fully-encoded frame to the wire.
    ///
    /// May block on transport flow control. Any deadline semantics are the
    /// implementation's own.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the frame could not be written; the
    /// broker treats this as connection death.
    async fn send_raw(&self, frame: Bytes) -> Result<(), TransportError>;

    /// Closes the underlying transport, best-effort.
    ///
    /// `code` and `reason` map to a WebSocket close frame where the
    /// transport supports one; SSE transports typically ignore both.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on failure; the broker swallows it.
    async fn close_raw(&self, code: Option<u16>, reason: Option<&str>) -> Result<(), TransportError>;
}
