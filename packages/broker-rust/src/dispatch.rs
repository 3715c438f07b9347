//! Inbound WebSocket frame dispatch.
//!
//! Raw frames arrive from the accept loop, are validated and parsed into
//! envelopes, then routed by message type to a registered handler. Every
//! failure path answers with an error frame on the originating connection;
//! nothing escapes `handle_message`.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use fanout_core::WsMessage;
use tracing::{debug, trace, warn};

use crate::connection::ConnectionRecord;
use crate::registry::ConnectionRegistry;

/// Error frame text for an oversized inbound frame.
const MSG_TOO_LARGE: &str = "Message size exceeds maximum allowed size";

/// Error frame text for a parsed frame without a usable `type`.
const MSG_TYPE_REQUIRED: &str = "Message type is required";

/// A caller-supplied handler bound to one message type.
///
/// Handlers receive the originating connection and the parsed envelope, and
/// decode the payload into their own schema. A returned error is rendered
/// into an error frame for the client; it never propagates further.
///
/// Frames for one connection may dispatch concurrently; handlers must not
/// assume per-connection serialization.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one inbound message.
    async fn handle(
        &self,
        connection: Arc<ConnectionRecord>,
        message: WsMessage,
    ) -> anyhow::Result<()>;
}

/// Wraps an async closure as a [`MessageHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Arc<ConnectionRecord>, WsMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    struct FnHandler<F>(F);

    #[async_trait::async_trait]
    impl<F, Fut> MessageHandler for FnHandler<F>
    where
        F: Fn(Arc<ConnectionRecord>, WsMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        async fn handle(
            &self,
            connection: Arc<ConnectionRecord>,
            message: WsMessage,
        ) -> anyhow::Result<()> {
            (self.0)(connection, message).await
        }
    }

    Arc::new(FnHandler(f))
}

/// Routes inbound frames to type-indexed handlers.
pub struct MessageDispatcher {
    registry: Arc<ConnectionRegistry>,
    handlers: DashMap<String, Arc<dyn MessageHandler>>,
    max_message_size: usize,
}

impl MessageDispatcher {
    /// Creates a dispatcher over the given registry.
    ///
    /// Frames longer than `max_message_size` bytes are rejected before
    /// parsing.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, max_message_size: usize) -> Self {
        Self {
            registry,
            handlers: DashMap::new(),
            max_message_size,
        }
    }

    /// Registers (or replaces) the handler for a message type.
    pub fn on_message(&self, msg_type: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.handlers.insert(msg_type.into(), handler);
    }

    /// Validates, parses, and dispatches one inbound frame.
    ///
    /// Frames for unknown connections are dropped silently. All other
    /// failures -- oversized frame, parse error, missing type, unknown
    /// type, handler error -- are answered with an error frame on the
    /// originating connection.
    pub async fn handle_message(&self, connection_id: &str, raw: &[u8]) {
        let Some(record) = self.registry.get_connection(connection_id) else {
            trace!(id = connection_id, "inbound frame for unknown connection dropped");
            return;
        };
        if raw.len() > self.max_message_size {
            self.send_error(&record, MSG_TOO_LARGE).await;
            return;
        }
        let message = match WsMessage::from_frame(raw) {
            Ok(message) => message,
            Err(err) => {
                self.send_error(&record, err.to_string()).await;
                return;
            }
        };
        if message.msg_type.is_empty() {
            self.send_error(&record, MSG_TYPE_REQUIRED).await;
            return;
        }
        let Some(handler) = self
            .handlers
            .get(&message.msg_type)
            .map(|entry| Arc::clone(entry.value()))
        else {
            self.send_error(
                &record,
                format!("No handler found for message type: {}", message.msg_type),
            )
            .await;
            return;
        };

        trace!(id = %record.id(), msg_type = %message.msg_type, "dispatching inbound message");
        if let Err(err) = handler.handle(Arc::clone(&record), message).await {
            self.send_error(&record, err.to_string()).await;
        }
    }

    async fn send_error(&self, record: &Arc<ConnectionRecord>, message: impl Into<String>) {
        let frame = match WsMessage::error(message).to_frame() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "failed to encode error frame");
                return;
            }
        };
        if let Err(err) = record.send(frame).await {
            debug!(id = %record.id(), error = %err, "failed to deliver error frame");
        }
    }
}
