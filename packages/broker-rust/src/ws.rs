//! WebSocket broker.

use std::sync::Arc;

use fanout_core::WsMessage;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::BrokerConfig;
use crate::connection::{ConnectionRecord, SendError, TransportKind};
use crate::dispatch::{MessageDispatcher, MessageHandler};
use crate::heartbeat::spawn_heartbeat;
use crate::registry::{ConnectionRegistry, RegistryError};
use crate::shutdown::ShutdownSignal;
use crate::traits::Transport;

/// Full-duplex message broker over WebSocket transports.
///
/// Owns a connection registry, a keep-alive scheduler, and the inbound
/// dispatcher. The embedding accept loop registers each upgraded socket and
/// feeds received frames into [`WsBroker::handle_message`]; domain code
/// registers handlers by message type and publishes outbound messages by
/// connection, user, channel, or broadcast.
///
/// Must be created within a tokio runtime (the keep-alive scheduler is
/// spawned on construction).
pub struct WsBroker {
    registry: Arc<ConnectionRegistry>,
    dispatcher: MessageDispatcher,
    config: BrokerConfig,
    shutdown: ShutdownSignal,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl WsBroker {
    /// Creates the broker and starts its keep-alive scheduler.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(
            TransportKind::WebSocket,
            config.max_connections_per_user,
        ));
        let dispatcher = MessageDispatcher::new(Arc::clone(&registry), config.max_message_size);
        let shutdown = ShutdownSignal::new();
        let heartbeat = spawn_heartbeat(
            Arc::clone(&registry),
            config.heartbeat_interval,
            || WsMessage::heartbeat().to_frame(),
            shutdown.subscribe(),
        );
        info!(
            heartbeat_interval = ?config.heartbeat_interval,
            max_connections_per_user = config.max_connections_per_user,
            max_message_size = config.max_message_size,
            "WebSocket broker started"
        );
        Self {
            registry,
            dispatcher,
            config,
            shutdown,
            heartbeat: Mutex::new(Some(heartbeat)),
        }
    }

    /// The broker's configuration.
    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Registers an established WebSocket transport.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the id is taken or the user is at
    /// the connection quota; no state changes on failure.
    pub fn add_connection(
        &self,
        id: impl Into<String>,
        transport: Arc<dyn Transport>,
        user_id: Option<String>,
        channel: Option<String>,
    ) -> Result<Arc<ConnectionRecord>, RegistryError> {
        self.registry.add_connection(id, transport, user_id, channel)
    }

    /// Removes a connection without touching its transport.
    pub fn remove_connection(&self, id: &str) -> Option<Arc<ConnectionRecord>> {
        self.registry.remove_connection(id)
    }

    /// Looks up a connection by id.
    #[must_use]
    pub fn get_connection(&self, id: &str) -> Option<Arc<ConnectionRecord>> {
        self.registry.get_connection(id)
    }

    /// Total number of active connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    /// Number of active connections held by one user.
    #[must_use]
    pub fn user_connection_count(&self, user_id: &str) -> usize {
        self.registry.user_connection_count(user_id)
    }

    /// Number of active connections subscribed to one channel.
    #[must_use]
    pub fn channel_connection_count(&self, channel: &str) -> usize {
        self.registry.channel_connection_count(channel)
    }

    /// Registers (or replaces) the handler for an inbound message type.
    pub fn on_message(&self, msg_type: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.dispatcher.on_message(msg_type, handler);
    }

    /// Feeds one raw inbound frame into the dispatcher.
    ///
    /// Never fails: every validation or handler error is answered with an
    /// error frame on the originating connection.
    pub async fn handle_message(&self, connection_id: &str, raw: &[u8]) {
        self.dispatcher.handle_message(connection_id, raw).await;
    }

    /// Sends a message to one connection.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] when the id is unknown, the message cannot be
    /// encoded, or the transport write fails.
    pub async fn send_to_connection(&self, id: &str, message: &WsMessage) -> Result<(), SendError> {
        let frame = message.to_frame()?;
        self.registry.send_to_connection(id, frame).await
    }

    /// Sends a message to every connection of a user, returning the number
    /// of successful deliveries.
    pub async fn send_to_user(&self, user_id: &str, message: &WsMessage) -> usize {
        match message.to_frame() {
            Ok(frame) => self.registry.send_to_user(user_id, frame).await,
            Err(err) => {
                warn!(error = %err, "dropping undeliverable message");
                0
            }
        }
    }

    /// Sends a message to every connection on a channel, returning the
    /// number of successful deliveries.
    pub async fn send_to_channel(&self, channel: &str, message: &WsMessage) -> usize {
        match message.to_frame() {
            Ok(frame) => self.registry.send_to_channel(channel, frame).await,
            Err(err) => {
                warn!(error = %err, "dropping undeliverable message");
                0
            }
        }
    }

    /// Sends a message to every connection, returning the number of
    /// successful deliveries.
    pub async fn broadcast(&self, message: &WsMessage) -> usize {
        match message.to_frame() {
            Ok(frame) => self.registry.broadcast(frame).await,
            Err(err) => {
                warn!(error = %err, "dropping undeliverable message");
                0
            }
        }
    }

    /// Closes every connection and stops the keep-alive scheduler.
    ///
    /// Idempotent. After return, all indices are empty and no further
    /// heartbeat fires.
    pub async fn close_all(&self, code: Option<u16>, reason: Option<&str>) {
        self.shutdown.trigger();
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
        let records = self.registry.drain_all();
        let count = records.len();
        for record in records {
            record.close(code, reason).await;
        }
        if count > 0 {
            info!(count, "WebSocket broker closed all connections");
        }
    }
}

impl Drop for WsBroker {
    fn drop(&mut self) {
        self.shutdown.trigger();
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
    }
}
