//! Server-Sent Events broker.

use std::sync::Arc;

use fanout_core::SseEvent;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::BrokerConfig;
use crate::connection::{ConnectionRecord, SendError, TransportKind};
use crate::heartbeat::spawn_heartbeat;
use crate::registry::{ConnectionRegistry, RegistryError};
use crate::shutdown::ShutdownSignal;
use crate::traits::Transport;

/// One-way server-to-client event broker over `text/event-stream`.
///
/// Owns a connection registry and a keep-alive scheduler. The embedding
/// accept loop registers each established SSE response stream; domain code
/// publishes events by connection, user, channel, or broadcast.
///
/// Must be created within a tokio runtime (the keep-alive scheduler is
/// spawned on construction).
pub struct SseBroker {
    registry: Arc<ConnectionRegistry>,
    config: BrokerConfig,
    shutdown: ShutdownSignal,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl SseBroker {
    /// Creates the broker and starts its keep-alive scheduler.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(
            TransportKind::Sse,
            config.max_connections_per_user,
        ));
        let shutdown = ShutdownSignal::new();
        let heartbeat = spawn_heartbeat(
            Arc::clone(&registry),
            config.heartbeat_interval,
            || SseEvent::heartbeat().encode(),
            shutdown.subscribe(),
        );
        info!(
            heartbeat_interval = ?config.heartbeat_interval,
            max_connections_per_user = config.max_connections_per_user,
            "SSE broker started"
        );
        Self {
            registry,
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

    /// Registers an established SSE transport.
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

    /// Sends an event to one connection.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] when the id is unknown, the event cannot be
    /// encoded, or the transport write fails.
    pub async fn send_to_connection(&self, id: &str, event: &SseEvent) -> Result<(), SendError> {
        let frame = event.encode()?;
        self.registry.send_to_connection(id, frame).await
    }

    /// Sends an event to every connection of a user, returning the number
    /// of successful deliveries.
    pub async fn send_to_user(&self, user_id: &str, event: &SseEvent) -> usize {
        match event.encode() {
            Ok(frame) => self.registry.send_to_user(user_id, frame).await,
            Err(err) => {
                warn!(error = %err, "dropping undeliverable event");
                0
            }
        }
    }

    /// Sends an event to every connection on a channel, returning the
    /// number of successful deliveries.
    pub async fn send_to_channel(&self, channel: &str, event: &SseEvent) -> usize {
        match event.encode() {
            Ok(frame) => self.registry.send_to_channel(channel, frame).await,
            Err(err) => {
                warn!(error = %err, "dropping undeliverable event");
                0
            }
        }
    }

    /// Sends an event to every connection, returning the number of
    /// successful deliveries.
    pub async fn broadcast(&self, event: &SseEvent) -> usize {
        match event.encode() {
            Ok(frame) => self.registry.broadcast(frame).await,
            Err(err) => {
                warn!(error = %err, "dropping undeliverable event");
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
            info!(count, "SSE broker closed all connections");
        }
    }
}

impl Drop for SseBroker {
    fn drop(&mut self) {
        self.shutdown.trigger();
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_util::RecordingTransport;

    fn broker() -> SseBroker {
        SseBroker::new(BrokerConfig::default())
    }

    #[tokio::test]
    async fn event_reaches_single_connection() {
        let broker = broker();
        let transport = Arc::new(RecordingTransport::new());
        broker
            .add_connection("c1", Arc::clone(&transport) as Arc<dyn Transport>, None, None)
            .unwrap();

        broker
            .send_to_connection("c1", &SseEvent::text("hello").with_event("greet"))
            .await
            .unwrap();
        assert_eq!(
            transport.frames_as_strings(),
            vec!["event: greet\ndata: hello\n\n"]
        );
    }

    #[tokio::test]
    async fn channel_fanout_counts_deliveries() {
        let broker = broker();
        let t1 = Arc::new(RecordingTransport::new());
        let t2 = Arc::new(RecordingTransport::new());
        broker
            .add_connection("c1", Arc::clone(&t1) as Arc<dyn Transport>, None, Some("news".into()))
            .unwrap();
        broker
            .add_connection("c2", Arc::clone(&t2) as Arc<dyn Transport>, None, Some("news".into()))
            .unwrap();

        let count = broker
            .send_to_channel("news", &SseEvent::json(serde_json::json!({ "n": 1 })))
            .await;
        assert_eq!(count, 2);
        assert_eq!(t1.frames_as_strings(), vec!["data: {\"n\":1}\n\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_frames_flow_until_close_all() {
        let broker = SseBroker::new(BrokerConfig {
            heartbeat_interval: Duration::from_secs(5),
            ..BrokerConfig::default()
        });
        let transport = Arc::new(RecordingTransport::new());
        broker
            .add_connection("c1", Arc::clone(&transport) as Arc<dyn Transport>, None, None)
            .unwrap();

        // Let the scheduler task initialize before moving the clock.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        tokio::time::advance(Duration::from_secs(5)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        let frames = transport.frames_as_strings();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("event: heartbeat\ndata: {\"timestamp\":"));

        broker.close_all(None, None).await;
        assert_eq!(broker.connection_count(), 0);
        assert_eq!(transport.close_calls(), 1);

        // A connection registered after shutdown sees no heartbeats.
        let late = Arc::new(RecordingTransport::new());
        broker
            .add_connection("c2", Arc::clone(&late) as Arc<dyn Transport>, None, None)
            .unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(late.frames().is_empty());
    }

    #[tokio::test]
    async fn close_all_is_idempotent() {
        let broker = broker();
        let transport = Arc::new(RecordingTransport::new());
        broker
            .add_connection("c1", Arc::clone(&transport) as Arc<dyn Transport>, Some("u1".into()), None)
            .unwrap();

        broker.close_all(None, Some("maintenance")).await;
        broker.close_all(None, Some("maintenance")).await;
        assert_eq!(transport.close_calls(), 1);
        assert_eq!(broker.connection_count(), 0);
        assert_eq!(broker.user_connection_count("u1"), 0);
    }
}
