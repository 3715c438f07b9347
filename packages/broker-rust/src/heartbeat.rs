//! Periodic keep-alive broadcasting.
//!
//! Each broker owns one scheduler task. Every tick broadcasts a fresh
//! keep-alive frame to the current connection set; ticks that overlap a
//! slow broadcast are not queued -- each tick spawns an independent task
//! over its own snapshot. The task exits when the broker's shutdown signal
//! fires.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use fanout_core::EncodeError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::registry::ConnectionRegistry;

/// Spawns the keep-alive scheduler for one registry.
///
/// `make_frame` builds the transport-specific keep-alive frame, freshly
/// timestamped per tick. Must be called within a tokio runtime.
pub(crate) fn spawn_heartbeat<F>(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    make_frame: F,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    F: Fn() -> Result<Bytes, EncodeError> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of `interval` completes immediately; swallow it so
        // the first keep-alive goes out one full period after startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let frame = match make_frame() {
                        Ok(frame) => frame,
                        Err(err) => {
                            warn!(error = %err, "failed to encode keep-alive frame");
                            continue;
                        }
                    };
                    let registry = Arc::clone(&registry);
                    tokio::spawn(async move {
                        let delivered = registry.broadcast(frame).await;
                        trace!(delivered, "keep-alive broadcast");
                    });
                }
                _ = shutdown.changed() => {
                    debug!("heartbeat scheduler stopped");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Transport;
    use crate::connection::TransportKind;
    use crate::shutdown::ShutdownSignal;
    use crate::test_util::RecordingTransport;

    async fn settle() {
        // Let spawned tick tasks run to completion.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_broadcast_to_all_connections() {
        let registry = Arc::new(ConnectionRegistry::new(TransportKind::Sse, 10));
        let transport = Arc::new(RecordingTransport::new());
        registry
            .add_connection("c1", Arc::clone(&transport) as Arc<dyn Transport>, None, None)
            .unwrap();

        let shutdown = ShutdownSignal::new();
        let handle = spawn_heartbeat(
            Arc::clone(&registry),
            Duration::from_secs(30),
            || Ok(Bytes::from_static(b"ping")),
            shutdown.subscribe(),
        );

        settle().await;
        assert_eq!(transport.frames().len(), 0, "no tick before one period");

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(transport.frames().len(), 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert!(transport.frames().len() >= 2);

        shutdown.trigger();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_ticking() {
        let registry = Arc::new(ConnectionRegistry::new(TransportKind::Sse, 10));
        let transport = Arc::new(RecordingTransport::new());
        registry
            .add_connection("c1", Arc::clone(&transport) as Arc<dyn Transport>, None, None)
            .unwrap();

        let shutdown = ShutdownSignal::new();
        let handle = spawn_heartbeat(
            Arc::clone(&registry),
            Duration::from_secs(10),
            || Ok(Bytes::from_static(b"ping")),
            shutdown.subscribe(),
        );

        shutdown.trigger();
        handle.await.unwrap();

        tokio::time::advance(Duration::from_secs(100)).await;
        settle().await;
        assert_eq!(transport.frames().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_transport_is_removed_by_heartbeat() {
        let registry = Arc::new(ConnectionRegistry::new(TransportKind::Sse, 10));
        let transport = Arc::new(RecordingTransport::new());
        transport.fail_sends(true);
        registry
            .add_connection("c1", Arc::clone(&transport) as Arc<dyn Transport>, None, None)
            .unwrap();

        let shutdown = ShutdownSignal::new();
        let _handle = spawn_heartbeat(
            Arc::clone(&registry),
            Duration::from_secs(10),
            || Ok(Bytes::from_static(b"ping")),
            shutdown.subscribe(),
        );

        settle().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(registry.connection_count(), 0);
    }
}
