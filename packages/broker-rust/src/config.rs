//! Broker configuration types.

use std::time::Duration;

/// Tunable limits and cadences shared by the SSE and WebSocket brokers.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Period of the keep-alive broadcast.
    pub heartbeat_interval: Duration,
    /// Advisory idle ceiling reported to embedding code. The broker never
    /// enforces it; callers that track idleness decide when to close.
    pub connection_timeout: Duration,
    /// Admission quota: maximum simultaneous connections per user id.
    pub max_connections_per_user: usize,
    /// Upper bound on inbound WebSocket frame byte length.
    pub max_message_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(300),
            max_connections_per_user: 10,
            max_message_size: 1_048_576, // 1 MiB
        }
    }
}
