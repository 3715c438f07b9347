//! Fanout Broker -- in-process fan-out registry for SSE and `WebSocket`
//! transports.
//!
//! The broker sits between an accept loop (which owns sockets, TLS, and
//! authentication) and domain code (which publishes messages). It keeps
//! thousands of long-lived connections indexed three ways -- by connection
//! id, by user, and by channel -- and delivers frames with O(1) target
//! lookup while keeping transports alive and admission-bounded:
//!
//! - **Config** ([`config`]): broker limits and cadences
//! - **Traits** ([`traits`]): the `Transport` seam the accept loop implements
//! - **Connection** ([`connection`]): per-connection record and send lock
//! - **Registry** ([`registry`]): admission, the three indices, lifecycle
//! - **Dispatch** ([`dispatch`]): type-indexed inbound `WebSocket` routing
//! - **Shutdown** ([`shutdown`]): signal for broker-owned tasks
//! - **Brokers** ([`sse`], [`ws`]): the two public facades

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod registry;
pub mod shutdown;
pub mod sse;
pub mod traits;
pub mod ws;

mod heartbeat;
mod publish;

#[cfg(test)]
pub(crate) mod test_util;

pub use config::BrokerConfig;
pub use connection::{ConnectionRecord, SendError, TransportKind};
pub use dispatch::{handler_fn, MessageDispatcher, MessageHandler};
pub use registry::{ConnectionRegistry, RegistryError};
pub use shutdown::ShutdownSignal;
pub use sse::SseBroker;
pub use traits::{Transport, TransportError};
pub use ws::WsBroker;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }

    #[test]
    fn re_exports_accessible_from_crate_root() {
        let _config = crate::BrokerConfig::default();
        let _kind = crate::TransportKind::Sse;
        let _signal = crate::ShutdownSignal::new();
    }
}
