//! Fanout Core -- wire envelopes and frame encoders.
//!
//! This crate provides the transport-facing message layer shared by the
//! fanout brokers:
//!
//! - **Envelope** ([`envelope`]): the `{type, payload, id?, timestamp}`
//!   WebSocket message envelope and its JSON codec
//! - **SSE** ([`sse`]): `text/event-stream` frame model and encoder
//! - **Clock** ([`clock`]): wall-clock millisecond helper for timestamping
//! - **Errors** ([`error`]): `EncodeError` for serialization failures

pub mod clock;
pub mod envelope;
pub mod error;
pub mod sse;

// Envelope
pub use envelope::{WsMessage, ERROR_TYPE, HEARTBEAT_TYPE};

// SSE
pub use sse::{SseData, SseEvent, HEARTBEAT_EVENT};

// Clock
pub use clock::unix_millis;

// Errors
pub use error::EncodeError;
