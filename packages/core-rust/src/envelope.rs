//! WebSocket message envelope.
//!
//! Every message crossing a WebSocket transport is a JSON object of the
//! shape `{type, payload, id?, timestamp}`. Payloads are deliberately
//! untyped (`serde_json::Value`): the envelope is routed by `type` alone,
//! and the receiving handler decodes `payload` into its own schema.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::clock::unix_millis;
use crate::error::EncodeError;

/// Message type carried by error frames emitted back to a client.
pub const ERROR_TYPE: &str = "error";

/// Message type carried by keep-alive frames.
pub const HEARTBEAT_TYPE: &str = "heartbeat";

/// A single WebSocket message, inbound or outbound.
///
/// `msg_type` is serialized as `type` on the wire. An absent `type` field
/// deserializes to an empty string so that validation can distinguish
/// "missing type" from "unparseable frame".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    /// Routing key; required and non-empty for dispatch.
    #[serde(rename = "type", default)]
    pub msg_type: String,
    /// Arbitrary message body; always present on the wire (`null` if unset).
    #[serde(default)]
    pub payload: Value,
    /// Optional caller-assigned correlation id.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    /// Milliseconds since the Unix epoch; filled by [`WsMessage::to_frame`]
    /// when absent.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<u64>,
}

impl WsMessage {
    /// Creates a message with the given type and payload.
    #[must_use]
    pub fn new(msg_type: impl Into<String>, payload: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload,
            id: None,
            timestamp: None,
        }
    }

    /// Attaches a correlation id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builds an error frame: `{type:"error", payload:{error:<message>}}`.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ERROR_TYPE, json!({ "error": message.into() }))
    }

    /// Builds a keep-alive frame carrying the current wall-clock time.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::new(HEARTBEAT_TYPE, json!({ "timestamp": unix_millis() }))
    }

    /// Encodes the message into its on-wire JSON form.
    ///
    /// The emitted frame always carries a `timestamp`; when the message has
    /// none, the current wall clock is stamped in. The message itself is
    /// not mutated, so re-encoding an unstamped message yields a fresh
    /// timestamp each time.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if the payload cannot be serialized.
    pub fn to_frame(&self) -> Result<Bytes, EncodeError> {
        let stamped;
        let msg = if self.timestamp.is_some() {
            self
        } else {
            stamped = Self {
                timestamp: Some(unix_millis()),
                ..self.clone()
            };
            &stamped
        };
        Ok(Bytes::from(serde_json::to_vec(msg)?))
    }

    /// Parses one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error when the frame is not a valid
    /// envelope; the error's `Display` form is suitable for echoing back to
    /// the client.
    pub fn from_frame(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }
}
