//! Server-Sent Events frame model and encoder.
//!
//! One [`SseEvent`] encodes to one `text/event-stream` block: a sequence of
//! `field: value` lines terminated by a blank line. Only the `id`, `event`,
//! `data`, and `retry` fields are ever emitted, and every frame carries a
//! `data` line.

use bytes::Bytes;
use serde_json::{json, Value};

use crate::clock::unix_millis;
use crate::error::EncodeError;

/// Event name used for keep-alive frames.
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// Body of an SSE frame.
///
/// Text passes through verbatim; structured values are serialized to
/// single-line JSON at encode time.
#[derive(Debug, Clone, PartialEq)]
pub enum SseData {
    /// Raw string payload, emitted as-is.
    Text(String),
    /// Structured payload, serialized as compact JSON.
    Json(Value),
}

/// One server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// Optional event id, surfaced to clients as `lastEventId`.
    pub id: Option<String>,
    /// Optional event name; unnamed events dispatch as `message`.
    pub event: Option<String>,
    /// Event body; always emitted.
    pub data: SseData,
    /// Optional reconnection delay hint, in milliseconds.
    pub retry: Option<u64>,
}

impl SseEvent {
    /// Creates an unnamed event with a raw string body.
    #[must_use]
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            id: None,
            event: None,
            data: SseData::Text(data.into()),
            retry: None,
        }
    }

    /// Creates an unnamed event with a structured body.
    #[must_use]
    pub fn json(data: Value) -> Self {
        Self {
            id: None,
            event: None,
            data: SseData::Json(data),
            retry: None,
        }
    }

    /// Sets the event name.
    #[must_use]
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Sets the event id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the client reconnection delay hint.
    #[must_use]
    pub fn with_retry(mut self, millis: u64) -> Self {
        self.retry = Some(millis);
        self
    }

    /// Builds the keep-alive frame: `event: heartbeat` with the current
    /// wall-clock time in the body.
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::json(json!({ "timestamp": unix_millis() })).with_event(HEARTBEAT_EVENT)
    }

    /// Encodes the event into one wire frame.
    ///
    /// Fields appear in `id`, `event`, `data`, `retry` order, each on its
    /// own line, followed by the blank line that terminates the frame.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if a structured body cannot be serialized.
    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut out = String::new();
        if let Some(id) = &self.id {
            out.push_str("id: ");
            out.push_str(id);
            out.push('\n');
        }
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        out.push_str("data: ");
        match &self.data {
            SseData::Text(text) => out.push_str(text),
            SseData::Json(value) => out.push_str(&serde_json::to_string(value)?),
        }
        out.push('\n');
        if let Some(retry) = self.retry {
            out.push_str("retry: ");
            out.push_str(&retry.to_string());
            out.push('\n');
        }
        out.push('\n');
        Ok(Bytes::from(out))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn as_str(frame: &Bytes) -> &str {
        std::str::from_utf8(frame).unwrap()
    }

    #[test]
    fn text_event_minimal() {
        let frame = SseEvent::text("hello").encode().unwrap();
        assert_eq!(as_str(&frame), "data: hello\n\n");
    }

    #[test]
    fn all_fields_in_order() {
        let frame = SseEvent::text("x")
            .with_id("42")
            .with_event("update")
            .with_retry(1500)
            .encode()
            .unwrap();
        assert_eq!(
            as_str(&frame),
            "id: 42\nevent: update\ndata: x\nretry: 1500\n\n"
        );
    }

    #[test]
    fn json_data_is_single_line() {
        let frame = SseEvent::json(json!({ "a": 1, "b": [true, null] }))
            .encode()
            .unwrap();
        let text = as_str(&frame);
        assert_eq!(text, "data: {\"a\":1,\"b\":[true,null]}\n\n");
    }

    #[test]
    fn empty_text_still_emits_data_line() {
        let frame = SseEvent::text("").encode().unwrap();
        assert_eq!(as_str(&frame), "data: \n\n");
    }

    #[test]
    fn heartbeat_frame_shape() {
        let frame = SseEvent::heartbeat().encode().unwrap();
        let text = as_str(&frame);
        assert!(text.starts_with("event: heartbeat\ndata: {\"timestamp\":"));
        assert!(text.ends_with("}\n\n"));
    }

    proptest! {
        /// Every encoded frame ends with exactly one blank line and carries
        /// a data line, whatever the field combination.
        #[test]
        fn encoded_frames_are_well_terminated(
            id in proptest::option::of("[a-z0-9]{1,8}"),
            event in proptest::option::of("[a-z]{1,8}"),
            data in "[a-zA-Z0-9 ]{0,32}",
            retry in proptest::option::of(0u64..100_000),
        ) {
            let mut ev = SseEvent::text(data);
            if let Some(id) = id { ev = ev.with_id(id); }
            if let Some(event) = event { ev = ev.with_event(event); }
            if let Some(retry) = retry { ev = ev.with_retry(retry); }

            let frame = ev.encode().unwrap();
            let text = std::str::from_utf8(&frame).unwrap();
            prop_assert!(text.ends_with("\n\n"));
            prop_assert!(!text[..text.len() - 2].contains("\n\n"));
            prop_assert!(text.contains("data: "));
        }
    }
}
