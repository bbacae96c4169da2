//! Messages carried by the hubs.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum WsMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl WsMessage {
    /// Creates a text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Creates a text message holding `value` as JSON.
    ///
    /// # Errors
    ///
    /// Fails if `value` does not serialize.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::Text(serde_json::to_string(value)?))
    }

    /// Returns the payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }
}

/// A server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SseEvent {
    /// Event name; omitted from the frame when `None`.
    pub event: Option<String>,
    /// Event data, possibly spanning several lines.
    pub data: String,
    /// Event id; omitted from the frame when `None`.
    pub id: Option<String>,
}

impl SseEvent {
    /// Creates an unnamed event carrying `data`.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// Creates an event whose data is `value` as JSON.
    ///
    /// # Errors
    ///
    /// Fails if `value` does not serialize.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_string(value)?))
    }

    /// Sets the event name.
    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Sets the event id.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Encodes the event as a `text/event-stream` frame.
    ///
    /// Each data line gets its own `data:` field and the frame ends with a
    /// blank line.
    pub fn to_frame(&self) -> String {
        let mut frame = String::new();
        if let Some(event) = &self.event {
            let _ = writeln!(frame, "event: {event}");
        }
        if let Some(id) = &self.id {
            let _ = writeln!(frame, "id: {id}");
        }
        for line in self.data.split('\n') {
            let _ = writeln!(frame, "data: {line}");
        }
        frame.push('\n');
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_frame() {
        let event = SseEvent::new("hello").event("greeting").id("7");
        assert_eq!(event.to_frame(), "event: greeting\nid: 7\ndata: hello\n\n");
    }

    #[test]
    fn test_sse_multiline_data() {
        let event = SseEvent::new("line one\nline two");
        assert_eq!(event.to_frame(), "data: line one\ndata: line two\n\n");
    }

    #[test]
    fn test_json_helpers() {
        let event = SseEvent::json(&serde_json::json!({"n": 1})).unwrap();
        assert_eq!(event.data, r#"{"n":1}"#);

        let msg = WsMessage::json(&serde_json::json!(["a"])).unwrap();
        assert_eq!(msg, WsMessage::Text(r#"["a"]"#.to_string()));
        assert_eq!(msg.as_bytes(), br#"["a"]"#);
    }
}
