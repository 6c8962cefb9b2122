use axum::extract::ws::Utf8Bytes;
use serde::Serialize;

/// Event kind published after a post is created
pub const POST_CREATED: &str = "Post_Created";

/// Wire envelope for a broadcast event: `{"type": ..., "payload": ...}`
#[derive(Debug, Serialize)]
pub struct EventEnvelope<'a, T: ?Sized> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub payload: &'a T,
}

impl<'a, T: Serialize + ?Sized> EventEnvelope<'a, T> {
    pub fn new(kind: &'a str, payload: &'a T) -> Self {
        Self { kind, payload }
    }

    /// Serialize once into a frame that can be shared across connections
    pub fn to_frame(&self) -> Result<OutboundFrame, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(OutboundFrame::Text(Utf8Bytes::from(json)))
    }
}

/// A unit of work in a connection's outbound queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Serialized event, shared by every recipient of one broadcast
    Text(Utf8Bytes),
    /// Transport-level keepalive
    Ping,
}

impl OutboundFrame {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Ping => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_uses_type_and_payload_keys() {
        let post = json!({"id": "p1", "post_content": "hello", "user_id": "u1"});
        let frame = EventEnvelope::new(POST_CREATED, &post).to_frame().unwrap();

        let value: serde_json::Value = serde_json::from_str(frame.as_text().unwrap()).unwrap();
        assert_eq!(value["type"], "Post_Created");
        assert_eq!(value["payload"]["id"], "p1");
    }

    #[test]
    fn test_ping_has_no_text() {
        assert_eq!(OutboundFrame::Ping.as_text(), None);
    }
}
