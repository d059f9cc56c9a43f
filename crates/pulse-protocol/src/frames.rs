use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server → Client push event. The payload is opaque to the streaming layer.
/// Wire: `{ "type": "event", "event": "pageview", "payload": {...}, "seq": 42, "ts": 1718000000000 }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// Unix millis at which the frame was built.
    pub ts: i64,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            frame_type: "event".to_string(),
            event: event.into(),
            payload: Some(payload.into()),
            seq: None,
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Frame with a typed payload; fails if the payload does not serialize.
    pub fn try_new(event: impl Into<String>, payload: &impl Serialize) -> serde_json::Result<Self> {
        Ok(Self::new(event, serde_json::to_value(payload)?))
    }

    /// Frame without a payload body.
    pub fn bare(event: impl Into<String>) -> Self {
        Self {
            frame_type: "event".to_string(),
            event: event.into(),
            payload: None,
            seq: None,
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }
}

/// JSON error body for every non-2xx HTTP response.
/// Wire: `{ "code": "not_implemented", "message": "..." }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new("not_implemented", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Client → Server body of `POST /v1/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub event: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Server → Client reply to `POST /v1/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub accepted: bool,
    pub seq: u64,
    pub delivered: usize,
    pub dropped: usize,
}
