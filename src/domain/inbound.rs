//! Inbound bus messages.
//!
//! The invoking runtime hands over one push envelope per invocation:
//!
//! ```json
//! {
//!   "message": {
//!     "data": "<base64 payload>",
//!     "messageId": "8265117",
//!     "publishTime": "2024-05-01T12:00:00.123Z"
//!   },
//!   "subscription": "projects/p/subscriptions/s"
//! }
//! ```
//!
//! `publishTime` is assigned by the bus, never by the producer, and becomes
//! the event timestamp of everything derived from the message.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Errors decoding a push envelope
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Envelope is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// One message delivered by the bus
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Bus-assigned message identifier, used to correlate logs
    pub event_id: String,

    /// Bus-assigned publish time
    pub timestamp: DateTime<Utc>,

    /// Raw payload, decoded by the handler
    pub data: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushMessage {
    #[serde(default)]
    data: String,

    message_id: String,

    publish_time: DateTime<Utc>,
}

impl InboundMessage {
    /// Create a message from already decoded parts
    pub fn new(event_id: impl Into<String>, timestamp: DateTime<Utc>, data: Vec<u8>) -> Self {
        Self {
            event_id: event_id.into(),
            timestamp,
            data,
        }
    }

    /// Decode a push envelope
    pub fn from_push_envelope(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: PushEnvelope = serde_json::from_slice(bytes)?;
        let data = STANDARD.decode(envelope.message.data.as_bytes())?;

        Ok(Self {
            event_id: envelope.message.message_id,
            timestamp: envelope.message.publish_time,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_decode_push_envelope() {
        let payload = STANDARD.encode(br#"{"domain":"example.com","emailPrefix":"a"}"#);
        let envelope = format!(
            r#"{{"message":{{"data":"{}","messageId":"42","publishTime":"2024-05-01T12:00:00Z"}},"subscription":"projects/p/subscriptions/s"}}"#,
            payload
        );

        let message = InboundMessage::from_push_envelope(envelope.as_bytes()).unwrap();
        assert_eq!(message.event_id, "42");
        assert_eq!(
            message.timestamp,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
        );
        assert!(message.data.starts_with(b"{\"domain\""));
    }

    #[test]
    fn test_reject_bad_base64() {
        let envelope = r#"{"message":{"data":"@@@","messageId":"1","publishTime":"2024-05-01T12:00:00Z"}}"#;
        let result = InboundMessage::from_push_envelope(envelope.as_bytes());
        assert!(matches!(result, Err(EnvelopeError::Base64(_))));
    }
}
