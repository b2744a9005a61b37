//! JSON wire protocol for domain events.
//!
//! One frame is one event encoded as a single JSON object (no trailing
//! newline). The same encoding is used on the transport and, one frame
//! per line, in persisted event logs:
//!
//! ```text
//! {"origin":"<uuid>","timestamp":1718000000000,"type":"EntityAdded","entity":{…}}
//! {"origin":"<uuid>","timestamp":1718000000450,"type":"EntityLayerChanged",
//!  "id":"rect-<uuid>-0","delta":{"isSentinel":true,"sign":1}}
//! ```
//!
//! Decoding is strict about the discriminant: an unknown `type` is a
//! [`ProtocolError::UnknownEventType`], never coerced to something else.

use easel_core::{Event, EventType};
use serde_json::Value;
use thiserror::Error;

/// An encoded event as it travels between sessions.
pub type Frame = Vec<u8>;

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Frame has no event type")]
    MissingEventType,
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// Serialize an event to its wire frame.
pub fn encode(event: &Event) -> Result<Frame, ProtocolError> {
    serde_json::to_vec(event).map_err(|e| ProtocolError::SerializationError(e.to_string()))
}

/// Serialize an event to a single JSON line (no newline).
pub fn encode_str(event: &Event) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(|e| ProtocolError::SerializationError(e.to_string()))
}

/// Decode one frame.
pub fn decode(bytes: &[u8]) -> Result<Event, ProtocolError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
    decode_value(value)
}

pub fn decode_str(line: &str) -> Result<Event, ProtocolError> {
    decode(line.as_bytes())
}

fn decode_value(value: Value) -> Result<Event, ProtocolError> {
    let type_name = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingEventType)?;
    if EventType::from_name(type_name).is_none() {
        return Err(ProtocolError::UnknownEventType(type_name.to_string()));
    }
    serde_json::from_value(value).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
}

/// Read the origin of a frame without decoding the whole event.
pub fn peek_origin(bytes: &[u8]) -> Option<String> {
    #[derive(serde::Deserialize)]
    struct OriginOnly {
        origin: String,
    }
    serde_json::from_slice::<OriginOnly>(bytes).ok().map(|o| o.origin)
}
