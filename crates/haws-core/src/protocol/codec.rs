//! JSON codec for hub websocket frames.
//!
//! Wire format: one UTF-8 text frame per message, holding one JSON object.
//! The object must carry a string `"type"` field; nothing else is required at
//! this layer.  Frame classes with further required fields are checked by
//! [`Inbound::from_message`](crate::protocol::messages::Inbound::from_message).
//!
//! Both directions are stateless and deterministic: object keys are kept in a
//! sorted map, so encoding the same message twice yields identical text.

use serde_json::Value;
use thiserror::Error;

use crate::protocol::messages::{message_type, Message};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The text is not well-formed JSON.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The text is JSON, but not a JSON object.
    #[error("frame is not a JSON object (got {0})")]
    NotAnObject(&'static str),

    /// The object has no string `"type"` field.
    #[error("frame has no \"type\" field")]
    MissingType,

    /// A recognised frame type is missing a required field or has a field of
    /// the wrong shape.
    #[error("invalid {frame_type:?} frame: {reason}")]
    InvalidField { frame_type: String, reason: String },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Serialises a [`Message`] to wire text.
///
/// # Examples
///
/// ```rust
/// use haws_core::protocol::{decode, encode, messages::ping};
///
/// let text = encode(&ping());
/// assert_eq!(text, r#"{"type":"ping"}"#);
/// assert_eq!(decode(&text).unwrap(), ping());
/// ```
pub fn encode(msg: &Message) -> String {
    // Display for a JSON value cannot fail: every key is a string and every
    // number is finite by construction.
    Value::Object(msg.clone()).to_string()
}

/// Parses wire text into a [`Message`].
///
/// # Errors
///
/// - [`ProtocolError::Malformed`] if `text` is not valid JSON.
/// - [`ProtocolError::NotAnObject`] if the top-level value is not an object.
/// - [`ProtocolError::MissingType`] if there is no string `"type"` field.
pub fn decode(text: &str) -> Result<Message, ProtocolError> {
    let msg = match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => map,
        other => return Err(ProtocolError::NotAnObject(json_kind(&other))),
    };
    if message_type(&msg).is_none() {
        return Err(ProtocolError::MissingType);
    }
    Ok(msg)
}

/// Returns a short name for the JSON kind of `value`, used in error messages.
fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
