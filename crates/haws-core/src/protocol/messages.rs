//! Message types for the hub websocket protocol.
//!
//! # Frame shape
//!
//! Every frame in either direction is one JSON object with a `"type"` field
//! naming what it is.  All other fields sit next to `"type"` in the same
//! object:
//!
//! ```json
//! {"type":"auth_ok","ha_version":"2024.1.0"}
//! {"type":"result","id":4,"success":true,"result":null}
//! {"type":"event","id":5,"event":{"event_type":"state_changed"}}
//! ```
//!
//! # Two views of a frame
//!
//! - [`Message`] is the untyped record.  Outgoing commands are built as
//!   `Message`s because their schema belongs to the caller, not to this
//!   crate; the session only adds an `"id"` when one is missing.
//! - [`Inbound`] is the typed view the session dispatches on.  It only names
//!   the frame classes the session itself understands; everything else lands
//!   in [`Inbound::Other`] and is routed by type name.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::protocol::codec::ProtocolError;

/// An untyped protocol record: a JSON object keyed by field name.
pub type Message = serde_json::Map<String, Value>;

/// Integer correlation key carried in the `"id"` field of requests, results
/// and events.
pub type MessageId = u64;

/// Frame type the hub sends when it expects credentials.
pub const TYPE_AUTH_REQUIRED: &str = "auth_required";
/// Frame type confirming the credentials.
pub const TYPE_AUTH_OK: &str = "auth_ok";
/// Frame type rejecting the credentials.
pub const TYPE_AUTH_INVALID: &str = "auth_invalid";
/// Frame type answering one request.
pub const TYPE_RESULT: &str = "result";
/// Frame type pushed for an active subscription.
pub const TYPE_EVENT: &str = "event";
/// Keepalive probe.
pub const TYPE_PING: &str = "ping";
/// Keepalive acknowledgement.
pub const TYPE_PONG: &str = "pong";

/// Frame types the session handles itself.  Type-level handlers may not be
/// registered for these.
pub const RESERVED_TYPES: [&str; 5] = [
    TYPE_AUTH_REQUIRED,
    TYPE_AUTH_OK,
    TYPE_AUTH_INVALID,
    TYPE_RESULT,
    TYPE_EVENT,
];

// ── Inbound view ──────────────────────────────────────────────────────────────

/// Typed view of a frame received from the hub.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// The hub asks for credentials.  Always the first frame on a connection.
    AuthRequired,

    /// Credentials accepted.
    AuthOk {
        /// Version string of the remote hub, when reported.
        #[serde(default)]
        ha_version: Option<String>,
    },

    /// Credentials rejected.
    AuthInvalid {
        /// Human-readable reason, when provided.
        #[serde(default)]
        message: Option<String>,
    },

    /// Answer to one request.
    #[serde(rename = "result")]
    CommandResult {
        /// Id of the request this answers.
        id: MessageId,
        /// `false` when the hub rejected the request.
        #[serde(default)]
        success: bool,
        /// Payload; `null` for commands that return nothing.
        #[serde(default)]
        result: Value,
        /// Error object (`{"code":..., "message":...}`) when `success` is false.
        #[serde(default)]
        error: Option<Value>,
    },

    /// Push delivery for a subscription (or a one-shot request answered by event).
    Event {
        /// Id of the subscription request.
        id: MessageId,
        /// Event payload.
        #[serde(default)]
        event: Value,
    },

    /// Any other frame type.  The session routes these by type name.
    #[serde(other)]
    Other,
}

impl Inbound {
    /// Classifies a decoded message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidField`] if a recognised frame type is
    /// missing a required field or carries a field of the wrong JSON type
    /// (for example a `"result"` frame whose `"id"` is a string).
    pub fn from_message(msg: &Message) -> Result<Self, ProtocolError> {
        let frame_type = message_type(msg).unwrap_or_default().to_string();
        serde_json::from_value(Value::Object(msg.clone())).map_err(|e| {
            ProtocolError::InvalidField {
                frame_type,
                reason: e.to_string(),
            }
        })
    }
}

// ── Field accessors ───────────────────────────────────────────────────────────

/// Returns the `"type"` field of `msg`, if it is a string.
pub fn message_type(msg: &Message) -> Option<&str> {
    msg.get("type").and_then(Value::as_str)
}

/// Returns the `"id"` field of `msg`, if it is a non-negative integer.
pub fn message_id(msg: &Message) -> Option<MessageId> {
    msg.get("id").and_then(Value::as_u64)
}

// ── Outbound builders ─────────────────────────────────────────────────────────

/// Turns a `json!` object literal into a [`Message`].
fn object(value: Value) -> Message {
    match value {
        Value::Object(map) => map,
        _ => Message::new(),
    }
}

/// Builds a bare message carrying only a `"type"` field.
pub fn message(frame_type: &str) -> Message {
    object(json!({ "type": frame_type }))
}

/// Builds the auth frame.  It never carries an id.
pub fn auth(access_token: &str) -> Message {
    object(json!({ "type": "auth", "access_token": access_token }))
}

/// Builds a keepalive probe.  The session allocates its id.
pub fn ping() -> Message {
    message(TYPE_PING)
}

/// Builds a `call_service` command.
///
/// `domain_service` uses the `domain.service` notation (`"light.turn_on"`).
/// Optional parts are omitted from the frame rather than sent as `null`, and
/// `return_response` is only included when set.
pub fn call_service(
    domain_service: &str,
    service_data: Option<Value>,
    target: Option<Value>,
    return_response: bool,
) -> Message {
    let (domain, service) = domain_service
        .split_once('.')
        .unwrap_or((domain_service, ""));
    let mut msg = object(json!({
        "type": "call_service",
        "domain": domain,
        "service": service,
    }));
    if let Some(data) = service_data {
        msg.insert("service_data".into(), data);
    }
    if let Some(target) = target {
        msg.insert("target".into(), target);
    }
    if return_response {
        msg.insert("return_response".into(), Value::Bool(true));
    }
    msg
}

/// Builds a `subscribe_events` command; `None` subscribes to every event type.
pub fn subscribe_events(event_type: Option<&str>) -> Message {
    let mut msg = message("subscribe_events");
    if let Some(event_type) = event_type {
        msg.insert("event_type".into(), Value::String(event_type.to_string()));
    }
    msg
}

/// Builds a `subscribe_trigger` command for an automation trigger definition.
pub fn subscribe_trigger(trigger: Value) -> Message {
    object(json!({ "type": "subscribe_trigger", "trigger": trigger }))
}

/// Builds an `unsubscribe_events` command for the subscription opened by the
/// request with id `subscription`.
pub fn unsubscribe_events(subscription: MessageId) -> Message {
    object(json!({ "type": "unsubscribe_events", "subscription": subscription }))
}

/// Builds a `render_template` command.
pub fn render_template(template: &str, report_errors: bool) -> Message {
    object(json!({
        "type": "render_template",
        "template": template,
        "report_errors": report_errors,
    }))
}
