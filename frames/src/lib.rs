//! Shared chat event model and JSON codec for the live chat channel.
//!
//! This crate owns the wire representation exchanged with the chat server.
//! Every message on the channel is a JSON envelope `{ "type": kind, ... }`
//! whose body sits under `data` (server to client) or `payload` (client to
//! server). Bodies are decoded into typed events; kinds the client does not
//! recognise decode to nothing rather than an error.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};

/// Error returned by [`decode_event`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text could not be parsed as JSON at all.
    #[error("invalid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The text parsed, but the top-level value is not an object.
    #[error("envelope is not a JSON object")]
    NotAnObject,
    /// The body of a recognised kind does not fit that kind's shape.
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        source: serde_json::Error,
    },
    /// A `typing` body carried an empty sender.
    #[error("typing signal without sender")]
    MissingSender,
}

/// The closed set of event kinds understood on the live channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    Typing,
    Ack,
    Seen,
    Status,
}

impl EventKind {
    /// Wire name of the kind as it appears in the envelope `type` field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Typing => "typing",
            Self::Ack => "ack",
            Self::Seen => "seen",
            Self::Status => "status",
        }
    }

    /// Parse a wire name. Unknown names yield `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "message" => Some(Self::Message),
            "typing" => Some(Self::Typing),
            "ack" => Some(Self::Ack),
            "seen" => Some(Self::Seen),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

/// A single chat message.
///
/// The history endpoint serialises `id` as an integer while the live channel
/// sends a string, so both are accepted and normalised to a string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(alias = "from")]
    pub from_user: String,
    pub text: String,
    #[serde(default)]
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub delivered: bool,
    #[serde(default)]
    pub seen: bool,
}

impl ChatMessage {
    /// Build a message authored locally. The server assigns the real id.
    #[must_use]
    pub fn outgoing(from: &str, text: &str, time: &str) -> Self {
        Self {
            id: String::new(),
            from_user: from.to_owned(),
            text: text.to_owned(),
            time: time.to_owned(),
            created_at: None,
            delivered: false,
            seen: false,
        }
    }
}

/// Ephemeral "someone is composing" signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingSignal {
    pub from: String,
}

/// Server acknowledgement of a message the client sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ack {
    pub id: Option<String>,
}

/// Message ids that have been marked seen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Seen {
    pub ids: Vec<String>,
}

/// Free-form server status notice (e.g. "connected").
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusNotice {
    pub message: Option<String>,
}

/// A decoded live-channel event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    Message(ChatMessage),
    Typing(TypingSignal),
    Ack(Ack),
    Seen(Seen),
    Status(StatusNotice),
}

impl ChatEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::Typing(_) => EventKind::Typing,
            Self::Ack(_) => EventKind::Ack,
            Self::Seen(_) => EventKind::Seen,
            Self::Status(_) => EventKind::Status,
        }
    }
}

/// Decode one envelope received from the server.
///
/// Returns `Ok(None)` when the envelope has no `type` or an unrecognised one.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for unparseable text, [`CodecError::NotAnObject`]
/// for non-object envelopes, and [`CodecError::Payload`] /
/// [`CodecError::MissingSender`] when a `message` or `typing` body is unusable.
/// `ack`, `seen` and `status` bodies never fail; odd shapes decode to defaults.
pub fn decode_event(text: &str) -> Result<Option<ChatEvent>, CodecError> {
    let Value::Object(mut envelope) = serde_json::from_str::<Value>(text)? else {
        return Err(CodecError::NotAnObject);
    };

    let Some(kind) = envelope
        .get("type")
        .and_then(Value::as_str)
        .and_then(EventKind::parse)
    else {
        return Ok(None);
    };

    let body = take_body(&mut envelope);

    let event = match kind {
        EventKind::Message => {
            let msg = serde_json::from_value::<ChatMessage>(body)
                .map_err(|source| CodecError::Payload { kind: "message", source })?;
            ChatEvent::Message(msg)
        }
        EventKind::Typing => {
            let signal = serde_json::from_value::<TypingSignal>(body)
                .map_err(|source| CodecError::Payload { kind: "typing", source })?;
            if signal.from.is_empty() {
                return Err(CodecError::MissingSender);
            }
            ChatEvent::Typing(signal)
        }
        EventKind::Ack => ChatEvent::Ack(Ack {
            id: body.get("id").and_then(id_from_value),
        }),
        EventKind::Seen => ChatEvent::Seen(Seen {
            ids: body
                .get("ids")
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter_map(id_from_value).collect())
                .unwrap_or_default(),
        }),
        EventKind::Status => ChatEvent::Status(StatusNotice {
            message: body
                .get("message")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
        }),
    };

    Ok(Some(event))
}

/// Encode an event as an outbound envelope for the server.
///
/// Outbound bodies go under `payload`. A `seen` event is sent as the
/// server's `mark_seen` request; the server answers with a `seen` broadcast.
#[must_use]
pub fn encode_event(event: &ChatEvent) -> String {
    let (kind, payload) = match event {
        ChatEvent::Message(msg) => (
            EventKind::Message.as_str(),
            json!({ "from": msg.from_user, "text": msg.text, "time": msg.time }),
        ),
        ChatEvent::Typing(signal) => (EventKind::Typing.as_str(), json!({ "from": signal.from })),
        ChatEvent::Ack(ack) => (EventKind::Ack.as_str(), json!({ "id": ack.id })),
        ChatEvent::Seen(seen) => ("mark_seen", json!({ "ids": seen.ids })),
        ChatEvent::Status(status) => (EventKind::Status.as_str(), json!({ "message": status.message })),
    };

    json!({ "type": kind, "payload": payload }).to_string()
}

fn take_body(envelope: &mut Map<String, Value>) -> Value {
    envelope
        .remove("data")
        .or_else(|| envelope.remove("payload"))
        .unwrap_or(Value::Null)
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_or_number<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(de)?;
    id_from_value(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected string or number id, got {value}")))
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
