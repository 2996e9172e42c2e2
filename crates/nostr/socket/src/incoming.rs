//! Incoming relay protocol messages.
//!
//! Relay frames are JSON arrays keyed by the verb at position 0:
//! - `["EVENT", <subscription_id>, <event>]`
//! - `["EVENTS", <subscription_id>, [<event>, ...]]`
//! - `["EOSE", <subscription_id>]`
//! - `["OK", <event_id>, <true|false>, <message>?]`
//! - `["NOTICE", <subscription_id>?, <message>?]`
//! - `["AUTH", <challenge>]`
//! - `["COUNT", <subscription_id>, {"count": <n>}]`
//!
//! Any other verb is read as a NOTICE. Malformed frames never raise: [`parse`]
//! logs them and returns `None`, so one bad frame cannot take down the
//! connection that carried it.

use crate::event::{Event, ExtensionEvent};
use crate::kind::{DefaultKindClassifier, KindClass, KindClassifier};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Longest frame prefix quoted in parse warnings.
const WARN_PREVIEW_CHARS: usize = 256;

/// Why a frame could not be turned into a message.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Messages sent from relay to client.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// Single event for a subscription. At most one slot is populated.
    Event {
        subscription_id: String,
        event: Option<Event>,
        extension_event: Option<ExtensionEvent>,
    },

    /// Batch of events for a subscription.
    Events {
        subscription_id: String,
        events: Vec<Event>,
        extension_events: Vec<ExtensionEvent>,
    },

    /// End of stored events for a subscription.
    Eose { subscription_id: String },

    /// Result of a published event.
    Ok {
        event_id: String,
        success: bool,
        message: Option<String>,
    },

    /// Free-text notice, optionally tied to a subscription.
    Notice {
        subscription_id: Option<String>,
        message: Option<String>,
    },

    /// Authentication challenge (NIP-42).
    Auth { challenge: String },

    /// Count response (NIP-45).
    Count { subscription_id: String, count: u64 },
}

impl IncomingMessage {
    /// Subscription this message correlates with, if any.
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            IncomingMessage::Event {
                subscription_id, ..
            }
            | IncomingMessage::Events {
                subscription_id, ..
            }
            | IncomingMessage::Eose { subscription_id }
            | IncomingMessage::Count {
                subscription_id, ..
            } => Some(subscription_id),
            IncomingMessage::Notice {
                subscription_id, ..
            } => subscription_id.as_deref(),
            IncomingMessage::Ok { .. } | IncomingMessage::Auth { .. } => None,
        }
    }

    /// Parse a frame with the [`DefaultKindClassifier`].
    pub fn from_json(text: &str) -> Option<Self> {
        parse(text, &DefaultKindClassifier)
    }

    /// Whether this is an end-of-stored-events marker.
    pub fn is_eose(&self) -> bool {
        matches!(self, IncomingMessage::Eose { .. })
    }
}

/// Parse one relay frame. Returns `None` for anything malformed.
pub fn parse(text: &str, classifier: &dyn KindClassifier) -> Option<IncomingMessage> {
    match try_parse(text, classifier) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Dropping relay frame: {} ({})", e, preview(text));
            None
        }
    }
}

fn try_parse(
    text: &str,
    classifier: &dyn KindClassifier,
) -> Result<Option<IncomingMessage>, MessageError> {
    let arr: Vec<Value> = serde_json::from_str(text)?;

    let Some(verb) = arr.first() else {
        return Err(MessageError::InvalidFormat("empty array".to_string()));
    };

    match verb.as_str() {
        Some("EVENT") => parse_event(&arr, classifier),
        Some("EVENTS") => parse_events(&arr, classifier).map(Some),
        Some("EOSE") => {
            let subscription_id = required_str(&arr, 1, "subscription_id")?;
            Ok(Some(IncomingMessage::Eose { subscription_id }))
        }
        Some("OK") => {
            let event_id = required_str(&arr, 1, "event_id")?;
            let success = arr
                .get(2)
                .and_then(Value::as_bool)
                .ok_or_else(|| MessageError::MissingField("success".to_string()))?;
            Ok(Some(IncomingMessage::Ok {
                event_id,
                success,
                message: optional_str(&arr, 3),
            }))
        }
        Some("AUTH") => {
            let challenge = required_str(&arr, 1, "challenge")?;
            Ok(Some(IncomingMessage::Auth { challenge }))
        }
        Some("COUNT") => {
            let subscription_id = required_str(&arr, 1, "subscription_id")?;
            let count = arr
                .get(2)
                .and_then(Value::as_object)
                .and_then(|obj| obj.get("count"))
                .and_then(count_value)
                .ok_or_else(|| MessageError::MissingField("count".to_string()))?;
            Ok(Some(IncomingMessage::Count {
                subscription_id,
                count,
            }))
        }
        // NOTICE and every unrecognized verb
        _ => Ok(Some(IncomingMessage::Notice {
            subscription_id: optional_str(&arr, 1),
            message: optional_str(&arr, 2),
        })),
    }
}

fn parse_event(
    arr: &[Value],
    classifier: &dyn KindClassifier,
) -> Result<Option<IncomingMessage>, MessageError> {
    let subscription_id = required_str(arr, 1, "subscription_id")?;
    let payload = arr
        .get(2)
        .filter(|v| v.is_object())
        .ok_or_else(|| MessageError::MissingField("event".to_string()))?;

    let (event, extension_event) = match parse_payload(payload, classifier)? {
        Payload::Standard(event) => (Some(event), None),
        Payload::Extension(event) => (None, Some(event)),
        Payload::Unknown => (None, None),
    };

    Ok(Some(IncomingMessage::Event {
        subscription_id,
        event,
        extension_event,
    }))
}

fn parse_events(
    arr: &[Value],
    classifier: &dyn KindClassifier,
) -> Result<IncomingMessage, MessageError> {
    let subscription_id = required_str(arr, 1, "subscription_id")?;
    let payloads = arr
        .get(2)
        .and_then(Value::as_array)
        .ok_or_else(|| MessageError::MissingField("events".to_string()))?;

    let mut events = Vec::new();
    let mut extension_events = Vec::new();
    for (index, payload) in payloads.iter().enumerate() {
        match parse_payload(payload, classifier) {
            Ok(Payload::Standard(event)) => events.push(event),
            Ok(Payload::Extension(event)) => extension_events.push(event),
            Ok(Payload::Unknown) => {}
            Err(e) => warn!(
                "Skipping event {} in EVENTS batch for {}: {}",
                index, subscription_id, e
            ),
        }
    }

    Ok(IncomingMessage::Events {
        subscription_id,
        events,
        extension_events,
    })
}

enum Payload {
    Standard(Event),
    Extension(ExtensionEvent),
    Unknown,
}

/// Route an event object by kind and parse it for its slot.
fn parse_payload(payload: &Value, classifier: &dyn KindClassifier) -> Result<Payload, MessageError> {
    let kind = payload
        .get("kind")
        .and_then(Value::as_u64)
        .ok_or_else(|| MessageError::MissingField("kind".to_string()))?;
    Ok(match classifier.classify(kind) {
        KindClass::Standard => Payload::Standard(Event::from_value(payload)?),
        KindClass::Extension => Payload::Extension(ExtensionEvent::from_value(payload)?),
        KindClass::Unknown => Payload::Unknown,
    })
}

fn required_str(arr: &[Value], index: usize, field: &str) -> Result<String, MessageError> {
    arr.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| MessageError::MissingField(field.to_string()))
}

fn optional_str(arr: &[Value], index: usize) -> Option<String> {
    arr.get(index).and_then(Value::as_str).map(str::to_string)
}

fn count_value(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    })
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(WARN_PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
