//! Event payloads carried by EVENT and EVENTS frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A signed Nostr event (NIP-01).
///
/// Signatures are not verified here; the struct only guarantees that every
/// field is present with the right JSON type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// 32-bytes lowercase hex-encoded sha256 of the serialized event data
    pub id: String,
    /// 32-bytes lowercase hex-encoded public key of the event creator
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind. NIP-01 kinds fit in 0..=65535, but any kind the client's
    /// classifier treats as standard is accepted.
    pub kind: u64,
    /// Array of arrays of strings (tags)
    pub tags: Vec<Vec<String>>,
    /// Arbitrary string content
    pub content: String,
    /// 64-bytes lowercase hex signature
    pub sig: String,
}

impl Event {
    /// Structural parse of an event object.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Event::deserialize(value)
    }
}

/// A server-defined payload outside the standard kind space.
///
/// Extension events carry aggregated or auxiliary data (counts, user stats,
/// media metadata) and are usually unsigned, so only `kind` is mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionEvent {
    pub kind: u64,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

impl ExtensionEvent {
    /// Structural parse of an extension event object.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        ExtensionEvent::deserialize(value)
    }

    /// Content decoded as JSON, if it is JSON.
    pub fn content_json(&self) -> Option<Value> {
        serde_json::from_str(&self.content).ok()
    }
}
