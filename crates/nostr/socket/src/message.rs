//! Outgoing relay protocol frames.
//!
//! Every frame is a JSON array with the verb at position 0:
//! - `["REQ", <subscription_id>, <filter>]`
//! - `["EVENT", <event>]`
//! - `["AUTH", <event>]`
//! - `["COUNT", <subscription_id>, <filter>]`
//! - `["CLOSE", <subscription_id>]`
//!
//! Payloads are taken as [`serde_json::Value`], so a frame can always be
//! built; invalid JSON cannot reach this module.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Build `["REQ", <subscription_id>, <filter>]`.
pub fn build_req(subscription_id: &str, filter: &Value) -> String {
    format!(r#"["REQ",{},{}]"#, quote(subscription_id), filter)
}

/// Build `["EVENT", <event>]`.
pub fn build_event(event: &Value) -> String {
    format!(r#"["EVENT",{}]"#, event)
}

/// Build `["AUTH", <event>]`.
pub fn build_auth(event: &Value) -> String {
    format!(r#"["AUTH",{}]"#, event)
}

/// Build `["COUNT", <subscription_id>, <filter>]`.
pub fn build_count(subscription_id: &str, filter: &Value) -> String {
    format!(r#"["COUNT",{},{}]"#, quote(subscription_id), filter)
}

/// Build `["CLOSE", <subscription_id>]`.
pub fn build_close(subscription_id: &str) -> String {
    format!(r#"["CLOSE",{}]"#, quote(subscription_id))
}

fn quote(s: &str) -> Value {
    Value::String(s.to_string())
}

/// Messages sent from client to relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Subscribe to events: ["REQ", <subscription_id>, <filter>]
    Req {
        subscription_id: String,
        filter: Value,
    },

    /// Publish an event: ["EVENT", <event JSON>]
    Event(Value),

    /// Authentication (NIP-42): ["AUTH", <event JSON>]
    Auth(Value),

    /// Count request (NIP-45): ["COUNT", <subscription_id>, <filter>]
    Count {
        subscription_id: String,
        filter: Value,
    },

    /// Close a subscription: ["CLOSE", <subscription_id>]
    Close { subscription_id: String },
}

impl ClientMessage {
    /// Wire text for this message.
    pub fn to_json(&self) -> String {
        match self {
            ClientMessage::Req {
                subscription_id,
                filter,
            } => build_req(subscription_id, filter),
            ClientMessage::Event(event) => build_event(event),
            ClientMessage::Auth(event) => build_auth(event),
            ClientMessage::Count {
                subscription_id,
                filter,
            } => build_count(subscription_id, filter),
            ClientMessage::Close { subscription_id } => build_close(subscription_id),
        }
    }

    /// Verb at position 0 of the frame.
    pub fn verb(&self) -> &'static str {
        match self {
            ClientMessage::Req { .. } => "REQ",
            ClientMessage::Event(_) => "EVENT",
            ClientMessage::Auth(_) => "AUTH",
            ClientMessage::Count { .. } => "COUNT",
            ClientMessage::Close { .. } => "CLOSE",
        }
    }
}

/// Filter for subscription requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Event IDs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    /// Authors (pubkeys)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    /// Event kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u64>>,

    /// Events since timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    /// Events until timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    /// Maximum number of events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Generic tag queries (e.g., #e, #p)
    #[serde(flatten, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub tags: std::collections::BTreeMap<String, Vec<String>>,
}

impl Filter {
    /// Create a new empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by event IDs.
    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Filter by authors.
    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    /// Filter by kinds.
    pub fn kinds(mut self, kinds: Vec<u64>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Filter by events since timestamp.
    pub fn since(mut self, timestamp: u64) -> Self {
        self.since = Some(timestamp);
        self
    }

    /// Filter by events until timestamp.
    pub fn until(mut self, timestamp: u64) -> Self {
        self.until = Some(timestamp);
        self
    }

    /// Limit number of results.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Add a tag filter. The key should be the tag letter (e.g., "e", "p").
    pub fn tag(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.tags.insert(format!("#{}", key.into()), values);
        self
    }

    /// JSON object for use with REQ and COUNT frames.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
