//! Generic request and response containers.
//!
//! Command schemas live outside this crate. The client only needs an
//! order-preserving object it can stamp with an `id`, and a reply object it
//! can read `type`, `id` and `status` from.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outbound command object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Request(Map<String, Value>);

impl Request {
    /// Create a request for `command` with no parameters.
    pub fn new(command: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("command".to_owned(), Value::String(command.into()));
        Self(fields)
    }

    /// Builder-style parameter insertion.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a parameter.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The `command` field, if set.
    pub fn command(&self) -> Option<&str> {
        self.0.get("command").and_then(Value::as_str)
    }

    /// The `id` field, if already stamped.
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub(crate) fn stamp_id(&mut self, id: &str) {
        self.0.insert("id".to_owned(), Value::String(id.to_owned()));
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.0).map_err(|e| ClientError::encode(e.to_string()))
    }
}

impl From<Map<String, Value>> for Request {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Inbound reply or push frame, decoded as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Response(Map<String, Value>);

impl Response {
    /// Decode a frame. Anything but a JSON object is a decode error.
    pub fn from_slice(frame: &[u8]) -> Result<Self> {
        serde_json::from_slice(frame).map_err(|e| ClientError::decode(e.to_string()))
    }

    /// The `type` discriminator.
    pub fn response_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// The correlation id rendered as a string.
    ///
    /// Numbers and booleans are rendered via their JSON text; a missing or
    /// null id is `None`.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::Null => None,
            Value::String(id) => Some(id.clone()),
            other => Some(other.to_string()),
        }
    }

    /// The `status` field (`success` or `error`).
    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(Value::as_str)
    }

    /// Whether the node reported success.
    pub fn is_success(&self) -> bool {
        self.status() == Some("success")
    }

    /// The `error` code on failed replies.
    pub fn error(&self) -> Option<&str> {
        self.0.get("error").and_then(Value::as_str)
    }

    /// The `result` payload.
    pub fn result(&self) -> Option<&Value> {
        self.0.get("result")
    }

    /// Look up any field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Consume into the underlying object.
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Response {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}
