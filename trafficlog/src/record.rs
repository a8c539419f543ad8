//! The traffic record handed to an entry for every logged exchange.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Direction of a logged exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficKind {
    /// An inbound request we served.
    Access,
    /// An outbound request we made.
    Request,
}

impl TrafficKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficKind::Access => "recv_at",
            TrafficKind::Request => "sent_to",
        }
    }
}

impl std::fmt::Display for TrafficKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged request/response exchange.
///
/// Built fresh for each event and only read by the formatter. Empty
/// `kind`, `command` or `message` render as `-`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Traffic {
    pub kind: Option<TrafficKind>,
    pub command: String,
    /// Application error code, 0 on success.
    pub code: i64,
    pub message: String,
    /// Time spent processing the exchange.
    pub cost: Duration,
    pub request: Option<Value>,
    pub response: Option<Value>,
}

impl Traffic {
    /// Record for an inbound call to `command`.
    pub fn access(command: impl Into<String>) -> Self {
        Self {
            kind: Some(TrafficKind::Access),
            command: command.into(),
            ..Default::default()
        }
    }

    /// Record for an outbound call to `command`.
    pub fn request(command: impl Into<String>) -> Self {
        Self {
            kind: Some(TrafficKind::Request),
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_cost(mut self, cost: Duration) -> Self {
        self.cost = cost;
        self
    }

    /// Attach the request payload. A payload that fails to serialize is
    /// kept as its error text.
    pub fn with_request<T: Serialize>(mut self, payload: &T) -> Self {
        self.request = Some(to_payload(payload));
        self
    }

    pub fn with_response<T: Serialize>(mut self, payload: &T) -> Self {
        self.response = Some(to_payload(payload));
        self
    }
}

fn to_payload<T: Serialize>(payload: &T) -> Value {
    serde_json::to_value(payload)
        .unwrap_or_else(|e| Value::String(format!("<unserializable: {e}>")))
}
