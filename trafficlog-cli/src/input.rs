//! JSON-lines record format accepted on stdin.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use trafficlog::{Fields, Traffic, TrafficKind};

/// One stdin line, e.g.
/// `{"kind":"request","command":"echo","code":0,"message":"ok","cost_ms":2}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RecordInput {
    pub kind: Option<KindInput>,
    pub command: String,
    pub code: i64,
    pub message: String,
    pub cost_ms: u64,
    pub request: Option<Value>,
    pub response: Option<Value>,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum KindInput {
    Access,
    Request,
}

impl From<KindInput> for TrafficKind {
    fn from(k: KindInput) -> Self {
        match k {
            KindInput::Access => TrafficKind::Access,
            KindInput::Request => TrafficKind::Request,
        }
    }
}

impl RecordInput {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub fn into_parts(self) -> (Traffic, Fields) {
        let traffic = Traffic {
            kind: self.kind.map(Into::into),
            command: self.command,
            code: self.code,
            message: self.message,
            cost: Duration::from_millis(self.cost_ms),
            request: self.request,
            response: self.response,
        };
        (traffic, self.fields.into_iter().collect())
    }
}

/// Parse a `key=value` flag. Values that parse as JSON keep their type.
pub fn parse_field(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
