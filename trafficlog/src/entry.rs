//! Chainable traffic logging handle.
//!
//! A [`TrafficEntry`] never changes once built. The `with_*` methods return a
//! new entry that shares the sink but owns its own fields and ignore-set, so
//! entries can be cached in a context or moved across tasks freely.
//!
//! A rendered line looks like:
//!
//! ```text
//! 2025-01-15 10:30:00.123|DATA|sent_to|echo|2ms|0|ok|foo=bar|request=Alice
//! ```

use crate::fields::Fields;
use crate::record::Traffic;
use crate::redact::strip_ignored;
use crate::sink::{SharedWriter, TrafficWriter, build_sink};
use chrono::Utc;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;
use tracing::warn;
use trafficlog_core::config::{DEFAULT_SEPARATOR, DEFAULT_TIME_FORMAT};
use trafficlog_core::{TrafficLogConfig, TrafficLogError};

/// Level token written on every traffic line, whatever the app log level.
pub const DATA_LEVEL: &str = "DATA";
/// Stand-in for empty positional segments.
pub const PLACEHOLDER: &str = "-";
pub const REQUEST_KEY: &str = "request";
pub const RESPONSE_KEY: &str = "response";
pub const TRACE_KEY: &str = "trace_id";

#[derive(Clone)]
pub struct TrafficEntry {
    fields: Fields,
    ignores: BTreeSet<String>,
    tracing_id: Option<String>,
    separator: String,
    time_format: String,
    sink: SharedWriter,
}

impl TrafficEntry {
    /// Entry with no fields writing to `sink` with the default layout.
    pub fn new(sink: SharedWriter) -> Self {
        Self {
            fields: Fields::new(),
            ignores: BTreeSet::new(),
            tracing_id: None,
            separator: DEFAULT_SEPARATOR.to_string(),
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            sink,
        }
    }

    /// Build the sink described by `config` and an entry on top of it.
    pub fn from_config(config: &TrafficLogConfig) -> Result<Self, TrafficLogError> {
        Self::build(config, None)
    }

    /// Like [`from_config`](Self::from_config), with `console` standing in for
    /// the configured console stream.
    pub fn from_config_with_console(
        config: &TrafficLogConfig,
        console: impl Write + Send + 'static,
    ) -> Result<Self, TrafficLogError> {
        Self::build(config, Some(Box::new(console)))
    }

    fn build(
        config: &TrafficLogConfig,
        console: Option<Box<dyn Write + Send>>,
    ) -> Result<Self, TrafficLogError> {
        let config = config.clone().normalized();
        let sink = build_sink(&config, console)?;
        Ok(Self {
            separator: config.separator,
            time_format: config.time_format,
            ..Self::new(sink)
        })
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn ignores(&self) -> &BTreeSet<String> {
        &self.ignores
    }

    pub fn tracing_id(&self) -> Option<&str> {
        self.tracing_id.as_deref()
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn sink(&self) -> &SharedWriter {
        &self.sink
    }

    // ── Derivations ──────────────────────────────────────────────────────────

    /// New entry carrying the union of our fields and `fields` (theirs win).
    pub fn with_fields(&self, fields: Fields) -> Self {
        Self {
            fields: self.fields.merged(&fields),
            ..self.clone()
        }
    }

    /// New entry tagged with `id`. The id is stored as given; an empty id
    /// clears any previous one from the rendered line.
    pub fn with_tracing(&self, id: impl Into<String>) -> Self {
        Self {
            tracing_id: Some(id.into()),
            ..self.clone()
        }
    }

    /// New entry that also hides `names` from structured output.
    pub fn with_ignores<I, S>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ignores = self.ignores.clone();
        ignores.extend(names.into_iter().map(Into::into));
        Self {
            ignores,
            ..self.clone()
        }
    }

    pub fn with_separator(&self, separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            ..self.clone()
        }
    }

    pub fn with_time_format(&self, time_format: impl Into<String>) -> Self {
        Self {
            time_format: time_format.into(),
            ..self.clone()
        }
    }

    // ── Emitting ─────────────────────────────────────────────────────────────

    /// Write one traffic line. Failures are reported through `tracing` only.
    pub fn emit(&self, traffic: &Traffic) {
        self.write_line(traffic, None);
    }

    /// Write one traffic line with `extra` fields layered over the entry's.
    pub fn emit_with(&self, traffic: &Traffic, extra: &Fields) {
        self.write_line(traffic, Some(extra));
    }

    fn write_line(&self, traffic: &Traffic, extra: Option<&Fields>) {
        let line = self.format_line(traffic, extra);
        if let Err(e) = self.sink.write_all(line.as_bytes()) {
            warn!(error = %e, command = %traffic.command, "Failed to write traffic log line");
        }
    }

    /// Render the full line, trailing newline included.
    pub fn format_line(&self, traffic: &Traffic, extra: Option<&Fields>) -> String {
        let sep = self.separator.as_str();
        let mut line = String::with_capacity(128);

        // An invalid time format yields fmt::Error rather than a panic here.
        if write!(line, "{}", Utc::now().format(&self.time_format)).is_err() {
            line.clear();
            line.push_str(PLACEHOLDER);
        }
        line.push_str(sep);
        line.push_str(DATA_LEVEL);
        line.push_str(sep);
        line.push_str(&format_message(traffic, sep));

        self.push_structured(&mut line, traffic, extra);

        line.push('\n');
        line
    }

    /// Key/value pairs following the positional part: fields, tracing id,
    /// then payloads, minus anything in the ignore-set.
    fn push_structured(&self, line: &mut String, traffic: &Traffic, extra: Option<&Fields>) {
        let sep = self.separator.as_str();
        let visible = |k: &str| !self.ignores.contains(k);

        let trace_id = self
            .tracing_id
            .as_deref()
            .filter(|id| !id.is_empty() && visible(TRACE_KEY));
        let payloads = [(REQUEST_KEY, &traffic.request), (RESPONSE_KEY, &traffic.response)]
            .map(|(key, payload)| (key, payload.as_ref().filter(|_| visible(key))));

        // A reserved key that is about to be written shadows a field of the same name.
        let reserved = |k: &str| {
            (k == TRACE_KEY && trace_id.is_some())
                || payloads.iter().any(|(key, p)| *key == k && p.is_some())
        };

        let merged;
        let fields = match extra {
            Some(extra) if !extra.is_empty() => {
                merged = self.fields.merged(extra);
                &merged
            }
            _ => &self.fields,
        };
        for (key, value) in fields {
            if visible(key.as_str()) && !reserved(key.as_str()) {
                push_pair(line, sep, key, value);
            }
        }

        if let Some(id) = trace_id {
            push_pair(line, sep, TRACE_KEY, &Value::String(id.to_string()));
        }

        for (key, payload) in payloads {
            if let Some(payload) = payload {
                push_pair(line, sep, key, &self.redacted(payload));
            }
        }
    }

    fn redacted<'a>(&self, payload: &'a Value) -> Cow<'a, Value> {
        if self.ignores.is_empty() {
            return Cow::Borrowed(payload);
        }
        let mut owned = payload.clone();
        strip_ignored(&mut owned, &self.ignores);
        Cow::Owned(owned)
    }
}

impl PartialEq for TrafficEntry {
    /// Same content and the same sink instance.
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
            && self.ignores == other.ignores
            && self.tracing_id == other.tracing_id
            && self.separator == other.separator
            && self.time_format == other.time_format
            && Arc::ptr_eq(&self.sink, &other.sink)
    }
}

impl std::fmt::Debug for TrafficEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficEntry")
            .field("fields", &self.fields)
            .field("ignores", &self.ignores)
            .field("tracing_id", &self.tracing_id)
            .field("separator", &self.separator)
            .finish_non_exhaustive()
    }
}

/// Positional part of a traffic line: `type|command|<cost>ms|code|message`.
/// Line breaks inside `command` and `message` are written as `\n` / `\r`.
pub fn format_message(traffic: &Traffic, separator: &str) -> String {
    let or_placeholder = |s: &str| {
        if s.is_empty() {
            PLACEHOLDER.to_owned()
        } else {
            escape_breaks(s).into_owned()
        }
    };
    let kind = traffic.kind.map_or(PLACEHOLDER, |k| k.as_str());

    let mut millis = itoa::Buffer::new();
    let mut code = itoa::Buffer::new();
    let cost = format!("{}ms", millis.format(traffic.cost.as_millis()));

    [
        kind.to_owned(),
        or_placeholder(&traffic.command),
        cost,
        code.format(traffic.code).to_owned(),
        or_placeholder(&traffic.message),
    ]
    .join(separator)
}

fn push_pair(line: &mut String, sep: &str, key: &str, value: &Value) {
    line.push_str(sep);
    line.push_str(&escape_breaks(key));
    line.push('=');
    render_value(line, value);
}

/// Keep one record per line: `\n` and `\r` become their two-character escapes.
fn escape_breaks(s: &str) -> Cow<'_, str> {
    if !s.contains(['\n', '\r']) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.replace('\n', "\\n").replace('\r', "\\r"))
}

/// Strings go out raw unless they would break the line; everything else is
/// compact JSON.
fn render_value(out: &mut String, value: &Value) {
    match value {
        Value::String(s) if !s.contains(['\n', '\r']) => out.push_str(s),
        other => {
            let _ = write!(out, "{other}");
        }
    }
}
