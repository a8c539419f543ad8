//! Structured traffic logging.
//!
//! One line per request/response exchange, written through a chainable,
//! copy-on-write [`TrafficEntry`] to a rotating file and/or the console:
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use trafficlog::{fields, MemoryWriter, Traffic, TrafficEntry};
//!
//! let out = MemoryWriter::new();
//! let entry = TrafficEntry::new(Arc::new(out.clone()))
//!     .with_fields(fields! { "foo" => "bar" });
//!
//! entry.emit(&Traffic::request("echo").with_message("ok").with_cost(Duration::from_millis(2)));
//! assert!(out.contents().contains("|DATA|sent_to|echo|2ms|0|ok|foo=bar"));
//! ```

pub mod context;
pub mod entry;
pub mod fields;
pub mod global;
pub mod record;
pub mod redact;
pub mod rotating_file;
pub mod sink;

pub use context::Context;
pub use entry::TrafficEntry;
pub use fields::Fields;
pub use global::{configure, configure_with_console, default_entry, log, log_with};
pub use record::{Traffic, TrafficKind};
pub use rotating_file::{RotatingFile, RotatingFileConfig};
pub use sink::{ConsoleWriter, FanoutWriter, MemoryWriter, SharedWriter, TrafficWriter};
pub use trafficlog_core::{ConsoleStream, TrafficLogConfig, TrafficLogError};

#[doc(hidden)]
pub use serde_json as __serde_json;
