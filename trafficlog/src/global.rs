//! Process-wide default traffic entry and package-level shortcuts.
//!
//! The default starts out writing to stdout and is replaced wholesale by
//! [`configure`]. Entries handed out earlier are clones and keep writing to
//! the sink they were built with.

use crate::context::{self, Context};
use crate::entry::TrafficEntry;
use crate::fields::Fields;
use crate::record::Traffic;
use crate::sink::ConsoleWriter;
use arc_swap::ArcSwap;
use std::io::Write;
use std::sync::{Arc, LazyLock};
use tracing::info;
use trafficlog_core::{TrafficLogConfig, TrafficLogError};

static DEFAULT_ENTRY: LazyLock<ArcSwap<TrafficEntry>> = LazyLock::new(|| {
    ArcSwap::from_pointee(TrafficEntry::new(Arc::new(ConsoleWriter::stdout())))
});

/// Build a sink from `config` and make it the default.
///
/// Errors (unwritable directory, …) are reported here once; the previous
/// default stays in place when setup fails.
pub fn configure(config: TrafficLogConfig) -> Result<(), TrafficLogError> {
    let entry = TrafficEntry::from_config(&config)?;
    log_configured(&config);
    set_default(entry);
    Ok(())
}

/// [`configure`] with a caller-supplied console stream.
pub fn configure_with_console(
    config: TrafficLogConfig,
    console: impl Write + Send + 'static,
) -> Result<(), TrafficLogError> {
    let entry = TrafficEntry::from_config_with_console(&config, console)?;
    log_configured(&config);
    set_default(entry);
    Ok(())
}

fn log_configured(config: &TrafficLogConfig) {
    let config = config.clone().normalized();
    info!(
        file = config.file_enabled,
        console = config.console_enabled,
        path = %config.log_path().display(),
        max_size_mb = config.max_size_mb,
        max_backups = config.max_backups,
        "Traffic log configured"
    );
}

pub fn set_default(entry: TrafficEntry) {
    DEFAULT_ENTRY.store(Arc::new(entry));
}

/// A private copy of the current default entry.
pub fn default_entry() -> TrafficEntry {
    DEFAULT_ENTRY.load().as_ref().clone()
}

/// Log one record through the default entry.
pub fn log(traffic: &Traffic) {
    DEFAULT_ENTRY.load().emit(traffic);
}

/// Log one record with extra fields through the default entry.
pub fn log_with(traffic: &Traffic, fields: &Fields) {
    DEFAULT_ENTRY.load().emit_with(traffic, fields);
}

pub fn with_fields(ctx: &Context, fields: Fields) -> TrafficEntry {
    context::retrieve(ctx).with_fields(fields)
}

pub fn with_tracing(ctx: &Context, id: impl Into<String>) -> TrafficEntry {
    context::retrieve(ctx).with_tracing(id)
}

pub fn with_ignores<I, S>(ctx: &Context, names: I) -> TrafficEntry
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    context::retrieve(ctx).with_ignores(names)
}
