// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  trafficlog — write traffic lines from the command line
//
//  Single record:  trafficlog --kind request --command echo --cost-ms 2
//  Stream:         producer | trafficlog --stdin
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

mod input;

use clap::Parser;
use input::{KindInput, RecordInput};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use trafficlog::{Fields, Traffic, TrafficEntry, TrafficLogConfig};

#[derive(Parser, Debug)]
#[command(name = "trafficlog", version, about = "Write structured traffic log lines")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "trafficlog.yaml")]
    config: PathBuf,

    /// Diagnostic log level (diagnostics go to stderr)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Read JSON records, one per line, from stdin
    #[arg(long)]
    stdin: bool,

    #[arg(long, value_enum)]
    kind: Option<KindInput>,

    #[arg(long, default_value = "")]
    command: String,

    #[arg(long, default_value_t = 0)]
    code: i64,

    #[arg(long, default_value = "")]
    message: String,

    #[arg(long, default_value_t = 0)]
    cost_ms: u64,

    /// Tracing id attached to every line
    #[arg(long)]
    tracing_id: Option<String>,

    /// Extra field as key=value (repeatable)
    #[arg(long = "field", value_parser = input::parse_field)]
    fields: Vec<(String, serde_json::Value)>,

    /// Field or payload key to leave out (repeatable)
    #[arg(long = "ignore")]
    ignores: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    // ── Config ──
    let config = if cli.config.exists() {
        info!(path = %cli.config.display(), "Loading config file");
        TrafficLogConfig::load(&cli.config)?
    } else {
        info!("No config file found, using defaults");
        TrafficLogConfig::default()
    };

    trafficlog::configure(config)?;

    // ── Entry ──
    let mut entry = trafficlog::default_entry()
        .with_fields(cli.fields.iter().cloned().collect::<Fields>())
        .with_ignores(cli.ignores.iter().cloned());
    if let Some(id) = &cli.tracing_id {
        entry = entry.with_tracing(id.as_str());
    }

    if cli.stdin {
        stream(&entry)?;
    } else {
        entry.emit(&Traffic {
            kind: cli.kind.map(Into::into),
            command: cli.command,
            code: cli.code,
            message: cli.message,
            cost: Duration::from_millis(cli.cost_ms),
            ..Default::default()
        });
    }

    entry.sink().flush()?;
    Ok(())
}

/// Emit one line per stdin record; malformed records are skipped.
fn stream(entry: &TrafficEntry) -> io::Result<()> {
    let stdin = io::stdin();
    let mut written = 0usize;
    for (n, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match RecordInput::parse(&line) {
            Ok(record) => {
                let (traffic, fields) = record.into_parts();
                entry.emit_with(&traffic, &fields);
                written += 1;
            }
            Err(e) => warn!(line = n + 1, error = %e, "Skipping malformed record"),
        }
    }
    info!(records = written, "Stdin drained");
    Ok(())
}
