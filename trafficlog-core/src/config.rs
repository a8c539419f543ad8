use crate::error::TrafficLogError;
use figment::{Figment, providers::{Env, Format, Yaml}};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Separator placed between positional and structured segments of a line.
pub const DEFAULT_SEPARATOR: &str = "|";

/// Timestamp layout prefixed to every traffic line (chrono strftime).
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Console destination used when console logging is on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleStream {
    #[default]
    Stdout,
    Stderr,
}

/// Traffic log sink settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrafficLogConfig {
    /// Write to a rotating file under `directory`. The remaining file
    /// settings are ignored when this is false.
    #[serde(default)]
    pub file_enabled: bool,
    /// Write to the console stream. Forced on when `file_enabled` is false.
    #[serde(default)]
    pub console_enabled: bool,
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_filename")]
    pub filename: String,
    /// Size of the active file, in MB, before it is rotated.
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
    /// Rotated files to keep. 0 = unlimited.
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    /// Days to keep a rotated file. 0 = unlimited.
    #[serde(default)]
    pub max_age_days: u64,
    #[serde(default)]
    pub console_stream: ConsoleStream,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default = "default_time_format")]
    pub time_format: String,
    /// Also rotate when the UTC date changes.
    #[serde(default)]
    pub rotate_daily: bool,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_directory() -> PathBuf { PathBuf::from("log") }
fn default_filename() -> String { "data.log".into() }
fn default_max_size_mb() -> u64 { 100 }
fn default_max_backups() -> usize { 10 }
fn default_separator() -> String { DEFAULT_SEPARATOR.into() }
fn default_time_format() -> String { DEFAULT_TIME_FORMAT.into() }

impl Default for TrafficLogConfig {
    fn default() -> Self {
        Self {
            file_enabled: false,
            console_enabled: false,
            directory: default_directory(),
            filename: default_filename(),
            max_size_mb: default_max_size_mb(),
            max_backups: default_max_backups(),
            max_age_days: 0,
            console_stream: ConsoleStream::default(),
            separator: default_separator(),
            time_format: default_time_format(),
            rotate_daily: false,
        }
    }
}

// ── Impls ─────────────────────────────────────────────────────

impl TrafficLogConfig {
    /// Load configuration from YAML file + `TRAFFICLOG_*` env overrides.
    pub fn load(path: &Path) -> Result<Self, TrafficLogError> {
        let config: TrafficLogConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("TRAFFICLOG_"))
            .extract()?;
        Ok(config)
    }

    /// Apply sink invariants: a config with file logging off always logs to
    /// the console, and blank settings fall back to their defaults.
    pub fn normalized(mut self) -> Self {
        if !self.file_enabled {
            self.console_enabled = true;
        }
        if self.filename.is_empty() {
            self.filename = default_filename();
        }
        if self.max_size_mb == 0 {
            self.max_size_mb = default_max_size_mb();
        }
        if self.separator.is_empty() {
            self.separator = default_separator();
        }
        if self.time_format.is_empty() {
            self.time_format = default_time_format();
        }
        self
    }

    /// Path of the active log file.
    pub fn log_path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(BYTES_PER_MB)
    }

    /// Retention window for rotated files, `None` when unlimited.
    pub fn max_age(&self) -> Option<std::time::Duration> {
        (self.max_age_days > 0)
            .then(|| std::time::Duration::from_secs(self.max_age_days.saturating_mul(86_400)))
    }
}
