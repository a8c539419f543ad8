use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced while setting up traffic logging.
///
/// Writes never produce one of these: once a sink is configured, emit
/// failures are reported through `tracing` and swallowed.
#[derive(Error, Debug)]
pub enum TrafficLogError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Cannot open traffic log {path}: {source}")]
    SinkSetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrafficLogError {
    pub fn sink_setup(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrafficLogError::SinkSetup {
            path: path.into(),
            source,
        }
    }
}

impl From<figment::Error> for TrafficLogError {
    fn from(e: figment::Error) -> Self {
        TrafficLogError::Config(e.to_string())
    }
}
