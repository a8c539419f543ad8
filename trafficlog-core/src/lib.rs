pub mod config;
pub mod error;

pub use config::{ConsoleStream, TrafficLogConfig};
pub use error::TrafficLogError;
