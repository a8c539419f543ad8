//! Byte destinations behind a traffic entry.
//!
//! Everything an entry writes to is a [`TrafficWriter`]. The configured sink
//! is a single writer or a [`FanoutWriter`] over a rotating file and a
//! console stream.

use crate::rotating_file::{RotatingFile, RotatingFileConfig};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use trafficlog_core::{ConsoleStream, TrafficLogConfig, TrafficLogError};

/// A shared, thread-safe byte sink.
///
/// Implementations own their locking; callers may write from any thread.
pub trait TrafficWriter: Send + Sync {
    /// Write one complete record. A record is never split across two calls.
    fn write_all(&self, buf: &[u8]) -> io::Result<()>;

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

pub type SharedWriter = Arc<dyn TrafficWriter>;

fn lock<'a, T: ?Sized>(m: &'a Mutex<T>, what: &str) -> io::Result<MutexGuard<'a, T>> {
    m.lock()
        .map_err(|_| io::Error::other(format!("{what} lock poisoned")))
}

// ── Console ──────────────────────────────────────────────────────────────────

/// Console stream, or any caller-supplied `Write`.
pub struct ConsoleWriter {
    inner: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleWriter {
    pub fn new(stream: impl Write + Send + 'static) -> Self {
        Self::boxed(Box::new(stream))
    }

    pub fn boxed(stream: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Mutex::new(stream),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    pub fn from_stream(stream: ConsoleStream) -> Self {
        match stream {
            ConsoleStream::Stdout => Self::stdout(),
            ConsoleStream::Stderr => Self::stderr(),
        }
    }
}

impl TrafficWriter for ConsoleWriter {
    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut w = lock(&self.inner, "console writer")?;
        w.write_all(buf)?;
        w.flush()
    }

    fn flush(&self) -> io::Result<()> {
        lock(&self.inner, "console writer")?.flush()
    }
}

// ── Fan-out ──────────────────────────────────────────────────────────────────

/// Writes every record to each destination in turn.
///
/// A failing destination does not stop the others; the first error seen is
/// returned after all destinations were tried.
pub struct FanoutWriter {
    writers: Vec<SharedWriter>,
}

impl FanoutWriter {
    pub fn new(writers: Vec<SharedWriter>) -> Self {
        Self { writers }
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }
}

impl TrafficWriter for FanoutWriter {
    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        let mut first_err = None;
        for w in &self.writers {
            if let Err(e) = w.write_all(buf) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn flush(&self) -> io::Result<()> {
        let mut first_err = None;
        for w in &self.writers {
            if let Err(e) = w.flush() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

// ── Memory ───────────────────────────────────────────────────────────────────

/// In-memory sink. Clones share one buffer, so a clone can be handed to an
/// entry (or used as a console stream) while another reads it back.
#[derive(Clone, Default)]
pub struct MemoryWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        match self.buf.lock() {
            Ok(b) => String::from_utf8_lossy(&b).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }
}

impl TrafficWriter for MemoryWriter {
    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        lock(&self.buf, "memory writer")?.extend_from_slice(buf);
        Ok(())
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.buf, "memory writer")?.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── Assembly ─────────────────────────────────────────────────────────────────

/// Build the sink described by `config`.
///
/// With file logging off the console is always used. `console` replaces the
/// configured console stream when given. Failing to open the log file is a
/// configuration error and is returned here, never at write time.
pub fn build_sink(
    config: &TrafficLogConfig,
    console: Option<Box<dyn Write + Send>>,
) -> Result<SharedWriter, TrafficLogError> {
    let config = config.clone().normalized();
    let mut writers: Vec<SharedWriter> = Vec::with_capacity(2);

    if config.file_enabled {
        let file = RotatingFile::new(RotatingFileConfig::from(&config))?;
        writers.push(Arc::new(file));
    }

    if config.console_enabled {
        let writer = match console {
            Some(stream) => ConsoleWriter::boxed(stream),
            None => ConsoleWriter::from_stream(config.console_stream),
        };
        writers.push(Arc::new(writer));
    }

    if writers.len() == 1 {
        Ok(writers.remove(0))
    } else {
        Ok(Arc::new(FanoutWriter::new(writers)))
    }
}
