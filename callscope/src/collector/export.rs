//! JSON Lines export
//!
//! One measurement per line, tagged with its `kind`:
//!
//! ```text
//! {"kind":"method","method":{"type_name":"Checkout","method_name":"pay",...},"wall_clock_ms":112,...}
//! {"kind":"context","id":"5f0c...","name":"login","payload":{"user":"alice"},...}
//! {"kind":"platform","uptime_ms":5012,"cpu_usage":0.41,...}
//! ```
//!
//! Publishing serializes and writes on the calling thread, so this sink
//! belongs on the consumer side of a [`ChannelCollector`](super::ChannelCollector):
//!
//! ```ignore
//! let (channel, rx) = ChannelCollector::bounded(1000);
//! let agent = Agent::new(config, Arc::new(channel));
//! let export = JsonLinesCollector::create(path)?;
//! std::thread::spawn(move || rx.iter().for_each(|m| export.publish(m)));
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use log::warn;

use crate::collector::Collector;
use crate::domain::{AgentError, Measurement};

/// Serializes measurements into a shared writer.
///
/// Blocks on the writer; feed it from a queue consumer, not from an agent.
pub struct JsonLinesCollector<W: Write + Send> {
    writer: Mutex<W>,
    errors: AtomicU64,
}

impl JsonLinesCollector<BufWriter<File>> {
    /// Create (or truncate) `path` and export into it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created
    pub fn create(path: &Path) -> Result<Self, AgentError> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> JsonLinesCollector<W> {
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer), errors: AtomicU64::new(0) }
    }

    /// Measurements that failed to serialize or write
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// # Errors
    /// Returns an error if the underlying writer fails to flush
    pub fn flush(&self) -> Result<(), AgentError> {
        let mut writer = self.writer.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        writer.flush()?;
        Ok(())
    }

    /// Flush and hand back the writer.
    ///
    /// # Errors
    /// Returns an error if the final flush fails
    pub fn into_inner(self) -> Result<W, AgentError> {
        let mut writer = self.writer.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner);
        writer.flush()?;
        Ok(writer)
    }

    fn write_line(writer: &mut W, measurement: &Measurement) -> Result<(), AgentError> {
        serde_json::to_writer(&mut *writer, measurement)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write + Send> Collector for JsonLinesCollector<W> {
    fn publish(&self, measurement: Measurement) {
        let mut writer = self.writer.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Err(e) = Self::write_line(&mut writer, &measurement) {
            // Log the first failure only; the count keeps the rest
            if self.errors.fetch_add(1, Ordering::Relaxed) == 0 {
                warn!("Failed to export {} measurement: {e}", measurement.kind());
            }
        }
    }
}
