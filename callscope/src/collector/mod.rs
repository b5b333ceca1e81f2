//! # Collectors
//!
//! Sinks for finished measurements. The engine calls [`Collector::publish`]
//! and moves on: publishing never blocks the instrumented thread and never
//! reports delivery failures back. What happens to a measurement after that
//! (batching, shipping, dropping) is the collector's business.
//!
//! ## Provided sinks
//!
//! - [`ChannelCollector`] - Non-blocking hand-off to a consumer thread
//! - [`LogCollector`] - One log line per measurement
//! - [`JsonLinesCollector`] - One JSON document per line into any writer (consumer side)
//! - [`ThresholdCollector`] - Drops method measurements below a wall-clock floor

mod export;

pub use export::JsonLinesCollector;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use log::{debug, info};

use crate::domain::Measurement;

/// Ingestion sink for finished measurements
pub trait Collector: Send + Sync {
    /// Accept one measurement. Must not block on the transport.
    fn publish(&self, measurement: Measurement);
}

impl<C: Collector + ?Sized> Collector for Arc<C> {
    fn publish(&self, measurement: Measurement) {
        (**self).publish(measurement);
    }
}

impl<C: Collector + ?Sized> Collector for Box<C> {
    fn publish(&self, measurement: Measurement) {
        (**self).publish(measurement);
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Hands measurements to a receiver without blocking.
///
/// When the bounded queue is full (or the receiver is gone) the measurement
/// is dropped and counted.
pub struct ChannelCollector {
    tx: Sender<Measurement>,
    dropped: AtomicU64,
}

impl ChannelCollector {
    /// Queue holding at most `capacity` measurements
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<Measurement>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx, dropped: AtomicU64::new(0) }, rx)
    }

    #[must_use]
    pub fn unbounded() -> (Self, Receiver<Measurement>) {
        let (tx, rx) = unbounded();
        (Self { tx, dropped: AtomicU64::new(0) }, rx)
    }

    /// Measurements dropped so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Collector for ChannelCollector {
    fn publish(&self, measurement: Measurement) {
        match self.tx.try_send(measurement) {
            Ok(()) => {}
            Err(TrySendError::Full(m)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("Collector queue full, dropped {} measurement ({total} total)", m.kind());
            }
            Err(TrySendError::Disconnected(m)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("Collector receiver gone, dropped {} measurement ({total} total)", m.kind());
            }
        }
    }
}

// ============================================================================
// Log
// ============================================================================

/// Writes every measurement as an `info` log line
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCollector;

impl Collector for LogCollector {
    fn publish(&self, measurement: Measurement) {
        info!("{measurement}");
    }
}

// ============================================================================
// Threshold
// ============================================================================

/// Forwards everything except method measurements faster than a floor.
pub struct ThresholdCollector<C> {
    inner: C,
    min_wall_clock_ms: i64,
}

impl<C: Collector> ThresholdCollector<C> {
    pub fn new(inner: C, min_wall_clock_ms: i64) -> Self {
        Self { inner, min_wall_clock_ms }
    }
}

impl<C: Collector> Collector for ThresholdCollector<C> {
    fn publish(&self, measurement: Measurement) {
        if let Measurement::Method(m) = &measurement {
            if m.wall_clock_ms < self.min_wall_clock_ms {
                return;
            }
        }
        self.inner.publish(measurement);
    }
}
