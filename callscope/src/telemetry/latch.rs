//! One-way "stop reading" switch for counters the platform refuses to give

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use crate::domain::TelemetryError;

/// Trips on the first failed read; afterwards reads are skipped and report
/// the default value until [`reset`](Self::reset).
#[derive(Debug)]
pub(crate) struct UnavailableLatch {
    counter: &'static str,
    tripped: AtomicBool,
}

impl UnavailableLatch {
    pub(crate) const fn new(counter: &'static str) -> Self {
        Self { counter, tripped: AtomicBool::new(false) }
    }

    pub(crate) fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Relaxed)
    }

    /// Run `read` unless the latch has tripped. A failure trips it.
    pub(crate) fn read<T: Default>(&self, read: impl FnOnce() -> Result<T, TelemetryError>) -> T {
        if self.is_tripped() {
            return T::default();
        }
        match read() {
            Ok(value) => value,
            Err(e) => {
                self.trip(&e);
                T::default()
            }
        }
    }

    pub(crate) fn trip(&self, reason: &TelemetryError) {
        // Only the thread that flips the latch logs
        if !self.tripped.swap(true, Ordering::Relaxed) {
            warn!("{} no longer sampled: {reason}", self.counter);
        }
    }

    /// Re-arm. Returns whether the latch had tripped.
    pub(crate) fn reset(&self) -> bool {
        let was_tripped = self.tripped.swap(false, Ordering::Relaxed);
        if was_tripped {
            debug!("{} sampling re-enabled", self.counter);
        }
        was_tripped
    }
}
