//! Garbage-collection sources
//!
//! The process has no runtime collector of its own. Components that do
//! collect (arenas, caches with eviction sweeps, embedded runtimes) register
//! a [`GcSource`]; the GC snapshot sums every registered source.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use crate::domain::Nanos;

/// A collector whose cumulative activity the engine can read
pub trait GcSource: Send + Sync {
    fn name(&self) -> &str;
    /// Collections run so far
    fn collection_count(&self) -> i64;
    /// Total time spent collecting
    fn collection_time(&self) -> Nanos;
}

/// Cumulative GC counters summed over all sources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcTotals {
    pub count: i64,
    pub time: Nanos,
}

fn registry() -> &'static RwLock<Vec<Arc<dyn GcSource>>> {
    static SOURCES: OnceLock<RwLock<Vec<Arc<dyn GcSource>>>> = OnceLock::new();
    SOURCES.get_or_init(|| RwLock::new(Vec::new()))
}

/// Add a source to every subsequent GC snapshot.
pub fn register_gc_source(source: Arc<dyn GcSource>) {
    log::debug!("Registered GC source '{}'", source.name());
    match registry().write() {
        Ok(mut sources) => sources.push(source),
        Err(poisoned) => poisoned.into_inner().push(source),
    }
}

/// Sum of collection count/time across all registered sources
pub fn snapshot_gc() -> GcTotals {
    let sources = match registry().read() {
        Ok(sources) => sources,
        Err(poisoned) => poisoned.into_inner(),
    };
    sources.iter().fold(GcTotals::default(), |acc, source| GcTotals {
        count: acc.count + source.collection_count(),
        time: Nanos(acc.time.0 + source.collection_time().0),
    })
}

/// Ready-made source for code that times its own collections.
#[derive(Debug, Default)]
pub struct CountingGcSource {
    name: String,
    count: AtomicI64,
    nanos: AtomicI64,
}

impl CountingGcSource {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), count: AtomicI64::new(0), nanos: AtomicI64::new(0) }
    }

    /// Record one finished collection.
    pub fn record(&self, took: std::time::Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.nanos.fetch_add(Nanos::from_duration(took).0, Ordering::Relaxed);
    }
}

impl GcSource for CountingGcSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection_count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }

    fn collection_time(&self) -> Nanos {
        Nanos(self.nanos.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_counting_source() {
        let source = CountingGcSource::new("arena");
        source.record(Duration::from_millis(3));
        source.record(Duration::from_millis(4));
        assert_eq!(source.collection_count(), 2);
        assert_eq!(source.collection_time(), Nanos(7_000_000));
    }

    #[test]
    fn test_registered_source_is_summed() {
        let source = Arc::new(CountingGcSource::new("test-sweeper"));
        let before = snapshot_gc();
        register_gc_source(source.clone());
        source.record(Duration::from_millis(2));

        let after = snapshot_gc();
        assert!(after.count > before.count);
        assert!(after.time.0 >= before.time.0 + 2_000_000);
    }
}
