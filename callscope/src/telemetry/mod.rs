//! # Telemetry Sampler
//!
//! Stateless readers for platform counters and the before/after deltas
//! computed from them.
//!
//! ## Readers
//!
//! - [`snapshot_thread`] - CPU, context switches and sleep totals of the calling thread
//! - [`snapshot_process`] - Process CPU time (latched off after the first failure)
//! - [`snapshot_gc`] - Sum over registered [`GcSource`]s
//! - [`snapshot_heap`] - Resident memory split into used/free/unallocated
//!
//! Snapshots hold absolute readings in raw units. [`delta`] turns a pair of
//! snapshots into milliseconds and counts, as `after - before`, without
//! clamping. Readers never fail: an unreadable counter reads as zero.

mod gc;
mod heap;
mod latch;
mod process;
pub mod procfs;
mod thread;

pub use gc::{register_gc_source, snapshot_gc, CountingGcSource, GcSource, GcTotals};
pub use heap::{heap_from_status, snapshot_heap, try_snapshot_heap};
pub use process::{
    mark_engine_start, process_cpu_available, reset_process_cpu_availability, snapshot_process,
    thread_count, uptime, ProcessCounters,
};
pub use thread::{
    note_current_thread, snapshot_thread, started_thread_count, thread_cpu_time, ThreadCounters,
};

use crate::domain::{GcUsage, HeapUsage, ThreadUsage, Timestamp};

/// A snapshot shape whose difference is a consumption record
pub trait Delta {
    type Output;

    /// `after - before`, times in milliseconds
    fn delta(before: &Self, after: &Self) -> Self::Output;
}

/// Difference between two snapshots of the same shape.
pub fn delta<T: Delta>(before: &T, after: &T) -> T::Output {
    T::delta(before, after)
}

impl Delta for ThreadCounters {
    type Output = ThreadUsage;

    fn delta(before: &Self, after: &Self) -> ThreadUsage {
        let cpu_total_ms = (after.cpu_total - before.cpu_total).as_millis();
        let cpu_user_ms = (after.cpu_user - before.cpu_user).as_millis();
        ThreadUsage {
            cpu_total_ms,
            cpu_user_ms,
            cpu_system_ms: cpu_total_ms - cpu_user_ms,
            block_count: after.block_count - before.block_count,
            block_time_ms: (after.block_time - before.block_time).as_millis(),
            wait_count: after.wait_count - before.wait_count,
            wait_time_ms: (after.wait_time - before.wait_time).as_millis(),
            threads_started: after.started_threads - before.started_threads,
        }
    }
}

impl Delta for ProcessCounters {
    /// Process CPU milliseconds
    type Output = i64;

    fn delta(before: &Self, after: &Self) -> i64 {
        (after.cpu_time - before.cpu_time).as_millis()
    }
}

impl Delta for GcTotals {
    type Output = GcUsage;

    fn delta(before: &Self, after: &Self) -> GcUsage {
        GcUsage { count: after.count - before.count, time_ms: (after.time - before.time).as_millis() }
    }
}

impl Delta for HeapUsage {
    type Output = HeapUsage;

    fn delta(before: &Self, after: &Self) -> HeapUsage {
        HeapUsage {
            allocated: after.allocated - before.allocated,
            used: after.used - before.used,
            free: after.free - before.free,
            unallocated: after.unallocated - before.unallocated,
        }
    }
}

/// Everything a method probe reads at start and end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub wall: Timestamp,
    pub thread: ThreadCounters,
    pub process: ProcessCounters,
    pub gc: GcTotals,
    pub heap: HeapUsage,
}

impl Baseline {
    /// Read all counters for the calling thread.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            wall: Timestamp::now(),
            thread: snapshot_thread(),
            process: snapshot_process(),
            gc: snapshot_gc(),
            heap: snapshot_heap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Nanos;

    fn counters(scale: i64) -> ThreadCounters {
        ThreadCounters {
            cpu_total: Nanos(30_000_000 * scale),
            cpu_user: Nanos(20_000_000 * scale),
            block_count: 2 * scale,
            block_time: Nanos(4_000_000 * scale),
            wait_count: 3 * scale,
            wait_time: Nanos(9_000_000 * scale),
            started_threads: scale,
        }
    }

    #[test]
    fn test_delta_of_identical_snapshots_is_zero() {
        let b = Baseline::capture();
        assert_eq!(delta(&b.thread, &b.thread), ThreadUsage::default());
        assert_eq!(delta(&b.process, &b.process), 0);
        assert_eq!(delta(&b.gc, &b.gc), GcUsage::default());
        assert_eq!(delta(&b.heap, &b.heap), HeapUsage::default());
    }

    #[test]
    fn test_thread_delta_in_millis() {
        let usage = delta(&counters(1), &counters(2));
        assert_eq!(usage.cpu_total_ms, 30);
        assert_eq!(usage.cpu_user_ms, 20);
        assert_eq!(usage.cpu_system_ms, 10);
        assert_eq!(usage.block_count, 2);
        assert_eq!(usage.block_time_ms, 4);
        assert_eq!(usage.wait_count, 3);
        assert_eq!(usage.wait_time_ms, 9);
        assert_eq!(usage.threads_started, 1);
    }

    #[test]
    fn test_negative_delta_passes_through() {
        let before = GcTotals { count: 10, time: Nanos(50_000_000) };
        let after = GcTotals { count: 4, time: Nanos(20_000_000) };
        assert_eq!(delta(&before, &after), GcUsage { count: -6, time_ms: -30 });

        let usage = delta(&counters(2), &counters(1));
        assert_eq!(usage.cpu_total_ms, -30);
        assert_eq!(usage.threads_started, -1);
    }
}
