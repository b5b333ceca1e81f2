//! Per-thread counters
//!
//! CPU time comes from the thread CPU clock, user time and context-switch
//! counts from `getrusage(RUSAGE_THREAD)`, sleep/block totals from the
//! scheduler statistics in `/proc`. Anything unreadable reads as zero.
//!
//! Kernels built without scheduler statistics never grow them at runtime, so
//! the first failed `sched` read switches that reader off for good.

#![allow(unsafe_code)] // clock_gettime/getrusage are FFI calls

use std::cell::Cell;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::domain::{Nanos, TelemetryError};

use super::latch::UnavailableLatch;
use super::procfs;

/// Absolute counters for the calling thread, plus the process-wide
/// thread-start total. Times are raw nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadCounters {
    pub cpu_total: Nanos,
    pub cpu_user: Nanos,
    /// Involuntary context switches
    pub block_count: i64,
    pub block_time: Nanos,
    /// Voluntary context switches
    pub wait_count: i64,
    pub wait_time: Nanos,
    pub started_threads: i64,
}

// ============================================================================
// Thread-start accounting
// ============================================================================

static THREADS_STARTED: AtomicI64 = AtomicI64::new(0);

thread_local! {
    static SEEN: Cell<bool> = const { Cell::new(false) };
}

/// Count the calling thread once, the first time it touches the engine.
///
/// The OS keeps no running total of threads ever started, so the engine
/// counts threads as they first show up in instrumented code.
pub fn note_current_thread() {
    // try_with: may be called while thread-locals are being torn down
    let _ = SEEN.try_with(|seen| {
        if !seen.replace(true) {
            THREADS_STARTED.fetch_add(1, Ordering::Relaxed);
        }
    });
}

/// Distinct threads that have touched the engine so far
pub fn started_thread_count() -> i64 {
    THREADS_STARTED.load(Ordering::Relaxed)
}

// ============================================================================
// Snapshot
// ============================================================================

static SCHED_STATS: UnavailableLatch = UnavailableLatch::new("Thread sleep statistics");

/// Read the calling thread's counters.
pub fn snapshot_thread() -> ThreadCounters {
    note_current_thread();

    let cpu_total = thread_cpu_time().unwrap_or_default();
    let usage = thread_rusage().unwrap_or_default();
    let sched = SCHED_STATS.read(procfs::read_thread_sched);

    ThreadCounters {
        cpu_total,
        cpu_user: usage.user,
        block_count: usage.involuntary_switches,
        block_time: sched.block,
        wait_count: usage.voluntary_switches,
        wait_time: sched.sleep,
        started_threads: started_thread_count(),
    }
}

/// CPU time consumed by the calling thread
///
/// # Errors
/// Returns `Unavailable` if the thread CPU clock cannot be read
pub fn thread_cpu_time() -> Result<Nanos, TelemetryError> {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &mut ts) };
    if rc != 0 {
        return Err(TelemetryError::Unavailable("thread CPU clock"));
    }
    Ok(Nanos::from_timespec(&ts))
}

#[derive(Debug, Clone, Copy, Default)]
struct ThreadRusage {
    user: Nanos,
    voluntary_switches: i64,
    involuntary_switches: i64,
}

#[cfg(target_os = "linux")]
fn thread_rusage() -> Result<ThreadRusage, TelemetryError> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: `usage` points to writable memory sized for an rusage struct
    let rc = unsafe { libc::getrusage(libc::RUSAGE_THREAD, usage.as_mut_ptr()) };
    if rc != 0 {
        return Err(TelemetryError::Io(std::io::Error::last_os_error()));
    }
    // SAFETY: zero-initialized and filled in by a successful getrusage
    let usage = unsafe { usage.assume_init() };

    #[allow(clippy::useless_conversion)]
    Ok(ThreadRusage {
        user: Nanos::from_timeval(&usage.ru_utime),
        voluntary_switches: i64::from(usage.ru_nvcsw),
        involuntary_switches: i64::from(usage.ru_nivcsw),
    })
}

#[cfg(not(target_os = "linux"))]
fn thread_rusage() -> Result<ThreadRusage, TelemetryError> {
    Err(TelemetryError::Unavailable("per-thread rusage"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn burn_cpu(ms: u64) {
        let start = std::time::Instant::now();
        let mut x = 0u64;
        while start.elapsed() < std::time::Duration::from_millis(ms) {
            x = std::hint::black_box(x.wrapping_add(1));
        }
    }

    #[test]
    fn test_thread_cpu_advances() {
        let before = snapshot_thread();
        burn_cpu(20);
        let after = snapshot_thread();
        assert!(after.cpu_total > before.cpu_total);
    }

    #[test]
    fn test_new_thread_is_counted_once() {
        let before = started_thread_count();
        std::thread::spawn(|| {
            note_current_thread();
            note_current_thread();
        })
        .join()
        .unwrap();
        // Other tests may count their own threads concurrently
        assert!(started_thread_count() > before);
    }

    #[test]
    fn test_sched_stats_not_reread_once_unavailable() {
        SCHED_STATS.trip(&TelemetryError::Unavailable("thread sleep statistics"));
        assert!(SCHED_STATS.is_tripped());

        let before = snapshot_thread();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let after = snapshot_thread();
        assert_eq!(before.wait_time, Nanos::ZERO);
        assert_eq!(after.wait_time, Nanos::ZERO);
        assert_eq!(after.block_time, Nanos::ZERO);
        // The CPU clock is unaffected
        assert!(after.cpu_total >= before.cpu_total);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_sleep_counts_as_voluntary_switch() {
        let before = snapshot_thread();
        std::thread::sleep(std::time::Duration::from_millis(5));
        std::thread::sleep(std::time::Duration::from_millis(5));
        let after = snapshot_thread();
        assert!(after.wait_count >= before.wait_count + 2);
    }
}
