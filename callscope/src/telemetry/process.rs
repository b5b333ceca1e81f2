//! Process-wide counters: CPU time, uptime, live thread count
//!
//! Process CPU time sits behind a one-way latch. The first failed read flips
//! it and logs once; from then on readers return zero without touching the
//! clock until [`reset_process_cpu_availability`] is called.

#![allow(unsafe_code)] // clock_gettime is an FFI call

use std::sync::OnceLock;
use std::time::Instant;

use log::debug;

use crate::domain::{Nanos, TelemetryError};

use super::latch::UnavailableLatch;
use super::procfs;

/// Process CPU counter reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessCounters {
    pub cpu_time: Nanos,
}

static PROCESS_CPU: UnavailableLatch = UnavailableLatch::new("Process CPU time");

/// Read process CPU time, degrading to zero when the platform refuses.
pub fn snapshot_process() -> ProcessCounters {
    ProcessCounters { cpu_time: PROCESS_CPU.read(process_cpu_time) }
}

/// Whether process CPU time is still being read
pub fn process_cpu_available() -> bool {
    !PROCESS_CPU.is_tripped()
}

/// Re-arm process CPU sampling after it was latched off.
pub fn reset_process_cpu_availability() {
    PROCESS_CPU.reset();
}

fn process_cpu_time() -> Result<Nanos, TelemetryError> {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_PROCESS_CPUTIME_ID, &mut ts) };
    if rc != 0 {
        return Err(TelemetryError::Unavailable("process CPU clock"));
    }
    Ok(Nanos::from_timespec(&ts))
}

// ============================================================================
// Uptime and threads
// ============================================================================

static ENGINE_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Pin the fallback uptime origin. Called when the agent starts.
pub fn mark_engine_start() {
    ENGINE_EPOCH.get_or_init(Instant::now);
}

/// Process uptime.
///
/// Uses the kernel's view of the process start; when `/proc` is unavailable
/// this is the time since the engine was first used instead.
pub fn uptime() -> Nanos {
    match procfs::read_process_uptime() {
        Ok(uptime) => uptime,
        Err(e) => {
            debug!("Falling back to engine uptime: {e}");
            Nanos::from_duration(ENGINE_EPOCH.get_or_init(Instant::now).elapsed())
        }
    }
}

/// Number of live threads in the process
///
/// # Errors
/// Returns an error if `/proc/self/status` is unreadable or has no thread count
pub fn thread_count() -> Result<i64, TelemetryError> {
    let status = procfs::read_self_status()?;
    procfs::count_field(&status, "Threads").ok_or_else(|| TelemetryError::Parse {
        source_name: "/proc/self/status",
        detail: "missing Threads field".to_string(),
    })
}
