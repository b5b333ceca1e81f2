//! Finished measurement records.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::ids::{ApplicationId, ContextId, Timestamp};
use crate::value::Payload;

// ============================================================================
// Delta Shapes
// ============================================================================

/// Thread-level consumption over an interval (milliseconds for times)
///
/// `cpu_system_ms` is derived as total minus user after both are normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThreadUsage {
    pub cpu_total_ms: i64,
    pub cpu_user_ms: i64,
    pub cpu_system_ms: i64,
    /// Times the thread was involuntarily switched out (contention)
    pub block_count: i64,
    pub block_time_ms: i64,
    /// Times the thread gave up the CPU voluntarily (sleep, wait, I/O)
    pub wait_count: i64,
    pub wait_time_ms: i64,
    /// Threads started process-wide during the interval
    pub threads_started: i64,
}

/// Garbage-collection activity summed over every registered collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GcUsage {
    pub count: i64,
    pub time_ms: i64,
}

/// Heap sizing in bytes
///
/// - `allocated`: memory committed to the process
/// - `used`: the part of `allocated` holding live data
/// - `free`: `allocated - used`
/// - `unallocated`: headroom between `allocated` and the process limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeapUsage {
    pub allocated: i64,
    pub used: i64,
    pub free: i64,
    pub unallocated: i64,
}

// ============================================================================
// Method Measurements
// ============================================================================

/// The measured method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MethodId {
    pub application_id: ApplicationId,
    pub type_name: String,
    pub method_name: String,
}

impl MethodId {
    #[must_use]
    pub fn new(
        application_id: ApplicationId,
        type_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        Self { application_id, type_name: type_name.into(), method_name: method_name.into() }
    }

    /// `Type.method`, the form used when matching hooked probes
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.type_name, self.method_name)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.method_name)
    }
}

/// Telemetry for one finished method invocation.
///
/// Produced exactly once per probe, after a start and exactly one end.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MethodMeasurement {
    pub method: MethodId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// Always `end_time - start_time`
    pub wall_clock_ms: i64,
    /// CPU, contention and thread-start deltas of the calling thread
    pub thread: ThreadUsage,
    /// CPU consumed by the whole process during the call (0 when unavailable)
    pub process_cpu_ms: i64,
    pub gc: GcUsage,
    pub heap_before: HeapUsage,
    pub heap_after: HeapUsage,
    /// Innermost open context on the calling thread when the call ended
    pub context_id: Option<ContextId>,
    pub completed: bool,
    /// Set exactly when `error` is
    #[cfg_attr(feature = "serde", serde(default))]
    pub failed: bool,
    /// Description of the error the call ended with, if any
    pub error: Option<String>,
    pub payload: Payload,
}

impl MethodMeasurement {
    #[must_use]
    pub fn ended_with_error(&self) -> bool {
        self.failed
    }
}

// ============================================================================
// Platform Snapshots
// ============================================================================

/// Whole-process health sample.
///
/// Cumulative totals at sample time, plus deltas against the previous sample.
/// Ratios are plain floating point division and may be NaN or infinite when
/// no time elapsed; consumers must not assume they are finite.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlatformSnapshot {
    pub application_id: ApplicationId,
    pub created_at: Timestamp,

    // Cumulative
    pub total_gc_count: i64,
    pub total_gc_time_ms: i64,
    pub uptime_ms: i64,
    pub total_cpu_time_ms: i64,
    pub heap: HeapUsage,
    pub thread_count: i64,
    pub total_threads_started: i64,

    // Relative to the previous snapshot
    pub gc_count: i64,
    pub gc_time_ms: i64,
    pub cpu_time_ms: i64,
    pub threads_started: i64,
    /// Total CPU time over process uptime
    pub avg_cpu_usage: f64,
    /// CPU time delta over wall time elapsed since the previous snapshot
    pub cpu_usage: f64,
}

// ============================================================================
// Published Union
// ============================================================================

/// Everything the engine hands to a collector
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(tag = "kind", rename_all = "snake_case"))]
pub enum Measurement {
    Method(MethodMeasurement),
    Platform(PlatformSnapshot),
    /// A closed context, from an event probe or a context leaving its scope
    Context(Context),
}

impl Measurement {
    /// Short label for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Measurement::Method(_) => "method",
            Measurement::Platform(_) => "platform",
            Measurement::Context(_) => "context",
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measurement::Method(m) => {
                write!(f, "[method] {} {}ms cpu={}ms", m.method, m.wall_clock_ms, m.thread.cpu_total_ms)?;
                if let Some(err) = &m.error {
                    write!(f, " error={err}")?;
                }
                Ok(())
            }
            Measurement::Platform(p) => write!(
                f,
                "[platform] uptime={}ms cpu={}ms usage={:.3} heap_used={}B threads={}",
                p.uptime_ms, p.cpu_time_ms, p.cpu_usage, p.heap.used, p.thread_count
            ),
            Measurement::Context(c) => {
                let duration = c.end_time().map_or(0, |end| end - c.start_time());
                write!(f, "[context] {} ({}) {}ms entries={}", c.name(), c.tag(), duration, c.payload().len())
            }
        }
    }
}
