//! Heap sizing from the process's resident memory
//!
//! - allocated: resident set (`VmRSS`)
//! - used: anonymous resident pages (`RssAnon`), i.e. heap and stacks
//! - free: allocated minus used (file-backed and shared pages)
//! - unallocated: address-space limit minus allocated, where the limit is
//!   `RLIMIT_AS` when set and physical memory (`MemTotal`) otherwise
//!
//! `MemTotal` is read once per process.

#![allow(unsafe_code)] // getrlimit is an FFI call

use std::sync::OnceLock;

use crate::domain::{HeapUsage, TelemetryError};

use super::procfs;

/// Current heap sizing, zeros when unreadable.
pub fn snapshot_heap() -> HeapUsage {
    try_snapshot_heap().unwrap_or_default()
}

/// Current heap sizing.
///
/// # Errors
/// Returns an error if the memory counters cannot be read
pub fn try_snapshot_heap() -> Result<HeapUsage, TelemetryError> {
    let status = procfs::read_self_status()?;
    let limit = match address_space_limit() {
        Some(limit) => limit,
        None => physical_memory()?,
    };
    heap_from_status(&status, limit)
}

/// Combine `/proc/self/status` memory lines with a process memory limit.
///
/// # Errors
/// Returns `Parse` if `VmRSS` is missing. `RssAnon` only exists on newer
/// kernels and falls back to `VmRSS`.
pub fn heap_from_status(status: &str, limit: i64) -> Result<HeapUsage, TelemetryError> {
    let allocated =
        procfs::kib_field(status, "VmRSS").ok_or_else(|| missing("/proc/self/status", "VmRSS"))?;
    let used = procfs::kib_field(status, "RssAnon").unwrap_or(allocated);

    Ok(HeapUsage { allocated, used, free: allocated - used, unallocated: limit - allocated })
}

fn missing(source_name: &'static str, field: &str) -> TelemetryError {
    TelemetryError::Parse { source_name, detail: format!("missing {field} field") }
}

static PHYSICAL_MEMORY: OnceLock<i64> = OnceLock::new();

/// `MemTotal` in bytes. A failed read is not cached.
fn physical_memory() -> Result<i64, TelemetryError> {
    if let Some(&total) = PHYSICAL_MEMORY.get() {
        return Ok(total);
    }
    let meminfo = procfs::read_meminfo()?;
    let total =
        procfs::kib_field(&meminfo, "MemTotal").ok_or_else(|| missing("/proc/meminfo", "MemTotal"))?;
    Ok(*PHYSICAL_MEMORY.get_or_init(|| total))
}

/// `RLIMIT_AS` soft limit in bytes, `None` when unlimited or unreadable
fn address_space_limit() -> Option<i64> {
    let mut limit = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    // SAFETY: `limit` is a valid, writable rlimit for the duration of the call
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_AS, &mut limit) };
    if rc != 0 || limit.rlim_cur == libc::RLIM_INFINITY {
        return None;
    }
    i64::try_from(limit.rlim_cur).ok()
}
