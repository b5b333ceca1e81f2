//! `/proc` readers and parsers
//!
//! Parsing is kept separate from file access so the formats can be tested
//! without a live `/proc`.

use std::fs;

use crate::domain::{Nanos, TelemetryError};

/// Sleep/block totals of one thread from `/proc/thread-self/sched`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedTimes {
    /// Uninterruptible sleep (I/O, contended locks)
    pub block: Nanos,
    /// Interruptible sleep (timers, condvars, channel waits)
    pub sleep: Nanos,
}

/// Read the calling thread's scheduler statistics.
///
/// The fields only exist when the kernel exposes scheduler statistics; when
/// they are missing this returns `Unavailable`.
///
/// # Errors
/// Returns an error if the file cannot be read or carries no sleep statistics
pub fn read_thread_sched() -> Result<SchedTimes, TelemetryError> {
    let content = fs::read_to_string("/proc/thread-self/sched")?;
    parse_sched_times(&content).ok_or(TelemetryError::Unavailable("thread sleep statistics"))
}

/// Extract `sum_block_runtime` / `sum_sleep_runtime` (milliseconds with a
/// fractional part) from a `sched` file.
///
/// Older kernels prefix the keys with `se.statistics.`, newer ones with
/// `stats.`; only the suffix is matched.
pub fn parse_sched_times(content: &str) -> Option<SchedTimes> {
    let mut block = None;
    let mut sleep = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let Ok(ms) = value.trim().parse::<f64>() else {
            continue;
        };
        if key.ends_with("sum_block_runtime") {
            block = Some(Nanos::from_millis_f64(ms));
        } else if key.ends_with("sum_sleep_runtime") {
            sleep = Some(Nanos::from_millis_f64(ms));
        }
    }

    match (block, sleep) {
        (None, None) => None,
        (block, sleep) => {
            Some(SchedTimes { block: block.unwrap_or_default(), sleep: sleep.unwrap_or_default() })
        }
    }
}

/// # Errors
/// Returns an error if `/proc/self/status` cannot be read
pub fn read_self_status() -> Result<String, TelemetryError> {
    Ok(fs::read_to_string("/proc/self/status")?)
}

/// # Errors
/// Returns an error if `/proc/meminfo` cannot be read
pub fn read_meminfo() -> Result<String, TelemetryError> {
    Ok(fs::read_to_string("/proc/meminfo")?)
}

/// Find a `Key:   <n> kB` line and return its value in bytes.
///
/// Works for both `/proc/self/status` and `/proc/meminfo`.
pub fn kib_field(content: &str, key: &str) -> Option<i64> {
    content.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.strip_prefix(':')?;
        let kib: i64 = rest.split_whitespace().next()?.parse().ok()?;
        Some(kib * 1024)
    })
}

/// Find a plain numeric `Key: <n>` line.
pub fn count_field(content: &str, key: &str) -> Option<i64> {
    content.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.strip_prefix(':')?;
        rest.trim().parse().ok()
    })
}

/// Process start time in clock ticks since boot (field 22 of `/proc/<pid>/stat`).
///
/// The command name may contain spaces and parentheses, so fields are counted
/// from the last `)`.
pub fn parse_start_ticks(stat_line: &str) -> Option<u64> {
    let close = stat_line.rfind(')')?;
    // Field 3 (state) is the first token after the command name
    stat_line[close + 1..].split_whitespace().nth(19)?.parse().ok()
}

/// System uptime in seconds (first field of `/proc/uptime`).
pub fn parse_uptime_secs(content: &str) -> Option<f64> {
    content.split_whitespace().next()?.parse().ok()
}

/// How long this process has been running, from `/proc`.
///
/// # Errors
/// Returns an error if `/proc/uptime` or `/proc/self/stat` are unreadable or
/// malformed.
#[allow(unsafe_code)]
pub fn read_process_uptime() -> Result<Nanos, TelemetryError> {
    let uptime = fs::read_to_string("/proc/uptime")?;
    let uptime = parse_uptime_secs(&uptime).ok_or_else(|| TelemetryError::Parse {
        source_name: "/proc/uptime",
        detail: "missing uptime field".to_string(),
    })?;

    let stat = fs::read_to_string("/proc/self/stat")?;
    let start_ticks = parse_start_ticks(&stat).ok_or_else(|| TelemetryError::Parse {
        source_name: "/proc/self/stat",
        detail: "missing starttime field".to_string(),
    })?;

    // SAFETY: sysconf has no preconditions
    let ticks_per_sec = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks_per_sec <= 0 {
        return Err(TelemetryError::Unavailable("clock tick rate"));
    }

    #[allow(clippy::cast_precision_loss)]
    let started_secs = start_ticks as f64 / ticks_per_sec as f64;
    Ok(Nanos::from_secs_f64(uptime - started_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHED: &str = "\
worker (4242, #threads: 3)
-------------------------------------------------------------------
se.exec_start                                :      123456.789012
se.sum_exec_runtime                          :          15.250000
se.statistics.sum_sleep_runtime              :         250.500000
se.statistics.sum_block_runtime              :          12.000000
se.statistics.wait_sum                       :           1.000000
nr_switches                                  :                 42
";

    #[test]
    fn test_parse_sched_times() {
        let times = parse_sched_times(SCHED).unwrap();
        assert_eq!(times.sleep, Nanos(250_500_000));
        assert_eq!(times.block, Nanos(12_000_000));
    }

    #[test]
    fn test_parse_sched_without_statistics() {
        let content = "se.sum_exec_runtime : 15.25\nnr_switches : 42\n";
        assert_eq!(parse_sched_times(content), None);
    }

    #[test]
    fn test_kib_field() {
        let status = "Name:\tapp\nVmRSS:\t   20480 kB\nRssAnon:\t    8192 kB\nThreads:\t7\n";
        assert_eq!(kib_field(status, "VmRSS"), Some(20_480 * 1024));
        assert_eq!(kib_field(status, "RssAnon"), Some(8_192 * 1024));
        assert_eq!(kib_field(status, "VmSwap"), None);
        assert_eq!(count_field(status, "Threads"), Some(7));
    }

    #[test]
    fn test_kib_field_does_not_match_prefixes() {
        let status = "VmRSSX:\t1 kB\nVmRSS:\t2 kB\n";
        assert_eq!(kib_field(status, "VmRSS"), Some(2048));
    }

    #[test]
    fn test_parse_start_ticks() {
        let stat = "4242 (my app (v2)) S 1 4242 4242 0 -1 4194304 100 0 0 0 5 3 0 0 20 0 3 0 98765 1000 200";
        assert_eq!(parse_start_ticks(stat), Some(98_765));
    }

    #[test]
    fn test_parse_uptime() {
        assert_eq!(parse_uptime_secs("3600.25 7000.00\n"), Some(3600.25));
        assert_eq!(parse_uptime_secs(""), None);
    }

    #[test]
    fn test_live_process_uptime() {
        #[cfg(target_os = "linux")]
        {
            assert!(read_process_uptime().is_ok());
        }
    }
}
