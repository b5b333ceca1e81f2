//! Engine-internal newtypes
//!
//! Platform counters arrive in nanoseconds; published records carry
//! milliseconds. Keeping raw readings in [`Nanos`] makes the conversion point
//! explicit.

use std::fmt;
use std::ops::Sub;

/// Signed nanosecond counter reading
///
/// Signed so that differences of counters that went backwards stay visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Nanos(pub i64);

impl Nanos {
    pub const ZERO: Nanos = Nanos(0);

    /// Truncating conversion to milliseconds (toward zero)
    #[must_use]
    pub fn as_millis(self) -> i64 {
        self.0 / 1_000_000
    }

    #[must_use]
    pub fn from_millis_f64(ms: f64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Nanos((ms * 1_000_000.0) as i64)
    }

    #[must_use]
    pub fn from_secs_f64(secs: f64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Nanos((secs * 1_000_000_000.0) as i64)
    }

    #[must_use]
    pub fn from_duration(d: std::time::Duration) -> Self {
        Nanos(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }

    /// Build from a `timespec` returned by `clock_gettime`
    #[must_use]
    pub fn from_timespec(ts: &libc::timespec) -> Self {
        #[allow(clippy::useless_conversion)]
        Nanos(i64::from(ts.tv_sec) * 1_000_000_000 + i64::from(ts.tv_nsec))
    }

    /// Build from a `timeval` (as found in `rusage`)
    #[must_use]
    pub fn from_timeval(tv: &libc::timeval) -> Self {
        #[allow(clippy::useless_conversion)]
        Nanos(i64::from(tv.tv_sec) * 1_000_000_000 + i64::from(tv.tv_usec) * 1_000)
    }
}

impl Sub for Nanos {
    type Output = Nanos;

    fn sub(self, rhs: Nanos) -> Nanos {
        Nanos(self.0 - rhs.0)
    }
}

impl fmt::Display for Nanos {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0 as f64 / 1_000_000.0;
        if ms.abs() >= 1000.0 {
            write!(f, "{:.2}s", ms / 1000.0)
        } else {
            write!(f, "{ms:.2}ms")
        }
    }
}
