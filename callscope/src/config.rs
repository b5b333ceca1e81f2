//! Agent configuration
//!
//! Values come from code, a deserialized document, or the environment:
//!
//! | Variable                          | Field                    |
//! |-----------------------------------|--------------------------|
//! | `CALLSCOPE_APPLICATION_NAME`      | `application_name`       |
//! | `CALLSCOPE_SAMPLING_INTERVAL_MS`  | `sampling_interval_ms`   |
//! | `CALLSCOPE_MIN_WALL_CLOCK_MS`     | `min_wall_clock_ms`      |
//! | `CALLSCOPE_RETRY_PROCESS_CPU`     | `retry_process_cpu_time` |

use std::str::FromStr;
use std::time::Duration;

use log::warn;
use serde::Deserialize;

use crate::identity::UNSET_APPLICATION_NAME;

pub const DEFAULT_SAMPLING_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_COLLECTOR_CAPACITY: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Name half of the application identity
    pub application_name: String,
    /// Time between platform snapshots
    pub sampling_interval_ms: u64,
    /// Re-arm process CPU sampling if an earlier failure latched it off
    pub retry_process_cpu_time: bool,
    /// Queue size of the channel collector
    pub collector_capacity: usize,
    /// Method measurements faster than this are not published (0 keeps all)
    pub min_wall_clock_ms: i64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            application_name: UNSET_APPLICATION_NAME.to_string(),
            sampling_interval_ms: DEFAULT_SAMPLING_INTERVAL_MS,
            retry_process_cpu_time: false,
            collector_capacity: DEFAULT_COLLECTOR_CAPACITY,
            min_wall_clock_ms: 0,
        }
    }
}

impl AgentConfig {
    /// Defaults overridden by `CALLSCOPE_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    ///
    /// Values that do not parse are ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(name) = lookup("CALLSCOPE_APPLICATION_NAME") {
            let name = name.trim();
            if !name.is_empty() {
                config.application_name = name.to_string();
            }
        }
        if let Some(ms) = parse_var(&lookup, "CALLSCOPE_SAMPLING_INTERVAL_MS") {
            config.sampling_interval_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "CALLSCOPE_MIN_WALL_CLOCK_MS") {
            config.min_wall_clock_ms = ms;
        }
        if let Some(retry) = parse_var(&lookup, "CALLSCOPE_RETRY_PROCESS_CPU") {
            config.retry_process_cpu_time = retry;
        }
        config
    }

    #[must_use]
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {key}={raw:?}: not a valid value");
            None
        }
    }
}
