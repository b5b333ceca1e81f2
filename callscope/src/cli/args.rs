//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::config::{AgentConfig, DEFAULT_COLLECTOR_CAPACITY, DEFAULT_SAMPLING_INTERVAL_MS};

#[derive(Parser, Debug)]
#[command(
    name = "callscope",
    about = "Run an instrumented demo workload and collect its measurements",
    after_help = "\
EXAMPLES:
    callscope                                  4 threads for 3 seconds, print to stdout
    callscope --threads 8 --duration 10        Bigger workload
    callscope --export run.jsonl --interval-ms 500
                                               Export JSON lines, sample often"
)]
pub struct Args {
    /// Application name recorded in every measurement
    #[arg(long, default_value = "callscope-demo")]
    pub app_name: String,

    /// Platform sampling interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_SAMPLING_INTERVAL_MS)]
    pub interval_ms: u64,

    /// Run the workload for N seconds
    #[arg(long, default_value = "3")]
    pub duration: u64,

    /// Number of worker threads
    #[arg(long, default_value = "4", value_parser = clap::value_parser!(u16).range(1..))]
    pub threads: u16,

    /// Export measurements as JSON lines to FILE instead of stdout
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Skip method measurements faster than this many milliseconds
    #[arg(long, default_value = "0")]
    pub min_wall_clock_ms: i64,

    /// Re-arm process CPU sampling if it was latched off
    #[arg(long)]
    pub retry_process_cpu: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Agent configuration: environment first, flags on top.
    #[must_use]
    pub fn agent_config(&self) -> AgentConfig {
        let env = AgentConfig::from_env();
        AgentConfig {
            application_name: self.app_name.clone(),
            sampling_interval_ms: self.interval_ms,
            retry_process_cpu_time: self.retry_process_cpu || env.retry_process_cpu_time,
            collector_capacity: DEFAULT_COLLECTOR_CAPACITY,
            min_wall_clock_ms: self.min_wall_clock_ms.max(env.min_wall_clock_ms),
        }
    }
}
