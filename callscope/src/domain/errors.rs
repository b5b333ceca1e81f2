//! Structured error types for callscope
//!
//! Display text and source chains come from thiserror derives.
//! Only [`InvalidStateError`] ever reaches instrumented code; telemetry and
//! sampling errors are recovered inside the engine.

use std::fmt;

use thiserror::Error;

/// Lifecycle state of a method probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Created,
    Started,
    Ended,
}

impl fmt::Display for ProbeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbeState::Created => "created",
            ProbeState::Started => "started",
            ProbeState::Ended => "ended",
        };
        f.write_str(s)
    }
}

/// Operation attempted on a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOperation {
    Start,
    End,
    EndWithError,
    Set,
}

impl fmt::Display for ProbeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbeOperation::Start => "start",
            ProbeOperation::End => "end",
            ProbeOperation::EndWithError => "end with error",
            ProbeOperation::Set => "set a value on",
        };
        f.write_str(s)
    }
}

/// Probe lifecycle misuse (start twice, end without start, end twice).
///
/// Indicates a bug in the instrumentation, never a transient condition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {operation} a method probe that is {state}")]
pub struct InvalidStateError {
    pub operation: ProbeOperation,
    pub state: ProbeState,
}

impl InvalidStateError {
    #[must_use]
    pub fn new(operation: ProbeOperation, state: ProbeState) -> Self {
        Self { operation, state }
    }
}

/// A platform counter could not be read
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("{0} is not available on this platform")]
    Unavailable(&'static str),

    #[error("Failed to parse {source_name}: {detail}")]
    Parse { source_name: &'static str, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One platform-sampler iteration failed; the tick is skipped
#[derive(Error, Debug)]
#[error("platform sampling tick failed while reading {stage}: {source}")]
pub struct SamplingTickError {
    pub stage: &'static str,
    #[source]
    pub source: TelemetryError,
}

impl SamplingTickError {
    #[must_use]
    pub fn new(stage: &'static str, source: TelemetryError) -> Self {
        Self { stage, source }
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Platform sampler is already running")]
    AlreadyRunning,

    #[error("Failed to spawn {thread} thread: {source}")]
    Spawn {
        thread: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
