//! Domain model for callscope
//!
//! Engine-side newtypes and the structured error taxonomy. Record types that
//! collectors see live in `callscope-common` and are re-exported here.

pub mod errors;
pub mod types;

pub use types::Nanos;

pub use errors::{
    AgentError, InvalidStateError, ProbeOperation, ProbeState, SamplingTickError, TelemetryError,
};

pub use callscope_common::{
    ApplicationId, Context, ContextClosed, ContextId, GcUsage, HeapUsage, Measurement, MethodId,
    MethodMeasurement, Payload, PlatformSnapshot, ThreadUsage, Timestamp, Value,
};
