//! # Shared Measurement Model (engine ↔ collectors)
//!
//! Defines the records produced by the callscope engine and consumed by
//! whatever collector ships them out of the process. Collectors depend on this
//! crate alone, so they never pull in the engine's platform readers.
//!
//! ## Key Types
//!
//! - [`Context`] - One node of the execution-context tree with a key/value payload
//! - [`MethodMeasurement`] - Telemetry for one finished method invocation
//! - [`PlatformSnapshot`] - Whole-process counters plus deltas to the previous sample
//! - [`Measurement`] - Everything the engine publishes, as one closed union
//! - [`Value`] - Payload values (exhaustive, serialization-ready)
//!
//! All time counters in published records are milliseconds. Deltas are signed
//! and never clamped: a negative delta means a counter went backwards and is
//! reported as-is.
//!
//! Serde derives are enabled with the `serde` feature.

pub mod context;
pub mod ids;
pub mod measurement;
pub mod value;

pub use context::{Context, ContextClosed};
pub use ids::{ApplicationId, ContextId, Timestamp};
pub use measurement::{
    GcUsage, HeapUsage, Measurement, MethodId, MethodMeasurement, PlatformSnapshot, ThreadUsage,
};
pub use value::{Payload, Value};
