//! Probes: one bounded unit of work in, one measurement out.
//!
//! - [`MethodProbe`] - Explicit start/end state machine around a call
//! - [`ProbeHandle`] - Already-started probe whose exit cannot be misused
//! - [`EventProbe`] - Named event published as a closed context

mod event;
mod hook;
mod method;

pub use event::EventProbe;
pub use hook::{active_probes, after_invoke, before_invoke, is_method_instrumented, ProbeHandle};
pub use method::MethodProbe;
