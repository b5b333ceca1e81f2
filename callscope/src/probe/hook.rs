//! Entry points for instrumentation hooks
//!
//! Two styles:
//!
//! - Handle based: [`ProbeHandle::enter`] at the call boundary, then exactly
//!   one of [`ProbeHandle::exit`] / [`ProbeHandle::exit_with_error`]. Misuse
//!   is impossible because exiting consumes the handle.
//! - Callback based: hooks that only get "before" and "after" callbacks with
//!   no place to keep state use [`before_invoke`] / [`after_invoke`], which
//!   keep started probes on a per-thread stack.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use log::warn;

use crate::collector::Collector;
use crate::domain::{InvalidStateError, MethodId, ProbeOperation, ProbeState, Value};
use crate::probe::MethodProbe;

/// A started method probe owned by the hook
#[must_use = "a probe handle publishes nothing until exit() is called"]
#[derive(Debug)]
pub struct ProbeHandle {
    probe: MethodProbe,
}

impl ProbeHandle {
    /// Start measuring `method` on the calling thread.
    pub fn enter(method: MethodId, collector: Arc<dyn Collector>) -> Self {
        Self { probe: MethodProbe::begin(method, collector) }
    }

    pub fn method(&self) -> &MethodId {
        self.probe.method()
    }

    /// Attach a key/value to the measurement.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        // Never fails before exit
        let _ = self.probe.set(key, value);
        self
    }

    /// The guarded call returned normally.
    pub fn exit(mut self) {
        if let Err(e) = self.probe.end() {
            warn!("Probe for {} could not end: {e}", self.probe.method());
        }
    }

    /// The guarded call failed with `error`.
    pub fn exit_with_error(mut self, error: &dyn fmt::Display) {
        if let Err(e) = self.probe.end_with_error(error) {
            warn!("Probe for {} could not end: {e}", self.probe.method());
        }
    }
}

// ============================================================================
// Per-thread probe stack
// ============================================================================

thread_local! {
    static ACTIVE: RefCell<Vec<ProbeHandle>> = const { RefCell::new(Vec::new()) };
}

/// Start a probe and keep it on this thread's probe stack.
pub fn before_invoke(method: MethodId, collector: Arc<dyn Collector>) {
    let handle = ProbeHandle::enter(method, collector);
    ACTIVE.with(|active| active.borrow_mut().push(handle));
}

/// End the innermost probe started by [`before_invoke`] on this thread.
///
/// # Errors
/// Fails when no probe is active on this thread, i.e. an "after" callback
/// without a matching "before".
pub fn after_invoke(error: Option<&dyn fmt::Display>) -> Result<(), InvalidStateError> {
    let operation = if error.is_some() { ProbeOperation::EndWithError } else { ProbeOperation::End };
    let handle = ACTIVE
        .with(|active| active.borrow_mut().pop())
        .ok_or(InvalidStateError::new(operation, ProbeState::Created))?;

    match error {
        Some(error) => handle.exit_with_error(error),
        None => handle.exit(),
    }
    Ok(())
}

/// Whether the innermost hooked probe on this thread measures `Type.method`.
pub fn is_method_instrumented(type_name: &str, method_name: &str) -> bool {
    ACTIVE.with(|active| {
        active.borrow().last().is_some_and(|handle| {
            let method = handle.method();
            method.type_name == type_name && method.method_name == method_name
        })
    })
}

/// Probes started by [`before_invoke`] and not yet ended on this thread
pub fn active_probes() -> usize {
    ACTIVE.with(|active| active.borrow().len())
}
