//! Method probe state machine
//!
//! ```text
//! Created --start()--> Started --end() / end_with_error()--> Ended
//! ```
//!
//! Any other transition fails with [`InvalidStateError`] and leaves the probe
//! exactly as it was. A probe publishes at most once.

use std::fmt;
use std::sync::Arc;

use crate::collector::Collector;
use crate::context;
use crate::domain::{
    InvalidStateError, Measurement, MethodId, MethodMeasurement, Payload, ProbeOperation,
    ProbeState, Value,
};
use crate::telemetry::{delta, Baseline};

enum Phase {
    Created,
    Started(Box<Baseline>),
    Ended,
}

impl Phase {
    fn state(&self) -> ProbeState {
        match self {
            Phase::Created => ProbeState::Created,
            Phase::Started(_) => ProbeState::Started,
            Phase::Ended => ProbeState::Ended,
        }
    }
}

/// Measures one method invocation.
pub struct MethodProbe {
    method: MethodId,
    payload: Payload,
    phase: Phase,
    collector: Arc<dyn Collector>,
}

impl MethodProbe {
    pub fn new(method: MethodId, collector: Arc<dyn Collector>) -> Self {
        Self { method, payload: Payload::new(), phase: Phase::Created, collector }
    }

    /// A probe already past `start()`
    pub(crate) fn begin(method: MethodId, collector: Arc<dyn Collector>) -> Self {
        Self {
            method,
            payload: Payload::new(),
            phase: Phase::Started(Box::new(Baseline::capture())),
            collector,
        }
    }

    pub fn method(&self) -> &MethodId {
        &self.method
    }

    pub fn state(&self) -> ProbeState {
        self.phase.state()
    }

    /// Attach a key/value to the measurement.
    ///
    /// # Errors
    /// Fails once the probe has ended.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<&mut Self, InvalidStateError> {
        if let Phase::Ended = self.phase {
            return Err(InvalidStateError::new(ProbeOperation::Set, ProbeState::Ended));
        }
        self.payload.insert(key.into(), value.into());
        Ok(self)
    }

    /// Take the "before" readings.
    ///
    /// # Errors
    /// Fails unless the probe is freshly created.
    pub fn start(&mut self) -> Result<(), InvalidStateError> {
        match self.phase {
            Phase::Created => {
                self.phase = Phase::Started(Box::new(Baseline::capture()));
                Ok(())
            }
            ref other => Err(InvalidStateError::new(ProbeOperation::Start, other.state())),
        }
    }

    /// Take the "after" readings and publish the measurement.
    ///
    /// # Errors
    /// Fails unless the probe is started.
    pub fn end(&mut self) -> Result<(), InvalidStateError> {
        self.finish(ProbeOperation::End, None)
    }

    /// Like [`end`](Self::end), recording that the call failed with `error`.
    ///
    /// # Errors
    /// Fails unless the probe is started.
    pub fn end_with_error(&mut self, error: &dyn fmt::Display) -> Result<(), InvalidStateError> {
        self.finish(ProbeOperation::EndWithError, Some(error.to_string()))
    }

    fn finish(
        &mut self,
        operation: ProbeOperation,
        error: Option<String>,
    ) -> Result<(), InvalidStateError> {
        let before = match std::mem::replace(&mut self.phase, Phase::Ended) {
            Phase::Started(before) => before,
            other => {
                let state = other.state();
                self.phase = other;
                return Err(InvalidStateError::new(operation, state));
            }
        };

        let after = Baseline::capture();
        let measurement = MethodMeasurement {
            method: self.method.clone(),
            start_time: before.wall,
            end_time: after.wall,
            wall_clock_ms: after.wall - before.wall,
            thread: delta(&before.thread, &after.thread),
            process_cpu_ms: delta(&before.process, &after.process),
            gc: delta(&before.gc, &after.gc),
            heap_before: before.heap,
            heap_after: after.heap,
            context_id: context::current_id(),
            completed: true,
            failed: error.is_some(),
            error,
            payload: std::mem::take(&mut self.payload),
        };
        self.collector.publish(Measurement::Method(measurement));
        Ok(())
    }
}

impl fmt::Debug for MethodProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodProbe")
            .field("method", &self.method)
            .field("state", &self.state())
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam_channel::Receiver;

    use super::*;
    use crate::collector::ChannelCollector;
    use crate::identity;

    fn probe() -> (MethodProbe, Receiver<Measurement>) {
        let (collector, rx) = ChannelCollector::unbounded();
        let method = MethodId::new(identity::application_id(), "com.x.Y", "z");
        (MethodProbe::new(method, Arc::new(collector)), rx)
    }

    fn only_method(rx: &Receiver<Measurement>) -> MethodMeasurement {
        let mut all: Vec<_> = rx.try_iter().collect();
        assert_eq!(all.len(), 1);
        match all.remove(0) {
            Measurement::Method(m) => m,
            other => panic!("expected a method measurement, got {other}"),
        }
    }

    #[test]
    fn test_end_without_start_fails() {
        let (mut p, rx) = probe();
        let err = p.end().unwrap_err();
        assert_eq!(err, InvalidStateError::new(ProbeOperation::End, ProbeState::Created));
        assert_eq!(p.state(), ProbeState::Created);

        let err = p.end_with_error(&"boom").unwrap_err();
        assert_eq!(err.state, ProbeState::Created);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_second_end_fails_in_any_combination() {
        let combos: [(bool, bool); 4] = [(false, false), (false, true), (true, false), (true, true)];
        for (first_err, second_err) in combos {
            let (mut p, rx) = probe();
            p.start().unwrap();
            let first = if first_err { p.end_with_error(&"boom") } else { p.end() };
            assert!(first.is_ok());

            let second = if second_err { p.end_with_error(&"boom") } else { p.end() };
            assert_eq!(second.unwrap_err().state, ProbeState::Ended);
            assert_eq!(rx.try_iter().count(), 1);
        }
    }

    #[test]
    fn test_start_twice_fails() {
        let (mut p, _rx) = probe();
        p.start().unwrap();
        let err = p.start().unwrap_err();
        assert_eq!(err, InvalidStateError::new(ProbeOperation::Start, ProbeState::Started));
        // Still started, so it can end normally
        assert!(p.end().is_ok());
        assert_eq!(p.start().unwrap_err().state, ProbeState::Ended);
    }

    #[test]
    fn test_wall_clock_covers_sleep() {
        let (mut p, rx) = probe();
        p.start().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        p.end().unwrap();

        let m = only_method(&rx);
        assert!(m.wall_clock_ms >= 100, "wall clock was {}ms", m.wall_clock_ms);
        assert_eq!(m.wall_clock_ms, m.end_time - m.start_time);
        assert!(m.completed);
        assert!(!m.ended_with_error());
        assert_eq!(m.method.full_name(), "com.x.Y.z");
    }

    #[test]
    fn test_error_and_payload_recorded() {
        let (mut p, rx) = probe();
        p.set("order", 17).unwrap();
        p.start().unwrap();
        p.set("items", 3).unwrap().set("express", true).unwrap();
        p.end_with_error(&"card declined").unwrap();

        let m = only_method(&rx);
        assert_eq!(m.error.as_deref(), Some("card declined"));
        assert_eq!(m.payload.len(), 3);
        assert_eq!(m.payload.get("order"), Some(&Value::Int(17)));

        assert_eq!(p.set("late", 1).unwrap_err().operation, ProbeOperation::Set);
    }

    #[test]
    fn test_measurement_tagged_with_current_context() {
        let (mut p, rx) = probe();
        let ctx = context::push("checkout", "http");
        p.start().unwrap();
        p.end().unwrap();
        context::pop();

        assert_eq!(only_method(&rx).context_id, Some(ctx.id()));

        let (mut p, rx) = probe();
        p.start().unwrap();
        p.end().unwrap();
        assert_eq!(only_method(&rx).context_id, None);
    }
}
