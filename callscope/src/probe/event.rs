//! One-shot named events
//!
//! An event is published as a context that is opened and closed in the same
//! step, parented to whatever context is current on the firing thread.

use std::sync::Arc;

use crate::collector::Collector;
use crate::context;
use crate::domain::{Context, ContextClosed, ContextId, Measurement, Payload, Value};
use crate::identity;

#[must_use = "an event is only published by fire()"]
pub struct EventProbe {
    name: String,
    payload: Payload,
    collector: Arc<dyn Collector>,
}

impl EventProbe {
    pub fn new(name: impl Into<String>, collector: Arc<dyn Collector>) -> Self {
        Self { name: name.into(), payload: Payload::new(), collector }
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Publish the event as a closed context named (and tagged) after it.
    ///
    /// # Errors
    /// Nothing is published if the payload cannot be written.
    pub fn fire(self) -> Result<ContextId, ContextClosed> {
        let EventProbe { name, payload, collector } = self;

        let mut ctx =
            Context::open(name.clone(), name, context::current_id(), identity::application_id());
        ctx.extend(payload)?;
        ctx.close();

        let id = ctx.id();
        collector.publish(Measurement::Context(ctx));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ChannelCollector;

    #[test]
    fn test_login_event() {
        let (collector, rx) = ChannelCollector::unbounded();
        let id = EventProbe::new("login", Arc::new(collector)).set("user", "alice").fire().unwrap();

        let all: Vec<_> = rx.try_iter().collect();
        assert_eq!(all.len(), 1);
        let Measurement::Context(ctx) = &all[0] else { panic!("expected a context") };
        assert_eq!(ctx.id(), id);
        assert_eq!(ctx.name(), "login");
        assert_eq!(ctx.tag(), "login");
        assert!(ctx.is_closed());
        assert!(ctx.end_time().unwrap() >= ctx.start_time());
        assert_eq!(ctx.payload().len(), 1);
        assert_eq!(ctx.get("user"), Some(&Value::from("alice")));
    }

    #[test]
    fn test_event_parented_to_current_context() {
        let (collector, rx) = ChannelCollector::unbounded();
        let request = context::push("request", "http");
        EventProbe::new("cache-miss", Arc::new(collector)).fire().unwrap();

        // The event never lands on the stack
        assert_eq!(context::current_id(), Some(request.id()));
        context::pop();

        let Ok(Measurement::Context(ctx)) = rx.try_recv() else { panic!("expected a context") };
        assert_eq!(ctx.parent_id(), Some(request.id()));
    }
}
