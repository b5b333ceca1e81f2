//! Process-level entry point
//!
//! [`Agent`] ties the pieces together: it fixes the application identity,
//! hands out probes wired to the collector, opens and closes contexts on the
//! calling thread, and owns the platform sampler thread.
//!
//! The agent is cheap to clone; clones share the collector and the sampler.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::collector::{Collector, ThresholdCollector};
use crate::config::AgentConfig;
use crate::context;
use crate::domain::{
    AgentError, ApplicationId, Context, ContextId, InvalidStateError, Measurement, MethodId,
};
use crate::identity;
use crate::platform::{PlatformSampler, SamplerHandle};
use crate::probe::{self, EventProbe, MethodProbe, ProbeHandle};
use crate::telemetry;

#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    config: AgentConfig,
    application_id: ApplicationId,
    collector: Arc<dyn Collector>,
    sampler: Mutex<Option<SamplerHandle>>,
}

impl Agent {
    /// Create the agent and fix the process's application identity.
    pub fn new(config: AgentConfig, collector: Arc<dyn Collector>) -> Self {
        let application_id = identity::init(&config.application_name);
        telemetry::mark_engine_start();
        telemetry::note_current_thread();

        if config.retry_process_cpu_time {
            telemetry::reset_process_cpu_availability();
        }

        let collector: Arc<dyn Collector> = if config.min_wall_clock_ms > 0 {
            Arc::new(ThresholdCollector::new(collector, config.min_wall_clock_ms))
        } else {
            collector
        };

        info!("Agent started for {application_id}");
        Self {
            inner: Arc::new(AgentInner {
                config,
                application_id,
                collector,
                sampler: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.inner.config
    }

    pub fn application_id(&self) -> &ApplicationId {
        &self.inner.application_id
    }

    /// Collector every probe of this agent publishes to
    pub fn collector(&self) -> Arc<dyn Collector> {
        Arc::clone(&self.inner.collector)
    }

    pub fn method_id(&self, type_name: &str, method_name: &str) -> MethodId {
        MethodId::new(self.inner.application_id.clone(), type_name, method_name)
    }

    // ========================================================================
    // Probes
    // ========================================================================

    /// A fresh probe; drive it with `start()` / `end()`.
    pub fn method_probe(&self, type_name: &str, method_name: &str) -> MethodProbe {
        MethodProbe::new(self.method_id(type_name, method_name), self.collector())
    }

    pub fn event_probe(&self, name: impl Into<String>) -> EventProbe {
        EventProbe::new(name, self.collector())
    }

    /// Hook entry: start measuring a call.
    pub fn on_enter(&self, type_name: &str, method_name: &str) -> ProbeHandle {
        ProbeHandle::enter(self.method_id(type_name, method_name), self.collector())
    }

    /// Hook exit after a normal return.
    pub fn on_exit(&self, handle: ProbeHandle) {
        handle.exit();
    }

    /// Hook exit after the call failed.
    pub fn on_exit_with_error(&self, handle: ProbeHandle, error: &dyn fmt::Display) {
        handle.exit_with_error(error);
    }

    /// Callback-style hook entry; pairs with [`after_invoke`](Self::after_invoke).
    pub fn before_invoke(&self, type_name: &str, method_name: &str) {
        probe::before_invoke(self.method_id(type_name, method_name), self.collector());
    }

    /// # Errors
    /// Fails when no [`before_invoke`](Self::before_invoke) is pending on
    /// this thread.
    pub fn after_invoke(&self, error: Option<&dyn fmt::Display>) -> Result<(), InvalidStateError> {
        probe::after_invoke(error)
    }

    pub fn is_method_instrumented(&self, type_name: &str, method_name: &str) -> bool {
        probe::is_method_instrumented(type_name, method_name)
    }

    /// Measure `f` as `type_name.method_name`, recording its error if it fails.
    ///
    /// # Errors
    /// Returns whatever `f` returns.
    pub fn measure<T, E, F>(&self, type_name: &str, method_name: &str, f: F) -> Result<T, E>
    where
        E: fmt::Display,
        F: FnOnce() -> Result<T, E>,
    {
        let handle = self.on_enter(type_name, method_name);
        let result = f();
        match &result {
            Ok(_) => handle.exit(),
            Err(e) => handle.exit_with_error(e),
        }
        result
    }

    // ========================================================================
    // Contexts
    // ========================================================================

    /// Open a context on the calling thread.
    pub fn create_context(&self, name: &str, tag: &str) -> Context {
        context::push(name, tag)
    }

    /// Close the calling thread's current context and publish it.
    pub fn destroy_current_context(&self) -> Option<ContextId> {
        let closed = context::pop()?;
        let id = closed.id();
        self.inner.collector.publish(Measurement::Context(closed));
        Some(id)
    }

    pub fn current_context(&self) -> Option<Context> {
        context::current()
    }

    /// Open a context that is closed and published when the guard drops.
    pub fn scope(&self, name: &str, tag: &str) -> ContextScope {
        let id = self.create_context(name, tag).id();
        ContextScope { id, collector: self.collector(), _not_send: PhantomData }
    }

    // ========================================================================
    // Platform sampler
    // ========================================================================

    fn sampler(&self) -> MutexGuard<'_, Option<SamplerHandle>> {
        self.inner.sampler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start publishing platform snapshots every configured interval.
    ///
    /// # Errors
    /// Fails if the sampler is already running or its thread cannot start.
    pub fn start_platform_sampler(&self) -> Result<(), AgentError> {
        let mut slot = self.sampler();
        if slot.is_some() {
            return Err(AgentError::AlreadyRunning);
        }
        let sampler = PlatformSampler::new(
            self.inner.application_id.clone(),
            self.inner.config.sampling_interval(),
            self.collector(),
        );
        *slot = Some(sampler.spawn()?);
        Ok(())
    }

    /// Stop the sampler. Returns false if it was not running.
    pub fn stop_platform_sampler(&self) -> bool {
        // Take it out first so the join happens without the lock held
        let handle = self.sampler().take();
        match handle {
            Some(handle) => {
                handle.stop();
                true
            }
            None => false,
        }
    }

    pub fn shutdown(&self) {
        self.stop_platform_sampler();
        info!("Agent for {} shut down", self.inner.application_id);
    }
}

/// Closes its context when dropped.
///
/// Contexts close strictly innermost first. If something else is on top of
/// the stack when the guard drops, nothing is popped.
#[must_use = "dropping the scope immediately closes the context"]
pub struct ContextScope {
    id: ContextId,
    collector: Arc<dyn Collector>,
    _not_send: PhantomData<*const ()>,
}

impl ContextScope {
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Write into this scope's context if it is still the current one.
    pub fn set(&self, key: &str, value: impl Into<crate::domain::Value>) -> bool {
        context::current_id() == Some(self.id) && context::put(key, value)
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        if context::current_id() == Some(self.id) {
            if let Some(closed) = context::pop() {
                self.collector.publish(Measurement::Context(closed));
            }
        } else if context::depth() == 0 {
            // Nothing of this thread's own is open; at most an adopted root
            debug!("Context {} already closed", self.id);
        } else {
            let top = context::current_id().map_or_else(String::new, |id| id.to_string());
            warn!("Context {} is not innermost (top is {top}); left open", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ChannelCollector;
    use crate::domain::Value;

    fn agent() -> (Agent, crossbeam_channel::Receiver<Measurement>) {
        let (collector, rx) = ChannelCollector::unbounded();
        (Agent::new(AgentConfig::default(), Arc::new(collector)), rx)
    }

    #[test]
    fn test_scope_publishes_closed_context() {
        let (agent, rx) = agent();
        {
            let scope = agent.scope("request", "http");
            assert!(scope.set("path", "/pay"));
            assert_eq!(agent.current_context().map(|c| c.id()), Some(scope.id()));
        }
        assert!(agent.current_context().is_none());

        let Ok(Measurement::Context(ctx)) = rx.try_recv() else { panic!("expected a context") };
        assert!(ctx.is_closed());
        assert_eq!(ctx.get("path"), Some(&Value::from("/pay")));
    }

    #[test]
    fn test_destroy_without_context() {
        let (agent, rx) = agent();
        assert!(agent.destroy_current_context().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_measure_records_error() {
        let (agent, rx) = agent();
        let result: Result<(), String> =
            agent.measure("Billing", "charge", || Err("insufficient funds".to_string()));
        assert!(result.is_err());

        let Ok(Measurement::Method(m)) = rx.try_recv() else { panic!("expected a method") };
        assert_eq!(m.error.as_deref(), Some("insufficient funds"));
        assert_eq!(m.method.full_name(), "Billing.charge");
    }

    #[test]
    fn test_threshold_filters_fast_methods() {
        let (collector, rx) = ChannelCollector::unbounded();
        let config = AgentConfig { min_wall_clock_ms: 60_000, ..AgentConfig::default() };
        let agent = Agent::new(config, Arc::new(collector));

        let _: Result<(), String> = agent.measure("Fast", "path", || Ok(()));
        agent.event_probe("still-published").fire().unwrap();

        let kinds: Vec<_> = rx.try_iter().map(|m| m.kind()).collect();
        assert_eq!(kinds, ["context"]);
    }

    #[test]
    fn test_sampler_cannot_start_twice() {
        let (agent, _rx) = agent();
        agent.start_platform_sampler().unwrap();
        assert!(matches!(agent.start_platform_sampler(), Err(AgentError::AlreadyRunning)));
        assert!(agent.stop_platform_sampler());
        assert!(!agent.stop_platform_sampler());
    }

    #[test]
    fn test_scope_closed_early_leaves_adopted_root_alone() {
        std::thread::spawn(|| {
            let (agent, rx) = agent();
            let root = Context::open("upstream", "job", None, agent.application_id().clone());
            let root_id = root.id();
            let _root = context::adopt(root);

            let scope = agent.scope("step", "worker");
            assert_eq!(agent.destroy_current_context(), Some(scope.id()));
            assert_eq!(agent.current_context().map(|c| c.id()), Some(root_id));

            drop(scope);
            assert_eq!(agent.current_context().map(|c| c.id()), Some(root_id));
            // Only the explicit destroy published
            assert_eq!(rx.try_iter().count(), 1);
        })
        .join()
        .unwrap();
    }
}
