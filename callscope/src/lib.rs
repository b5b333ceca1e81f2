//! # callscope - In-process Method and Platform Telemetry
//!
//! callscope times method executions, samples thread and process counters
//! around them, groups the results into per-thread execution contexts, and
//! publishes periodic whole-process health snapshots. Everything runs inside
//! the instrumented process; finished measurements go to a [`Collector`].
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Instrumented Application                     │
//! │        hooks: on_enter / on_exit / before_invoke / scope        │
//! └───────────────┬───────────────────────────────┬─────────────────┘
//!                 │                               │
//!                 ▼                               ▼
//! ┌───────────────────────────────┐  ┌──────────────────────────────┐
//! │   Probes (calling thread)     │  │  Contexts (thread-local)     │
//! │  MethodProbe / EventProbe     │─▶│  ContextStack, adopt()       │
//! └───────────────┬───────────────┘  └──────────────────────────────┘
//!                 │ before/after readings
//!                 ▼
//! ┌───────────────────────────────┐  ┌──────────────────────────────┐
//! │   Telemetry readers           │◀─│  Platform sampler thread     │
//! │  thread / process / gc / heap │  │  snapshot every interval     │
//! └───────────────────────────────┘  └──────────────┬───────────────┘
//!                 │                                 │
//!                 ▼                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Collector: ChannelCollector / JsonLinesCollector / LogCollector │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`agent`]: Process-level entry point wiring probes, contexts and the sampler
//! - [`context`]: Thread-confined context stack and explicit cross-thread hand-off
//! - [`probe`]: Method probe state machine, hook handles, one-shot events
//! - [`telemetry`]: Platform counter readers and before/after deltas
//!   - `procfs`: `/proc` parsers, testable without a live `/proc`
//! - [`platform`]: Background whole-process sampler
//! - [`collector`]: Collector trait and bundled sinks
//! - [`config`]: Agent configuration from code, documents or the environment
//! - [`domain`]: Error taxonomy and engine newtypes; re-exports the shared records
//! - [`cli`]: Arguments of the demo binary
//!
//! ## Guarantees
//!
//! - Contexts on one thread nest strictly; a child's parent is whatever was
//!   current when it opened. Threads never see each other's stacks.
//! - A method probe publishes at most once. Misuse returns
//!   [`InvalidStateError`](domain::InvalidStateError) and changes nothing.
//! - Telemetry failures never reach instrumented code: counters that cannot
//!   be read report zero, failed sampler ticks are logged and skipped.
//! - Deltas are `after - before`, signed, never clamped.
//!
//! ## Typical Usage
//!
//! ```ignore
//! let (collector, rx) = ChannelCollector::bounded(1000);
//! let agent = Agent::new(AgentConfig::from_env(), Arc::new(collector));
//! agent.start_platform_sampler()?;
//!
//! let _request = agent.scope("GET /orders", "http");
//! let orders = agent.measure("OrderRepo", "load", || repo.load(user))?;
//! agent.event_probe("login").set("user", "alice").fire()?;
//! ```
//!
//! ## Platform Support
//!
//! Linux gets every counter. Elsewhere per-thread context switches, sleep
//! totals and the platform sampler's heap/thread readings are unavailable;
//! thread and process CPU time still work wherever POSIX CPU clocks exist.

pub mod agent;
pub mod cli;
pub mod collector;
pub mod config;
pub mod context;
pub mod domain;
pub mod identity;
pub mod platform;
pub mod probe;
pub mod telemetry;

pub use agent::{Agent, ContextScope};
pub use collector::{ChannelCollector, Collector, JsonLinesCollector, LogCollector, ThresholdCollector};
pub use config::AgentConfig;
