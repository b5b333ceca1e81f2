//! # callscope - Demo Entry Point
//!
//! Runs a synthetic service workload under the agent and writes every
//! measurement it produces as JSON lines (stdout, or `--export FILE`):
//!
//! - each worker thread handles "requests" inside a context scope
//! - nested calls are measured through handles, callbacks and `measure`
//! - some payments fail, so error measurements show up
//! - audit writes are handed to a helper thread that adopts the request context
//! - the platform sampler runs for the whole session

#![allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use log::{debug, info};
use thiserror::Error;

use callscope::cli::Args;
use callscope::context::{self, Carried};
use callscope::domain::{AgentError, Measurement};
use callscope::telemetry::{register_gc_source, CountingGcSource};
use callscope::{Agent, ChannelCollector, Collector, JsonLinesCollector};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    // A bad export path is a usage problem, not a runtime failure
    match err.downcast_ref::<AgentError>() {
        Some(AgentError::Io(_)) => EXIT_USAGE,
        _ => EXIT_ERROR,
    }
}

#[derive(Debug, Error)]
#[error("payment declined for order {0}")]
struct PaymentDeclined(u64);

#[derive(Debug, Default)]
struct Summary {
    methods: u64,
    failed_methods: u64,
    contexts: u64,
    platform: u64,
}

impl Summary {
    fn record(&mut self, measurement: &Measurement) {
        match measurement {
            Measurement::Method(m) => {
                self.methods += 1;
                if m.ended_with_error() {
                    self.failed_methods += 1;
                }
            }
            Measurement::Context(_) => self.contexts += 1,
            Measurement::Platform(_) => self.platform += 1,
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = args.agent_config();

    let writer: Box<dyn Write + Send> = match &args.export {
        Some(path) => {
            let file = File::create(path)
                .map_err(AgentError::Io)
                .with_context(|| format!("Failed to create export file {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None if args.quiet => Box::new(io::sink()),
        None => Box::new(io::stdout()),
    };

    let (channel, rx) = ChannelCollector::bounded(config.collector_capacity);
    let channel = Arc::new(channel);
    let sink = spawn_sink(rx, JsonLinesCollector::new(writer))?;

    let sweeper = Arc::new(CountingGcSource::new("demo-cache"));
    register_gc_source(sweeper.clone());

    let agent = Agent::new(config, channel.clone());
    agent.start_platform_sampler()?;

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    let workers = (0..args.threads)
        .map(|worker| {
            let agent = agent.clone();
            let sweeper = Arc::clone(&sweeper);
            thread::Builder::new()
                .name(format!("worker-{worker}"))
                .spawn(move || run_worker(&agent, &sweeper, u64::from(worker), deadline))
                .with_context(|| format!("Failed to spawn worker {worker}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut requests = 0;
    for worker in workers {
        requests += worker.join().map_err(|_| anyhow::anyhow!("Worker thread panicked"))??;
    }

    agent.shutdown();
    let dropped = channel.dropped();
    // Last senders go away here, which ends the sink loop
    drop(agent);
    drop(channel);

    let (sink, summary) = sink.join().map_err(|_| anyhow::anyhow!("Sink thread panicked"))?;
    let export_errors = sink.errors();
    sink.into_inner().context("Failed to flush measurements")?;

    if !args.quiet {
        eprintln!(
            "{requests} requests: {} method measurements ({} failed), {} contexts, {} platform snapshots",
            summary.methods, summary.failed_methods, summary.contexts, summary.platform
        );
        if dropped > 0 || export_errors > 0 {
            eprintln!("{dropped} measurements dropped, {export_errors} failed to export");
        }
    }
    if let Some(path) = &args.export {
        info!("Measurements written to {}", path.display());
    }
    Ok(())
}

/// Drain the collector queue into `sink` until every sender is gone.
fn spawn_sink<C>(rx: Receiver<Measurement>, sink: C) -> Result<JoinHandle<(C, Summary)>>
where
    C: Collector + 'static,
{
    thread::Builder::new()
        .name("callscope-sink".to_string())
        .spawn(move || {
            let mut summary = Summary::default();
            for measurement in rx {
                summary.record(&measurement);
                sink.publish(measurement);
            }
            (sink, summary)
        })
        .context("Failed to spawn sink thread")
}

fn run_worker(
    agent: &Agent,
    sweeper: &CountingGcSource,
    worker: u64,
    deadline: Instant,
) -> Result<u64> {
    let mut order = worker * 1_000_000;
    let mut handled = 0;

    while Instant::now() < deadline {
        order += 1;
        handled += 1;

        let request = agent.scope("POST /orders", "http");
        request.set("worker", worker as i64);
        request.set("order", order as i64);

        // Handle style
        let mut reserve = agent.on_enter("Inventory", "reserve");
        reserve.set("items", (order % 5 + 1) as i64);
        burn_cpu(20_000);
        agent.on_exit(reserve);

        // Callback style, the way interceptor hooks drive it
        agent.before_invoke("PricingEngine", "quote");
        thread::sleep(Duration::from_millis(2));
        agent.after_invoke(None)?;

        let charged = agent.measure("PaymentGateway", "charge", || charge(order));
        if let Err(e) = &charged {
            debug!("{e}");
        }

        // Audit write happens on a helper thread under the request context
        let job = Carried::capture(order);
        thread::scope(|s| {
            s.spawn(|| {
                let _root = context::adopt_from(&job);
                let _audit = agent.scope("audit", "background");
                agent.measure("AuditLog", "append", || {
                    burn_cpu(5_000);
                    Ok::<_, std::convert::Infallible>(())
                })
            });
        });

        agent
            .event_probe("order-placed")
            .set("order", order as i64)
            .set("paid", charged.is_ok())
            .fire()?;

        if order % 13 == 0 {
            let started = Instant::now();
            burn_cpu(50_000);
            sweeper.record(started.elapsed());
        }
        drop(request);
    }

    Ok(handled)
}

fn charge(order: u64) -> Result<(), PaymentDeclined> {
    thread::sleep(Duration::from_millis(1));
    if order % 7 == 0 {
        Err(PaymentDeclined(order))
    } else {
        Ok(())
    }
}

fn burn_cpu(iterations: u64) {
    let mut acc = 0u64;
    for i in 0..iterations {
        acc = std::hint::black_box(acc.wrapping_mul(31).wrapping_add(i));
    }
}
