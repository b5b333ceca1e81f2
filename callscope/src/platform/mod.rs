//! # Platform Sampler
//!
//! A dedicated background thread that publishes a whole-process snapshot
//! every interval. Each snapshot carries cumulative totals and the change
//! since the previous snapshot, which only the sampler thread holds.
//!
//! ## Tick
//!
//! 1. Read GC totals, process CPU, uptime, heap and thread count
//! 2. Derive deltas against the previous snapshot (process start for the first)
//! 3. Publish, keep as previous
//!
//! A tick whose readings fail is logged and skipped; the loop keeps going.
//! Stopping wakes the thread immediately instead of waiting out the interval.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};

use crate::collector::Collector;
use crate::domain::{
    AgentError, ApplicationId, HeapUsage, Measurement, Nanos, PlatformSnapshot, SamplingTickError,
    Timestamp,
};
use crate::telemetry::{self, GcTotals, ProcessCounters};

const THREAD_NAME: &str = "callscope-platform";

/// Raw whole-process readings for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformReading {
    pub created_at: Timestamp,
    pub gc: GcTotals,
    pub cpu: ProcessCounters,
    pub uptime: Nanos,
    pub heap: HeapUsage,
    pub thread_count: i64,
    pub threads_started: i64,
}

impl PlatformReading {
    /// Read every whole-process counter.
    ///
    /// # Errors
    /// Fails if heap sizing or the live thread count cannot be read. Process
    /// CPU and GC readers degrade to zero instead.
    pub fn capture() -> Result<Self, SamplingTickError> {
        let heap = telemetry::try_snapshot_heap().map_err(|e| SamplingTickError::new("heap", e))?;
        let thread_count =
            telemetry::thread_count().map_err(|e| SamplingTickError::new("thread count", e))?;

        Ok(Self {
            created_at: Timestamp::now(),
            gc: telemetry::snapshot_gc(),
            cpu: telemetry::snapshot_process(),
            uptime: telemetry::uptime(),
            heap,
            thread_count,
            threads_started: telemetry::started_thread_count(),
        })
    }
}

/// Turn a reading into a snapshot relative to `previous`.
///
/// Without a previous snapshot, deltas are taken from process start: they
/// equal the totals and the elapsed time is the uptime.
///
/// Ratios are plain division. Zero elapsed time gives NaN (0/0) or an
/// infinity, never an error.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn derive_snapshot(
    application_id: ApplicationId,
    reading: &PlatformReading,
    previous: Option<&PlatformSnapshot>,
) -> PlatformSnapshot {
    let total_gc_count = reading.gc.count;
    let total_gc_time_ms = reading.gc.time.as_millis();
    let total_cpu_time_ms = reading.cpu.cpu_time.as_millis();
    let uptime_ms = reading.uptime.as_millis();

    let (gc_count, gc_time_ms, cpu_time_ms, threads_started, elapsed_ms) = match previous {
        Some(p) => (
            total_gc_count - p.total_gc_count,
            total_gc_time_ms - p.total_gc_time_ms,
            total_cpu_time_ms - p.total_cpu_time_ms,
            reading.threads_started - p.total_threads_started,
            reading.created_at - p.created_at,
        ),
        None => (total_gc_count, total_gc_time_ms, total_cpu_time_ms, reading.threads_started, uptime_ms),
    };

    PlatformSnapshot {
        application_id,
        created_at: reading.created_at,
        total_gc_count,
        total_gc_time_ms,
        uptime_ms,
        total_cpu_time_ms,
        heap: reading.heap,
        thread_count: reading.thread_count,
        total_threads_started: reading.threads_started,
        gc_count,
        gc_time_ms,
        cpu_time_ms,
        threads_started,
        avg_cpu_usage: total_cpu_time_ms as f64 / uptime_ms as f64,
        cpu_usage: cpu_time_ms as f64 / elapsed_ms as f64,
    }
}

/// Source of one tick's readings
pub type ReadingSource = Box<dyn FnMut() -> Result<PlatformReading, SamplingTickError> + Send>;

/// Periodic whole-process sampler
pub struct PlatformSampler {
    application_id: ApplicationId,
    interval: Duration,
    collector: Arc<dyn Collector>,
    read: ReadingSource,
}

impl PlatformSampler {
    pub fn new(
        application_id: ApplicationId,
        interval: Duration,
        collector: Arc<dyn Collector>,
    ) -> Self {
        Self { application_id, interval, collector, read: Box::new(PlatformReading::capture) }
    }

    /// Take readings from `read` instead of the live process counters.
    #[must_use]
    pub fn with_reader(
        mut self,
        read: impl FnMut() -> Result<PlatformReading, SamplingTickError> + Send + 'static,
    ) -> Self {
        self.read = Box::new(read);
        self
    }

    /// Take one snapshot relative to `previous`.
    ///
    /// # Errors
    /// Fails when the tick's readings cannot be taken.
    pub fn sample(
        &mut self,
        previous: Option<&PlatformSnapshot>,
    ) -> Result<PlatformSnapshot, SamplingTickError> {
        let reading = (self.read)()?;
        Ok(derive_snapshot(self.application_id.clone(), &reading, previous))
    }

    /// Run the loop on its own thread.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(mut self) -> Result<SamplerHandle, AgentError> {
        let (stop_tx, stop_rx) = bounded(1);
        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || self.run(&stop_rx))
            .map_err(|source| AgentError::Spawn { thread: THREAD_NAME, source })?;
        Ok(SamplerHandle { stop: Some(stop_tx), thread: Some(thread) })
    }

    fn run(&mut self, stop: &Receiver<()>) {
        info!("Platform sampler started (interval {:?})", self.interval);
        // Only successful ticks become the baseline for the next one
        let mut previous: Option<PlatformSnapshot> = None;

        loop {
            match self.sample(previous.as_ref()) {
                Ok(snapshot) => {
                    self.collector.publish(Measurement::Platform(snapshot.clone()));
                    previous = Some(snapshot);
                }
                Err(e) => warn!("Skipping platform sample: {e}"),
            }

            match stop.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!("Platform sampler stopped");
    }
}

/// Owns the sampler thread; stops and joins it on [`stop`](Self::stop) or drop.
pub struct SamplerHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    /// Signal the sampler and wait for its thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            // A full slot or a gone receiver both mean the loop is stopping
            let _ = stop.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Platform sampler thread panicked");
            } else {
                debug!("Platform sampler joined");
            }
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Instant;

    use super::*;
    use crate::collector::ChannelCollector;
    use crate::domain::TelemetryError;

    fn reading() -> PlatformReading {
        PlatformReading {
            created_at: Timestamp(1_700_000_010_000),
            gc: GcTotals { count: 4, time: Nanos(80_000_000) },
            cpu: ProcessCounters { cpu_time: Nanos(2_000_000_000) },
            uptime: Nanos(10_000_000_000),
            heap: HeapUsage { allocated: 4096, used: 1024, free: 3072, unallocated: 1 << 20 },
            thread_count: 6,
            threads_started: 9,
        }
    }

    #[test]
    fn test_first_snapshot_is_relative_to_process_start() {
        let s = derive_snapshot(ApplicationId::generate("t"), &reading(), None);
        assert_eq!(s.gc_count, 4);
        assert_eq!(s.cpu_time_ms, 2_000);
        assert_eq!(s.threads_started, 9);
        assert!((s.avg_cpu_usage - 0.2).abs() < 1e-9);
        assert!((s.cpu_usage - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_identical_snapshots_give_zero_deltas() {
        let app = ApplicationId::generate("t");
        let first = derive_snapshot(app.clone(), &reading(), None);
        let second = derive_snapshot(app, &reading(), Some(&first));

        assert_eq!(second.gc_count, 0);
        assert_eq!(second.gc_time_ms, 0);
        assert_eq!(second.cpu_time_ms, 0);
        assert_eq!(second.threads_started, 0);
        // 0 / 0 with no time elapsed
        assert!(second.cpu_usage.is_nan());
        assert!(second.avg_cpu_usage.is_finite());
    }

    #[test]
    fn test_usage_since_previous() {
        let app = ApplicationId::generate("t");
        let first = derive_snapshot(app.clone(), &reading(), None);

        let mut later = reading();
        later.created_at = Timestamp(first.created_at.0 + 5_000);
        later.cpu.cpu_time = Nanos(4_500_000_000);
        later.gc.count = 3;
        let second = derive_snapshot(app, &later, Some(&first));

        assert_eq!(second.cpu_time_ms, 2_500);
        assert!((second.cpu_usage - 0.5).abs() < 1e-9);
        // Counter reset shows up as a negative delta
        assert_eq!(second.gc_count, -1);
    }

    #[test]
    fn test_zero_uptime_is_not_an_error() {
        let mut r = reading();
        r.uptime = Nanos::ZERO;
        let s = derive_snapshot(ApplicationId::generate("t"), &r, None);
        assert!(s.avg_cpu_usage.is_infinite());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_sampler_publishes_and_stops_promptly() {
        let (collector, rx) = ChannelCollector::unbounded();
        let sampler = PlatformSampler::new(
            ApplicationId::generate("t"),
            Duration::from_secs(3600),
            Arc::new(collector),
        );
        let handle = sampler.spawn().unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first.kind(), "platform");

        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_failed_tick_is_skipped_and_loop_continues() {
        let first = reading();
        let mut second = reading();
        second.created_at = Timestamp(first.created_at.0 + 2_000);
        second.cpu.cpu_time = Nanos(3_000_000_000);
        second.gc.count = 7;

        let mut ticks: VecDeque<Result<PlatformReading, SamplingTickError>> = VecDeque::from([
            Err(SamplingTickError::new("heap", TelemetryError::Unavailable("heap"))),
            Ok(first),
            Ok(second),
        ]);
        let (collector, rx) = ChannelCollector::unbounded();
        let sampler = PlatformSampler::new(
            ApplicationId::generate("t"),
            Duration::from_millis(10),
            Arc::new(collector),
        )
        .with_reader(move || {
            ticks.pop_front().unwrap_or_else(|| {
                Err(SamplingTickError::new("heap", TelemetryError::Unavailable("heap")))
            })
        });
        let handle = sampler.spawn().unwrap();

        let mut snapshots = Vec::new();
        for _ in 0..2 {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                Measurement::Platform(s) => snapshots.push(s),
                other => panic!("unexpected {other}"),
            }
        }
        handle.stop();
        // Later ticks all fail, so nothing else was published
        assert!(rx.try_recv().is_err());

        // The failed first tick left no baseline: the first snapshot is
        // relative to process start
        assert_eq!(snapshots[0].created_at, first.created_at);
        assert_eq!(snapshots[0].gc_count, 4);
        assert_eq!(snapshots[0].cpu_time_ms, 2_000);

        assert_eq!(snapshots[1].gc_count, 3);
        assert_eq!(snapshots[1].cpu_time_ms, 1_000);
        assert!((snapshots[1].cpu_usage - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_sample_propagates_reader_failure() {
        let (collector, _rx) = ChannelCollector::unbounded();
        let mut sampler = PlatformSampler::new(
            ApplicationId::generate("t"),
            Duration::from_secs(1),
            Arc::new(collector),
        )
        .with_reader(|| {
            Err(SamplingTickError::new("thread count", TelemetryError::Unavailable("threads")))
        });

        assert!(sampler.sample(None).is_err());
        sampler = sampler.with_reader(|| Ok(reading()));
        assert_eq!(sampler.sample(None).unwrap().thread_count, 6);
    }
}
