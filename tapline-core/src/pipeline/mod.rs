//! Pipeline orchestrator
//!
//! Wires the capture edge, the parser worker pool, and the consumer sinks
//! around the two lock-free rings:
//!
//! ```text
//! capture sources ──► [pool block] ──► ingress ring ──► parser workers
//!                                                            │
//!                     sinks ◄── consumer threads ◄── egress ring
//!                       │
//!                       └─► release block to pool
//! ```
//!
//! The pipeline owns every shared resource explicitly (pool, registry,
//! tracker, rings); nothing lives in ambient globals. A single atomic
//! shutdown flag is polled between dequeues; observing it switches every
//! thread into drain mode, which releases held blocks and exits once its
//! ring is empty, so no work outlives the pool.

pub mod backoff;
pub mod capture;
pub mod sink;
mod worker;

pub use backoff::{BackoffPolicy, PushBackoff, ShedGate};
pub use capture::{CaptureCounters, CaptureHandle, CaptureStats, IngestOutcome};
pub use sink::{CountingSink, RecordSink, SinkCounts};

use crate::config::CoreConfig;
use crate::core::ParsedRecord;
use crate::exchange::ExchangeRegistry;
use crate::latency::LatencyTracker;
use crate::monitoring::CoreSnapshot;
use crate::parser::{PacketParser, ParserStats};
use crate::pool::{BlockHandle, BlockPool};
use crate::queue::MpmcQueue;
use crate::utils::clock;
use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use worker::{run_consumer, run_parser_worker, ConsumerContext, WorkerContext};

/// A captured frame travelling capture -> parser: the owning block handle
/// plus the two facts the parser needs.
pub struct IngressFrame {
    pub block: BlockHandle,
    pub frame_len: u32,
    pub capture_ts_ns: u64,
}

/// A classified packet travelling parser -> consumer.
pub struct ConsumerItem {
    pub block: BlockHandle,
    pub record: ParsedRecord,
}

/// The orchestrator. Build with [`Pipeline::new`], hand out capture handles,
/// then [`Pipeline::start`] the worker and consumer threads.
pub struct Pipeline {
    pool: Arc<BlockPool>,
    registry: Arc<ExchangeRegistry>,
    tracker: Arc<LatencyTracker>,
    ingress: Arc<MpmcQueue<IngressFrame>>,
    egress: Arc<MpmcQueue<ConsumerItem>>,
    parsers: Vec<Arc<PacketParser>>,
    capture_counters: Vec<Arc<CaptureCounters>>,
    records_shed: Arc<AtomicU64>,
    records_consumed: Arc<AtomicU64>,
    drained: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    policy: BackoffPolicy,
    shed_high: f64,
    shed_low: f64,
    parser_workers: usize,
    worker_cores: Vec<usize>,
}

impl Pipeline {
    /// Build all shared state from a validated configuration. No threads
    /// are spawned yet. Construction failures (arena reservation, registry
    /// conflicts) are fatal and surfaced here.
    pub fn new(config: &CoreConfig) -> Result<Self> {
        let config = config.normalized();
        config.validate()?;
        clock::calibrate();

        let registry = Arc::new(config.registry()?);
        let pool = Arc::new(
            BlockPool::new(
                config.pool.pool_bytes,
                config.pool.block_bytes,
                config.pool.use_mapped_arena,
            )
            .context("reserving block pool arena")?,
        );
        pool.prefault();

        let tracker = Arc::new(LatencyTracker::new(
            config.latency.window_size,
            config.latency.default_target_us,
            &registry,
        ));

        tracing::info!(
            blocks = pool.capacity(),
            block_bytes = pool.block_size(),
            ingress = config.queues.ingress_capacity,
            egress = config.queues.egress_capacity,
            workers = config.orchestrator.parser_workers,
            "pipeline constructed"
        );

        Ok(Self {
            pool,
            registry,
            tracker,
            ingress: Arc::new(MpmcQueue::with_capacity(config.queues.ingress_capacity)),
            egress: Arc::new(MpmcQueue::with_capacity(config.queues.egress_capacity)),
            parsers: Vec::new(),
            capture_counters: Vec::new(),
            records_shed: Arc::new(AtomicU64::new(0)),
            records_consumed: Arc::new(AtomicU64::new(0)),
            drained: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
            policy: BackoffPolicy {
                spins: config.orchestrator.backoff_spins,
                yield_after: config.orchestrator.backoff_yield_after,
            },
            shed_high: config.orchestrator.shed_high_watermark,
            shed_low: config.orchestrator.shed_low_watermark,
            parser_workers: config.orchestrator.parser_workers,
            worker_cores: config.orchestrator.worker_cores.clone(),
        })
    }

    /// Register a capture source and get its producer-facing handle.
    ///
    /// One handle per uplink; each carries its own shed gate and counters.
    pub fn capture_handle(&mut self) -> CaptureHandle {
        let counters = Arc::new(CaptureCounters::default());
        self.capture_counters.push(Arc::clone(&counters));
        CaptureHandle::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.ingress),
            self.policy,
            ShedGate::new(self.shed_high, self.shed_low, "ingress"),
            counters,
            Arc::clone(&self.shutdown),
        )
    }

    /// Spawn the parser workers and one consumer thread per sink.
    pub fn start(&mut self, sinks: Vec<Box<dyn RecordSink>>) -> Result<()> {
        if !self.threads.is_empty() {
            bail!("pipeline already started");
        }
        if sinks.is_empty() {
            bail!("pipeline needs at least one sink");
        }

        for id in 0..self.parser_workers {
            let parser = Arc::new(PacketParser::new(Arc::clone(&self.registry)));
            self.parsers.push(Arc::clone(&parser));
            let ctx = WorkerContext {
                id,
                ingress: Arc::clone(&self.ingress),
                egress: Arc::clone(&self.egress),
                pool: Arc::clone(&self.pool),
                parser,
                tracker: Arc::clone(&self.tracker),
                policy: self.policy,
                shed: ShedGate::new(self.shed_high, self.shed_low, "egress"),
                records_shed: Arc::clone(&self.records_shed),
                drained: Arc::clone(&self.drained),
                shutdown: Arc::clone(&self.shutdown),
                pin_core: self.worker_cores.get(id % self.worker_cores.len().max(1)).copied(),
            };
            let handle = std::thread::Builder::new()
                .name(format!("tapline-parser-{}", id))
                .spawn(move || run_parser_worker(ctx))
                .context("spawning parser worker")?;
            self.threads.push(handle);
        }

        for (id, sink) in sinks.into_iter().enumerate() {
            let name = sink.name();
            let ctx = ConsumerContext {
                id,
                egress: Arc::clone(&self.egress),
                pool: Arc::clone(&self.pool),
                sink,
                policy: self.policy,
                records_consumed: Arc::clone(&self.records_consumed),
                drained: Arc::clone(&self.drained),
                shutdown: Arc::clone(&self.shutdown),
            };
            let handle = std::thread::Builder::new()
                .name(format!("tapline-sink-{}-{}", id, name))
                .spawn(move || run_consumer(ctx))
                .context("spawning consumer")?;
            self.threads.push(handle);
        }

        tracing::info!(
            workers = self.parser_workers,
            consumers = self.threads.len() - self.parser_workers,
            "pipeline started"
        );
        Ok(())
    }

    /// The flag capture sources and signal handlers flip to stop the world.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Flip the shutdown flag; threads drain and exit on their own.
    pub fn trigger_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Shut down, join every thread, and return the final snapshot.
    pub fn shutdown_and_join(mut self) -> Result<CoreSnapshot> {
        self.trigger_shutdown();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                bail!("pipeline thread panicked");
            }
        }

        // A producer can slip one item into a ring after its drainer
        // observed empty-and-shutdown and exited; with every thread joined,
        // sweep both rings so no block outlives the drain.
        while let Some(frame) = self.ingress.try_pop() {
            self.pool.release(frame.block);
            self.drained.fetch_add(1, Ordering::Relaxed);
        }
        while let Some(item) = self.egress.try_pop() {
            self.pool.release(item.block);
            self.drained.fetch_add(1, Ordering::Relaxed);
        }

        let snapshot = self.snapshot();
        tracing::info!(
            consumed = snapshot.records_consumed,
            drained = snapshot.drained,
            leaked = snapshot.pool.allocated,
            "pipeline drained"
        );
        Ok(snapshot)
    }

    /// C7: copy out every counter in the core. Lock-free; fields may be
    /// mutually stale by a few operations while traffic is flowing.
    pub fn snapshot(&self) -> CoreSnapshot {
        let mut parser = ParserStats::default();
        for p in &self.parsers {
            parser.merge(&p.stats());
        }
        let mut capture = CaptureStats::default();
        for counters in &self.capture_counters {
            capture.merge(&CaptureStats::from_counters(counters));
        }

        CoreSnapshot {
            pool: self.pool.stats(),
            ingress: self.ingress.stats(),
            egress: self.egress.stats(),
            parser,
            latency: self.tracker.stats(),
            capture,
            records_shed: self.records_shed.load(Ordering::Relaxed),
            records_consumed: self.records_consumed.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
        }
    }

    /// Shared pool reference, for embedding tests and custom stages.
    pub fn pool(&self) -> &Arc<BlockPool> {
        &self.pool
    }

    /// The registry snapshot this pipeline classifies against.
    pub fn registry(&self) -> &Arc<ExchangeRegistry> {
        &self.registry
    }

    /// The shared latency tracker.
    pub fn tracker(&self) -> &Arc<LatencyTracker> {
        &self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CoreConfig {
        let mut cfg = CoreConfig::default();
        cfg.pool.pool_bytes = 32 * 2048;
        cfg.queues.ingress_capacity = 32;
        cfg.queues.egress_capacity = 32;
        cfg.orchestrator.parser_workers = 1;
        cfg
    }

    #[test]
    fn test_new_builds_seed_registry_and_pool() {
        let pipeline = Pipeline::new(&small_config()).unwrap();
        assert_eq!(pipeline.pool().capacity(), 32);
        assert_eq!(pipeline.registry().descriptors().len(), 3);
        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.pool.allocated, 0);
        assert_eq!(snapshot.ingress.capacity, 32);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut cfg = small_config();
        cfg.orchestrator.parser_workers = 0;
        assert!(Pipeline::new(&cfg).is_err());
    }

    #[test]
    fn test_start_requires_a_sink() {
        let mut pipeline = Pipeline::new(&small_config()).unwrap();
        assert!(pipeline.start(Vec::new()).is_err());
    }

    #[test]
    fn test_double_start_rejected() {
        let mut pipeline = Pipeline::new(&small_config()).unwrap();
        pipeline.start(vec![Box::new(CountingSink::new())]).unwrap();
        assert!(pipeline.start(vec![Box::new(CountingSink::new())]).is_err());
        pipeline.shutdown_and_join().unwrap();
    }
}
