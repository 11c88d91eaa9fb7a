//! Parser worker and consumer thread loops
//!
//! Both loops follow the same discipline: poll the shutdown flag between
//! dequeues, spin/yield briefly when idle, and on shutdown drain the queue
//! by releasing blocks so nothing outlives the pool. The hot path never
//! parks a thread.

use crate::latency::LatencyTracker;
use crate::parser::PacketParser;
use crate::pipeline::backoff::{BackoffPolicy, PushBackoff, ShedGate};
use crate::pipeline::sink::RecordSink;
use crate::pipeline::{ConsumerItem, IngressFrame};
use crate::pool::BlockPool;
use crate::queue::MpmcQueue;
use crate::utils::clock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) struct WorkerContext {
    pub id: usize,
    pub ingress: Arc<MpmcQueue<IngressFrame>>,
    pub egress: Arc<MpmcQueue<ConsumerItem>>,
    pub pool: Arc<BlockPool>,
    pub parser: Arc<PacketParser>,
    pub tracker: Arc<LatencyTracker>,
    pub policy: BackoffPolicy,
    pub shed: ShedGate,
    pub records_shed: Arc<AtomicU64>,
    pub drained: Arc<AtomicU64>,
    pub shutdown: Arc<AtomicBool>,
    pub pin_core: Option<usize>,
}

/// Body of one parser worker thread.
pub(crate) fn run_parser_worker(ctx: WorkerContext) {
    if let Some(core) = ctx.pin_core {
        if let Err(err) = crate::perf::cpu::pin_to_core(core) {
            tracing::warn!(worker = ctx.id, core, %err, "worker pinning failed");
        }
    }

    let mut idle = PushBackoff::new(ctx.policy);
    loop {
        let shutting_down = ctx.shutdown.load(Ordering::Acquire);
        match ctx.ingress.try_pop() {
            Some(frame) => {
                idle.reset();
                if shutting_down {
                    ctx.pool.release(frame.block);
                    ctx.drained.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                process_frame(&ctx, frame);
            }
            None => {
                if shutting_down {
                    break;
                }
                if !idle.wait() {
                    idle.reset();
                    std::thread::yield_now();
                }
            }
        }
    }
    tracing::debug!(worker = ctx.id, "parser worker drained and exited");
}

#[inline]
fn process_frame(ctx: &WorkerContext, frame: IngressFrame) {
    let IngressFrame {
        block,
        frame_len,
        capture_ts_ns,
    } = frame;

    let Some(record) = ctx
        .parser
        .parse(&block.as_slice()[..frame_len as usize], capture_ts_ns)
    else {
        // Malformed or non-trading: the parser counted which.
        ctx.pool.release(block);
        return;
    };

    ctx.tracker.record_from_timestamps(
        capture_ts_ns,
        clock::monotonic_ns(),
        record.exchange_id,
        record.protocol,
    );

    // Parser-to-consumer back-pressure mirrors the capture edge: sticky
    // shed on a congested egress ring, counted separately from frame shed.
    if ctx.shed.update(ctx.egress.fill_ratio()) {
        ctx.pool.release(block);
        ctx.records_shed.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let mut item = ConsumerItem { block, record };
    let mut backoff = PushBackoff::new(ctx.policy);
    loop {
        match ctx.egress.try_push(item) {
            Ok(()) => return,
            Err(back) => {
                item = back;
                if !backoff.wait() {
                    ctx.shed.open(ctx.egress.fill_ratio());
                    ctx.pool.release(item.block);
                    ctx.records_shed.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        }
    }
}

pub(crate) struct ConsumerContext {
    pub id: usize,
    pub egress: Arc<MpmcQueue<ConsumerItem>>,
    pub pool: Arc<BlockPool>,
    pub sink: Box<dyn RecordSink>,
    pub policy: BackoffPolicy,
    pub records_consumed: Arc<AtomicU64>,
    pub drained: Arc<AtomicU64>,
    pub shutdown: Arc<AtomicBool>,
}

/// Body of one consumer thread. Owns the block from pop to release.
pub(crate) fn run_consumer(mut ctx: ConsumerContext) {
    let mut idle = PushBackoff::new(ctx.policy);
    loop {
        let shutting_down = ctx.shutdown.load(Ordering::Acquire);
        match ctx.egress.try_pop() {
            Some(item) => {
                idle.reset();
                let ConsumerItem { block, record } = item;
                if shutting_down {
                    ctx.pool.release(block);
                    ctx.drained.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                ctx.sink
                    .consume(&record, &block.as_slice()[..record.frame_len as usize]);
                ctx.pool.release(block);
                ctx.records_consumed.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                if shutting_down {
                    break;
                }
                if !idle.wait() {
                    idle.reset();
                    std::thread::yield_now();
                }
            }
        }
    }
    tracing::debug!(consumer = ctx.id, sink = ctx.sink.name(), "consumer drained and exited");
}
