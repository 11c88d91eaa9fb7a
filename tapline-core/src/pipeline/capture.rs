//! Capture edge of the pipeline
//!
//! One [`CaptureHandle`] per uplink. `ingest` copies the raw frame into a
//! pool block, stamps it (source timestamps are authoritative, the monotonic
//! clock backstops), and pushes the block handle onto the ingress ring with
//! the bounded spin/yield/shed discipline. Everything here is allocation-free
//! after construction.

use crate::pipeline::backoff::{BackoffPolicy, PushBackoff, ShedGate};
use crate::pipeline::IngressFrame;
use crate::pool::BlockPool;
use crate::queue::MpmcQueue;
use crate::utils::clock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared capture counters, aggregated by the metrics snapshot.
#[derive(Debug, Default)]
pub struct CaptureCounters {
    pub(crate) frames_ingested: AtomicU64,
    pub(crate) frames_shed: AtomicU64,
    pub(crate) pool_exhausted: AtomicU64,
    pub(crate) oversize_frames: AtomicU64,
}

/// Copyable capture-side statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Frames copied into a block and enqueued
    pub frames_ingested: u64,
    /// Frames dropped by shed mode (capture direction)
    pub frames_shed: u64,
    /// Frames dropped because no block was available
    pub pool_exhausted: u64,
    /// Frames larger than the pool's block size
    pub oversize_frames: u64,
}

impl CaptureStats {
    pub(crate) fn from_counters(counters: &CaptureCounters) -> Self {
        Self {
            frames_ingested: counters.frames_ingested.load(Ordering::Relaxed),
            frames_shed: counters.frames_shed.load(Ordering::Relaxed),
            pool_exhausted: counters.pool_exhausted.load(Ordering::Relaxed),
            oversize_frames: counters.oversize_frames.load(Ordering::Relaxed),
        }
    }

    /// Merge another capture source's stats (used by the C7 snapshot).
    pub fn merge(&mut self, other: &CaptureStats) {
        self.frames_ingested += other.frames_ingested;
        self.frames_shed += other.frames_shed;
        self.pool_exhausted += other.pool_exhausted;
        self.oversize_frames += other.oversize_frames;
    }
}

/// Outcome of one `ingest` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Frame copied and enqueued for parsing
    Enqueued,
    /// Dropped by shed mode; counted
    Shed,
    /// Dropped because the pool had no free block; counted
    PoolExhausted,
    /// Frame does not fit a block; counted
    Oversize,
    /// Pipeline is shutting down; frame not accepted
    ShuttingDown,
}

/// Producer-facing entry point owned by one capture source.
pub struct CaptureHandle {
    pool: Arc<BlockPool>,
    ingress: Arc<MpmcQueue<IngressFrame>>,
    policy: BackoffPolicy,
    shed: ShedGate,
    counters: Arc<CaptureCounters>,
    shutdown: Arc<AtomicBool>,
}

impl CaptureHandle {
    pub(crate) fn new(
        pool: Arc<BlockPool>,
        ingress: Arc<MpmcQueue<IngressFrame>>,
        policy: BackoffPolicy,
        shed: ShedGate,
        counters: Arc<CaptureCounters>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pool,
            ingress,
            policy,
            shed,
            counters,
            shutdown,
        }
    }

    /// Offer one raw Ethernet frame to the pipeline.
    ///
    /// `capture_ts_ns` is the source's timestamp when it has one; otherwise
    /// the monotonic clock is sampled immediately. The frame bytes are
    /// copied; the caller keeps ownership of its buffer.
    pub fn ingest(&self, frame: &[u8], capture_ts_ns: Option<u64>) -> IngestOutcome {
        if self.shutdown.load(Ordering::Acquire) {
            return IngestOutcome::ShuttingDown;
        }
        if frame.len() > self.pool.block_size() {
            self.counters.oversize_frames.fetch_add(1, Ordering::Relaxed);
            return IngestOutcome::Oversize;
        }

        // Shed check before touching the pool: a sticky overload drops the
        // frame without burning an acquire/release pair.
        if self.shed.update(self.ingress.fill_ratio()) {
            self.counters.frames_shed.fetch_add(1, Ordering::Relaxed);
            return IngestOutcome::Shed;
        }

        let ts = capture_ts_ns.unwrap_or_else(clock::monotonic_ns);

        let Some(mut block) = self.pool.acquire() else {
            self.counters.pool_exhausted.fetch_add(1, Ordering::Relaxed);
            return IngestOutcome::PoolExhausted;
        };
        block.as_mut_slice()[..frame.len()].copy_from_slice(frame);

        let mut item = IngressFrame {
            block,
            frame_len: frame.len() as u32,
            capture_ts_ns: ts,
        };
        let mut backoff = PushBackoff::new(self.policy);
        loop {
            match self.ingress.try_push(item) {
                Ok(()) => {
                    self.counters.frames_ingested.fetch_add(1, Ordering::Relaxed);
                    return IngestOutcome::Enqueued;
                }
                Err(back) => {
                    item = back;
                    if !backoff.wait() {
                        // Ring stayed full through the whole episode: enter
                        // shed mode and give the block straight back.
                        self.shed.open(self.ingress.fill_ratio());
                        self.pool.release(item.block);
                        self.counters.frames_shed.fetch_add(1, Ordering::Relaxed);
                        return IngestOutcome::Shed;
                    }
                }
            }
        }
    }

    /// Whether this source is currently shedding.
    pub fn is_shedding(&self) -> bool {
        self.shed.is_shedding()
    }

    /// This source's counters.
    pub fn stats(&self) -> CaptureStats {
        CaptureStats::from_counters(&self.counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(pool_blocks: usize, queue_cap: usize) -> CaptureHandle {
        let pool = Arc::new(BlockPool::new(pool_blocks * 2048, 2048, false).unwrap());
        let ingress = Arc::new(MpmcQueue::with_capacity(queue_cap));
        CaptureHandle::new(
            pool,
            ingress,
            BackoffPolicy {
                spins: 4,
                yield_after: 2,
            },
            ShedGate::new(0.9, 0.7, "test-ingress"),
            Arc::new(CaptureCounters::default()),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn test_ingest_enqueues_and_copies() {
        let capture = handle(8, 8);
        let frame = vec![0xAA; 64];
        assert_eq!(capture.ingest(&frame, Some(123)), IngestOutcome::Enqueued);

        let item = capture.ingress.try_pop().unwrap();
        assert_eq!(item.frame_len, 64);
        assert_eq!(item.capture_ts_ns, 123);
        assert_eq!(&item.block.as_slice()[..64], frame.as_slice());
        capture.pool.release(item.block);
    }

    #[test]
    fn test_clock_fallback_when_no_timestamp() {
        let capture = handle(8, 8);
        capture.ingest(&[0u8; 16], None);
        let item = capture.ingress.try_pop().unwrap();
        assert!(item.capture_ts_ns > 0);
        capture.pool.release(item.block);
    }

    #[test]
    fn test_oversize_frame_rejected() {
        let capture = handle(4, 8);
        let frame = vec![0u8; 4096]; // block size is 2048
        assert_eq!(capture.ingest(&frame, None), IngestOutcome::Oversize);
        assert_eq!(capture.stats().oversize_frames, 1);
        assert_eq!(capture.pool.allocated(), 0);
    }

    #[test]
    fn test_full_ring_enters_shed_without_leaking() {
        let capture = handle(32, 8);
        for _ in 0..8 {
            assert_eq!(capture.ingest(&[1u8; 32], None), IngestOutcome::Enqueued);
        }
        // Ring is full and nobody is draining: the next frames shed.
        for _ in 0..10 {
            assert_eq!(capture.ingest(&[1u8; 32], None), IngestOutcome::Shed);
        }
        assert!(capture.is_shedding());

        let stats = capture.stats();
        assert_eq!(stats.frames_ingested, 8);
        assert_eq!(stats.frames_shed, 10);
        // Only the enqueued frames hold blocks.
        assert_eq!(capture.pool.allocated(), 8);
    }

    #[test]
    fn test_shed_clears_after_drain() {
        let capture = handle(32, 8);
        for _ in 0..9 {
            capture.ingest(&[1u8; 32], None);
        }
        assert!(capture.is_shedding());

        // Drain the ring below the low watermark.
        while let Some(item) = capture.ingress.try_pop() {
            capture.pool.release(item.block);
        }
        assert_eq!(capture.ingest(&[1u8; 32], None), IngestOutcome::Enqueued);
        assert!(!capture.is_shedding());
    }

    #[test]
    fn test_pool_exhaustion_is_counted_separately() {
        let capture = handle(2, 8);
        assert_eq!(capture.ingest(&[1u8; 32], None), IngestOutcome::Enqueued);
        assert_eq!(capture.ingest(&[1u8; 32], None), IngestOutcome::Enqueued);
        // Queue has room (fill 2/8) but the pool is empty.
        assert_eq!(capture.ingest(&[1u8; 32], None), IngestOutcome::PoolExhausted);
        assert_eq!(capture.stats().pool_exhausted, 1);
    }

    #[test]
    fn test_shutdown_refuses_frames() {
        let capture = handle(4, 8);
        capture.shutdown.store(true, Ordering::Release);
        assert_eq!(capture.ingest(&[1u8; 32], None), IngestOutcome::ShuttingDown);
        assert_eq!(capture.stats().frames_ingested, 0);
    }
}
