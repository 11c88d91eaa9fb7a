//! Read-only metrics surface
//!
//! One copyable struct aggregating every counter in the core: pool, both
//! queue directions, parser workers (summed), the latency tracker, the
//! capture edge, and the pipeline's shed/drain accounting. Snapshots take no
//! locks; each field is a relaxed copy, so numbers may be mutually stale by
//! a few operations under load. Exporters (Prometheus, logs, dashboards)
//! live outside the core and serialize this struct however they like.

use crate::latency::LatencyStats;
use crate::parser::ParserStats;
use crate::pipeline::CaptureStats;
use crate::pool::PoolStats;
use crate::queue::QueueStats;

/// Point-in-time copy of every core counter.
#[derive(Debug, Clone, Copy)]
pub struct CoreSnapshot {
    /// Fixed-block pool occupancy and lifetime counters
    pub pool: PoolStats,
    /// Capture -> parser ring
    pub ingress: QueueStats,
    /// Parser -> consumer ring
    pub egress: QueueStats,
    /// Parser counters summed across workers
    pub parser: ParserStats,
    /// Latency tracker statistics block
    pub latency: LatencyStats,
    /// Capture-side counters summed across sources
    pub capture: CaptureStats,
    /// Parsed records dropped by egress shed mode
    pub records_shed: u64,
    /// Records delivered to sinks
    pub records_consumed: u64,
    /// Blocks released by the shutdown drain
    pub drained: u64,
}

impl CoreSnapshot {
    /// Frames dropped anywhere between capture and sink.
    pub fn total_dropped(&self) -> u64 {
        self.capture.frames_shed
            + self.capture.pool_exhausted
            + self.capture.oversize_frames
            + self.records_shed
    }

    /// Fraction of offered frames that were shed on the capture edge.
    pub fn capture_shed_ratio(&self) -> f64 {
        let offered = self.capture.frames_ingested + self.capture.frames_shed;
        if offered == 0 {
            0.0
        } else {
            self.capture.frames_shed as f64 / offered as f64
        }
    }

    /// Every block the pipeline ever took out must be back: conservation
    /// check used by tests and the replay binary's exit report.
    pub fn is_leak_free(&self) -> bool {
        self.pool.allocated == 0
    }
}
