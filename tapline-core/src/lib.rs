//! Tapline Core - Hot Path of an HFT Network-Analysis Engine
//!
//! Tapline ingests raw frames from exchange uplinks, classifies
//! trading-relevant traffic, measures per-packet latency with nanosecond
//! resolution, and hands classified records to downstream analytics. This
//! crate is the latency-critical substrate shared by every path; CLI,
//! exporters, and analytics live outside it.
//!
//! ## Data Flow
//!
//! ```text
//! ┌────────────┐   acquire    ┌──────────────┐   try_push   ┌─────────────┐
//! │  capture   │─────────────▶│  pool block  │─────────────▶│ ingress ring│
//! │  sources   │  copy+stamp  │  (C1 arena)  │   (C2 MPMC)  └──────┬──────┘
//! └────────────┘              └──────────────┘                     │ try_pop
//!                                                                  ▼
//!                          ┌───────────────┐  classify   ┌──────────────────┐
//!                          │   exchange    │◀────────────│  parser workers  │
//!                          │ registry (C5) │   by port   │  (C3 walk + C4   │
//!                          └───────────────┘             │  latency sample) │
//!                                                        └────────┬─────────┘
//!                                                                 │ try_push
//!                                                                 ▼
//! ┌────────────┐   release    ┌──────────────┐   try_pop   ┌─────────────┐
//! │ pool (C1)  │◀─────────────│  consumer    │◀────────────│ egress ring │
//! └────────────┘              │  sinks       │  (C2 MPMC)  └─────────────┘
//!                             └──────────────┘
//! ```
//!
//! ## Design Rules
//!
//! - **Zero steady-state heap churn**: blocks come from a pre-reserved
//!   arena; queue slots are pre-allocated; the parser borrows, never copies.
//! - **Lock-free hand-off**: Vyukov sequence-numbered MPMC rings between
//!   every stage; the pool free list is a tagged Treiber stack.
//! - **Back-pressure over blocking**: a full ring costs a bounded
//!   spin/yield episode, then shed mode drops input until the consumer
//!   catches up (0.9 open / 0.7 clear hysteresis).
//! - **Counters, not unwinds**: hot-path failures increment relaxed atomic
//!   counters surfaced through one copyable snapshot; only startup returns
//!   errors.
//! - **Explicit context**: the [`pipeline::Pipeline`] owns the pool,
//!   registry, tracker, and rings; nothing hides in globals.
//!
//! ## Modules
//!
//! - [`pool`] - fixed-block memory pool (C1)
//! - [`queue`] - bounded lock-free MPMC ring (C2)
//! - [`parser`] - zero-copy trading-packet parser (C3)
//! - [`latency`] - rolling-window latency tracker (C4)
//! - [`exchange`] - immutable exchange registry (C5)
//! - [`pipeline`] - capture/parse/consume orchestration (C6)
//! - [`monitoring`] - read-only metrics snapshot (C7)
//! - [`config`], [`perf`], [`frames`], [`utils`] - ambient support

pub mod config;
pub mod core;
pub mod exchange;
pub mod frames;
pub mod latency;
pub mod monitoring;
pub mod parser;
pub mod perf;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod utils;

// Re-export the types most embedders touch.
pub use crate::core::{ExchangeId, L4Protocol, LatencySample, ParsedRecord, EXCHANGE_UNKNOWN};
pub use config::CoreConfig;
pub use exchange::{ExchangeDescriptor, ExchangeRegistry, WireProtocol};
pub use latency::{LatencyStats, LatencyTracker};
pub use monitoring::CoreSnapshot;
pub use parser::{PacketParser, ParserStats};
pub use pipeline::{CaptureHandle, IngestOutcome, Pipeline, RecordSink};
pub use pool::{BlockHandle, BlockPool, PoolStats};
pub use queue::{MpmcQueue, QueueStats};

// Re-export error types the way embedders expect them.
pub use anyhow::{Error, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::CoreConfig;
    pub use crate::core::{ExchangeId, L4Protocol, ParsedRecord};
    pub use crate::exchange::ExchangeRegistry;
    pub use crate::latency::LatencyTracker;
    pub use crate::monitoring::CoreSnapshot;
    pub use crate::pipeline::{CaptureHandle, CountingSink, IngestOutcome, Pipeline, RecordSink};
    pub use crate::pool::BlockPool;
    pub use crate::queue::MpmcQueue;
    pub use crate::{Error, Result};
}
