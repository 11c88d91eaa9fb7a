//! Rolling-window latency tracker
//!
//! Keeps the most recent `window_size` samples in a ring of packed atomic
//! words for percentile queries, and lifetime aggregates (count, min, max,
//! mean, sigma, violations) that are never windowed. Writers use relaxed
//! atomics only; readers copy the window into a scratch buffer and sort, so
//! a concurrent snapshot may observe a torn sample at the window's tail,
//! which the contract explicitly allows. Callers that need a consistent view
//! serialize against the writers.
//!
//! Latencies are clamped to `u32::MAX` ns (~4.29 s) so a sample packs into
//! one word; samples with `recv <= send` are dropped as invalid and counted.

use crate::core::{ExchangeId, L4Protocol, LatencySample, LATENCY_CLAMP_NS};
use crate::exchange::ExchangeRegistry;
use crate::utils::clock;
use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default window size: percentiles describe the trailing 100k samples.
pub const DEFAULT_WINDOW_SIZE: usize = 100_000;

/// One ring entry: observation timestamp plus `latency | exchange | proto`
/// packed into a second word. Two independent relaxed stores; a torn pair
/// during concurrent snapshots is tolerated by design.
#[derive(Debug)]
struct SampleSlot {
    ts_ns: AtomicU64,
    packed: AtomicU64,
}

#[inline(always)]
fn pack_sample(latency_ns: u32, exchange_id: ExchangeId, protocol: L4Protocol) -> u64 {
    latency_ns as u64 | ((exchange_id as u64) << 32) | ((protocol.ip_proto() as u64) << 48)
}

#[inline(always)]
fn unpack_sample(word: u64) -> (u32, ExchangeId, L4Protocol) {
    let latency = word as u32;
    let exchange = (word >> 32) as u16;
    let protocol = L4Protocol::from_ip_proto((word >> 48) as u8).unwrap_or(L4Protocol::Tcp);
    (latency, exchange, protocol)
}

/// Lifetime accumulator, global or per-exchange.
#[derive(Debug)]
struct LifetimeAgg {
    count: AtomicU64,
    sum_ns: AtomicU64,
    /// Sum of squared microsecond latencies; microseconds keep the square
    /// inside u64 for any realistic session length.
    sum_sq_us: AtomicU64,
    min_ns: AtomicU64,
    max_ns: AtomicU64,
    violations: AtomicU64,
}

impl LifetimeAgg {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_ns: AtomicU64::new(0),
            sum_sq_us: AtomicU64::new(0),
            min_ns: AtomicU64::new(u64::MAX),
            max_ns: AtomicU64::new(0),
            violations: AtomicU64::new(0),
        }
    }

    #[inline(always)]
    fn record(&self, latency_ns: u64, violated: bool) {
        let latency_us = latency_ns / 1_000;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ns.fetch_add(latency_ns, Ordering::Relaxed);
        self.sum_sq_us
            .fetch_add(latency_us * latency_us, Ordering::Relaxed);
        self.min_ns.fetch_min(latency_ns, Ordering::Relaxed);
        self.max_ns.fetch_max(latency_ns, Ordering::Relaxed);
        if violated {
            self.violations.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.sum_ns.store(0, Ordering::Relaxed);
        self.sum_sq_us.store(0, Ordering::Relaxed);
        self.min_ns.store(u64::MAX, Ordering::Relaxed);
        self.max_ns.store(0, Ordering::Relaxed);
        self.violations.store(0, Ordering::Relaxed);
    }
}

/// Copyable statistics block, global or filtered by exchange.
///
/// `count`, `min`, `max`, `mean`, `std`, and the violation rate cover the
/// tracker's lifetime; the percentiles cover only the trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub dropped_invalid: u64,
    pub min_us: f64,
    pub max_us: f64,
    pub mean_us: f64,
    pub std_us: f64,
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub p99_9_us: f64,
    /// Latency target the violation rate is measured against.
    pub target_us: f64,
    /// Lifetime fraction of samples exceeding the target, `0.0..=1.0`.
    pub violation_rate: f64,
    /// Samples currently in the percentile window.
    pub window_len: usize,
}

/// The tracker itself. `record` is O(1); `percentile`/`stats` are O(window)
/// snapshot-and-sort and belong on reporting paths, not the hot path.
pub struct LatencyTracker {
    window: Box<[SampleSlot]>,
    /// Total samples ever written into the window; `cursor % window_size`
    /// is the next slot.
    cursor: CachePadded<AtomicU64>,
    global: LifetimeAgg,
    /// Indexed by exchange id; `[0]` collects unknown-exchange samples.
    per_exchange: Box<[LifetimeAgg]>,
    /// Latency targets in ns, same indexing; `[0]` holds the default.
    targets_ns: Box<[u64]>,
    dropped_invalid: AtomicU64,
}

impl LatencyTracker {
    /// Build a tracker with per-exchange targets taken from the registry.
    ///
    /// `window_size` of zero is clamped to one sample.
    pub fn new(
        window_size: usize,
        default_target_us: u64,
        registry: &ExchangeRegistry,
    ) -> Self {
        let window_size = window_size.max(1);
        let window: Box<[SampleSlot]> = (0..window_size)
            .map(|_| SampleSlot {
                ts_ns: AtomicU64::new(0),
                packed: AtomicU64::new(0),
            })
            .collect();

        let slots = registry.max_id() as usize + 1;
        let mut targets_ns = vec![default_target_us * 1_000; slots];
        for desc in registry.descriptors() {
            targets_ns[desc.id as usize] = desc.latency_target_us * 1_000;
        }

        Self {
            window,
            cursor: CachePadded::new(AtomicU64::new(0)),
            global: LifetimeAgg::new(),
            per_exchange: (0..slots).map(|_| LifetimeAgg::new()).collect(),
            targets_ns: targets_ns.into_boxed_slice(),
            dropped_invalid: AtomicU64::new(0),
        }
    }

    /// Record a latency observed now.
    #[inline]
    pub fn record(&self, latency_ns: u64, exchange_id: ExchangeId, protocol: L4Protocol) {
        self.record_at(clock::monotonic_ns(), latency_ns, exchange_id, protocol);
    }

    /// Record `recv - send`, dropping the sample when `recv <= send`.
    #[inline]
    pub fn record_from_timestamps(
        &self,
        send_ns: u64,
        recv_ns: u64,
        exchange_id: ExchangeId,
        protocol: L4Protocol,
    ) {
        if recv_ns <= send_ns {
            self.dropped_invalid.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.record_at(recv_ns, recv_ns - send_ns, exchange_id, protocol);
    }

    #[inline]
    fn record_at(
        &self,
        ts_ns: u64,
        latency_ns: u64,
        exchange_id: ExchangeId,
        protocol: L4Protocol,
    ) {
        let clamped = latency_ns.min(LATENCY_CLAMP_NS);

        let slot_index =
            (self.cursor.fetch_add(1, Ordering::Relaxed) % self.window.len() as u64) as usize;
        let slot = &self.window[slot_index];
        slot.ts_ns.store(ts_ns, Ordering::Relaxed);
        slot.packed.store(
            pack_sample(clamped as u32, exchange_id, protocol),
            Ordering::Relaxed,
        );

        let violated = clamped > self.target_ns(exchange_id);
        self.global.record(clamped, violated);
        self.per_exchange[self.agg_index(exchange_id)].record(clamped, violated);
    }

    /// Unregistered exchange ids share the unknown accumulator at index 0.
    #[inline(always)]
    fn agg_index(&self, exchange_id: ExchangeId) -> usize {
        let index = exchange_id as usize;
        if index < self.per_exchange.len() {
            index
        } else {
            0
        }
    }

    #[inline(always)]
    fn target_ns(&self, exchange_id: ExchangeId) -> u64 {
        let index = exchange_id as usize;
        if index < self.targets_ns.len() {
            self.targets_ns[index]
        } else {
            self.targets_ns[0]
        }
    }

    /// Number of samples currently in the window.
    pub fn window_len(&self) -> usize {
        (self.cursor.load(Ordering::Relaxed) as usize).min(self.window.len())
    }

    /// Decode the active portion of the window. Ring order, not arrival
    /// order; percentile math does not care.
    pub fn window_snapshot(&self) -> Vec<LatencySample> {
        let len = self.window_len();
        let mut samples = Vec::with_capacity(len);
        for slot in &self.window[..len] {
            let ts = slot.ts_ns.load(Ordering::Relaxed);
            let (latency_ns, exchange_id, protocol) =
                unpack_sample(slot.packed.load(Ordering::Relaxed));
            samples.push(LatencySample {
                capture_ts_ns: ts,
                latency_ns,
                exchange_id,
                protocol,
            });
        }
        samples
    }

    /// Latency in microseconds at percentile `p` over the current window.
    ///
    /// `p` is clamped to `[0, 100]`; rank is `floor(p/100 * (count - 1))`,
    /// so results match a full sort to within one rank.
    pub fn percentile(&self, p: f64) -> f64 {
        let mut latencies: Vec<u32> = self
            .window[..self.window_len()]
            .iter()
            .map(|slot| unpack_sample(slot.packed.load(Ordering::Relaxed)).0)
            .collect();
        if latencies.is_empty() {
            return 0.0;
        }
        latencies.sort_unstable();
        percentile_of_sorted(&latencies, p)
    }

    /// Full statistics block over all exchanges.
    pub fn stats(&self) -> LatencyStats {
        let latencies: Vec<u32> = self
            .window[..self.window_len()]
            .iter()
            .map(|slot| unpack_sample(slot.packed.load(Ordering::Relaxed)).0)
            .collect();
        self.build_stats(&self.global, self.targets_ns[0], latencies)
    }

    /// Statistics for a single exchange: lifetime aggregates from its
    /// accumulator, percentiles from the window samples tagged with its id.
    pub fn stats_by_exchange(&self, exchange_id: ExchangeId) -> LatencyStats {
        let latencies: Vec<u32> = self
            .window[..self.window_len()]
            .iter()
            .filter_map(|slot| {
                let (latency, id, _) = unpack_sample(slot.packed.load(Ordering::Relaxed));
                (id == exchange_id).then_some(latency)
            })
            .collect();
        self.build_stats(
            &self.per_exchange[self.agg_index(exchange_id)],
            self.target_ns(exchange_id),
            latencies,
        )
    }

    fn build_stats(
        &self,
        agg: &LifetimeAgg,
        target_ns: u64,
        mut window_latencies: Vec<u32>,
    ) -> LatencyStats {
        let count = agg.count.load(Ordering::Relaxed);
        let target_us = target_ns as f64 / 1_000.0;
        if count == 0 {
            return LatencyStats {
                dropped_invalid: self.dropped_invalid.load(Ordering::Relaxed),
                target_us,
                ..LatencyStats::default()
            };
        }

        let sum_ns = agg.sum_ns.load(Ordering::Relaxed);
        let mean_us = sum_ns as f64 / count as f64 / 1_000.0;
        let mean_sq = agg.sum_sq_us.load(Ordering::Relaxed) as f64 / count as f64;
        let std_us = (mean_sq - mean_us * mean_us).max(0.0).sqrt();

        window_latencies.sort_unstable();
        let (p50, p95, p99, p99_9) = if window_latencies.is_empty() {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            (
                percentile_of_sorted(&window_latencies, 50.0),
                percentile_of_sorted(&window_latencies, 95.0),
                percentile_of_sorted(&window_latencies, 99.0),
                percentile_of_sorted(&window_latencies, 99.9),
            )
        };

        LatencyStats {
            count,
            dropped_invalid: self.dropped_invalid.load(Ordering::Relaxed),
            min_us: agg.min_ns.load(Ordering::Relaxed) as f64 / 1_000.0,
            max_us: agg.max_ns.load(Ordering::Relaxed) as f64 / 1_000.0,
            mean_us,
            std_us,
            p50_us: p50,
            p95_us: p95,
            p99_us: p99,
            p99_9_us: p99_9,
            target_us,
            violation_rate: agg.violations.load(Ordering::Relaxed) as f64 / count as f64,
            window_len: window_latencies.len(),
        }
    }

    /// Samples rejected because `recv <= send`.
    pub fn dropped_invalid(&self) -> u64 {
        self.dropped_invalid.load(Ordering::Relaxed)
    }

    /// Zero every aggregate and empty the window. Only meaningful while the
    /// pipeline is quiesced; concurrent writers would interleave stale data.
    pub fn reset_stats(&self) {
        self.cursor.store(0, Ordering::Relaxed);
        self.global.reset();
        for agg in self.per_exchange.iter() {
            agg.reset();
        }
        self.dropped_invalid.store(0, Ordering::Relaxed);
    }
}

/// Rank-based percentile over an ascending slice.
fn percentile_of_sorted(sorted: &[u32], p: f64) -> f64 {
    let p = p.clamp(0.0, 100.0);
    let rank = ((p / 100.0) * (sorted.len() - 1) as f64).floor() as usize;
    sorted[rank] as f64 / 1_000.0
}
