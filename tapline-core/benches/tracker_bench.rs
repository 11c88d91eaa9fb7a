//! Benchmark: Latency Tracker Record and Snapshot
//!
//! Purpose: Keep `record` O(1) and cheap; snapshot cost is a reporting-path
//! concern but worth tracking against window size
//!
//! What's Measured:
//! - Single record() call
//! - record_from_timestamps with the validity check
//! - stats() snapshot-and-sort at several window sizes

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tapline_core::core::L4Protocol;
use tapline_core::exchange::ExchangeRegistry;
use tapline_core::latency::LatencyTracker;

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker");
    group.significance_level(0.01).sample_size(200);

    let registry = ExchangeRegistry::default_us_equities();
    let tracker = LatencyTracker::new(100_000, 500, &registry);

    group.bench_function("record", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            tracker.record(black_box(i % 1_000_000), 1, L4Protocol::Tcp);
        });
    });

    group.bench_function("record_from_timestamps", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            tracker.record_from_timestamps(black_box(i), black_box(i + 250_000), 2, L4Protocol::Udp);
        });
    });

    group.finish();
}

fn bench_stats_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker");
    group.significance_level(0.01).sample_size(30);

    let registry = ExchangeRegistry::default_us_equities();
    for window in [1_000usize, 10_000, 100_000].iter() {
        let tracker = LatencyTracker::new(*window, 500, &registry);
        for i in 0..*window as u64 * 2 {
            tracker.record(i % 900_000, 1, L4Protocol::Tcp);
        }
        group.bench_with_input(BenchmarkId::new("stats", window), window, |b, _| {
            b.iter(|| black_box(tracker.stats()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_record, bench_stats_snapshot);
criterion_main!(benches);
