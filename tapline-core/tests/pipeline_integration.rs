//! End-to-end pipeline scenarios
//!
//! Drives the full capture -> parse -> consume topology with synthetic
//! frames and checks classification, counters, shed behavior, and the
//! leak-free drain guarantee.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tapline_core::core::L4Protocol;
use tapline_core::frames::{fix_heartbeat, FrameSpec};
use tapline_core::pipeline::{CountingSink, IngestOutcome, Pipeline, RecordSink};
use tapline_core::{CoreConfig, ParsedRecord};

/// Small geometry so tests exercise pressure without megabytes of traffic.
fn test_config(ingress_capacity: usize, pool_blocks: usize, workers: usize) -> CoreConfig {
    let mut cfg = CoreConfig::default();
    cfg.pool.pool_bytes = pool_blocks * 2048;
    cfg.pool.block_bytes = 2048;
    cfg.queues.ingress_capacity = ingress_capacity;
    cfg.queues.egress_capacity = ingress_capacity;
    cfg.latency.window_size = 10_000;
    cfg.orchestrator.parser_workers = workers;
    cfg.orchestrator.backoff_spins = 8;
    cfg.orchestrator.backoff_yield_after = 4;
    cfg
}

fn nyse_fix_frame(src_port: u16) -> Vec<u8> {
    FrameSpec {
        src_addr: Ipv4Addr::new(10, 0, 0, 1),
        dst_addr: Ipv4Addr::new(10, 0, 0, 2),
        src_port,
        dst_port: 4001,
        protocol: L4Protocol::Tcp,
        payload: fix_heartbeat(src_port as u64),
    }
    .encode()
}

fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

#[test]
fn test_single_nyse_tcp_packet_end_to_end() {
    let mut pipeline = Pipeline::new(&test_config(64, 64, 1)).unwrap();
    let capture = pipeline.capture_handle();
    let sink = CountingSink::new();
    let counts = sink.counts();
    pipeline.start(vec![Box::new(sink)]).unwrap();

    let frame = nyse_fix_frame(54321);
    assert_eq!(capture.ingest(&frame, None), IngestOutcome::Enqueued);

    assert!(
        wait_until(|| counts.records() == 1, Duration::from_secs(5)),
        "record never reached the sink"
    );
    assert_eq!(counts.fix_records(), 1);

    let snapshot = pipeline.shutdown_and_join().unwrap();
    assert_eq!(snapshot.parser.packets_parsed, 1);
    assert_eq!(snapshot.parser.non_trading_skipped, 0);
    assert_eq!(snapshot.parser.malformed_rejected, 0);
    assert_eq!(snapshot.capture.frames_ingested, 1);
    assert_eq!(snapshot.latency.count, 1);
    assert!(snapshot.is_leak_free());
}

#[test]
fn test_udp_non_trading_is_skipped_not_consumed() {
    let mut pipeline = Pipeline::new(&test_config(64, 64, 1)).unwrap();
    let capture = pipeline.capture_handle();
    let sink = CountingSink::new();
    let counts = sink.counts();
    pipeline.start(vec![Box::new(sink)]).unwrap();

    let dns = FrameSpec {
        src_addr: Ipv4Addr::new(10, 0, 0, 1),
        dst_addr: Ipv4Addr::new(10, 0, 0, 2),
        src_port: 54321,
        dst_port: 53,
        protocol: L4Protocol::Udp,
        payload: vec![0u8; 48],
    }
    .encode();
    assert_eq!(capture.ingest(&dns, None), IngestOutcome::Enqueued);

    assert!(wait_until(
        || pipeline.snapshot().parser.non_trading_skipped == 1,
        Duration::from_secs(5)
    ));

    let snapshot = pipeline.shutdown_and_join().unwrap();
    assert_eq!(snapshot.parser.non_trading_skipped, 1);
    assert_eq!(snapshot.parser.packets_parsed, 0);
    assert_eq!(counts.records(), 0);
    assert_eq!(snapshot.latency.count, 0);
    assert!(snapshot.is_leak_free());
}

/// A sink that remembers source ports so duplicate delivery is detectable.
struct PortCollector {
    seen: Arc<Mutex<Vec<u16>>>,
}

impl RecordSink for PortCollector {
    fn consume(&mut self, record: &ParsedRecord, _payload: &[u8]) {
        self.seen.lock().unwrap().push(record.src_port);
    }

    fn name(&self) -> &'static str {
        "port-collector"
    }
}

#[test]
fn test_backpressure_sheds_without_leaking_or_duplicating() {
    // Ingress ring of 16, parser not yet running: sustained overload.
    let mut pipeline = Pipeline::new(&test_config(16, 64, 1)).unwrap();
    let capture = pipeline.capture_handle();

    for i in 0..100u16 {
        capture.ingest(&nyse_fix_frame(20_000 + i), None);
    }

    let mid = pipeline.snapshot();
    assert_eq!(mid.capture.frames_ingested, 16);
    assert!(
        mid.capture.frames_shed >= 80,
        "expected >= 80 shed frames, got {}",
        mid.capture.frames_shed
    );
    assert_eq!(mid.capture.pool_exhausted, 0);

    // Bring the pipeline up and let it work off whatever was queued, then
    // drain. Every block must come home and no frame may arrive twice.
    let seen = Arc::new(Mutex::new(Vec::new()));
    pipeline
        .start(vec![Box::new(PortCollector {
            seen: Arc::clone(&seen),
        })])
        .unwrap();
    std::thread::sleep(Duration::from_millis(100));
    let snapshot = pipeline.shutdown_and_join().unwrap();

    assert!(snapshot.is_leak_free(), "blocks leaked: {:?}", snapshot.pool);

    let seen = seen.lock().unwrap();
    let mut unique = seen.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), seen.len(), "consumer saw duplicate frames");

    // Conservation: every enqueued frame was consumed, shed after parsing,
    // or drained at shutdown.
    assert_eq!(
        snapshot.capture.frames_ingested,
        snapshot.records_consumed + snapshot.records_shed + snapshot.drained
    );
}

#[test]
fn test_sustained_traffic_conserves_blocks() {
    let mut pipeline = Pipeline::new(&test_config(256, 256, 2)).unwrap();
    let capture = pipeline.capture_handle();
    let sink = CountingSink::new();
    let counts = sink.counts();
    pipeline.start(vec![Box::new(sink)]).unwrap();

    let mut offered = 0u64;
    for round in 0..5_000u16 {
        let outcome = capture.ingest(&nyse_fix_frame(10_000 + (round % 4_000)), None);
        if outcome == IngestOutcome::Enqueued {
            offered += 1;
        }
    }

    // Let the workers catch up, then drain.
    wait_until(
        || pipeline.snapshot().pool.allocated == 0,
        Duration::from_secs(10),
    );
    let snapshot = pipeline.shutdown_and_join().unwrap();

    assert!(snapshot.is_leak_free());
    assert_eq!(
        offered,
        snapshot.records_consumed + snapshot.records_shed + snapshot.drained
    );
    assert_eq!(counts.records(), snapshot.records_consumed);
    assert_eq!(snapshot.latency.count, snapshot.parser.packets_parsed);
    assert_eq!(snapshot.pool.total_allocations, snapshot.pool.total_deallocations);
}

#[test]
fn test_shutdown_drains_inflight_frames() {
    let mut pipeline = Pipeline::new(&test_config(128, 128, 1)).unwrap();
    let capture = pipeline.capture_handle();

    // Queue frames before any worker exists, then start and stop at once:
    // everything in flight must be released, parsed or not.
    for i in 0..50u16 {
        assert_eq!(
            capture.ingest(&nyse_fix_frame(30_000 + i), None),
            IngestOutcome::Enqueued
        );
    }
    pipeline.start(vec![Box::new(CountingSink::new())]).unwrap();
    let snapshot = pipeline.shutdown_and_join().unwrap();

    assert!(snapshot.is_leak_free());
    assert_eq!(
        snapshot.capture.frames_ingested,
        snapshot.records_consumed + snapshot.records_shed + snapshot.drained
    );
}

#[test]
fn test_capture_refused_after_shutdown() {
    let mut pipeline = Pipeline::new(&test_config(64, 64, 1)).unwrap();
    let capture = pipeline.capture_handle();
    pipeline.start(vec![Box::new(CountingSink::new())]).unwrap();
    pipeline.trigger_shutdown();

    assert_eq!(
        capture.ingest(&nyse_fix_frame(1_000), None),
        IngestOutcome::ShuttingDown
    );
    let snapshot = pipeline.shutdown_and_join().unwrap();
    assert_eq!(snapshot.capture.frames_ingested, 0);
    assert!(snapshot.is_leak_free());
}

#[test]
fn test_multiple_capture_sources_and_sinks() {
    let mut pipeline = Pipeline::new(&test_config(256, 256, 2)).unwrap();
    let nyse_uplink = pipeline.capture_handle();
    let nasdaq_uplink = pipeline.capture_handle();

    let sink_a = CountingSink::new();
    let sink_b = CountingSink::new();
    let counts_a = sink_a.counts();
    let counts_b = sink_b.counts();
    pipeline
        .start(vec![Box::new(sink_a), Box::new(sink_b)])
        .unwrap();

    for i in 0..200u16 {
        nyse_uplink.ingest(&nyse_fix_frame(10_000 + i), None);
        let nasdaq = FrameSpec {
            src_addr: Ipv4Addr::new(10, 2, 0, 1),
            dst_addr: Ipv4Addr::new(10, 2, 0, 2),
            src_port: 11_000 + i,
            dst_port: 4002,
            protocol: L4Protocol::Udp,
            payload: vec![0u8; 64],
        }
        .encode();
        nasdaq_uplink.ingest(&nasdaq, None);
    }

    wait_until(
        || pipeline.snapshot().pool.allocated == 0,
        Duration::from_secs(10),
    );

    // Both exchanges showed up in the latency tracker, tagged separately.
    let nyse = pipeline.tracker().stats_by_exchange(1);
    let nasdaq = pipeline.tracker().stats_by_exchange(2);
    assert!(nyse.count > 0);
    assert!(nasdaq.count > 0);
    assert_eq!(nyse.target_us, 500.0);
    assert_eq!(nasdaq.target_us, 600.0);

    let snapshot = pipeline.shutdown_and_join().unwrap();

    assert!(snapshot.is_leak_free());
    // Each record goes to exactly one competing sink.
    assert_eq!(
        counts_a.records() + counts_b.records(),
        snapshot.records_consumed
    );
    assert_eq!(snapshot.latency.count, nyse.count + nasdaq.count);
}
