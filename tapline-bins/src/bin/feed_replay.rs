//! Synthetic exchange feed replay
//!
//! Generates NYSE/NASDAQ/CBOE FIX-over-TCP and UDP market-data frames at a
//! configurable rate, drives them through the full pipeline, and prints the
//! core snapshot on exit. Useful for smoke-testing a deployment's
//! throughput, shed behavior, and latency accounting without a live uplink.

use anyhow::Result;
use clap::Parser;
use rand::Rng;
use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tapline_bins::common::{self, CommonArgs};
use tapline_core::core::L4Protocol;
use tapline_core::frames::{fix_heartbeat, FrameSpec};
use tapline_core::pipeline::{CountingSink, Pipeline};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Frames per second to offer to the capture edge
    #[arg(short, long, default_value = "10000")]
    rate: u64,

    /// Seconds to run; 0 runs until Ctrl-C
    #[arg(short, long, default_value = "10")]
    duration: u64,

    /// Fraction of frames that are non-trading noise (DNS-style UDP)
    #[arg(long, default_value = "0.05")]
    noise: f64,

    /// Override the configured parser worker count
    #[arg(short, long)]
    workers: Option<usize>,
}

/// Rotating set of feed endpoints: (dst port, transport, FIX payload?).
const FEEDS: &[(u16, L4Protocol, bool)] = &[
    (4001, L4Protocol::Tcp, true),  // NYSE order entry
    (9001, L4Protocol::Udp, false), // NYSE market data
    (4002, L4Protocol::Tcp, true),  // NASDAQ order entry
    (9002, L4Protocol::Udp, false), // NASDAQ market data
    (4003, L4Protocol::Tcp, true),  // CBOE order entry
    (9003, L4Protocol::Udp, false), // CBOE market data
];

fn main() -> Result<()> {
    let args = Args::parse();
    common::init_logging(&args.common)?;

    let mut config = args.common.load_config()?;
    if let Some(workers) = args.workers {
        config.orchestrator.parser_workers = workers;
    }

    let mut pipeline = Pipeline::new(&config)?;
    let capture = pipeline.capture_handle();
    let sink = CountingSink::new();
    let counts = sink.counts();
    pipeline.start(vec![Box::new(sink)])?;

    let shutdown = pipeline.shutdown_flag();
    let ctrlc_flag = shutdown.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        tracing::warn!("interrupt received, draining pipeline");
        ctrlc_flag.store(true, Ordering::Release);
    }) {
        tracing::warn!(%err, "no Ctrl-C handler; stop via --duration only");
    }

    common::setup_performance(&args.common)?;

    tracing::info!(
        rate = args.rate,
        duration = args.duration,
        noise = args.noise,
        "replay started"
    );

    let period = Duration::from_nanos(1_000_000_000 / args.rate.max(1));
    let started = Instant::now();
    let mut next_send = Instant::now();
    let mut rng = rand::thread_rng();
    let mut frame_buf = Vec::with_capacity(2048);
    let mut seq = 0u64;
    let mut offered = 0u64;

    while !shutdown.load(Ordering::Acquire) {
        if args.duration > 0 && started.elapsed() >= Duration::from_secs(args.duration) {
            break;
        }

        seq += 1;
        let spec = if rng.gen_bool(args.noise.clamp(0.0, 1.0)) {
            // Background noise the parser must skip.
            FrameSpec {
                src_addr: Ipv4Addr::new(192, 168, 0, 9),
                dst_addr: Ipv4Addr::new(192, 168, 0, 1),
                src_port: 40_000 + (seq % 1_000) as u16,
                dst_port: 53,
                protocol: L4Protocol::Udp,
                payload: vec![0u8; rng.gen_range(32..128)],
            }
        } else {
            let (dst_port, protocol, is_fix) = FEEDS[(seq % FEEDS.len() as u64) as usize];
            FrameSpec {
                src_addr: Ipv4Addr::new(10, 0, 0, 1),
                dst_addr: Ipv4Addr::new(10, 0, 0, 2),
                src_port: 30_000 + (seq % 10_000) as u16,
                dst_port,
                protocol,
                payload: if is_fix {
                    fix_heartbeat(seq)
                } else {
                    vec![0x5A; rng.gen_range(64..512)]
                },
            }
        };
        spec.encode_into(&mut frame_buf);
        capture.ingest(&frame_buf, None);
        offered += 1;

        // Pace the offered rate; sleeping here is fine, this is the load
        // generator, not the hot path under test.
        next_send += period;
        let now = Instant::now();
        if next_send > now {
            std::thread::sleep(next_send - now);
        } else {
            // Fell behind; re-anchor instead of bursting to catch up.
            next_send = now;
        }
    }

    let elapsed = started.elapsed();
    let snapshot = pipeline.shutdown_and_join()?;

    tracing::info!(
        offered,
        consumed = counts.records(),
        fix = counts.fix_records(),
        secs = elapsed.as_secs_f64(),
        rate = (offered as f64 / elapsed.as_secs_f64()) as u64,
        "replay finished"
    );
    common::print_snapshot(&snapshot);

    Ok(())
}
