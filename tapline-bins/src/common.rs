//! Common utilities for all binaries
//!
//! Shared CLI arguments, logging setup, performance tuning, and the final
//! snapshot report.

use anyhow::Result;
use clap::Parser;
use tapline_core::monitoring::CoreSnapshot;

/// CLI arguments every Tapline binary accepts.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CommonArgs {
    /// Path to a TOML config; defaults are used when omitted
    #[arg(short = 'f', long)]
    pub config: Option<std::path::PathBuf>,

    /// CPU core to pin the capture thread to
    #[arg(short = 'c', long)]
    pub cpu_core: Option<usize>,

    /// Enable SCHED_FIFO real-time priority (needs privileges)
    #[arg(long)]
    pub realtime: bool,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit JSON logs
    #[arg(long)]
    pub json_logs: bool,
}

impl CommonArgs {
    /// Load the core configuration this invocation asked for.
    pub fn load_config(&self) -> Result<tapline_core::CoreConfig> {
        match &self.config {
            Some(path) => tapline_core::CoreConfig::load(path),
            None => Ok(tapline_core::CoreConfig::default()),
        }
    }
}

/// Initialize tracing for a binary.
pub fn init_logging(args: &CommonArgs) -> Result<()> {
    tapline_core::utils::init_logging(&args.log_level, args.json_logs)
}

/// Apply CPU pinning and real-time priority to the calling thread.
pub fn setup_performance(args: &CommonArgs) -> Result<()> {
    if let Some(core) = args.cpu_core {
        tapline_core::perf::pin_to_core(core)?;
    }

    if args.realtime {
        tapline_core::perf::set_realtime_priority(50)?;
    }

    Ok(())
}

/// Print the final core snapshot.
pub fn print_snapshot(snapshot: &CoreSnapshot) {
    tracing::info!("=== Core Snapshot ===");
    tracing::info!(
        "capture: ingested={} shed={} pool_exhausted={} oversize={}",
        snapshot.capture.frames_ingested,
        snapshot.capture.frames_shed,
        snapshot.capture.pool_exhausted,
        snapshot.capture.oversize_frames
    );
    tracing::info!(
        "parser: parsed={} skipped={} rejected={} bytes={}",
        snapshot.parser.packets_parsed,
        snapshot.parser.non_trading_skipped,
        snapshot.parser.malformed_rejected,
        snapshot.parser.bytes_processed
    );
    tracing::info!(
        "delivery: consumed={} record_shed={} drained={}",
        snapshot.records_consumed,
        snapshot.records_shed,
        snapshot.drained
    );
    tracing::info!(
        "pool: capacity={} allocated={} allocs={} frees={} violations={}",
        snapshot.pool.capacity,
        snapshot.pool.allocated,
        snapshot.pool.total_allocations,
        snapshot.pool.total_deallocations,
        snapshot.pool.contract_violations
    );
    tracing::info!(
        "rings: ingress {}/{} (failed pushes {}), egress {}/{} (failed pushes {})",
        snapshot.ingress.len,
        snapshot.ingress.capacity,
        snapshot.ingress.failed_pushes,
        snapshot.egress.len,
        snapshot.egress.capacity,
        snapshot.egress.failed_pushes
    );
    tracing::info!(
        "latency: count={} mean={:.1}us p50={:.1}us p99={:.1}us p99.9={:.1}us max={:.1}us violations={:.2}%",
        snapshot.latency.count,
        snapshot.latency.mean_us,
        snapshot.latency.p50_us,
        snapshot.latency.p99_us,
        snapshot.latency.p99_9_us,
        snapshot.latency.max_us,
        snapshot.latency.violation_rate * 100.0
    );

    if !snapshot.is_leak_free() {
        tracing::error!(leaked = snapshot.pool.allocated, "blocks not returned to pool");
    }
}
