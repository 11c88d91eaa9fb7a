//! Consumer sinks
//!
//! A sink sees each classified record exactly once, together with the frame
//! bytes still resident in the pool block. The consumer loop owns the block
//! handle and releases it back to the pool after `consume` returns, so sinks
//! never manage block lifetime themselves.

use crate::core::ParsedRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Downstream consumer of classified packets.
///
/// Implementations must not block for long; a slow sink backs the egress
/// ring up and pushes the parser workers into shed mode.
pub trait RecordSink: Send {
    /// Handle one record. `payload` is the full captured frame.
    fn consume(&mut self, record: &ParsedRecord, payload: &[u8]);

    /// Sink name for logging.
    fn name(&self) -> &'static str;
}

/// Shared counters behind a [`CountingSink`].
#[derive(Debug, Default)]
pub struct SinkCounts {
    records: AtomicU64,
    fix_records: AtomicU64,
    payload_bytes: AtomicU64,
}

impl SinkCounts {
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    pub fn fix_records(&self) -> u64 {
        self.fix_records.load(Ordering::Relaxed)
    }

    pub fn payload_bytes(&self) -> u64 {
        self.payload_bytes.load(Ordering::Relaxed)
    }
}

/// Minimal sink that counts what it sees. Used by the replay binary and the
/// integration tests; real deployments hang analytics off this trait.
#[derive(Debug, Default)]
pub struct CountingSink {
    counts: Arc<SinkCounts>,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle the caller keeps to observe the counts after `start` takes
    /// ownership of the sink.
    pub fn counts(&self) -> Arc<SinkCounts> {
        Arc::clone(&self.counts)
    }
}

impl RecordSink for CountingSink {
    fn consume(&mut self, record: &ParsedRecord, payload: &[u8]) {
        self.counts.records.fetch_add(1, Ordering::Relaxed);
        if record.is_fix {
            self.counts.fix_records.fetch_add(1, Ordering::Relaxed);
        }
        self.counts
            .payload_bytes
            .fetch_add(payload.len() as u64, Ordering::Relaxed);
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}
