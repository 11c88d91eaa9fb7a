//! Process-monotonic nanosecond clock
//!
//! Capture sources that supply their own timestamps are authoritative; this
//! clock only backstops frames that arrive without one, and stamps the
//! receive side of latency measurements. A monotonic source is used so
//! latency deltas never go negative under wall-clock adjustments.

use std::sync::OnceLock;
use std::time::Instant;

static ANCHOR: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds elapsed since the clock was first touched.
///
/// The anchor is established lazily on first call; call [`calibrate`] during
/// startup so the first hot-path read does not pay for initialization.
#[inline(always)]
pub fn monotonic_ns() -> u64 {
    ANCHOR.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// Establish the clock anchor eagerly.
pub fn calibrate() {
    let _ = monotonic_ns();
}
