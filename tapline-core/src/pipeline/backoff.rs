//! Push back-pressure discipline: bounded spin, short yield, then shed
//!
//! Queues in this pipeline never block, so pressure is absorbed at the
//! producer: a bounded exponential spin (CPU pause hint), a few scheduler
//! yields, and then the caller sheds the item. Shed mode is sticky with
//! hysteresis so an overloaded stage drops cheaply instead of hammering a
//! full ring, and clears only once the consumer has genuinely caught up.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Tunable knobs for one push attempt. Mirrors the orchestrator config.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Total bounded attempts before the caller sheds.
    pub spins: u32,
    /// Attempt number after which spinning turns into yielding.
    pub yield_after: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            spins: 64,
            yield_after: 32,
        }
    }
}

/// One bounded backoff episode. Reset between items.
#[derive(Debug)]
pub struct PushBackoff {
    policy: BackoffPolicy,
    step: u32,
}

impl PushBackoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, step: 0 }
    }

    /// Wait a little before the next retry.
    ///
    /// Returns `false` once the episode is exhausted; the caller must then
    /// shed rather than keep waiting.
    #[inline]
    pub fn wait(&mut self) -> bool {
        if self.step >= self.policy.spins {
            return false;
        }
        if self.step < self.policy.yield_after {
            // Exponential pause burst, capped so one wait stays short.
            for _ in 0..(1u32 << self.step.min(6)) {
                std::hint::spin_loop();
            }
        } else {
            std::thread::yield_now();
        }
        self.step += 1;
        true
    }

    /// Start a fresh episode.
    #[inline(always)]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

/// Sticky shed state with hysteresis.
///
/// Opens when the observed fill ratio exceeds the high watermark (or when a
/// push episode exhausts outright) and clears only below the low watermark.
/// One gate per producer edge: an overloaded uplink must not force a healthy
/// one into shed mode.
#[derive(Debug)]
pub struct ShedGate {
    active: AtomicBool,
    high: f64,
    low: f64,
    label: &'static str,
    transitions: AtomicU64,
}

impl ShedGate {
    pub fn new(high: f64, low: f64, label: &'static str) -> Self {
        debug_assert!(low < high, "shed watermarks inverted");
        Self {
            active: AtomicBool::new(false),
            high,
            low,
            label,
            transitions: AtomicU64::new(0),
        }
    }

    /// Feed the current fill ratio and learn whether to shed.
    #[inline]
    pub fn update(&self, fill: f64) -> bool {
        if self.active.load(Ordering::Relaxed) {
            if fill < self.low {
                self.active.store(false, Ordering::Relaxed);
                self.transitions.fetch_add(1, Ordering::Relaxed);
                tracing::info!(stage = self.label, fill, "shed mode cleared");
                false
            } else {
                true
            }
        } else if fill > self.high {
            self.open(fill);
            true
        } else {
            false
        }
    }

    /// Force shed mode open (push episode exhausted against a full ring).
    #[inline]
    pub fn open(&self, fill: f64) {
        if !self.active.swap(true, Ordering::Relaxed) {
            self.transitions.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(stage = self.label, fill, "shed mode entered");
        }
    }

    /// Whether the gate is currently shedding.
    #[inline(always)]
    pub fn is_shedding(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Open/clear transition count, for the metrics surface.
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_bounded() {
        let mut backoff = PushBackoff::new(BackoffPolicy {
            spins: 8,
            yield_after: 4,
        });
        let mut waits = 0;
        while backoff.wait() {
            waits += 1;
        }
        assert_eq!(waits, 8);
        // Exhausted episodes stay exhausted until reset.
        assert!(!backoff.wait());
        backoff.reset();
        assert!(backoff.wait());
    }

    #[test]
    fn test_shed_hysteresis() {
        let gate = ShedGate::new(0.9, 0.7, "test");
        assert!(!gate.update(0.5));
        assert!(!gate.update(0.9)); // at, not above, the high watermark
        assert!(gate.update(0.95)); // opens
        assert!(gate.update(0.8)); // between watermarks: stays open
        assert!(gate.update(0.7)); // at the low watermark: still open
        assert!(!gate.update(0.65)); // below: clears
        assert!(!gate.update(0.8)); // between watermarks: stays clear
        assert_eq!(gate.transitions(), 2);
    }

    #[test]
    fn test_forced_open() {
        let gate = ShedGate::new(0.9, 0.7, "test");
        gate.open(1.0);
        assert!(gate.is_shedding());
        // Repeat opens do not double-count transitions.
        gate.open(1.0);
        assert_eq!(gate.transitions(), 1);
        assert!(!gate.update(0.1));
        assert_eq!(gate.transitions(), 2);
    }
}
