//! Bounded lock-free MPMC ring queue
//!
//! Vyukov-style bounded MPMC: every slot carries a sequence number that
//! encodes which lap of the ring it belongs to. Producers claim a slot when
//! `slot.seq == head`, publish with `seq = head + 1`; consumers claim when
//! `slot.seq == tail + 1` and recycle with `seq = tail + capacity`. Payload
//! writes happen-before the publishing sequence store (Release) and payload
//! reads happen-after the acquiring sequence load (Acquire).
//!
//! The queue never blocks. A failed push is a normal-flow back-pressure
//! signal handled by the pipeline layer (spin, yield, then shed); blocking
//! and wakeups have no place on the hot path.
//!
//! FIFO holds per producer/consumer pair; no ordering relates items from
//! distinct producers.

use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

struct Slot<T> {
    seq: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Copyable queue statistics. `len` may be stale under contention; the
/// lifetime counters are exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub capacity: usize,
    pub len: usize,
    pub enqueued: u64,
    pub dequeued: u64,
    pub failed_pushes: u64,
    pub failed_pops: u64,
}

/// Bounded MPMC queue of `T`.
pub struct MpmcQueue<T> {
    buffer: Box<[Slot<T>]>,
    mask: usize,
    /// Next position a producer will claim.
    head: CachePadded<AtomicUsize>,
    /// Next position a consumer will claim.
    tail: CachePadded<AtomicUsize>,
    enqueued: CachePadded<AtomicU64>,
    dequeued: CachePadded<AtomicU64>,
    failed_pushes: AtomicU64,
    failed_pops: AtomicU64,
}

// SAFETY: slot access is serialized per-slot by the sequence protocol; a
// payload is written by exactly one producer before its publishing store and
// read by exactly one consumer after its acquiring load.
unsafe impl<T: Send> Send for MpmcQueue<T> {}
unsafe impl<T: Send> Sync for MpmcQueue<T> {}

impl<T> MpmcQueue<T> {
    /// Create a queue with the given capacity.
    ///
    /// # Panics
    ///
    /// The capacity must be a power of two and at least 2 so slot indexing
    /// can use `pos & mask`. Passing anything else is a programmer bug; the
    /// config layer rounds operator-supplied capacities up before this runs.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "queue capacity must be a power of two >= 2, got {}",
            capacity
        );

        let buffer: Box<[Slot<T>]> = (0..capacity)
            .map(|i| Slot {
                seq: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Self {
            buffer,
            mask: capacity - 1,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            enqueued: CachePadded::new(AtomicU64::new(0)),
            dequeued: CachePadded::new(AtomicU64::new(0)),
            failed_pushes: AtomicU64::new(0),
            failed_pops: AtomicU64::new(0),
        }
    }

    /// Enqueue without blocking.
    ///
    /// Returns the value back on a full queue so the caller can shed or
    /// retry; a full queue is a back-pressure signal, not an error.
    #[inline]
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let mut pos = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let dif = seq as isize - pos as isize;

            if dif == 0 {
                // Slot is free on this lap; claim it.
                match self.head.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS gives this producer sole write
                        // access to the slot until the sequence store below.
                        unsafe { (*slot.value.get()).write(value) };
                        slot.seq.store(pos.wrapping_add(1), Ordering::Release);
                        self.enqueued.fetch_add(1, Ordering::Relaxed);
                        return Ok(());
                    }
                    Err(observed) => pos = observed,
                }
            } else if dif < 0 {
                // Slot still holds last lap's item: the ring is full.
                self.failed_pushes.fetch_add(1, Ordering::Relaxed);
                return Err(value);
            } else {
                // Another producer claimed this position; chase the head.
                pos = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Dequeue without blocking. `None` means empty.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        let mut pos = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.buffer[pos & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let dif = seq as isize - pos.wrapping_add(1) as isize;

            if dif == 0 {
                match self.tail.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS gives this consumer sole read
                        // access; the producer's Release store made the
                        // payload visible to our Acquire load above.
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.seq
                            .store(pos.wrapping_add(self.capacity()), Ordering::Release);
                        self.dequeued.fetch_add(1, Ordering::Relaxed);
                        return Some(value);
                    }
                    Err(observed) => pos = observed,
                }
            } else if dif < 0 {
                // Slot not yet published on this lap: the ring is empty.
                self.failed_pops.fetch_add(1, Ordering::Relaxed);
                return None;
            } else {
                pos = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Ring capacity.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Approximate occupancy; may be stale under contention.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        head.wrapping_sub(tail).min(self.capacity())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Occupancy as a fraction of capacity, `0.0..=1.0`.
    #[inline]
    pub fn fill_ratio(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    /// Copy out the counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            capacity: self.capacity(),
            len: self.len(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            failed_pushes: self.failed_pushes.load(Ordering::Relaxed),
            failed_pops: self.failed_pops.load(Ordering::Relaxed),
        }
    }

    /// Zero the lifetime counters.
    pub fn reset_stats(&self) {
        self.enqueued.store(0, Ordering::Relaxed);
        self.dequeued.store(0, Ordering::Relaxed);
        self.failed_pushes.store(0, Ordering::Relaxed);
        self.failed_pops.store(0, Ordering::Relaxed);
    }
}

impl<T> Drop for MpmcQueue<T> {
    fn drop(&mut self) {
        // Drain whatever was published but never consumed so payload drops
        // run exactly once.
        while self.try_pop().is_some() {}
    }
}
