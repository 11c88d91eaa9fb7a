//! Fixed-block memory pool with a lock-free free list
//!
//! Pre-reserves one contiguous arena and carves it into equal power-of-two
//! blocks. Acquire and release are O(1): a Treiber-style stack threaded
//! through a descriptor array by index, with the head packed as
//! `(tag, index)` in a single `AtomicU64` so the tag defeats ABA when
//! producers and consumers recycle blocks concurrently.
//!
//! General-purpose allocators are banned on the hot path: their tail
//! latencies are unbounded. The fixed-block design caps the worst case at
//! one CAS retry loop and eliminates fragmentation outright.
//!
//! Ownership: a block is either on the free list or held by exactly one
//! [`BlockHandle`]. Handles are move-only, so double-release is impossible
//! through the safe API; the `in_use` flag still backstops the invariant and
//! counts any violation that reaches `release`.

mod arena;

use crate::core::PoolError;
use arena::Arena;
use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Free-list terminator.
const NULL_INDEX: u32 = u32::MAX;

/// Exclusive handle to one pool block.
///
/// Move-only by construction; the owner must hand it back via
/// [`BlockPool::release`] exactly once. Failure to release leaks the block
/// until the pool is dropped.
#[derive(Debug)]
pub struct BlockHandle {
    index: u32,
    ptr: *mut u8,
    len: usize,
}

impl BlockHandle {
    /// Index of the block inside the pool, `[0, capacity)`.
    #[inline(always)]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Block length in bytes (always the pool's block size).
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The block's bytes.
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the pool guarantees exclusive ownership of this region
        // while the handle is outstanding.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// The block's bytes, writable.
    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, plus &mut self gives unique access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

// SAFETY: a handle is an exclusive capability over its block region; moving
// it across threads moves that exclusivity with it.
unsafe impl Send for BlockHandle {}

/// Per-block descriptor. `next` threads the free list while the block is
/// free; `in_use` mirrors which side owns the block.
#[derive(Debug)]
struct BlockDesc {
    next: AtomicU32,
    in_use: AtomicBool,
}

/// Copyable pool statistics.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Total number of blocks
    pub capacity: u32,
    /// Block size in bytes
    pub block_size: usize,
    /// Blocks currently handed out
    pub allocated: u32,
    /// Blocks currently on the free list
    pub free: u32,
    /// Lifetime successful acquires
    pub total_allocations: u64,
    /// Lifetime releases
    pub total_deallocations: u64,
    /// Acquires that found the pool empty
    pub exhaustion_failures: u64,
    /// Releases that failed the ownership check (programmer bug)
    pub contract_violations: u64,
}

impl PoolStats {
    /// Fraction of blocks currently handed out, `0.0..=1.0`.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.allocated as f64 / self.capacity as f64
        }
    }

    /// True when more than 90% of blocks are outstanding.
    pub fn is_near_exhaustion(&self) -> bool {
        self.utilization() > 0.9
    }
}

/// The fixed-block pool.
pub struct BlockPool {
    arena: Arena,
    descs: Box<[BlockDesc]>,
    /// Packed `(tag << 32) | index` head of the free stack.
    free_head: CachePadded<AtomicU64>,
    block_size: usize,
    num_blocks: u32,
    allocated: CachePadded<AtomicU32>,
    total_allocations: AtomicU64,
    total_deallocations: AtomicU64,
    exhaustion_failures: AtomicU64,
    contract_violations: AtomicU64,
}

#[inline(always)]
fn pack(index: u32, tag: u32) -> u64 {
    ((tag as u64) << 32) | index as u64
}

#[inline(always)]
fn unpack(word: u64) -> (u32, u32) {
    (word as u32, (word >> 32) as u32)
}

impl BlockPool {
    /// Reserve `pool_bytes / block_bytes` blocks of `block_bytes` each.
    ///
    /// `block_bytes` must be a non-zero power of two (the config layer
    /// rounds odd sizes up before this is reached); any remainder of
    /// `pool_bytes` that cannot form a whole block is not reserved.
    /// Reservation failure is fatal and surfaced to the caller.
    pub fn new(pool_bytes: usize, block_bytes: usize, mapped: bool) -> Result<Self, PoolError> {
        if block_bytes == 0 || !block_bytes.is_power_of_two() || pool_bytes < block_bytes {
            return Err(PoolError::InvalidGeometry {
                pool_bytes,
                block_bytes,
            });
        }
        let num_blocks = pool_bytes / block_bytes;
        if num_blocks >= NULL_INDEX as usize {
            return Err(PoolError::TooManyBlocks {
                requested: num_blocks,
            });
        }

        let arena = Arena::reserve(num_blocks * block_bytes, block_bytes, mapped)?;

        // Thread the free list front to back: block i -> i + 1.
        let descs: Box<[BlockDesc]> = (0..num_blocks as u32)
            .map(|i| BlockDesc {
                next: AtomicU32::new(if i + 1 < num_blocks as u32 {
                    i + 1
                } else {
                    NULL_INDEX
                }),
                in_use: AtomicBool::new(false),
            })
            .collect();

        tracing::debug!(
            num_blocks,
            block_bytes,
            mapped = arena.is_mapped(),
            "block pool reserved"
        );

        Ok(Self {
            arena,
            descs,
            free_head: CachePadded::new(AtomicU64::new(pack(0, 0))),
            block_size: block_bytes,
            num_blocks: num_blocks as u32,
            allocated: CachePadded::new(AtomicU32::new(0)),
            total_allocations: AtomicU64::new(0),
            total_deallocations: AtomicU64::new(0),
            exhaustion_failures: AtomicU64::new(0),
            contract_violations: AtomicU64::new(0),
        })
    }

    /// Pop one block from the free list.
    ///
    /// Returns `None` on exhaustion; that is expected under overload and is
    /// counted, never fatal.
    #[inline]
    pub fn acquire(&self) -> Option<BlockHandle> {
        let mut head = self.free_head.load(Ordering::Acquire);
        loop {
            let (index, tag) = unpack(head);
            if index == NULL_INDEX {
                self.exhaustion_failures.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            let next = self.descs[index as usize].next.load(Ordering::Relaxed);
            match self.free_head.compare_exchange_weak(
                head,
                pack(next, tag.wrapping_add(1)),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.descs[index as usize]
                        .in_use
                        .store(true, Ordering::Relaxed);
                    self.allocated.fetch_add(1, Ordering::Relaxed);
                    self.total_allocations.fetch_add(1, Ordering::Relaxed);
                    return Some(BlockHandle {
                        index,
                        // SAFETY: index < num_blocks, so the offset stays
                        // inside the arena reservation.
                        ptr: unsafe {
                            self.arena.base().add(index as usize * self.block_size)
                        },
                        len: self.block_size,
                    });
                }
                Err(observed) => {
                    head = observed;
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Push a block back onto the free list.
    ///
    /// The payload is zeroed before the block becomes acquirable again; the
    /// arena may be reused across trust domains.
    #[inline]
    pub fn release(&self, mut handle: BlockHandle) {
        let index = handle.index;
        let expected_ptr = if index < self.num_blocks {
            // SAFETY: in-bounds offset computation only.
            unsafe { self.arena.base().add(index as usize * self.block_size) }
        } else {
            std::ptr::null_mut()
        };
        if handle.ptr != expected_ptr
            || !self.descs[index as usize].in_use.swap(false, Ordering::Relaxed)
        {
            // Not a handle this pool issued, or the slot is already free.
            self.contract_violations.fetch_add(1, Ordering::Relaxed);
            debug_assert!(false, "release of a foreign or already-free block {}", index);
            return;
        }

        handle.as_mut_slice().fill(0);

        let mut head = self.free_head.load(Ordering::Acquire);
        loop {
            let (head_index, tag) = unpack(head);
            self.descs[index as usize]
                .next
                .store(head_index, Ordering::Relaxed);
            match self.free_head.compare_exchange_weak(
                head,
                pack(index, tag.wrapping_add(1)),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => {
                    head = observed;
                    std::hint::spin_loop();
                }
            }
        }

        self.allocated.fetch_sub(1, Ordering::Relaxed);
        self.total_deallocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Fault the whole arena in ahead of traffic.
    ///
    /// Skipped with a warning if blocks are outstanding; prefault writes
    /// would race with their owners.
    pub fn prefault(&self) {
        if self.allocated.load(Ordering::Relaxed) != 0 {
            tracing::warn!("prefault skipped: blocks are outstanding");
            return;
        }
        self.arena.prefault();
        tracing::debug!(bytes = self.arena.len(), "arena prefaulted");
    }

    /// Block size in bytes.
    #[inline(always)]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Total number of blocks.
    #[inline(always)]
    pub fn capacity(&self) -> u32 {
        self.num_blocks
    }

    /// Blocks currently handed out.
    #[inline(always)]
    pub fn allocated(&self) -> u32 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Base address of the arena; used by tests to check containment.
    pub fn arena_base(&self) -> *const u8 {
        self.arena.base()
    }

    /// Copy out the counters.
    pub fn stats(&self) -> PoolStats {
        let allocated = self.allocated.load(Ordering::Relaxed);
        PoolStats {
            capacity: self.num_blocks,
            block_size: self.block_size,
            allocated,
            free: self.num_blocks - allocated,
            total_allocations: self.total_allocations.load(Ordering::Relaxed),
            total_deallocations: self.total_deallocations.load(Ordering::Relaxed),
            exhaustion_failures: self.exhaustion_failures.load(Ordering::Relaxed),
            contract_violations: self.contract_violations.load(Ordering::Relaxed),
        }
    }

    /// Zero the lifetime counters. Occupancy gauges are left alone.
    pub fn reset_stats(&self) {
        self.total_allocations.store(0, Ordering::Relaxed);
        self.total_deallocations.store(0, Ordering::Relaxed);
        self.exhaustion_failures.store(0, Ordering::Relaxed);
        self.contract_violations.store(0, Ordering::Relaxed);
    }
}

// SAFETY: block ownership is handed over through the free-list CAS protocol;
// descriptor and counter state is all atomic.
unsafe impl Send for BlockPool {}
unsafe impl Sync for BlockPool {}
