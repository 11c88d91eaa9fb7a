//! Backing storage for the fixed-block pool
//!
//! One contiguous reservation, either from the global allocator or from an
//! anonymous `mmap` region (`use_mapped_arena`). The arena hands out nothing
//! itself; the pool carves it into blocks and coordinates aliasing.

use crate::core::PoolError;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

/// Assumed page size for prefaulting. Matches every platform this runs on;
/// a larger real page only makes prefault touch some pages twice.
pub(crate) const PAGE_SIZE: usize = 4096;

pub(crate) struct Arena {
    ptr: NonNull<u8>,
    len: usize,
    /// Present for heap reservations, `None` for mapped ones.
    layout: Option<Layout>,
}

impl Arena {
    /// Reserve `len` zeroed bytes, aligned to `align` (heap) or the page
    /// size (mapped). Reservation failure is fatal at startup.
    pub(crate) fn reserve(len: usize, align: usize, mapped: bool) -> Result<Self, PoolError> {
        if mapped {
            Self::reserve_mapped(len)
        } else {
            Self::reserve_heap(len, align)
        }
    }

    fn reserve_heap(len: usize, align: usize) -> Result<Self, PoolError> {
        let layout = Layout::from_size_align(len, align).map_err(|_| {
            PoolError::ArenaReservation { bytes: len, mapped: false }
        })?;
        // SAFETY: layout has non-zero size, validated by the pool geometry.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw)
            .ok_or(PoolError::ArenaReservation { bytes: len, mapped: false })?;
        Ok(Self {
            ptr,
            len,
            layout: Some(layout),
        })
    }

    fn reserve_mapped(len: usize) -> Result<Self, PoolError> {
        // Round the mapping up to whole pages; the pool only uses `len`.
        let map_len = len.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        // SAFETY: anonymous private mapping, no fd, offset 0.
        let raw = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(PoolError::ArenaReservation { bytes: len, mapped: true });
        }
        Ok(Self {
            ptr: NonNull::new(raw as *mut u8)
                .ok_or(PoolError::ArenaReservation { bytes: len, mapped: true })?,
            len: map_len,
            layout: None,
        })
    }

    #[inline(always)]
    pub(crate) fn base(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_mapped(&self) -> bool {
        self.layout.is_none()
    }

    /// Touch one byte per page so the region is faulted in before traffic.
    ///
    /// Must only run while no blocks are outstanding; the pool enforces
    /// that before delegating here.
    pub(crate) fn prefault(&self) {
        let base = self.ptr.as_ptr();
        let mut offset = 0;
        while offset < self.len {
            // SAFETY: offset < len, region is writable, and the caller
            // guarantees no block aliases the arena during prefault.
            unsafe { std::ptr::write_volatile(base.add(offset), 0) };
            offset += PAGE_SIZE;
        }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        match self.layout {
            // SAFETY: same pointer/layout pair produced by reserve_heap.
            Some(layout) => unsafe { dealloc(self.ptr.as_ptr(), layout) },
            // SAFETY: same pointer/length pair produced by reserve_mapped.
            None => unsafe {
                libc::munmap(self.ptr.as_ptr().cast(), self.len);
            },
        }
    }
}

// SAFETY: the arena is a passive reservation; all aliasing of its bytes is
// serialized by the pool's free-list protocol.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_reserve_zeroed() {
        let arena = Arena::reserve(8192, 1024, false).unwrap();
        assert_eq!(arena.len(), 8192);
        assert!(!arena.is_mapped());
        for i in (0..8192).step_by(512) {
            // SAFETY: in-bounds read of the freshly reserved region.
            assert_eq!(unsafe { *arena.base().add(i) }, 0);
        }
    }

    #[test]
    fn test_mapped_reserve_rounds_to_pages() {
        let arena = Arena::reserve(5000, 1024, true).unwrap();
        assert!(arena.is_mapped());
        assert_eq!(arena.len(), 2 * PAGE_SIZE);
    }

    #[test]
    fn test_prefault_does_not_disturb_contents() {
        let arena = Arena::reserve(4 * PAGE_SIZE, 4096, true).unwrap();
        arena.prefault();
        for i in (0..arena.len()).step_by(PAGE_SIZE) {
            // SAFETY: in-bounds read.
            assert_eq!(unsafe { *arena.base().add(i) }, 0);
        }
    }
}
