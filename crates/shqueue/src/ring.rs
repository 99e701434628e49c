//! The wait-free SPSC byte ring protocol.
//!
//! Operates purely on a borrowed [`ControlBlock`] and a raw pointer into the
//! (double-mapped) data region — it has no idea whether that memory came
//! from `shm_open`, `memfd_create`, or a test harness's `Vec<u8>`. Same
//! reserve/commit/advance shape and Acquire/Release handoff as a typed
//! slot ring, but byte-sliced rather than slot-typed, and exploiting the
//! double mapping so that a reservation spanning the physical wrap point
//! is still one contiguous slice — no split-write path exists or is needed.

use std::slice;
use std::sync::atomic::Ordering;

use crate::control::ControlBlock;
use crate::invariants::{
    debug_assert_bounded_occupancy, debug_assert_index_in_bounds, debug_assert_valid_len,
    debug_assert_within_bound,
};

/// A view of the ring protocol over one mapping's control block and data
/// region. Cheap to construct; `Queue` builds one on every call rather than
/// storing it, since it borrows from `Queue`'s own fields.
pub(crate) struct Ring<'a> {
    control: &'a ControlBlock,
    data: *mut u8,
    capacity: usize,
}

// SAFETY: `Ring` only ever touches `data` through atomically-gated offsets
// (rpos/wpos), the same discipline a raw `*mut T` ringbuffer needs `Send`
// for; the pointee is shared memory, not a thread-local allocation.
unsafe impl Send for Ring<'_> {}
unsafe impl Sync for Ring<'_> {}

impl<'a> Ring<'a> {
    /// # Safety
    /// `data` must point at a live mapping of the double-mapped data region
    /// (`2 * capacity` bytes reachable, the first `capacity` bytes mirrored
    /// starting at offset `capacity`), valid for as long as `'a`.
    pub(crate) unsafe fn new(control: &'a ControlBlock, data: *mut u8, capacity: usize) -> Self {
        Self { control, data, capacity }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Relaxed load of `rpos`. Every caller either belongs to the consumer
    /// (reading its own last write back) or only needs a conservative,
    /// possibly-stale view to size `available`/`space` — the one place a
    /// cross-thread load needs to synchronize with the producer's writes is
    /// gated separately in `peek`, per the `sync` flag.
    fn rpos(&self) -> usize {
        self.control.rpos.load(Ordering::Relaxed) as usize
    }

    /// Relaxed load of `wpos`. Same rationale as `rpos`.
    fn wpos(&self) -> usize {
        self.control.wpos.load(Ordering::Relaxed) as usize
    }

    /// Bytes currently holding unread data.
    pub(crate) fn available(&self) -> usize {
        let (rp, wp) = (self.rpos(), self.wpos());
        debug_assert_index_in_bounds!("rpos", rp, self.capacity);
        debug_assert_index_in_bounds!("wpos", wp, self.capacity);
        if wp >= rp {
            wp - rp
        } else {
            self.capacity - rp + wp
        }
    }

    /// Bytes the producer may still reserve. One byte of capacity is always
    /// held back so a full buffer (`available == capacity - 1`) remains
    /// distinguishable from an empty one (`available == 0`) without a
    /// separate flag.
    pub(crate) fn space(&self) -> usize {
        let available = self.available();
        let space = self.capacity - 1 - available;
        debug_assert_bounded_occupancy!(available, space, self.capacity);
        space
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Returns a contiguous read-only view of the next `n` unread bytes, or
    /// `None` if fewer than `n` bytes are available. Never copies: the
    /// double mapping guarantees the view is contiguous even when it
    /// straddles the physical end of the data region.
    ///
    /// Under `sync`, an acquire fence sits between the relaxed index loads
    /// and the read of the data region, pairing with `commit`'s release
    /// store on `wpos` so every byte the producer wrote before that commit
    /// is visible here. Under `sync=false` the fence is skipped: the caller
    /// has promised to establish that ordering by some external means.
    pub(crate) fn peek(&self, n: usize) -> Option<&'a [u8]> {
        if n == 0 || n > self.available() {
            return None;
        }
        let rp = self.rpos();
        debug_assert_index_in_bounds!("rpos", rp, self.capacity);
        if self.control.sync() {
            std::sync::atomic::fence(Ordering::Acquire);
        }
        // SAFETY: rp < capacity and n <= available <= capacity - 1, so
        // rp + n <= 2*capacity - 2, within the double-mapped view.
        Some(unsafe { slice::from_raw_parts(self.data.add(rp), n) })
    }

    /// Discards the next `n` unread bytes, advancing the read index.
    /// Returns `false` without effect if fewer than `n` bytes are available.
    ///
    /// Always a relaxed store: the consumer is the sole writer of `rpos`,
    /// and the producer only needs eventual visibility of reclaimed space,
    /// never a happens-before relationship with the bytes it already wrote.
    pub(crate) fn pop(&self, n: usize) -> bool {
        if n == 0 || n > self.available() {
            return false;
        }
        let rp = self.rpos();
        let next = (rp + n) % self.capacity;
        debug_assert_index_in_bounds!("next_rpos", next, self.capacity);
        self.control.rpos.store(next as u64, Ordering::Relaxed);
        true
    }

    /// Reserves `n` bytes for writing. `0 < n < capacity` is a caller
    /// precondition, not a recoverable error: exceeding capacity can never
    /// succeed regardless of how much is drained.
    /// Returns `None` if fewer than `n` bytes are currently free.
    pub(crate) fn alloc(&self, n: usize) -> Option<AllocGuard<'a>> {
        debug_assert_valid_len!(n, self.capacity);
        if n > self.space() {
            return None;
        }
        let wp = self.wpos();
        debug_assert_index_in_bounds!("wpos", wp, self.capacity);
        Some(AllocGuard {
            control: self.control,
            // SAFETY: wp < capacity and n <= space <= capacity - 1, so
            // wp + n <= 2*capacity - 2, within the double-mapped view.
            slice: unsafe { slice::from_raw_parts_mut(self.data.add(wp), n) },
            capacity: self.capacity,
            wpos: wp,
        })
    }

    /// Reserves exactly `src.len()` bytes, copies `src` in, and commits.
    /// Returns `false` without effect if there isn't enough free space.
    pub(crate) fn push(&self, src: &[u8]) -> bool {
        let Some(mut guard) = self.alloc(src.len()) else {
            return false;
        };
        guard.as_mut_slice().copy_from_slice(src);
        guard.commit();
        true
    }
}

/// A reserved, not-yet-visible span of the write region.
///
/// Dropping a guard without calling [`commit`](AllocGuard::commit) simply
/// abandons the reservation: the write index was never advanced, so the
/// same bytes are offered again on the next `alloc`.
pub(crate) struct AllocGuard<'a> {
    control: &'a ControlBlock,
    slice: &'a mut [u8],
    capacity: usize,
    wpos: usize,
}

impl<'a> AllocGuard<'a> {
    /// The reserved region, writable until committed.
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        self.slice
    }

    pub(crate) fn len(&self) -> usize {
        self.slice.len()
    }

    /// Publishes the full reservation to the consumer.
    pub(crate) fn commit(self) {
        let len = self.slice.len();
        self.commit_n(len);
    }

    /// Publishes only the first `n` bytes of the reservation (`0 < n <=
    /// len()`), for producers that reserved an upper bound but wrote less.
    ///
    /// Under `sync`, this is a release store pairing with `peek`'s acquire
    /// fence, publishing every byte written into the reservation before the
    /// consumer can observe the new `wpos`. Under `sync=false` it drops to
    /// relaxed, per the caller's promise to order access externally.
    pub(crate) fn commit_n(self, n: usize) {
        debug_assert!(n > 0, "INV-RES-01 violated: commit_n(0) is disallowed");
        debug_assert_within_bound!("commit_n", n, self.slice.len());
        let next = (self.wpos + n) % self.capacity;
        debug_assert_index_in_bounds!("next_wpos", next, self.capacity);
        let order = if self.control.sync() { Ordering::Release } else { Ordering::Relaxed };
        self.control.wpos.store(next as u64, order);
    }
}
