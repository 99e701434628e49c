//! The control block: the fixed-layout header at the front of every mapping.
//!
//! Three atomic indices, each pinned to its own cache line to avoid false
//! sharing between the producer and the consumer, followed by a small
//! opaque metadata region the core never interprets.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// `LEVEL1_DCACHE_LINESIZE` on the platforms this crate targets.
pub const CACHE_LINE: usize = 64;

/// Size in bytes of the opaque metadata region reserved inside every mapping.
///
/// Fixed rather than caller-configurable so the control block has a single,
/// documented in-memory layout regardless of what a given caller stores
/// there — see DESIGN.md for the tradeoff.
pub const METADATA_LEN: usize = 256;

/// Wrapper type that pads `T` out to a full cache line, preventing false
/// sharing between the producer's and consumer's hot fields.
///
/// 64-byte separation (one cache line per index) is enough here: this queue
/// has exactly two participants, not N producers contending on adjacent
/// lines, so there's no need for the wider prefetcher-safe margins some
/// MPSC designs use.
#[repr(C)]
#[repr(align(64))]
pub(crate) struct CacheAligned<T> {
    value: T,
}

impl<T> CacheAligned<T> {
    const fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// The fixed-layout header mapped at the start of every backing object.
///
/// `#[repr(C)]`: this layout is shared across processes (possibly across
/// separately-compiled binaries of the same ABI), so field order and
/// padding must be stable. `sync` is a plain field here, not tucked inside
/// a union with hand-rolled padding, so there's exactly one canonical
/// layout to reason about — see DESIGN.md.
#[repr(C)]
pub(crate) struct ControlBlock {
    /// Read index in bytes into the data region. Sole writer: the consumer.
    pub(crate) rpos: CacheAligned<AtomicU64>,
    /// Write index in bytes into the data region. Sole writer: the producer.
    pub(crate) wpos: CacheAligned<AtomicU64>,
    /// Capacity (bytes) and the sync mode, published together at creation.
    /// `capacity == 0` is the "not yet initialized" sentinel of the create/
    /// open lifecycle.
    pub(crate) properties: CacheAligned<Properties>,
    /// Opaque, caller-owned metadata. Written once by the create-time
    /// initializer, before `properties.capacity` is published.
    metadata: CacheAligned<MetadataCell>,
}

pub(crate) struct Properties {
    pub(crate) capacity: AtomicU64,
    pub(crate) sync: AtomicU8,
}

struct MetadataCell {
    bytes: std::cell::UnsafeCell<[u8; METADATA_LEN]>,
}

impl ControlBlock {
    /// Initializes a freshly-mapped, zeroed control block in place.
    ///
    /// # Safety
    /// `place` must point at a valid, writable, zeroed `size_of::<ControlBlock>()`
    /// region that nothing else is concurrently accessing.
    pub(crate) unsafe fn init_in_place<'a>(place: *mut ControlBlock) -> &'a ControlBlock {
        place.write(ControlBlock {
            rpos: CacheAligned::new(AtomicU64::new(0)),
            wpos: CacheAligned::new(AtomicU64::new(0)),
            properties: CacheAligned::new(Properties {
                capacity: AtomicU64::new(0),
                sync: AtomicU8::new(0),
            }),
            metadata: CacheAligned::new(MetadataCell {
                bytes: std::cell::UnsafeCell::new([0; METADATA_LEN]),
            }),
        });
        &*place
    }

    /// Reinterprets an already-initialized mapping as a `ControlBlock`.
    ///
    /// # Safety
    /// `base` must point at a live mapping of at least
    /// `size_of::<ControlBlock>()` bytes produced by a prior `init_in_place`
    /// (possibly in another process sharing this ABI).
    pub(crate) unsafe fn from_mapped<'a>(base: *const u8) -> &'a ControlBlock {
        &*base.cast::<ControlBlock>()
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.properties.capacity.load(Ordering::Relaxed) as usize
    }

    #[inline]
    pub(crate) fn capacity_acquire(&self) -> usize {
        self.properties.capacity.load(Ordering::Acquire) as usize
    }

    #[inline]
    pub(crate) fn publish_capacity(&self, capacity: usize) {
        self.properties
            .capacity
            .store(capacity as u64, Ordering::Release);
    }

    #[inline]
    pub(crate) fn sync(&self) -> bool {
        self.properties.sync.load(Ordering::Relaxed) != 0
    }

    #[inline]
    pub(crate) fn set_sync(&self, sync: bool) {
        self.properties.sync.store(u8::from(sync), Ordering::Relaxed);
    }

    /// The metadata region, valid to read once the caller has observed
    /// `capacity != 0` (i.e. established happens-before via an acquire load
    /// of `capacity`, which the creator publishes only after the metadata
    /// initializer has run).
    pub(crate) fn metadata(&self) -> &[u8] {
        // SAFETY: shared read-only access; the creator never writes again
        // after publishing capacity, and the caller has synchronized via
        // an acquire load of capacity before calling this.
        unsafe { &*self.metadata.bytes.get() }
    }

    #[allow(clippy::mut_from_ref)]
    pub(crate) fn metadata_mut(&self) -> &mut [u8] {
        // SAFETY: only called by the create-time initializer, which runs
        // with exclusive access before any other mapper can observe
        // capacity != 0.
        unsafe { &mut *self.metadata.bytes.get() }
    }
}

/// Total size in bytes of the control block, used by the mapping engine to
/// compute the page-aligned prefix reserved ahead of the data region.
pub(crate) const fn control_block_size() -> usize {
    std::mem::size_of::<ControlBlock>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_block_size_is_cache_line_multiple() {
        assert_eq!(control_block_size() % CACHE_LINE, 0);
    }

    #[test]
    fn init_in_place_zeroes_and_reads_back() {
        let mut storage = vec![0u8; control_block_size()];
        let cb = unsafe { ControlBlock::init_in_place(storage.as_mut_ptr().cast()) };
        assert_eq!(cb.capacity(), 0);
        assert!(!cb.sync());
        assert_eq!(cb.metadata(), &[0u8; METADATA_LEN][..]);

        cb.set_sync(true);
        cb.metadata_mut()[..4].copy_from_slice(b"ABCD");
        cb.publish_capacity(4096);

        assert!(cb.sync());
        assert_eq!(cb.capacity_acquire(), 4096);
        assert_eq!(&cb.metadata()[..4], b"ABCD");
    }
}
