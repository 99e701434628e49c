//! The mapping engine: turns a name (or an anonymous fd) into a live,
//! double-mapped region of shared memory.
//!
//! Reserves the full `prefix + 2*capacity` span with one anonymous private
//! mapping, then overlays two `MAP_FIXED` mappings of the real backing fd
//! so a byte straddling the physical wrap point is readable as one
//! contiguous span, with a header-validate-then-map split between
//! [`create`] and [`open`] so an opener never maps more than it needs to
//! probe capacity first.

use std::ffi::CString;
use std::io;
use std::ptr;

use tracing::{debug, trace};

use crate::control::{control_block_size, ControlBlock};
use crate::error::Error;

/// A live mapping: a control block plus a double-mapped data region.
///
/// Unmaps unconditionally on drop. Never unlinks — that is the named/private
/// lifecycle layer's responsibility, since only the creator of a named
/// queue owns the name.
pub(crate) struct MappedRegion {
    base: *mut u8,
    prefix: usize,
    capacity: usize,
}

// SAFETY: the mapping is backed by shared memory; nothing about it is
// thread-local. Synchronization of the bytes themselves is the ring
// protocol's job, not this type's.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    pub(crate) fn control(&self) -> &ControlBlock {
        // SAFETY: `base` points at a live mapping whose first
        // `control_block_size()` bytes were written by `ControlBlock::init_in_place`
        // (possibly in another process sharing this binary's ABI).
        unsafe { ControlBlock::from_mapped(self.base) }
    }

    pub(crate) fn data_base(&self) -> *mut u8 {
        // SAFETY: offsetting within the mapped region; still just a pointer.
        unsafe { self.base.add(self.prefix) }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // The reserved virtual range is `prefix + 2 * capacity` bytes: the
        // first copy of the data region plus the overlay mirror. Both
        // halves were claimed by the same initial anonymous reservation
        // (see `open_backing`), so one munmap tears down the whole thing.
        let len = self.prefix + 2 * self.capacity;
        let rc = unsafe { libc::munmap(self.base.cast(), len) };
        if rc != 0 {
            debug!(error = %io::Error::last_os_error(), "munmap failed during MappedRegion drop");
        }
    }
}

fn page_size() -> usize {
    let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if sz <= 0 {
        4096
    } else {
        sz as usize
    }
}

fn page_align(n: usize, page: usize) -> usize {
    n.div_ceil(page) * page
}

/// Page-aligned size of the control-block prefix. Independent of the data
/// capacity: the control block's own layout is fixed-size (see
/// `control_block_size`), so only it, not the data region, determines how
/// many pages the prefix needs.
fn prefix_len(page: usize) -> usize {
    page_align(control_block_size(), page).max(page)
}

/// Total backing-object size for a queue holding `capacity` bytes of data.
/// `capacity == 0` is the special case used only for the open-before-
/// initialized probe, where the footprint is exactly one page.
fn footprint(capacity: usize, page: usize) -> usize {
    if capacity == 0 {
        page
    } else {
        prefix_len(page) + capacity
    }
}

fn cstring(name: &str) -> CString {
    CString::new(name).expect("shared-memory names must not contain NUL bytes")
}

unsafe fn shm_open(name: &str, flags: i32, mode: libc::mode_t) -> io::Result<i32> {
    let c_name = cstring(name);
    let fd = libc::shm_open(c_name.as_ptr(), flags, mode);
    if fd < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd)
    }
}

fn ftruncate(fd: i32, len: usize) -> io::Result<()> {
    let rc = unsafe { libc::ftruncate(fd, len as libc::off_t) };
    if rc != 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn close(fd: i32) {
    unsafe {
        libc::close(fd);
    }
}

/// Current size in bytes of the backing object, via `fstat`.
fn object_size(fd: i32) -> io::Result<u64> {
    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::fstat(fd, &mut stat) };
    if rc != 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(stat.st_size as u64)
    }
}

/// Creates and fully initializes the backing object for a named or private
/// queue, then unmaps and closes it. Does not leave anything mapped: a
/// subsequent [`open`] is required to get a ready-to-use, double-mapped
/// region (the creator of a queue opens its own freshly-created object just
/// like anyone else would).
pub(crate) fn create(
    name: &str,
    capacity: usize,
    sync: bool,
    md_init: impl FnOnce(&mut [u8]),
) -> Result<(), Error> {
    assert!(capacity > 0, "capacity must be nonzero");
    let page = page_size();
    let prefix = prefix_len(page);
    let total = prefix + capacity;

    // Best-effort reclaim: ignore a stale object left by a process that
    // died before unlinking.
    let _ = unlink(name);

    let fd = unsafe {
        shm_open(
            name,
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
            0o600,
        )
    }
    .map_err(|e| Error::from_os_error(name, "shm_open", e))?;

    let result = (|| -> Result<(), Error> {
        ftruncate(fd, total).map_err(|e| Error::ResizeFailed { source: e })?;

        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(Error::MappingFailed {
                op: "mmap (create)",
                source: io::Error::last_os_error(),
            });
        }
        let base = addr.cast::<u8>();

        // SAFETY: `total >= control_block_size()` by construction, the
        // mapping is freshly zeroed by the kernel, and nothing else can
        // observe this object yet (capacity is still 0).
        let control = unsafe { ControlBlock::init_in_place(base.cast()) };
        control.set_sync(sync);
        md_init(control.metadata_mut());
        // Publish last: this Release store is what an opener's Acquire
        // load of capacity synchronizes with.
        control.publish_capacity(capacity);

        let rc = unsafe { libc::munmap(addr, total) };
        if rc != 0 {
            return Err(Error::MappingFailed {
                op: "munmap (create)",
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    })();

    close(fd);

    if let Err(err) = result {
        let _ = unlink(name);
        return Err(err);
    }

    trace!(name, capacity, "created shared-memory backing object");
    Ok(())
}

/// Opens an existing backing object and produces a ready-to-use,
/// double-mapped region. Returns [`Error::NotYetInitialized`] if the
/// creator has not yet published capacity (a single attempt; retrying with
/// backoff is the named-shared lifecycle's job).
pub(crate) fn open(name: &str) -> Result<MappedRegion, Error> {
    let page = page_size();

    let fd = unsafe { shm_open(name, libc::O_RDWR, 0) }
        .map_err(|e| Error::from_os_error(name, "shm_open", e))?;

    let probe_result = (|| -> Result<usize, Error> {
        let probe_len = footprint(0, page);

        // An opener can land between `create`'s `shm_open(O_CREAT|O_EXCL)`
        // and its following `ftruncate`: the object exists but is still
        // zero-length. Mapping a full page over it and reading from it
        // would raise SIGBUS on a tmpfs-backed fd once the access crosses
        // the object's actual extent. Check the size first and treat a
        // too-small object the same as an uninitialized one.
        let size = object_size(fd).map_err(|e| Error::MappingFailed {
            op: "fstat (probe)",
            source: e,
        })?;
        if size < probe_len as u64 {
            return Err(Error::NotYetInitialized { name: name.to_owned() });
        }

        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                probe_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(Error::MappingFailed {
                op: "mmap (probe)",
                source: io::Error::last_os_error(),
            });
        }
        // SAFETY: the probe mapping covers at least one page, which is
        // always >= control_block_size().
        let control = unsafe { ControlBlock::from_mapped(addr.cast()) };
        let capacity = control.capacity_acquire();

        let rc = unsafe { libc::munmap(addr, probe_len) };
        if rc != 0 {
            return Err(Error::MappingFailed {
                op: "munmap (probe)",
                source: io::Error::last_os_error(),
            });
        }

        if capacity == 0 {
            return Err(Error::NotYetInitialized { name: name.to_owned() });
        }
        Ok(capacity)
    })();

    let capacity = match probe_result {
        Ok(c) => c,
        Err(err) => {
            close(fd);
            return Err(err);
        }
    };

    let prefix = prefix_len(page);
    let result = double_map(fd, prefix, capacity);
    close(fd);

    let (base, prefix, capacity) = match result {
        Ok(v) => v,
        Err(err) => return Err(err),
    };

    trace!(name, capacity, "opened shared-memory backing object");
    Ok(MappedRegion { base, prefix, capacity })
}

/// Maps `prefix + capacity` bytes of `fd` at offset 0, then overlays a
/// second `capacity`-byte mapping of the same bytes (offset `prefix`)
/// immediately after the first copy of the data region, so that
/// `[base+prefix, base+prefix+2*capacity)` is two contiguous mirrored
/// copies of the data region.
///
/// Reserves the full `prefix + 2*capacity` span with an anonymous private
/// mapping first (so the kernel hands back a big enough hole), then punches
/// two `MAP_FIXED` mappings of the real fd into it.
fn double_map(fd: i32, prefix: usize, capacity: usize) -> Result<(*mut u8, usize, usize), Error> {
    let total = prefix + 2 * capacity;

    let reservation = unsafe {
        libc::mmap(
            ptr::null_mut(),
            total,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if reservation == libc::MAP_FAILED {
        return Err(Error::MappingFailed {
            op: "mmap (reserve)",
            source: io::Error::last_os_error(),
        });
    }
    let base = reservation.cast::<u8>();

    let first = unsafe {
        libc::mmap(
            reservation,
            prefix + capacity,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED | libc::MAP_FIXED,
            fd,
            0,
        )
    };
    if first == libc::MAP_FAILED {
        unsafe {
            libc::munmap(reservation, total);
        }
        return Err(Error::MappingFailed {
            op: "mmap (first half)",
            source: io::Error::last_os_error(),
        });
    }

    // SAFETY: `base + prefix + capacity` lies within the reservation
    // (total == prefix + 2*capacity), so this MAP_FIXED call replaces
    // unused reserved address space, not a live mapping it doesn't own.
    let overlay = unsafe { base.add(prefix + capacity) };
    let second = unsafe {
        libc::mmap(
            overlay.cast(),
            capacity,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED | libc::MAP_FIXED,
            fd,
            prefix as libc::off_t,
        )
    };
    if second == libc::MAP_FAILED {
        unsafe {
            libc::munmap(reservation, total);
        }
        return Err(Error::MappingFailed {
            op: "mmap (overlay)",
            source: io::Error::last_os_error(),
        });
    }

    Ok((base, prefix, capacity))
}

/// Removes the name from the shared-memory namespace. Idempotent: a
/// not-found error is swallowed, matching POSIX `shm_unlink`'s use as a
/// best-effort cleanup step throughout the lifecycle layers.
pub(crate) fn unlink(name: &str) -> Result<(), Error> {
    let c_name = cstring(name);
    let rc = unsafe { libc::shm_unlink(c_name.as_ptr()) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::NotFound {
            return Ok(());
        }
        return Err(Error::from_os_error(name, "shm_unlink", err));
    }
    Ok(())
}

/// Checks whether a named backing object currently exists, without mapping
/// it or disturbing its contents.
pub(crate) fn exists(name: &str) -> bool {
    match unsafe { shm_open(name, libc::O_RDONLY, 0) } {
        Ok(fd) => {
            close(fd);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_at_least_one_page() {
        assert!(prefix_len(4096) >= 4096);
    }

    #[test]
    fn footprint_of_zero_capacity_is_one_page() {
        assert_eq!(footprint(0, 4096), 4096);
    }

    #[test]
    fn footprint_grows_with_capacity() {
        let page = 4096;
        assert_eq!(footprint(8192, page), prefix_len(page) + 8192);
    }

    #[test]
    fn create_open_round_trip_via_shared_memory() {
        let name = format!("/shqueue-test-{}", std::process::id());
        let _ = unlink(&name);

        create(&name, 4096, true, |md| {
            md[..3].copy_from_slice(b"abc");
        })
        .expect("create");

        let region = open(&name).expect("open");
        assert_eq!(region.capacity(), 4096);
        assert!(region.control().sync());
        assert_eq!(&region.control().metadata()[..3], b"abc");

        drop(region);
        unlink(&name).expect("unlink");
    }

    #[test]
    fn open_before_create_reports_not_yet_initialized_or_not_found() {
        let name = format!("/shqueue-test-missing-{}", std::process::id());
        let _ = unlink(&name);
        let err = open(&name).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn open_against_zero_length_object_reports_not_yet_initialized() {
        // Simulates landing between `create`'s `shm_open(O_CREAT|O_EXCL)`
        // and its following `ftruncate`: the object exists but is still
        // zero-length. Without the `fstat` size check this used to SIGBUS
        // instead of returning a retryable error.
        let name = format!("/shqueue-test-zerolen-{}", std::process::id());
        let _ = unlink(&name);
        let fd = unsafe {
            shm_open(&name, libc::O_CREAT | libc::O_EXCL | libc::O_RDWR, 0o600)
        }
        .expect("shm_open");
        close(fd);

        let err = open(&name).unwrap_err();
        assert!(matches!(err, Error::NotYetInitialized { .. }));

        unlink(&name).expect("unlink");
    }
}
