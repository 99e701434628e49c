//! Private (anonymous) queue lifecycle: a unique name generated internally,
//! created, mapped, then immediately unlinked so no other process can ever
//! discover it by name.

use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Error;
use crate::mapping::{self, MappedRegion};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_name() -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("/shqueue-private-{}-{}", process::id(), n)
}

/// Creates a private queue: create, open, unlink, in that order. The name
/// never needs to outlive this call — once `open` has mapped the backing
/// object, the name is just an implementation detail.
pub(crate) fn create(
    capacity: usize,
    sync: bool,
    md_init: impl FnOnce(&mut [u8]),
) -> Result<MappedRegion, Error> {
    let name = unique_name();
    mapping::create(&name, capacity, sync, md_init)?;
    let region = mapping::open(&name);
    // Unlink regardless of whether open succeeded: a failed open still
    // left a named backing object behind that nothing else should be able
    // to find.
    let _ = mapping::unlink(&name);
    region
}
