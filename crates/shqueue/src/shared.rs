//! Named shared-memory lifecycle: the create/open/unlink dance and the
//! opener-side retry loop for the creator-publishes-capacity-last race.

use tracing::trace;

use crate::backoff::Backoff;
use crate::config::OpenRetry;
use crate::error::Error;
use crate::mapping::{self, MappedRegion};
use crate::metrics::Metrics;

pub(crate) fn create(
    name: &str,
    capacity: usize,
    sync: bool,
    md_init: impl FnOnce(&mut [u8]),
) -> Result<(), Error> {
    mapping::create(name, capacity, sync, md_init)
}

/// Opens a named queue, retrying on [`Error::NotYetInitialized`] per
/// `retry`. Every other error is returned immediately.
pub(crate) fn open(name: &str, retry: OpenRetry, metrics: &Metrics) -> Result<MappedRegion, Error> {
    let mut backoff = Backoff::new();
    let mut attempt = 0u32;
    loop {
        match mapping::open(name) {
            Ok(region) => return Ok(region),
            Err(err) if err.is_retryable() && attempt + 1 < retry.max_attempts => {
                attempt += 1;
                metrics.record_open_retry();
                trace!(name, attempt, "open found uninitialized queue, retrying");
                if backoff.is_completed() {
                    std::thread::sleep(retry.sleep);
                } else {
                    backoff.snooze();
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Removes a named queue from the shared-memory namespace. Safe to call on
/// a name nobody has created, or after the creator has already unlinked it.
pub fn delete_shared(name: &str) -> Result<(), Error> {
    mapping::unlink(name)
}

/// Reports whether a named queue currently exists and could be opened
/// (though a concurrent creator racing to publish capacity could still make
/// an immediately-following `open` return `NotYetInitialized`).
#[must_use]
pub fn can_get(name: &str) -> bool {
    mapping::exists(name)
}
