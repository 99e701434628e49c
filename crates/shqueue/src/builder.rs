//! The `Builder`/`Queue` surface: three construction intents, lazy
//! materialization, move-only ownership, and the producer/consumer handle
//! split.
//!
//! The shared state lives behind an `Arc`, and `into_split` hands out
//! disjoint capability-scoped views over it — a producer-only handle and a
//! consumer-only handle, matching the single-writer/single-reader contract
//! the ring protocol itself assumes.

use std::sync::Arc;

use crate::config::{NamePrefix, OpenRetry};
use crate::error::Error;
use crate::mapping::MappedRegion;
use crate::metrics::Metrics;
use crate::ring::Ring;
use crate::{private, shared};

type MetadataInit = Box<dyn FnOnce(&mut [u8]) + Send>;

enum Intent {
    CreateShared {
        name: String,
        capacity: usize,
        sync: bool,
        md_init: MetadataInit,
    },
    OpenShared {
        name: String,
        retry: OpenRetry,
    },
    CreatePrivate {
        capacity: usize,
        sync: bool,
        md_init: MetadataInit,
    },
}

/// Describes how to obtain a queue without committing any system resources
/// until [`Builder::get`] is first called.
///
/// Not `Clone`: a realized `Builder` owns a live mapping (and, for a
/// created named queue, the responsibility to unlink it), and duplicating
/// that would either double-unlink or require reference counting the
/// builder resolves on its own via [`Queue::into_split`].
pub struct Builder {
    intent: Option<Intent>,
    queue: Option<Queue>,
}

impl Builder {
    /// Creates a new named shared queue. The name is reclaimed from any
    /// stale prior object of the same name before creation.
    #[must_use]
    pub fn create_shared(name: impl AsRef<str>, capacity: usize) -> Self {
        Self {
            intent: Some(Intent::CreateShared {
                name: NamePrefix::normalize(name.as_ref()),
                capacity,
                sync: true,
                md_init: Box::new(|_| {}),
            }),
            queue: None,
        }
    }

    /// Opens an existing named shared queue.
    #[must_use]
    pub fn open_shared(name: impl AsRef<str>) -> Self {
        Self {
            intent: Some(Intent::OpenShared {
                name: NamePrefix::normalize(name.as_ref()),
                retry: OpenRetry::default(),
            }),
            queue: None,
        }
    }

    /// Creates a private (process-local, unnamed) queue. Unlinked from the
    /// shared-memory namespace immediately after the creator maps it, so no
    /// other process can ever discover it by name.
    #[must_use]
    pub fn create_private(capacity: usize) -> Self {
        Self {
            intent: Some(Intent::CreatePrivate {
                capacity,
                sync: true,
                md_init: Box::new(|_| {}),
            }),
            queue: None,
        }
    }

    /// Sets the sync mode published with a created queue. Ignored for
    /// `open_shared` builders, which inherit whatever the creator chose.
    #[must_use]
    pub fn with_sync(mut self, sync: bool) -> Self {
        match &mut self.intent {
            Some(Intent::CreateShared { sync: s, .. } | Intent::CreatePrivate { sync: s, .. }) => {
                *s = sync;
            }
            _ => {}
        }
        self
    }

    /// Sets the retry budget for `open_shared`'s creator-publish race.
    /// Ignored for `create_shared`/`create_private` builders, which only
    /// ever perform a single, immediate open of an object they just
    /// finished publishing themselves.
    #[must_use]
    pub fn with_open_retry(mut self, retry: OpenRetry) -> Self {
        if let Some(Intent::OpenShared { retry: r, .. }) = &mut self.intent {
            *r = retry;
        }
        self
    }

    /// Registers a metadata initializer, run once on the freshly-mapped
    /// control block before capacity is published. Ignored for
    /// `open_shared` builders.
    #[must_use]
    pub fn with_metadata_init<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut [u8]) + Send + 'static,
    {
        match &mut self.intent {
            Some(
                Intent::CreateShared { md_init, .. } | Intent::CreatePrivate { md_init, .. },
            ) => {
                *md_init = Box::new(f);
            }
            _ => {}
        }
        self
    }

    /// Reports whether the builder's target is already realizable without
    /// blocking: for `open_shared`, whether the name currently exists; for
    /// the create variants, always `true` (nothing has been attempted yet).
    #[must_use]
    pub fn can_get(&self) -> bool {
        match &self.intent {
            Some(Intent::OpenShared { name, .. }) => shared::can_get(name),
            Some(Intent::CreateShared { .. } | Intent::CreatePrivate { .. }) => true,
            None => true,
        }
    }

    #[must_use]
    pub fn is_realized(&self) -> bool {
        self.queue.is_some()
    }

    /// Materializes the queue on first call; subsequent calls return the
    /// same realized `Queue` without touching the OS again. A builder whose
    /// first realization attempt failed cannot be retried (its intent,
    /// including any metadata initializer, was already consumed by that
    /// attempt) — a further call reports [`Error::AlreadyAttempted`].
    pub fn get(&mut self) -> Result<&Queue, Error> {
        if let Some(queue) = self.queue.as_ref() {
            return Ok(queue);
        }
        let intent = self.intent.take().ok_or(Error::AlreadyAttempted)?;
        let queue = realize(intent)?;
        Ok(self.queue.insert(queue))
    }

    /// Materializes and returns the `Queue` by value, consuming the
    /// builder.
    pub fn into_queue(mut self) -> Result<Queue, Error> {
        if let Some(queue) = self.queue.take() {
            return Ok(queue);
        }
        let intent = self.intent.take().ok_or(Error::AlreadyAttempted)?;
        realize(intent)
    }
}

fn realize(intent: Intent) -> Result<Queue, Error> {
    match intent {
        Intent::CreateShared { name, capacity, sync, md_init } => {
            shared::create(&name, capacity, sync, move |md| md_init(md))?;
            let metrics = Metrics::new();
            let region = shared::open(&name, OpenRetry::none(), &metrics)?;
            Ok(Queue { region, owned_name: Some(name), metrics })
        }
        Intent::OpenShared { name, retry } => {
            let metrics = Metrics::new();
            let region = shared::open(&name, retry, &metrics)?;
            Ok(Queue { region, owned_name: None, metrics })
        }
        Intent::CreatePrivate { capacity, sync, md_init } => {
            let metrics = Metrics::new();
            let region = private::create(capacity, sync, move |md| md_init(md))?;
            Ok(Queue { region, owned_name: None, metrics })
        }
    }
}

/// A realized, ready-to-use queue.
///
/// On drop: a queue that created a named shared object unlinks the name;
/// the mapping itself is always unmapped unconditionally (via
/// `MappedRegion`'s own `Drop`), whether the queue opened someone else's
/// object, created its own, or is private.
pub struct Queue {
    region: MappedRegion,
    owned_name: Option<String>,
    metrics: Metrics,
}

impl Queue {
    fn ring(&self) -> Ring<'_> {
        // SAFETY: `region` is a live double mapping for as long as `self`
        // exists; `Ring` only ever touches bytes within it.
        unsafe { Ring::new(self.region.control(), self.region.data_base(), self.region.capacity()) }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.region.capacity()
    }

    /// The opaque metadata region written by the creator's initializer.
    #[must_use]
    pub fn metadata(&self) -> &[u8] {
        self.region.control().metadata()
    }

    #[must_use]
    pub fn sync(&self) -> bool {
        self.region.control().sync()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring().is_empty()
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.ring().available()
    }

    #[must_use]
    pub fn space(&self) -> usize {
        self.ring().space()
    }

    #[must_use]
    pub fn peek(&self, n: usize) -> Option<&[u8]> {
        self.ring().peek(n)
    }

    pub fn pop(&self, n: usize) -> bool {
        let ok = self.ring().pop(n);
        if ok {
            self.metrics.record_pop(n);
        }
        ok
    }

    #[must_use]
    pub fn alloc(&self, n: usize) -> Option<PushGuard<'_>> {
        let guard = self.ring().alloc(n)?;
        Some(PushGuard { guard, metrics: &self.metrics })
    }

    pub fn push(&self, data: &[u8]) -> bool {
        let ok = self.ring().push(data);
        if ok {
            self.metrics.record_push(data.len());
        }
        ok
    }

    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Splits the queue into a producer-only and a consumer-only handle,
    /// sharing ownership of the mapping via `Arc`. Enforces at the type
    /// level what the protocol already assumes: at most one thread writes,
    /// at most one reads.
    #[must_use]
    pub fn into_split(self) -> (Producer, Consumer) {
        let shared = Arc::new(self);
        (Producer { queue: Arc::clone(&shared) }, Consumer { queue: shared })
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        if let Some(name) = &self.owned_name {
            let _ = shared::delete_shared(name);
        }
    }
}

/// A reserved, not-yet-visible span of the write region, obtained from
/// [`Queue::alloc`] or [`Producer::alloc`].
pub struct PushGuard<'a> {
    guard: crate::ring::AllocGuard<'a>,
    metrics: &'a Metrics,
}

impl<'a> PushGuard<'a> {
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.guard.as_mut_slice()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.guard.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn commit(self) {
        let n = self.guard.len();
        self.metrics.record_push(n);
        self.guard.commit();
    }

    pub fn commit_n(self, n: usize) {
        self.metrics.record_push(n);
        self.guard.commit_n(n);
    }
}

/// The write-only half of a split [`Queue`].
pub struct Producer {
    queue: Arc<Queue>,
}

impl Producer {
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    #[must_use]
    pub fn space(&self) -> usize {
        self.queue.space()
    }

    #[must_use]
    pub fn alloc(&self, n: usize) -> Option<PushGuard<'_>> {
        self.queue.alloc(n)
    }

    pub fn push(&self, data: &[u8]) -> bool {
        self.queue.push(data)
    }

    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        self.queue.metrics()
    }
}

/// The read-only half of a split [`Queue`].
pub struct Consumer {
    queue: Arc<Queue>,
}

impl Consumer {
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    #[must_use]
    pub fn metadata(&self) -> &[u8] {
        self.queue.metadata()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.queue.available()
    }

    #[must_use]
    pub fn peek(&self, n: usize) -> Option<&[u8]> {
        self.queue.peek(n)
    }

    pub fn pop(&self, n: usize) -> bool {
        self.queue.pop(n)
    }

    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        self.queue.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_private_round_trips_through_push_pop() {
        let mut builder = Builder::create_private(4096).with_metadata_init(|md| {
            md[..5].copy_from_slice(b"hello");
        });
        let queue = builder.get().expect("realize");
        assert_eq!(&queue.metadata()[..5], b"hello");
        assert!(queue.push(b"payload"));
        assert_eq!(queue.peek(7), Some(&b"payload"[..]));
        assert!(queue.pop(7));
        assert!(queue.is_empty());
    }

    #[test]
    fn builder_is_lazy_until_get() {
        let builder = Builder::create_private(4096);
        assert!(!builder.is_realized());
    }

    #[test]
    fn create_shared_then_open_shared_see_the_same_bytes() {
        let name = format!("/shqueue-builder-test-{}", std::process::id());
        let _ = shared::delete_shared(&name);

        let mut creator = Builder::create_shared(&name, 4096);
        let created = creator.get().expect("create");
        assert!(created.push(b"from creator"));

        let mut opener = Builder::open_shared(&name);
        let opened = opener.get().expect("open");
        assert_eq!(opened.peek(12), Some(&b"from creator"[..]));

        drop(opener);
        drop(creator);
        assert!(!shared::can_get(&name));
    }

    #[test]
    fn into_split_enforces_disjoint_roles() {
        let queue = Builder::create_private(4096).into_queue().expect("realize");
        let (producer, consumer) = queue.into_split();
        assert!(producer.push(b"ping"));
        assert_eq!(consumer.peek(4), Some(&b"ping"[..]));
        assert!(consumer.pop(4));
    }
}
