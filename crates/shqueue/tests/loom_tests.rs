//! Loom-based concurrency tests for the SPSC byte-ring protocol.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! A simplified, loom-atomics reimplementation of the real protocol (the
//! real `Ring` borrows raw pointers into shared memory, which loom cannot
//! model), kept small enough for loom's exhaustive interleaving search to
//! finish in reasonable time.
//! `rpos`/`wpos` stay bounded in `[0, capacity)` here exactly as the real
//! `Ring` keeps them, including the one-byte reservation that makes a full
//! buffer distinguishable from an empty one without a separate flag.

#![cfg(feature = "loom")]

use loom::cell::UnsafeCell;
use loom::sync::atomic::{AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;

struct LoomRing {
    rpos: AtomicUsize,
    wpos: AtomicUsize,
    buffer: UnsafeCell<[u8; 4]>,
    capacity: usize,
}

unsafe impl Send for LoomRing {}
unsafe impl Sync for LoomRing {}

impl LoomRing {
    fn new() -> Self {
        Self {
            rpos: AtomicUsize::new(0),
            wpos: AtomicUsize::new(0),
            buffer: UnsafeCell::new([0; 4]),
            capacity: 4,
        }
    }

    fn available(&self, rp: usize, wp: usize) -> usize {
        if wp >= rp {
            wp - rp
        } else {
            self.capacity - rp + wp
        }
    }

    fn push(&self, value: u8) -> bool {
        let wp = self.wpos.load(Ordering::Relaxed);
        let rp = self.rpos.load(Ordering::Acquire);
        let available = self.available(rp, wp);
        if available >= self.capacity - 1 {
            return false;
        }

        // SAFETY: the slot at wp is not the one the consumer is reading,
        // since available < capacity - 1.
        unsafe {
            self.buffer.with_mut(|b| (*b)[wp] = value);
        }

        self.wpos.store((wp + 1) % self.capacity, Ordering::Release);
        true
    }

    fn pop(&self) -> Option<u8> {
        let rp = self.rpos.load(Ordering::Relaxed);
        let wp = self.wpos.load(Ordering::Acquire);
        if self.available(rp, wp) == 0 {
            return None;
        }

        // SAFETY: available > 0, so the slot at rp holds a committed write.
        let value = unsafe { self.buffer.with(|b| (*b)[rp]) };

        self.rpos.store((rp + 1) % self.capacity, Ordering::Release);
        Some(value)
    }
}

#[test]
fn loom_spsc_preserves_fifo_order() {
    loom::model(|| {
        let ring = Arc::new(LoomRing::new());
        let ring2 = Arc::clone(&ring);

        let producer = thread::spawn(move || {
            ring2.push(42);
            ring2.push(43);
        });

        let consumer = thread::spawn(move || {
            let mut received = Vec::new();
            for _ in 0..10 {
                if let Some(v) = ring.pop() {
                    received.push(v);
                }
                if received.len() == 2 {
                    break;
                }
                loom::thread::yield_now();
            }
            received
        });

        producer.join().unwrap();
        let received = consumer.join().unwrap();

        if received.len() >= 2 {
            assert_eq!(received[0], 42);
            assert_eq!(received[1], 43);
        }
    });
}

#[test]
fn loom_full_ring_rejects_until_drained() {
    loom::model(|| {
        let ring = Arc::new(LoomRing::new());
        let ring2 = Arc::clone(&ring);

        // capacity 4, one byte always reserved: 3 pushes fill it.
        assert!(ring.push(1));
        assert!(ring.push(2));
        assert!(ring.push(3));
        assert!(!ring.push(4));

        let consumer = thread::spawn(move || ring2.pop());

        let value = consumer.join().unwrap();
        assert_eq!(value, Some(1));

        assert!(ring.push(4));
    });
}

#[test]
fn loom_concurrent_never_receives_more_than_sent() {
    loom::model(|| {
        let ring = Arc::new(LoomRing::new());
        let ring_producer = Arc::clone(&ring);
        let ring_consumer = Arc::clone(&ring);

        let sent = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(AtomicUsize::new(0));
        let sent_p = Arc::clone(&sent);
        let received_c = Arc::clone(&received);

        let producer = thread::spawn(move || {
            if ring_producer.push(100) {
                sent_p.fetch_add(1, Ordering::SeqCst);
            }
            if ring_producer.push(200) {
                sent_p.fetch_add(1, Ordering::SeqCst);
            }
        });

        let consumer = thread::spawn(move || {
            for _ in 0..4 {
                if ring_consumer.pop().is_some() {
                    received_c.fetch_add(1, Ordering::SeqCst);
                }
                loom::thread::yield_now();
            }
        });

        producer.join().unwrap();
        consumer.join().unwrap();

        let s = sent.load(Ordering::SeqCst);
        let r = received.load(Ordering::SeqCst);
        assert!(r <= s, "received {r} but only sent {s}");
    });
}
