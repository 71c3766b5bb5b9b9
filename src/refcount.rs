//! Atomic per-slot reference counters.
//!
//! Counters are plain atomics; the pool brackets every mutation with a hold
//! on its storage lock, so orderings here only need to publish the count
//! itself.

use core::sync::atomic::{AtomicU64, Ordering};

/// Reference counter of one slot.
#[derive(Debug, Default)]
pub struct SlotCount {
    count: AtomicU64,
}

impl SlotCount {
    pub const fn new(initial: u64) -> Self {
        Self {
            count: AtomicU64::new(initial),
        }
    }

    /// Acquire one reference.
    #[inline]
    pub fn get(&self) {
        let prev = self.count.fetch_add(1, Ordering::AcqRel);
        if prev == u64::MAX {
            // Follow Arc semantics: abort on overflow rather than continue unsafely.
            std::process::abort();
        }
    }

    /// Return one reference. Returns true if the count is now zero.
    #[inline]
    pub fn put(&self) -> bool {
        let prev = self.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "SlotCount underflow");
        prev == 1
    }

    #[inline]
    pub fn load(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn reset(&self) {
        self.count.store(0, Ordering::Release);
    }
}
