//! Debug-only reentrancy guard.
//!
//! The pool calls into user code (`K: Eq`) while it holds its locks. A key
//! whose `eq` calls back into the same pool would deadlock on those locks;
//! in debug builds this guard turns that into a panic instead. Tracking is
//! per thread and per pool instance. In release builds, it compiles to a
//! zero-cost no-op.

use core::marker::PhantomData;

#[cfg(debug_assertions)]
use core::sync::atomic::{AtomicUsize, Ordering};
#[cfg(debug_assertions)]
use std::cell::RefCell;

#[cfg(debug_assertions)]
static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

#[cfg(debug_assertions)]
thread_local! {
    // Ids of the instances this thread is currently inside of.
    static ENTERED: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Per-instance reentrancy tracker. Embed this in structs to guard locked
/// sections with `let _g = self.reentrancy.enter();`.
#[derive(Debug)]
pub struct DebugReentrancy {
    #[cfg(debug_assertions)]
    id: usize,
    _z: PhantomData<()>,
}

impl DebugReentrancy {
    pub fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            _z: PhantomData,
        }
    }

    /// Enter a guarded section. In debug builds, panics if this thread is
    /// already inside a guarded section of the same instance.
    #[inline]
    pub fn enter(&self) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            ENTERED.with(|entered| {
                let mut entered = entered.borrow_mut();
                assert!(
                    !entered.contains(&self.id),
                    "reentrancy detected: nested entry into pool"
                );
                entered.push(self.id);
            });
            ReentrancyGuard { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            ReentrancyGuard { _z: PhantomData }
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by `DebugReentrancy::enter`.
pub struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl<'a> Drop for ReentrancyGuard<'a> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            let id = self.owner.id;
            ENTERED.with(|entered| {
                let mut entered = entered.borrow_mut();
                if let Some(pos) = entered.iter().rposition(|&a| a == id) {
                    entered.swap_remove(pos);
                }
            });
        }
    }
}
