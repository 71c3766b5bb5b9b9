//! flat-pool: a concurrent, key-based interning pool with reference-counted
//! handles to contiguous, reusable slots.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: deduplicate values under an external identity key, share them
//!   between threads through cheap counted handles, and keep them in one
//!   contiguous array that is reused rather than reallocated.
//! - Layers:
//!   - HashIndex: sorted `(hash, slot)` records; binary search to the first
//!     record of a hash, then a linear scan comparing stored keys.
//!   - Slots: the entry array with parallel occupation and atomic refcount
//!     tables, plus a forward-only cursor to the lowest free slot.
//!   - FlatPool: two reader/writer locks (index, storage) and the
//!     double-checked acquire protocol.
//!   - Handle: counted slot reference; `SlotRef`/`SlotMut` guards
//!     dereference it while holding the storage lock.
//!
//! Acquire protocol
//! - Probe under shared locks; on a hit the count is incremented before the
//!   locks are released.
//! - On a miss, take both locks exclusively and probe again: another thread
//!   may have inserted the key in between. Only then is the payload built
//!   and the entry placed, so construction happens once per key.
//!
//! Lifetime semantics
//! - Reference counts track liveness, not destruction. A slot whose count
//!   drops to zero is unlinked from the index immediately, but its entry
//!   stays in place until the slot is reused (by assignment) or the pool is
//!   compacted. Types needing prompt destruction are a poor fit.
//! - Entries displaced by reuse or compaction are dropped after the pool's
//!   locks are released, so payloads may themselves own handles.
//!
//! Locking
//! - Lookups take shared holds only. Insertion, last-reference release and
//!   compaction take both locks exclusively, in index-then-storage order.
//! - Cloning a handle, dropping a non-last handle, `use_count`, `capacity`
//!   and `occupancy` take a recursive shared hold on storage only, so they
//!   never block behind a queued writer while the thread holds a `SlotRef`.
//!   `len` and `is_empty` read an atomic and take no lock at all.
//! - Lookups (`find`, `contains`) and acquires take the index lock, which a
//!   concurrent insertion holds while it waits for storage. A thread holding
//!   a guard must not call them on the same pool; see `FlatPool`'s
//!   "Deadlocks" section for the full list.
//! - Guards themselves take a fair shared hold, so a stream of readers cannot
//!   starve insertion or compaction.
//! - Every call that takes a pool lock is wrapped in a debug-only reentrancy
//!   check, so a key's `Eq` or a payload factory calling back into the pool
//!   it runs under panics instead of deadlocking.
//!
//! Notes and non-goals
//! - No persistence, no cross-process sharing.
//! - Handles borrow their pool; the pool cannot be dropped or moved while
//!   handles exist.
//! - Reference-count overflow aborts, matching `Arc`.
//!
//! ```
//! use flat_pool::FlatPool;
//!
//! let pool: FlatPool<String, usize> = FlatPool::new();
//! let a = pool.acquire_with("apple".to_string(), 5_usize);
//! let b = pool.acquire_with("apple".to_string(), 99_usize);
//! assert_eq!(a, b);
//! assert_eq!(*a.get().unwrap().value(), 5);
//! assert_eq!(pool.len(), 1);
//!
//! drop((a, b));
//! assert!(pool.find("apple").is_null());
//! ```

mod error;
pub mod factory;
mod handle;
mod hash_index;
mod pool;
mod refcount;
mod reentrancy;
mod slots;

// Public surface
pub use error::{NullHandle, PoolError};
pub use factory::{Boxed, FromArgs, Shared, ValueFactory};
pub use handle::{Handle, SlotMut, SlotRef};
pub use pool::{FlatPool, Occupancy, PoolBuilder, MIN_RESERVED_SIZE};
pub use slots::Entry;
