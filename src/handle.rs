//! Reference-counted slot handles and the guards that dereference them.

use crate::error::NullHandle;
use crate::pool::Core;
use crate::slots::Entry;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::ops::Deref;
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLockReadGuard, RwLockWriteGuard};

/// A counted reference to one slot of a [`FlatPool`](crate::FlatPool), or
/// null.
///
/// Cloning adds a reference to the slot; dropping or [`reset`](Handle::reset)
/// removes one. When the last reference goes away the slot becomes free and
/// its key is no longer found by lookups.
///
/// Dereferencing goes through [`get`](Handle::get) or
/// [`get_mut`](Handle::get_mut), which return guards holding the pool's
/// storage lock: storage may move when another thread inserts or compacts,
/// and the guard keeps it in place for as long as the reference is used.
pub struct Handle<'p, K, V = ()> {
    core: Option<&'p Core<K, V>>,
    slot: usize,
}

impl<'p, K, V> Handle<'p, K, V> {
    /// The caller already added the reference this handle owns.
    pub(crate) fn attached(core: &'p Core<K, V>, slot: usize) -> Self {
        Self {
            core: Some(core),
            slot,
        }
    }

    pub const fn null() -> Self {
        Self {
            core: None,
            slot: 0,
        }
    }

    pub fn is_null(&self) -> bool {
        self.core.is_none()
    }

    /// Slot index addressed by this handle.
    pub fn index(&self) -> Option<usize> {
        self.core.map(|_| self.slot)
    }

    /// Current reference count of the slot; 0 for a null handle.
    pub fn use_count(&self) -> u64 {
        match self.core {
            Some(core) => core.use_count(self.slot),
            None => 0,
        }
    }

    /// Releases this handle's reference and leaves it null.
    pub fn reset(&mut self) {
        if let Some(core) = self.core.take() {
            core.release(self.slot);
        }
    }

    /// Moves the reference out, leaving a null handle behind.
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }

    /// Locks storage for reading and dereferences the slot.
    pub fn get(&self) -> Result<SlotRef<'_, K, V>, NullHandle> {
        let core = self.core.ok_or(NullHandle)?;
        let slots = core.slots().read();
        let slot = self.slot;
        Ok(SlotRef {
            guard: RwLockReadGuard::map(slots, |s| s.entry(slot)),
        })
    }

    /// Locks storage exclusively and dereferences the slot for mutation of
    /// its payload.
    pub fn get_mut(&self) -> Result<SlotMut<'_, K, V>, NullHandle> {
        let core = self.core.ok_or(NullHandle)?;
        let slots = core.slots().write();
        let slot = self.slot;
        Ok(SlotMut {
            guard: RwLockWriteGuard::map(slots, |s| s.entry_mut(slot)),
        })
    }

    fn core_addr(&self) -> usize {
        self.core.map_or(0, |core| core as *const Core<K, V> as usize)
    }
}

impl<'p, K, V> Default for Handle<'p, K, V> {
    fn default() -> Self {
        Self::null()
    }
}

impl<'p, K, V> Clone for Handle<'p, K, V> {
    fn clone(&self) -> Self {
        match self.core {
            Some(core) if core.attach(self.slot) => Self::attached(core, self.slot),
            // Either null, or the slot was freed under us.
            _ => Self::null(),
        }
    }
}

impl<'p, K, V> Drop for Handle<'p, K, V> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<'p, K, V> PartialEq for Handle<'p, K, V> {
    fn eq(&self, other: &Self) -> bool {
        match (self.core, other.core) {
            (None, None) => true,
            (Some(a), Some(b)) => core::ptr::eq(a, b) && self.slot == other.slot,
            _ => false,
        }
    }
}

impl<'p, K, V> Eq for Handle<'p, K, V> {}

impl<'p, K, V> Hash for Handle<'p, K, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core_addr().hash(state);
        self.index().hash(state);
    }
}

impl<'p, K, V> fmt::Debug for Handle<'p, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(slot) => f
                .debug_struct("Handle")
                .field("pool", &(self.core_addr() as *const ()))
                .field("slot", &slot)
                .finish(),
            None => f.write_str("Handle(null)"),
        }
    }
}

/// Shared view of a slot's entry. Holds the pool's storage lock in shared
/// mode, so storage cannot be reallocated while it is alive.
pub struct SlotRef<'a, K, V> {
    guard: MappedRwLockReadGuard<'a, Entry<K, V>>,
}

impl<'a, K, V> SlotRef<'a, K, V> {
    pub fn key(&self) -> &K {
        self.guard.key()
    }

    pub fn value(&self) -> &V {
        self.guard.value()
    }
}

impl<'a, K, V> Deref for SlotRef<'a, K, V> {
    type Target = Entry<K, V>;

    fn deref(&self) -> &Entry<K, V> {
        &self.guard
    }
}

impl<'a, K: fmt::Debug, V: fmt::Debug> fmt::Debug for SlotRef<'a, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.guard, f)
    }
}

/// Exclusive view of a slot's entry. The key stays read-only.
pub struct SlotMut<'a, K, V> {
    guard: MappedRwLockWriteGuard<'a, Entry<K, V>>,
}

impl<'a, K, V> SlotMut<'a, K, V> {
    pub fn key(&self) -> &K {
        self.guard.key()
    }

    pub fn value(&self) -> &V {
        self.guard.value()
    }

    pub fn value_mut(&mut self) -> &mut V {
        self.guard.value_mut()
    }
}

impl<'a, K, V> Deref for SlotMut<'a, K, V> {
    type Target = Entry<K, V>;

    fn deref(&self) -> &Entry<K, V> {
        &self.guard
    }
}

#[cfg(test)]
mod tests {
    use crate::{FlatPool, NullHandle};
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of<T: Hash>(t: &T) -> u64 {
        let mut h = DefaultHasher::new();
        t.hash(&mut h);
        h.finish()
    }

    #[test]
    fn null_handle_rejects_dereference() {
        let h: super::Handle<'_, u32> = super::Handle::null();
        assert!(h.is_null());
        assert_eq!(h.index(), None);
        assert_eq!(h.use_count(), 0);
        assert_eq!(h.get().err(), Some(NullHandle));
        assert_eq!(h.get_mut().err(), Some(NullHandle));
        assert!(h.clone().is_null());
    }

    /// Invariant: clone adds a reference, drop removes one; equality and
    /// hashing follow (pool, slot) identity.
    #[test]
    fn clone_and_drop_adjust_count() {
        let pool: FlatPool<&'static str> = FlatPool::new();
        let a = pool.acquire("x");
        let b = a.clone();
        assert_eq!(a.use_count(), 2);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        drop(b);
        assert_eq!(a.use_count(), 1);
        assert_eq!(pool.len(), 1);
    }

    /// Invariant: moving via `take` transfers the reference without touching
    /// the count and leaves a null handle.
    #[test]
    fn take_moves_reference() {
        let pool: FlatPool<u64> = FlatPool::new();
        let mut a = pool.acquire(9);
        let b = a.take();
        assert!(a.is_null());
        assert_eq!(b.use_count(), 1);
        assert_ne!(a, b);
        drop(a);
        assert_eq!(pool.len(), 1);
        drop(b);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn reset_releases_once() {
        let pool: FlatPool<u64> = FlatPool::new();
        let mut a = pool.acquire(1);
        let keep = a.clone();
        a.reset();
        a.reset();
        assert!(a.is_null());
        assert_eq!(keep.use_count(), 1);
        assert!(pool.contains(&1));
    }

    #[test]
    fn handles_from_different_pools_differ() {
        let p1: FlatPool<u8> = FlatPool::new();
        let p2: FlatPool<u8> = FlatPool::new();
        let a = p1.acquire(0);
        let b = p2.acquire(0);
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
    }

    #[test]
    fn get_mut_updates_payload() {
        let pool: FlatPool<String, Vec<u32>> = FlatPool::new();
        let h = pool.acquire_with("list".to_string(), vec![1_u32]);
        h.get_mut().unwrap().value_mut().push(2);
        let other = pool.find("list");
        assert_eq!(other.get().unwrap().value(), &vec![1, 2]);
        assert_eq!(other.get().unwrap().key(), "list");
    }

    /// Invariant: cloning and dropping a non-last handle only take shared
    /// holds, so both are fine while a guard is alive.
    #[test]
    fn clone_and_drop_under_guard() {
        let pool: FlatPool<u32> = FlatPool::new();
        let a = pool.acquire(1);
        let guard = a.get().unwrap();
        let b = a.clone();
        assert_eq!(b.use_count(), 2);
        drop(b);
        assert_eq!(*guard.key(), 1);
        drop(guard);
        assert_eq!(format!("{:?}", pool.find(&2)), "Handle(null)");
    }
}
