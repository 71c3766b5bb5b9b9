//! FlatPool: the concurrent interning pool and its configuration.

use crate::factory::{FromArgs, ValueFactory};
use crate::handle::Handle;
use crate::hash_index::HashIndex;
use crate::reentrancy::DebugReentrancy;
use crate::slots::{Entry, Slots};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::marker::PhantomData;
use core::sync::atomic::{AtomicUsize, Ordering};
use hashbrown::hash_map::DefaultHashBuilder;
use parking_lot::RwLock;

/// Default floor for the capacity of a pool, both at construction and after
/// compaction.
pub const MIN_RESERVED_SIZE: usize = 16;

/// Lock-protected state shared by a pool and its handles.
///
/// Lock order is always `index`, then `slots`. Every path that takes either
/// lock enters `reentrancy` first; guards handed out by `Handle::get` do not.
pub(crate) struct Core<K, V> {
    index: RwLock<HashIndex>,
    slots: RwLock<Slots<K, V>>,
    // Number of index records; only written with both locks held exclusively.
    live: AtomicUsize,
    reentrancy: DebugReentrancy,
}

impl<K, V> Core<K, V> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            index: RwLock::new(HashIndex::with_capacity(capacity)),
            slots: RwLock::new(Slots::with_capacity(capacity)),
            live: AtomicUsize::new(0),
            reentrancy: DebugReentrancy::new(),
        }
    }

    pub(crate) fn slots(&self) -> &RwLock<Slots<K, V>> {
        &self.slots
    }

    /// Index lookup; the caller holds both locks in any mode.
    fn lookup<Q>(index: &HashIndex, slots: &Slots<K, V>, hash: u64, q: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        index.find(hash, |slot| {
            slots.is_occupied(slot) && slots.entry(slot).key().borrow() == q
        })
    }

    /// Shared-lock probe. On a hit, the slot's count is incremented before
    /// the index lock is released, so the slot cannot be reclaimed in between.
    fn find_and_attach<Q>(&self, hash: u64, q: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let _g = self.reentrancy.enter();
        let index = self.index.read();
        let slots = self.slots.read_recursive();
        let slot = Self::lookup(&index, &slots, hash, q)?;
        let attached = slots.add_ref(slot);
        debug_assert!(attached, "indexed slot {slot} must be occupied");
        Some(slot)
    }

    /// Exclusive re-probe, then insert. `make` runs only when the key is
    /// still absent once both locks are held.
    fn insert_or_attach<M>(&self, hash: u64, key: K, make: M) -> usize
    where
        K: Eq,
        M: FnOnce() -> V,
    {
        let (slot, displaced) = {
            let _g = self.reentrancy.enter();
            let mut index = self.index.write();
            let mut slots = self.slots.write();
            match Self::lookup(&index, &slots, hash, &key) {
                Some(slot) => {
                    slots.add_ref(slot);
                    (slot, None)
                }
                None => {
                    let value = make();
                    let (slot, displaced) = slots.place(Entry::new(key, value, hash));
                    index.insert(hash, slot);
                    slots.add_ref(slot);
                    self.live.fetch_add(1, Ordering::Release);
                    (slot, displaced)
                }
            }
        };
        // The previous occupant of a reused slot may own handles into this
        // pool; drop it with no lock held.
        drop(displaced);
        slot
    }

    /// Adds a reference to `slot` if it is still occupied.
    pub(crate) fn attach(&self, slot: usize) -> bool {
        let _g = self.reentrancy.enter();
        self.slots.read_recursive().add_ref(slot)
    }

    pub(crate) fn use_count(&self, slot: usize) -> u64 {
        let _g = self.reentrancy.enter();
        self.slots.read_recursive().count(slot)
    }

    /// Drops a reference to `slot`; the last one frees the slot.
    pub(crate) fn release(&self, slot: usize) {
        let _g = self.reentrancy.enter();
        {
            let slots = self.slots.read_recursive();
            if !slots.put_ref(slot) {
                return;
            }
        }
        let mut index = self.index.write();
        let mut slots = self.slots.write();
        // Someone may have found the key again, or freed it already, while
        // no lock was held.
        if let Some(hash) = slots.reclaim(slot) {
            let unlinked = index.remove(hash, slot);
            debug_assert!(unlinked, "occupied slot {slot} had no index record");
            self.live.fetch_sub(1, Ordering::Release);
        }
        debug_assert_eq!(index.len(), self.live.load(Ordering::Relaxed));
    }

    fn len(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

/// Point-in-time view of a pool's storage use.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Occupancy {
    /// Entries the storage can hold without reallocating.
    pub capacity: usize,
    /// Slots in use or awaiting reuse.
    pub slots: usize,
    /// Slots holding a live, discoverable entry.
    pub live: usize,
    /// Lowest slot the next insertion will reuse, if any.
    pub next_free: Option<usize>,
}

impl Occupancy {
    /// Fraction of the capacity holding live entries.
    pub fn load_factor(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.live as f64 / self.capacity as f64
        }
    }
}

/// A concurrent, key-based interning pool.
///
/// Each distinct key owns at most one slot of contiguous storage. Acquiring
/// a key returns a reference-counted [`Handle`] to its slot, inserting the
/// entry first if needed. When the last handle to a slot goes away the slot
/// becomes free; its entry is kept until the slot is reused or the pool is
/// compacted.
///
/// With `V = ()` the pool behaves like a set and entries are keys alone; use
/// [`acquire`](FlatPool::acquire). Otherwise each key carries a payload built
/// at insertion time by the factory `F`; use
/// [`acquire_with`](FlatPool::acquire_with) or
/// [`acquire_with_fn`](FlatPool::acquire_with_fn).
///
/// # Deadlocks
///
/// While a thread holds a [`SlotRef`](crate::SlotRef) or
/// [`SlotMut`](crate::SlotMut) of a pool, it must not call any of these on
/// that same pool until the guard is gone:
///
/// - [`acquire`](FlatPool::acquire), [`acquire_with`](FlatPool::acquire_with)
///   or [`acquire_with_fn`](FlatPool::acquire_with_fn);
/// - [`find`](FlatPool::find) or [`contains`](FlatPool::contains);
/// - [`compact`](FlatPool::compact);
/// - dropping or resetting the last handle of a slot;
/// - [`Handle::get`] or [`Handle::get_mut`] for a second guard.
///
/// Each of these waits on a lock that another thread's insertion may be
/// holding while it waits for the guard. Under a `SlotRef`, cloning handles,
/// dropping non-last handles, [`Handle::use_count`], [`len`](FlatPool::len),
/// [`is_empty`](FlatPool::is_empty), [`capacity`](FlatPool::capacity),
/// [`occupancy`](FlatPool::occupancy) and `Debug` formatting never wait on a
/// writer and are fine. A `SlotMut` holds storage exclusively, so under it
/// only `len` and `is_empty` are.
pub struct FlatPool<K, V = (), S = DefaultHashBuilder, F = FromArgs> {
    core: Core<K, V>,
    hasher: S,
    min_capacity: usize,
    _factory: PhantomData<fn() -> F>,
}

impl<K, V> FlatPool<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        PoolBuilder::new().build()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        PoolBuilder::new().reserve(capacity).build()
    }

    /// Starts configuring a pool.
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }
}

impl<K, V> Default for FlatPool<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S, F> FlatPool<K, V, S, F>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        PoolBuilder::new().hasher(hasher).build()
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        PoolBuilder::new().reserve(capacity).hasher(hasher).build()
    }

    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    fn handle(&self, slot: usize) -> Handle<'_, K, V> {
        Handle::attached(&self.core, slot)
    }

    /// Returns a handle to the slot holding `key`, inserting the entry with
    /// the payload returned by `make` if the key is absent.
    ///
    /// `make` runs at most once per inserted key and never for a key that
    /// turns out to be present, even when it was inserted concurrently by
    /// another thread after this call's first probe.
    pub fn acquire_with_fn<M>(&self, key: K, make: M) -> Handle<'_, K, V>
    where
        M: FnOnce() -> V,
    {
        let hash = self.make_hash(&key);
        if let Some(slot) = self.core.find_and_attach(hash, &key) {
            return self.handle(slot);
        }
        let slot = self.core.insert_or_attach(hash, key, make);
        self.handle(slot)
    }

    /// Returns a handle to the slot holding `key`, building its payload from
    /// `args` through the factory `F` if the key is absent.
    ///
    /// When the key already exists, `args` is dropped unused.
    pub fn acquire_with<A>(&self, key: K, args: A) -> Handle<'_, K, V>
    where
        F: ValueFactory<V, A>,
    {
        self.acquire_with_fn(key, move || F::make(args))
    }

    /// Returns a handle to the entry for `q`, or a null handle if absent.
    /// Never inserts.
    pub fn find<Q>(&self, q: &Q) -> Handle<'_, K, V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        match self.core.find_and_attach(hash, q) {
            Some(slot) => self.handle(slot),
            None => Handle::null(),
        }
    }

    pub fn contains<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        let _g = self.core.reentrancy.enter();
        let index = self.core.index.read();
        let slots = self.core.slots.read_recursive();
        Core::lookup(&index, &slots, hash, q).is_some()
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }
}

impl<K, V, S, F> FlatPool<K, V, S, F> {
    pub const MIN_RESERVED_SIZE: usize = MIN_RESERVED_SIZE;

    /// Number of live entries. Takes no lock.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.len() == 0
    }

    /// Entries the storage can hold without reallocating.
    pub fn capacity(&self) -> usize {
        let _g = self.core.reentrancy.enter();
        self.core.slots.read_recursive().capacity()
    }

    pub fn min_capacity(&self) -> usize {
        self.min_capacity
    }

    pub fn occupancy(&self) -> Occupancy {
        let _g = self.core.reentrancy.enter();
        let slots = self.core.slots.read_recursive();
        Occupancy {
            capacity: slots.capacity(),
            slots: slots.len(),
            live: slots.occupied_count(),
            next_free: slots.free_hint(),
        }
    }

    /// Releases storage past the highest live slot.
    ///
    /// The storage shrinks to the smallest power of two, no less than
    /// [`min_capacity`](FlatPool::min_capacity), that covers every live slot;
    /// nothing happens when that is not smaller than the current capacity.
    /// Free slots past the highest live one are dropped. Live slots keep their
    /// indices, so outstanding handles stay valid.
    ///
    /// Returns whether the storage shrank.
    pub fn compact(&self) -> bool {
        let cut = {
            let _g = self.core.reentrancy.enter();
            let mut index = self.core.index.write();
            let mut slots = self.core.slots.write();
            let keep = slots.highest_occupied().map_or(0, |highest| highest + 1);
            let target = keep.next_power_of_two().max(self.min_capacity);
            let before = slots.capacity();
            if before <= target {
                return false;
            }
            let cut = slots.truncate_and_shrink(keep, target);
            index.shrink_to_fit();
            debug_assert!(index.iter().all(|r| r.slot < keep));
            log::debug!(
                "compacted pool: capacity {before} -> {}, {} free slots dropped",
                slots.capacity(),
                cut.len()
            );
            cut
        };
        drop(cut);
        true
    }
}

impl<K, S, F> FlatPool<K, (), S, F>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Returns a handle to the slot holding `key`, inserting it if absent.
    pub fn acquire(&self, key: K) -> Handle<'_, K, ()> {
        self.acquire_with_fn(key, || ())
    }
}

impl<K, V, S, F> fmt::Debug for FlatPool<K, V, S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let occupancy = self.occupancy();
        f.debug_struct("FlatPool")
            .field("len", &self.len())
            .field("capacity", &occupancy.capacity)
            .field("slots", &occupancy.slots)
            .field("min_capacity", &self.min_capacity)
            .finish()
    }
}

/// Configuration for a [`FlatPool`].
///
/// ```
/// use flat_pool::{FlatPool, PoolBuilder};
///
/// let pool: FlatPool<String, u32> = PoolBuilder::new().reserve(64).min_capacity(32).build();
/// assert_eq!(pool.capacity(), 64);
/// assert_eq!(pool.min_capacity(), 32);
/// ```
#[derive(Clone, Debug)]
pub struct PoolBuilder<S = DefaultHashBuilder> {
    reserve: usize,
    min_capacity: usize,
    hasher: S,
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self {
            reserve: MIN_RESERVED_SIZE,
            min_capacity: MIN_RESERVED_SIZE,
            hasher: DefaultHashBuilder::default(),
        }
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> PoolBuilder<S> {
    /// Sets the initial capacity. Values below the minimum capacity are
    /// raised to it.
    pub fn reserve(mut self, capacity: usize) -> Self {
        self.reserve = capacity;
        self
    }

    /// Sets the capacity floor used at construction and by compaction.
    ///
    /// It is rounded up to a power of two.
    ///
    /// # Panics
    ///
    /// If `capacity` is zero, or greater than the largest power of two a
    /// `usize` can hold.
    pub fn min_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "minimum capacity must be non-zero");
        let Some(rounded) = capacity.checked_next_power_of_two() else {
            panic!("minimum capacity {capacity} has no power-of-two ceiling");
        };
        self.min_capacity = rounded;
        self
    }

    /// Sets the hash policy.
    pub fn hasher<T>(self, hasher: T) -> PoolBuilder<T> {
        PoolBuilder {
            reserve: self.reserve,
            min_capacity: self.min_capacity,
            hasher,
        }
    }

    pub fn build<K, V, F>(self) -> FlatPool<K, V, S, F> {
        let capacity = self.reserve.max(self.min_capacity);
        log::debug!(
            "creating pool: capacity {capacity}, minimum {}",
            self.min_capacity
        );
        FlatPool {
            core: Core::with_capacity(capacity),
            hasher: self.hasher,
            min_capacity: self.min_capacity,
            _factory: PhantomData,
        }
    }
}
