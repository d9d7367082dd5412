//! RobinMap: insertion-ordered map composed of a ledger and a probe index.

use crate::error::AccessError;
use crate::ledger::{self, Entry, Ledger};
use crate::probe_index::ProbeIndex;
use crate::reentrancy::DebugReentrancy;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::iter::FusedIterator;
use core::ops::Index;
use hashbrown::hash_map::DefaultHashBuilder;
use slotmap::DefaultKey;
use tracing::{debug, trace};

/// Every completed insert leaves `LOAD_FACTOR_DIVISOR * len <= capacity`.
const LOAD_FACTOR_DIVISOR: usize = 3;
/// Rebuilt capacity is `GROWTH_FACTOR * capacity + GROWTH_SHIFT`.
const GROWTH_FACTOR: usize = 2;
const GROWTH_SHIFT: usize = 3;
/// `reserve(n)` sizes the index to `RESERVE_FACTOR * n` slots.
const RESERVE_FACTOR: usize = 2;

/// Stable reference to one entry of a [`RobinMap`].
///
/// A handle survives insertions, probe-index rebuilds and removals of other
/// entries. Once its own entry is removed it resolves to `None` forever,
/// even if a later entry reuses the same storage.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(DefaultKey);

impl Handle {
    pub(crate) fn new(k: DefaultKey) -> Self {
        Handle(k)
    }
    pub(crate) fn raw_handle(&self) -> DefaultKey {
        self.0
    }

    pub fn key<'a, K, V, S>(&self, map: &'a RobinMap<K, V, S>) -> Option<&'a K> {
        map.ledger.get(self.0).map(|e| &e.key)
    }

    pub fn value<'a, K, V, S>(&self, map: &'a RobinMap<K, V, S>) -> Option<&'a V> {
        map.ledger.get(self.0).map(|e| &e.value)
    }

    pub fn value_mut<'a, K, V, S>(&self, map: &'a mut RobinMap<K, V, S>) -> Option<&'a mut V> {
        map.ledger.get_mut(self.0).map(|e| &mut e.value)
    }
}

/// Hash map that iterates in insertion order.
///
/// Entries are owned by an ordered ledger; lookups go through a Robin Hood
/// probe index that stores only ledger handles. Inserting a key that is
/// already present never replaces its value.
pub struct RobinMap<K, V, S = DefaultHashBuilder> {
    hasher: S,
    index: ProbeIndex,
    ledger: Ledger<K, V>,
    reentrancy: DebugReentrancy,
}

fn grown_capacity(capacity: usize) -> usize {
    capacity
        .checked_mul(GROWTH_FACTOR)
        .and_then(|c| c.checked_add(GROWTH_SHIFT))
        .expect("capacity overflow")
}

impl<K, V> RobinMap<K, V> {
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }

    /// Empty map whose probe index is pre-sized for `expected_len` entries.
    pub fn with_capacity(expected_len: usize) -> Self {
        let mut map = Self::new();
        map.reserve(expected_len);
        map
    }
}

impl<K, V, S> RobinMap<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            index: ProbeIndex::new(),
            ledger: Ledger::new(),
            reentrancy: DebugReentrancy::new(),
        }
    }

    pub fn with_capacity_and_hasher(expected_len: usize, hasher: S) -> Self {
        let mut map = Self::with_hasher(hasher);
        map.reserve(expected_len);
        map
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }

    /// Number of slots in the probe index.
    pub fn capacity(&self) -> usize {
        self.index.capacity()
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Grow the probe index to `2 * expected_len` slots if it is smaller.
    ///
    /// Existing entries are re-placed from their stored hashes; the key type
    /// is never rehashed. The index never shrinks.
    pub fn reserve(&mut self, expected_len: usize) {
        let target = expected_len
            .checked_mul(RESERVE_FACTOR)
            .expect("capacity overflow");
        let old_capacity = self.index.capacity();
        if target <= old_capacity {
            return;
        }
        debug!(
            len = self.ledger.len(),
            old_capacity,
            new_capacity = target,
            "reserving probe index"
        );
        self.index
            .rebuild(target, self.ledger.iter().map(|(k, e)| (k, e.hash)));
    }

    /// Remove every entry, keeping the probe index capacity.
    ///
    /// Handles issued before the clear stay stale even after new entries
    /// reuse their storage.
    pub fn clear(&mut self) {
        {
            let _g = self.reentrancy.enter();
            trace!(
                len = self.ledger.len(),
                capacity = self.index.capacity(),
                "clearing map"
            );
            for (_, entry) in self.ledger.iter() {
                self.index.clear_cluster(entry.hash);
            }
        }
        // Keys and values drop after the guard is released.
        self.ledger.clear();
    }

    /// Remove the entry `handle` refers to; `None` if it is already gone.
    pub fn remove_handle(&mut self, handle: Handle) -> Option<(K, V)> {
        let k = handle.raw_handle();
        let hash = self.ledger.get(k)?.hash;
        let pos = self.index.find(hash, |candidate| candidate == k);
        debug_assert!(pos.is_some(), "live entry missing from probe index");
        if let Some(pos) = pos {
            self.index.remove_at(pos);
        }
        self.ledger.remove(k).map(|e| (e.key, e.value))
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.ledger.iter(),
        }
    }

    /// Mutable iteration in insertion order.
    ///
    /// Creating the iterator collects a borrow of every entry up front, an
    /// O(len) allocation, before the first item is yielded.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.ledger.iter_mut(),
        }
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys {
            inner: self.ledger.iter(),
        }
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values {
            inner: self.ledger.iter(),
        }
    }

    /// Mutable values in insertion order; same up-front cost as
    /// [`iter_mut`](Self::iter_mut).
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.ledger.iter_mut(),
        }
    }
}

impl<K, V, S> RobinMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Build from `(key, value)` pairs in order; later duplicates are ignored.
    pub fn from_iter_with_hasher<I>(iter: I, hasher: S) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let iter = iter.into_iter();
        let mut map = Self::with_capacity_and_hasher(iter.size_hint().0, hasher);
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }

    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    /// Probe-index position of `q`, given its hash. Caller holds the guard.
    fn locate<Q>(&self, hash: u64, q: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let ledger = &self.ledger;
        self.index.find(hash, |k| {
            ledger
                .get(k)
                .is_some_and(|e| e.hash == hash && e.key.borrow() == q)
        })
    }

    /// Ledger key of `q`. Caller holds the guard.
    fn lookup<Q>(&self, q: &Q) -> Option<DefaultKey>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        if self.ledger.is_empty() {
            return None;
        }
        let hash = self.make_hash(q);
        let pos = self.locate(hash, q)?;
        self.index.handle_at(pos)
    }

    /// Insert-if-absent. Returns the entry's ledger key and whether a new
    /// entry was created; `make_value` only runs in the latter case.
    fn insert_inner<F>(&mut self, key: K, make_value: F) -> (DefaultKey, bool)
    where
        F: FnOnce() -> V,
    {
        let _g = self.reentrancy.enter();
        let hash = self.make_hash(&key);
        if let Some(existing) = self
            .locate(hash, &key)
            .and_then(|pos| self.index.handle_at(pos))
        {
            return (existing, false);
        }

        let value = make_value();
        let k = self.ledger.push_back(Entry { key, value, hash });
        let len = self.ledger.len();
        if LOAD_FACTOR_DIVISOR * len > self.index.capacity() {
            let old_capacity = self.index.capacity();
            let new_capacity = grown_capacity(old_capacity);
            debug!(len, old_capacity, new_capacity, "rebuilding probe index");
            // Re-places every entry, the new one included.
            self.index
                .rebuild(new_capacity, self.ledger.iter().map(|(k, e)| (k, e.hash)));
        } else {
            self.index.insert(hash, k);
        }
        debug_assert!(LOAD_FACTOR_DIVISOR * len <= self.index.capacity());
        (k, true)
    }

    /// Insert `key -> value` unless `key` is already present.
    ///
    /// Returns `false`, and leaves the stored value untouched, on a duplicate.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.insert_inner(key, || value).1
    }

    /// Like [`insert`](Self::insert), also returning the handle of the entry
    /// that holds `key` afterwards (the existing one on a duplicate).
    pub fn insert_full(&mut self, key: K, value: V) -> (Handle, bool) {
        let (k, inserted) = self.insert_inner(key, || value);
        (Handle::new(k), inserted)
    }

    /// Insert with a lazily built value; `default` runs only if `key` is new.
    pub fn insert_with<F>(&mut self, key: K, default: F) -> (Handle, bool)
    where
        F: FnOnce() -> V,
    {
        let (k, inserted) = self.insert_inner(key, default);
        (Handle::new(k), inserted)
    }

    /// Mutable access that inserts `V::default()` for an absent key.
    pub fn get_or_insert_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        let (k, _) = self.insert_inner(key, V::default);
        &mut self
            .ledger
            .get_mut(k)
            .expect("entry must exist immediately after insert")
            .value
    }

    pub fn find<Q>(&self, q: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        self.lookup(q).map(Handle::new)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        self.lookup(q).is_some()
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get_key_value(q).map(|(_, v)| v)
    }

    pub fn get_key_value<Q>(&self, q: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let k = self.lookup(q)?;
        self.ledger.get(k).map(|e| (&e.key, &e.value))
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let k = self.lookup(q)?;
        self.ledger.get_mut(k).map(|e| &mut e.value)
    }

    /// Checked access; never inserts.
    pub fn at<Q>(&self, q: &Q) -> Result<&V, AccessError>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get(q).ok_or(AccessError::KeyNotFound)
    }

    /// Remove `q`, returning its value. Absent keys are a no-op.
    pub fn remove<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove_entry(q).map(|(_, v)| v)
    }

    pub fn remove_entry<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let k = {
            let _g = self.reentrancy.enter();
            if self.ledger.is_empty() {
                return None;
            }
            let hash = self.make_hash(q);
            let pos = self.locate(hash, q)?;
            self.index.remove_at(pos)?
        };
        let entry = self.ledger.remove(k);
        debug_assert!(entry.is_some(), "probe index pointed at a dead entry");
        entry.map(|e| (e.key, e.value))
    }
}

impl<K, V, S> Default for RobinMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> fmt::Debug for RobinMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> Clone for RobinMap<K, V, S>
where
    K: Clone + Eq + Hash,
    V: Clone,
    S: BuildHasher + Clone,
{
    fn clone(&self) -> Self {
        let mut out = Self::with_capacity_and_hasher(self.len(), self.hasher.clone());
        for (k, v) in self.iter() {
            out.insert(k.clone(), v.clone());
        }
        out
    }

    /// Replaces the whole contents of `self` with a copy of `source`.
    fn clone_from(&mut self, source: &Self) {
        self.clear();
        self.hasher = source.hasher.clone();
        self.reserve(source.len());
        for (k, v) in source.iter() {
            self.insert(k.clone(), v.clone());
        }
    }
}

impl<K, V, S> PartialEq for RobinMap<K, V, S>
where
    K: Eq + Hash,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K, V, S> Eq for RobinMap<K, V, S>
where
    K: Eq + Hash,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, Q, V, S> Index<&Q> for RobinMap<K, V, S>
where
    K: Eq + Hash + Borrow<Q>,
    Q: ?Sized + Eq + Hash,
    S: BuildHasher,
{
    type Output = V;

    /// Panics if `key` is absent; see [`RobinMap::at`] for the checked form.
    fn index(&self, key: &Q) -> &V {
        match self.at(key) {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for RobinMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_iter_with_hasher(iter, S::default())
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for RobinMap<K, V>
where
    K: Eq + Hash,
{
    fn from(entries: [(K, V); N]) -> Self {
        Self::from_iter_with_hasher(entries, DefaultHashBuilder::default())
    }
}

impl<K, V, S> Extend<(K, V)> for RobinMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a RobinMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut RobinMap<K, V, S> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<K, V, S> IntoIterator for RobinMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.ledger.into_entries(),
        }
    }
}

/// Iterator over `(&K, &V)` in insertion order.
pub struct Iter<'a, K, V> {
    inner: ledger::Iter<'a, K, V>,
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter {
            inner: self.inner.clone(),
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| (&e.key, &e.value))
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(_, e)| (&e.key, &e.value))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// Iterator over `(&K, &mut V)` in insertion order.
pub struct IterMut<'a, K, V> {
    inner: ledger::IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| (&e.key, &mut e.value))
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for IterMut<'_, K, V> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(_, e)| (&e.key, &mut e.value))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// Owning iterator over `(K, V)` in insertion order.
pub struct IntoIter<K, V> {
    inner: ledger::IntoIter<K, V>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|e| (e.key, e.value))
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for IntoIter<K, V> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|e| (e.key, e.value))
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}
impl<K, V> FusedIterator for IntoIter<K, V> {}

/// Iterator over keys in insertion order.
pub struct Keys<'a, K, V> {
    inner: ledger::Iter<'a, K, V>,
}

impl<K, V> Clone for Keys<'_, K, V> {
    fn clone(&self) -> Self {
        Keys {
            inner: self.inner.clone(),
        }
    }
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| &e.key)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Keys<'_, K, V> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(_, e)| &e.key)
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}
impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// Iterator over values in insertion order.
pub struct Values<'a, K, V> {
    inner: ledger::Iter<'a, K, V>,
}

impl<K, V> Clone for Values<'_, K, V> {
    fn clone(&self) -> Self {
        Values {
            inner: self.inner.clone(),
        }
    }
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| &e.value)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Values<'_, K, V> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(_, e)| &e.value)
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}
impl<K, V> FusedIterator for Values<'_, K, V> {}

pub struct ValuesMut<'a, K, V> {
    inner: ledger::IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| &mut e.value)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for ValuesMut<'_, K, V> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(_, e)| &mut e.value)
    }
}

impl<K, V> ExactSizeIterator for ValuesMut<'_, K, V> {}
impl<K, V> FusedIterator for ValuesMut<'_, K, V> {}

#[cfg(test)]
impl<K, V, S> RobinMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// White-box consistency check between ledger and probe index.
    pub(crate) fn assert_invariants(&self) {
        use crate::probe_index::Slot;

        self.ledger.assert_links();
        let cap = self.index.capacity();
        assert!(
            LOAD_FACTOR_DIVISOR * self.len() <= cap,
            "load factor exceeded: len {} capacity {}",
            self.len(),
            cap
        );

        let mut occupied = 0;
        for (pos, slot) in self.index.slots().iter().enumerate() {
            if let Slot::Occupied {
                displacement,
                handle,
            } = *slot
            {
                occupied += 1;
                let entry = self.ledger.get(handle).expect("slot points at a live entry");
                assert_eq!(entry.hash, self.make_hash(&entry.key), "stale stored hash");
                let home = (entry.hash % cap as u64) as usize;
                assert_eq!(
                    displacement,
                    (pos + cap - home) % cap,
                    "displacement at slot {pos} is not its distance from home"
                );
            }
        }
        assert_eq!(occupied, self.len(), "occupied slots != live entries");

        for (k, entry) in self.ledger.iter() {
            assert!(
                self.index.find(entry.hash, |c| c == k).is_some(),
                "ledger entry unreachable through the probe index"
            );
        }
    }
}
