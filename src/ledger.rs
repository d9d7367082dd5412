//! Ledger: insertion-ordered entry storage with stable generational keys.
//!
//! Entries live in a `SlotMap` arena and are threaded into a doubly-linked
//! list in insertion order. Appending and unlinking are O(1) and never move
//! other entries, so a `DefaultKey` stays valid until its own entry is
//! removed. The probe index only ever stores these keys; the ledger is the
//! sole owner of keys and values.

use slotmap::{DefaultKey, SecondaryMap, SlotMap};

#[derive(Debug)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    /// Hash computed once at insertion; rebuilds never rehash the key.
    pub(crate) hash: u64,
}

#[derive(Debug)]
struct Node<K, V> {
    entry: Entry<K, V>,
    prev: Option<DefaultKey>,
    next: Option<DefaultKey>,
}

#[derive(Debug)]
pub(crate) struct Ledger<K, V> {
    nodes: SlotMap<DefaultKey, Node<K, V>>,
    head: Option<DefaultKey>,
    tail: Option<DefaultKey>,
}

impl<K, V> Default for Ledger<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Ledger<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            head: None,
            tail: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append an entry at the tail and return its key.
    pub(crate) fn push_back(&mut self, entry: Entry<K, V>) -> DefaultKey {
        let prev = self.tail;
        let k = self.nodes.insert(Node {
            entry,
            prev,
            next: None,
        });
        match prev {
            Some(p) => self.nodes[p].next = Some(k),
            None => self.head = Some(k),
        }
        self.tail = Some(k);
        k
    }

    /// Unlink and return the entry for `k`; `None` if `k` is stale.
    pub(crate) fn remove(&mut self, k: DefaultKey) -> Option<Entry<K, V>> {
        let node = self.nodes.remove(k)?;
        match node.prev {
            Some(p) => self.nodes[p].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => self.nodes[n].prev = node.prev,
            None => self.tail = node.prev,
        }
        Some(node.entry)
    }

    pub(crate) fn get(&self, k: DefaultKey) -> Option<&Entry<K, V>> {
        self.nodes.get(k).map(|n| &n.entry)
    }

    pub(crate) fn get_mut(&mut self, k: DefaultKey) -> Option<&mut Entry<K, V>> {
        self.nodes.get_mut(k).map(|n| &mut n.entry)
    }

    /// Drop every entry. Arena slots keep their bumped versions, so keys
    /// issued before the clear never resolve to later entries.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
        self.tail = None;
    }

    pub(crate) fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            nodes: &self.nodes,
            front: self.head,
            back: self.tail,
            remaining: self.nodes.len(),
        }
    }

    pub(crate) fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        let remaining = self.nodes.len();
        let mut pending = SecondaryMap::with_capacity(remaining);
        for (k, node) in self.nodes.iter_mut() {
            pending.insert(k, node);
        }
        IterMut {
            pending,
            front: self.head,
            back: self.tail,
            remaining,
        }
    }

    pub(crate) fn into_entries(self) -> IntoIter<K, V> {
        IntoIter {
            remaining: self.nodes.len(),
            front: self.head,
            back: self.tail,
            nodes: self.nodes,
        }
    }
}

/// Ordered shared iteration, yielding each entry with its key.
pub(crate) struct Iter<'a, K, V> {
    nodes: &'a SlotMap<DefaultKey, Node<K, V>>,
    front: Option<DefaultKey>,
    back: Option<DefaultKey>,
    remaining: usize,
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes,
            front: self.front,
            back: self.back,
            remaining: self.remaining,
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (DefaultKey, &'a Entry<K, V>);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let k = self.front?;
        let node = &self.nodes[k];
        self.front = node.next;
        self.remaining -= 1;
        Some((k, &node.entry))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let k = self.back?;
        let node = &self.nodes[k];
        self.back = node.prev;
        self.remaining -= 1;
        Some((k, &node.entry))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// Ordered mutable iteration.
///
/// Every node is first parked in a `SecondaryMap` by its arena key; walking
/// the links then takes each node out exactly once, which hands out disjoint
/// `&mut` borrows without unsafe code.
pub(crate) struct IterMut<'a, K, V> {
    pending: SecondaryMap<DefaultKey, &'a mut Node<K, V>>,
    front: Option<DefaultKey>,
    back: Option<DefaultKey>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (DefaultKey, &'a mut Entry<K, V>);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let k = self.front?;
        let node = self.pending.remove(k)?;
        self.front = node.next;
        self.remaining -= 1;
        Some((k, &mut node.entry))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for IterMut<'_, K, V> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let k = self.back?;
        let node = self.pending.remove(k)?;
        self.back = node.prev;
        self.remaining -= 1;
        Some((k, &mut node.entry))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

/// Ordered owning iteration.
pub(crate) struct IntoIter<K, V> {
    nodes: SlotMap<DefaultKey, Node<K, V>>,
    front: Option<DefaultKey>,
    back: Option<DefaultKey>,
    remaining: usize,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = Entry<K, V>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.nodes.remove(self.front?)?;
        self.front = node.next;
        self.remaining -= 1;
        Some(node.entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for IntoIter<K, V> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.nodes.remove(self.back?)?;
        self.back = node.prev;
        self.remaining -= 1;
        Some(node.entry)
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}

#[cfg(test)]
impl<K, V> Ledger<K, V> {
    /// Walk the links both ways and check they agree with the arena.
    pub(crate) fn assert_links(&self) {
        let forward: Vec<DefaultKey> = {
            let mut out = Vec::new();
            let mut cur = self.head;
            let mut prev = None;
            while let Some(k) = cur {
                let node = &self.nodes[k];
                assert_eq!(node.prev, prev, "prev link mismatch");
                out.push(k);
                prev = Some(k);
                cur = node.next;
            }
            assert_eq!(self.tail, prev, "tail does not end the forward walk");
            out
        };
        assert_eq!(forward.len(), self.nodes.len(), "unlinked nodes in arena");
        let mut backward: Vec<DefaultKey> = self.iter().rev().map(|(k, _)| k).collect();
        backward.reverse();
        assert_eq!(forward, backward);
    }
}
