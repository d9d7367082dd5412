//! ProbeIndex: open-addressing index over ledger keys.
//!
//! Linear probing with Robin Hood placement and backward-shift deletion.
//! Every occupied slot at position `p` records its displacement, which is
//! always `(p - home) mod capacity` for the entry's home slot
//! `home = hash % capacity`. The index stores arena keys only; it never owns
//! entries and never hashes keys itself, so callers pass the stored `u64`
//! hash and an equality probe over arena keys.

use slotmap::DefaultKey;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Slot {
    Empty,
    Occupied {
        displacement: usize,
        handle: DefaultKey,
    },
}

#[derive(Debug, Default)]
pub(crate) struct ProbeIndex {
    slots: Vec<Slot>,
}

impl ProbeIndex {
    /// Zero-capacity index; the first insert into the owning map rebuilds it.
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new() }
    }

    #[cfg(test)]
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::Empty; capacity],
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn home(&self, hash: u64) -> usize {
        (hash % self.slots.len() as u64) as usize
    }

    #[inline]
    fn next(&self, pos: usize) -> usize {
        let pos = pos + 1;
        if pos == self.slots.len() {
            0
        } else {
            pos
        }
    }

    /// Arena key stored at `pos`, if that slot is occupied.
    #[inline]
    pub(crate) fn handle_at(&self, pos: usize) -> Option<DefaultKey> {
        match self.slots.get(pos) {
            Some(Slot::Occupied { handle, .. }) => Some(*handle),
            _ => None,
        }
    }

    /// Position of the slot whose entry has `hash` and satisfies `is_match`.
    ///
    /// `is_match` is only consulted for slots whose displacement equals the
    /// current probe distance, i.e. entries that share this home slot. The
    /// walk stops early at the first slot displaced less than the probe
    /// distance: Robin Hood placement would have evicted it for our key.
    pub(crate) fn find<F>(&self, hash: u64, mut is_match: F) -> Option<usize>
    where
        F: FnMut(DefaultKey) -> bool,
    {
        if self.slots.is_empty() {
            return None;
        }
        let mut pos = self.home(hash);
        let mut distance = 0;
        loop {
            debug_assert!(distance < self.slots.len(), "probe wrapped a full index");
            match self.slots[pos] {
                Slot::Empty => return None,
                Slot::Occupied {
                    displacement,
                    handle,
                } => {
                    if displacement < distance {
                        return None;
                    }
                    if displacement == distance && is_match(handle) {
                        return Some(pos);
                    }
                }
            }
            distance += 1;
            pos = self.next(pos);
        }
    }

    /// Place `handle`, whose key is known to be absent, by Robin Hood rule.
    ///
    /// The carried candidate swaps into any slot whose occupant sits closer
    /// to its own home than the candidate does; the evicted occupant keeps
    /// walking with its own displacement. Requires at least one empty slot.
    pub(crate) fn insert(&mut self, hash: u64, handle: DefaultKey) {
        let mut pos = self.home(hash);
        let mut carried = handle;
        let mut distance = 0;
        loop {
            debug_assert!(distance < self.slots.len(), "probe wrapped a full index");
            match self.slots[pos] {
                Slot::Empty => {
                    self.slots[pos] = Slot::Occupied {
                        displacement: distance,
                        handle: carried,
                    };
                    return;
                }
                Slot::Occupied {
                    displacement,
                    handle,
                } if displacement < distance => {
                    self.slots[pos] = Slot::Occupied {
                        displacement: distance,
                        handle: carried,
                    };
                    distance = displacement;
                    carried = handle;
                }
                Slot::Occupied { .. } => {}
            }
            distance += 1;
            pos = self.next(pos);
        }
    }

    /// Empty the slot at `pos` and close the gap by backward shifting.
    ///
    /// Followers are pulled back one slot each (displacement - 1) until the
    /// next slot is empty or already at its home.
    pub(crate) fn remove_at(&mut self, pos: usize) -> Option<DefaultKey> {
        let removed = self.handle_at(pos)?;
        self.slots[pos] = Slot::Empty;
        let mut prev = pos;
        let mut cur = self.next(pos);
        while let Slot::Occupied {
            displacement,
            handle,
        } = self.slots[cur]
        {
            if displacement == 0 {
                break;
            }
            self.slots[prev] = Slot::Occupied {
                displacement: displacement - 1,
                handle,
            };
            self.slots[cur] = Slot::Empty;
            prev = cur;
            cur = self.next(cur);
        }
        Some(removed)
    }

    /// Discard all slots, resize to `capacity`, and re-place `entries` in
    /// the given order. `capacity` must leave at least one slot empty.
    pub(crate) fn rebuild<I>(&mut self, capacity: usize, entries: I)
    where
        I: IntoIterator<Item = (DefaultKey, u64)>,
    {
        self.slots.clear();
        self.slots.resize(capacity, Slot::Empty);
        for (handle, hash) in entries {
            self.insert(hash, handle);
        }
    }

    /// Empty the whole cluster reachable from `hash`'s home slot.
    ///
    /// Stops at the first empty slot, so clearing an already-cleared cluster
    /// is a no-op. Calling this for every live entry's hash empties the index
    /// without touching untouched regions of a large, sparse array.
    pub(crate) fn clear_cluster(&mut self, hash: u64) {
        if self.slots.is_empty() {
            return;
        }
        let mut pos = self.home(hash);
        while self.slots[pos] != Slot::Empty {
            self.slots[pos] = Slot::Empty;
            pos = self.next(pos);
        }
    }

    #[cfg(test)]
    pub(crate) fn slots(&self) -> &[Slot] {
        &self.slots
    }
}
