//! ordered-robin-map: a single-threaded hash map that iterates in insertion
//! order, indexed by Robin Hood hashing with backward-shift deletion.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: keep contents and lookup structure separate so each can be
//!   reasoned about on its own.
//! - Layers:
//!   - Ledger<K, V>: owns every entry in a `SlotMap` arena threaded into a
//!     doubly-linked list. It is the source of truth for contents and
//!     iteration order; appends and unlinks are O(1) and never move other
//!     entries.
//!   - ProbeIndex: open-addressing array of slots, each empty or holding
//!     `(displacement, arena key)`. It never owns data; it only points back
//!     into the ledger.
//!   - RobinMap<K, V, S>: public API. Every mutation goes to the ledger
//!     first and then keeps the index consistent.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` (no synchronization).
//! - Unique keys; inserting a present key is a no-op that keeps the stored
//!   value.
//! - Load factor at most 1/3: after any insert, `3 * len <= capacity`. When
//!   an insert would break this, the index is rebuilt at `2 * capacity + 3`.
//! - `reserve(n)` pre-sizes the index to `2 * n` slots.
//! - `clear` keeps the index capacity.
//!
//! Probe index invariants
//! - For an occupied slot at position `p` whose entry has hash `h`,
//!   `displacement == (p - h % capacity) mod capacity`.
//! - Insertion swaps the carried entry into any slot whose occupant is
//!   displaced less (Robin Hood); removal shifts followers back one slot
//!   until an empty slot or an entry in its home slot (no tombstones).
//! - At least one slot is always empty, so every probe terminates.
//!
//! Hasher and rehashing invariants
//! - Each entry stores its `u64` hash from insertion. Rebuild, reserve,
//!   clear and handle removal use the stored hash; `K: Hash` runs once per
//!   insert or lookup, and `K: Eq` only while probing.
//!
//! Reentrancy policy
//! - Probing entry points hold a debug-only guard while `K: Hash/Eq` may
//!   run; re-entering the same map from those impls panics in debug builds.
//!   Removed keys and values are dropped after the guard is released.
//!
//! Notes and non-goals
//! - No custom allocators, no shrinking, no growth policy other than the
//!   fixed doubling rule.
//! - `Clone::clone_from` replaces the destination's contents entirely.
//! - Handles replace long-lived iterators: a `Handle` stays valid across
//!   inserts and rebuilds and is invalidated only by removing its entry.

mod error;
mod ledger;
mod map;
#[cfg(test)]
mod map_proptest;
mod probe_index;
mod reentrancy;

// Public surface
pub use error::AccessError;
pub use hashbrown::hash_map::DefaultHashBuilder;
pub use map::{Handle, IntoIter, Iter, IterMut, Keys, RobinMap, Values, ValuesMut};
