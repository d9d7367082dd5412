#![cfg(test)]

// Property tests for RobinMap kept inside the crate so they can check the
// probe index layout through `assert_invariants`.

use crate::error::AccessError;
use crate::map::{Handle, RobinMap};
use proptest::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hasher};

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Pool-indexed operations so shrinking moves toward earlier keys.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, i32),
    InsertWith(usize, i32),
    Remove(usize),
    RemoveHandle(usize),
    Find(usize),
    Contains(String),
    Mutate(usize, i32),
    GetOrDefault(usize),
    At(usize),
    Reserve(usize),
    Clear,
    Iterate,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=24).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            6 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Insert(i, v)),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::InsertWith(i, v)),
            3 => idx.clone().prop_map(OpI::Remove),
            1 => idx.clone().prop_map(OpI::RemoveHandle),
            2 => idx.clone().prop_map(OpI::Find),
            1 => prop_oneof![contains_pool, "[a-z]{0,5}"].prop_map(OpI::Contains),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            1 => idx.clone().prop_map(OpI::GetOrDefault),
            1 => idx.clone().prop_map(OpI::At),
            1 => (0usize..40).prop_map(OpI::Reserve),
            1 => Just(OpI::Clear),
            1 => Just(OpI::Iterate),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

/// Insertion-ordered reference model.
#[derive(Default)]
struct Model {
    entries: Vec<(Key, i32)>,
}

impl Model {
    fn position(&self, k: &Key) -> Option<usize> {
        self.entries.iter().position(|(mk, _)| mk == k)
    }
    fn get(&self, k: &Key) -> Option<i32> {
        self.position(k).map(|i| self.entries[i].1)
    }
    fn insert(&mut self, k: Key, v: i32) -> bool {
        if self.position(&k).is_some() {
            return false;
        }
        self.entries.push((k, v));
        true
    }
    fn remove(&mut self, k: &Key) -> Option<i32> {
        self.position(k).map(|i| self.entries.remove(i).1)
    }
}

fn run_scenario<S>(
    mut sut: RobinMap<Key, i32, S>,
    pool: Vec<String>,
    ops: Vec<OpI>,
) -> Result<(), TestCaseError>
where
    S: BuildHasher,
{
    let mut model = Model::default();
    let mut live: HashMap<Key, Handle> = HashMap::new();
    let mut stale: Vec<Handle> = Vec::new();

    for op in ops {
        match op {
            OpI::Insert(i, v) => {
                let k = key_from(&pool, i);
                let (h, inserted) = sut.insert_full(k.clone(), v);
                prop_assert_eq!(inserted, model.insert(k.clone(), v));
                if inserted {
                    prop_assert!(live.insert(k, h).is_none());
                } else {
                    prop_assert_eq!(
                        Some(&h),
                        live.get(&k),
                        "duplicate must report the live handle"
                    );
                }
            }
            OpI::InsertWith(i, v) => {
                let k = key_from(&pool, i);
                let mut ran = false;
                let (h, inserted) = sut.insert_with(k.clone(), || {
                    ran = true;
                    v
                });
                prop_assert_eq!(ran, inserted, "default runs exactly when inserting");
                prop_assert_eq!(inserted, model.insert(k.clone(), v));
                if inserted {
                    live.insert(k, h);
                }
            }
            OpI::Remove(i) => {
                let k = key_from(&pool, i);
                prop_assert_eq!(sut.remove(&k), model.remove(&k));
                if let Some(h) = live.remove(&k) {
                    stale.push(h);
                }
                prop_assert!(sut.find(&k).is_none());
            }
            OpI::RemoveHandle(i) => {
                let k = key_from(&pool, i);
                if let Some(h) = live.remove(&k) {
                    let (kk, vv) = sut.remove_handle(h).expect("live handle removes");
                    prop_assert!(kk == k);
                    prop_assert_eq!(Some(vv), model.remove(&k));
                    stale.push(h);
                }
            }
            OpI::Find(i) => {
                let k = key_from(&pool, i);
                let found = sut.find(&k);
                prop_assert_eq!(found, live.get(&k).copied());
                if let Some(h) = found {
                    prop_assert_eq!(h.key(&sut), Some(&k));
                    prop_assert_eq!(h.value(&sut).copied(), model.get(&k));
                }
            }
            OpI::Contains(s) => {
                let has_model = model.entries.iter().any(|(k, _)| k.0 == s);
                prop_assert_eq!(sut.contains_key(s.as_str()), has_model);
            }
            OpI::Mutate(i, d) => {
                let k = key_from(&pool, i);
                match (sut.get_mut(&k), model.position(&k)) {
                    (Some(v), Some(p)) => {
                        *v = v.wrapping_add(d);
                        model.entries[p].1 = model.entries[p].1.wrapping_add(d);
                    }
                    (None, None) => {}
                    (s, m) => prop_assert!(false, "presence mismatch: {:?} vs {:?}", s, m),
                }
            }
            OpI::GetOrDefault(i) => {
                let k = key_from(&pool, i);
                let before = sut.len();
                let v = *sut.get_or_insert_default(k.clone());
                match model.get(&k) {
                    Some(mv) => {
                        prop_assert_eq!(v, mv);
                        prop_assert_eq!(sut.len(), before);
                    }
                    None => {
                        prop_assert_eq!(v, 0);
                        prop_assert_eq!(sut.len(), before + 1);
                        model.insert(k.clone(), 0);
                        let h = sut.find(&k).expect("just inserted");
                        live.insert(k, h);
                    }
                }
            }
            OpI::At(i) => {
                let k = key_from(&pool, i);
                match model.get(&k) {
                    Some(mv) => prop_assert_eq!(sut.at(&k), Ok(&mv)),
                    None => prop_assert_eq!(sut.at(&k), Err(AccessError::KeyNotFound)),
                }
            }
            OpI::Reserve(n) => {
                let before = sut.capacity();
                sut.reserve(n);
                prop_assert_eq!(sut.capacity(), before.max(2 * n));
            }
            OpI::Clear => {
                let cap = sut.capacity();
                sut.clear();
                prop_assert_eq!(sut.capacity(), cap);
                model.entries.clear();
                stale.extend(live.drain().map(|(_, h)| h));
            }
            OpI::Iterate => {
                let got: Vec<(Key, i32)> = sut.iter().map(|(k, v)| (k.clone(), *v)).collect();
                prop_assert_eq!(&got, &model.entries);
                let mut rev: Vec<(Key, i32)> =
                    sut.iter().rev().map(|(k, v)| (k.clone(), *v)).collect();
                rev.reverse();
                prop_assert_eq!(&rev, &model.entries);
            }
        }

        // Post-conditions after each op
        sut.assert_invariants();
        for &h in &stale {
            prop_assert!(h.value(&sut).is_none());
        }
        prop_assert_eq!(sut.len(), model.entries.len());
        prop_assert_eq!(sut.is_empty(), model.entries.is_empty());
        prop_assert!(3 * sut.len() <= sut.capacity());
    }

    let order: Vec<Key> = sut.into_iter().map(|(k, _)| k).collect();
    let expected: Vec<Key> = model.entries.into_iter().map(|(k, _)| k).collect();
    prop_assert_eq!(order, expected);
    Ok(())
}

// Property: State-machine equivalence against an insertion-ordered model.
// Invariants exercised across random operation sequences:
// - Insert-if-absent: duplicates never overwrite and report the live handle.
// - `find`/`contains_key`/`at` parity with the model; `at` fails only with KeyNotFound.
// - Removal by key or handle returns the model's value and stales the handle.
// - Iteration (both directions and owned) follows first-insertion order.
// - After every op: Robin Hood displacement identity, occupied slots == len,
//   load factor, and ledger link consistency.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_scenario(RobinMap::new(), pool, ops)?;
    }
}

// Collision variant using a constant hasher: every key homes at slot 0.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

// Narrow-hash variant: only a few distinct home slots, so clusters overlap
// and Robin Hood swaps and backward shifts cross cluster boundaries.
#[derive(Clone, Default)]
struct NarrowBuildHasher;
#[derive(Default)]
struct NarrowHasher(u64);
impl BuildHasher for NarrowBuildHasher {
    type Hasher = NarrowHasher;
    fn build_hasher(&self) -> Self::Hasher {
        NarrowHasher(0)
    }
}
impl Hasher for NarrowHasher {
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = self.0.wrapping_mul(31).wrapping_add(u64::from(b));
        }
    }
    fn finish(&self) -> u64 {
        self.0 % 5
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run_scenario(RobinMap::with_hasher(ConstBuildHasher), pool, ops)?;
    }

    #[test]
    fn prop_state_machine_with_narrow_hashes((pool, ops) in arb_scenario()) {
        run_scenario(RobinMap::with_hasher(NarrowBuildHasher), pool, ops)?;
    }
}
