#![cfg(test)]

// Property tests for LockedHashMap kept inside the crate so they can reach
// the clock-driven internals without extra public surface.

use crate::builder::Builder;
use crate::clock::ManualClock;
use crate::map::{LockedHashMap, Upserted};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

type Val = (String, i32);
type Ex = fn(&Val) -> String;

const TTL_SECS: u64 = 3;

fn name_of(v: &Val) -> String {
    v.0.clone()
}

// Pool-indexed operations so shrinking moves toward earlier keys.
#[derive(Clone, Debug)]
enum OpI {
    Upsert(usize, i32),
    Replace(usize, i32),
    UpsertWith(usize, i32, i32),
    Update(usize, i32),
    Get(usize),
    Alive(usize),
    Remove(usize),
    RemoveIfEven(usize),
    Advance(u64),
    Expire,
    ExpireOdd,
    VisitRemoveNegative,
    Clear,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, usize, Vec<OpI>)> {
    (proptest::collection::vec("[a-z]{0,4}", 1..=8), 1usize..=5).prop_flat_map(|(pool, buckets)| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let op = prop_oneof![
            3 => (idx.clone(), -50i32..50).prop_map(|(i, v)| OpI::Upsert(i, v)),
            2 => (idx.clone(), -50i32..50).prop_map(|(i, v)| OpI::Replace(i, v)),
            2 => (idx.clone(), -50i32..50, -5i32..5).prop_map(|(i, v, d)| OpI::UpsertWith(i, v, d)),
            2 => (idx.clone(), -5i32..5).prop_map(|(i, d)| OpI::Update(i, d)),
            2 => idx.clone().prop_map(OpI::Get),
            1 => idx.clone().prop_map(OpI::Alive),
            2 => idx.clone().prop_map(OpI::Remove),
            1 => idx.clone().prop_map(OpI::RemoveIfEven),
            2 => (0u64..=4).prop_map(OpI::Advance),
            1 => Just(OpI::Expire),
            1 => Just(OpI::ExpireOdd),
            1 => Just(OpI::VisitRemoveNegative),
            1 => Just(OpI::Clear),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), buckets, ops))
    })
}

struct Model {
    now: u64,
    entries: HashMap<String, (i32, u64)>,
}

impl Model {
    fn sweep<P: FnMut(&String, &(i32, u64)) -> bool>(&mut self, mut doomed: P) -> BTreeSet<Val> {
        let gone: BTreeSet<Val> = self
            .entries
            .iter()
            .filter(|&(k, e)| doomed(k, e))
            .map(|(k, e)| (k.clone(), e.0))
            .collect();
        for (k, _) in &gone {
            self.entries.remove(k);
        }
        gone
    }
}

fn as_set(v: Option<Vec<Val>>) -> Option<BTreeSet<Val>> {
    v.map(|v| v.into_iter().collect())
}

fn non_empty(s: BTreeSet<Val>) -> Option<BTreeSet<Val>> {
    (!s.is_empty()).then_some(s)
}

// Property: state-machine equivalence against a HashMap model with explicit time.
// Invariants exercised across random operation sequences:
// - One entry per key; upserts report Inserted exactly when the model lacks the key.
// - upsert keeps an existing value, replace overwrites it.
// - get never refreshes; alive/update/upserts/replace do; expire removes exactly the
//   entries idle for longer than the TTL and returns None when nothing expired.
// - remove_if vetoes leave the entry and counters untouched.
// - len == sum(bucket_elements) == number of entries reachable by visit.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, buckets, ops) in arb_scenario()) {
        let clock = ManualClock::new();
        let sut: LockedHashMap<String, Val, Ex> = Builder::new()
            .buckets(buckets)
            .ttl(Duration::from_secs(TTL_SECS))
            .clock(clock.clone())
            .extractor(name_of as Ex)
            .build();
        let mut model = Model { now: 0, entries: HashMap::new() };

        for op in ops {
            match op {
                OpI::Upsert(i, v) => {
                    let k = pool[i].clone();
                    let res = sut.upsert((k.clone(), v));
                    let now = model.now;
                    // An existing value survives; only its timestamp moves.
                    let expected = match model.entries.get_mut(&k) {
                        Some(e) => {
                            e.1 = now;
                            Upserted::Updated((k, e.0))
                        }
                        None => {
                            model.entries.insert(k.clone(), (v, now));
                            Upserted::Inserted((k, v))
                        }
                    };
                    prop_assert_eq!(res, expected);
                }
                OpI::Replace(i, v) => {
                    let k = pool[i].clone();
                    let res = sut.replace((k.clone(), v));
                    let prev = model.entries.insert(k.clone(), (v, model.now));
                    let expected = if prev.is_none() {
                        Upserted::Inserted((k, v))
                    } else {
                        Upserted::Updated((k, v))
                    };
                    prop_assert_eq!(res, expected);
                }
                OpI::UpsertWith(i, v, d) => {
                    let k = pool[i].clone();
                    let res = sut.upsert_with((k.clone(), v), |s| s.1 += d);
                    let now = model.now;
                    match model.entries.get_mut(&k) {
                        Some(e) => {
                            e.0 += d;
                            e.1 = now;
                            prop_assert_eq!(res, Upserted::Updated((k, e.0)));
                        }
                        None => {
                            model.entries.insert(k.clone(), (v, now));
                            prop_assert_eq!(res, Upserted::Inserted((k, v)));
                        }
                    }
                }
                OpI::Update(i, d) => {
                    let k = &pool[i];
                    let res = sut.update(k, |s| s.1 += d);
                    let now = model.now;
                    let expected = model.entries.get_mut(k).map(|e| {
                        e.0 += d;
                        e.1 = now;
                        (k.clone(), e.0)
                    });
                    prop_assert_eq!(res, expected);
                }
                OpI::Get(i) => {
                    let k = &pool[i];
                    let expected = model.entries.get(k).map(|e| (k.clone(), e.0));
                    prop_assert_eq!(sut.get(k), expected.clone());
                    prop_assert_eq!(sut.contains_key(k), expected.is_some());
                }
                OpI::Alive(i) => {
                    let k = &pool[i];
                    let now = model.now;
                    let expected = model.entries.get_mut(k).map(|e| {
                        e.1 = now;
                        (k.clone(), e.0)
                    });
                    prop_assert_eq!(sut.alive(k), expected);
                }
                OpI::Remove(i) => {
                    let k = &pool[i];
                    let expected = model.entries.remove(k).map(|e| (k.clone(), e.0));
                    prop_assert_eq!(sut.remove(k), expected);
                }
                OpI::RemoveIfEven(i) => {
                    let k = &pool[i];
                    let even = model.entries.get(k).is_some_and(|e| e.0 % 2 == 0);
                    let expected = if even {
                        model.entries.remove(k).map(|e| (k.clone(), e.0))
                    } else {
                        None
                    };
                    prop_assert_eq!(sut.remove_if(k, |v| v.1 % 2 == 0), expected);
                }
                OpI::Advance(secs) => {
                    clock.advance(Duration::from_secs(secs));
                    model.now += secs;
                }
                OpI::Expire => {
                    let now = model.now;
                    let gone = model.sweep(|_, e| now - e.1 > TTL_SECS);
                    prop_assert_eq!(as_set(sut.expire()), non_empty(gone));
                }
                OpI::ExpireOdd => {
                    let gone = model.sweep(|_, e| e.0 % 2 != 0);
                    prop_assert_eq!(as_set(sut.expire_by(|v, _| v.1 % 2 != 0)), non_empty(gone));
                }
                OpI::VisitRemoveNegative => {
                    model.sweep(|_, e| e.0 < 0);
                    sut.visit_remove(|_, _, v| v.1 < 0);
                }
                OpI::Clear => {
                    model.entries.clear();
                    sut.clear();
                }
            }

            prop_assert_eq!(sut.len(), model.entries.len());
            prop_assert_eq!(sut.bucket_elements().iter().sum::<usize>(), sut.len());
            let mut reachable = BTreeSet::new();
            sut.visit(|b, _, v| {
                assert_eq!(b, sut.bucket_of(&v.0));
                assert!(reachable.insert(v.clone()), "duplicate entry for a key");
                false
            });
            let expected: BTreeSet<Val> = model
                .entries
                .iter()
                .map(|(k, e)| (k.clone(), e.0))
                .collect();
            prop_assert_eq!(reachable, expected);
        }
    }
}
