//! LockedHashMap: the sharded map engine.
//!
//! Every operation that names a key locks exactly one bucket, once, and does
//! all of its scanning and mutating inside that single critical section. The
//! search / insert / update family shares one code path, `operate`, driven by
//! a `Request` describing what to do with the entry once the scan finishes.
//! Whole-map operations (visits, sweeps, `clear`) lock one bucket at a time in
//! index order and never hold two bucket locks at once.

use crate::bucket::{BucketStore, LockedBucket};
use crate::chain::Handle;
use crate::clock::{Clock, SystemClock};
use crate::entry::Entry;
use crate::key::{KeyExtractor, KeyOf, Keyed};
use core::hash::{BuildHasher, Hash};
use core::marker::PhantomData;
use hashbrown::hash_map::DefaultHashBuilder;
use log::{debug, trace};
use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What `operate` does with the entry it finds (or fails to find).
enum Request<V, F> {
    /// Copy out, no refresh.
    Lookup,
    /// Refresh the timestamp, value untouched.
    Touch,
    /// Mutate and refresh an existing entry; never inserts.
    Modify(F),
    /// Keep an existing value as is, or insert.
    Upsert(V),
    /// Overwrite an existing value, or insert.
    Replace(V),
    /// Mutate an existing value, or insert the given one as is.
    UpsertWith(V, F),
}

enum Access<V> {
    Absent,
    Found(V),
    Updated(V),
    Inserted(V),
}

impl<V> Access<V> {
    fn into_value(self) -> Option<V> {
        match self {
            Access::Absent => None,
            Access::Found(v) | Access::Updated(v) | Access::Inserted(v) => Some(v),
        }
    }

    fn into_upserted(self) -> Upserted<V> {
        match self {
            Access::Inserted(v) => Upserted::Inserted(v),
            Access::Found(v) | Access::Updated(v) => Upserted::Updated(v),
            Access::Absent => unreachable!("upsert always leaves a stored value"),
        }
    }
}

/// Outcome of an upsert, carrying a copy of the value now stored.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Upserted<V> {
    Inserted(V),
    Updated(V),
}

impl<V> Upserted<V> {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Upserted::Inserted(_))
    }

    pub fn value(&self) -> &V {
        match self {
            Upserted::Inserted(v) | Upserted::Updated(v) => v,
        }
    }

    pub fn into_value(self) -> V {
        match self {
            Upserted::Inserted(v) | Upserted::Updated(v) => v,
        }
    }
}

/// A thread-safe hash map split into a fixed number of independently locked
/// buckets, with a last-touch timestamp on every entry.
///
/// Values carry their own keys: `X` extracts a `K` from a `V`, and `S`
/// hashes that key to pick the bucket. Lookups return clones of the stored
/// value; callbacks receive `&mut V` to the stored copy while its bucket is
/// locked.
///
/// Callbacks must not call back into the map for a key in the bucket they
/// run under. That is a self-deadlock; debug builds panic instead.
pub struct LockedHashMap<K, V, X = KeyOf, S = DefaultHashBuilder> {
    store: BucketStore<V>,
    extractor: X,
    hasher: S,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    _key: PhantomData<fn() -> K>,
}

impl<K, V> LockedHashMap<K, V>
where
    K: Eq + Hash,
    V: Keyed<Key = K>,
{
    /// Map over self-keyed values. Panics if `bucket_count` is zero.
    pub fn new(bucket_count: usize, ttl: Duration) -> Self {
        Self::with_extractor(bucket_count, ttl, KeyOf)
    }
}

impl<K, V, X> LockedHashMap<K, V, X>
where
    K: Eq + Hash,
    X: KeyExtractor<V, K>,
{
    /// Panics if `bucket_count` is zero.
    pub fn with_extractor(bucket_count: usize, ttl: Duration, extractor: X) -> Self {
        Self::from_parts(
            bucket_count,
            ttl,
            extractor,
            DefaultHashBuilder::default(),
            Arc::new(SystemClock),
        )
    }
}

impl<K, V, X, S> LockedHashMap<K, V, X, S>
where
    K: Eq + Hash,
    X: KeyExtractor<V, K>,
    S: BuildHasher,
{
    pub(crate) fn from_parts(
        bucket_count: usize,
        ttl: Duration,
        extractor: X,
        hasher: S,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = BucketStore::new(bucket_count);
        debug!(
            "locked hashmap created: buckets={} ttl={:?}",
            bucket_count, ttl
        );
        Self {
            store,
            extractor,
            hasher,
            ttl,
            clock,
            _key: PhantomData,
        }
    }

    /// Total number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.store.size()
    }

    /// Same as [`len`](Self::len).
    #[inline]
    pub fn size(&self) -> usize {
        self.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.store.count()
    }

    #[inline]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Index of the bucket `key` lives in.
    #[inline]
    pub fn bucket_of(&self, key: &K) -> usize {
        self.store.index_of(self.hasher.hash_one(key))
    }

    #[inline]
    fn lock_key(&self, key: &K) -> LockedBucket<'_, V> {
        self.store.lock(self.bucket_of(key))
    }

    /// Scan a locked bucket's chain for `key`, comparing extracted keys.
    #[inline]
    fn position(&self, bucket: &LockedBucket<'_, V>, key: &K) -> Option<Handle> {
        bucket
            .chain()
            .find(|v| self.extractor.extract(v) == *key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        let bucket = self.lock_key(key);
        self.position(&bucket, key).is_some()
    }

    /// Run `f` on the stored value for `key`, if any. Does not refresh the
    /// entry's timestamp.
    pub fn find<F>(&self, key: &K, f: F)
    where
        F: FnOnce(&mut V),
    {
        let mut bucket = self.lock_key(key);
        if let Some(h) = self.position(&bucket, key) {
            if let Some(entry) = bucket.entry_mut(h) {
                f(&mut entry.value);
            }
        }
    }

    /// [`find`](Self::find) with the key taken from `probe`.
    pub fn find_by<F>(&self, probe: &V, f: F)
    where
        F: FnOnce(&mut V),
    {
        self.find(&self.extractor.extract(probe), f)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.remove_if(key, |_| true)
    }

    pub fn remove_by(&self, probe: &V) -> Option<V> {
        self.remove(&self.extractor.extract(probe))
    }

    /// Remove the entry for `key` if `pred` approves it.
    ///
    /// `pred` sees the stored value before anything is unlinked; returning
    /// false keeps the entry and yields `None`.
    pub fn remove_if<P>(&self, key: &K, pred: P) -> Option<V>
    where
        P: FnOnce(&V) -> bool,
    {
        let mut bucket = self.lock_key(key);
        let h = self.position(&bucket, key)?;
        let approved = bucket.chain().entry(h).is_some_and(|e| pred(&e.value));
        if !approved {
            return None;
        }
        bucket.remove(h).map(|e| e.value)
    }

    /// Visit every entry, bucket by bucket in index order and most recently
    /// inserted first within a bucket.
    ///
    /// `f` gets the bucket index, the entry's last-touch time and the stored
    /// value; returning true refreshes the timestamp. Entries inserted into a
    /// bucket after it has been visited are not seen.
    pub fn visit<F>(&self, mut f: F)
    where
        F: FnMut(usize, Instant, &mut V) -> bool,
    {
        for i in 0..self.store.count() {
            let mut bucket = self.store.lock(i);
            let mut cur = bucket.chain().head();
            while let Some(h) = cur {
                cur = bucket.chain().next(h);
                if let Some(entry) = bucket.entry_mut(h) {
                    if f(i, entry.touched, &mut entry.value) {
                        entry.touch(self.clock.now());
                    }
                }
            }
        }
    }

    /// Like [`visit`](Self::visit), but returning true removes the entry.
    /// Removed values are dropped once their bucket is unlocked.
    pub fn visit_remove<F>(&self, mut f: F)
    where
        F: FnMut(usize, Instant, &mut V) -> bool,
    {
        self.sweep(|i, e| f(i, e.touched, &mut e.value), drop);
    }

    /// Remove every entry idle for longer than the TTL.
    ///
    /// Returns `None` when the TTL is zero or nothing had expired; otherwise
    /// the removed values in visit order.
    pub fn expire(&self) -> Option<Vec<V>> {
        if self.ttl.is_zero() {
            return None;
        }
        let (ttl, now) = (self.ttl, self.clock.now());
        let mut expired = Vec::new();
        self.sweep(|_, e| e.is_expired(now, ttl), |v| expired.push(v));
        if !expired.is_empty() {
            debug!("expired {} entries (ttl={:?})", expired.len(), ttl);
        }
        (!expired.is_empty()).then_some(expired)
    }

    /// Remove every entry for which `pred(value, last_touch)` is true,
    /// whatever the TTL. Same return convention as [`expire`](Self::expire).
    pub fn expire_by<P>(&self, mut pred: P) -> Option<Vec<V>>
    where
        P: FnMut(&V, Instant) -> bool,
    {
        let mut expired = Vec::new();
        self.sweep(|_, e| pred(&e.value, e.touched), |v| expired.push(v));
        if !expired.is_empty() {
            debug!("expired {} entries by predicate", expired.len());
        }
        (!expired.is_empty()).then_some(expired)
    }

    /// Remove every entry. Bucket count and TTL are kept.
    pub fn clear(&self) {
        let removed = self.sweep(|_, _| true, drop);
        debug!("cleared {} entries", removed);
    }

    /// Per-bucket entry counts, each read under its bucket's lock.
    pub fn bucket_elements(&self) -> Vec<usize> {
        (0..self.store.count())
            .map(|i| self.store.lock(i).len())
            .collect()
    }

    /// Per-bucket counts read without locking. May be stale while writers
    /// run, but safe to call from inside a callback.
    pub fn bucket_counts_hint(&self) -> Vec<usize> {
        (0..self.store.count())
            .map(|i| self.store.len_hint(i))
            .collect()
    }

    /// Read-only walk for diagnostics. Buckets that look empty are skipped
    /// without being locked.
    pub fn inspect<F>(&self, mut f: F)
    where
        F: FnMut(usize, &V),
    {
        for i in 0..self.store.count() {
            if self.store.len_hint(i) == 0 {
                continue;
            }
            let bucket = self.store.lock(i);
            for (_, entry) in bucket.chain().iter() {
                f(i, &entry.value);
            }
        }
    }

    /// Destructive walk shared by `visit_remove`, the sweeps and `clear`.
    ///
    /// Each bucket's doomed values are handed to `sink` after that bucket is
    /// unlocked, so a value's `Drop` may safely call back into the map.
    fn sweep<F, G>(&self, mut doomed: F, mut sink: G) -> usize
    where
        F: FnMut(usize, &mut Entry<V>) -> bool,
        G: FnMut(V),
    {
        let mut total = 0;
        let mut batch = Vec::new();
        for i in 0..self.store.count() {
            {
                let mut bucket = self.store.lock(i);
                if bucket.chain().is_empty() {
                    continue;
                }
                let mut cur = bucket.chain().head();
                while let Some(h) = cur {
                    cur = bucket.chain().next(h);
                    let hit = bucket.entry_mut(h).is_some_and(|e| doomed(i, e));
                    if hit {
                        if let Some(entry) = bucket.remove(h) {
                            batch.push(entry.value);
                        }
                    }
                }
            }
            if !batch.is_empty() {
                trace!("bucket {}: removed {}", i, batch.len());
                total += batch.len();
                batch.drain(..).for_each(&mut sink);
            }
        }
        total
    }
}

impl<K, V, X, S> LockedHashMap<K, V, X, S>
where
    K: Eq + Hash,
    V: Clone,
    X: KeyExtractor<V, K>,
    S: BuildHasher,
{
    /// The search / insert / update state machine, under one lock acquisition.
    fn operate<F>(&self, key: &K, req: Request<V, F>) -> Access<V>
    where
        F: FnOnce(&mut V),
    {
        let mut bucket = self.lock_key(key);
        let Some(h) = self.position(&bucket, key) else {
            return match req {
                Request::Upsert(value)
                | Request::Replace(value)
                | Request::UpsertWith(value, _) => {
                    let stored = value.clone();
                    bucket.insert(Entry::new(value, self.clock.now()));
                    Access::Inserted(stored)
                }
                Request::Lookup | Request::Touch | Request::Modify(_) => Access::Absent,
            };
        };
        let now = self.clock.now();
        let Some(entry) = bucket.entry_mut(h) else {
            return Access::Absent;
        };
        // Values leaving the map are dropped after the bucket is unlocked.
        let displaced = match req {
            Request::Lookup => return Access::Found(entry.value.clone()),
            Request::Touch => None,
            Request::Modify(f) => {
                f(&mut entry.value);
                None
            }
            Request::UpsertWith(unused, f) => {
                f(&mut entry.value);
                Some(unused)
            }
            Request::Upsert(unused) => Some(unused),
            Request::Replace(value) => Some(mem::replace(&mut entry.value, value)),
        };
        entry.touch(now);
        let out = Access::Updated(entry.value.clone());
        drop(bucket);
        drop(displaced);
        out
    }

    /// Copy of the value stored under `key`. Does not refresh its timestamp.
    pub fn get(&self, key: &K) -> Option<V> {
        self.operate::<fn(&mut V)>(key, Request::Lookup)
            .into_value()
    }

    /// Lookup keyed by a (possibly partially filled) probe value.
    pub fn get_by(&self, probe: &V) -> Option<V> {
        self.get(&self.extractor.extract(probe))
    }

    /// Refresh the entry's timestamp without touching its value.
    pub fn alive(&self, key: &K) -> Option<V> {
        self.operate::<fn(&mut V)>(key, Request::Touch)
            .into_value()
    }

    /// Mutate an existing entry in place and refresh it. Returns the updated
    /// value, or `None` if `key` is absent; never inserts.
    pub fn update<F>(&self, key: &K, f: F) -> Option<V>
    where
        F: FnOnce(&mut V),
    {
        self.operate(key, Request::Modify(f)).into_value()
    }

    pub fn update_by<F>(&self, probe: &V, f: F) -> Option<V>
    where
        F: FnOnce(&mut V),
    {
        self.update(&self.extractor.extract(probe), f)
    }

    /// Insert `value` if its key is absent. Otherwise the stored value is kept,
    /// `value` is dropped, and only the timestamp is refreshed.
    pub fn upsert(&self, value: V) -> Upserted<V> {
        let key = self.extractor.extract(&value);
        self.operate::<fn(&mut V)>(&key, Request::Upsert(value))
            .into_upserted()
    }

    /// [`upsert`](Self::upsert) with the key supplied by the caller.
    ///
    /// Panics if `key` is not the key of `value`.
    pub fn upsert_at(&self, key: K, value: V) -> Upserted<V> {
        assert!(
            self.extractor.extract(&value) == key,
            "upsert_at: key does not match the value's extracted key"
        );
        self.operate::<fn(&mut V)>(&key, Request::Upsert(value))
            .into_upserted()
    }

    /// Insert `value`, or overwrite the stored value with the same key.
    pub fn replace(&self, value: V) -> Upserted<V> {
        let key = self.extractor.extract(&value);
        self.operate::<fn(&mut V)>(&key, Request::Replace(value))
            .into_upserted()
    }

    /// Insert `value` if its key is absent; otherwise leave `value` unused and
    /// apply `f` to the stored value instead.
    pub fn upsert_with<F>(&self, value: V, f: F) -> Upserted<V>
    where
        F: FnOnce(&mut V),
    {
        let key = self.extractor.extract(&value);
        self.operate(&key, Request::UpsertWith(value, f))
            .into_upserted()
    }
}

impl<K, V, X, S> fmt::Debug for LockedHashMap<K, V, X, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedHashMap")
            .field("buckets", &self.store.count())
            .field("ttl", &self.ttl)
            .field("len", &self.store.size())
            .finish_non_exhaustive()
    }
}
