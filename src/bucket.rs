//! Bucket store: a fixed array of independently locked chains and the
//! counters kept in step with them.
//!
//! All chain access goes through `BucketStore::lock`, which returns a
//! `LockedBucket`. Structural changes are only reachable through
//! `LockedBucket::insert` and `LockedBucket::remove`, which adjust the
//! bucket's element count and the store-wide size while the lock is held, so
//! a bucket's count equals its chain length whenever its lock is free.

use crate::chain::{Chain, Handle};
use crate::entry::Entry;
use crate::reentrancy::{DebugReentrancy, ReentrancyGuard};
use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};

struct Bucket<V> {
    chain: Mutex<Chain<V>>,
    len: AtomicUsize,
    reentrancy: DebugReentrancy,
}

impl<V> Bucket<V> {
    fn new() -> Self {
        Self {
            chain: Mutex::new(Chain::new()),
            len: AtomicUsize::new(0),
            reentrancy: DebugReentrancy::new(),
        }
    }
}

pub(crate) struct BucketStore<V> {
    buckets: Box<[CachePadded<Bucket<V>>]>,
    size: CachePadded<AtomicUsize>,
}

impl<V> BucketStore<V> {
    /// Panics if `count` is zero.
    pub(crate) fn new(count: usize) -> Self {
        assert!(count > 0, "bucket count must be positive");
        let buckets = (0..count)
            .map(|_| CachePadded::new(Bucket::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            buckets,
            size: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub(crate) fn index_of(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    /// Entries across all buckets, as of the last completed mutation.
    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Element count of bucket `index` without taking its lock. May be stale.
    #[inline]
    pub(crate) fn len_hint(&self, index: usize) -> usize {
        self.buckets[index].len.load(Ordering::Relaxed)
    }

    /// Block until bucket `index` is locked by this thread.
    ///
    /// Panics in debug builds if this thread already holds it.
    pub(crate) fn lock(&self, index: usize) -> LockedBucket<'_, V> {
        let bucket = &self.buckets[index];
        let reentry = bucket.reentrancy.enter();
        let chain = bucket.chain.lock();
        LockedBucket {
            chain,
            _reentry: reentry,
            index,
            len: &bucket.len,
            size: &self.size,
        }
    }
}

/// Exclusive access to one bucket's chain, held until dropped.
pub(crate) struct LockedBucket<'a, V> {
    chain: MutexGuard<'a, Chain<V>>,
    _reentry: ReentrancyGuard<'a>,
    index: usize,
    len: &'a AtomicUsize,
    size: &'a AtomicUsize,
}

impl<'a, V> LockedBucket<'a, V> {
    #[cfg(test)]
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn chain(&self) -> &Chain<V> {
        &self.chain
    }

    #[inline]
    pub(crate) fn entry_mut(&mut self, h: Handle) -> Option<&mut Entry<V>> {
        self.chain.entry_mut(h)
    }

    pub(crate) fn insert(&mut self, entry: Entry<V>) -> Handle {
        let h = self.chain.push_front(entry);
        self.len.fetch_add(1, Ordering::Relaxed);
        self.size.fetch_add(1, Ordering::AcqRel);
        h
    }

    pub(crate) fn remove(&mut self, h: Handle) -> Option<Entry<V>> {
        let entry = self.chain.unlink(h)?;
        self.len.fetch_sub(1, Ordering::Relaxed);
        self.size.fetch_sub(1, Ordering::AcqRel);
        Some(entry)
    }
}

impl<'a, V> Drop for LockedBucket<'a, V> {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.len.load(Ordering::Relaxed),
            self.chain.len(),
            "bucket {} count out of step with its chain",
            self.index
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Invariant: insert/remove keep the bucket count and the total in step.
    #[test]
    fn counters_follow_structural_changes() {
        let store: BucketStore<u32> = BucketStore::new(4);
        let now = Instant::now();
        let (h1, _h2) = {
            let mut b = store.lock(1);
            let h1 = b.insert(Entry::new(10, now));
            let h2 = b.insert(Entry::new(11, now));
            assert_eq!(b.len(), 2);
            (h1, h2)
        };
        {
            let mut b = store.lock(3);
            b.insert(Entry::new(30, now));
        }
        assert_eq!(store.size(), 3);
        assert_eq!(store.len_hint(1), 2);
        assert_eq!(store.len_hint(3), 1);
        assert_eq!(store.len_hint(0), 0);

        {
            let mut b = store.lock(1);
            assert_eq!(b.remove(h1).map(|e| e.value), Some(10));
            // Stale handle: nothing removed, counters untouched.
            assert!(b.remove(h1).is_none());
            assert_eq!(b.len(), 1);
        }
        assert_eq!(store.size(), 2);
    }

    #[test]
    fn index_is_hash_mod_count() {
        let store: BucketStore<()> = BucketStore::new(3);
        assert_eq!(store.count(), 3);
        assert_eq!(store.index_of(0), 0);
        assert_eq!(store.index_of(7), 1);
        assert_eq!(store.index_of(u64::MAX), (u64::MAX % 3) as usize);
    }

    #[test]
    #[should_panic(expected = "bucket count must be positive")]
    fn zero_buckets_is_fatal() {
        let _ = BucketStore::<u8>::new(0);
    }

    /// Invariant: distinct buckets can be held at once by one thread.
    #[test]
    fn distinct_buckets_lock_independently() {
        let store: BucketStore<u8> = BucketStore::new(2);
        let a = store.lock(0);
        let b = store.lock(1);
        assert_eq!((a.index(), b.index()), (0, 1));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn relocking_held_bucket_panics_in_debug() {
        let store: BucketStore<u8> = BucketStore::new(2);
        let _held = store.lock(0);
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _again = store.lock(0);
        }));
        assert!(res.is_err(), "expected reentrancy to panic in debug builds");
    }
}
