//! locked-hashmap: a thread-safe hash map split into a fixed number of
//! independently locked buckets, with a last-touch timestamp on every entry
//! and explicit expiration sweeps.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a building block for caches and registries shared by many
//!   threads, without one global lock serializing every access.
//! - Layers:
//!   - Chain<V>: a bucket's collision list. Nodes live in a slot arena and
//!     link to each other through generational handles, so any node can be
//!     unlinked in O(1) once found and no raw back-pointers exist.
//!   - BucketStore<V>: the fixed bucket array. Locking a bucket yields a
//!     `LockedBucket`, the only path to a chain; its insert/remove keep
//!     the per-bucket count and the map-wide size in step.
//!   - LockedHashMap<K, V, X, S>: public API. Hashes the key, locks one
//!     bucket once, and runs a search / insert / update request against it.
//!
//! Constraints
//! - Bucket count fixed at construction; no rehashing.
//! - Keys are not stored. A `KeyExtractor` derives the key from each value
//!   during scans, and operations that take a value derive its key the same
//!   way, so hashing and equality always agree.
//! - At most one entry per key. Upserting an existing key keeps the stored
//!   value and refreshes it; `replace` overwrites, mutators edit in place.
//! - Lookups return clones. Callbacks get `&mut V` to the stored value while
//!   its bucket is locked.
//!
//! Locking policy
//! - Every key operation locks exactly one bucket, exactly once. Whole-map
//!   operations lock one bucket at a time in index order.
//! - Bucket locks are not reentrant. A callback may use keys in other
//!   buckets, but calling back into its own bucket is a self-deadlock; a
//!   debug-only guard detects it and panics first. Two threads each holding
//!   a bucket and reaching for the other's from a callback will deadlock;
//!   nothing prevents that.
//! - Values leaving the map are dropped after their bucket is unlocked, so
//!   `Drop` for `V` may call back into the map.
//!
//! Counters
//! - `len()` reads an atomic total updated at every insert and removal.
//! - `bucket_elements()` reads each bucket's count under its lock. With
//!   writers active, the sum may briefly disagree with `len()`.
//!
//! Expiration
//! - Entries are stamped from the map's `Clock` on insert and on every
//!   refresh (`alive`, `update`, upserts, `replace`, `visit` returning true). Plain
//!   lookups and `find` do not refresh.
//! - `expire()` removes entries idle for longer than the TTL; a zero TTL
//!   turns it into a no-op. `expire_by` takes a caller predicate instead.
//!   Both return `None` when nothing was removed.
//!
//! Notes and non-goals
//! - No lock-free paths, no resizing, no eviction beyond TTL or predicates.
//! - No global state: every map is constructed explicitly.
//!
//! ```
//! use locked_hashmap::{Keyed, LockedHashMap};
//! use std::time::Duration;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Person { name: String, empno: i32, hits: u32 }
//!
//! impl Keyed for Person {
//!     type Key = (String, i32);
//!     fn key(&self) -> Self::Key { (self.name.clone(), self.empno) }
//! }
//!
//! let map = LockedHashMap::new(100, Duration::from_secs(60));
//! map.upsert(Person { name: "P1".into(), empno: 1, hits: 0 });
//! let p = map.update(&("P1".to_string(), 1), |p| p.hits += 1).unwrap();
//! assert_eq!(p.hits, 1);
//! assert_eq!(map.len(), 1);
//! ```

mod bucket;
mod builder;
mod chain;
pub mod clock;
mod entry;
pub mod key;
mod map;
mod map_proptest;
mod reentrancy;

// Public surface
pub use builder::{Builder, DEFAULT_BUCKETS};
pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{KeyExtractor, KeyOf, Keyed};
pub use map::{LockedHashMap, Upserted};
