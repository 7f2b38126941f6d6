//! Builder: configuration surface for `LockedHashMap`.

use crate::clock::{Clock, SystemClock};
use crate::key::{KeyExtractor, KeyOf};
use crate::map::LockedHashMap;
use core::hash::{BuildHasher, Hash};
use hashbrown::hash_map::DefaultHashBuilder;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BUCKETS: usize = 64;

/// Collects construction parameters for a [`LockedHashMap`].
///
/// ```
/// use locked_hashmap::{Builder, LockedHashMap};
/// use std::time::Duration;
///
/// let map: LockedHashMap<u32, (u32, &str), _> = Builder::new()
///     .buckets(16)
///     .ttl(Duration::from_secs(30))
///     .extractor(|v: &(u32, &str)| v.0)
///     .build();
/// map.upsert((1, "one"));
/// assert_eq!(map.get(&1), Some((1, "one")));
/// ```
pub struct Builder<X = KeyOf, S = DefaultHashBuilder> {
    buckets: usize,
    ttl: Duration,
    extractor: X,
    hasher: S,
    clock: Arc<dyn Clock>,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            buckets: DEFAULT_BUCKETS,
            ttl: Duration::ZERO,
            extractor: KeyOf,
            hasher: DefaultHashBuilder::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl<X, S> Builder<X, S> {
    /// Number of buckets, fixed for the map's lifetime. Zero panics at `build`.
    pub fn buckets(mut self, n: usize) -> Self {
        self.buckets = n;
        self
    }

    /// Maximum age since last touch before `expire` removes an entry.
    /// `Duration::ZERO` disables expiration.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn extractor<X2>(self, extractor: X2) -> Builder<X2, S> {
        Builder {
            buckets: self.buckets,
            ttl: self.ttl,
            extractor,
            hasher: self.hasher,
            clock: self.clock,
        }
    }

    pub fn hasher<S2>(self, hasher: S2) -> Builder<X, S2> {
        Builder {
            buckets: self.buckets,
            ttl: self.ttl,
            extractor: self.extractor,
            hasher,
            clock: self.clock,
        }
    }

    pub fn build<K, V>(self) -> LockedHashMap<K, V, X, S>
    where
        K: Eq + Hash,
        X: KeyExtractor<V, K>,
        S: BuildHasher,
    {
        LockedHashMap::from_parts(
            self.buckets,
            self.ttl,
            self.extractor,
            self.hasher,
            self.clock,
        )
    }
}

impl<X, S> fmt::Debug for Builder<X, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("buckets", &self.buckets)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::collections::hash_map::RandomState;

    #[test]
    fn defaults() {
        let m: LockedHashMap<u8, (u8, u8), _> = Builder::new().extractor(|v: &(u8, u8)| v.0).build();
        assert_eq!(m.bucket_count(), DEFAULT_BUCKETS);
        assert_eq!(m.ttl(), Duration::ZERO);
        assert!(m.is_empty());
    }

    /// Invariant: every builder setting reaches the built map.
    #[test]
    fn settings_carry_through() {
        let clock = ManualClock::new();
        let m: LockedHashMap<String, String, _, RandomState> = Builder::new()
            .buckets(7)
            .ttl(Duration::from_secs(2))
            .clock(clock.clone())
            .hasher(RandomState::new())
            .extractor(|s: &String| s.clone())
            .build();
        assert_eq!(m.bucket_count(), 7);
        assert_eq!(m.ttl(), Duration::from_secs(2));

        m.upsert("a".to_string());
        clock.advance(Duration::from_secs(3));
        assert_eq!(m.expire(), Some(vec!["a".to_string()]));
    }

    #[test]
    #[should_panic(expected = "bucket count must be positive")]
    fn zero_buckets_panics_at_build() {
        let _m: LockedHashMap<u8, u8, _> = Builder::new().buckets(0).extractor(|v: &u8| *v).build();
    }
}
