//! Entry: a stored value and the time it was last touched.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub(crate) struct Entry<V> {
    pub(crate) value: V,
    pub(crate) touched: Instant,
}

impl<V> Entry<V> {
    pub(crate) fn new(value: V, now: Instant) -> Self {
        Self {
            value,
            touched: now,
        }
    }

    #[inline]
    pub(crate) fn touch(&mut self, now: Instant) {
        self.touched = now;
    }

    #[inline]
    pub(crate) fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.touched)
    }

    /// Strictly older than `ttl`. A zero `ttl` never expires anything.
    #[inline]
    pub(crate) fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        !ttl.is_zero() && self.age(now) > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_strictly_greater_than_ttl() {
        let t0 = Instant::now();
        let ttl = Duration::from_secs(2);
        let e = Entry::new("v", t0);
        assert!(!e.is_expired(t0 + Duration::from_secs(1), ttl));
        assert!(!e.is_expired(t0 + ttl, ttl));
        assert!(e.is_expired(t0 + Duration::from_secs(3), ttl));
    }

    #[test]
    fn zero_ttl_never_expires() {
        let t0 = Instant::now();
        let e = Entry::new(1u8, t0);
        assert!(!e.is_expired(t0 + Duration::from_secs(3600), Duration::ZERO));
    }

    /// Invariant: touching resets age; a clock earlier than the stamp reads as age zero.
    #[test]
    fn touch_resets_age() {
        let t0 = Instant::now();
        let mut e = Entry::new((), t0);
        let t1 = t0 + Duration::from_secs(5);
        assert_eq!(e.age(t1), Duration::from_secs(5));
        e.touch(t1);
        assert_eq!(e.age(t1), Duration::ZERO);
        assert_eq!(e.age(t0), Duration::ZERO);
    }
}
