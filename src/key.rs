//! Key extraction: how the map derives a key from a stored value.
//!
//! The map never stores keys separately. Every chain scan re-derives the key
//! of each node's value through a `KeyExtractor`, and operations that take a
//! value (as payload or as a lookup probe) go through the same extractor, so
//! hashing and equality are always computed on the same key.

/// Derives the key `K` that identifies a value `V`.
///
/// Closures `Fn(&V) -> K` implement this directly, so a map keyed by a field
/// can be built with `|p: &Person| p.name.clone()`.
pub trait KeyExtractor<V, K> {
    fn extract(&self, value: &V) -> K;
}

impl<V, K, F> KeyExtractor<V, K> for F
where
    F: Fn(&V) -> K,
{
    #[inline]
    fn extract(&self, value: &V) -> K {
        self(value)
    }
}

/// Values that know their own key.
///
/// Pair with [`KeyOf`] to build a map without spelling out a closure.
pub trait Keyed {
    type Key;

    fn key(&self) -> Self::Key;
}

/// Extractor that defers to [`Keyed::key`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct KeyOf;

impl<V> KeyExtractor<V, V::Key> for KeyOf
where
    V: Keyed,
{
    #[inline]
    fn extract(&self, value: &V) -> V::Key {
        value.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct Person {
        name: String,
        empno: i32,
    }

    impl Keyed for Person {
        type Key = (String, i32);
        fn key(&self) -> Self::Key {
            (self.name.clone(), self.empno)
        }
    }

    /// Invariant: closure extractors and `KeyOf` yield the same composite key.
    #[test]
    fn closure_and_keyed_agree() {
        let p = Person {
            name: "P1".to_string(),
            empno: 1,
        };
        let by_closure = |p: &Person| (p.name.clone(), p.empno);
        assert_eq!(by_closure.extract(&p), KeyOf.extract(&p));
        assert_eq!(KeyOf.extract(&p), ("P1".to_string(), 1));
    }

    /// Invariant: key equality ignores fields outside the key, so a partially
    /// populated probe matches the stored value.
    #[test]
    fn partial_probe_extracts_same_key() {
        #[derive(Default)]
        struct Row {
            id: u32,
            payload: Vec<u8>,
        }
        let stored = Row {
            id: 7,
            payload: vec![1, 2, 3],
        };
        let probe = Row {
            id: 7,
            ..Default::default()
        };
        let ex = |r: &Row| r.id;
        assert_eq!(ex.extract(&stored), ex.extract(&probe));
        assert!(probe.payload.is_empty());
    }
}
