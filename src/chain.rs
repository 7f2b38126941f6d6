//! Chain: a bucket's collision list, stored as an arena of doubly linked nodes.
//!
//! Nodes live in a `SlotMap` and link to each other through generational
//! handles instead of pointers, so unlinking from the head, the middle or the
//! tail is O(1) once a node is found, and a handle to a removed node can never
//! resolve to whatever reuses its slot. New nodes go to the front; there is no
//! key ordering.
//!
//! A `Chain` is not synchronized. The owning bucket keeps it behind its lock.

use crate::entry::Entry;
use slotmap::{DefaultKey, SlotMap};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct Handle(DefaultKey);

#[derive(Debug)]
struct Node<V> {
    entry: Entry<V>,
    prev: Option<DefaultKey>,
    next: Option<DefaultKey>,
}

#[derive(Debug)]
pub(crate) struct Chain<V> {
    head: Option<DefaultKey>,
    slots: SlotMap<DefaultKey, Node<V>>,
}

/// Iterator over entries in chain order (most recently inserted first).
pub(crate) struct Iter<'a, V> {
    chain: &'a Chain<V>,
    cur: Option<DefaultKey>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (Handle, &'a Entry<V>);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let k = self.cur?;
        let node = self.chain.slots.get(k)?;
        self.cur = node.next;
        Some((Handle(k), &node.entry))
    }
}

impl<V> Chain<V> {
    pub(crate) fn new() -> Self {
        Self {
            head: None,
            slots: SlotMap::with_key(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub(crate) fn head(&self) -> Option<Handle> {
        self.head.map(Handle)
    }

    /// Successor of `h`, or `None` at the tail or for a stale handle.
    #[inline]
    pub(crate) fn next(&self, h: Handle) -> Option<Handle> {
        self.slots.get(h.0).and_then(|n| n.next).map(Handle)
    }

    pub(crate) fn entry(&self, h: Handle) -> Option<&Entry<V>> {
        self.slots.get(h.0).map(|n| &n.entry)
    }

    pub(crate) fn entry_mut(&mut self, h: Handle) -> Option<&mut Entry<V>> {
        self.slots.get_mut(h.0).map(|n| &mut n.entry)
    }

    /// First node, in chain order, whose value satisfies `pred`.
    pub(crate) fn find<P>(&self, mut pred: P) -> Option<Handle>
    where
        P: FnMut(&V) -> bool,
    {
        self.iter()
            .find(|(_, e)| pred(&e.value))
            .map(|(h, _)| h)
    }

    pub(crate) fn push_front(&mut self, entry: Entry<V>) -> Handle {
        let old_head = self.head;
        let k = self.slots.insert(Node {
            entry,
            prev: None,
            next: old_head,
        });
        if let Some(h) = old_head {
            if let Some(n) = self.slots.get_mut(h) {
                n.prev = Some(k);
            }
        }
        self.head = Some(k);
        Handle(k)
    }

    /// Detach `h` from the chain and hand back its entry. Stale handles yield `None`.
    pub(crate) fn unlink(&mut self, h: Handle) -> Option<Entry<V>> {
        let node = self.slots.remove(h.0)?;
        match node.prev {
            Some(p) => {
                if let Some(pn) = self.slots.get_mut(p) {
                    pn.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        if let Some(n) = node.next {
            if let Some(nn) = self.slots.get_mut(n) {
                nn.prev = node.prev;
            }
        }
        Some(node.entry)
    }

    pub(crate) fn iter(&self) -> Iter<'_, V> {
        Iter {
            chain: self,
            cur: self.head,
        }
    }
}

impl<V> Default for Chain<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn chain_of(values: &[&'static str]) -> (Chain<&'static str>, Vec<Handle>) {
        let now = Instant::now();
        let mut c = Chain::new();
        let hs = values
            .iter()
            .map(|v| c.push_front(Entry::new(*v, now)))
            .collect();
        (c, hs)
    }

    fn order(c: &Chain<&'static str>) -> Vec<&'static str> {
        c.iter().map(|(_, e)| e.value).collect()
    }

    /// Invariant: push_front yields most-recently-inserted-first order.
    #[test]
    fn push_front_order() {
        let (c, _) = chain_of(&["a", "b", "c"]);
        assert_eq!(order(&c), vec!["c", "b", "a"]);
        assert_eq!(c.len(), 3);
    }

    /// Invariant: unlinking head, interior and tail each relink neighbours.
    #[test]
    fn unlink_head_interior_tail() {
        // chain order: d c b a
        let (mut c, hs) = chain_of(&["a", "b", "c", "d"]);

        assert_eq!(c.unlink(hs[3]).map(|e| e.value), Some("d"));
        assert_eq!(order(&c), vec!["c", "b", "a"]);
        assert_eq!(c.head(), Some(hs[2]));

        assert_eq!(c.unlink(hs[1]).map(|e| e.value), Some("b"));
        assert_eq!(order(&c), vec!["c", "a"]);
        assert_eq!(c.next(hs[2]), Some(hs[0]));

        assert_eq!(c.unlink(hs[0]).map(|e| e.value), Some("a"));
        assert_eq!(order(&c), vec!["c"]);
        assert_eq!(c.next(hs[2]), None);

        assert_eq!(c.unlink(hs[2]).map(|e| e.value), Some("c"));
        assert!(c.is_empty());
        assert_eq!(c.head(), None);
    }

    /// Invariant: a removed node's handle never resolves, even if the slot is reused.
    #[test]
    fn stale_handle_does_not_alias_new_node() {
        let (mut c, hs) = chain_of(&["old"]);
        let _ = c.unlink(hs[0]).unwrap();
        let h2 = c.push_front(Entry::new("new", Instant::now()));
        assert_ne!(hs[0], h2);
        assert!(c.entry(hs[0]).is_none());
        assert!(c.unlink(hs[0]).is_none());
        assert_eq!(order(&c), vec!["new"]);
    }

    /// Invariant: find scans in chain order and returns the first match.
    #[test]
    fn find_first_in_chain_order() {
        let (c, hs) = chain_of(&["x1", "y", "x2"]);
        let h = c.find(|v| v.starts_with('x')).unwrap();
        assert_eq!(h, hs[2]);
        assert!(c.find(|v| *v == "zzz").is_none());
    }

    /// Invariant: a cursor that saves the successor before unlinking visits every node.
    #[test]
    fn cursor_survives_unlink_of_current() {
        let (mut c, _) = chain_of(&["a", "b", "c", "d", "e"]);
        let mut seen = Vec::new();
        let mut cur = c.head();
        while let Some(h) = cur {
            let next = c.next(h);
            let v = c.entry(h).unwrap().value;
            seen.push(v);
            if v != "c" {
                c.unlink(h);
            }
            cur = next;
        }
        assert_eq!(seen, vec!["e", "d", "c", "b", "a"]);
        assert_eq!(order(&c), vec!["c"]);
    }

    #[test]
    fn entry_mut_updates_in_place() {
        let (mut c, hs) = chain_of(&["a"]);
        c.entry_mut(hs[0]).unwrap().value = "z";
        assert_eq!(order(&c), vec!["z"]);
        assert_eq!(c.len(), 1);
    }
}
