//! Debug-only reentrancy guard for bucket locks.
//!
//! Bucket locks are not reentrant: a callback that calls back into the map
//! for a key in the bucket it is running under would block on its own lock
//! forever. In debug builds each thread records the buckets it currently
//! holds, and entering one twice panics before the lock is touched. In
//! release builds this compiles to a zero-cost no-op.

use core::marker::PhantomData;

#[cfg(debug_assertions)]
use std::cell::RefCell;

#[cfg(debug_assertions)]
thread_local! {
    static HELD: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Per-bucket reentrancy tracker. Embed it next to the lock it guards and
/// call `let _g = self.reentrancy.enter();` before locking.
#[derive(Debug)]
pub(crate) struct DebugReentrancy {
    // Gives every tracker a distinct address to key the per-thread set on.
    #[cfg(debug_assertions)]
    _anchor: u8,
}

impl DebugReentrancy {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            _anchor: 0,
        }
    }

    /// Enter a guarded section. In debug builds, panics if this thread is
    /// already inside one for the same tracker.
    #[inline]
    pub(crate) fn enter(&self) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            let id = self as *const Self as usize;
            HELD.with(|held| {
                let mut held = held.borrow_mut();
                assert!(
                    !held.contains(&id),
                    "reentrancy detected: callback re-entered a bucket lock held by this thread"
                );
                held.push(id);
            });
            ReentrancyGuard {
                owner: self,
                _nosend: PhantomData,
            }
        }

        #[cfg(not(debug_assertions))]
        {
            ReentrancyGuard {
                _z: PhantomData,
                _nosend: PhantomData,
            }
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by `DebugReentrancy::enter`. Tied to the entering thread.
pub(crate) struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
    _nosend: PhantomData<*mut ()>,
}

impl<'a> Drop for ReentrancyGuard<'a> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            let id = self.owner as *const DebugReentrancy as usize;
            // try_with: the thread-local may already be gone during thread teardown.
            let _ = HELD.try_with(|held| {
                let mut held = held.borrow_mut();
                let pos = held.iter().rposition(|&h| h == id);
                debug_assert!(pos.is_some());
                if let Some(pos) = pos {
                    held.swap_remove(pos);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DebugReentrancy;

    #[test]
    fn enter_and_exit_is_ok() {
        let r = DebugReentrancy::new();
        {
            let _g = r.enter();
        }
        // Released: entering again is fine.
        let _g = r.enter();
    }

    #[test]
    fn distinct_trackers_nest() {
        let a = DebugReentrancy::new();
        let b = DebugReentrancy::new();
        let _ga = a.enter();
        let _gb = b.enter();
    }

    /// Invariant: holding a tracker on one thread does not block another thread.
    #[test]
    fn other_threads_are_independent() {
        let r = DebugReentrancy::new();
        let _g = r.enter();
        std::thread::scope(|s| {
            s.spawn(|| {
                let _g2 = r.enter();
            });
        });
    }

    #[cfg(debug_assertions)]
    #[test]
    fn reentrancy_panics_in_debug() {
        let r = DebugReentrancy::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g1 = r.enter();
            // Re-entering should panic in debug builds
            let _g2 = r.enter();
        }));
        assert!(res.is_err(), "expected reentrancy to panic in debug builds");
        // The unwound guard released its slot.
        let _g = r.enter();
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn reentrancy_noop_in_release() {
        let r = DebugReentrancy::new();
        let _g1 = r.enter();
        let _g2 = r.enter();
    }
}
