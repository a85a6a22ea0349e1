//! Memoized values with manual, cascading invalidation.
//!
//! A [`ResettableLazy`] wraps a zero-argument producer and holds at most one
//! memoized result:
//!
//! ```text
//! Empty ──get()──▶ Computing ──producer returns──▶ Ready
//!   ▲                  │                              │
//!   └──────reset()─────┴────────────reset()───────────┘
//! ```
//!
//! - `get()` on `Ready` returns a clone of the stored value.
//! - `get()` on `Computing` blocks until the in-flight computation finishes
//!   (single-flight); it never starts a second one.
//! - `reset()` drops the stored value and calls `reset()` on every child the
//!   value was built with, so invalidation walks the ownership tree.
//!
//! A reset that lands while a computation is in flight bumps an epoch
//! counter. The overtaken computation still hands its value to the caller
//! that started it, but the value is not memoized: the next `get()` computes
//! again. Waiters are woken by the reset and race to start that computation.
//!
//! A producer must not call `get()` on its own lazy; that deadlocks.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Anything whose cached state can be discarded.
pub trait Resettable: Send + Sync {
    fn reset(&self);
}

type Producer<T> = Box<dyn Fn() -> T + Send + Sync>;

enum Slot<T> {
    Empty,
    Computing,
    Ready(T),
}

struct State<T> {
    slot: Slot<T>,
    epoch: u64,
}

pub struct ResettableLazy<T> {
    producer: Producer<T>,
    state: Mutex<State<T>>,
    settled: Condvar,
    children: Vec<Arc<dyn Resettable>>,
}

impl<T: Clone + Send + Sync> ResettableLazy<T> {
    pub fn new(producer: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self::with_children(producer, Vec::new())
    }

    /// A lazy whose `reset()` also resets `children`.
    pub fn with_children(
        producer: impl Fn() -> T + Send + Sync + 'static,
        children: Vec<Arc<dyn Resettable>>,
    ) -> Self {
        Self {
            producer: Box::new(producer),
            state: Mutex::new(State {
                slot: Slot::Empty,
                epoch: 0,
            }),
            settled: Condvar::new(),
            children,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Compute-or-return-cached.
    pub fn get(&self) -> T {
        let mut state = self.lock();
        loop {
            match &state.slot {
                Slot::Ready(value) => return value.clone(),
                Slot::Computing => {
                    state = self
                        .settled
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Slot::Empty => break,
            }
        }
        let epoch = state.epoch;
        state.slot = Slot::Computing;
        drop(state);

        let mut guard = ComputeGuard {
            lazy: self,
            epoch,
            finished: false,
        };
        let value = (self.producer)();
        guard.finished = true;

        let mut state = self.lock();
        if state.epoch == epoch {
            state.slot = Slot::Ready(value.clone());
        }
        drop(state);
        self.settled.notify_all();
        value
    }

    /// The memoized value, if there is one, without computing.
    pub fn peek(&self) -> Option<T> {
        match &self.lock().slot {
            Slot::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.lock().slot, Slot::Ready(_))
    }
}

impl<T: Clone + Send + Sync> Resettable for ResettableLazy<T> {
    fn reset(&self) {
        {
            let mut state = self.lock();
            state.slot = Slot::Empty;
            state.epoch = state.epoch.wrapping_add(1);
        }
        self.settled.notify_all();
        for child in &self.children {
            child.reset();
        }
    }
}

impl<T> std::fmt::Debug for ResettableLazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state.try_lock().as_deref() {
            Ok(State {
                slot: Slot::Empty, ..
            }) => "empty",
            Ok(State {
                slot: Slot::Computing,
                ..
            }) => "computing",
            Ok(State {
                slot: Slot::Ready(_),
                ..
            }) => "ready",
            Err(_) => "locked",
        };
        f.debug_struct("ResettableLazy")
            .field("state", &state)
            .field("children", &self.children.len())
            .finish()
    }
}

/// Puts the slot back to `Empty` if the producer unwinds, so waiters retry
/// instead of blocking forever.
struct ComputeGuard<'a, T: Clone + Send + Sync> {
    lazy: &'a ResettableLazy<T>,
    epoch: u64,
    finished: bool,
}

impl<T: Clone + Send + Sync> Drop for ComputeGuard<'_, T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        {
            let mut state = self.lazy.lock();
            if state.epoch == self.epoch {
                state.slot = Slot::Empty;
            }
        }
        self.lazy.settled.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Barrier, mpsc};
    use std::thread;
    use std::time::Duration;

    fn counting() -> (Arc<AtomicUsize>, ResettableLazy<usize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let lazy = ResettableLazy::new(move || c.fetch_add(1, Ordering::SeqCst) + 1);
        (calls, lazy)
    }

    // =========================================================================
    // Memoization
    // =========================================================================

    #[test]
    fn get_twice_computes_once() {
        let (calls, lazy) = counting();
        assert_eq!(lazy.get(), 1);
        assert_eq!(lazy.get(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_forces_recompute() {
        let (calls, lazy) = counting();
        assert_eq!(lazy.get(), 1);
        lazy.reset();
        assert!(lazy.peek().is_none());
        assert_eq!(lazy.get(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn peek_does_not_compute() {
        let (calls, lazy) = counting();
        assert_eq!(lazy.peek(), None);
        assert!(!lazy.is_ready());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        lazy.get();
        assert_eq!(lazy.peek(), Some(1));
    }

    // =========================================================================
    // Cascading reset
    // =========================================================================

    #[test]
    fn reset_cascades_through_children() {
        let (leaf_calls, leaf) = counting();
        let leaf = Arc::new(leaf);
        let l = leaf.clone();
        let middle = Arc::new(ResettableLazy::with_children(
            move || l.get() * 10,
            vec![leaf.clone() as Arc<dyn Resettable>],
        ));
        let m = middle.clone();
        let root = ResettableLazy::with_children(
            move || m.get() + 1,
            vec![middle.clone() as Arc<dyn Resettable>],
        );

        assert_eq!(root.get(), 11);
        root.reset();
        assert!(!middle.is_ready());
        assert!(!leaf.is_ready());
        assert_eq!(root.get(), 21);
        assert_eq!(leaf_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn child_reset_leaves_parent_alone() {
        let (_, leaf) = counting();
        let leaf = Arc::new(leaf);
        let l = leaf.clone();
        let parent =
            ResettableLazy::with_children(move || l.get(), vec![leaf.clone() as Arc<dyn Resettable>]);
        parent.get();
        leaf.reset();
        assert!(parent.is_ready());
    }

    // =========================================================================
    // Concurrency
    // =========================================================================

    #[test]
    fn concurrent_gets_share_one_computation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let lazy = ResettableLazy::new(move || {
            thread::sleep(Duration::from_millis(50));
            c.fetch_add(1, Ordering::SeqCst)
        });
        let barrier = Barrier::new(8);
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    barrier.wait();
                    assert_eq!(lazy.get(), 0);
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_during_computation_is_not_memoized() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let started_tx = Mutex::new(started_tx);
        let release_rx = Mutex::new(release_rx);
        let calls = AtomicUsize::new(0);
        let lazy = ResettableLazy::new(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 {
                let _ = started_tx.lock().unwrap().send(());
                let _ = release_rx.lock().unwrap().recv();
            }
            n
        });

        thread::scope(|s| {
            let first = s.spawn(|| lazy.get());
            started_rx.recv().unwrap();
            lazy.reset();
            release_tx.send(()).unwrap();
            assert_eq!(first.join().unwrap(), 1);
        });
        assert_eq!(lazy.peek(), None);
        assert_eq!(lazy.get(), 2);
    }

    #[test]
    fn panicking_producer_leaves_slot_empty() {
        let calls = AtomicUsize::new(0);
        let lazy = ResettableLazy::new(move || {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first call fails");
            }
            7
        });
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| lazy.get()));
        assert!(result.is_err());
        assert!(!lazy.is_ready());
        assert_eq!(lazy.get(), 7);
    }
}
