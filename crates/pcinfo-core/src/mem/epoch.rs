//! Read-side epochs for lists that are walked while being modified.
//!
//! A reader enters the epoch for the duration of one traversal. Writers keep
//! mutating object contents freely, but destructive structural changes
//! (removals) submitted while any reader is inside are queued and run once
//! the last reader leaves.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Deferred = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct EpochState {
    readers: usize,
    deferred: Vec<Deferred>,
}

/// Shared read epoch. One instance covers every list of a memory image.
#[derive(Default)]
pub struct ReadEpoch {
    state: Mutex<EpochState>,
}

impl ReadEpoch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, EpochState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enters a read-side section. The section ends when the guard drops,
    /// including on early return or unwinding.
    pub fn enter(self: &Arc<Self>) -> EpochGuard {
        self.state().readers += 1;
        EpochGuard {
            epoch: Arc::clone(self),
        }
    }

    /// Runs `f` now if no reader is inside, otherwise after the last one leaves.
    pub fn defer(&self, f: impl FnOnce() + Send + 'static) {
        let mut state = self.state();
        if state.readers == 0 {
            drop(state);
            f();
        } else {
            state.deferred.push(Box::new(f));
        }
    }

    /// Number of readers currently inside.
    pub fn readers(&self) -> usize {
        self.state().readers
    }

    /// Number of structural changes waiting for readers to leave.
    pub fn pending(&self) -> usize {
        self.state().deferred.len()
    }

    fn leave(&self) {
        let ready = {
            let mut state = self.state();
            state.readers = state.readers.saturating_sub(1);
            if state.readers == 0 {
                std::mem::take(&mut state.deferred)
            } else {
                Vec::new()
            }
        };
        for f in ready {
            f();
        }
    }
}

impl std::fmt::Debug for ReadEpoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ReadEpoch")
            .field("readers", &state.readers)
            .field("deferred", &state.deferred.len())
            .finish()
    }
}

/// Proof of being inside a read-side section.
#[must_use = "the read section ends as soon as the guard is dropped"]
pub struct EpochGuard {
    epoch: Arc<ReadEpoch>,
}

impl Drop for EpochGuard {
    fn drop(&mut self) {
        self.epoch.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_defer_runs_immediately_without_readers() {
        let epoch = ReadEpoch::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        epoch.defer(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(epoch.pending(), 0);
    }

    #[test]
    fn test_defer_waits_for_last_reader() {
        let epoch = ReadEpoch::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let outer = epoch.enter();
        let inner = epoch.enter();
        let h = Arc::clone(&hits);
        epoch.defer(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(epoch.readers(), 2);
        assert_eq!(epoch.pending(), 1);

        drop(inner);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        drop(outer);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(epoch.readers(), 0);
        assert_eq!(epoch.pending(), 0);
    }

    #[test]
    fn test_guard_released_on_unwind() {
        let epoch = ReadEpoch::new();
        let e = Arc::clone(&epoch);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = e.enter();
            panic!("walker failed");
        }));
        assert!(result.is_err());
        assert_eq!(epoch.readers(), 0);
    }
}
