//! Mutex-protected object lists with callback walks.
//!
//! Used for the per-superblock dentry LRU, inode LRU and the complete inode
//! list. The internal mutex only guards list structure and is released
//! before any walk callback runs. Removals go through the shared
//! [`ReadEpoch`] so readers inside a section keep seeing a stable list.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::epoch::{EpochGuard, ReadEpoch};

/// Verdict returned by a walk callback for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LruStatus {
    /// Drop the item from the list (deferred while readers are inside).
    Removed,
    /// Move the item to the tail (most recently used end).
    Rotate,
    /// Leave the item where it is.
    Skip,
    /// Stop walking.
    Stop,
}

type Items<T> = Arc<Mutex<VecDeque<Arc<T>>>>;

fn lock<T>(items: &Mutex<VecDeque<Arc<T>>>) -> MutexGuard<'_, VecDeque<Arc<T>>> {
    items.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Object list, head = least recently used.
pub struct ListLru<T> {
    items: Items<T>,
    epoch: Arc<ReadEpoch>,
}

impl<T: Send + Sync + 'static> ListLru<T> {
    pub fn new(epoch: Arc<ReadEpoch>) -> Self {
        Self {
            items: Arc::new(Mutex::new(VecDeque::new())),
            epoch,
        }
    }

    /// Appends an item at the most-recently-used end.
    pub fn add(&self, item: Arc<T>) {
        lock(&self.items).push_back(item);
    }

    /// Removes every occurrence of `item`, deferred past active readers.
    pub fn remove(&self, item: &Arc<T>) {
        let items = Arc::clone(&self.items);
        let target = Arc::clone(item);
        self.epoch.defer(move || {
            lock(&items).retain(|x| !Arc::ptr_eq(x, &target));
        });
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }

    /// Walks up to `nr_to_walk` items from the head, calling `f` for each.
    ///
    /// The caller must be inside a read section of this list's epoch. The
    /// item set is taken under the list mutex; the callbacks run after it is
    /// released. Returns the number of items the callback saw.
    pub fn walk<F>(&self, _guard: &EpochGuard, nr_to_walk: usize, mut f: F) -> usize
    where
        F: FnMut(&T) -> LruStatus,
    {
        let batch: Vec<Arc<T>> = lock(&self.items).iter().take(nr_to_walk).cloned().collect();

        let mut walked = 0;
        for item in batch {
            walked += 1;
            match f(&item) {
                LruStatus::Skip => {}
                LruStatus::Stop => break,
                LruStatus::Removed => self.remove(&item),
                LruStatus::Rotate => {
                    let mut items = lock(&self.items);
                    if let Some(pos) = items.iter().position(|x| Arc::ptr_eq(x, &item)) {
                        if let Some(moved) = items.remove(pos) {
                            items.push_back(moved);
                        }
                    }
                }
            }
        }
        walked
    }
}

impl<T> std::fmt::Debug for ListLru<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListLru")
            .field("len", &lock(&self.items).len())
            .finish()
    }
}
