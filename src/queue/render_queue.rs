//! Per-stage render queue

use std::cmp::Ordering;

use crate::queue::RenderOrderKey;
use crate::visibility::ItemId;

/// Entries reserved by [`RenderQueue::new`]
pub const DEFAULT_CAPACITY: usize = 250;

/// Sort entry; `index` points into the item storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    key: RenderOrderKey,
    index: u32,
}

/// Key-ordered collection of items for one stage and one frame.
///
/// Items are stored in insertion order and sorted through a separate index
/// list, so [`RenderQueue::clear`] keeps both allocations for the next frame.
/// Equal keys are ordered by insertion, which makes every sort deterministic.
#[derive(Debug, Clone)]
pub struct RenderQueue<T = ItemId> {
    entries: Vec<QueueEntry>,
    items: Vec<T>,
}

impl<T> RenderQueue<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            items: Vec::with_capacity(capacity),
        }
    }

    /// Append `item` with the key it has now; later movement is not seen
    pub fn add(&mut self, item: T, key: RenderOrderKey) {
        let index = self.items.len() as u32;
        self.entries.push(QueueEntry { key, index });
        self.items.push(item);
    }

    pub fn add_range(&mut self, items: impl IntoIterator<Item = (T, RenderOrderKey)>) {
        for (item, key) in items {
            self.add(item, key);
        }
    }

    /// Empty the queue, keeping its storage
    pub fn clear(&mut self) {
        self.entries.clear();
        self.items.clear();
    }

    /// Sort by ascending key, then insertion order
    pub fn sort(&mut self) {
        self.entries.sort_unstable();
    }

    /// Sort with a custom key comparer; ties still fall back to insertion order
    pub fn sort_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&RenderOrderKey, &RenderOrderKey) -> Ordering,
    {
        self.entries
            .sort_unstable_by(|a, b| compare(&a.key, &b.key).then(a.index.cmp(&b.index)));
    }

    /// Items in the order of the last sort, insertion order if never sorted
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            entries: self.entries.iter(),
            items: &self.items,
        }
    }

    /// Keys in iteration order
    pub fn keys(&self) -> impl Iterator<Item = RenderOrderKey> + '_ {
        self.entries.iter().map(|e| e.key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }
}

impl<T> Default for RenderQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowing iterator over a [`RenderQueue`].
///
/// The queue cannot be modified while an iterator is alive; a new call to
/// [`RenderQueue::iter`] starts again from the first sorted item.
pub struct Iter<'a, T> {
    entries: std::slice::Iter<'a, QueueEntry>,
    items: &'a [T],
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries
            .next()
            .map(|entry| &self.items[entry.index as usize])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<'a, T> IntoIterator for &'a RenderQueue<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
