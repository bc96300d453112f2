//! Bounded history containers.

use std::collections::VecDeque;

/// Append-only buffer with a fixed capacity.
///
/// Once full, every append evicts the oldest entry by insertion order, so the
/// length never exceeds `capacity`. Reads hand out owned copies; callers never
/// observe the buffer mid-mutation.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> HistoryBuffer<T> {
    /// Create an empty buffer. A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Append an item, returning how many old entries were evicted.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push_back(item);
        self.evict()
    }

    /// Append every item in order. Returns the total eviction count.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) -> usize {
        items.into_iter().map(|item| self.push(item)).sum()
    }

    fn evict(&mut self) -> usize {
        let mut evicted = 0;
        while self.items.len() > self.capacity {
            self.items.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-first iteration over the live entries.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    /// Mutable access for in-place lifecycle updates. Length cannot change.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }

    /// Copy of matching entries, oldest first, truncated to the newest `limit`.
    pub fn snapshot<F>(&self, limit: Option<usize>, filter: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        let mut out: Vec<T> = self
            .items
            .iter()
            .rev()
            .filter(|item| filter(*item))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        out.reverse();
        out
    }
}
