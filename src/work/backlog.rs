use std::collections::VecDeque;
use std::sync::Mutex;

/// Shared FIFO of pending work items.
///
/// Multi-producer multi-consumer: every worker pops from the head, and retried
/// items re-enter at the tail. No uniqueness constraint is imposed, so the same
/// logical item may appear more than once after a requeue.
pub struct Backlog<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> Backlog<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends one item at the tail.
    pub fn push(&self, item: T) {
        self.items.lock().unwrap().push_back(item);
    }

    /// Appends a batch of items at the tail, preserving their order.
    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        self.items.lock().unwrap().extend(items);
    }

    /// Removes and returns the head item, or `None` when the backlog is empty.
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().unwrap().pop_front()
    }

    /// Whether any items are pending, without removing one. Used for
    /// finish-boundary reasoning and by the metrics reporter.
    pub fn has_items(&self) -> bool {
        !self.items.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_items()
    }
}

impl<T> Default for Backlog<T> {
    fn default() -> Self {
        Self::new()
    }
}
