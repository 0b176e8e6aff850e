//! Bounded duplicate detection.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

const DEFAULT_CAPACITY: usize = 4096;

/// A set that remembers only the most recently inserted values.
///
/// Used to detect replays of ids that have reached a terminal state
/// (released reservations, resolved composites) without growing for the
/// life of the process. When the capacity is exceeded the oldest entry
/// is evicted; a replay older than the window is reported as unknown
/// rather than as a duplicate.
#[derive(Debug)]
pub struct RecentSet<T> {
    set: HashSet<T>,
    order: VecDeque<T>,
    capacity: usize,
}

impl<T: Eq + Hash + Clone> RecentSet<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            set: HashSet::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Insert a value, evicting the oldest entry when full. Returns
    /// `true` if the value was not already present.
    pub fn insert(&mut self, value: T) -> bool {
        if !self.set.insert(value.clone()) {
            return false;
        }
        self.order.push_back(value);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
        true
    }

    pub fn contains(&self, value: &T) -> bool {
        self.set.contains(value)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

impl<T: Eq + Hash + Clone> Default for RecentSet<T> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_contains() {
        let mut set = RecentSet::with_capacity(4);
        assert!(set.insert(1));
        assert!(!set.insert(1));
        assert!(set.contains(&1));
        assert!(!set.contains(&2));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut set = RecentSet::with_capacity(3);
        for i in 0..4 {
            assert!(set.insert(i));
        }
        // 0 was evicted; the three newest remain.
        assert!(!set.contains(&0));
        assert!(set.contains(&1));
        assert!(set.contains(&3));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_duplicate_insert_does_not_evict() {
        let mut set = RecentSet::with_capacity(2);
        set.insert("a");
        set.insert("b");
        set.insert("a");
        assert!(set.contains(&"a"));
        assert!(set.contains(&"b"));
        assert_eq!(set.len(), 2);
    }
}
