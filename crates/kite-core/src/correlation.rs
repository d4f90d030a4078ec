//! Bounded correlation tables keyed by message id.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// An insertion-ordered map from message id to `V` that evicts its oldest
/// entry once `capacity` is reached.
///
/// Lookups are linear; capacities are small (hundreds) and the table is only
/// touched under the owning channel's lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlations<V> {
    entries: VecDeque<(String, V)>,
    capacity: usize,
}

impl<V> Correlations<V> {
    /// Create an empty table. A zero capacity is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Insert or replace an entry.
    ///
    /// Returns the evicted oldest entry if the table was full.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<(String, V)> {
        let key = key.into();
        if let Some(pos) = self.position(&key) {
            self.entries.remove(pos);
        }
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back((key, value));
        evicted
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let pos = self.position(key)?;
        self.entries.remove(pos).map(|(_, v)| v)
    }

    /// Change the capacity, evicting the oldest entries if it shrinks.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oldest_entry_is_evicted() {
        let mut table = Correlations::new(2);
        assert!(table.insert("a", 1).is_none());
        assert!(table.insert("b", 2).is_none());

        let evicted = table.insert("c", 3);
        assert_eq!(evicted, Some(("a".to_string(), 1)));
        assert!(table.get("a").is_none());
        assert_eq!(table.get("c"), Some(&3));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_reinsert_moves_to_back() {
        let mut table = Correlations::new(2);
        table.insert("a", 1);
        table.insert("b", 2);
        table.insert("a", 10);

        assert_eq!(table.get("a"), Some(&10));
        let evicted = table.insert("c", 3);
        assert_eq!(evicted, Some(("b".to_string(), 2)));
    }

    #[test]
    fn test_shrink_capacity() {
        let mut table = Correlations::new(4);
        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            table.insert(*key, i);
        }
        table.set_capacity(2);
        assert_eq!(table.len(), 2);
        assert!(table.get("b").is_none());
        assert_eq!(table.get("d"), Some(&3));
    }

    #[test]
    fn test_remove() {
        let mut table = Correlations::new(8);
        table.insert("a", 1);
        table.insert("b", 2);
        table.insert("c", 3);

        assert_eq!(table.remove("b"), Some(2));
        assert_eq!(table.remove("b"), None);

        assert_eq!(table.len(), 2);
        assert!(!table.is_empty());
    }
}
