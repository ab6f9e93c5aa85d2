//! Fixed-capacity FIFO of conversation turns.

use std::collections::VecDeque;

use super::traits::Turn;

/// Default number of turns retained per session.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Ordered turns of one session, capped at `capacity`.
///
/// When full, appending discards the oldest turn before the new one is
/// stored. No other eviction happens.
#[derive(Debug, Clone)]
pub struct BoundedHistory {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl BoundedHistory {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `turn`, returning the evicted oldest turn if the history was full.
    pub fn append(&mut self, turn: Turn) -> Option<Turn> {
        let evicted = if self.turns.len() >= self.capacity {
            self.turns.pop_front()
        } else {
            None
        };
        self.turns.push_back(turn);
        evicted
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Turn> + '_ {
        self.turns.iter()
    }

    pub fn to_vec(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }
}

impl Default for BoundedHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
