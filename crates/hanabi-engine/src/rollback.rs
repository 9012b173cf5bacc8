//! Capacity-bounded rollback history.

use std::collections::VecDeque;
use std::sync::Arc;

use hanabi_core::{PlaybackSpot, SharedSnapshot, StateSnapshot};

/// Most-recent-first history of state snapshots, bounded by capacity.
///
/// The front of the deque is the newest entry. Pushing past capacity
/// evicts the oldest entry at the back. Lookup by spot is a linear
/// front-to-back scan; histories stay small enough (hundreds of
/// entries) that this is never the bottleneck.
#[derive(Debug)]
pub struct RollbackStack {
    entries: VecDeque<SharedSnapshot>,
    capacity: usize,
}

impl RollbackStack {
    /// Create an empty stack.
    ///
    /// Capacity is clamped to at least one slot so a save-point
    /// snapshot can always be taken, even when user-facing rewind is
    /// disabled.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// The bounded capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack holds no snapshots.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Push a snapshot as the new most-recent entry, evicting the
    /// oldest entry if the stack is full.
    pub fn push(&mut self, snapshot: SharedSnapshot) {
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(snapshot);
    }

    /// The most recent snapshot, without removing it.
    pub fn peek(&self) -> Option<&SharedSnapshot> {
        self.entries.front()
    }

    /// Remove and return the most recent snapshot.
    pub fn pop(&mut self) -> Option<SharedSnapshot> {
        self.entries.pop_front()
    }

    /// Remove and return the snapshot captured at `spot`, discarding
    /// every entry newer than it.
    ///
    /// Scans front-to-back for the first entry whose capture spot
    /// matches. When no entry matches, nothing is mutated.
    pub fn pop_to(&mut self, spot: &PlaybackSpot) -> Option<SharedSnapshot> {
        let idx = self
            .entries
            .iter()
            .position(|s| s.captured_at() == spot)?;
        // Entries in front of the match are strictly newer; drop them.
        self.entries.drain(..idx);
        self.entries.pop_front()
    }

    /// Snapshots eligible for save-game embedding: up to `max_count`
    /// most-recent entries, newest first.
    pub fn to_persistable(&self, max_count: usize) -> Vec<SharedSnapshot> {
        self.entries
            .iter()
            .take(max_count)
            .map(Arc::clone)
            .collect()
    }

    /// Rebuild a stack from a persisted entry list (newest first),
    /// discarding anything beyond `capacity`.
    pub fn restore_from(capacity: usize, persisted: Vec<StateSnapshot>) -> Self {
        let mut stack = Self::new(capacity);
        stack.entries = persisted
            .into_iter()
            .take(stack.capacity)
            .map(Arc::new)
            .collect();
        stack
    }

    /// Iterate newest-first over stored snapshots.
    pub fn iter(&self) -> impl Iterator<Item = &SharedSnapshot> {
        self.entries.iter()
    }

    /// Drop every stored snapshot.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
