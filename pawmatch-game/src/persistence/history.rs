use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use super::validation::validate;
use crate::session::SessionState;

/// Bounded ring of recently saved valid states, newest last. Only recovery
/// reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHistory {
    entries: VecDeque<SessionState>,
    capacity: usize,
}

impl SnapshotHistory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Rebuild from stored entries (oldest first), dropping any beyond capacity.
    #[must_use]
    pub fn from_entries(capacity: usize, entries: Vec<SessionState>) -> Self {
        let mut history = Self::new(capacity);
        for entry in entries {
            history.push(entry);
        }
        history
    }

    pub fn push(&mut self, state: SessionState) {
        if self.entries.back() == Some(&state) {
            return;
        }
        self.entries.push_back(state);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Newest entry that still passes validation at `now`.
    #[must_use]
    pub fn newest_valid(&self, now: DateTime<Utc>) -> Option<&SessionState> {
        self.entries
            .iter()
            .rev()
            .find(|state| validate(state, now).is_ok())
    }

    /// Drop all but the `keep` newest entries.
    pub fn trim(&mut self, keep: usize) -> usize {
        let before = self.entries.len();
        while self.entries.len() > keep {
            self.entries.pop_front();
        }
        before - self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn entries(&self) -> Vec<SessionState> {
        self.entries.iter().cloned().collect()
    }

    #[must_use]
    pub fn estimated_bytes(&self) -> usize {
        self.entries.iter().map(SessionState::estimated_bytes).sum()
    }
}
