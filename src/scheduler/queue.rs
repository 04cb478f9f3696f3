use std::cmp::Ordering;

use serde::Serialize;

use crate::memory::{Memory, Relationship};

/// An admitted candidate waiting for the playback slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioQueueItem {
    pub memory: Memory,
    pub relationship: Relationship,
    pub priority: f64,
    pub distance_m: f64,
    pub enqueued_at_ms: u64,
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl AudioQueueItem {
    #[must_use]
    pub fn memory_id(&self) -> &str {
        &self.memory.id
    }

    /// Priority descending, then earliest enqueue, then insertion order.
    fn ranks_before(&self, other: &Self) -> bool {
        match self.priority.total_cmp(&other.priority) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => (self.enqueued_at_ms, self.seq) < (other.enqueued_at_ms, other.seq),
        }
    }
}

/// Priority-ordered queue holding at most one entry per memory id.
#[derive(Debug, Default)]
pub(crate) struct PlaybackQueue {
    items: Vec<AudioQueueItem>,
    next_seq: u64,
}

impl PlaybackQueue {
    /// Inserts `item`, replacing any entry for the same memory.
    /// Returns true when an entry was replaced.
    pub(crate) fn upsert(&mut self, mut item: AudioQueueItem) -> bool {
        let before = self.items.len();
        self.items.retain(|existing| existing.memory.id != item.memory.id);
        let replaced = self.items.len() != before;

        item.seq = self.next_seq;
        self.next_seq += 1;
        let at = self
            .items
            .partition_point(|existing| !item.ranks_before(existing));
        self.items.insert(at, item);
        replaced
    }

    pub(crate) fn pop_front(&mut self) -> Option<AudioQueueItem> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    pub(crate) fn as_slice(&self) -> &[AudioQueueItem] {
        &self.items
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}
