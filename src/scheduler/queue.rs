use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{SnapshotStore, Written};

/// Time block used when a worker does not declare one.
pub const UNSPECIFIED_TIME_BLOCK: &str = "Unspecified";

/// One worker waiting for work. Field names match the persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    #[serde(rename = "user_id")]
    pub worker_id: u64,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "time", with = "chrono::serde::ts_seconds")]
    pub enqueued_at: DateTime<Utc>,
    pub time_block: String,
    #[serde(rename = "jump_url", default, skip_serializing_if = "Option::is_none")]
    pub origin_reference: Option<String>,
}

impl QueueEntry {
    pub fn new(
        worker_id: u64,
        display_name: impl Into<String>,
        time_block: impl Into<String>,
        origin_reference: Option<String>,
    ) -> Self {
        Self {
            worker_id,
            display_name: display_name.into(),
            enqueued_at: Utc::now(),
            time_block: time_block.into(),
            origin_reference,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Added at the given 1-based position
    Queued { position: usize },
    /// The worker already had an entry; nothing changed
    AlreadyQueued { position: usize, existing: QueueEntry },
}

/// Ordered listing of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub entries: Vec<QueueEntry>,
    pub total: usize,
}

impl QueueSnapshot {
    /// Entries that did not fit in the listing.
    pub fn remaining(&self) -> usize {
        self.total - self.entries.len()
    }
}

/// FIFO queue of available workers, written through to its store on every
/// mutation.
///
/// At most one entry exists per worker and entries keep insertion order;
/// removal is the only operation that changes relative order.
pub struct QueueStore {
    entries: Vec<QueueEntry>,
    store: Box<dyn SnapshotStore<Vec<QueueEntry>>>,
}

impl QueueStore {
    /// Restores the queue from its store. Duplicate worker ids in a
    /// hand-edited snapshot keep their first occurrence.
    pub fn open(store: Box<dyn SnapshotStore<Vec<QueueEntry>>>) -> Result<Self> {
        let mut entries: Vec<QueueEntry> = Vec::new();
        for entry in store.load()?.unwrap_or_default() {
            if entries.iter().any(|e| e.worker_id == entry.worker_id) {
                tracing::warn!(worker_id = entry.worker_id, "Dropping duplicate queue entry from snapshot");
                continue;
            }
            entries.push(entry);
        }
        tracing::debug!(entries = entries.len(), "Queue restored");
        Ok(Self { entries, store })
    }

    pub fn enqueue(&mut self, entry: QueueEntry) -> Written<EnqueueOutcome> {
        if let Some(position) = self.position(entry.worker_id) {
            return Written::clean(EnqueueOutcome::AlreadyQueued {
                position,
                existing: self.entries[position - 1].clone(),
            });
        }

        tracing::info!(worker_id = entry.worker_id, time_block = %entry.time_block, "Worker queued");
        self.entries.push(entry);
        let position = self.entries.len();
        self.persist(EnqueueOutcome::Queued { position })
    }

    /// Idempotent; reports whether an entry was removed.
    pub fn remove(&mut self, worker_id: u64) -> Written<bool> {
        let before = self.entries.len();
        self.entries.retain(|e| e.worker_id != worker_id);
        if self.entries.len() == before {
            return Written::clean(false);
        }

        tracing::info!(worker_id, "Worker dequeued");
        self.persist(true)
    }

    /// Returns how many entries were dropped.
    pub fn clear(&mut self) -> Written<usize> {
        let removed = self.entries.len();
        self.entries.clear();
        tracing::info!(removed, "Queue reset");
        self.persist(removed)
    }

    /// At most `limit` entries in wait order, with the true total.
    pub fn snapshot(&self, limit: usize) -> QueueSnapshot {
        QueueSnapshot {
            entries: self.entries.iter().take(limit).cloned().collect(),
            total: self.entries.len(),
        }
    }

    pub fn get(&self, worker_id: u64) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.worker_id == worker_id)
    }

    /// 1-based wait position.
    pub fn position(&self, worker_id: u64) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.worker_id == worker_id)
            .map(|i| i + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist<T>(&self, outcome: T) -> Written<T> {
        Written {
            outcome,
            persist_error: self.store.save(&self.entries).err(),
        }
    }
}
