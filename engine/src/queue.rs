//! Durable queue of pending operations.
//!
//! Every mutation of the queue is written through to the key-value store.
//! Writes are best-effort: a failed write is logged and the in-memory queue
//! stays authoritative for the rest of the session.

use crate::{
    snapshot::QueueSnapshot,
    storage::{self, SharedStore, QUEUE_KEY},
    Operation, OperationId,
};

/// Retry ceiling used when none is configured.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The queue of operations waiting to be replayed.
pub struct QueueStore {
    storage: SharedStore,
    operations: Vec<Operation>,
    max_retries: u32,
}

impl QueueStore {
    /// Open the queue persisted in `storage`, or an empty one.
    pub fn open(storage: SharedStore, max_retries: u32) -> Self {
        let operations = storage::load_json(storage.as_ref(), QUEUE_KEY, QueueSnapshot::from_json)
            .map(|snapshot| snapshot.operations)
            .unwrap_or_default();

        if !operations.is_empty() {
            tracing::debug!(count = operations.len(), "Loaded pending operations");
        }

        Self {
            storage,
            operations,
            max_retries: max_retries.max(1),
        }
    }

    /// Add an operation to the queue.
    ///
    /// Updates and deletes replace any pending operation against the same
    /// entity, and the replacement moves to the end. Creates always append.
    pub fn enqueue(&mut self, op: Operation) -> Operation {
        if let Some((kind, entity_id)) = op.coalesce_key() {
            let before = self.operations.len();
            self.operations
                .retain(|pending| pending.coalesce_key() != Some((kind, entity_id)));
            if self.operations.len() != before {
                tracing::debug!(
                    op_id = %op.id,
                    kind = %kind,
                    entity_id = %entity_id,
                    "Coalesced pending operation"
                );
            }
        }

        self.operations.push(op.clone());
        self.persist();
        op
    }

    /// Remove an operation. Returns whether it was present.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.operations.len();
        self.operations.retain(|op| op.id != id);
        let removed = self.operations.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    /// Get a pending operation by ID.
    pub fn get(&self, id: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.id == id)
    }

    /// All pending operations in queue order.
    pub fn list_pending(&self) -> Vec<Operation> {
        self.operations.clone()
    }

    /// Record a failed attempt.
    ///
    /// Returns `true` if the operation survives. Reaching the retry ceiling
    /// evicts it and returns `false`, as does an unknown id.
    pub fn increment_retry(&mut self, id: &str, error: impl Into<String>) -> bool {
        let Some(index) = self.operations.iter().position(|op| op.id == id) else {
            return false;
        };

        let op = &mut self.operations[index];
        op.retry_count = op.retry_count.saturating_add(1);
        op.last_error = Some(error.into());

        let survives = op.retry_count < self.max_retries;
        if !survives {
            let evicted = self.operations.remove(index);
            tracing::warn!(
                op_id = %evicted.id,
                kind = %evicted.entity_kind,
                op_type = %evicted.op_type,
                retries = evicted.retry_count,
                last_error = evicted.last_error.as_deref().unwrap_or_default(),
                "Evicted operation after reaching retry ceiling"
            );
        }

        self.persist();
        survives
    }

    /// Remove an operation without spending its remaining retries.
    pub fn evict(&mut self, id: &str, error: impl Into<String>) -> Option<Operation> {
        let index = self.operations.iter().position(|op| op.id == id)?;
        let mut evicted = self.operations.remove(index);
        evicted.last_error = Some(error.into());
        self.persist();
        Some(evicted)
    }

    /// Number of pending operations.
    pub fn size(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Drop every pending operation.
    pub fn clear(&mut self) {
        self.operations.clear();
        self.persist();
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Change the retry ceiling. Operations already past it are evicted on
    /// their next failure.
    pub fn set_max_retries(&mut self, max_retries: u32) {
        self.max_retries = max_retries.max(1);
    }

    /// IDs of all pending operations, in queue order.
    pub fn ids(&self) -> Vec<OperationId> {
        self.operations.iter().map(|op| op.id.clone()).collect()
    }

    fn persist(&self) -> bool {
        let snapshot = QueueSnapshot::new(self.operations.clone());
        storage::persist_json(self.storage.as_ref(), QUEUE_KEY, &snapshot)
    }
}
