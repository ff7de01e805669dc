//! SyncStore - the process-wide queue and mirror state.
//!
//! The SyncStore pairs the durable queue with the local mirror and the
//! device's client id. It is the state the enqueue path and the replay
//! engine both mutate, and both halves write through one storage handle.

use crate::{
    error::Result,
    queue::QueueStore,
    schema,
    storage::SharedStore,
    ClientId, EntityId, EntityKind, LocalMirror, MirrorRecord, OpType, Operation, OperationId,
    TempId, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Snapshot of sync health for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub pending_count: usize,
    pub unsynced_expense_count: usize,
    pub unsynced_income_count: usize,
    pub is_syncing: bool,
    /// Operations abandoned at the retry ceiling since startup
    pub evicted_count: usize,
}

/// Queue, mirror and client identity of one device.
pub struct SyncStore {
    client_id: ClientId,
    queue: QueueStore,
    mirror: LocalMirror,
}

impl SyncStore {
    /// Open the persisted state in `storage`.
    pub fn open(storage: SharedStore, client_id: impl Into<ClientId>, max_retries: u32) -> Self {
        Self {
            client_id: client_id.into(),
            queue: QueueStore::open(storage.clone(), max_retries),
            mirror: LocalMirror::open(storage),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut QueueStore {
        &mut self.queue
    }

    pub fn mirror(&self) -> &LocalMirror {
        &self.mirror
    }

    pub fn mirror_mut(&mut self) -> &mut LocalMirror {
        &mut self.mirror
    }

    /// Capture an entity created while offline.
    ///
    /// Writes the mirror record first, then enqueues the create. The two
    /// writes are independent: if the queue write does not persist, the
    /// record stays visible locally but will never sync after a restart.
    pub fn record_offline_create(
        &mut self,
        op_id: impl Into<OperationId>,
        kind: EntityKind,
        temp_id: impl Into<TempId>,
        payload: serde_json::Value,
        timestamp: Timestamp,
    ) -> Result<Operation> {
        schema::validate_payload(kind, OpType::Create, &payload)?;

        let temp_id = temp_id.into();
        let record = MirrorRecord::new(temp_id.clone(), kind, payload.clone(), timestamp);
        self.mirror.add_pending(kind, record)?;

        let op = Operation::create(
            op_id,
            self.client_id.clone(),
            kind,
            Some(temp_id),
            payload,
            timestamp,
        );
        Ok(self.queue.enqueue(op))
    }

    /// Queue an update against a server entity.
    pub fn queue_update(
        &mut self,
        op_id: impl Into<OperationId>,
        kind: EntityKind,
        entity_id: impl Into<EntityId>,
        payload: serde_json::Value,
        timestamp: Timestamp,
    ) -> Result<Operation> {
        schema::validate_payload(kind, OpType::Update, &payload)?;

        let op = Operation::update(
            op_id,
            self.client_id.clone(),
            kind,
            entity_id,
            payload,
            timestamp,
        );
        Ok(self.queue.enqueue(op))
    }

    /// Queue a delete against a server entity.
    pub fn queue_delete(
        &mut self,
        op_id: impl Into<OperationId>,
        kind: EntityKind,
        entity_id: impl Into<EntityId>,
        timestamp: Timestamp,
    ) -> Operation {
        let op = Operation::delete(op_id, self.client_id.clone(), kind, entity_id, timestamp);
        self.queue.enqueue(op)
    }

    /// Current counts for the diagnostic surface.
    pub fn status(&self, is_syncing: bool, evicted_count: usize) -> SyncStatus {
        SyncStatus {
            pending_count: self.queue.size(),
            unsynced_expense_count: self.mirror.unsynced_count(EntityKind::Expense),
            unsynced_income_count: self.mirror.unsynced_count(EntityKind::Income),
            is_syncing,
            evicted_count,
        }
    }
}
