//! The sync service: the single entry point the app writes through.
//!
//! Writes take a fast path when online, sending the mutation directly. If
//! that fails, or the device is offline, the mutation is captured in the
//! durable queue and replayed later with the same idempotency key.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tally_engine::{
    load_or_create_client_id, schema, ClientId, EntityId, EntityKind, MirrorRecord, MutationApi,
    MutationRequest, MutationResponse, OpType, Operation, OperationId, ReplayEngine,
    ReplaySummary, RetryPolicy, SharedStore, SyncStatus, SyncStore, TempId, Timestamp,
};
use uuid::Uuid;

use crate::connectivity::Connectivity;
use crate::error::Result;

/// What happened to a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RecordOutcome {
    /// The server accepted it immediately
    #[serde(rename_all = "camelCase")]
    Sent { server_id: Option<EntityId> },
    /// It is waiting in the queue
    #[serde(rename_all = "camelCase")]
    Queued {
        op_id: OperationId,
        /// Set for creates, which are mirrored locally until synced
        temp_id: Option<TempId>,
    },
}

struct Inner<A> {
    engine: ReplayEngine<A>,
    connectivity: Connectivity,
    client_id: ClientId,
}

/// Records expense and income mutations and keeps them flowing to the server.
///
/// Cheap to clone; clones share the same queue, mirror and replay guard.
pub struct SyncService<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for SyncService<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: MutationApi> SyncService<A> {
    /// Open the persisted queue and mirror in `storage`.
    ///
    /// The client id is loaded from `storage`, or generated and saved on
    /// first run.
    pub fn new(
        storage: SharedStore,
        api: A,
        connectivity: Connectivity,
        policy: RetryPolicy,
    ) -> Self {
        let client_id = load_or_create_client_id(storage.as_ref(), new_id);
        let store = SyncStore::open(storage, client_id.clone(), policy.max_retries);
        let engine = ReplayEngine::new(Arc::new(Mutex::new(store)), api, policy);

        Self {
            inner: Arc::new(Inner {
                engine,
                connectivity,
                client_id,
            }),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.inner.connectivity
    }

    pub fn api(&self) -> &A {
        self.inner.engine.api()
    }

    /// Record a new expense.
    pub async fn record_expense(&self, payload: serde_json::Value) -> Result<RecordOutcome> {
        self.record(EntityKind::Expense, payload).await
    }

    /// Record a new income entry.
    pub async fn record_income(&self, payload: serde_json::Value) -> Result<RecordOutcome> {
        self.record(EntityKind::Income, payload).await
    }

    /// Create an entity of `kind`.
    pub async fn record(
        &self,
        kind: EntityKind,
        payload: serde_json::Value,
    ) -> Result<RecordOutcome> {
        schema::validate_payload(kind, OpType::Create, &payload)?;

        let op_id = new_id();
        let now = now_millis();

        if self.inner.connectivity.is_online() {
            let op = Operation::create(
                op_id.clone(),
                self.inner.client_id.clone(),
                kind,
                None,
                payload.clone(),
                now,
            );
            if let Some(response) = self.send_direct(&op).await? {
                return Ok(RecordOutcome::Sent {
                    server_id: response.server_id(),
                });
            }
        }

        // Same op id as the direct attempt, so a lost ack replays idempotently
        let temp_id = new_id();
        let op = self
            .lock()
            .record_offline_create(op_id, kind, temp_id.clone(), payload, now)?;

        tracing::info!(op_id = %op.id, temp_id = %temp_id, kind = %kind, "Queued create");
        Ok(RecordOutcome::Queued {
            op_id: op.id,
            temp_id: Some(temp_id),
        })
    }

    /// Update fields of an entity the server already knows.
    pub async fn update_entry(
        &self,
        kind: EntityKind,
        entity_id: impl Into<EntityId>,
        payload: serde_json::Value,
    ) -> Result<RecordOutcome> {
        schema::validate_payload(kind, OpType::Update, &payload)?;

        let entity_id = entity_id.into();
        let op_id = new_id();
        let now = now_millis();

        if self.inner.connectivity.is_online() {
            let op = Operation::update(
                op_id.clone(),
                self.inner.client_id.clone(),
                kind,
                entity_id.clone(),
                payload.clone(),
                now,
            );
            if let Some(response) = self.send_direct(&op).await? {
                return Ok(RecordOutcome::Sent {
                    server_id: response.server_id(),
                });
            }
        }

        let op = self
            .lock()
            .queue_update(op_id, kind, entity_id, payload, now)?;

        tracing::info!(op_id = %op.id, kind = %kind, "Queued update");
        Ok(RecordOutcome::Queued {
            op_id: op.id,
            temp_id: None,
        })
    }

    /// Delete an entity the server already knows.
    pub async fn delete_entry(
        &self,
        kind: EntityKind,
        entity_id: impl Into<EntityId>,
    ) -> Result<RecordOutcome> {
        let entity_id = entity_id.into();
        let op_id = new_id();
        let now = now_millis();

        if self.inner.connectivity.is_online() {
            let op = Operation::delete(
                op_id.clone(),
                self.inner.client_id.clone(),
                kind,
                entity_id.clone(),
                now,
            );
            if let Some(response) = self.send_direct(&op).await? {
                return Ok(RecordOutcome::Sent {
                    server_id: response.server_id(),
                });
            }
        }

        let op = self.lock().queue_delete(op_id, kind, entity_id, now);

        tracing::info!(op_id = %op.id, kind = %kind, "Queued delete");
        Ok(RecordOutcome::Queued {
            op_id: op.id,
            temp_id: None,
        })
    }

    /// Replay the queue now.
    pub async fn sync_now(&self) -> ReplaySummary {
        self.inner.engine.replay(now_millis()).await
    }

    /// Replay the queue, then prune mirror records the server confirmed.
    pub async fn sync_all(&self) -> ReplaySummary {
        self.inner.engine.sync_all(now_millis()).await
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.engine.status()
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.engine.is_syncing()
    }

    /// Pending operations in queue order.
    pub fn pending_operations(&self) -> Vec<Operation> {
        self.lock().queue().list_pending()
    }

    /// Locally created entries of `kind` the server has not confirmed yet.
    pub fn unsynced(&self, kind: EntityKind) -> Vec<MirrorRecord> {
        self.lock().mirror().list_unsynced(kind)
    }

    /// Send `op` without queueing it. `Ok(None)` means the caller should queue.
    async fn send_direct(&self, op: &Operation) -> Result<Option<MutationResponse>> {
        let request = MutationRequest::for_operation(op)?;
        match self.inner.engine.api().send(request).await {
            Ok(response) => {
                tracing::debug!(op_id = %op.id, status = response.status, "Sent directly");
                Ok(Some(response))
            }
            Err(e) => {
                tracing::warn!(op_id = %op.id, error = %e, "Direct send failed, queueing");
                Ok(None)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncStore> {
        self.inner
            .engine
            .state()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn now_millis() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
