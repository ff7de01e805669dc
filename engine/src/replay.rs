//! Replay of pending operations against the mutation API.
//!
//! # Algorithm
//!
//! 1. Claim the in-flight flag, or return an empty summary if a pass is
//!    already running
//! 2. Snapshot the pending queue and sort it by (timestamp, id)
//! 3. Send each operation with its idempotency metadata
//! 4. Remove successes and mark their mirror records synced
//! 5. Count failures against the retry ceiling, evicting exhausted operations
//!
//! The state lock is only taken between network calls, never across one.

use crate::{
    api::{MutationApi, MutationRequest},
    OpType, Operation, SyncStatus, SyncStore, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Sync state shared between the enqueue path and the replay engine.
pub type SharedSyncStore = Arc<Mutex<SyncStore>>;

/// How failed operations are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Attempts before an operation is abandoned
    pub max_retries: u32,
    /// Abandon 4xx rejections (other than 408/429) on the first attempt
    pub evict_on_client_error: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::queue::DEFAULT_MAX_RETRIES,
            evict_on_client_error: false,
        }
    }
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    /// Operations confirmed by the server and removed
    pub synced: usize,
    /// Operations abandoned during this pass
    pub failed: usize,
}

/// Releases the in-flight flag when the pass ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drains the queue against a [`MutationApi`].
pub struct ReplayEngine<A> {
    state: SharedSyncStore,
    api: A,
    policy: RetryPolicy,
    in_flight: AtomicBool,
    evicted_total: AtomicUsize,
}

impl<A: MutationApi> ReplayEngine<A> {
    /// Create an engine. The policy's retry ceiling is applied to the queue.
    pub fn new(state: SharedSyncStore, api: A, policy: RetryPolicy) -> Self {
        state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue_mut()
            .set_max_retries(policy.max_retries);

        Self {
            state,
            api,
            policy,
            in_flight: AtomicBool::new(false),
            evicted_total: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> &SharedSyncStore {
        &self.state
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Whether a replay pass is running.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Operations abandoned since this engine was created.
    pub fn evicted_total(&self) -> usize {
        self.evicted_total.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> SyncStatus {
        self.lock().status(self.is_syncing(), self.evicted_total())
    }

    /// Run one replay pass. `now` stamps mirror records confirmed by it.
    ///
    /// Never fails: every error is absorbed into retry accounting. If a pass
    /// is already in flight this returns an empty summary without sending
    /// anything.
    pub async fn replay(&self, now: Timestamp) -> ReplaySummary {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("Replay already in flight, skipping");
            return ReplaySummary::default();
        };

        let mut pending = self.lock().queue().list_pending();
        if pending.is_empty() {
            return ReplaySummary::default();
        }
        pending.sort_by(Operation::replay_cmp);

        tracing::info!(pending = pending.len(), "Starting replay pass");

        let mut summary = ReplaySummary::default();
        for op in pending {
            let request = match MutationRequest::for_operation(&op) {
                Ok(request) => request,
                Err(e) => {
                    // Nothing to address; retrying cannot help
                    self.record_failure(&op, e.to_string(), true, &mut summary);
                    continue;
                }
            };

            tracing::debug!(
                op_id = %op.id,
                method = %request.method,
                path = %request.path,
                attempt = op.retry_count + 1,
                "Replaying operation"
            );

            match self.api.send(request).await {
                Ok(response) => {
                    let mut state = self.lock();
                    state.queue_mut().remove(&op.id);
                    if op.op_type == OpType::Create {
                        if let Some(temp_id) = &op.temp_id {
                            state
                                .mirror_mut()
                                .mark_synced(temp_id, response.server_id(), now);
                        }
                    }
                    summary.synced += 1;
                }
                Err(e) => {
                    let permanent = self.policy.evict_on_client_error && e.is_client_rejection();
                    self.record_failure(&op, e.to_string(), permanent, &mut summary);
                }
            }
        }

        tracing::info!(
            synced = summary.synced,
            failed = summary.failed,
            remaining = self.lock().queue().size(),
            "Replay pass finished"
        );

        summary
    }

    /// Replay, then drop mirror records the server has confirmed.
    pub async fn sync_all(&self, now: Timestamp) -> ReplaySummary {
        let summary = self.replay(now).await;
        self.lock().mirror_mut().prune_synced();
        summary
    }

    fn record_failure(
        &self,
        op: &Operation,
        error: String,
        permanent: bool,
        summary: &mut ReplaySummary,
    ) {
        let mut state = self.lock();

        if state.queue().get(&op.id).is_none() {
            tracing::debug!(op_id = %op.id, "Operation superseded during replay");
            return;
        }

        let survives = if permanent {
            tracing::warn!(op_id = %op.id, error = %error, "Abandoning rejected operation");
            state.queue_mut().evict(&op.id, error);
            false
        } else {
            tracing::debug!(op_id = %op.id, error = %error, "Replay attempt failed");
            state.queue_mut().increment_retry(&op.id, error)
        };

        if !survives {
            summary.failed += 1;
            self.evicted_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncStore> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
