//! Local mirror of entities created while offline.
//!
//! The mirror lets the UI show an offline expense or income before the
//! server has confirmed it. Records are keyed by their temp id and persisted
//! through the same key-value handle as the queue.

use crate::{
    error::Result,
    snapshot::MirrorSnapshot,
    storage::{self, SharedStore, MIRROR_KEY},
    EntityId, EntityKind, Error, MirrorRecord, TempId, Timestamp,
};
use std::collections::BTreeMap;

/// Records created offline, pending server confirmation.
pub struct LocalMirror {
    storage: SharedStore,
    records: BTreeMap<TempId, MirrorRecord>,
}

impl LocalMirror {
    /// Open the mirror persisted in `storage`, or an empty one.
    pub fn open(storage: SharedStore) -> Self {
        let records = storage::load_json(storage.as_ref(), MIRROR_KEY, MirrorSnapshot::from_json)
            .map(|snapshot| snapshot.records)
            .unwrap_or_default();

        Self { storage, records }
    }

    /// Add an unsynced expense record.
    pub fn add_pending_expense(&mut self, record: MirrorRecord) -> Result<()> {
        self.add_pending(EntityKind::Expense, record)
    }

    /// Add an unsynced income record.
    pub fn add_pending_income(&mut self, record: MirrorRecord) -> Result<()> {
        self.add_pending(EntityKind::Income, record)
    }

    /// Add an unsynced record of the given kind.
    pub fn add_pending(&mut self, kind: EntityKind, mut record: MirrorRecord) -> Result<()> {
        if record.kind != kind {
            return Err(Error::KindMismatch {
                expected: kind,
                actual: record.kind,
            });
        }

        record.synced = false;
        record.synced_at = None;
        self.records.insert(record.temp_id.clone(), record);
        self.persist();
        Ok(())
    }

    /// Get a record by temp id.
    pub fn get(&self, temp_id: &str) -> Option<&MirrorRecord> {
        self.records.get(temp_id)
    }

    /// Unsynced records of a kind, oldest first.
    pub fn list_unsynced(&self, kind: EntityKind) -> Vec<MirrorRecord> {
        let mut unsynced: Vec<_> = self
            .records
            .values()
            .filter(|r| r.kind == kind && !r.synced)
            .cloned()
            .collect();
        unsynced.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.temp_id.cmp(&b.temp_id))
        });
        unsynced
    }

    /// Count of unsynced records of a kind.
    pub fn unsynced_count(&self, kind: EntityKind) -> usize {
        self.records
            .values()
            .filter(|r| r.kind == kind && !r.synced)
            .count()
    }

    /// Flag a record as confirmed. Returns whether the record exists.
    pub fn mark_synced(
        &mut self,
        temp_id: &str,
        server_id: Option<EntityId>,
        timestamp: Timestamp,
    ) -> bool {
        let Some(record) = self.records.get_mut(temp_id) else {
            return false;
        };
        record.mark_synced(server_id, timestamp);
        self.persist();
        true
    }

    /// Drop every synced record. Returns how many were removed.
    pub fn prune_synced(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| !r.synced);
        let pruned = before - self.records.len();
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned synced mirror records");
            self.persist();
        }
        pruned
    }

    /// Total records, synced or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn persist(&self) -> bool {
        let snapshot = MirrorSnapshot::new(self.records.clone());
        storage::persist_json(self.storage.as_ref(), MIRROR_KEY, &snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn expense(temp_id: &str, created_at: Timestamp) -> MirrorRecord {
        MirrorRecord::new(
            temp_id,
            EntityKind::Expense,
            json!({"amount": 42.5, "date": "2024-03-01"}),
            created_at,
        )
    }

    #[test]
    fn add_and_list_unsynced() {
        let mut mirror = LocalMirror::open(MemoryStore::new_shared());
        mirror.add_pending_expense(expense("tmp-2", 2000)).unwrap();
        mirror.add_pending_expense(expense("tmp-1", 1000)).unwrap();

        let unsynced = mirror.list_unsynced(EntityKind::Expense);
        assert_eq!(unsynced.len(), 2);
        assert_eq!(unsynced[0].temp_id, "tmp-1");
        assert!(mirror.list_unsynced(EntityKind::Income).is_empty());
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let mut mirror = LocalMirror::open(MemoryStore::new_shared());
        let result = mirror.add_pending_income(expense("tmp-1", 1000));

        assert_eq!(
            result,
            Err(Error::KindMismatch {
                expected: EntityKind::Income,
                actual: EntityKind::Expense,
            })
        );
        assert!(mirror.is_empty());
    }

    #[test]
    fn mark_synced_then_prune() {
        let mut mirror = LocalMirror::open(MemoryStore::new_shared());
        mirror.add_pending_expense(expense("tmp-1", 1000)).unwrap();
        mirror.add_pending_expense(expense("tmp-2", 2000)).unwrap();

        assert!(mirror.mark_synced("tmp-1", Some("88".into()), 3000));
        assert!(!mirror.mark_synced("tmp-unknown", None, 3000));
        assert_eq!(mirror.unsynced_count(EntityKind::Expense), 1);

        assert_eq!(mirror.prune_synced(), 1);
        assert!(mirror.get("tmp-1").is_none());
        assert!(mirror.get("tmp-2").is_some());
        assert_eq!(mirror.prune_synced(), 0);
    }

    #[test]
    fn survives_reopen() {
        let storage = MemoryStore::new_shared();
        {
            let mut mirror = LocalMirror::open(storage.clone());
            mirror.add_pending_expense(expense("tmp-1", 1000)).unwrap();
            mirror.mark_synced("tmp-1", None, 2000);
        }

        let reopened = LocalMirror::open(storage);
        let record = reopened.get("tmp-1").unwrap();
        assert!(record.synced);
        assert_eq!(record.synced_at, Some(2000));
    }
}
