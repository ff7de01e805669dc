//! Locally visible records created while offline.

use crate::{EntityId, EntityKind, TempId, Timestamp};
use serde::{Deserialize, Serialize};

/// An expense or income created while offline.
///
/// The record stays `synced: false` until the create operation carrying its
/// `temp_id` succeeds on replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorRecord {
    /// Client-generated identifier, distinct from the server id
    pub temp_id: TempId,
    pub kind: EntityKind,
    /// The field values as entered
    pub payload: serde_json::Value,
    /// When the record was captured (milliseconds since epoch)
    pub created_at: Timestamp,
    pub synced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<Timestamp>,
    /// Server identifier, when the create response carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<EntityId>,
}

impl MirrorRecord {
    /// Create a new unsynced record.
    pub fn new(
        temp_id: impl Into<TempId>,
        kind: EntityKind,
        payload: serde_json::Value,
        created_at: Timestamp,
    ) -> Self {
        Self {
            temp_id: temp_id.into(),
            kind,
            payload,
            created_at,
            synced: false,
            synced_at: None,
            server_id: None,
        }
    }

    /// Flag the record as confirmed by the server.
    pub fn mark_synced(&mut self, server_id: Option<EntityId>, timestamp: Timestamp) {
        self.synced = true;
        self.synced_at = Some(timestamp);
        if server_id.is_some() {
            self.server_id = server_id;
        }
    }
}
