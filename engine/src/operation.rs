//! Operation types for expressing queued mutations.
//!
//! A mutation that could not reach the server is captured as an [`Operation`]
//! and kept in the queue until a replay pass delivers it or the retry ceiling
//! abandons it.

use crate::{ClientId, EntityId, OperationId, TempId, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The kind of mutation an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpType::Create => write!(f, "create"),
            OpType::Update => write!(f, "update"),
            OpType::Delete => write!(f, "delete"),
        }
    }
}

/// The resource class an operation mutates.
///
/// New kinds are added by extending this enum and [`RESOURCES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Expense,
    Income,
}

/// Static description of a server resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource {
    pub kind: EntityKind,
    /// Label used in persisted state and logs
    pub label: &'static str,
    /// Collection path on the server
    pub path: &'static str,
}

const EXPENSE: Resource = Resource {
    kind: EntityKind::Expense,
    label: "expense",
    path: "/expenses",
};

const INCOME: Resource = Resource {
    kind: EntityKind::Income,
    label: "income",
    path: "/income",
};

/// Lookup table from entity kind to server resource.
pub const RESOURCES: [Resource; 2] = [EXPENSE, INCOME];

impl EntityKind {
    /// Every known entity kind.
    pub const ALL: [EntityKind; 2] = [EntityKind::Expense, EntityKind::Income];

    /// Resource description for this kind.
    pub fn resource(self) -> &'static Resource {
        match self {
            EntityKind::Expense => &EXPENSE,
            EntityKind::Income => &INCOME,
        }
    }

    /// Collection path, e.g. `/expenses`.
    pub fn resource_path(self) -> &'static str {
        self.resource().path
    }

    /// Path of a single entity, e.g. `/expenses/42`.
    ///
    /// The id is percent-encoded as one path segment.
    pub fn entity_path(self, entity_id: &str) -> String {
        format!("{}/{}", self.resource_path(), urlencoding::encode(entity_id))
    }

    pub fn label(self) -> &'static str {
        self.resource().label
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Idempotency metadata carried by every replayed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMeta {
    pub client_id: ClientId,
    pub timestamp: Timestamp,
    pub idempotency_key: OperationId,
}

impl ClientMeta {
    pub const CLIENT_ID_HEADER: &'static str = "X-Client-Id";
    pub const TIMESTAMP_HEADER: &'static str = "X-Client-Timestamp";
    pub const IDEMPOTENCY_HEADER: &'static str = "X-Idempotency-Key";

    /// Header name/value pairs for this metadata.
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            (Self::CLIENT_ID_HEADER, self.client_id.clone()),
            (Self::TIMESTAMP_HEADER, self.timestamp.to_string()),
            (Self::IDEMPOTENCY_HEADER, self.idempotency_key.clone()),
        ]
    }
}

/// A queued mutation waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation ID, also sent as the idempotency key
    pub id: OperationId,
    /// Device that captured the operation
    pub client_id: ClientId,
    /// Capture time (milliseconds since epoch)
    pub timestamp: Timestamp,
    #[serde(rename = "type")]
    pub op_type: OpType,
    pub entity_kind: EntityKind,
    /// Server identifier of the target, absent for creates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    /// Local mirror record this create belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<TempId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Operation {
    /// Create a new create operation.
    pub fn create(
        id: impl Into<OperationId>,
        client_id: impl Into<ClientId>,
        entity_kind: EntityKind,
        temp_id: Option<TempId>,
        payload: serde_json::Value,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            timestamp,
            op_type: OpType::Create,
            entity_kind,
            entity_id: None,
            temp_id,
            payload: Some(payload),
            retry_count: 0,
            last_error: None,
        }
    }

    /// Create a new update operation.
    pub fn update(
        id: impl Into<OperationId>,
        client_id: impl Into<ClientId>,
        entity_kind: EntityKind,
        entity_id: impl Into<EntityId>,
        payload: serde_json::Value,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            timestamp,
            op_type: OpType::Update,
            entity_kind,
            entity_id: Some(entity_id.into()),
            temp_id: None,
            payload: Some(payload),
            retry_count: 0,
            last_error: None,
        }
    }

    /// Create a new delete operation.
    pub fn delete(
        id: impl Into<OperationId>,
        client_id: impl Into<ClientId>,
        entity_kind: EntityKind,
        entity_id: impl Into<EntityId>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            timestamp,
            op_type: OpType::Delete,
            entity_kind,
            entity_id: Some(entity_id.into()),
            temp_id: None,
            payload: None,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Key under which this operation replaces earlier intents.
    ///
    /// Creates have no server identity yet and are never coalesced.
    pub fn coalesce_key(&self) -> Option<(EntityKind, &EntityId)> {
        match self.op_type {
            OpType::Create => None,
            OpType::Update | OpType::Delete => {
                self.entity_id.as_ref().map(|id| (self.entity_kind, id))
            }
        }
    }

    /// Idempotency metadata, identical for every attempt of this operation.
    pub fn client_meta(&self) -> ClientMeta {
        ClientMeta {
            client_id: self.client_id.clone(),
            timestamp: self.timestamp,
            idempotency_key: self.id.clone(),
        }
    }

    /// Replay ordering: oldest capture first, ties broken by id.
    pub fn replay_cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.id.cmp(&other.id))
    }
}
