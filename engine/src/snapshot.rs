//! Persisted forms of the queue and the mirror.
//!
//! Snapshots are the bridge between in-memory state and the key-value
//! store. They carry a format version so older clients refuse state written
//! by newer ones instead of misreading it.

use crate::{error::Result, Error, MirrorRecord, Operation, TempId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// The operation queue, in queue order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub format_version: u32,
    pub operations: Vec<Operation>,
}

impl QueueSnapshot {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            operations,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        to_json(self)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = from_json(json)?;
        check_format_version(snapshot.format_version)?;
        Ok(snapshot)
    }
}

/// Mirror records keyed by temp id.
///
/// Uses BTreeMap for deterministic serialization order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorSnapshot {
    pub format_version: u32,
    pub records: BTreeMap<TempId, MirrorRecord>,
}

impl MirrorSnapshot {
    pub fn new(records: BTreeMap<TempId, MirrorRecord>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            records,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        to_json(self)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = from_json(json)?;
        check_format_version(snapshot.format_version)?;
        Ok(snapshot)
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::InvalidSnapshot(e.to_string()))
}

fn from_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))
}

fn check_format_version(version: u32) -> Result<()> {
    if version > SNAPSHOT_FORMAT_VERSION {
        return Err(Error::InvalidSnapshot(format!(
            "unsupported snapshot format version: {} (max supported: {})",
            version, SNAPSHOT_FORMAT_VERSION
        )));
    }
    Ok(())
}
