//! # Tally Engine
//!
//! The offline mutation queue behind the Tally personal finance client.
//!
//! When an expense or income write cannot reach the server, it is captured
//! as an [`Operation`], persisted in a durable queue, and replayed later with
//! a stable idempotency key so the server never applies it twice.
//!
//! ## Design Principles
//!
//! - **No IO**: persistence goes through [`KeyValueStore`], transport through [`MutationApi`]
//! - **Deterministic**: ids and timestamps are supplied by the caller
//! - **Never throws past the UI**: storage and network failures degrade, they don't propagate
//!
//! ## Core Concepts
//!
//! ### Queue
//!
//! [`QueueStore`] holds pending operations. Updates and deletes against the
//! same entity coalesce, so only the latest intent survives. Creates are
//! always appended.
//!
//! ### Local Mirror
//!
//! [`LocalMirror`] keeps entities created offline visible until their create
//! operation succeeds, after which they are flagged synced and later pruned.
//!
//! ### Replay
//!
//! [`ReplayEngine`] drains the queue oldest-first. Successes are removed,
//! failures count against a retry ceiling, and at most one pass runs at a time.
//!
//! ## Quick Start
//!
//! ```rust
//! use tally_engine::{EntityKind, MemoryStore, SyncStore};
//! use serde_json::json;
//!
//! let storage = MemoryStore::new_shared();
//! let mut store = SyncStore::open(storage, "device-1", 3);
//!
//! store
//!     .record_offline_create(
//!         "op-1",
//!         EntityKind::Expense,
//!         "tmp-1",
//!         json!({"amount": 42.5, "date": "2024-03-01"}),
//!         1706745600000,
//!     )
//!     .unwrap();
//!
//! let status = store.status(false, 0);
//! assert_eq!(status.pending_count, 1);
//! assert_eq!(status.unsynced_expense_count, 1);
//! ```

pub mod api;
pub mod device;
pub mod error;
pub mod mirror;
pub mod operation;
pub mod queue;
pub mod record;
pub mod replay;
pub mod schema;
pub mod snapshot;
pub mod storage;
pub mod sync_store;

// Re-export main types at crate root
pub use api::{ApiError, Method, MutationApi, MutationRequest, MutationResponse};
pub use device::load_or_create_client_id;
pub use error::Error;
pub use mirror::LocalMirror;
pub use operation::{ClientMeta, EntityKind, OpType, Operation, Resource, RESOURCES};
pub use queue::{QueueStore, DEFAULT_MAX_RETRIES};
pub use record::MirrorRecord;
pub use replay::{ReplayEngine, ReplaySummary, RetryPolicy, SharedSyncStore};
pub use snapshot::{MirrorSnapshot, QueueSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use storage::{KeyValueStore, MemoryStore, SharedStore};
pub use sync_store::{SyncStatus, SyncStore};

/// Type aliases for clarity
pub type OperationId = String;
pub type ClientId = String;
pub type EntityId = String;
pub type TempId = String;
pub type Timestamp = u64;
