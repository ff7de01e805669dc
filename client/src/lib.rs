//! # Tally Client
//!
//! The native sync agent for Tally. Wires the `tally-engine` queue to real
//! IO: a file-backed store, a `reqwest` transport, and a connectivity probe
//! that replays the queue whenever the API becomes reachable.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tally_client::{Config, Connectivity, FileStore, HttpMutationApi, SyncService};
//!
//! # async fn run() -> tally_client::Result<()> {
//! let config = Config::new("http://127.0.0.1:3000");
//! let storage = Arc::new(FileStore::open(&config.data_dir)?);
//! let api = HttpMutationApi::new(&config.api_url, config.request_timeout, None)?;
//! let service = SyncService::new(storage, api, Connectivity::new(true), config.retry_policy());
//!
//! service
//!     .record_expense(serde_json::json!({"amount": 4.5, "date": "2024-03-01"}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connectivity;
pub mod error;
pub mod http;
pub mod service;
pub mod storage;
pub mod trigger;

pub use config::{Config, ConfigError};
pub use connectivity::{Connectivity, ConnectivityProbe};
pub use error::{ClientError, Result};
pub use http::HttpMutationApi;
pub use service::{RecordOutcome, SyncService};
pub use storage::FileStore;
pub use trigger::{ConnectivityTrigger, Subscription, MIN_INTERVAL};
