//! Shared test doubles for engine integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tally_engine::{
    ApiError, KeyValueStore, MemoryStore, MutationApi, MutationRequest, MutationResponse,
    SharedSyncStore, SyncStore,
};
use tokio::sync::Semaphore;

type Responder = dyn Fn(&MutationRequest) -> Result<MutationResponse, ApiError> + Send + Sync;

/// A mutation API that records every request and answers from a closure.
#[derive(Clone)]
pub struct ScriptedApi {
    calls: Arc<Mutex<Vec<MutationRequest>>>,
    responder: Arc<Responder>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedApi {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&MutationRequest) -> Result<MutationResponse, ApiError> + Send + Sync + 'static,
    {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(responder),
            gate: None,
        }
    }

    /// Answers every request with 201 and an incrementing numeric id.
    pub fn accepting() -> Self {
        let next_id = Arc::new(Mutex::new(100u64));
        Self::new(move |_| {
            let mut id = next_id.lock().unwrap();
            *id += 1;
            Ok(MutationResponse::new(201, Some(json!({ "id": *id }))))
        })
    }

    /// Fails every request with a 503.
    pub fn unavailable() -> Self {
        Self::new(|_| {
            Err(ApiError::Status {
                status: 503,
                body: "unavailable".into(),
            })
        })
    }

    /// Make every request wait for a permit on `gate` before answering.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<MutationRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl MutationApi for ScriptedApi {
    fn send(
        &self,
        request: MutationRequest,
    ) -> impl Future<Output = Result<MutationResponse, ApiError>> + Send {
        let calls = self.calls.clone();
        let responder = self.responder.clone();
        let gate = self.gate.clone();
        async move {
            calls.lock().unwrap().push(request.clone());
            if let Some(gate) = gate {
                let _permit = gate.acquire().await.expect("gate closed");
            }
            responder(&request)
        }
    }
}

/// A store whose writes to one key always fail.
#[derive(Debug, Default)]
pub struct FailingKeyStore {
    inner: MemoryStore,
    failing_key: String,
}

impl FailingKeyStore {
    pub fn new(failing_key: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            failing_key: failing_key.to_string(),
        }
    }
}

impl KeyValueStore for FailingKeyStore {
    fn get(&self, key: &str) -> tally_engine::error::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> tally_engine::error::Result<()> {
        if key == self.failing_key {
            return Err(tally_engine::Error::Storage("quota exceeded".into()));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> tally_engine::error::Result<()> {
        self.inner.remove(key)
    }
}

pub fn shared_store(max_retries: u32) -> SharedSyncStore {
    Arc::new(Mutex::new(SyncStore::open(
        MemoryStore::new_shared(),
        "device-1",
        max_retries,
    )))
}

pub fn expense_payload(amount: f64) -> serde_json::Value {
    json!({"amount": amount, "date": "2024-03-01", "description": "Groceries"})
}
