//! In-process mock of the Tally mutation API.
//!
//! Honours `X-Idempotency-Key`: a repeated key gets the stored response
//! back without applying the mutation again.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use dashmap::DashMap;
use serde_json::{json, Value};

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub path: String,
    pub idempotency_key: Option<String>,
    pub client_id: Option<String>,
    pub client_timestamp: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Default)]
pub struct ServerState {
    /// Idempotency key to the status and body first returned for it
    applied: DashMap<String, (u16, Value)>,
    /// `<resource>/<id>` to the stored entity
    entities: DashMap<String, Value>,
    next_id: AtomicU64,
    requests: Mutex<Vec<RecordedRequest>>,
    /// Apply the mutation but answer 503 for this many requests
    lost_acks: AtomicUsize,
    /// Answer 503 without applying anything
    down: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MockServer {
    state: Arc<ServerState>,
}

impl MockServer {
    /// Serve on an ephemeral port and return the server with its base URL.
    pub async fn start() -> (Self, String) {
        let server = Self::default();
        let app = Router::new()
            .route("/health", get(health))
            .route("/{resource}", post(create))
            .route("/{resource}/{id}", patch(update).delete(delete))
            .with_state(server.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (server, format!("http://{}", addr))
    }

    pub fn set_down(&self, down: bool) {
        self.state.down.store(down, Ordering::SeqCst);
    }

    pub fn lose_next_acks(&self, count: usize) {
        self.state.lost_acks.store(count, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn entity_count(&self, resource: &str) -> usize {
        let prefix = format!("{}/", resource);
        self.state
            .entities
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .count()
    }

    pub fn entity(&self, resource: &str, id: &str) -> Option<Value> {
        self.state
            .entities
            .get(&format!("{}/{}", resource, id))
            .map(|entry| entry.value().clone())
    }

    /// Seed an entity as if another device created it.
    pub fn insert_entity(&self, resource: &str, body: Value) -> String {
        let id = (self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        let mut entity = body;
        entity["id"] = json!(id);
        self.state
            .entities
            .insert(format!("{}/{}", resource, id), entity);
        id
    }

    fn record(&self, method: &'static str, path: String, headers: &HeaderMap) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        self.state.requests.lock().unwrap().push(RecordedRequest {
            method,
            path,
            idempotency_key: header("x-idempotency-key"),
            client_id: header("x-client-id"),
            client_timestamp: header("x-client-timestamp"),
            authorization: header("authorization"),
        });
    }

    /// Apply `mutation` once per idempotency key, then decide what to answer.
    fn respond<F>(&self, headers: &HeaderMap, mutation: F) -> Response
    where
        F: FnOnce(&ServerState) -> (u16, Value),
    {
        if self.state.down.load(Ordering::SeqCst) {
            return (StatusCode::SERVICE_UNAVAILABLE, "down").into_response();
        }

        let key = headers
            .get("x-idempotency-key")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let stored = key
            .as_ref()
            .and_then(|key| self.state.applied.get(key).map(|entry| entry.value().clone()));
        let (status, body) = match stored {
            Some(previous) => previous,
            None => {
                let result = mutation(&self.state);
                if let Some(key) = key {
                    self.state.applied.insert(key, result.clone());
                }
                result
            }
        };

        let lost = self
            .state
            .lost_acks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            return (StatusCode::SERVICE_UNAVAILABLE, "ack lost").into_response();
        }

        let status = StatusCode::from_u16(status).unwrap();
        if body.is_null() {
            status.into_response()
        } else {
            (status, Json(body)).into_response()
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn create(
    State(server): State<MockServer>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    server.record("POST", format!("/{}", resource), &headers);
    server.respond(&headers, |state| {
        let id = (state.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        let mut entity = body;
        entity["id"] = json!(id);
        state
            .entities
            .insert(format!("{}/{}", resource, id), entity.clone());
        (201, entity)
    })
}

async fn update(
    State(server): State<MockServer>,
    Path((resource, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    server.record("PATCH", format!("/{}/{}", resource, id), &headers);
    server.respond(&headers, |state| {
        let Some(mut entity) = state.entities.get_mut(&format!("{}/{}", resource, id)) else {
            return (404, json!({"error": "not found"}));
        };
        if let (Some(target), Some(fields)) = (entity.value_mut().as_object_mut(), body.as_object())
        {
            for (name, value) in fields {
                target.insert(name.clone(), value.clone());
            }
        }
        (200, entity.value().clone())
    })
}

async fn delete(
    State(server): State<MockServer>,
    Path((resource, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    server.record("DELETE", format!("/{}/{}", resource, id), &headers);
    server.respond(&headers, |state| {
        match state.entities.remove(&format!("{}/{}", resource, id)) {
            Some(_) => (204, Value::Null),
            None => (404, json!({"error": "not found"})),
        }
    })
}

/// Poll `condition` every 10ms for up to two seconds.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn expense_payload(amount: f64) -> Value {
    json!({"amount": amount, "date": "2024-03-01", "description": "Coffee"})
}
