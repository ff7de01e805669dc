//! The network mutation API the replay engine talks to.
//!
//! The engine only describes requests. Transport lives behind
//! [`MutationApi`], implemented over HTTP by the client crate and by
//! scripted mocks in tests.

use crate::{error::Result, ClientMeta, EntityId, Error, OpType, Operation};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

/// HTTP method of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Post,
    Patch,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Post => write!(f, "POST"),
            Method::Patch => write!(f, "PATCH"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// A single request against the mutation API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRequest {
    pub method: Method,
    /// Path relative to the API base, e.g. `/expenses/42`
    pub path: String,
    pub meta: ClientMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl MutationRequest {
    /// Build the request that replays `op`.
    ///
    /// Updates and deletes without an entity id cannot be addressed and fail
    /// with [`Error::UnresolvableOperation`].
    pub fn for_operation(op: &Operation) -> Result<Self> {
        let kind = op.entity_kind;
        let (method, path) = match op.op_type {
            OpType::Create => (Method::Post, kind.resource_path().to_string()),
            OpType::Update | OpType::Delete => {
                let entity_id = op
                    .entity_id
                    .as_deref()
                    .ok_or_else(|| Error::UnresolvableOperation(op.id.clone()))?;
                let method = if op.op_type == OpType::Update {
                    Method::Patch
                } else {
                    Method::Delete
                };
                (method, kind.entity_path(entity_id))
            }
        };

        let body = match op.op_type {
            OpType::Delete => None,
            OpType::Create | OpType::Update => op.payload.clone(),
        };

        Ok(Self {
            method,
            path,
            meta: op.client_meta(),
            body,
        })
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MutationResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl MutationResponse {
    pub fn new(status: u16, body: Option<serde_json::Value>) -> Self {
        Self { status, body }
    }

    /// Server-assigned id from a create response, if present.
    pub fn server_id(&self) -> Option<EntityId> {
        match self.body.as_ref()?.get("id")? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Why a mutation did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,
}

impl ApiError {
    /// A 4xx rejection that retrying cannot fix.
    ///
    /// 408 and 429 are treated as transient.
    pub fn is_client_rejection(&self) -> bool {
        matches!(self, ApiError::Status { status, .. }
            if (400..500).contains(status) && *status != 408 && *status != 429)
    }
}

/// Transport for mutations against the server.
///
/// Implementations must send the request's idempotency metadata as headers
/// so the server can recognise a repeated attempt. Only 2xx is `Ok`.
pub trait MutationApi: Send + Sync {
    fn send(
        &self,
        request: MutationRequest,
    ) -> impl Future<Output = std::result::Result<MutationResponse, ApiError>> + Send;
}
