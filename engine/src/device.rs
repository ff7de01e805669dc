//! Per-device client identifier.

use crate::{
    storage::{KeyValueStore, CLIENT_ID_KEY},
    ClientId,
};

/// Read the persisted client id, creating it on first use.
///
/// `generate` is only called when no usable id is stored. A failed write is
/// logged and the generated id is still returned for this session.
pub fn load_or_create_client_id<F>(store: &dyn KeyValueStore, generate: F) -> ClientId
where
    F: FnOnce() -> ClientId,
{
    match store.get(CLIENT_ID_KEY) {
        Ok(Some(id)) if !id.trim().is_empty() => return id.trim().to_string(),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to read client id"),
    }

    let id = generate();
    if let Err(e) = store.set(CLIENT_ID_KEY, &id) {
        tracing::warn!(error = %e, "Failed to persist client id");
    } else {
        tracing::info!(client_id = %id, "Registered new client id");
    }
    id
}
