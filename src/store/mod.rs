//! Durable key/value storage for session state and Safe-mode artifacts.
//!
//! Everything that must outlive the process goes through a
//! [`DurableStore`]: the session journal, rendered artifacts awaiting
//! assembly, and the learned-glyph registry. Keys are `/`-separated relative
//! paths such as `sessions/<id>/artifacts/docs/a.pdf`.
//!
//! Two implementations ship:
//!
//! * [`DirectoryStore`] — one file per key under a root directory, atomic
//!   writes, optional byte quota.
//! * [`MemoryStore`] — a map behind a mutex, for tests and ephemeral runs.

pub mod dir;
pub mod memory;

pub use dir::DirectoryStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use futures::future::BoxFuture;

/// Persistent byte storage keyed by relative path.
///
/// All methods are async so implementations can do real I/O without
/// blocking the orchestrator. A `put` that would exceed capacity must fail
/// with [`StoreError::QuotaExceeded`] and leave any previous value intact.
pub trait DurableStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous value.
    fn put<'a>(&'a self, key: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Fetch the value under `key`, or `None` if absent.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>, StoreError>>;

    /// All keys starting with `prefix`, sorted.
    fn list_keys<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>>;

    /// Remove every key starting with `prefix`.
    fn delete_all<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// Reject keys that are empty, absolute, or contain `.`/`..` segments.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.contains('\0')
        || key
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StoreError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Read and decode a JSON value, `None` if the key is absent.
pub async fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn DurableStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        None => Ok(None),
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Serde {
                key: key.to_string(),
                detail: e.to_string(),
            }),
    }
}

/// Encode `value` as pretty JSON and store it.
pub async fn put_json<T: serde::Serialize + ?Sized>(
    store: &dyn DurableStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serde {
        key: key.to_string(),
        detail: e.to_string(),
    })?;
    store.put(key, bytes).await
}
