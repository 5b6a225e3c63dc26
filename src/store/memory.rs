//! In-process store.

use super::{validate_key, DurableStore};
use crate::error::StoreError;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// A [`DurableStore`] backed by a sorted map.
///
/// Not durable across processes; used by tests and by hosts that only need
/// resume within one process lifetime. An optional quota caps the sum of
/// stored value sizes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
    quota: Option<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the total stored bytes.
    pub fn with_quota(mut self, bytes: u64) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Total bytes currently stored.
    pub fn used_bytes(&self) -> u64 {
        self.lock().values().map(|v| v.len() as u64).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn put_sync(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut entries = self.lock();
        if let Some(quota) = self.quota {
            let used: u64 = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len() as u64)
                .sum();
            let needed = bytes.len() as u64;
            if used + needed > quota {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available: quota.saturating_sub(used),
                });
            }
        }
        entries.insert(key.to_string(), bytes);
        Ok(())
    }
}

impl DurableStore for MemoryStore {
    fn put<'a>(&'a self, key: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move { self.put_sync(key, bytes) })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>, StoreError>> {
        Box::pin(async move {
            validate_key(key)?;
            Ok(self.lock().get(key).cloned())
        })
    }

    fn list_keys<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        Box::pin(async move {
            Ok(self
                .lock()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        })
    }

    fn delete_all<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.lock().retain(|k, _| !k.starts_with(prefix));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_list_delete() {
        let store = MemoryStore::new();
        store.put("s/1/a.pdf", vec![1]).await.unwrap();
        store.put("s/1/b.pdf", vec![2]).await.unwrap();
        store.put("s/2/a.pdf", vec![3]).await.unwrap();

        assert_eq!(store.get("s/1/b.pdf").await.unwrap(), Some(vec![2]));
        assert_eq!(store.get("s/9").await.unwrap(), None);
        assert_eq!(
            store.list_keys("s/1/").await.unwrap(),
            vec!["s/1/a.pdf".to_string(), "s/1/b.pdf".to_string()]
        );

        store.delete_all("s/1/").await.unwrap();
        assert_eq!(store.list_keys("s/").await.unwrap(), vec!["s/2/a.pdf".to_string()]);
    }

    #[tokio::test]
    async fn quota_refuses_and_keeps_old_value() {
        let store = MemoryStore::new().with_quota(10);
        store.put("a", vec![0; 6]).await.unwrap();
        let err = store.put("b", vec![0; 6]).await.unwrap_err();
        assert!(err.is_quota());
        assert_eq!(store.get("b").await.unwrap(), None);

        // Overwriting a key only counts the new size.
        store.put("a", vec![0; 10]).await.unwrap();
        assert_eq!(store.used_bytes(), 10);
    }

    #[test]
    fn invalid_keys_are_rejected() {
        let store = MemoryStore::new();
        for key in ["../escape", "/abs", "a//b", ""] {
            assert!(
                matches!(
                    tokio_test::block_on(store.put(key, vec![])),
                    Err(StoreError::InvalidKey { .. })
                ),
                "{key:?} accepted"
            );
        }
    }
}
