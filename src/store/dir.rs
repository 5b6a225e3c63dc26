//! Filesystem-backed store: one file per key under a root directory.
//!
//! Writes go to a temp file in the destination directory and are renamed
//! into place, so a crash mid-write never leaves a truncated value behind.
//! All filesystem work runs on the blocking pool.

use super::{validate_key, DurableStore};
use crate::error::StoreError;
use futures::future::BoxFuture;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Temp files are created with this prefix and skipped by `list_keys`.
const TEMP_PREFIX: &str = ".pw-tmp";

/// A [`DurableStore`] rooted at a directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    root: PathBuf,
    quota: Option<u64>,
    /// Bytes held under `root`, tracked only while a quota is set.
    used: Mutex<u64>,
}

impl DirectoryStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        Ok(Self {
            inner: Arc::new(Inner {
                root,
                quota: None,
                used: Mutex::new(0),
            }),
        })
    }

    /// Cap the total bytes of all stored values.
    ///
    /// Whatever already sits under the root is measured once here and counts
    /// against the cap; later writes and deletes keep the tally current.
    pub fn with_quota(self, bytes: u64) -> Result<Self, StoreError> {
        let root = self.inner.root.clone();
        let used = dir_size(&root).map_err(|e| io_err(&root, e))?;
        debug!(root = %root.display(), used, quota = bytes, "store quota set");
        Ok(Self {
            inner: Arc::new(Inner {
                root,
                quota: Some(bytes),
                used: Mutex::new(used),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T, StoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| StoreError::Io {
                path: self.inner.root.clone(),
                source: io::Error::other(format!("store task panicked: {e}")),
            })?
    }
}

impl Inner {
    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |p, seg| p.join(seg)))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let needed = bytes.len() as u64;

        // Held across check and write.
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        let existing = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if let Some(quota) = self.quota {
            let others = used.saturating_sub(existing);
            if others + needed > quota {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available: quota.saturating_sub(others),
                });
            }
        }

        let parent = path.parent().unwrap_or(&self.root);
        let write = || -> io::Result<()> {
            std::fs::create_dir_all(parent)?;
            let mut tmp = tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .tempfile_in(parent)?;
            tmp.write_all(bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        };

        write().map_err(|e| {
            if e.kind() == io::ErrorKind::StorageFull {
                StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available: 0,
                }
            } else {
                io_err(&path, e)
            }
        })?;
        *used = used.saturating_sub(existing) + needed;
        debug!(key, bytes = needed, "stored");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        collect_keys(&self.root, "", &mut keys).map_err(|e| io_err(&self.root, e))?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn delete_all(&self, prefix: &str) -> Result<(), StoreError> {
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        for key in self.list_keys(prefix)? {
            let path = self.path_for(&key)?;
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match std::fs::remove_file(&path) {
                Ok(()) => *used = used.saturating_sub(size),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(&path, e)),
            }
        }
        // Drop the now-empty directory tree under a directory prefix.
        if let Some(dir) = prefix.strip_suffix('/') {
            if let Ok(path) = self.path_for(dir) {
                if path.is_dir() {
                    std::fs::remove_dir_all(&path).map_err(|e| io_err(&path, e))?;
                }
            }
        }
        Ok(())
    }
}

impl DurableStore for DirectoryStore {
    fn put<'a>(&'a self, key: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<(), StoreError>> {
        let key = key.to_string();
        Box::pin(self.blocking(move |inner| inner.put(&key, &bytes)))
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>, StoreError>> {
        let key = key.to_string();
        Box::pin(self.blocking(move |inner| inner.get(&key)))
    }

    fn list_keys<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>, StoreError>> {
        let prefix = prefix.to_string();
        Box::pin(self.blocking(move |inner| inner.list_keys(&prefix)))
    }

    fn delete_all<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        let prefix = prefix.to_string();
        Box::pin(self.blocking(move |inner| inner.delete_all(&prefix)))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn io_err(path: &Path, source: io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn collect_keys(dir: &Path, rel: &str, out: &mut Vec<String>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(TEMP_PREFIX) {
            continue;
        }
        let key = if rel.is_empty() {
            name.to_string()
        } else {
            format!("{rel}/{name}")
        };
        if entry.file_type()?.is_dir() {
            collect_keys(&entry.path(), &key, out)?;
        } else {
            out.push(key);
        }
    }
    Ok(())
}

fn dir_size(dir: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        total += if meta.is_dir() {
            dir_size(&entry.path())?
        } else {
            meta.len()
        };
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn round_trip_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();

        store.put("sessions/x/journal.json", b"{}".to_vec()).await.unwrap();
        store
            .put("sessions/x/artifacts/docs/a (1).pdf", b"%PDF".to_vec())
            .await
            .unwrap();

        assert!(dir.path().join("sessions/x/journal.json").exists());
        assert_eq!(
            store.get("sessions/x/journal.json").await.unwrap(),
            Some(b"{}".to_vec())
        );
        assert_eq!(store.get("sessions/x/none").await.unwrap(), None);
        assert_eq!(
            store.list_keys("sessions/x/artifacts/").await.unwrap(),
            vec!["sessions/x/artifacts/docs/a (1).pdf".to_string()]
        );
    }

    #[tokio::test]
    async fn overwrite_replaces_value() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        store.put("k", b"one".to_vec()).await.unwrap();
        store.put("k", b"two".to_vec()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.list_keys("").await.unwrap(), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn delete_all_removes_the_subtree() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        store.put("sessions/a/x", vec![1]).await.unwrap();
        store.put("sessions/a/y/z", vec![2]).await.unwrap();
        store.put("sessions/b/x", vec![3]).await.unwrap();

        store.delete_all("sessions/a/").await.unwrap();
        assert!(!dir.path().join("sessions/a").exists());
        assert_eq!(
            store.list_keys("sessions/").await.unwrap(),
            vec!["sessions/b/x".to_string()]
        );
    }

    #[tokio::test]
    async fn quota_exceeded_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path())
            .unwrap()
            .with_quota(8)
            .unwrap();
        store.put("a", vec![0; 5]).await.unwrap();
        let err = store.put("b", vec![0; 5]).await.unwrap_err();
        assert!(err.is_quota(), "got {err:?}");
        assert_eq!(store.get("b").await.unwrap(), None);
        assert_eq!(store.get("a").await.unwrap(), Some(vec![0; 5]));
    }

    #[tokio::test]
    async fn quota_tracks_overwrites_and_deletes() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::open(dir.path())
            .unwrap()
            .with_quota(10)
            .unwrap();
        store.put("s/a", vec![0; 6]).await.unwrap();
        // Overwriting replaces the old bytes rather than adding to them.
        store.put("s/a", vec![0; 9]).await.unwrap();
        assert!(store.put("t/b", vec![0; 2]).await.unwrap_err().is_quota());

        store.delete_all("s/").await.unwrap();
        store.put("t/b", vec![0; 10]).await.unwrap();
    }

    #[tokio::test]
    async fn quota_counts_what_is_already_on_disk() {
        let dir = TempDir::new().unwrap();
        {
            let store = DirectoryStore::open(dir.path()).unwrap();
            store.put("old", vec![0; 7]).await.unwrap();
        }
        let store = DirectoryStore::open(dir.path())
            .unwrap()
            .with_quota(10)
            .unwrap();
        let err = store.put("new", vec![0; 4]).await.unwrap_err();
        match err {
            StoreError::QuotaExceeded { available, .. } => assert_eq!(available, 3),
            other => panic!("unexpected {other:?}"),
        }
        store.put("new", vec![0; 3]).await.unwrap();
    }

    #[tokio::test]
    async fn reopened_store_sees_previous_values() {
        let dir = TempDir::new().unwrap();
        {
            let store = DirectoryStore::open(dir.path()).unwrap();
            store.put("persist/me", b"hi".to_vec()).await.unwrap();
        }
        let store = DirectoryStore::open(dir.path()).unwrap();
        assert_eq!(store.get("persist/me").await.unwrap(), Some(b"hi".to_vec()));
    }
}
