//! Session journal: the persisted state that lets a Safe-mode batch resume.
//!
//! ## Store layout
//!
//! ```text
//! sessions/active                         id of the surfaced session
//! sessions/<id>/journal.json              ConversionSession
//! sessions/<id>/artifacts/<archive path>  one rendered artifact
//! ```
//!
//! Sessions are keyed by id so several can coexist in one store; only the
//! one named by `sessions/active` is offered for resume. The journal is
//! rewritten after every completed task, and the whole `sessions/<id>/`
//! prefix is dropped once the archive has been built.

use crate::config::{BatchConfig, ResourceMode};
use crate::error::{BatchError, StoreError};
use crate::progress::ProgressSnapshot;
use crate::store::{get_json, put_json, DurableStore};
use crate::task::SourceTask;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const SESSIONS_PREFIX: &str = "sessions";
const ACTIVE_KEY: &str = "sessions/active";

/// Everything needed to pick up an interrupted batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionSession {
    pub id: Uuid,
    /// Archive base name, without extension.
    pub base_name: String,
    pub original_queue: Vec<SourceTask>,
    /// Index of the first task not yet completed. Only ever increases.
    pub current_index: usize,
    pub mode: ResourceMode,
    /// Archive paths claimed so far, in assignment order.
    pub output_paths: Vec<String>,
    /// Batch parameters; the progress callback is not persisted.
    pub config: BatchConfig,
    /// Missing-character snapshot (`0x…` keys).
    pub missing: Vec<String>,
    /// Counters as of `current_index`.
    pub progress: ProgressSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversionSession {
    pub fn new(base_name: String, queue: Vec<SourceTask>, config: BatchConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            base_name,
            original_queue: queue,
            current_index: 0,
            mode: config.mode,
            output_paths: Vec::new(),
            config,
            missing: Vec::new(),
            progress: ProgressSnapshot::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Tasks from `current_index` on.
    pub fn remaining(&self) -> &[SourceTask] {
        self.original_queue
            .get(self.current_index..)
            .unwrap_or_default()
    }

    pub fn is_finished(&self) -> bool {
        self.current_index >= self.original_queue.len()
    }
}

/// Reads and writes sessions in a [`DurableStore`].
#[derive(Clone)]
pub struct SessionJournal {
    store: Arc<dyn DurableStore>,
}

impl SessionJournal {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    fn journal_key(id: Uuid) -> String {
        format!("{SESSIONS_PREFIX}/{id}/journal.json")
    }

    fn session_prefix(id: Uuid) -> String {
        format!("{SESSIONS_PREFIX}/{id}/")
    }

    fn artifacts_prefix(id: Uuid) -> String {
        format!("{SESSIONS_PREFIX}/{id}/artifacts/")
    }

    /// Store key of the artifact at archive `path`.
    pub fn artifact_key(id: Uuid, path: &str) -> String {
        format!("{}{path}", Self::artifacts_prefix(id))
    }

    /// Persist a new session and make it the active one.
    pub async fn create(&self, session: &ConversionSession) -> Result<(), StoreError> {
        put_json(self.store.as_ref(), &Self::journal_key(session.id), session).await?;
        self.store
            .put(ACTIVE_KEY, session.id.to_string().into_bytes())
            .await?;
        info!(session = %session.id, tasks = session.original_queue.len(), "session journaled");
        Ok(())
    }

    /// Rewrite the session record.
    pub async fn save(&self, session: &mut ConversionSession) -> Result<(), StoreError> {
        session.updated_at = Utc::now();
        put_json(self.store.as_ref(), &Self::journal_key(session.id), session).await?;
        debug!(session = %session.id, index = session.current_index, "journal advanced");
        Ok(())
    }

    /// The active session, if one is journaled.
    pub async fn load_active(&self) -> Result<Option<ConversionSession>, BatchError> {
        let Some(raw) = self.store.get(ACTIVE_KEY).await.map_err(BatchError::JournalInit)? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&raw);
        let id = Uuid::parse_str(text.trim()).map_err(|e| BatchError::CorruptSession {
            id: Uuid::nil(),
            detail: format!("active pointer '{}' is not a session id: {e}", text.trim()),
        })?;

        let session: ConversionSession = get_json(self.store.as_ref(), &Self::journal_key(id))
            .await
            .map_err(|e| BatchError::CorruptSession {
                id,
                detail: e.to_string(),
            })?
            .ok_or_else(|| BatchError::CorruptSession {
                id,
                detail: "journal record is missing".into(),
            })?;

        if session.id != id || session.current_index > session.original_queue.len() {
            return Err(BatchError::CorruptSession {
                id,
                detail: format!(
                    "index {} out of range for {} task(s)",
                    session.current_index,
                    session.original_queue.len()
                ),
            });
        }
        Ok(Some(session))
    }

    /// Store one artifact under the session.
    pub async fn put_artifact(
        &self,
        id: Uuid,
        path: &str,
        bytes: Vec<u8>,
    ) -> Result<(), StoreError> {
        self.store.put(&Self::artifact_key(id, path), bytes).await
    }

    /// Archive paths of every stored artifact, sorted.
    pub async fn list_artifacts(&self, id: Uuid) -> Result<Vec<String>, StoreError> {
        let prefix = Self::artifacts_prefix(id);
        Ok(self
            .store
            .list_keys(&prefix)
            .await?
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    pub async fn get_artifact(&self, id: Uuid, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.store.get(&Self::artifact_key(id, path)).await
    }

    /// Drop everything stored for `id` and the active pointer if it names `id`.
    pub async fn clear(&self, id: Uuid) -> Result<(), StoreError> {
        self.store.delete_all(&Self::session_prefix(id)).await?;
        if let Some(raw) = self.store.get(ACTIVE_KEY).await? {
            if String::from_utf8_lossy(&raw).trim() == id.to_string() {
                self.store.delete_all(ACTIVE_KEY).await?;
            }
        }
        info!(session = %id, "session cleared");
        Ok(())
    }
}
