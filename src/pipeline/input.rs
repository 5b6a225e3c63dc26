//! Input loading: fetch a task's text.
//!
//! File sources are read lazily, when the task is processed, through
//! `tokio::fs` so the orchestrator never blocks a runtime worker on disk.
//! Invalid UTF-8 is replaced rather than rejected; a partly garbled text
//! file still converts.

use crate::error::ItemError;
use crate::task::{SourceTask, TaskSource};
use tracing::{debug, warn};

/// Read the full text of `task`.
pub async fn load_text(task: &SourceTask) -> Result<String, ItemError> {
    match &task.source {
        TaskSource::Inline(text) => Ok(text.clone()),
        TaskSource::File(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| ItemError::Unreadable {
                    name: task.display_name.clone(),
                    detail: format!("{}: {e}", path.display()),
                })?;
            debug!(path = %path.display(), bytes = bytes.len(), "source read");
            Ok(match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        name = %task.display_name,
                        "source is not valid UTF-8; replacing invalid sequences"
                    );
                    String::from_utf8_lossy(e.as_bytes()).into_owned()
                }
            })
        }
    }
}
