//! Progress reporting: snapshots, the structured batch log, and the
//! callback trait through which both reach the host application.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive
//! events while the orchestrator works through the queue.
//!
//! # Why callbacks instead of channels?
//!
//! A callback is the least-invasive integration point: hosts can forward
//! events to a progress bar, a UI store, or a channel without the library
//! knowing how the host communicates. A channel view of the log is still
//! available through [`crate::batch::BatchOrchestrator::subscribe_log`].
//!
//! # Example
//!
//! ```rust
//! use paperweight::{BatchConfig, BatchProgressCallback, ProgressSnapshot};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl BatchProgressCallback for Printer {
//!     fn on_item_complete(&self, path: &str, snapshot: &ProgressSnapshot) {
//!         eprintln!("{path} ({}/{})", snapshot.processed_file_count, snapshot.total_file_count);
//!     }
//! }
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ItemError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Point-in-time view of batch progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Source bytes fully processed, plus the rendered fraction of the
    /// current source.
    pub processed_bytes: u64,
    /// Sum of all source sizes in the queue.
    pub total_bytes: u64,
    /// Items (after dump expansion) attempted so far, failed ones included.
    pub processed_file_count: usize,
    /// Items in the queue after dump expansion, fixed by the pre-scan.
    pub total_file_count: usize,
    /// Render progress of the current item, 0–100.
    pub current_page_percent: f32,
}

/// Severity of a [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One record of the append-only batch log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    /// Queue index of the task this entry concerns, if any.
    pub task_index: Option<usize>,
    pub message: String,
    /// Present on item failures.
    pub error: Option<ItemError>,
}

impl LogEntry {
    pub fn info(task_index: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            level: LogLevel::Info,
            task_index,
            message: message.into(),
            error: None,
        }
    }

    pub fn warn(task_index: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Warn,
            ..Self::info(task_index, message)
        }
    }

    pub fn item_error(task_index: impl Into<Option<usize>>, error: ItemError) -> Self {
        Self {
            at: Utc::now(),
            level: LogLevel::Error,
            task_index: task_index.into(),
            message: error.to_string(),
            error: Some(error),
        }
    }
}

/// Called by the orchestrator as it works through a batch.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The orchestrator is single-threaded per batch, but
/// page progress is reported from the blocking render thread, hence the
/// `Send + Sync` bound.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after the pre-scan, before the first task runs.
    fn on_batch_start(&self, snapshot: &ProgressSnapshot) {
        let _ = snapshot;
    }

    /// Called before an item is rendered.
    fn on_item_start(&self, task_index: usize, name: &str) {
        let _ = (task_index, name);
    }

    /// Called as the backend finishes pages of the current item.
    fn on_page_progress(&self, snapshot: &ProgressSnapshot) {
        let _ = snapshot;
    }

    /// Called when an artifact has been stored under its final path.
    fn on_item_complete(&self, path: &str, snapshot: &ProgressSnapshot) {
        let _ = (path, snapshot);
    }

    /// Called when an item fails; the batch continues.
    fn on_item_error(&self, error: &ItemError, snapshot: &ProgressSnapshot) {
        let _ = (error, snapshot);
    }

    /// Called after every sub-item of a task has been attempted and, in
    /// Safe mode, the journal has advanced past it.
    fn on_task_complete(&self, task_index: usize, snapshot: &ProgressSnapshot) {
        let _ = (task_index, snapshot);
    }

    /// Called for every entry appended to the batch log.
    fn on_log(&self, entry: &LogEntry) {
        let _ = entry;
    }

    /// Called once when the batch reaches a terminal state.
    ///
    /// `completed` is false when a stop request or a fatal fault left tasks
    /// unprocessed.
    fn on_batch_complete(&self, completed: bool, snapshot: &ProgressSnapshot) {
        let _ = (completed, snapshot);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        completes: AtomicUsize,
        errors: AtomicUsize,
        logs: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_item_complete(&self, _path: &str, _snapshot: &ProgressSnapshot) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_error(&self, _error: &ItemError, _snapshot: &ProgressSnapshot) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_log(&self, _entry: &LogEntry) {
            self.logs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let snap = ProgressSnapshot::default();
        cb.on_batch_start(&snap);
        cb.on_item_start(0, "a.txt");
        cb.on_page_progress(&snap);
        cb.on_item_complete("a.pdf", &snap);
        cb.on_task_complete(0, &snap);
        cb.on_log(&LogEntry::info(None, "hello"));
        cb.on_batch_complete(true, &snap);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            logs: AtomicUsize::new(0),
        };
        let snap = ProgressSnapshot::default();
        tracker.on_item_complete("a.pdf", &snap);
        tracker.on_item_complete("b.pdf", &snap);
        tracker.on_item_error(
            &ItemError::Unreadable {
                name: "c.txt".into(),
                detail: "gone".into(),
            },
            &snap,
        );
        tracker.on_log(&LogEntry::warn(Some(1), "careful"));

        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.logs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn item_error_entry_carries_the_error() {
        let entry = LogEntry::item_error(
            2,
            ItemError::RenderFailed {
                name: "task-2".into(),
                detail: "nope".into(),
            },
        );
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.task_index, Some(2));
        assert!(entry.message.contains("task-2"));
        assert!(entry.error.is_some());
    }
}
