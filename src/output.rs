//! Output types returned by the batch orchestrator.

use crate::config::BatchConfig;
use crate::progress::{LogEntry, LogLevel, ProgressSnapshot};
use serde::Serialize;
use uuid::Uuid;

/// One rendered artifact under its final archive path.
#[derive(Debug, Clone)]
pub struct OutputArtifact {
    /// `/`-separated path inside the archive, unique per batch.
    pub path: String,
    pub bytes: Vec<u8>,
}

/// The assembled archive.
#[derive(Debug, Clone)]
pub struct ArchiveOutput {
    /// `<base name>.tar.gz`
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ArchiveOutput {
    /// Write the archive to `dir/<file_name>` atomically (temp file + rename).
    pub async fn save_in(&self, dir: &std::path::Path) -> std::io::Result<std::path::PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let target = dir.join(&self.file_name);
        let tmp = dir.join(format!(".{}.tmp", self.file_name));
        tokio::fs::write(&tmp, &self.bytes).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(target)
    }
}

/// What happened during a batch, whatever its outcome.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// The full append-only log, in order.
    pub log: Vec<LogEntry>,
    /// Archive paths of every artifact produced, in processing order.
    /// Artifacts restored from a journal come first on resume.
    pub artifacts: Vec<String>,
    /// Final progress counters.
    pub snapshot: ProgressSnapshot,
    /// Codepoint keys (`0x1F980`) of characters nothing could draw.
    pub missing: Vec<String>,
}

impl BatchReport {
    /// Number of entries logged at error level.
    pub fn error_count(&self) -> usize {
        self.log
            .iter()
            .filter(|e| e.level == LogLevel::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.log
            .iter()
            .filter(|e| e.level == LogLevel::Warn)
            .count()
    }
}

/// Terminal result of `start_batch` / `resume_batch`.
#[derive(Debug)]
pub enum BatchOutcome {
    /// The archive was built. `completed` is false when a stop request cut
    /// the queue short; the archive then holds what was done so far.
    Done {
        archive: ArchiveOutput,
        completed: bool,
        report: BatchReport,
    },
    /// A store fault stopped the batch. The remaining tasks and the
    /// parameter set are returned so the caller can retry; in Safe mode the
    /// session is also journaled under `session_id`.
    Partial {
        session_id: Uuid,
        remaining: Vec<crate::task::SourceTask>,
        config: BatchConfig,
        report: BatchReport,
    },
}

impl BatchOutcome {
    pub fn report(&self) -> &BatchReport {
        match self {
            BatchOutcome::Done { report, .. } | BatchOutcome::Partial { report, .. } => report,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, BatchOutcome::Done { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ItemError;
    use tempfile::TempDir;

    #[test]
    fn report_counts_levels() {
        let report = BatchReport {
            log: vec![
                LogEntry::info(None, "start"),
                LogEntry::warn(Some(0), "quota"),
                LogEntry::item_error(
                    1,
                    ItemError::Unreadable {
                        name: "a".into(),
                        detail: "x".into(),
                    },
                ),
            ],
            ..Default::default()
        };
        assert_eq!(report.error_count(), 1);
        assert_eq!(report.warning_count(), 1);
    }

    #[tokio::test]
    async fn archive_is_saved_under_its_name() {
        let dir = TempDir::new().unwrap();
        let archive = ArchiveOutput {
            file_name: "Convert_1.tar.gz".into(),
            bytes: vec![1, 2, 3],
        };
        let path = archive.save_in(dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("Convert_1.tar.gz"));
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
        assert!(!dir.path().join(".Convert_1.tar.gz.tmp").exists());
    }
}
