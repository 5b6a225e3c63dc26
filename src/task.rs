//! Source tasks: the unit of work handed to the orchestrator.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Where a task's text comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TaskSource {
    /// Text held in memory.
    Inline(String),
    /// A file read when the task is processed.
    File(PathBuf),
}

/// One queued source. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTask {
    pub source: TaskSource,
    /// File name shown in logs; its extension picks prose or code layout.
    pub display_name: String,
    /// Archive directory of the source's own folder (`docs/guide`), used by
    /// the mirror layout.
    pub destination_path: String,
    /// Archive directory of the input root the source was found under
    /// (`docs`), used by the flat layout.
    pub base_path: String,
    /// Source size in bytes, for progress accounting.
    pub size: u64,
}

impl SourceTask {
    /// A task over in-memory text, placed at the archive root.
    pub fn inline(display_name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            size: content.len() as u64,
            source: TaskSource::Inline(content),
            display_name: display_name.into(),
            destination_path: String::new(),
            base_path: String::new(),
        }
    }

    /// A task over a file on disk.
    ///
    /// With `root`, the file's directory relative to the root's parent
    /// becomes the destination (so the root's own name is kept) and the
    /// root's name becomes the base path. Without it the file lands at the
    /// archive root.
    pub fn from_file(path: impl Into<PathBuf>, root: Option<&Path>) -> std::io::Result<Self> {
        let path = path.into();
        let size = std::fs::metadata(&path)?.len();
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let (destination_path, base_path) = match root {
            Some(root) => {
                let root_name = root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let rel_dir = path
                    .parent()
                    .and_then(|p| p.strip_prefix(root).ok())
                    .map(archive_dir)
                    .unwrap_or_default();
                (join_dir(&root_name, &rel_dir), root_name)
            }
            None => (String::new(), String::new()),
        };

        Ok(Self {
            source: TaskSource::File(path),
            display_name,
            destination_path,
            base_path,
            size,
        })
    }

    pub fn with_destination(mut self, destination_path: impl Into<String>) -> Self {
        self.destination_path = destination_path.into();
        self
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }
}

/// Join two `/`-separated archive directories, skipping empty parts.
pub fn join_dir(a: &str, b: &str) -> String {
    let a = a.trim_matches('/');
    let b = b.trim_matches('/');
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{a}/{b}"),
    }
}

/// A relative filesystem path as an archive directory (`a/b`).
fn archive_dir(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
