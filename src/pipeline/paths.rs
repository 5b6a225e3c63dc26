//! Artifact path assignment.
//!
//! Every artifact in one archive gets a distinct path. The first claim on
//! `dir/name.pdf` gets it verbatim; later claims get `name (1).pdf`,
//! `name (2).pdf`, … in order. The used-path set is journaled, so a resumed
//! batch keeps numbering where it left off.

use super::expand::ExpandedItem;
use crate::config::OutputLayout;
use crate::task::{join_dir, SourceTask};
use std::collections::HashSet;

/// Desired archive path for an item, before deduplication.
///
/// Mirror keeps the task's directory and any directory from a dump marker;
/// flat puts everything directly under the task's base path. The extension
/// of the source name is replaced by `ext`, and no path starts with `/`.
pub fn desired_path(
    layout: OutputLayout,
    task: &SourceTask,
    item: &ExpandedItem,
    ext: &str,
) -> String {
    let dir = match layout {
        OutputLayout::Mirror => join_dir(&task.destination_path, &item.rel_dir),
        OutputLayout::Flat => join_dir(&task.base_path, ""),
    };
    let file = format!("{}.{ext}", file_stem(&item.name));
    join_dir(&dir, &file)
}

/// `notes.tar.gz` → `notes.tar`; a leading-dot name without another dot is
/// kept whole (`.gitignore`).
fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(i) => &name[..i],
    }
}

/// Hands out unique archive paths.
#[derive(Debug, Clone, Default)]
pub struct PathAllocator {
    used: HashSet<String>,
}

impl PathAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with paths already present in the archive.
    pub fn with_used<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            used: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Claim `desired`, or the first free ` (n)` variant of it.
    pub fn allocate(&mut self, desired: &str) -> String {
        if self.used.insert(desired.to_string()) {
            return desired.to_string();
        }

        let (dir, file) = match desired.rsplit_once('/') {
            Some((dir, file)) => (Some(dir), file),
            None => (None, desired),
        };
        let (stem, ext) = match file.rfind('.') {
            Some(i) if i > 0 => (&file[..i], &file[i..]),
            _ => (file, ""),
        };

        let mut n = 1usize;
        loop {
            let candidate_file = format!("{stem} ({n}){ext}");
            let candidate = match dir {
                Some(dir) => format!("{dir}/{candidate_file}"),
                None => candidate_file,
            };
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Forget a claim, e.g. when the artifact under it was dropped.
    pub fn release(&mut self, path: &str) {
        self.used.remove(path);
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}
