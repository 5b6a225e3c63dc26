//! Archive assembly.
//!
//! Artifacts are packed into one gzip-compressed tar. In Fast mode the
//! builder is fed as items finish and holds everything in memory; in Safe
//! mode it is fed once, at finalisation, from the durable store.

use crate::error::ArchiveError;
use crate::output::OutputArtifact;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Read;
use tracing::{debug, warn};

/// Collects artifacts and produces archive bytes.
pub trait ArchiveBuilder: Send {
    /// Queue an artifact. Never fails; a builder that cannot take the
    /// artifact remembers that and reports it from [`build`](Self::build).
    fn add(&mut self, artifact: OutputArtifact);

    /// Assemble the archive.
    fn build(self: Box<Self>) -> Result<Vec<u8>, ArchiveError>;

    /// Bytes currently held.
    fn held_bytes(&self) -> u64;
}

/// In-memory `.tar.gz` builder with an optional byte budget.
#[derive(Debug, Default)]
pub struct TarGzArchive {
    entries: Vec<(String, Vec<u8>)>,
    held: u64,
    budget: Option<u64>,
    dropped: Vec<String>,
}

impl TarGzArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse artifacts once `bytes` of artifact data are held.
    pub fn with_budget(mut self, bytes: Option<u64>) -> Self {
        self.budget = bytes;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Paths refused for lack of budget, in order.
    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }
}

impl ArchiveBuilder for TarGzArchive {
    fn add(&mut self, artifact: OutputArtifact) {
        let size = artifact.bytes.len() as u64;
        if let Some(budget) = self.budget {
            if self.held + size > budget {
                warn!(path = %artifact.path, size, budget, "artifact exceeds archive memory budget");
                self.dropped.push(artifact.path);
                return;
            }
        }
        self.held += size;
        self.entries.push((artifact.path, artifact.bytes));
    }

    fn build(self: Box<Self>) -> Result<Vec<u8>, ArchiveError> {
        let this = *self;
        if !this.dropped.is_empty() {
            return Err(ArchiveError::MemoryBudgetExceeded {
                budget: this.budget.unwrap_or(0),
                dropped: this.dropped,
            });
        }

        let mut out = Vec::new();
        {
            let gz = GzEncoder::new(&mut out, Compression::default());
            let mut tar = tar::Builder::new(gz);
            let mtime = chrono::Utc::now().timestamp().max(0) as u64;

            for (path, bytes) in &this.entries {
                let mut header = tar::Header::new_gnu();
                header.set_size(bytes.len() as u64);
                header.set_mode(0o644);
                header.set_mtime(mtime);
                header.set_cksum();
                tar.append_data(&mut header, path, bytes.as_slice())?;
            }

            tar.into_inner()?.finish()?;
        }

        debug!(
            entries = this.entries.len(),
            raw = this.held,
            compressed = out.len(),
            "archive built"
        );
        Ok(out)
    }

    fn held_bytes(&self) -> u64 {
        self.held
    }
}

/// Read every artifact back out of a `.tar.gz`, in archive order.
pub fn unpack(bytes: &[u8]) -> Result<Vec<OutputArtifact>, ArchiveError> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut out = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        out.push(OutputArtifact { path, bytes });
    }
    Ok(out)
}
