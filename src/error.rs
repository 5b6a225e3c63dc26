//! Error types for the paperweight library.
//!
//! Two families of errors reflect two distinct failure modes:
//!
//! * [`BatchError`] — **Fatal**: the batch cannot start or cannot finish
//!   (store unavailable, no session to resume, archive assembly failed).
//!   Returned as `Err(BatchError)` from the orchestrator entry points.
//!
//! * [`ItemError`] — **Non-fatal**: a single source item failed (unreadable
//!   content, renderer fault, store quota) but every sibling item is fine.
//!   Stored inside [`crate::progress::LogEntry`] and the final report so
//!   callers can inspect partial success rather than losing the whole batch
//!   to one bad file.
//!
//! The collaborator errors ([`StoreError`], [`RenderError`],
//! [`ArchiveError`], [`RecoveryError`]) are what the injected traits return;
//! the orchestrator decides which of them are fatal.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// All fatal errors returned by the batch orchestrator.
///
/// Item-level failures use [`ItemError`] and are logged rather than
/// propagated here.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Start-up errors ───────────────────────────────────────────────────
    /// The queue handed to `start_batch` was empty.
    #[error("Nothing to convert: the task queue is empty")]
    EmptyQueue,

    /// A batch is already running on this orchestrator.
    #[error("A batch is already in progress (state: {state})")]
    AlreadyRunning { state: String },

    /// The durable store or journal could not be initialised.
    #[error("Failed to initialise the session journal: {0}")]
    JournalInit(#[source] StoreError),

    /// `resume_batch` was called but no session is journaled.
    #[error("No interrupted session found to resume")]
    NoActiveSession,

    /// The journaled session exists but cannot be decoded.
    #[error("Session {id} is corrupt: {detail}")]
    CorruptSession { id: Uuid, detail: String },

    /// The configured custom font could not be loaded.
    #[error("Custom font unavailable: {0}")]
    Font(#[from] FontError),

    // ── Finalisation errors ───────────────────────────────────────────────
    /// Building the final archive failed.
    ///
    /// In Safe mode the journal is kept, so `resume_batch` can retry the
    /// assembly without re-rendering anything.
    #[error("Archive assembly failed: {source}")]
    ArchiveFailed {
        #[source]
        source: ArchiveError,
        resumable: bool,
    },

    // ── Glyph registry ────────────────────────────────────────────────────
    /// The glyph registry could not be loaded or saved.
    #[error("Glyph registry error: {0}")]
    Registry(#[source] StoreError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single source item.
///
/// The batch continues after logging one of these.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The source content could not be read.
    #[error("{name}: unreadable source: {detail}")]
    Unreadable { name: String, detail: String },

    /// The render backend failed for this item.
    #[error("{name}: render failed: {detail}")]
    RenderFailed { name: String, detail: String },

    /// The durable store refused the artifact for lack of space.
    #[error("{path}: storage quota exceeded, artifact dropped")]
    QuotaExceeded { path: String },

    /// A journaled artifact was gone from the store at assembly time.
    #[error("{path}: stored artifact is missing, left out of the archive")]
    ArtifactLost { path: String },
}

/// Errors loading a user-supplied TrueType/OpenType font.
#[derive(Debug, Error)]
pub enum FontError {
    #[error("Cannot read font file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not a parseable TrueType/OpenType face.
    #[error("'{name}' is not a usable font: {detail}")]
    Parse { name: String, detail: String },
}

/// Errors reported by a [`crate::store::DurableStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write would exceed the store's capacity.
    ///
    /// Distinguished from other I/O failures because the orchestrator treats
    /// it as a per-item fault rather than a fatal one.
    #[error("Storage quota exceeded writing '{key}' ({needed} bytes needed, {available} available)")]
    QuotaExceeded {
        key: String,
        needed: u64,
        available: u64,
    },

    /// The key is not a valid store key (empty, absolute, or escaping the root).
    #[error("Invalid store key '{key}'")]
    InvalidKey { key: String },

    /// Underlying I/O failure.
    #[error("Store I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored value could not be encoded or decoded.
    #[error("Store serialisation error for '{key}': {detail}")]
    Serde { key: String, detail: String },
}

impl StoreError {
    /// True when the failure is a quota/space exhaustion.
    pub fn is_quota(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }
}

/// Errors reported by a [`crate::render::RenderBackend`].
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// A fallback glyph bitmap could not be decoded.
    #[error("Glyph bitmap for {key} is not a valid image: {detail}")]
    BadBitmap { key: String, detail: String },

    /// Any other backend failure.
    #[error("Render backend error: {0}")]
    Backend(String),
}

/// Errors reported by a [`crate::archive::ArchiveBuilder`].
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The in-memory builder ran past its memory budget; the listed
    /// artifacts were not added.
    #[error(
        "{} artifact(s) did not fit in the {budget}-byte memory budget: {}",
        dropped.len(),
        dropped.join(", ")
    )]
    MemoryBudgetExceeded { budget: u64, dropped: Vec<String> },

    /// Writing the archive stream failed.
    #[error("Archive write error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading a durable artifact back for assembly failed.
    #[error("Could not read stored artifact '{key}': {source}")]
    Store {
        key: String,
        #[source]
        source: StoreError,
    },
}

/// Errors reported by a [`crate::glyph::recovery::GlyphRecognizer`].
#[derive(Debug, Clone, Error)]
pub enum RecoveryError {
    /// The recognition service could not be reached or returned an error.
    #[error("Glyph service unavailable: {0}")]
    Unavailable(String),

    /// The service answered but the payload was unusable.
    #[error("Glyph service returned an invalid bitmap for {key}: {detail}")]
    InvalidResponse { key: String, detail: String },
}
