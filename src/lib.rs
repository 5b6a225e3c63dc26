//! # paperweight
//!
//! Batch-convert plain text and source files into paginated PDFs, packed
//! into one archive.
//!
//! ## Why this crate?
//!
//! Converting a folder of notes or a whole source tree to PDF sounds
//! trivial until the details bite: lines must wrap at word boundaries
//! without ever splitting a grapheme cluster, code must keep its line
//! structure and indentation, characters the font cannot draw must still
//! take up space, and a run over thousands of files must survive a crash
//! or a full disk without starting over.
//!
//! ## Pipeline Overview
//!
//! ```text
//! SourceTask queue
//!  │
//!  ├─ 1. Scan      count items (dump expansion) so progress never regresses
//!  ├─ 2. Expand    split `### **path** ###` dumps into items
//!  ├─ 3. Layout    NFC → tokenize → greedy wrap → paginate
//!  ├─ 4. Glyphs    native │ learned/static bitmap │ missing (logged once)
//!  ├─ 5. Render    backend on the blocking pool (PDF by default)
//!  ├─ 6. Persist   Safe: durable store + journal │ Fast: in-memory archive
//!  └─ 7. Archive   one .tar.gz with unique paths
//! ```
//!
//! Missing characters can be sent to a recognizer between batches
//! ([`BatchOrchestrator::recover_missing`]); learned bitmaps are persisted
//! and used by every later render.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paperweight::{BatchConfig, BatchOrchestrator, BatchOutcome, DirectoryStore, PdfBackend, SourceTask};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(DirectoryStore::open(".paperweight")?);
//!     let mut orchestrator = BatchOrchestrator::new(store, Arc::new(PdfBackend::new()));
//!
//!     let queue = vec![SourceTask::inline("hello.txt", "Hello, world!")];
//!     let outcome = orchestrator.start_batch(queue, BatchConfig::default()).await?;
//!     if let BatchOutcome::Done { archive, report, .. } = outcome {
//!         archive.save_in(std::path::Path::new(".")).await?;
//!         eprintln!("{} artifact(s), {} error(s)", report.artifacts.len(), report.error_count());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paperweight` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! paperweight = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod batch;
pub mod config;
pub mod error;
pub mod glyph;
pub mod journal;
pub mod layout;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod render;
pub mod store;
pub mod task;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use archive::{unpack, ArchiveBuilder, TarGzArchive};
pub use batch::{BatchOrchestrator, BatchState, StopHandle};
pub use config::{BatchConfig, BatchConfigBuilder, Margin, OutputLayout, PageGeometry, PaperSize, ResourceMode};
pub use error::{ArchiveError, BatchError, ItemError, RecoveryError, RenderError, StoreError};
pub use glyph::{
    GlyphDecision, GlyphRecognizer, GlyphRegistry, GlyphRegistryEntry, LlmGlyphRecognizer,
    MissingCharacterLog, RecoveryReport, StaticGlyphTable,
};
pub use journal::{ConversionSession, SessionJournal};
pub use layout::{BuiltinFonts, FontContext, TextStyle, Tokenizer, WhitespaceTokenizer, WordBoundaryTokenizer};
pub use output::{ArchiveOutput, BatchOutcome, BatchReport, OutputArtifact};
pub use progress::{
    BatchProgressCallback, LogEntry, LogLevel, NoopProgressCallback, ProgressCallback,
    ProgressSnapshot,
};
pub use render::{LayoutJsonBackend, PdfBackend, RenderBackend, RenderDocument};
pub use store::{DirectoryStore, DurableStore, MemoryStore};
pub use task::{SourceTask, TaskSource};
