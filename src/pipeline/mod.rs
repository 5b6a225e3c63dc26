//! Pipeline stages for text-to-document conversion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the orchestrator only sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ expand ──▶ render ──────────▶ paths
//! (read)    (dump      (layout + glyphs   (unique
//!            markers)   + backend)         archive path)
//! ```
//!
//! 1. [`input`]  — read a task's text; invalid UTF-8 is replaced
//! 2. [`expand`] — split a dump into its marked files and normalise them
//! 3. [`render`] — wrap, paginate and resolve glyphs, then run the backend
//!    on the blocking pool
//! 4. [`paths`]  — derive the artifact path for the output layout and
//!    number duplicates

pub mod expand;
pub mod input;
pub mod paths;
pub mod render;
