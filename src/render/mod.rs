//! Render backends: resolved pages → artifact bytes.
//!
//! The pipeline hands a backend a fully laid-out [`RenderDocument`]: every
//! line is already split into [`GlyphRun`]s with a draw decision and an
//! advance, and every bitmap the document references is attached. The
//! backend only has to place things.
//!
//! * [`PdfBackend`] — PDF via `printpdf`, standard-14 fonts or an embedded
//!   user font, plus image XObjects for fallback glyphs.
//! * [`LayoutJsonBackend`] — the document itself as JSON, for inspection and
//!   tests.
//!
//! Backends run on the blocking pool and must not assume an async runtime.

pub mod json;
pub mod pdf;

pub use json::LayoutJsonBackend;
pub use pdf::PdfBackend;

use crate::config::PageGeometry;
use crate::error::RenderError;
use crate::glyph::GlyphRun;
use crate::layout::{TextStyle, UserFont};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One line of glyph runs.
pub type RenderLine = Vec<GlyphRun>;

/// A laid-out document ready for a backend.
#[derive(Debug, Clone, Serialize)]
pub struct RenderDocument {
    /// Source display name.
    pub title: String,
    pub style: TextStyle,
    pub geometry: PageGeometry,
    /// Pages of lines of runs.
    pub pages: Vec<Vec<RenderLine>>,
    /// Base64 PNG per bitmap key referenced by any run.
    pub bitmaps: BTreeMap<String, String>,
    /// Face that native runs were measured with; `None` means the
    /// standard faces.
    #[serde(skip)]
    pub font: Option<Arc<UserFont>>,
}

impl RenderDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Turns a [`RenderDocument`] into artifact bytes.
pub trait RenderBackend: Send + Sync {
    /// Render `doc`, calling `progress(done, total)` after each page.
    fn render(
        &self,
        doc: &RenderDocument,
        progress: &dyn Fn(usize, usize),
    ) -> Result<Vec<u8>, RenderError>;

    /// File extension of produced artifacts, without the dot.
    fn extension(&self) -> &str {
        "pdf"
    }
}
