//! Layout dump backend.

use super::{RenderBackend, RenderDocument};
use crate::error::RenderError;

/// Emits the resolved layout as pretty JSON instead of drawing it.
///
/// Useful for checking line breaks and glyph decisions without a PDF
/// reader, and as a deterministic backend in tests.
#[derive(Debug, Clone, Default)]
pub struct LayoutJsonBackend {
    /// Artifact extension; `pdf` by default so artifact paths match a real run.
    extension: Option<String>,
}

impl LayoutJsonBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = Some(ext.into());
        self
    }
}

impl RenderBackend for LayoutJsonBackend {
    fn render(
        &self,
        doc: &RenderDocument,
        progress: &dyn Fn(usize, usize),
    ) -> Result<Vec<u8>, RenderError> {
        let total = doc.page_count();
        for done in 1..=total {
            progress(done, total);
        }
        serde_json::to_vec_pretty(doc).map_err(|e| RenderError::Backend(e.to_string()))
    }

    fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or("pdf")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchConfig;
    use crate::glyph::{GlyphDecision, GlyphRun};
    use crate::layout::TextStyle;
    use std::cell::Cell;
    use std::collections::BTreeMap;

    #[test]
    fn emits_runs_and_reports_each_page() {
        let doc = RenderDocument {
            title: "a.txt".into(),
            style: TextStyle::Prose,
            geometry: BatchConfig::default().geometry(TextStyle::Prose),
            pages: vec![
                vec![vec![GlyphRun {
                    decision: GlyphDecision::Native,
                    text: "hello".into(),
                    advance: 20.0,
                }]],
                vec![vec![]],
            ],
            bitmaps: BTreeMap::new(),
            font: None,
        };
        let calls = Cell::new(0);
        let bytes = LayoutJsonBackend::new()
            .render(&doc, &|done, total| {
                assert_eq!(total, 2);
                calls.set(done);
            })
            .unwrap();
        assert_eq!(calls.get(), 2);

        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["title"], "a.txt");
        assert_eq!(v["pages"][0][0][0]["text"], "hello");
        assert_eq!(v["pages"][0][0][0]["decision"], "Native");
    }

    #[test]
    fn extension_defaults_to_pdf() {
        assert_eq!(LayoutJsonBackend::new().extension(), "pdf");
        assert_eq!(LayoutJsonBackend::new().with_extension("json").extension(), "json");
    }
}
