//! Layout and rendering of one expanded item.
//!
//! [`layout_item`] is pure CPU work over borrowed state: it measures with
//! the glyph resolver, wraps, paginates, and resolves every line into glyph
//! runs. [`render_document`] hands the result to the backend.
//!
//! ## Why spawn_blocking?
//!
//! Backends such as `printpdf` do all of their work synchronously, and a
//! large source can take long enough to render that running it on a Tokio
//! worker would stall the runtime. `tokio::task::spawn_blocking` moves it
//! to the blocking pool.

use super::expand::ExpandedItem;
use crate::config::BatchConfig;
use crate::error::RenderError;
use crate::glyph::{GlyphDecision, GlyphRegistry, GlyphResolver, MissingCharacterLog, StaticGlyphTable};
use crate::layout::{
    lines_per_page, paginate, wrap_code, wrap_prose, FontContext, TextStyle, Tokenizer, UserFont,
};
use crate::render::{RenderBackend, RenderDocument};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Everything layout reads but never writes.
pub struct LayoutContext<'a> {
    pub font: &'a dyn FontContext,
    /// Measures instead of `font` when set, and travels with the document
    /// so the backend draws with the same face.
    pub user_font: Option<&'a Arc<UserFont>>,
    pub tokenizer: &'a dyn Tokenizer,
    pub registry: &'a GlyphRegistry,
    pub table: &'a StaticGlyphTable,
}

/// Lay `item` out into pages of resolved glyph runs.
///
/// Characters no tier can draw are appended to `missing`, once each.
#[instrument(skip_all, fields(name = %item.name, style = ?item.style))]
pub fn layout_item(
    ctx: &LayoutContext<'_>,
    config: &BatchConfig,
    item: &ExpandedItem,
    missing: &mut MissingCharacterLog,
) -> RenderDocument {
    let geometry = config.geometry(item.style);
    let font: &dyn FontContext = match ctx.user_font {
        Some(user) => user.as_ref(),
        None => ctx.font,
    };
    let resolver = GlyphResolver::new(
        font,
        ctx.registry,
        ctx.table,
        item.style,
        geometry.font_size,
    );
    let measure = |s: &str| resolver.measure(s);

    let lines = match item.style {
        TextStyle::Prose => wrap_prose(&item.content, geometry.layout_width, &measure, ctx.tokenizer),
        TextStyle::Code => wrap_code(&item.content, geometry.layout_width, &measure),
    };
    let line_count = lines.len();
    let capacity = lines_per_page(geometry.usable_height, geometry.line_height);

    let mut bitmaps = BTreeMap::new();
    let pages: Vec<_> = paginate(lines, capacity)
        .into_iter()
        .map(|page| {
            page.lines
                .iter()
                .map(|line| {
                    let runs = resolver.resolve_line(&line.text(), missing);
                    for run in &runs {
                        if let GlyphDecision::Bitmap { key } = &run.decision {
                            if !bitmaps.contains_key(key) {
                                if let Some(data) = resolver.bitmap_data(key) {
                                    bitmaps.insert(key.clone(), data.to_string());
                                }
                            }
                        }
                    }
                    runs
                })
                .collect()
        })
        .collect();

    debug!(
        lines = line_count,
        pages = pages.len(),
        per_page = capacity,
        bitmaps = bitmaps.len(),
        "item laid out"
    );

    RenderDocument {
        title: item.name.clone(),
        style: item.style,
        geometry,
        pages,
        bitmaps,
        font: ctx.user_font.cloned(),
    }
}

/// Render `doc` on the blocking pool, reporting `(done, total)` pages.
pub async fn render_document<F>(
    backend: Arc<dyn RenderBackend>,
    doc: RenderDocument,
    on_page: F,
) -> Result<Vec<u8>, RenderError>
where
    F: Fn(usize, usize) + Send + 'static,
{
    tokio::task::spawn_blocking(move || backend.render(&doc, &on_page))
        .await
        .map_err(|e| RenderError::Backend(format!("render task panicked: {e}")))?
}
