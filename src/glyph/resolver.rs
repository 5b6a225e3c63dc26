//! The per-character draw decision.
//!
//! Decisions are recomputed every time a line is resolved. Nothing is cached
//! across renders, so a glyph learned by a recovery pass takes effect on the
//! very next item.

use super::codepoint_key;
use super::missing::MissingCharacterLog;
use super::registry::{GlyphRegistry, StaticGlyphTable};
use crate::layout::{FontContext, TextStyle};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bitmap glyphs are drawn in a square of this fraction of the font size.
pub const BITMAP_SCALE: f32 = 0.8;
/// Pen advance after a bitmap glyph, as a fraction of the font size.
pub const BITMAP_ADVANCE: f32 = 0.85;
/// Pen advance for a character no tier could draw.
pub const MISSING_ADVANCE: f32 = 0.4;

/// How one character is drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlyphDecision {
    /// The active font has a glyph.
    Native,
    /// Drawn from a bitmap; `key` names it in the registry or static table.
    Bitmap { key: String },
    /// Nothing can draw it; the pen only advances.
    Missing(char),
}

/// A maximal stretch of a line sharing one decision. Native characters are
/// grouped; every fallback or missing character is its own run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlyphRun {
    pub decision: GlyphDecision,
    pub text: String,
    /// Total advance of the run in points.
    pub advance: f32,
}

/// Resolves characters against the font, the learned registry and the
/// static table, for one text style at one size.
pub struct GlyphResolver<'a> {
    font: &'a dyn FontContext,
    registry: &'a GlyphRegistry,
    table: &'a StaticGlyphTable,
    style: TextStyle,
    font_size: f32,
}

impl<'a> GlyphResolver<'a> {
    pub fn new(
        font: &'a dyn FontContext,
        registry: &'a GlyphRegistry,
        table: &'a StaticGlyphTable,
        style: TextStyle,
        font_size: f32,
    ) -> Self {
        Self {
            font,
            registry,
            table,
            style,
            font_size,
        }
    }

    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    /// Decide how `ch` is drawn. Pure: does not touch the missing log.
    pub fn decide(&self, ch: char) -> GlyphDecision {
        if self.font.advance(ch, self.style, self.font_size) > 0.0 {
            return GlyphDecision::Native;
        }
        let key = codepoint_key(ch);
        if self.registry.get_key(&key).is_some() || self.table.get_key(&key).is_some() {
            return GlyphDecision::Bitmap { key };
        }
        GlyphDecision::Missing(ch)
    }

    /// Pen advance of `ch` under its decision.
    pub fn advance(&self, ch: char) -> f32 {
        let native = self.font.advance(ch, self.style, self.font_size);
        if native > 0.0 {
            return native;
        }
        match self.decide(ch) {
            GlyphDecision::Bitmap { .. } => BITMAP_ADVANCE * self.font_size,
            _ => MISSING_ADVANCE * self.font_size,
        }
    }

    /// Width of `text` as it will be rendered. This is the measure handed to
    /// the wrapper.
    pub fn measure(&self, text: &str) -> f32 {
        text.chars().map(|c| self.advance(c)).sum()
    }

    /// Base64 PNG for a bitmap key: learned glyphs shadow the static table.
    pub fn bitmap_data(&self, key: &str) -> Option<&'a str> {
        self.registry
            .get_key(key)
            .map(|e| e.bitmap_data.as_str())
            .or_else(|| self.table.get_key(key))
    }

    /// Split `line` into runs and log every missing character.
    pub fn resolve_line(&self, line: &str, missing: &mut MissingCharacterLog) -> Vec<GlyphRun> {
        let mut runs: Vec<GlyphRun> = Vec::new();

        for ch in line.chars() {
            let decision = self.decide(ch);
            let advance = match &decision {
                GlyphDecision::Native => self.font.advance(ch, self.style, self.font_size),
                GlyphDecision::Bitmap { .. } => BITMAP_ADVANCE * self.font_size,
                GlyphDecision::Missing(c) => {
                    if missing.record(*c) {
                        debug!(codepoint = %codepoint_key(*c), "missing glyph");
                    }
                    MISSING_ADVANCE * self.font_size
                }
            };

            if let (GlyphDecision::Native, Some(last)) = (&decision, runs.last_mut()) {
                if last.decision == GlyphDecision::Native {
                    last.text.push(ch);
                    last.advance += advance;
                    continue;
                }
            }
            runs.push(GlyphRun {
                decision,
                text: ch.to_string(),
                advance,
            });
        }

        runs
    }
}
