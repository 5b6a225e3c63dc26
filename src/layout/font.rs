//! Measurable font context.
//!
//! The wrapper and the glyph resolver both need to know how far the pen
//! moves for a character. A zero advance is meaningful: it says the active
//! font cannot draw the character, which routes it to the bitmap fallback.

use super::TextStyle;
use crate::error::FontError;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Per-character advance widths for the active font.
///
/// Implementations must be deterministic: the same character, style and
/// size always yield the same advance.
pub trait FontContext: Send + Sync {
    /// Horizontal advance of `ch` in points, or `0.0` if the font has no
    /// glyph for it.
    fn advance(&self, ch: char, style: TextStyle, font_size: f32) -> f32;

    /// Sum of advances over `text`.
    fn measure(&self, text: &str, style: TextStyle, font_size: f32) -> f32 {
        text.chars().map(|c| self.advance(c, style, font_size)).sum()
    }
}

/// Metrics of the PDF standard-14 faces the default backend draws with:
/// Helvetica for prose, Courier for code.
///
/// The standard faces only cover Latin-1; everything else reports a zero
/// advance.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinFonts;

/// Courier advance, in 1/1000 em.
const COURIER_ADVANCE: u16 = 600;

/// Helvetica advances for U+0020..=U+007E, in 1/1000 em (from the Adobe AFM).
const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

/// Helvetica advance used for the Latin-1 supplement.
const HELVETICA_LATIN1: u16 = 556;

impl BuiltinFonts {
    /// True when the standard faces carry a glyph for `ch`.
    pub fn covers(ch: char) -> bool {
        matches!(ch as u32, 0x20..=0x7E | 0xA0..=0xFF)
    }

    fn units(ch: char, style: TextStyle) -> u16 {
        if !Self::covers(ch) {
            return 0;
        }
        match style {
            TextStyle::Code => COURIER_ADVANCE,
            TextStyle::Prose => match ch as u32 {
                c @ 0x20..=0x7E => HELVETICA_ASCII[(c - 0x20) as usize],
                _ => HELVETICA_LATIN1,
            },
        }
    }
}

impl FontContext for BuiltinFonts {
    fn advance(&self, ch: char, style: TextStyle, font_size: f32) -> f32 {
        Self::units(ch, style) as f32 * font_size / 1000.0
    }
}

// ── User fonts ───────────────────────────────────────────────────────────

/// A TrueType/OpenType face supplied by the user, drawn in place of the
/// standard faces for both prose and code.
///
/// Advances come from the face's `hmtx` table for every character its
/// Unicode `cmap` maps to a real glyph; anything else reports zero and goes
/// to the bitmap fallback. The raw bytes are kept so the PDF backend can
/// embed the same face it was measured with.
#[derive(Clone)]
pub struct UserFont {
    name: String,
    data: Arc<Vec<u8>>,
    /// Advance per covered character, in 1/1000 em.
    units: HashMap<char, u16>,
}

impl UserFont {
    /// Read and parse a font file.
    pub fn open(path: &Path) -> Result<Self, FontError> {
        let data = std::fs::read(path).map_err(|source| FontError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(name, data)
    }

    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<Self, FontError> {
        let name = name.into();
        let face = ttf_parser::Face::parse(&data, 0).map_err(|e| FontError::Parse {
            name: name.clone(),
            detail: e.to_string(),
        })?;
        let units_per_em = face.units_per_em().max(1) as u32;

        let mut units = HashMap::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables {
                if !subtable.is_unicode() {
                    continue;
                }
                subtable.codepoints(|cp| {
                    let (Some(ch), Some(gid)) = (char::from_u32(cp), subtable.glyph_index(cp))
                    else {
                        return;
                    };
                    if gid.0 == 0 {
                        return;
                    }
                    let advance = face.glyph_hor_advance(gid).unwrap_or(0) as u32;
                    let scaled = (advance * 1000 + units_per_em / 2) / units_per_em;
                    units.entry(ch).or_insert(scaled.min(u16::MAX as u32) as u16);
                });
            }
        }
        if units.is_empty() {
            return Err(FontError::Parse {
                name,
                detail: "no Unicode character map".into(),
            });
        }
        debug!(font = %name, glyphs = units.len(), "user font loaded");

        Ok(Self {
            name,
            data: Arc::new(data),
            units,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The font file as loaded.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn covers(&self, ch: char) -> bool {
        self.units.get(&ch).is_some_and(|&u| u > 0)
    }

    /// Number of characters the face maps.
    pub fn coverage(&self) -> usize {
        self.units.len()
    }
}

impl FontContext for UserFont {
    fn advance(&self, ch: char, _style: TextStyle, font_size: f32) -> f32 {
        self.units.get(&ch).copied().unwrap_or(0) as f32 * font_size / 1000.0
    }
}

impl fmt::Debug for UserFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserFont")
            .field("name", &self.name)
            .field("bytes", &self.data.len())
            .field("coverage", &self.units.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuffy() -> UserFont {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/Tuffy.ttf");
        UserFont::open(&path).unwrap()
    }

    #[test]
    fn courier_is_monospace() {
        let f = BuiltinFonts;
        assert_eq!(f.advance('i', TextStyle::Code, 10.0), 6.0);
        assert_eq!(f.advance('W', TextStyle::Code, 10.0), 6.0);
        assert_eq!(f.measure("abc", TextStyle::Code, 10.0), 18.0);
    }

    #[test]
    fn helvetica_is_proportional() {
        let f = BuiltinFonts;
        assert!(f.advance('i', TextStyle::Prose, 10.0) < f.advance('W', TextStyle::Prose, 10.0));
        assert!((f.advance(' ', TextStyle::Prose, 10.0) - 2.78).abs() < 1e-4);
        assert!((f.advance('~', TextStyle::Prose, 10.0) - 5.84).abs() < 1e-4);
    }

    #[test]
    fn uncovered_characters_have_zero_advance() {
        let f = BuiltinFonts;
        assert_eq!(f.advance('🦀', TextStyle::Prose, 10.0), 0.0);
        assert_eq!(f.advance('中', TextStyle::Code, 10.0), 0.0);
        assert_eq!(f.advance('\u{7}', TextStyle::Prose, 10.0), 0.0);
        assert!(f.advance('é', TextStyle::Prose, 10.0) > 0.0);
    }

    #[test]
    fn user_font_covers_greek_and_cyrillic() {
        let f = tuffy();
        assert_eq!(f.name(), "Tuffy.ttf");
        for ch in ['a', 'α', 'Ω', 'Ж', '€'] {
            assert!(f.covers(ch), "{ch} not covered");
            assert!(f.advance(ch, TextStyle::Prose, 10.0) > 0.0);
        }
        assert!(!f.covers('中'));
        assert_eq!(f.advance('中', TextStyle::Code, 10.0), 0.0);
        assert!(f.advance('m', TextStyle::Prose, 10.0) > f.advance('i', TextStyle::Prose, 10.0));
    }

    #[test]
    fn user_font_ignores_style() {
        let f = tuffy();
        assert_eq!(
            f.measure("Ζεύς", TextStyle::Prose, 12.0),
            f.measure("Ζεύς", TextStyle::Code, 12.0)
        );
    }

    #[test]
    fn garbage_is_not_a_font() {
        let err = UserFont::from_bytes("junk.ttf", b"definitely not a font".to_vec()).unwrap_err();
        assert!(matches!(err, FontError::Parse { ref name, .. } if name == "junk.ttf"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = UserFont::open(Path::new("/nonexistent/font.ttf")).unwrap_err();
        assert!(matches!(err, FontError::Io { .. }));
    }
}
