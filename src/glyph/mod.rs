//! Per-character glyph resolution with a learn-and-recover fallback.
//!
//! ## Resolution order
//!
//! ```text
//! char ──▶ font advance > 0 ? ──yes──▶ Native
//!                 │ no
//!                 ▼
//!          learned registry ──hit──▶ Bitmap
//!                 │ miss
//!                 ▼
//!          static table ─────hit──▶ Bitmap
//!                 │ miss
//!                 ▼
//!          Missing (logged once per session)
//! ```
//!
//! 1. [`resolver`] — the per-character decision and its advance width
//! 2. [`missing`]  — session-scoped, deduplicated log of unresolved characters
//! 3. [`registry`] — persisted learned glyphs plus the pre-shipped table
//! 4. [`recovery`] — asks an external recognizer for bitmaps of missing characters

pub mod missing;
pub mod recovery;
pub mod registry;
pub mod resolver;

pub use missing::MissingCharacterLog;
pub use recovery::{run_recovery_pass, GlyphRecognizer, LlmGlyphRecognizer, RecoveryReport};
pub use registry::{GlyphRegistry, GlyphRegistryEntry, StaticGlyphTable};
pub use resolver::{GlyphDecision, GlyphResolver, GlyphRun};

/// Registry key for a character: `0x` followed by uppercase hex.
///
/// ```rust
/// assert_eq!(paperweight::glyph::codepoint_key('🦀'), "0x1F980");
/// assert_eq!(paperweight::glyph::codepoint_key('a'), "0x61");
/// ```
pub fn codepoint_key(ch: char) -> String {
    format!("0x{:X}", ch as u32)
}

/// Inverse of [`codepoint_key`].
pub fn parse_codepoint_key(key: &str) -> Option<char> {
    let hex = key.strip_prefix("0x").or_else(|| key.strip_prefix("0X"))?;
    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_uppercase_hex() {
        assert_eq!(codepoint_key('\u{e9}'), "0xE9");
        assert_eq!(codepoint_key('中'), "0x4E2D");
    }

    #[test]
    fn parse_inverts_key() {
        for ch in ['a', 'é', '中', '🦀'] {
            assert_eq!(parse_codepoint_key(&codepoint_key(ch)), Some(ch));
        }
        assert_eq!(parse_codepoint_key("41"), None);
        assert_eq!(parse_codepoint_key("0xD800"), None);
        assert_eq!(parse_codepoint_key("0xZZ"), None);
    }
}
