//! Text layout: source text → measured lines → fixed-capacity pages.
//!
//! ## Data Flow
//!
//! ```text
//! text ──▶ normalise ──▶ segment ──▶ wrap ──▶ paginate
//!          (NFC)         (words)     (width)   (height)
//! ```
//!
//! 1. [`segment`]  — pluggable word tokenizers and grapheme iteration
//! 2. [`wrap`]     — greedy width-constrained line packing; prose and code
//!    sources follow different rules
//! 3. [`paginate`] — partition lines into pages of `floor(height / line)` lines
//! 4. [`font`]     — the measurable font context the wrapper and the glyph
//!    resolver both consult
//!
//! Widths are in PDF points throughout.

pub mod font;
pub mod paginate;
pub mod segment;
pub mod wrap;

pub use font::{BuiltinFonts, FontContext, UserFont};
pub use paginate::{lines_per_page, paginate, Page};
pub use segment::{Tokenizer, WhitespaceTokenizer, WordBoundaryTokenizer};
pub use wrap::{wrap_code, wrap_prose};

use serde::{Deserialize, Serialize};
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

/// Which layout rules and font a source is set in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextStyle {
    /// Word-wrapped running text in a proportional face.
    Prose,
    /// Line-preserving monospace text.
    Code,
}

const CODE_EXTENSIONS: &[&str] = &[
    "py", "js", "json", "ts", "tsx", "c", "cpp", "h", "gitignore", "md", "css", "html", "xml",
    "java", "kt", "swift", "sh", "bat", "cmd", "yaml", "yml", "lock", "toml", "rb", "go", "rs",
    "php", "sql",
];

impl TextStyle {
    /// Pick the style from a file name's extension.
    pub fn detect(name: &str) -> Self {
        let ext = Path::new(name)
            .file_name()
            .and_then(|f| f.to_str())
            .and_then(|f| f.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match ext {
            Some(ext) if CODE_EXTENSIONS.contains(&ext.as_str()) => TextStyle::Code,
            _ => TextStyle::Prose,
        }
    }
}

/// One output line: the runs it was packed from and its measured width.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutLine {
    pub runs: Vec<String>,
    pub width: f32,
}

impl LayoutLine {
    /// An empty line, used for blank paragraphs.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The line's text with run boundaries removed.
    pub fn text(&self) -> String {
        self.runs.concat()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|r| r.is_empty())
    }
}

/// Canonical composition, so that precomposed and decomposed input measure
/// and resolve identically.
pub fn normalize(text: &str) -> String {
    text.nfc().collect()
}
