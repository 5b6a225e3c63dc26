//! Word segmentation.
//!
//! The wrapper packs whole tokens onto lines, so the tokenizer decides where
//! a line may break. Whitespace is kept as its own token so that packing the
//! tokens back together reproduces the paragraph exactly.

use unicode_segmentation::UnicodeSegmentation;

/// Splits a paragraph into wrap tokens.
///
/// Implementations must be lossless: concatenating the returned tokens in
/// order yields the input.
pub trait Tokenizer: Send + Sync {
    fn tokenize<'a>(&self, paragraph: &'a str) -> Vec<&'a str>;
}

/// Unicode word boundaries (UAX #29).
///
/// Handles scripts without spaces between words better than whitespace
/// splitting, and gives the greedy packer a break opportunity at every
/// punctuation boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordBoundaryTokenizer;

impl Tokenizer for WordBoundaryTokenizer {
    fn tokenize<'a>(&self, paragraph: &'a str) -> Vec<&'a str> {
        paragraph.split_word_bounds().collect()
    }
}

/// Alternating runs of whitespace and non-whitespace.
///
/// Used when word-boundary segmentation is not wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize<'a>(&self, paragraph: &'a str) -> Vec<&'a str> {
        let mut tokens = Vec::new();
        let mut start = 0;
        let mut in_space: Option<bool> = None;
        for (i, c) in paragraph.char_indices() {
            let space = c.is_whitespace();
            match in_space {
                Some(prev) if prev != space => {
                    tokens.push(&paragraph[start..i]);
                    start = i;
                }
                _ => {}
            }
            in_space = Some(space);
        }
        if start < paragraph.len() {
            tokens.push(&paragraph[start..]);
        }
        tokens
    }
}

/// Extended grapheme clusters of `text`; the unit an over-long token is
/// broken into.
pub fn graphemes(text: &str) -> impl Iterator<Item = &str> {
    text.graphemes(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lossless(t: &dyn Tokenizer, s: &str) {
        assert_eq!(t.tokenize(s).concat(), s);
    }

    #[test]
    fn word_bounds_are_lossless() {
        let t = WordBoundaryTokenizer;
        lossless(&t, "The quick brown fox, jumped.");
        lossless(&t, "  leading and trailing  ");
        lossless(&t, "日本語のテキスト");
        assert!(t.tokenize("").is_empty());
    }

    #[test]
    fn word_bounds_split_on_spaces() {
        let tokens = WordBoundaryTokenizer.tokenize("hello world");
        assert_eq!(tokens, vec!["hello", " ", "world"]);
    }

    #[test]
    fn whitespace_tokenizer_keeps_runs() {
        let t = WhitespaceTokenizer;
        assert_eq!(t.tokenize("a  bc d"), vec!["a", "  ", "bc", " ", "d"]);
        assert_eq!(t.tokenize("  x"), vec!["  ", "x"]);
        lossless(&t, "mixed\tspacing  here ");
        assert!(t.tokenize("").is_empty());
    }

    #[test]
    fn graphemes_keep_combining_marks() {
        let parts: Vec<_> = graphemes("e\u{0301}a").collect();
        assert_eq!(parts, vec!["e\u{0301}", "a"]);
    }
}
