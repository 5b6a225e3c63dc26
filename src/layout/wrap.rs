//! Greedy width-constrained line packing.
//!
//! Two rule sets:
//!
//! * **Prose** ([`wrap_prose`]): each paragraph is tokenized and tokens are
//!   packed while `measure(line + token) <= max_width`. A token that cannot
//!   fit even on a fresh line is broken into grapheme clusters.
//! * **Code** ([`wrap_code`]): source lines map 1:1 to output lines. A line
//!   wider than the box is hard-wrapped at grapheme boundaries, with
//!   continuation lines re-indented to the original indentation when that
//!   indentation takes at most half the width.
//!
//! Both paths expand tabs to four spaces and guarantee that every emitted
//! line measures at most `max_width`, except a single grapheme cluster that
//! is wider than the box on its own.

use super::segment::{graphemes, Tokenizer};
use super::LayoutLine;
use std::borrow::Cow;

const TAB: &str = "    ";

/// Width-measuring function: points for a piece of text.
pub type Measure<'a> = &'a dyn Fn(&str) -> f32;

/// Wrap prose text into lines no wider than `max_width`.
///
/// Paragraphs are separated by `\n` or `\r\n`; an empty paragraph becomes an
/// empty line so vertical spacing survives.
pub fn wrap_prose(
    text: &str,
    max_width: f32,
    measure: Measure<'_>,
    tokenizer: &dyn Tokenizer,
) -> Vec<LayoutLine> {
    let mut lines = Vec::new();

    for paragraph in paragraphs(text) {
        if paragraph.is_empty() {
            lines.push(LayoutLine::empty());
            continue;
        }

        let mut line = LineBuilder::default();
        for raw in tokenizer.tokenize(paragraph) {
            let token = expand_tabs(raw);

            if line.fits(&token, max_width, measure) {
                line.push(&token);
                continue;
            }

            if !line.is_empty() {
                lines.push(line.take(measure));
            }

            if measure(&token) <= max_width {
                line.push(&token);
                continue;
            }

            // Token wider than a whole line: pack it cluster by cluster.
            for g in graphemes(&token) {
                if !line.is_empty() && !line.fits(g, max_width, measure) {
                    lines.push(line.take(measure));
                }
                line.push(g);
            }
        }

        if !line.is_empty() {
            lines.push(line.take(measure));
        }
    }

    lines
}

/// Wrap code text, keeping one output line per source line where possible.
pub fn wrap_code(text: &str, max_width: f32, measure: Measure<'_>) -> Vec<LayoutLine> {
    let mut lines = Vec::new();

    for source_line in paragraphs(text) {
        let expanded = expand_tabs(source_line);
        let width = measure(&expanded);
        if width <= max_width {
            lines.push(LayoutLine {
                runs: if expanded.is_empty() {
                    Vec::new()
                } else {
                    vec![expanded.into_owned()]
                },
                width,
            });
            continue;
        }

        let indent = leading_whitespace(&expanded);
        let indent = if !indent.is_empty() && measure(indent) <= max_width / 2.0 {
            indent
        } else {
            ""
        };

        let mut line = LineBuilder::default();
        for g in graphemes(&expanded) {
            if !line.is_empty() && !line.fits(g, max_width, measure) {
                lines.push(line.take(measure));
                if !indent.is_empty() {
                    line.push(indent);
                    if !line.fits(g, max_width, measure) {
                        line.clear();
                    }
                }
            }
            line.push(g);
        }
        if !line.is_empty() {
            lines.push(line.take(measure));
        }
    }

    lines
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn paragraphs(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|p| p.strip_suffix('\r').unwrap_or(p))
}

fn expand_tabs(s: &str) -> Cow<'_, str> {
    if s.contains('\t') {
        Cow::Owned(s.replace('\t', TAB))
    } else {
        Cow::Borrowed(s)
    }
}

fn leading_whitespace(s: &str) -> &str {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[..end]
}

/// The line under construction. Width is always measured over the joined
/// text, never summed per run.
#[derive(Default)]
struct LineBuilder {
    text: String,
    runs: Vec<String>,
}

impl LineBuilder {
    fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    fn fits(&self, token: &str, max_width: f32, measure: Measure<'_>) -> bool {
        let mut candidate = String::with_capacity(self.text.len() + token.len());
        candidate.push_str(&self.text);
        candidate.push_str(token);
        measure(&candidate) <= max_width
    }

    fn push(&mut self, token: &str) {
        self.text.push_str(token);
        self.runs.push(token.to_string());
    }

    fn clear(&mut self) {
        self.text.clear();
        self.runs.clear();
    }

    fn take(&mut self, measure: Measure<'_>) -> LayoutLine {
        let width = measure(&self.text);
        self.text.clear();
        LayoutLine {
            runs: std::mem::take(&mut self.runs),
            width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::segment::{WhitespaceTokenizer, WordBoundaryTokenizer};
    use unicode_segmentation::UnicodeSegmentation;

    /// Every grapheme is one unit wide.
    fn unit(s: &str) -> f32 {
        s.graphemes(true).count() as f32
    }

    fn texts(lines: &[LayoutLine]) -> Vec<String> {
        lines.iter().map(|l| l.text()).collect()
    }

    #[test]
    fn packs_words_greedily() {
        let lines = wrap_prose("aaa bbb ccc ddd", 8.0, &unit, &WordBoundaryTokenizer);
        assert_eq!(texts(&lines), vec!["aaa bbb ", "ccc ddd"]);
        assert_eq!(lines[0].width, 8.0);
    }

    #[test]
    fn blank_paragraphs_become_empty_lines() {
        let lines = wrap_prose("one\n\ntwo\r\nthree", 20.0, &unit, &WordBoundaryTokenizer);
        assert_eq!(texts(&lines), vec!["one", "", "two", "three"]);
        assert!(lines[1].is_empty());
    }

    #[test]
    fn long_token_is_split_into_graphemes() {
        let lines = wrap_prose("abcdefghij", 4.0, &unit, &WhitespaceTokenizer);
        assert_eq!(texts(&lines), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn long_token_remainder_continues_the_line() {
        let lines = wrap_prose("abcdefg hi", 5.0, &unit, &WhitespaceTokenizer);
        assert_eq!(texts(&lines), vec!["abcde", "fg hi"]);
    }

    #[test]
    fn oversize_cluster_is_emitted_alone() {
        let wide = |s: &str| -> f32 {
            s.chars().map(|c| if c == 'W' { 10.0 } else { 1.0 }).sum()
        };
        let lines = wrap_prose("abWcd", 3.0, &wide, &WhitespaceTokenizer);
        assert_eq!(texts(&lines), vec!["ab", "W", "cd"]);
        for l in &lines {
            assert!(l.width <= 3.0 || l.text() == "W");
        }
    }

    #[test]
    fn combining_marks_are_never_split() {
        let text = "e\u{0301}e\u{0301}e\u{0301}e\u{0301}";
        let lines = wrap_prose(text, 2.0, &unit, &WhitespaceTokenizer);
        for l in &lines {
            assert!(!l.text().starts_with('\u{0301}'));
        }
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn tabs_expand_to_four_spaces() {
        let lines = wrap_prose("\tx", 20.0, &unit, &WordBoundaryTokenizer);
        assert_eq!(texts(&lines), vec!["    x"]);
    }

    #[test]
    fn width_bound_holds_for_assorted_inputs() {
        let inputs = [
            "The quick brown fox jumps over the lazy dog",
            "supercalifragilisticexpialidocious and friends",
            "a b c d e f g h i j k l m n o p",
            "日本語のテキストを折り返す",
            "  indented   with   runs  ",
        ];
        for text in inputs {
            for w in 1..30 {
                let w = w as f32;
                for line in wrap_prose(text, w, &unit, &WordBoundaryTokenizer) {
                    assert!(
                        line.width <= w || unit(&line.text()) == 1.0,
                        "{text:?} at {w}: {:?}",
                        line.text()
                    );
                }
            }
        }
    }

    #[test]
    fn rewrapping_conformant_lines_is_idempotent() {
        let text = "The quick brown fox jumps over the lazy dog again and again";
        for w in [6.0, 10.0, 17.0] {
            let first = wrap_prose(text, w, &unit, &WordBoundaryTokenizer);
            let joined = texts(&first).join("\n");
            let second = wrap_prose(&joined, w, &unit, &WordBoundaryTokenizer);
            assert_eq!(texts(&first), texts(&second));
        }
    }

    #[test]
    fn wrapping_preserves_content() {
        let text = "alpha beta\tgamma delta epsilon";
        let lines = wrap_prose(text, 7.0, &unit, &WordBoundaryTokenizer);
        assert_eq!(texts(&lines).concat(), text.replace('\t', TAB));
    }

    #[test]
    fn code_lines_map_one_to_one() {
        let src = "fn main() {\n\tprintln!();\n}\n";
        let lines = wrap_code(src, 40.0, &unit);
        assert_eq!(
            texts(&lines),
            vec!["fn main() {", "    println!();", "}", ""]
        );
    }

    #[test]
    fn long_code_line_keeps_indent() {
        let src = "    abcdefghijkl";
        let lines = wrap_code(src, 10.0, &unit);
        assert_eq!(texts(&lines), vec!["    abcdef", "    ghijkl"]);
        for l in &lines {
            assert!(l.width <= 10.0);
        }
    }

    #[test]
    fn deep_indent_is_not_repeated() {
        let src = "        abcdefghij";
        let lines = wrap_code(src, 10.0, &unit);
        assert_eq!(texts(&lines), vec!["        ab", "cdefghij"]);
    }
}
