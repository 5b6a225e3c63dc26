//! Dump expansion: one source, many documents.
//!
//! A source may bundle several files, each introduced by a marker line:
//!
//! ```text
//! ### **src/main.rs** ###
//! fn main() {}
//! ### **README.md** ###
//! # Hello
//! ```
//!
//! Each marker starts a new item named by the marker path; text up to the
//! next marker is its content. Text before the first marker is kept as an
//! item under the source's own name unless it is blank. A source without
//! markers is a single item.
//!
//! The marker path is matched non-greedily per line and has no escaping: a
//! path containing `**` ends at the first `** ###` that closes the line.

use crate::layout::{normalize, TextStyle};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^###[ \t]+\*\*(.+?)\*\*[ \t]+###[ \t]*\r?$").unwrap());

/// One logical document ready for layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedItem {
    /// File name, used for the artifact name and style detection.
    pub name: String,
    /// Directory inside the task's destination (from a marker path), `/`-separated.
    pub rel_dir: String,
    /// NFC-normalised text.
    pub content: String,
    pub style: TextStyle,
}

impl ExpandedItem {
    fn new(path: &str, content: &str) -> Self {
        let (rel_dir, name) = split_marker_path(path);
        Self {
            style: TextStyle::detect(&name),
            name,
            rel_dir,
            content: normalize(content),
        }
    }
}

/// Split `content` into items. `fallback_name` names the whole source, or its
/// preamble when markers are present.
pub fn split_dump(content: &str, fallback_name: &str) -> Vec<ExpandedItem> {
    let markers: Vec<_> = RE_MARKER.captures_iter(content).collect();
    if markers.is_empty() {
        return vec![ExpandedItem::new(fallback_name, content)];
    }

    let mut items = Vec::with_capacity(markers.len() + 1);

    let first_start = markers[0].get(0).map_or(0, |m| m.start());
    let preamble = &content[..first_start];
    if !preamble.trim().is_empty() {
        items.push(ExpandedItem::new(fallback_name, preamble.trim_end_matches(['\r', '\n'])));
    }

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let body_start = skip_line_break(content, whole.end());
        let body_end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(content.len(), |m| m.start());
        let body = &content[body_start..body_end.max(body_start)];
        items.push(ExpandedItem::new(
            path.as_str().trim(),
            body.trim_end_matches(['\r', '\n']),
        ));
    }

    items
}

/// Number of items [`split_dump`] would produce, without building them.
pub fn count_items(content: &str) -> usize {
    let mut markers = RE_MARKER.find_iter(content).peekable();
    let first_start = match markers.peek() {
        None => return 1,
        Some(first) => first.start(),
    };
    let preamble = usize::from(!content[..first_start].trim().is_empty());
    preamble + markers.count()
}

fn skip_line_break(s: &str, at: usize) -> usize {
    let rest = &s[at..];
    if rest.starts_with("\r\n") {
        at + 2
    } else if rest.starts_with('\n') {
        at + 1
    } else {
        at
    }
}

/// `a/b/c.rs` → (`a/b`, `c.rs`), dropping empty, `.` and `..` segments and
/// treating `\` as a separator.
fn split_marker_path(path: &str) -> (String, String) {
    let normalised = path.replace('\\', "/");
    let mut segments: Vec<&str> = normalised
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();
    let name = segments.pop().unwrap_or("untitled").to_string();
    (segments.join("/"), name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "### **src/main.rs** ###\nfn main() {}\n\n### **README.md** ###\n# Title\n### **docs/guide.txt** ###\nRead me.\n";

    #[test]
    fn plain_source_is_one_item() {
        let items = split_dump("just text\n", "notes.txt");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "notes.txt");
        assert_eq!(items[0].content, "just text\n");
        assert_eq!(items[0].style, TextStyle::Prose);
        assert_eq!(count_items("just text\n"), 1);
    }

    #[test]
    fn three_markers_three_items() {
        let items = split_dump(DUMP, "dump.txt");
        assert_eq!(items.len(), 3);
        assert_eq!(count_items(DUMP), 3);

        assert_eq!(items[0].name, "main.rs");
        assert_eq!(items[0].rel_dir, "src");
        assert_eq!(items[0].content, "fn main() {}");
        assert_eq!(items[0].style, TextStyle::Code);

        assert_eq!(items[1].name, "README.md");
        assert_eq!(items[1].rel_dir, "");
        assert_eq!(items[1].content, "# Title");

        assert_eq!(items[2].rel_dir, "docs");
        assert_eq!(items[2].content, "Read me.");
        assert_eq!(items[2].style, TextStyle::Prose);
    }

    #[test]
    fn non_blank_preamble_is_kept() {
        let src = "header line\n### **a.txt** ###\nbody";
        let items = split_dump(src, "bundle.txt");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "bundle.txt");
        assert_eq!(items[0].content, "header line");
        assert_eq!(count_items(src), 2);

        let blank = "\n  \n### **a.txt** ###\nbody";
        assert_eq!(split_dump(blank, "b.txt").len(), 1);
        assert_eq!(count_items(blank), 1);
    }

    #[test]
    fn marker_must_fill_its_line() {
        let src = "text ### **a.txt** ### more\n";
        assert_eq!(split_dump(src, "x.txt").len(), 1);
    }

    #[test]
    fn crlf_markers() {
        let src = "### **a.txt** ###\r\none\r\n### **b.txt** ###\r\ntwo";
        let items = split_dump(src, "x.txt");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].content, "one");
        assert_eq!(items[1].content, "two");
    }

    #[test]
    fn path_with_stars_is_matched_non_greedily() {
        let items = split_dump("### **a**b.txt** ###\nx", "x.txt");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "a**b.txt");
    }

    #[test]
    fn unsafe_marker_paths_are_sanitised() {
        let items = split_dump("### **../../etc/passwd** ###\nx", "x.txt");
        assert_eq!(items[0].rel_dir, "etc");
        assert_eq!(items[0].name, "passwd");
    }

    #[test]
    fn content_is_nfc_normalised() {
        let items = split_dump("cafe\u{301}", "a.txt");
        assert_eq!(items[0].content, "caf\u{e9}");
    }

    #[test]
    fn empty_marker_body() {
        let items = split_dump("### **a.txt** ###\n### **b.txt** ###\nb", "x.txt");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].content, "");
    }
}
