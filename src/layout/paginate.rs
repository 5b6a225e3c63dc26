//! Partition wrapped lines into fixed-capacity pages.

use super::LayoutLine;
use serde::{Deserialize, Serialize};

/// One page of lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub lines: Vec<LayoutLine>,
}

/// How many lines fit in `usable_height`; never less than one.
pub fn lines_per_page(usable_height: f32, line_height: f32) -> usize {
    if !(line_height > 0.0) || !(usable_height > 0.0) {
        return 1;
    }
    ((usable_height / line_height).floor() as usize).max(1)
}

/// Chunk `lines` into consecutive pages of `capacity` lines.
///
/// Every page but the last is full, order is preserved, and an empty input
/// still produces one blank page.
pub fn paginate(lines: Vec<LayoutLine>, capacity: usize) -> Vec<Page> {
    let capacity = capacity.max(1);
    if lines.is_empty() {
        return vec![Page::default()];
    }
    let mut pages = Vec::with_capacity(lines.len().div_ceil(capacity));
    let mut iter = lines.into_iter().peekable();
    while iter.peek().is_some() {
        pages.push(Page {
            lines: iter.by_ref().take(capacity).collect(),
        });
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(n: usize) -> Vec<LayoutLine> {
        (0..n)
            .map(|i| LayoutLine {
                runs: vec![format!("line {i}")],
                width: 1.0,
            })
            .collect()
    }

    #[test]
    fn capacity_from_height() {
        assert_eq!(lines_per_page(100.0, 12.5), 8);
        assert_eq!(lines_per_page(100.0, 30.0), 3);
        assert_eq!(lines_per_page(5.0, 30.0), 1);
        assert_eq!(lines_per_page(100.0, 0.0), 1);
    }

    #[test]
    fn pages_are_full_except_last() {
        let pages = paginate(lines(23), 10);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].lines.len(), 10);
        assert_eq!(pages[1].lines.len(), 10);
        assert_eq!(pages[2].lines.len(), 3);
    }

    #[test]
    fn order_is_preserved() {
        let flat: Vec<String> = paginate(lines(7), 3)
            .into_iter()
            .flat_map(|p| p.lines)
            .map(|l| l.text())
            .collect();
        let expected: Vec<String> = (0..7).map(|i| format!("line {i}")).collect();
        assert_eq!(flat, expected);
    }

    #[test]
    fn empty_input_gives_one_blank_page() {
        let pages = paginate(Vec::new(), 10);
        assert_eq!(pages.len(), 1);
        assert!(pages[0].lines.is_empty());
    }

    #[test]
    fn page_count_is_ceiling() {
        for n in 1..40 {
            for cap in 1..12 {
                assert_eq!(paginate(lines(n), cap).len(), n.div_ceil(cap));
            }
        }
    }
}
