//! Session-scoped log of characters no tier could draw.

use super::{codepoint_key, parse_codepoint_key};
use std::collections::HashSet;

/// Distinct unresolved characters in first-seen order.
///
/// Cleared at the start of every batch; a resumed batch restores the
/// snapshot saved in its journal.
#[derive(Debug, Clone, Default)]
pub struct MissingCharacterLog {
    order: Vec<char>,
    seen: HashSet<char>,
}

impl MissingCharacterLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `ch`; returns `true` the first time it is seen this session.
    pub fn record(&mut self, ch: char) -> bool {
        if self.seen.insert(ch) {
            self.order.push(ch);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, ch: char) -> bool {
        self.seen.contains(&ch)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }

    /// Characters in first-seen order.
    pub fn chars(&self) -> &[char] {
        &self.order
    }

    /// Registry keys, for journaling.
    pub fn snapshot(&self) -> Vec<String> {
        self.order.iter().map(|&c| codepoint_key(c)).collect()
    }

    /// Rebuild from a journaled snapshot; malformed keys are skipped.
    pub fn restore<S: AsRef<str>>(keys: &[S]) -> Self {
        let mut log = Self::new();
        for ch in keys.iter().filter_map(|k| parse_codepoint_key(k.as_ref())) {
            log.record(ch);
        }
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_each_char_once() {
        let mut log = MissingCharacterLog::new();
        for _ in 0..500 {
            log.record('🦀');
        }
        assert!(log.record('中'));
        assert!(!log.record('🦀'));
        assert_eq!(log.chars(), &['🦀', '中']);
    }

    #[test]
    fn snapshot_restore_keeps_order() {
        let mut log = MissingCharacterLog::new();
        log.record('中');
        log.record('🦀');
        let snap = log.snapshot();
        assert_eq!(snap, vec!["0x4E2D", "0x1F980"]);
        let back = MissingCharacterLog::restore(&snap);
        assert_eq!(back.chars(), log.chars());
    }

    #[test]
    fn clear_resets_dedup() {
        let mut log = MissingCharacterLog::new();
        log.record('x');
        log.clear();
        assert!(log.is_empty());
        assert!(log.record('x'));
    }
}
