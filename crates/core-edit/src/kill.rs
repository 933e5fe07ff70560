//! The kill ring.
//!
//! An LRU-ordered deque of killed strings. Inserting a string that is
//! already somewhere in the ring moves it to the front instead of
//! duplicating it. `yank` looks at the front without disturbing anything;
//! `rotate` cycles the front to the back (yank-pop).
//!
//! Consecutive kills of the same kind grow the front entry instead of
//! starting a new one; the editor decides "same kind" and calls
//! [`KillRing::extend_front`] accordingly.

use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct KillRing {
    entries: VecDeque<String>,
}

impl KillRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Push to the front; empty strings are ignored, duplicates move up.
    pub fn add(&mut self, s: impl Into<String>) {
        let s = s.into();
        if s.is_empty() {
            return;
        }
        self.remove(&s);
        self.entries.push_front(s);
    }

    /// Remove the first occurrence of `s`.
    pub fn remove(&mut self, s: &str) {
        if let Some(idx) = self.entries.iter().position(|e| e == s) {
            self.entries.remove(idx);
        }
    }

    /// Remove `old`, then add `new`.
    pub fn replace(&mut self, old: &str, new: impl Into<String>) {
        self.remove(old);
        self.add(new);
    }

    /// Grow the front entry: append for forward kills, prepend for
    /// backward ones. Creates the entry when the ring is empty.
    pub fn extend_front(&mut self, s: &str, prepend: bool) {
        if s.is_empty() {
            return;
        }
        match self.entries.front_mut() {
            Some(front) => {
                if prepend {
                    front.insert_str(0, s);
                } else {
                    front.push_str(s);
                }
            }
            None => self.add(s),
        }
    }

    /// Front entry, no mutation, no allocation.
    pub fn yank(&self) -> &str {
        self.entries.front().map_or("", String::as_str)
    }

    /// Move the front to the back; return the new front.
    pub fn rotate(&mut self) -> &str {
        if let Some(front) = self.entries.pop_front() {
            self.entries.push_back(front);
        }
        self.yank()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn add_and_yank() {
        let mut ring = KillRing::new();
        assert_eq!(ring.yank(), "");
        ring.add("first");
        ring.add("second");
        assert_eq!(ring.yank(), "second");
        // yank does not mutate
        assert_eq!(ring.yank(), "second");
    }

    #[test]
    fn empty_strings_are_ignored() {
        let mut ring = KillRing::new();
        ring.add("");
        assert!(ring.is_empty());
    }

    #[test]
    fn duplicates_are_promoted_not_duplicated() {
        let mut ring = KillRing::new();
        ring.add("a");
        ring.add("b");
        ring.add("a");
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.yank(), "a");
    }

    #[test]
    fn rotate_cycles_through_everything() {
        let mut ring = KillRing::new();
        ring.add("one");
        ring.add("two");
        ring.add("three");
        assert_eq!(ring.yank(), "three");
        assert_eq!(ring.rotate(), "two");
        assert_eq!(ring.rotate(), "one");
        assert_eq!(ring.rotate(), "three");
    }

    #[test]
    fn replace_swaps_text() {
        let mut ring = KillRing::new();
        ring.add("old");
        ring.replace("old", "new");
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.yank(), "new");
    }

    #[test]
    fn extend_front_appends_and_prepends() {
        let mut ring = KillRing::new();
        ring.add("middle");
        ring.extend_front(" end", false);
        assert_eq!(ring.yank(), "middle end");
        ring.extend_front("start ", true);
        assert_eq!(ring.yank(), "start middle end");
    }

    #[test]
    fn extend_front_on_empty_ring_creates_entry() {
        let mut ring = KillRing::new();
        ring.extend_front("solo", true);
        assert_eq!(ring.yank(), "solo");
    }
}
