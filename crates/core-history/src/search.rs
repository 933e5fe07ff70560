//! Restartable history search cursors.
//!
//! A search walks visible items newest-first, skipping texts it has
//! already yielded. Matches found so far are remembered, so stepping
//! forward (newer) replays them without rescanning and stepping past the
//! newest match leaves the cursor "at end" — the state in which the
//! editor shows the user's own pending text.

use std::collections::HashSet;
use std::sync::Arc;

use crate::{History, HistoryItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    /// Term must begin the item.
    Prefix,
    /// Term may appear anywhere.
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    Backward,
    Forward,
}

pub struct HistorySearch {
    history: Arc<History>,
    term: String,
    search_type: SearchType,
    case_sensitive: bool,
    /// Indices (into the store's newest-first order) of matches found so
    /// far, in the order they were found.
    visited: Vec<usize>,
    seen_texts: HashSet<String>,
    /// Index into `visited`; `None` means "at end, show pending text".
    pos: Option<usize>,
}

impl HistorySearch {
    pub fn new(history: Arc<History>, term: impl Into<String>, search_type: SearchType) -> Self {
        Self {
            history,
            term: term.into(),
            search_type,
            case_sensitive: true,
            visited: Vec::new(),
            seen_texts: HashSet::new(),
            pos: None,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    /// `position == end`: no current match, the editor's pending text is
    /// what the user should see.
    pub fn at_end(&self) -> bool {
        self.pos.is_none()
    }

    pub fn current(&self) -> Option<HistoryItem> {
        let idx = self.visited.get(self.pos?)?;
        self.history.item_at(*idx)
    }

    /// Step to an older match. Returns whether one was found; on `false`
    /// the cursor stays where it was.
    pub fn go_backwards(&mut self) -> bool {
        match self.pos {
            None if !self.visited.is_empty() => {
                self.pos = Some(0);
                true
            }
            Some(p) if p + 1 < self.visited.len() => {
                self.pos = Some(p + 1);
                true
            }
            _ => self.scan_older(),
        }
    }

    /// Step to a newer match, or past the newest to the end position.
    /// Returns `false` only when already at the end.
    pub fn go_forwards(&mut self) -> bool {
        match self.pos {
            Some(0) => {
                self.pos = None;
                true
            }
            Some(p) => {
                self.pos = Some(p - 1);
                true
            }
            None => false,
        }
    }

    /// Jump to the oldest match.
    pub fn go_to_beginning(&mut self) {
        while self.scan_older() {}
        if !self.visited.is_empty() {
            self.pos = Some(self.visited.len() - 1);
        }
    }

    /// Back to the end position (pending text).
    pub fn go_to_end(&mut self) {
        self.pos = None;
    }

    fn scan_older(&mut self) -> bool {
        let mut idx = self.visited.last().map_or(0, |&last| last + 1);
        loop {
            let Some(item) = self.history.item_at(idx) else {
                return false;
            };
            if self.matches(&item.text) && self.seen_texts.insert(item.text.clone()) {
                self.visited.push(idx);
                self.pos = Some(self.visited.len() - 1);
                return true;
            }
            idx += 1;
        }
    }

    fn matches(&self, text: &str) -> bool {
        if self.case_sensitive {
            match self.search_type {
                SearchType::Prefix => text.starts_with(&self.term),
                SearchType::Contains => text.contains(&self.term),
            }
        } else {
            let text = text.to_lowercase();
            let term = self.term.to_lowercase();
            match self.search_type {
                SearchType::Prefix => text.starts_with(&term),
                SearchType::Contains => text.contains(&term),
            }
        }
    }
}
