//! Editor state machine.
//!
//! Invariants, maintained at every observable moment:
//!
//! * `0 <= cursor <= buffer.len()`
//! * `colors.len() == buffer.len() == indents.len()`
//! * every buffer mutation bumps the generation counter exactly once
//! * the autosuggestion is empty or a case-insensitive superstring of the
//!   buffer
//!
//! Async results (highlight colors, suggestions) are merged through
//! [`EditorState::apply_colors`] / [`EditorState::offer_autosuggestion`],
//! whose first act is the generation/snapshot comparison; a stale result
//! is dropped, never partially applied.

use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, trace};

use core_events::{Event, InsertStyle, ReadlineCmd};
use core_history::{History, HistoryItem, HistorySearch, SearchType};
use core_term::color::PackedColor;
use core_text::{
    Direction, WordStyle, line_bounds, offset_for_visual_move, word_boundary,
};

use crate::{EditContext, SyntaxStatus};
use crate::kill::KillRing;

const DEFAULT_COLOR: u32 = PackedColor::NORMAL.0;

/// What the reader loop must do after a command was applied.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub repaint: bool,
    pub force_repaint: bool,
    /// Execute accepted this text.
    pub commit: Option<String>,
    /// Exit was requested (EOF on empty line, `exit` command).
    pub exit: bool,
}

impl Outcome {
    fn repaint() -> Self {
        Outcome {
            repaint: true,
            ..Default::default()
        }
    }
}

struct LineSearchState {
    search: HistorySearch,
    pending: String,
    pending_cursor: usize,
}

struct TokenSearchState {
    /// The token under the cursor when the search began.
    term: String,
    pending: String,
    pending_cursor: usize,
    search: HistorySearch,
    /// The matching history command currently being mined for tokens.
    current_command: String,
    /// Char offset of the last yielded token in `current_command`;
    /// -1 when the next backward step must fetch a new command.
    token_pos: i64,
    /// Tokens yielded so far, no duplicates; index 0 is the original.
    matches: Vec<String>,
    pos: usize,
}

enum SearchState {
    Inactive,
    Line(LineSearchState),
    Token(TokenSearchState),
}

/// The line editor.
pub struct EditorState {
    buffer: Vec<char>,
    cursor: usize,
    colors: Vec<u32>,
    indents: Vec<i32>,
    autosuggestion: String,
    suppress_autosuggestion: bool,
    search: SearchState,
    kill: KillRing,
    kill_prev_cmd: Option<ReadlineCmd>,
    /// Length of the text inserted by the last yank, for yank-pop.
    yank_len: usize,
    generation: u64,
    history: Arc<History>,
}

impl EditorState {
    pub fn new(history: Arc<History>) -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
            colors: Vec::new(),
            indents: Vec::new(),
            autosuggestion: String::new(),
            suppress_autosuggestion: false,
            search: SearchState::Inactive,
            kill: KillRing::new(),
            kill_prev_cmd: None,
            yank_len: 0,
            generation: 0,
            history,
        }
    }

    pub fn text(&self) -> String {
        self.buffer.iter().collect()
    }

    pub fn buffer(&self) -> &[char] {
        &self.buffer
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn colors(&self) -> &[u32] {
        &self.colors
    }

    pub fn indents(&self) -> &[i32] {
        &self.indents
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn autosuggestion(&self) -> &str {
        &self.autosuggestion
    }

    pub fn autosuggestion_suppressed(&self) -> bool {
        self.suppress_autosuggestion
    }

    pub fn is_searching(&self) -> bool {
        !matches!(self.search, SearchState::Inactive)
    }

    pub fn history(&self) -> &Arc<History> {
        &self.history
    }

    pub fn kill_ring(&self) -> &KillRing {
        &self.kill
    }

    /// Clear the line for a fresh prompt.
    pub fn reset_line(&mut self, ctx: &mut dyn EditContext) {
        self.search = SearchState::Inactive;
        self.autosuggestion.clear();
        self.suppress_autosuggestion = false;
        self.kill_prev_cmd = None;
        self.set_whole_buffer(String::new(), 0, ctx);
    }

    // ---------------------------------------------------------------------
    // Async merge steps
    // ---------------------------------------------------------------------

    /// Merge a highlight result. Applied only when both the generation and
    /// the snapshot still describe the live buffer.
    pub fn apply_colors(&mut self, generation: u64, snapshot: &str, colors: Vec<u32>) -> bool {
        if generation != self.generation || snapshot != self.text() {
            trace!(target: "edit.merge", "stale highlight dropped");
            return false;
        }
        if colors.len() != self.buffer.len() {
            return false;
        }
        self.colors = colors;
        true
    }

    /// Merge an autosuggestion result.
    pub fn offer_autosuggestion(&mut self, snapshot: &str, suggestion: &str) -> bool {
        if self.suppress_autosuggestion
            || self.is_searching()
            || snapshot != self.text()
        {
            return false;
        }
        let text = self.text();
        if suggestion.len() < text.len()
            || !suggestion.to_lowercase().starts_with(&text.to_lowercase())
        {
            return false;
        }
        self.autosuggestion = suggestion.to_string();
        true
    }

    // ---------------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------------

    pub fn apply(&mut self, event: &Event, ctx: &mut dyn EditContext) -> Outcome {
        // Any non-search-preserving event ends an active search: escape
        // restores the snapshotted pending text, anything else keeps the
        // match in the buffer and is then handled normally.
        if self.is_searching() && !Self::preserves_search(event) {
            let escape = matches!(
                event,
                Event::Char { cp: '\x1b', .. }
                    | Event::Readline { cmd: ReadlineCmd::Cancel, .. }
            );
            self.exit_search(escape, ctx);
            if escape {
                return Outcome::repaint();
            }
        }

        let outcome = match event {
            Event::Char { cp, style } => {
                let insertable = (*cp > '\x1f' && *cp != '\x7f') || *cp == '\n';
                if !insertable || (*style == InsertStyle::NotFirst && self.cursor == 0) {
                    Outcome::default()
                } else {
                    self.insert_at_cursor(&cp.to_string(), ctx);
                    Outcome::repaint()
                }
            }
            Event::Readline { cmd, seq, arg } => self.apply_readline(*cmd, seq, *arg, ctx),
            Event::Eof => Outcome {
                exit: true,
                ..Default::default()
            },
            Event::CheckExit => Outcome::default(),
        };

        // Kill-append and yank-pop adjacency both key off the previous
        // command; character insertion breaks the chain.
        self.kill_prev_cmd = match event {
            Event::Readline { cmd, .. } => Some(*cmd),
            _ => None,
        };

        outcome
    }

    fn preserves_search(event: &Event) -> bool {
        matches!(
            event,
            Event::Readline {
                cmd: ReadlineCmd::HistorySearchBackward
                    | ReadlineCmd::HistorySearchForward
                    | ReadlineCmd::HistoryPrefixSearchBackward
                    | ReadlineCmd::HistoryPrefixSearchForward
                    | ReadlineCmd::HistoryTokenSearchBackward
                    | ReadlineCmd::HistoryTokenSearchForward
                    | ReadlineCmd::BeginningOfHistory
                    | ReadlineCmd::EndOfHistory
                    | ReadlineCmd::Repaint
                    | ReadlineCmd::ForceRepaint
                    | ReadlineCmd::RepaintMode,
                ..
            }
        )
    }

    #[allow(clippy::too_many_lines)]
    fn apply_readline(
        &mut self,
        cmd: ReadlineCmd,
        seq: &[char],
        arg: Option<char>,
        ctx: &mut dyn EditContext,
    ) -> Outcome {
        use ReadlineCmd::*;
        core_events::READLINE_DISPATCHED.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        trace!(target: "edit.dispatch", cmd = %cmd, "apply");

        match cmd {
            BeginningOfLine => {
                let (start, _) = line_bounds(&self.buffer, self.cursor);
                self.cursor = start;
                Outcome::repaint()
            }
            EndOfLine => {
                let (_, end) = line_bounds(&self.buffer, self.cursor);
                self.cursor = end;
                Outcome::repaint()
            }
            BeginningOfBuffer => {
                self.cursor = 0;
                Outcome::repaint()
            }
            EndOfBuffer => {
                self.cursor = self.buffer.len();
                Outcome::repaint()
            }
            ForwardChar => {
                if self.cursor < self.buffer.len() {
                    self.cursor += 1;
                } else {
                    self.accept_autosuggestion_full(ctx);
                }
                Outcome::repaint()
            }
            ForwardSingleChar => {
                if self.cursor < self.buffer.len() {
                    self.cursor += 1;
                } else {
                    self.accept_autosuggestion_chars(1, ctx);
                }
                Outcome::repaint()
            }
            BackwardChar => {
                self.cursor = self.cursor.saturating_sub(1);
                Outcome::repaint()
            }
            ForwardWord => self.move_word(Direction::Forward, WordStyle::Punctuation),
            BackwardWord => self.move_word(Direction::Backward, WordStyle::Punctuation),
            ForwardBigword => self.move_word(Direction::Forward, WordStyle::Whitespace),
            BackwardBigword => self.move_word(Direction::Backward, WordStyle::Whitespace),
            DeleteChar => {
                if self.cursor < self.buffer.len() {
                    let cursor = self.cursor;
                    self.splice(cursor..cursor + 1, &[], ctx);
                }
                Outcome::repaint()
            }
            BackwardDeleteChar => {
                if self.cursor > 0 {
                    let cursor = self.cursor;
                    self.splice(cursor - 1..cursor, &[], ctx);
                    self.suppress_autosuggestion = true;
                    self.autosuggestion.clear();
                }
                Outcome::repaint()
            }
            DeleteOrExit => {
                if self.buffer.is_empty() {
                    Outcome {
                        exit: true,
                        ..Default::default()
                    }
                } else {
                    if self.cursor < self.buffer.len() {
                        let cursor = self.cursor;
                        self.splice(cursor..cursor + 1, &[], ctx);
                    }
                    Outcome::repaint()
                }
            }
            Exit => Outcome {
                exit: true,
                ..Default::default()
            },
            KillWord => self.kill_word(cmd, WordStyle::Punctuation, Direction::Forward, ctx),
            KillBigword => self.kill_word(cmd, WordStyle::Whitespace, Direction::Forward, ctx),
            BackwardKillWord => {
                self.kill_word(cmd, WordStyle::Punctuation, Direction::Backward, ctx)
            }
            BackwardKillBigword => {
                self.kill_word(cmd, WordStyle::Whitespace, Direction::Backward, ctx)
            }
            BackwardKillPathComponent => {
                self.kill_word(cmd, WordStyle::PathComponents, Direction::Backward, ctx)
            }
            KillLine => {
                let (_, end) = line_bounds(&self.buffer, self.cursor);
                let kill_end = if end == self.cursor && end < self.buffer.len() {
                    end + 1 // at end of line: take the newline itself
                } else {
                    end
                };
                self.kill_range(cmd, self.cursor..kill_end, false, ctx)
            }
            BackwardKillLine => {
                let (start, _) = line_bounds(&self.buffer, self.cursor);
                let kill_start = if start == self.cursor && start > 0 {
                    start - 1
                } else {
                    start
                };
                self.kill_range(cmd, kill_start..self.cursor, true, ctx)
            }
            KillWholeLine => {
                let (start, end) = line_bounds(&self.buffer, self.cursor);
                let end = if end < self.buffer.len() { end + 1 } else { end };
                self.kill_range(cmd, start..end, false, ctx)
            }
            KillInnerLine => {
                let (start, end) = line_bounds(&self.buffer, self.cursor);
                self.kill_range(cmd, start..end, false, ctx)
            }
            Yank => {
                let text = self.kill.yank().to_string();
                self.yank_len = text.chars().count();
                if !text.is_empty() {
                    self.insert_at_cursor(&text, ctx);
                }
                Outcome::repaint()
            }
            YankPop => {
                if matches!(self.kill_prev_cmd, Some(Yank) | Some(YankPop)) && self.yank_len > 0 {
                    let cursor = self.cursor;
                    let start = cursor - self.yank_len.min(cursor);
                    let replacement: Vec<char> = self.kill.rotate().chars().collect();
                    self.yank_len = replacement.len();
                    self.splice(start..cursor, &replacement, ctx);
                }
                Outcome::repaint()
            }
            TransposeChars => {
                self.transpose_chars(ctx);
                Outcome::repaint()
            }
            TransposeWords => {
                self.transpose_words(ctx);
                Outcome::repaint()
            }
            UpcaseWord => self.case_word(ctx, |c, _| c.to_uppercase().collect()),
            DowncaseWord => self.case_word(ctx, |c, _| c.to_lowercase().collect()),
            CapitalizeWord => self.case_word(ctx, |c, first| {
                if first {
                    c.to_uppercase().collect()
                } else {
                    c.to_lowercase().collect()
                }
            }),
            Complete | CompleteAndSearch => self.complete(ctx),
            HistorySearchBackward => self.line_search(SearchType::Contains, true, ctx),
            HistorySearchForward => self.line_search(SearchType::Contains, false, ctx),
            HistoryPrefixSearchBackward => self.line_search(SearchType::Prefix, true, ctx),
            HistoryPrefixSearchForward => self.line_search(SearchType::Prefix, false, ctx),
            BeginningOfHistory => {
                if !matches!(self.search, SearchState::Line(_)) {
                    self.enter_line_search(SearchType::Prefix);
                }
                let oldest = match &mut self.search {
                    SearchState::Line(state) => {
                        state.search.go_to_beginning();
                        state.search.current().map(|item| item.text)
                    }
                    _ => None,
                };
                if let Some(text) = oldest {
                    self.show_search_result(text, ctx);
                }
                Outcome::repaint()
            }
            EndOfHistory => {
                let pending = match &mut self.search {
                    SearchState::Line(state) => {
                        state.search.go_to_end();
                        Some((state.pending.clone(), state.pending_cursor))
                    }
                    _ => None,
                };
                if let Some((pending, cursor)) = pending {
                    self.set_whole_buffer(pending, cursor, ctx);
                    self.search = SearchState::Inactive;
                }
                Outcome::repaint()
            }
            HistoryTokenSearchBackward => self.token_search(true, ctx),
            HistoryTokenSearchForward => self.token_search(false, ctx),
            SelfInsert => {
                let text: String = seq.iter().collect();
                self.insert_at_cursor(&text, ctx);
                Outcome::repaint()
            }
            SelfInsertNotFirst => {
                if self.cursor > 0 {
                    let text: String = seq.iter().collect();
                    self.insert_at_cursor(&text, ctx);
                }
                Outcome::repaint()
            }
            Execute => self.execute(ctx),
            UpLine | DownLine => {
                let up = cmd == UpLine;
                if let Some(target) =
                    offset_for_visual_move(&self.buffer, &self.indents, self.cursor, up)
                {
                    self.cursor = target;
                }
                Outcome::repaint()
            }
            Repaint | RepaintMode => Outcome::repaint(),
            ForceRepaint => Outcome {
                repaint: true,
                force_repaint: true,
                ..Default::default()
            },
            SuppressAutosuggestion => {
                self.suppress_autosuggestion = true;
                self.autosuggestion.clear();
                Outcome::repaint()
            }
            AcceptAutosuggestion => {
                self.accept_autosuggestion_full(ctx);
                Outcome::repaint()
            }
            InsertLineUnder => {
                let (_, end) = line_bounds(&self.buffer, self.cursor);
                self.splice(end..end, &['\n'], ctx);
                self.cursor = end + 1;
                Outcome::repaint()
            }
            InsertLineOver => {
                let (start, _) = line_bounds(&self.buffer, self.cursor);
                self.splice(start..start, &['\n'], ctx);
                self.cursor = start;
                Outcome::repaint()
            }
            ForwardJump | ForwardJumpTill => {
                if let Some(target) = arg {
                    let from = (self.cursor + 1).min(self.buffer.len());
                    if let Some(found) =
                        self.buffer[from..].iter().position(|&c| c == target)
                    {
                        self.cursor = from + found;
                        if cmd == ForwardJumpTill {
                            self.cursor = self.cursor.saturating_sub(1);
                        }
                    }
                }
                Outcome::repaint()
            }
            BackwardJump | BackwardJumpTill => {
                if let Some(target) = arg {
                    if let Some(found) = self.buffer[..self.cursor]
                        .iter()
                        .rposition(|&c| c == target)
                    {
                        self.cursor = found;
                        if cmd == BackwardJumpTill {
                            self.cursor = (self.cursor + 1).min(self.buffer.len());
                        }
                    }
                }
                Outcome::repaint()
            }
            Cancel => {
                self.autosuggestion.clear();
                Outcome::repaint()
            }
        }
    }

    // ---------------------------------------------------------------------
    // Mutation plumbing
    // ---------------------------------------------------------------------

    /// Replace `range` with `insert`, keeping colors and indents aligned
    /// and bumping the generation exactly once.
    fn splice(&mut self, range: Range<usize>, insert: &[char], ctx: &mut dyn EditContext) {
        debug_assert!(range.start <= range.end && range.end <= self.buffer.len());

        // New characters inherit the color to their left until the next
        // highlight pass corrects them.
        let inherited = if range.start > 0 {
            self.colors.get(range.start - 1).copied().unwrap_or(DEFAULT_COLOR)
        } else {
            DEFAULT_COLOR
        };
        self.buffer.splice(range.clone(), insert.iter().copied());
        self.colors
            .splice(range.clone(), insert.iter().map(|_| inherited));

        // Cursor tracks the edit.
        if self.cursor >= range.end {
            self.cursor = self.cursor - (range.end - range.start) + insert.len();
        } else if self.cursor > range.start {
            self.cursor = range.start + insert.len();
        }
        self.cursor = self.cursor.min(self.buffer.len());

        self.mark_dirty(ctx);
    }

    fn set_whole_buffer(&mut self, text: String, cursor: usize, ctx: &mut dyn EditContext) {
        self.buffer = text.chars().collect();
        self.colors = vec![DEFAULT_COLOR; self.buffer.len()];
        self.cursor = cursor.min(self.buffer.len());
        self.mark_dirty(ctx);
    }

    fn mark_dirty(&mut self, ctx: &mut dyn EditContext) {
        self.generation += 1;
        let text = self.text();
        let mut indents = ctx.compute_indents(&text);
        indents.resize(self.buffer.len(), 0);
        self.indents = indents;
        // A suggestion that no longer extends the buffer is gone.
        let lower = text.to_lowercase();
        if !self.autosuggestion.is_empty()
            && (self.autosuggestion.len() < text.len()
                || !self.autosuggestion.to_lowercase().starts_with(&lower))
        {
            self.autosuggestion.clear();
        }
        debug_assert_eq!(self.colors.len(), self.buffer.len());
        debug_assert_eq!(self.indents.len(), self.buffer.len());
    }

    /// Insert text at the cursor, cursor ends after it. Typing again
    /// un-suppresses autosuggestions.
    pub fn insert_at_cursor(&mut self, text: &str, ctx: &mut dyn EditContext) {
        let chars: Vec<char> = text.chars().collect();
        let cursor = self.cursor;
        self.splice(cursor..cursor, &chars, ctx);
        self.cursor = cursor + chars.len();
        self.suppress_autosuggestion = false;
    }

    // ---------------------------------------------------------------------
    // Word movement and kills
    // ---------------------------------------------------------------------

    fn move_word(&mut self, dir: Direction, style: WordStyle) -> Outcome {
        self.cursor = word_boundary(&self.buffer, self.cursor, dir, style);
        Outcome::repaint()
    }

    fn kill_word(
        &mut self,
        cmd: ReadlineCmd,
        style: WordStyle,
        dir: Direction,
        ctx: &mut dyn EditContext,
    ) -> Outcome {
        let boundary = word_boundary(&self.buffer, self.cursor, dir, style);
        let range = match dir {
            Direction::Forward => self.cursor..boundary,
            Direction::Backward => boundary..self.cursor,
        };
        let prepend = dir == Direction::Backward;
        self.kill_range(cmd, range, prepend, ctx)
    }

    fn kill_range(
        &mut self,
        cmd: ReadlineCmd,
        range: Range<usize>,
        prepend: bool,
        ctx: &mut dyn EditContext,
    ) -> Outcome {
        if range.start >= range.end {
            return Outcome::repaint();
        }
        let killed: String = self.buffer[range.clone()].iter().collect();
        let same_kind = self
            .kill_prev_cmd
            .is_some_and(|prev| kill_group(prev) == kill_group(cmd));
        if same_kind {
            self.kill.extend_front(&killed, prepend);
        } else {
            self.kill.add(killed);
        }
        self.splice(range.clone(), &[], ctx);
        self.cursor = range.start;
        Outcome::repaint()
    }

    fn transpose_chars(&mut self, ctx: &mut dyn EditContext) {
        if self.buffer.len() < 2 || self.cursor == 0 {
            return;
        }
        // At end of line: swap the last two. Otherwise drag the previous
        // character over the current one.
        let (a, b) = if self.cursor == self.buffer.len() {
            (self.cursor - 2, self.cursor - 1)
        } else {
            (self.cursor - 1, self.cursor)
        };
        let swapped = vec![self.buffer[b], self.buffer[a]];
        let cursor_after = (b + 1).min(self.buffer.len());
        self.splice(a..b + 1, &swapped, ctx);
        self.cursor = cursor_after;
    }

    fn transpose_words(&mut self, ctx: &mut dyn EditContext) {
        let style = WordStyle::Punctuation;
        let b2 = word_boundary(&self.buffer, self.cursor, Direction::Backward, style);
        let e2 = word_boundary(&self.buffer, b2, Direction::Forward, style);
        let b1 = word_boundary(&self.buffer, b2, Direction::Backward, style);
        let e1 = word_boundary(&self.buffer, b1, Direction::Forward, style);
        if b1 >= b2 || e1 > b2 || e2 <= b2 {
            return;
        }
        let mut replacement: Vec<char> = Vec::with_capacity(e2 - b1);
        replacement.extend_from_slice(&self.buffer[b2..e2]); // second word
        replacement.extend_from_slice(&self.buffer[e1..b2]); // separator
        replacement.extend_from_slice(&self.buffer[b1..e1]); // first word
        self.splice(b1..e2, &replacement, ctx);
        self.cursor = e2;
    }

    fn case_word(
        &mut self,
        ctx: &mut dyn EditContext,
        transform: impl Fn(char, bool) -> Vec<char>,
    ) -> Outcome {
        let end = word_boundary(
            &self.buffer,
            self.cursor,
            Direction::Forward,
            WordStyle::Punctuation,
        );
        if end <= self.cursor {
            return Outcome::repaint();
        }
        let mut replacement: Vec<char> = Vec::with_capacity(end - self.cursor);
        let mut first_alnum = true;
        for &c in &self.buffer[self.cursor..end] {
            if c.is_alphanumeric() {
                replacement.extend(transform(c, first_alnum));
                first_alnum = false;
            } else {
                replacement.push(c);
            }
        }
        let start = self.cursor;
        self.splice(start..end, &replacement, ctx);
        self.cursor = start + replacement.len();
        Outcome::repaint()
    }

    // ---------------------------------------------------------------------
    // Autosuggestion
    // ---------------------------------------------------------------------

    fn accept_autosuggestion_full(&mut self, ctx: &mut dyn EditContext) {
        if self.autosuggestion.is_empty() {
            return;
        }
        let suggestion = std::mem::take(&mut self.autosuggestion);
        let len = suggestion.chars().count();
        self.set_whole_buffer(suggestion, len, ctx);
    }

    fn accept_autosuggestion_chars(&mut self, n: usize, ctx: &mut dyn EditContext) {
        if self.autosuggestion.is_empty() {
            return;
        }
        let take: String = self
            .autosuggestion
            .chars()
            .skip(self.buffer.len())
            .take(n)
            .collect();
        if !take.is_empty() {
            self.insert_at_cursor(&take, ctx);
        }
    }

    // ---------------------------------------------------------------------
    // Completion
    // ---------------------------------------------------------------------

    fn complete(&mut self, ctx: &mut dyn EditContext) -> Outcome {
        let text = self.text();
        let completions = ctx.complete(&text, self.cursor, core_events::CompletionFlags::empty());
        if let Some(first) = completions.first() {
            let (tb, te) = ctx.token_at(&text, self.cursor);
            let replacement: Vec<char> = first.text.chars().collect();
            let cursor_after = tb + replacement.len();
            self.splice(tb..te.min(self.buffer.len()), &replacement, ctx);
            self.cursor = cursor_after.min(self.buffer.len());
        }
        Outcome::repaint()
    }

    // ---------------------------------------------------------------------
    // History searches
    // ---------------------------------------------------------------------

    fn enter_line_search(&mut self, search_type: SearchType) {
        let pending = self.text();
        let search = HistorySearch::new(self.history.clone(), pending.clone(), search_type);
        debug!(target: "edit.search", term_len = pending.len(), "line search started");
        self.search = SearchState::Line(LineSearchState {
            search,
            pending,
            pending_cursor: self.cursor,
        });
        self.autosuggestion.clear();
    }

    fn line_search(
        &mut self,
        search_type: SearchType,
        backward: bool,
        ctx: &mut dyn EditContext,
    ) -> Outcome {
        if !matches!(self.search, SearchState::Line(_)) {
            self.enter_line_search(search_type);
        }

        enum Step {
            Show(String),
            Restore(String, usize),
            Stay,
        }
        let step = {
            let SearchState::Line(state) = &mut self.search else {
                return Outcome::repaint();
            };
            if backward {
                if state.search.go_backwards() {
                    state
                        .search
                        .current()
                        .map_or(Step::Stay, |item| Step::Show(item.text))
                } else {
                    Step::Stay
                }
            } else if state.search.go_forwards() {
                if state.search.at_end() {
                    Step::Restore(state.pending.clone(), state.pending_cursor)
                } else {
                    state
                        .search
                        .current()
                        .map_or(Step::Stay, |item| Step::Show(item.text))
                }
            } else {
                Step::Stay
            }
        };
        match step {
            Step::Show(text) => self.show_search_result(text, ctx),
            Step::Restore(pending, cursor) => self.set_whole_buffer(pending, cursor, ctx),
            Step::Stay => {}
        }
        Outcome::repaint()
    }

    /// Put a search match into the buffer, cursor at end.
    fn show_search_result(&mut self, text: String, ctx: &mut dyn EditContext) {
        let len = text.chars().count();
        self.set_whole_buffer(text, len, ctx);
    }

    fn token_search(&mut self, backward: bool, ctx: &mut dyn EditContext) -> Outcome {
        if !matches!(self.search, SearchState::Token(_)) {
            let text = self.text();
            let (tb, te) = ctx.token_at(&text, self.cursor);
            let term: String = text.chars().skip(tb).take(te - tb).collect();
            let search =
                HistorySearch::new(self.history.clone(), term.clone(), SearchType::Contains);
            debug!(target: "edit.search", "token search started");
            self.search = SearchState::Token(TokenSearchState {
                term: term.clone(),
                pending: text,
                pending_cursor: self.cursor,
                search,
                current_command: String::new(),
                token_pos: -1,
                matches: vec![term],
                pos: 0,
            });
            self.autosuggestion.clear();
            if !backward {
                return Outcome::repaint();
            }
        }

        let replacement: Option<String> = {
            let SearchState::Token(state) = &mut self.search else {
                return Outcome::repaint();
            };
            if !backward {
                // Newer: walk back down the remembered matches.
                if state.pos > 0 {
                    state.pos -= 1;
                    Some(state.matches[state.pos].clone())
                } else {
                    None
                }
            } else if state.pos + 1 < state.matches.len() {
                // Older: first any remembered match we backed off from...
                state.pos += 1;
                Some(state.matches[state.pos].clone())
            } else {
                // ...then mine matching history commands for fresh tokens.
                loop {
                    if state.token_pos < 0 {
                        if !state.search.go_backwards() {
                            break None; // history exhausted
                        }
                        match state.search.current() {
                            Some(HistoryItem { text, .. }) => {
                                state.token_pos = text.chars().count() as i64;
                                state.current_command = text;
                            }
                            None => break None,
                        }
                    }

                    // Last token before token_pos that contains the term
                    // and has not been yielded yet.
                    let mut found: Option<(String, i64)> = None;
                    for (tok, tpos) in ctx.tokens_with_pos(&state.current_command) {
                        let tpos = tpos as i64;
                        if tpos < state.token_pos
                            && tok.contains(&state.term)
                            && !state.matches.contains(&tok)
                        {
                            found = Some((tok, tpos));
                        }
                    }
                    match found {
                        Some((tok, tpos)) => {
                            state.token_pos = tpos;
                            state.matches.push(tok.clone());
                            state.pos = state.matches.len() - 1;
                            break Some(tok);
                        }
                        None => {
                            // This command is mined out; fetch the next.
                            state.token_pos = -1;
                        }
                    }
                }
            }
        };
        if let Some(token) = replacement {
            self.replace_current_token(&token, ctx);
        }
        Outcome::repaint()
    }

    fn replace_current_token(&mut self, replacement: &str, ctx: &mut dyn EditContext) {
        let text = self.text();
        let (tb, te) = ctx.token_at(&text, self.cursor);
        let chars: Vec<char> = replacement.chars().collect();
        let cursor_after = tb + chars.len();
        self.splice(tb..te.min(self.buffer.len()), &chars, ctx);
        self.cursor = cursor_after.min(self.buffer.len());
    }

    /// Leave search mode. `revert` restores the snapshot taken when the
    /// search began; otherwise the buffer keeps the current match.
    fn exit_search(&mut self, revert: bool, ctx: &mut dyn EditContext) {
        let snapshot = match std::mem::replace(&mut self.search, SearchState::Inactive) {
            SearchState::Inactive => None,
            SearchState::Line(state) => Some((state.pending, state.pending_cursor)),
            SearchState::Token(state) => Some((state.pending, state.pending_cursor)),
        };
        if revert && let Some((pending, cursor)) = snapshot {
            self.set_whole_buffer(pending, cursor, ctx);
        }
    }

    // ---------------------------------------------------------------------
    // Execute
    // ---------------------------------------------------------------------

    fn execute(&mut self, ctx: &mut dyn EditContext) -> Outcome {
        let text = self.text();
        match ctx.test_syntax(&text) {
            SyntaxStatus::Complete => {
                self.exit_search(false, ctx);
                Outcome {
                    repaint: true,
                    commit: Some(text),
                    ..Default::default()
                }
            }
            SyntaxStatus::Incomplete => {
                self.insert_at_cursor("\n", ctx);
                Outcome::repaint()
            }
            SyntaxStatus::Error => Outcome::repaint(),
        }
    }
}

/// Kills in the same group merge into one ring entry.
fn kill_group(cmd: ReadlineCmd) -> u8 {
    use ReadlineCmd::*;
    match cmd {
        KillWord | KillBigword => 1,
        BackwardKillWord | BackwardKillPathComponent | BackwardKillBigword => 2,
        KillLine => 3,
        BackwardKillLine => 4,
        KillWholeLine | KillInnerLine => 5,
        _ => 0,
    }
}
