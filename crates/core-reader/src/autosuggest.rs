//! Autosuggestion policy.
//!
//! Given a snapshot of the command line, try in order:
//!
//! 1. history prefix search, case-sensitive, newest first — skipping
//!    items containing newlines and items whose recorded paths no longer
//!    resolve;
//! 2. the caller's special-command handler;
//! 3. nothing, if the text ends in whitespace while the cursor is midline
//!    (typing spaces in the middle of a line must not pop suggestions);
//! 4. the completion engine with the autosuggest flag; the first
//!    completion, applied to the token under the cursor, becomes the
//!    suggestion.
//!
//! Runs on worker threads: everything it touches is an owned snapshot or
//! an internally-synchronized store. The final accept/reject decision
//! (generation, suppression, prefix check) happens on the main thread.

use std::sync::Arc;

use tracing::trace;

use core_events::CompletionFlags;
use core_history::{History, HistorySearch, SearchType};

use crate::contract::{Completer, PathProber, SpecialSuggester};

/// Owned input to one autosuggestion probe.
#[derive(Debug, Clone)]
pub struct SuggestInput {
    pub text: String,
    pub cursor: usize,
}

pub fn compute(
    input: &SuggestInput,
    history: &Arc<History>,
    special: &dyn SpecialSuggester,
    completer: &dyn Completer,
    prober: &dyn PathProber,
) -> Option<String> {
    if input.text.is_empty() {
        return None;
    }

    // 1. History, newest first.
    let mut search = HistorySearch::new(history.clone(), input.text.clone(), SearchType::Prefix);
    while search.go_backwards() {
        let Some(item) = search.current() else { break };
        if item.text.contains('\n') {
            continue;
        }
        if !prober.paths_exist(&item.required_paths) {
            trace!(target: "reader.suggest", "history item skipped: stale paths");
            continue;
        }
        return Some(item.text);
    }

    // 2. Special-command handler.
    if let Some(suggestion) = special.suggest(&input.text) {
        return Some(suggestion);
    }

    // 3. Whitespace-midline rule.
    let at_end = input.cursor >= input.text.chars().count();
    if input.text.ends_with(char::is_whitespace) && !at_end {
        return None;
    }

    // 4. Completion engine.
    let completions = completer.complete(&input.text, input.cursor, CompletionFlags::AUTOSUGGEST);
    let first = completions.into_iter().next()?;
    let applied = apply_to_last_token(&input.text, &first.text);
    if applied.to_lowercase().starts_with(&input.text.to_lowercase()) {
        Some(applied)
    } else {
        None
    }
}

/// Replace the trailing token of `text` with `completion`, the way
/// accepting that completion would rewrite the line.
fn apply_to_last_token(text: &str, completion: &str) -> String {
    let token_start = text
        .char_indices()
        .rev()
        .take_while(|&(_, c)| !c.is_whitespace())
        .map(|(i, _)| i)
        .last()
        .unwrap_or(text.len());
    let mut out = String::with_capacity(token_start + completion.len());
    out.push_str(&text[..token_start]);
    out.push_str(completion);
    out
}
