//! Demonstration collaborators.
//!
//! The line-editor core consumes its parser, completer and highlighter by
//! contract; this module supplies working stand-ins good enough to drive
//! the whole pipeline interactively: a bracket/quote balance tester, a
//! history-token completer, a rule-of-thumb highlighter (known command =
//! blue, unknown = red, quoted spans yellow), a `cd` suggester, and a
//! filesystem path prober.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use core_edit::SyntaxStatus;
use core_events::{Completion, CompletionFlags};
use core_history::{History, HistorySearch, SearchType};
use core_reader::contract::{
    Completer, EnvProvider, EnvSnapshot, Evaluator, Highlighter, PathProber, Prompter,
    SpecialSuggester, SyntaxTester,
};
use core_term::color::{ColorSpec, PackedColor};

// ---------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------

/// Process environment, with COLUMNS/LINES answered by the terminal when
/// the variables are unset.
pub struct OsEnv;

impl EnvProvider for OsEnv {
    fn get(&self, key: &str) -> Option<String> {
        if let Ok(value) = std::env::var(key) {
            return Some(value);
        }
        match key {
            "COLUMNS" => crossterm::terminal::size()
                .ok()
                .map(|(cols, _)| cols.to_string()),
            "LINES" => crossterm::terminal::size()
                .ok()
                .map(|(_, rows)| rows.to_string()),
            _ => None,
        }
    }

    fn snapshot(&self) -> EnvSnapshot {
        let mut snapshot = EnvSnapshot::new();
        for key in ["TERM", "PATH", "PWD", "HOME"] {
            if let Ok(value) = std::env::var(key) {
                snapshot.insert(key.to_string(), value);
            }
        }
        snapshot
    }
}

// ---------------------------------------------------------------------
// Syntax testing and indentation
// ---------------------------------------------------------------------

/// Balance-based syntax tester: unbalanced quotes or brackets (or a
/// trailing backslash) mean the line continues.
pub struct BalanceSyntax;

impl SyntaxTester for BalanceSyntax {
    fn test_syntax(&self, text: &str) -> SyntaxStatus {
        let mut depth = 0i32;
        let mut in_single = false;
        let mut in_double = false;
        let mut escaped = false;
        for c in text.chars() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '\'' if !in_double => in_single = !in_single,
                '"' if !in_single => in_double = !in_double,
                '(' | '{' if !in_single && !in_double => depth += 1,
                ')' | '}' if !in_single && !in_double => depth -= 1,
                _ => {}
            }
        }
        if depth < 0 {
            return SyntaxStatus::Error;
        }
        if depth > 0 || in_single || in_double || escaped || text.ends_with('\\') {
            return SyntaxStatus::Incomplete;
        }
        SyntaxStatus::Complete
    }

    fn compute_indents(&self, text: &str) -> Vec<i32> {
        let mut out = Vec::with_capacity(text.chars().count());
        let mut depth = 0i32;
        for c in text.chars() {
            match c {
                '(' | '{' => {
                    out.push(depth);
                    depth += 1;
                }
                ')' | '}' => {
                    depth = (depth - 1).max(0);
                    out.push(depth);
                }
                _ => out.push(depth),
            }
        }
        out
    }
}

// ---------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------

/// Completes the trailing token from tokens seen in history.
pub struct HistoryCompleter {
    history: Arc<History>,
}

impl HistoryCompleter {
    pub fn new(history: Arc<History>) -> Self {
        Self { history }
    }
}

impl Completer for HistoryCompleter {
    fn complete(&self, text: &str, _cursor: usize, flags: CompletionFlags) -> Vec<Completion> {
        let token = text.split_whitespace().last().unwrap_or("");
        if token.is_empty() {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut search =
            HistorySearch::new(self.history.clone(), token.to_string(), SearchType::Contains);
        while search.go_backwards() && out.len() < 16 {
            let Some(item) = search.current() else { break };
            for candidate in item.text.split_whitespace() {
                if candidate.starts_with(token)
                    && candidate != token
                    && seen.insert(candidate.to_string())
                {
                    let mut completion = Completion::new(candidate);
                    completion.flags = flags & CompletionFlags::AUTOSUGGEST;
                    out.push(completion);
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------
// Highlighting
// ---------------------------------------------------------------------

fn pack(fg: ColorSpec) -> u32 {
    PackedColor::new(fg, ColorSpec::NORMAL).0
}

/// First word blue when it resolves to a command, red otherwise; quoted
/// spans yellow; everything else default. Pure over its snapshot.
pub struct RuleHighlighter;

impl RuleHighlighter {
    fn command_exists(word: &str, env: &EnvSnapshot) -> bool {
        const BUILTINS: &[&str] = &["cd", "exit", "echo", "set", "source", "history"];
        if BUILTINS.contains(&word) {
            return true;
        }
        if word.contains('/') {
            return Path::new(word).exists();
        }
        let Some(path) = env.get("PATH") else {
            return false;
        };
        path.split(':')
            .any(|dir| !dir.is_empty() && Path::new(dir).join(word).is_file())
    }
}

impl Highlighter for RuleHighlighter {
    fn highlight(&self, text: &str, _cursor: usize, env: &EnvSnapshot) -> Vec<u32> {
        let chars: Vec<char> = text.chars().collect();
        let normal = PackedColor::NORMAL.0;
        let mut colors = vec![normal; chars.len()];

        // First token: command validity.
        let cmd_start = chars.iter().position(|c| !c.is_whitespace()).unwrap_or(0);
        let cmd_end = chars[cmd_start..]
            .iter()
            .position(|c| c.is_whitespace())
            .map_or(chars.len(), |i| cmd_start + i);
        if cmd_end > cmd_start {
            let word: String = chars[cmd_start..cmd_end].iter().collect();
            let color = if Self::command_exists(&word, env) {
                pack(ColorSpec::indexed(4).bold())
            } else {
                pack(ColorSpec::indexed(1))
            };
            for slot in colors[cmd_start..cmd_end].iter_mut() {
                *slot = color;
            }
        }

        // Quoted spans.
        let yellow = pack(ColorSpec::indexed(3));
        let mut quote: Option<char> = None;
        for (i, &c) in chars.iter().enumerate() {
            match quote {
                Some(q) => {
                    colors[i] = yellow;
                    if c == q {
                        quote = None;
                    }
                }
                None if c == '\'' || c == '"' => {
                    colors[i] = yellow;
                    quote = Some(c);
                }
                None => {}
            }
        }
        colors
    }
}

// ---------------------------------------------------------------------
// Suggestions and path probing
// ---------------------------------------------------------------------

/// Recognizes `cd <partial>` and completes it against the directory
/// entries of the working directory.
pub struct CdSuggester;

impl SpecialSuggester for CdSuggester {
    fn suggest(&self, text: &str) -> Option<String> {
        let partial = text.strip_prefix("cd ")?;
        if partial.is_empty() || partial.contains(' ') {
            return None;
        }
        let (dir, stem) = match partial.rfind('/') {
            Some(idx) => (&partial[..=idx], &partial[idx + 1..]),
            None => ("", partial),
        };
        let read_from = if dir.is_empty() { "." } else { dir };
        let mut entries: Vec<String> = std::fs::read_dir(read_from)
            .ok()?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(stem) && !name.starts_with('.'))
            .collect();
        entries.sort();
        let first = entries.into_iter().next()?;
        Some(format!("cd {dir}{first}"))
    }
}

/// Filesystem existence check for history `required_paths`.
pub struct FsProber;

impl PathProber for FsProber {
    fn paths_exist(&self, paths: &[String]) -> bool {
        paths.iter().all(|p| Path::new(p).exists())
    }

    fn existing_paths(&self, tokens: &[String]) -> Vec<String> {
        tokens
            .iter()
            .filter(|t| t.contains('/') || t.contains('.'))
            .filter(|t| Path::new(t).exists())
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------
// Evaluation and prompts
// ---------------------------------------------------------------------

/// Runs committed lines through `sh -c`. The outer loop restores the
/// terminal modes around this.
pub struct ShellEvaluator;

impl Evaluator for ShellEvaluator {
    fn evaluate(&mut self, command_line: &str) -> i32 {
        match std::process::Command::new("sh")
            .arg("-c")
            .arg(command_line)
            .status()
        {
            Ok(status) => status.code().unwrap_or(-1),
            Err(err) => {
                eprintln!("driftline: failed to run command: {err}");
                127
            }
        }
    }
}

/// Working-directory prompt with the last exit status on the right.
pub struct StatusPrompter {
    pub last_status: i32,
}

impl StatusPrompter {
    pub fn new() -> Self {
        Self { last_status: 0 }
    }
}

impl Default for StatusPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for StatusPrompter {
    fn left_prompt(&mut self) -> String {
        let cwd = std::env::current_dir()
            .ok()
            .and_then(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .or_else(|| Some("/".to_string()))
            })
            .unwrap_or_else(|| "?".to_string());
        format!("\x1b[32m{cwd}\x1b[0m> ")
    }

    fn right_prompt(&mut self) -> String {
        if self.last_status == 0 {
            String::new()
        } else {
            format!("\x1b[31m[{}]\x1b[0m", self.last_status)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_syntax_states() {
        let t = BalanceSyntax;
        assert_eq!(t.test_syntax("echo hi"), SyntaxStatus::Complete);
        assert_eq!(t.test_syntax("echo 'open"), SyntaxStatus::Incomplete);
        assert_eq!(t.test_syntax("fn() {"), SyntaxStatus::Incomplete);
        assert_eq!(t.test_syntax("echo )"), SyntaxStatus::Error);
        assert_eq!(t.test_syntax("echo \\"), SyntaxStatus::Incomplete);
        assert_eq!(t.test_syntax("echo \"a'b\""), SyntaxStatus::Complete);
    }

    #[test]
    fn indents_follow_bracket_depth() {
        let t = BalanceSyntax;
        let indents = t.compute_indents("a{b}c");
        assert_eq!(indents, vec![0, 0, 1, 0, 0]);
    }

    #[test]
    fn history_completer_offers_extensions() {
        let history = Arc::new(History::in_memory("completer"));
        history.add(core_history::HistoryItem::with_timestamp("cat notebook", 1));
        let completer = HistoryCompleter::new(history);
        let got = completer.complete("less note", 9, CompletionFlags::AUTOSUGGEST);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "notebook");
    }

    #[test]
    fn highlighter_lengths_match_input() {
        let env = EnvSnapshot::new();
        let colors = RuleHighlighter.highlight("unknowncmd 'quoted'", 0, &env);
        assert_eq!(colors.len(), "unknowncmd 'quoted'".chars().count());
        // Unknown command is red.
        assert_eq!(colors[0], pack(ColorSpec::indexed(1)));
        // Quoted span is yellow.
        assert_eq!(colors[12], pack(ColorSpec::indexed(3)));
    }

    #[test]
    fn highlighter_is_pure_over_snapshot() {
        let mut env = EnvSnapshot::new();
        env.insert("PATH".to_string(), "/definitely/not/a/dir".to_string());
        let a = RuleHighlighter.highlight("zz", 0, &env);
        let b = RuleHighlighter.highlight("zz", 0, &env);
        assert_eq!(a, b);
    }
}
