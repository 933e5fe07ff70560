//! Contracts for the machinery the reader consumes but does not own:
//! evaluation, syntax testing, completion, highlighting, environment
//! access, universal-variable notification, path probing, prompts.
//!
//! Everything handed to background workers must be `Send + Sync`; workers
//! receive owned snapshots, never references into live editor state.

use std::collections::HashMap;
use std::os::fd::RawFd;

use core_events::{Completion, CompletionFlags};
use core_edit::SyntaxStatus;

/// Owned copy of the environment values a background job may read.
pub type EnvSnapshot = HashMap<String, String>;

/// Runs a committed command line. Consumed by the outer shell loop, which
/// releases the terminal first and reacquires it afterwards.
pub trait Evaluator {
    fn evaluate(&mut self, command_line: &str) -> i32;
}

/// Decides whether Execute commits, continues, or just redraws.
pub trait SyntaxTester: Send + Sync {
    fn test_syntax(&self, text: &str) -> SyntaxStatus;

    /// Indentation level per character, for continuation-line layout and
    /// vertical cursor motion. Default: flat.
    fn compute_indents(&self, text: &str) -> Vec<i32> {
        vec![0; text.chars().count()]
    }
}

/// The external completion engine.
pub trait Completer: Send + Sync {
    fn complete(&self, text: &str, cursor: usize, flags: CompletionFlags) -> Vec<Completion>;
}

/// Produces per-character packed colors for a snapshot of the buffer.
/// Must be pure with respect to its arguments.
pub trait Highlighter: Send + Sync {
    fn highlight(&self, text: &str, cursor: usize, env: &EnvSnapshot) -> Vec<u32>;
}

/// Environment variable access plus the snapshot used by workers.
pub trait EnvProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn snapshot(&self) -> EnvSnapshot {
        EnvSnapshot::new()
    }
}

/// Cross-process change notification for shared variables. Readability of
/// `fd` (when present) means "re-read universal variables"; some backends
/// need periodic polling instead.
pub trait UvarNotifier: Send + Sync {
    fn notification_fd(&self) -> Option<RawFd> {
        None
    }

    /// Requested polling cadence in milliseconds, if any.
    fn poll_interval_ms(&self) -> Option<u64> {
        None
    }

    /// Drain the notification; returns whether variables changed.
    fn drain(&self) -> bool {
        false
    }
}

/// Checks that the literal path tokens recorded with a history item still
/// resolve, so stale suggestions are not offered.
pub trait PathProber: Send + Sync {
    fn paths_exist(&self, paths: &[String]) -> bool {
        let _ = paths;
        true
    }

    /// The subset of `tokens` that currently resolve as paths; recorded
    /// with the history item a committed line becomes.
    fn existing_paths(&self, tokens: &[String]) -> Vec<String> {
        let _ = tokens;
        Vec::new()
    }
}

/// Domain-specific autosuggestions tried before the completion engine
/// (e.g. recognizing `cd <dir>`).
pub trait SpecialSuggester: Send + Sync {
    fn suggest(&self, text: &str) -> Option<String> {
        let _ = text;
        None
    }
}

/// Computes the prompts shown around the command line.
pub trait Prompter {
    fn left_prompt(&mut self) -> String {
        "> ".to_string()
    }

    fn right_prompt(&mut self) -> String {
        String::new()
    }
}

/// No-op implementations for tests and minimal embeddings.
pub struct NullCollaborator;

impl SyntaxTester for NullCollaborator {
    fn test_syntax(&self, _text: &str) -> SyntaxStatus {
        SyntaxStatus::Complete
    }
}

impl Completer for NullCollaborator {
    fn complete(&self, _: &str, _: usize, _: CompletionFlags) -> Vec<Completion> {
        Vec::new()
    }
}

impl Highlighter for NullCollaborator {
    fn highlight(&self, text: &str, _: usize, _: &EnvSnapshot) -> Vec<u32> {
        vec![core_render::screen::normal_color(); text.chars().count()]
    }
}

impl EnvProvider for NullCollaborator {
    fn get(&self, _: &str) -> Option<String> {
        None
    }
}

impl UvarNotifier for NullCollaborator {}
impl PathProber for NullCollaborator {}
impl SpecialSuggester for NullCollaborator {}
impl Prompter for NullCollaborator {}
