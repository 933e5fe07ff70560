//! Reader loop, collaborator contracts, and the async job merge step.
//!
//! This crate glues the leaves together: bytes come out of `core-input`,
//! turn into events in `core-keymap`, drive `core-edit`, and the result is
//! painted through `core-render`. Background highlight and autosuggestion
//! work runs on the `core-events` pool; the sole staleness mechanism is
//! the editor's generation counter, checked at merge time.

pub mod autosuggest;
pub mod bindings;
pub mod config;
pub mod contract;
pub mod jobs;
pub mod reader;

pub use config::ReaderConfig;
pub use contract::{
    Completer, EnvProvider, EnvSnapshot, Evaluator, Highlighter, NullCollaborator, PathProber,
    Prompter, SpecialSuggester, SyntaxTester, UvarNotifier,
};
pub use reader::{Collaborators, HistoryFactory, Reader, ReaderOptions};
