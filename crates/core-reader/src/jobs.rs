//! Background job records for the reader.
//!
//! A job is a value: it owns the snapshot it operates on and returns one
//! [`JobOutcome`]. The reader's merge step decides relevance; workers
//! never touch live state.

/// Completion value delivered back to the main thread.
pub enum JobOutcome {
    Highlight {
        /// Generation the snapshot was taken at.
        generation: u64,
        text: String,
        colors: Vec<u32>,
    },
    Autosuggest {
        text: String,
        suggestion: Option<String>,
    },
}
