//! Terminal capability adapter.
//!
//! Fronts everything the renderer and binding engine need to know about the
//! terminal: key name ⇄ byte sequence resolution, cursor motion, clears,
//! colors, and the three traits that change rendering decisions
//! (`auto_right_margin`, `eat_newline_glitch`, newline-style `cursor_down`).
//!
//! Capabilities come from a compiled-in table keyed by the `TERM` family
//! rather than a linked curses library; the table keeps terminfo's shape
//! (named capabilities to byte strings) so a real terminfo backend could be
//! swapped in behind [`TermCaps::sequence_for_name`] without touching
//! callers. Read-only after construction.

use thiserror::Error;

pub mod caps;
pub mod color;
pub mod keys;
pub mod output;
pub mod session;

pub use caps::{Family, TermCaps};
pub use color::{ColorSpec, PackedColor};
pub use output::{ByteSink, Outputter, SinkSwapGuard, VecSink};
pub use session::TermSession;

/// Fatal at initialization: the reader refuses to run interactively when
/// the terminal cannot be described at all.
#[derive(Debug, Error)]
pub enum TermSetupError {
    #[error("TERM is not set and no fallback was requested")]
    NoTermVariable,
    #[error("terminal type {0:?} is hardcopy or otherwise unusable")]
    Unusable(String),
    #[error("failed to configure terminal modes: {0}")]
    Termios(#[from] nix::errno::Errno),
}
