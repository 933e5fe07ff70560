//! Core event types shared by the input queue, binding engine, editor and
//! reader loop, plus the background job pool they all coordinate through.
//!
//! Everything that flows between the input side and the editor is an
//! [`Event`]. Named edit operations are data ([`ReadlineCmd`]), not
//! behavior; dispatch lives in `core-edit`. Commands cross the raw
//! code-point boundary (the char queue, the binding tables) encoded into a
//! private-use plane; [`encode_readline`] / [`decode_readline`] are the only
//! two functions that know that layout.

use std::fmt;
use std::sync::atomic::AtomicU64;

pub mod jobs;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
// Relaxed atomic counters, inspectable from tests and periodically logged by
// the reader loop. Content never appears here, only counts.
// -------------------------------------------------------------------------------------------------
pub static JOBS_SUBMITTED: AtomicU64 = AtomicU64::new(0);
pub static JOBS_COMPLETED: AtomicU64 = AtomicU64::new(0);
pub static JOBS_DROPPED_STALE: AtomicU64 = AtomicU64::new(0);
pub static EVENTS_PUSHED_BACK: AtomicU64 = AtomicU64::new(0);
pub static READLINE_DISPATCHED: AtomicU64 = AtomicU64::new(0);

/// First code point of the private range used to smuggle readline commands
/// through a code-point channel. Plane 16 private use area; nothing a user
/// can type decodes into it.
pub const RL_BASE: u32 = 0x10_0000;

/// How a literal character wants to be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStyle {
    Normal,
    /// Insert only when the cursor is not at offset 0. Bound to sequences
    /// that double as mode switches in some keymaps.
    NotFirst,
}

/// A single unit of input as seen by the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A literal code point to insert.
    Char { cp: char, style: InsertStyle },
    /// A named edit command, carrying the key sequence that produced it and
    /// an optional single-character argument (jump targets).
    Readline {
        cmd: ReadlineCmd,
        seq: Vec<char>,
        arg: Option<char>,
    },
    /// End of input on the fd.
    Eof,
    /// A side channel fired (job completion, uvar change, signal); the
    /// caller should run its hooks and re-examine its world.
    CheckExit,
}

impl Event {
    pub fn plain(cp: char) -> Self {
        Event::Char {
            cp,
            style: InsertStyle::Normal,
        }
    }

    pub fn readline(cmd: ReadlineCmd) -> Self {
        Event::Readline {
            cmd,
            seq: Vec::new(),
            arg: None,
        }
    }

    /// Char payload, if this is a literal character event.
    pub fn as_char(&self) -> Option<char> {
        match self {
            Event::Char { cp, .. } => Some(*cp),
            _ => None,
        }
    }

    pub fn is_char(&self) -> bool {
        matches!(self, Event::Char { .. })
    }

    /// True for events that must outrank buffered characters when
    /// `promote_interruptions` runs.
    pub fn is_interruption(&self) -> bool {
        !self.is_char()
    }
}

macro_rules! readline_cmds {
    ( $( $variant:ident => $name:literal ),+ $(,)? ) => {
        /// Named edit operations. The numeric layout is private; the names
        /// are the stable interface used by binding definitions.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum ReadlineCmd {
            $( $variant, )+
        }

        impl ReadlineCmd {
            pub const ALL: &'static [ReadlineCmd] = &[ $( ReadlineCmd::$variant, )+ ];

            /// Stable binding-DSL name.
            pub fn name(self) -> &'static str {
                match self {
                    $( ReadlineCmd::$variant => $name, )+
                }
            }

            /// Inverse of [`ReadlineCmd::name`].
            pub fn from_name(name: &str) -> Option<ReadlineCmd> {
                match name {
                    $( $name => Some(ReadlineCmd::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

readline_cmds! {
    BeginningOfLine => "beginning-of-line",
    EndOfLine => "end-of-line",
    ForwardChar => "forward-char",
    BackwardChar => "backward-char",
    ForwardSingleChar => "forward-single-char",
    ForwardWord => "forward-word",
    BackwardWord => "backward-word",
    ForwardBigword => "forward-bigword",
    BackwardBigword => "backward-bigword",
    HistorySearchBackward => "history-search-backward",
    HistorySearchForward => "history-search-forward",
    HistoryPrefixSearchBackward => "history-prefix-search-backward",
    HistoryPrefixSearchForward => "history-prefix-search-forward",
    DeleteChar => "delete-char",
    BackwardDeleteChar => "backward-delete-char",
    KillLine => "kill-line",
    Yank => "yank",
    YankPop => "yank-pop",
    Complete => "complete",
    CompleteAndSearch => "complete-and-search",
    BeginningOfHistory => "beginning-of-history",
    EndOfHistory => "end-of-history",
    BackwardKillLine => "backward-kill-line",
    KillWholeLine => "kill-whole-line",
    KillInnerLine => "kill-inner-line",
    KillWord => "kill-word",
    KillBigword => "kill-bigword",
    BackwardKillWord => "backward-kill-word",
    BackwardKillPathComponent => "backward-kill-path-component",
    BackwardKillBigword => "backward-kill-bigword",
    HistoryTokenSearchBackward => "history-token-search-backward",
    HistoryTokenSearchForward => "history-token-search-forward",
    SelfInsert => "self-insert",
    SelfInsertNotFirst => "self-insert-notfirst",
    TransposeChars => "transpose-chars",
    TransposeWords => "transpose-words",
    UpcaseWord => "upcase-word",
    DowncaseWord => "downcase-word",
    CapitalizeWord => "capitalize-word",
    Execute => "execute",
    BeginningOfBuffer => "beginning-of-buffer",
    EndOfBuffer => "end-of-buffer",
    RepaintMode => "repaint-mode",
    Repaint => "repaint",
    ForceRepaint => "force-repaint",
    UpLine => "up-line",
    DownLine => "down-line",
    SuppressAutosuggestion => "suppress-autosuggestion",
    AcceptAutosuggestion => "accept-autosuggestion",
    InsertLineUnder => "insert-line-under",
    InsertLineOver => "insert-line-over",
    ForwardJump => "forward-jump",
    BackwardJump => "backward-jump",
    ForwardJumpTill => "forward-jump-till",
    BackwardJumpTill => "backward-jump-till",
    DeleteOrExit => "delete-or-exit",
    Exit => "exit",
    Cancel => "cancel",
}

impl ReadlineCmd {
    /// Commands that consume one extra character of input as their argument.
    pub fn wants_arg(self) -> bool {
        matches!(
            self,
            ReadlineCmd::ForwardJump
                | ReadlineCmd::BackwardJump
                | ReadlineCmd::ForwardJumpTill
                | ReadlineCmd::BackwardJumpTill
        )
    }

    /// Kill-ring commands participating in append/prepend merging.
    pub fn is_kill(self) -> bool {
        matches!(
            self,
            ReadlineCmd::KillLine
                | ReadlineCmd::BackwardKillLine
                | ReadlineCmd::KillWholeLine
                | ReadlineCmd::KillInnerLine
                | ReadlineCmd::KillWord
                | ReadlineCmd::KillBigword
                | ReadlineCmd::BackwardKillWord
                | ReadlineCmd::BackwardKillPathComponent
                | ReadlineCmd::BackwardKillBigword
        )
    }
}

impl fmt::Display for ReadlineCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Map a command into the private code-point range.
pub fn encode_readline(cmd: ReadlineCmd) -> char {
    // Discriminants are dense from 0; the range RL_BASE..RL_BASE+len stays
    // well inside plane 16.
    char::from_u32(RL_BASE + cmd as u32).unwrap_or('\u{10FFFF}')
}

/// Decode a private-range code point back into a command.
pub fn decode_readline(cp: u32) -> Option<ReadlineCmd> {
    let idx = cp.checked_sub(RL_BASE)? as usize;
    ReadlineCmd::ALL.get(idx).copied()
}

bitflags::bitflags! {
    /// Flags attached to a single completion by the completion engine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CompletionFlags: u8 {
        /// Do not append a trailing space after applying.
        const NO_SPACE = 1 << 0;
        /// Insert the text without escaping shell metacharacters.
        const NO_ESCAPE = 1 << 1;
        /// The match was made case-insensitively.
        const NO_CASE = 1 << 2;
        /// Produced for an autosuggestion probe rather than the pager.
        const AUTOSUGGEST = 1 << 3;
    }
}

/// One completion as returned by the external completion engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub description: String,
    pub flags: CompletionFlags,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            description: String::new(),
            flags: CompletionFlags::empty(),
        }
    }
}
