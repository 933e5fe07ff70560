//! Compiled-in capability database.
//!
//! One row per terminal family; the common CSI dialect covers the whole
//! xterm lineage (xterm, rxvt, alacritty, kitty, tmux, screen) while the
//! linux console and dumb terminals get their own rows. Capability names
//! follow terminfo so callers never see family-specific spellings.

use crate::TermSetupError;
use crate::keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Xterm,
    Linux,
    Dumb,
}

/// Resolved capabilities for one terminal. Read-only after construction.
#[derive(Debug, Clone)]
pub struct TermCaps {
    pub term_name: String,
    pub family: Family,

    pub cursor_up: &'static [u8],
    pub cursor_down: &'static [u8],
    pub cursor_left: &'static [u8],
    pub cursor_right: &'static [u8],
    pub clr_eol: &'static [u8],
    pub clr_eos: &'static [u8],
    /// Parameterized (terminfo `%i%p1%d;%p2%d` form).
    pub cursor_address: &'static [u8],

    pub enter_bold_mode: &'static [u8],
    pub exit_attribute_mode: &'static [u8],
    pub enter_underline_mode: &'static [u8],
    pub exit_underline_mode: &'static [u8],
    pub enter_standout_mode: &'static [u8],
    pub exit_standout_mode: &'static [u8],
    pub flash_screen: &'static [u8],
    pub scroll_reverse: &'static [u8],

    pub max_colors: u32,
    /// Cursor sticks in the last column instead of wrapping.
    pub auto_right_margin: bool,
    /// A newline emitted at the wrap point is absorbed.
    pub eat_newline_glitch: bool,
}

impl TermCaps {
    /// Build capabilities for `term` (the `TERM` environment value).
    pub fn from_term(term: Option<&str>) -> Result<Self, TermSetupError> {
        let term = term.ok_or(TermSetupError::NoTermVariable)?;
        if term.is_empty() {
            return Err(TermSetupError::Unusable(term.to_string()));
        }
        let family = classify(term);
        Ok(Self::for_family(term, family))
    }

    fn for_family(term: &str, family: Family) -> Self {
        let max_colors = match family {
            Family::Dumb => 0,
            Family::Linux => 8,
            Family::Xterm if term.contains("256color") || term.contains("truecolor") => 256,
            Family::Xterm => 16,
        };
        match family {
            Family::Xterm | Family::Linux => Self {
                term_name: term.to_string(),
                family,
                cursor_up: b"\x1b[A",
                // The console lineage uses a bare newline for cud1, which
                // also carries the cursor to column 0. s_move compensates.
                cursor_down: b"\n",
                cursor_left: b"\x08",
                cursor_right: b"\x1b[C",
                clr_eol: b"\x1b[K",
                clr_eos: b"\x1b[J",
                cursor_address: b"\x1b[%i%p1%d;%p2%dH",
                enter_bold_mode: b"\x1b[1m",
                exit_attribute_mode: b"\x1b[0m",
                enter_underline_mode: b"\x1b[4m",
                exit_underline_mode: b"\x1b[24m",
                enter_standout_mode: b"\x1b[7m",
                exit_standout_mode: b"\x1b[27m",
                flash_screen: b"\x1b[?5h\x1b[?5l",
                scroll_reverse: b"\x1bM",
                max_colors,
                auto_right_margin: true,
                eat_newline_glitch: true,
            },
            Family::Dumb => Self {
                term_name: term.to_string(),
                family,
                cursor_up: b"",
                cursor_down: b"",
                cursor_left: b"",
                cursor_right: b"",
                clr_eol: b"",
                clr_eos: b"",
                cursor_address: b"",
                enter_bold_mode: b"",
                exit_attribute_mode: b"",
                enter_underline_mode: b"",
                exit_underline_mode: b"",
                enter_standout_mode: b"",
                exit_standout_mode: b"",
                flash_screen: b"",
                scroll_reverse: b"",
                max_colors,
                auto_right_margin: false,
                eat_newline_glitch: false,
            },
        }
    }

    /// A terminal with no cursor motion degrades the renderer to a
    /// write-only `\r` + prompt + line path.
    pub fn is_dumb(&self) -> bool {
        self.cursor_up.is_empty()
            && self.cursor_down.is_empty()
            && self.cursor_left.is_empty()
            && self.cursor_right.is_empty()
    }

    /// Moving down also returns the cursor to column 0.
    pub fn cursor_down_is_newline(&self) -> bool {
        self.cursor_down == b"\n"
    }

    /// Look up any named capability: output caps first, then the key table.
    pub fn sequence_for_name(&self, name: &str) -> Option<&'static [u8]> {
        let seq = match name {
            "cursor_up" => self.cursor_up,
            "cursor_down" => self.cursor_down,
            "cursor_left" => self.cursor_left,
            "cursor_right" => self.cursor_right,
            "clr_eol" => self.clr_eol,
            "clr_eos" => self.clr_eos,
            "cursor_address" => self.cursor_address,
            "enter_bold_mode" => self.enter_bold_mode,
            "exit_attribute_mode" => self.exit_attribute_mode,
            "enter_underline_mode" => self.enter_underline_mode,
            "exit_underline_mode" => self.exit_underline_mode,
            "enter_standout_mode" => self.enter_standout_mode,
            "exit_standout_mode" => self.exit_standout_mode,
            "flash_screen" => self.flash_screen,
            "scroll_reverse" => self.scroll_reverse,
            _ => keys::sequence_for_key(self.family, name)?,
        };
        if seq.is_empty() { None } else { Some(seq) }
    }

    /// Reverse lookup over the fixed, priority-ordered key table.
    pub fn name_for_sequence(&self, seq: &[u8]) -> Option<&'static str> {
        keys::name_for_sequence(self.family, seq)
    }

    /// All known key names, optionally restricted to those with a sequence
    /// on this terminal.
    pub fn all_names(&self, skip_empty: bool) -> Vec<&'static str> {
        keys::all_names(self.family, skip_empty)
    }
}

fn classify(term: &str) -> Family {
    let base = term.split('-').next().unwrap_or(term);
    match base {
        "dumb" | "unknown" | "hardcopy" => Family::Dumb,
        "linux" | "cons25" => Family::Linux,
        _ => Family::Xterm,
    }
}

/// Expand the tiny tparm subset our capability strings use: `%i` (one-based
/// arguments), `%p1%d` / `%p2%d` (decimal substitution), `%%`.
pub fn expand_params(cap: &[u8], mut p1: i32, mut p2: i32) -> Vec<u8> {
    let mut out = Vec::with_capacity(cap.len() + 8);
    let mut i = 0;
    while i < cap.len() {
        if cap[i] != b'%' {
            out.push(cap[i]);
            i += 1;
            continue;
        }
        i += 1;
        match cap.get(i) {
            Some(b'%') => {
                out.push(b'%');
                i += 1;
            }
            Some(b'i') => {
                p1 += 1;
                p2 += 1;
                i += 1;
            }
            Some(b'p') => {
                // %pN%d
                let which = cap.get(i + 1).copied().unwrap_or(b'1');
                let val = if which == b'2' { p2 } else { p1 };
                i += 2;
                if cap.get(i) == Some(&b'%') && cap.get(i + 1) == Some(&b'd') {
                    i += 2;
                }
                out.extend_from_slice(val.to_string().as_bytes());
            }
            _ => i += 1,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn term_classification() {
        assert_eq!(classify("xterm-256color"), Family::Xterm);
        assert_eq!(classify("screen-256color"), Family::Xterm);
        assert_eq!(classify("linux"), Family::Linux);
        assert_eq!(classify("dumb"), Family::Dumb);
    }

    #[test]
    fn missing_term_is_fatal() {
        assert!(matches!(
            TermCaps::from_term(None),
            Err(TermSetupError::NoTermVariable)
        ));
        assert!(matches!(
            TermCaps::from_term(Some("")),
            Err(TermSetupError::Unusable(_))
        ));
    }

    #[test]
    fn dumb_terminal_has_no_motion() {
        let caps = TermCaps::from_term(Some("dumb")).unwrap();
        assert!(caps.is_dumb());
        assert_eq!(caps.sequence_for_name("cursor_up"), None);
    }

    #[test]
    fn xterm_is_not_dumb_and_eats_newlines() {
        let caps = TermCaps::from_term(Some("xterm-256color")).unwrap();
        assert!(!caps.is_dumb());
        assert!(caps.eat_newline_glitch);
        assert!(caps.auto_right_margin);
        assert!(caps.cursor_down_is_newline());
        assert_eq!(caps.max_colors, 256);
    }

    #[test]
    fn cursor_address_expansion() {
        let caps = TermCaps::from_term(Some("xterm")).unwrap();
        let seq = expand_params(caps.cursor_address, 4, 9);
        assert_eq!(seq, b"\x1b[5;10H".to_vec());
    }

    #[test]
    fn named_lookup_covers_keys_and_output_caps() {
        let caps = TermCaps::from_term(Some("xterm")).unwrap();
        assert_eq!(caps.sequence_for_name("clr_eol"), Some(b"\x1b[K".as_ref()));
        assert_eq!(caps.sequence_for_name("key_up"), Some(b"\x1bOA".as_ref()));
        assert_eq!(caps.sequence_for_name("no_such_cap"), None);
    }
}
