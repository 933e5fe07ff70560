//! Preset key bindings.
//!
//! The stock emacs-flavored table every session starts from. Terminal
//! capability sequences are resolved through the adapter where one
//! exists; the common raw CSI spellings are bound alongside, because
//! plenty of terminals send them regardless of what the capability table
//! says.

use core_keymap::{BindingSet, DEFAULT_BIND_MODE};
use core_term::TermCaps;

fn seq_of(bytes: &[u8]) -> Vec<char> {
    String::from_utf8_lossy(bytes).chars().collect()
}

/// Build the preset binding list for `caps`.
pub fn preset_bindings(caps: &TermCaps) -> BindingSet {
    let mut set = BindingSet::new();
    let mut bind = |seq: &[u8], cmds: &[&str]| {
        set.add(
            seq_of(seq),
            DEFAULT_BIND_MODE,
            cmds.iter().map(|s| s.to_string()).collect(),
            None,
            false,
        );
    };

    // The generic fallback: anything unclaimed inserts itself.
    bind(b"", &["self-insert"]);

    bind(b"\n", &["execute"]);
    bind(b"\r", &["execute"]);
    bind(b"\t", &["complete"]);

    bind(b"\x7f", &["backward-delete-char"]);
    bind(b"\x08", &["backward-delete-char"]);
    bind(b"\x01", &["beginning-of-line"]);
    bind(b"\x05", &["end-of-line"]);
    bind(b"\x02", &["backward-char"]);
    bind(b"\x06", &["forward-char"]);
    bind(b"\x04", &["delete-or-exit"]);
    bind(b"\x0b", &["kill-line"]);
    bind(b"\x15", &["backward-kill-line"]);
    bind(b"\x17", &["backward-kill-word"]);
    bind(b"\x19", &["yank"]);
    bind(b"\x0c", &["force-repaint"]);
    bind(b"\x14", &["transpose-chars"]);

    // Escape-prefixed (alt) combinations.
    bind(b"\x1by", &["yank-pop"]);
    bind(b"\x1bb", &["backward-word"]);
    bind(b"\x1bf", &["forward-word"]);
    bind(b"\x1bd", &["kill-word"]);
    bind(b"\x1b\x7f", &["backward-kill-word"]);
    bind(b"\x1bt", &["transpose-words"]);
    bind(b"\x1bu", &["upcase-word"]);
    bind(b"\x1bl", &["downcase-word"]);
    bind(b"\x1bc", &["capitalize-word"]);

    // Cursor and editing keys: capability sequence plus raw CSI form.
    let mut bind_key = |name: &str, raw: &[u8], cmds: &[&str]| {
        if let Some(seq) = caps.sequence_for_name(name) {
            let seq = seq.to_vec();
            set.add(
                seq_of(&seq),
                DEFAULT_BIND_MODE,
                cmds.iter().map(|s| s.to_string()).collect(),
                None,
                false,
            );
        }
        if !raw.is_empty() {
            set.add(
                seq_of(raw),
                DEFAULT_BIND_MODE,
                cmds.iter().map(|s| s.to_string()).collect(),
                None,
                false,
            );
        }
    };

    bind_key("key_up", b"\x1b[A", &["history-search-backward"]);
    bind_key("key_down", b"\x1b[B", &["history-search-forward"]);
    bind_key("key_right", b"\x1b[C", &["forward-char"]);
    bind_key("key_left", b"\x1b[D", &["backward-char"]);
    bind_key("key_home", b"\x1b[H", &["beginning-of-line"]);
    bind_key("key_end", b"\x1b[F", &["end-of-line"]);
    bind_key("key_dc", b"", &["delete-char"]);
    bind_key("key_ppage", b"", &["beginning-of-history"]);
    bind_key("key_npage", b"", &["end-of-history"]);
    bind_key("key_btab", b"", &["complete-and-search"]);

    // Token history search on alt-arrows, both modifier spellings.
    bind_key("", b"\x1b[1;3A", &["history-token-search-backward"]);
    bind_key("", b"\x1b[1;3B", &["history-token-search-forward"]);
    bind_key("", b"\x1b\x1b[A", &["history-token-search-backward"]);
    bind_key("", b"\x1b\x1b[B", &["history-token-search-forward"]);

    // Word hops on ctrl/alt-arrows.
    bind_key("", b"\x1b[1;5C", &["forward-word"]);
    bind_key("", b"\x1b[1;5D", &["backward-word"]);
    bind_key("", b"\x1b[1;3C", &["forward-word"]);
    bind_key("", b"\x1b[1;3D", &["backward-word"]);

    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_covers_the_basics() {
        let caps = TermCaps::from_term(Some("xterm")).unwrap();
        let set = preset_bindings(&caps);
        let lines = set.dump();
        for needle in [
            "execute",
            "self-insert",
            "history-search-backward",
            "backward-kill-word",
            "yank-pop",
        ] {
            assert!(
                lines.iter().any(|l| l.contains(needle)),
                "missing {needle} in preset dump"
            );
        }
    }

    #[test]
    fn capability_and_raw_arrow_both_bound() {
        let caps = TermCaps::from_term(Some("xterm")).unwrap();
        let set = preset_bindings(&caps);
        // Terminfo spelling (SS3) and the raw CSI spelling.
        assert!(set.get(&['\x1b', 'O', 'A'], DEFAULT_BIND_MODE, false).is_some());
        assert!(set.get(&['\x1b', '[', 'A'], DEFAULT_BIND_MODE, false).is_some());
    }
}
