//! Prompt measurement.
//!
//! Prompts arrive as strings with embedded escape sequences. Layout needs
//! their display width, which means recognizing the zero-width subset a
//! prompt may legitimately contain: SGR color and attribute sequences
//! (covering the 8/16-color setaf/setab forms, bold/underline/standout
//! toggles, and the 256-color `\e[38;5;Nm` / `\e[48;5;Nm` forms) and the
//! screen/tmux title envelope `\ek…\e\\`. Anything else after an escape is
//! skipped as zero width rather than poisoning the total.

use crate::width::{cp_width, next_tab_stop};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PromptMetrics {
    /// Display width of the last line.
    pub width: usize,
    /// Total line count (1 for a single-line prompt).
    pub line_count: usize,
}

/// Measure a prompt string. `screen_term` enables the `\ek…\e\\` envelope,
/// which only the screen/tmux family interprets.
pub fn measure_prompt(prompt: &str, screen_term: bool) -> PromptMetrics {
    let chars: Vec<char> = prompt.chars().collect();
    let mut width = 0usize;
    let mut line_count = 1usize;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\x1b' => i += measured_escape_len(&chars[i..], screen_term),
            '\t' => {
                width = next_tab_stop(width);
                i += 1;
            }
            '\n' => {
                width = 0;
                line_count += 1;
                i += 1;
            }
            '\r' => {
                width = 0;
                i += 1;
            }
            cp => {
                width += cp_width(cp);
                i += 1;
            }
        }
    }

    PromptMetrics { width, line_count }
}

/// Length in chars of the escape sequence starting at `chars[0] == ESC`.
fn measured_escape_len(chars: &[char], screen_term: bool) -> usize {
    debug_assert_eq!(chars.first(), Some(&'\x1b'));

    // Screen title envelope: swallow through `\e\\`, or to end of string
    // when unterminated.
    if screen_term && chars.get(1) == Some(&'k') {
        let mut i = 2;
        while i < chars.len() {
            if chars[i] == '\x1b' && chars.get(i + 1) == Some(&'\\') {
                return i + 2;
            }
            i += 1;
        }
        return chars.len();
    }

    // CSI ... final-byte. The SGR subset we expect ends in 'm'; any other
    // final byte still terminates the skip so one unknown sequence cannot
    // consume the rest of the prompt.
    if chars.get(1) == Some(&'[') {
        let mut i = 2;
        while i < chars.len() {
            let c = chars[i];
            if c.is_ascii_digit() || c == ';' || c == ':' || c == '?' {
                i += 1;
            } else {
                return i + 1;
            }
        }
        return chars.len();
    }

    // Two-character escapes (\eM and friends): skip both.
    if chars.len() >= 2 { 2 } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_prompt() {
        let m = measure_prompt("> ", false);
        assert_eq!(m, PromptMetrics { width: 2, line_count: 1 });
    }

    #[test]
    fn sgr_sequences_are_zero_width() {
        let m = measure_prompt("\x1b[32m~/src\x1b[0m> ", false);
        assert_eq!(m.width, 7);
    }

    #[test]
    fn term256_sequences_are_zero_width() {
        let m = measure_prompt("\x1b[38;5;196mred\x1b[0m", false);
        assert_eq!(m.width, 3);
    }

    #[test]
    fn multiline_prompt_measures_last_line() {
        let m = measure_prompt("user@host\n> ", false);
        assert_eq!(m, PromptMetrics { width: 2, line_count: 2 });
    }

    #[test]
    fn screen_envelope_skipped_only_on_screen() {
        let titled = "\x1bkwindow title\x1b\\$ ";
        assert_eq!(measure_prompt(titled, true).width, 2);
        // On non-screen terminals the envelope is not special; the two
        // escapes are skipped as unknowns and the title text is counted.
        assert!(measure_prompt(titled, false).width > 2);
    }

    #[test]
    fn tabs_advance_to_stops() {
        let m = measure_prompt("a\tb", false);
        assert_eq!(m.width, 9);
    }

    #[test]
    fn wide_chars_count_double() {
        assert_eq!(measure_prompt("魚> ", false).width, 4);
    }

    #[test]
    fn unterminated_escape_does_not_panic() {
        let m = measure_prompt("\x1b[38;5;1", false);
        assert_eq!(m.width, 0);
        let m = measure_prompt("\x1bkoops", true);
        assert_eq!(m.width, 0);
    }
}
