//! Horizontal space allocation.
//!
//! Four layouts are tried in order; the first that fits wins:
//!
//! 1. left prompt + right prompt + first command line + full
//!    autosuggestion, with 10 columns of slack;
//! 2. same, but the autosuggestion truncated to the available space
//!    (at least 2 columns) and finished with an ellipsis;
//! 3. left prompt + command line only;
//! 4. the prompts get their own line above the command line.
//!
//! If the prompts alone cannot fit, the right prompt is dropped first and
//! then the left prompt collapses to `"> "`.

use core_text::{cp_width, measure_prompt};

pub const INDENT_STEP: usize = 4;
const ELLIPSIS: char = '…';

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenLayout {
    pub left_prompt: String,
    pub left_prompt_space: usize,
    pub right_prompt: String,
    /// Possibly truncated; empty when it does not fit at all.
    pub autosuggestion: String,
    pub prompts_get_own_line: bool,
}

/// Width of each line of the command text, with indentation applied to
/// continuation lines.
fn command_line_widths(commandline: &[char], indents: &[i32]) -> Vec<usize> {
    let mut widths = vec![0usize];
    for (i, &c) in commandline.iter().enumerate() {
        if c == '\n' {
            let indent = indents.get(i).copied().unwrap_or(0).max(0) as usize;
            widths.push(indent * INDENT_STEP);
        } else {
            *widths.last_mut().unwrap() += cp_width(c);
        }
    }
    widths
}

pub fn compute_layout(
    screen_width: usize,
    left_prompt: &str,
    right_prompt: &str,
    commandline: &[char],
    autosuggestion: &str,
    indents: &[i32],
    screen_term: bool,
) -> ScreenLayout {
    let mut left_prompt = left_prompt.to_string();
    let mut right_prompt = right_prompt.to_string();
    let mut left_width = measure_prompt(&left_prompt, screen_term).width;
    let mut right_width = measure_prompt(&right_prompt, screen_term).width;

    // The prompts themselves must fit before anything else gets space.
    if left_width + right_width >= screen_width {
        right_prompt.clear();
        right_width = 0;
    }
    if left_width + right_width >= screen_width {
        left_prompt = "> ".to_string();
        left_width = 2;
    }

    let line_widths = command_line_widths(commandline, indents);
    let first_line_width = line_widths[0];
    let multiline = line_widths.len() > 1;

    // Suggestions never show on multiline edits.
    let autosuggestion = if multiline { "" } else { autosuggestion };
    let suggestion_width: usize = autosuggestion.chars().map(cp_width).sum();

    let mut result = ScreenLayout {
        left_prompt: left_prompt.clone(),
        left_prompt_space: left_width,
        ..Default::default()
    };

    // Layout 1: everything, with slack.
    if left_width + right_width + first_line_width + suggestion_width + 10 < screen_width {
        result.right_prompt = right_prompt;
        result.autosuggestion = autosuggestion.to_string();
        return result;
    }

    // Layout 2: truncate the suggestion into whatever is left. Strict
    // inequality keeps at least one space before the right prompt.
    if left_width + right_width + first_line_width < screen_width {
        result.right_prompt = right_prompt;
        let available = screen_width - (left_width + right_width + first_line_width);
        if suggestion_width > 0 && available > 2 {
            result.autosuggestion = truncate_to_width(autosuggestion, available - 2);
            result.autosuggestion.push(ELLIPSIS);
        }
        return result;
    }

    // Layout 3: no right prompt, no suggestion.
    if left_width + first_line_width < screen_width {
        return result;
    }

    // Layout 4: prompts on their own line.
    result.right_prompt = right_prompt;
    result.prompts_get_own_line = true;
    result
}

/// Longest prefix of `s` that fits in `max_width` columns.
fn truncate_to_width(s: &str, max_width: usize) -> String {
    let mut width = 0;
    let mut out = String::new();
    for c in s.chars() {
        let w = cp_width(c);
        if width + w > max_width {
            break;
        }
        width += w;
        out.push(c);
    }
    out
}
