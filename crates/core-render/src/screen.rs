//! Differential screen updates.
//!
//! [`Screen`] keeps two copies of the world: `desired` (what this frame
//! should look like) and `actual` (what we know the terminal shows).
//! [`Screen::write_frame`] rebuilds `desired` from the prompt, command
//! line, colors, indents and autosuggestion, then reconciles, emitting
//! only what changed. After reconciliation `desired` is copied into
//! `actual` as one assignment.
//!
//! Soft-wrap bookkeeping: writing into the last column with auto-margin on
//! records the spot where the terminal will wrap for free; the next
//! character at that logical position inherits the cursor without an
//! explicit move, so the terminal's idea of the line stays unbroken.

use tracing::trace;

use core_term::color::ColorSpec;
use core_term::output::Outputter;
use core_text::{cp_width, measure_prompt};

use crate::layout::{INDENT_STEP, compute_layout};
use crate::screen_data::{Cursor, ScreenData, line_shared_prefix};

const MIN_USEFUL_WIDTH: usize = 4;
const ELLIPSIS: char = '…';

/// Everything one redraw needs.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub left_prompt: &'a str,
    pub right_prompt: &'a str,
    pub text: &'a [char],
    pub colors: &'a [u32],
    pub indents: &'a [i32],
    pub autosuggestion: &'a str,
    pub autosuggestion_color: u32,
    pub cursor: usize,
    pub screen_width: usize,
}

/// Retained render state, one per reader, never serialized.
pub struct Screen {
    desired: ScreenData,
    actual: ScreenData,
    actual_left_prompt: String,
    /// Where the terminal will put the cursor by itself after a write into
    /// the last column.
    soft_wrap_location: Option<Cursor>,
    actual_width: usize,
    last_right_prompt_width: usize,
    need_clear: bool,
    /// Rows that were on screen when an external reset invalidated us.
    lines_before_reset: usize,
}

impl Default for Screen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen {
    pub fn new() -> Self {
        Self {
            desired: ScreenData::default(),
            actual: ScreenData::default(),
            actual_left_prompt: String::new(),
            soft_wrap_location: None,
            actual_width: usize::MAX, // forces a clear on the first frame
            last_right_prompt_width: 0,
            need_clear: true,
            lines_before_reset: 0,
        }
    }

    /// What we believe the terminal shows. Test and diagnostic surface.
    pub fn actual(&self) -> &ScreenData {
        &self.actual
    }

    pub fn desired(&self) -> &ScreenData {
        &self.desired
    }

    /// Forget everything we believe about the terminal (external program
    /// wrote to it, SIGWINCH, reader push/pop).
    pub fn reset(&mut self, clear: bool) {
        self.lines_before_reset = self.lines_before_reset.max(self.actual.line_count());
        self.actual.clear();
        self.actual_left_prompt.clear();
        self.soft_wrap_location = None;
        if clear {
            self.need_clear = true;
        }
    }

    /// Build the desired screen for `frame` and reconcile the terminal.
    pub fn write_frame(&mut self, frame: &Frame<'_>, out: &mut Outputter) {
        // Dumb terminals get the write-only path: no diffing, no cursor
        // math, just carriage return + prompt + visible text.
        if out.caps().is_dumb() {
            out.carriage_return();
            out.write_str(frame.left_prompt);
            let text: String = frame.text.iter().collect();
            out.write_str(&text);
            return;
        }

        if frame.screen_width < MIN_USEFUL_WIDTH {
            return;
        }

        let screen_term = out.caps().term_name.starts_with("screen")
            || out.caps().term_name.starts_with("tmux");
        let layout = compute_layout(
            frame.screen_width,
            frame.left_prompt,
            frame.right_prompt,
            frame.text,
            frame.autosuggestion,
            frame.indents,
            screen_term,
        );

        self.build_desired(frame, &layout, out);
        self.update(
            &layout.left_prompt,
            &layout.right_prompt,
            frame.screen_width,
            out,
            screen_term,
        );
    }

    // -----------------------------------------------------------------
    // Desired-side construction
    // -----------------------------------------------------------------

    fn build_desired(
        &mut self,
        frame: &Frame<'_>,
        layout: &crate::layout::ScreenLayout,
        out: &mut Outputter,
    ) {
        let allow_soft_wrap = out.caps().auto_right_margin;
        self.desired.clear();

        let mut builder = DesiredBuilder {
            data: &mut self.desired,
            screen_width: frame.screen_width,
            allow_soft_wrap,
        };

        // Space reserved for the prompt on row 0.
        let default_color = normal_color();
        for _ in 0..layout.left_prompt_space {
            builder.append(' ', default_color, 0, layout.left_prompt_space);
        }
        let mut first_line_prompt_space = layout.left_prompt_space;
        if layout.prompts_get_own_line {
            builder.append('\n', default_color, 0, 0);
            first_line_prompt_space = 0;
        }

        let mut cursor = builder.data.cursor;
        let mut seen_cursor = false;

        for (i, &c) in frame.text.iter().enumerate() {
            if i == frame.cursor {
                cursor = builder.data.cursor;
                seen_cursor = true;
            }
            // The cell under the cursor keeps the default pen so the
            // hardware cursor stays readable.
            let color = if i == frame.cursor {
                default_color
            } else {
                frame.colors.get(i).copied().unwrap_or(default_color)
            };
            let indent = frame.indents.get(i).copied().unwrap_or(0);
            builder.append(c, color, indent, first_line_prompt_space);
        }
        if !seen_cursor {
            cursor = builder.data.cursor;
        }

        for c in layout.autosuggestion.chars() {
            builder.append(c, frame.autosuggestion_color, 0, first_line_prompt_space);
        }

        self.desired.cursor = cursor;
    }

    // -----------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------

    fn update(
        &mut self,
        left_prompt: &str,
        right_prompt: &str,
        screen_width: usize,
        out: &mut Outputter,
        screen_term: bool,
    ) {
        let left_prompt_width = measure_prompt(left_prompt, screen_term).width;
        let right_prompt_width = measure_prompt(right_prompt, screen_term).width;

        let mut need_clear = self.need_clear;
        self.need_clear = false;
        let mut has_cleared_screen = false;

        let lines_before_reset = self.lines_before_reset;
        self.lines_before_reset = 0;

        if self.actual_width != screen_width {
            need_clear = true;
            self.r#move(0, 0, out);
            self.actual_width = screen_width;
            self.reset(false);
        }

        let lines_with_stuff = lines_before_reset.max(self.actual.line_count());
        if lines_with_stuff > self.desired.line_count() {
            need_clear = true;
        }

        if left_prompt != self.actual_left_prompt {
            self.r#move(0, 0, out);
            out.write_str(left_prompt);
            self.actual_left_prompt = left_prompt.to_string();
            self.actual.cursor.x = left_prompt_width as i32;
        }

        for i in 0..self.desired.line_count() {
            let start_pos = if i == 0 { left_prompt_width } else { 0 };
            let mut current_width = 0usize;

            let should_clear_screen_this_line =
                need_clear && i + 1 == self.desired.line_count() && out.has_clr_eos();

            // Skip what is already correct: at least the prompt, and the
            // run of cells shared with the previous frame.
            let mut skip_remaining = start_pos;
            if !should_clear_screen_this_line {
                let o_line = self.desired.line(i);
                let shared = if i < self.actual.line_count() {
                    line_shared_prefix(o_line, self.actual.line(i))
                } else {
                    0
                };
                if shared > 0 {
                    let prefix_width: usize =
                        o_line.cells[..shared].iter().map(|&(c, _)| cp_width(c)).sum();
                    skip_remaining = skip_remaining.max(prefix_width);
                }
                // Keep the last two columns of a soft-wrapped row in play
                // so the wrap itself is re-established.
                if o_line.soft_wrapped {
                    skip_remaining = skip_remaining.min(screen_width.saturating_sub(2));
                }
            }

            // Convert the skip width into a cell index.
            let line_len = self.desired.line(i).len();
            let mut j = 0;
            while j < line_len {
                let w = cp_width(self.desired.line(i).char_at(j));
                if skip_remaining < w {
                    break;
                }
                skip_remaining -= w;
                current_width += w;
                j += 1;
            }
            // Never resume mid-composition: skip trailing zero-width cells.
            while j < line_len && cp_width(self.desired.line(i).char_at(j)) == 0 {
                j += 1;
            }

            // Clear before writing; clearing after would erase the last
            // character thanks to the sticky right margin.
            if should_clear_screen_this_line {
                self.r#move(current_width as i32, i as i32, out);
                out.clear_to_eos();
                has_cleared_screen = true;
            }

            while j < line_len {
                let (c, color) = self.desired.line(i).cells[j];
                self.perform_any_impending_soft_wrap(current_width as i32, i as i32);
                self.r#move(current_width as i32, i as i32, out);
                self.set_color(color, out);
                self.write_cell(c, out);
                current_width += cp_width(c);
                j += 1;
            }

            // Decide whether the tail of the previous frame's row needs
            // clear-to-eol.
            let clear_remainder = if has_cleared_screen {
                false
            } else if need_clear && current_width < screen_width {
                true
            } else if right_prompt_width < self.last_right_prompt_width {
                true
            } else if i < self.actual.line_count() {
                self.actual.line(i).width() > current_width
            } else {
                false
            };
            if clear_remainder {
                self.r#move(current_width as i32, i as i32, out);
                out.clear_to_eol();
            }

            if i == 0 && right_prompt_width > 0 {
                self.r#move((screen_width - right_prompt_width) as i32, 0, out);
                self.set_color(normal_color(), out);
                out.write_str(right_prompt);
                self.actual.cursor.x += right_prompt_width as i32;
                if out.caps().auto_right_margin {
                    // Sticky right edge: the cursor stays in the last
                    // column instead of advancing.
                    self.actual.cursor.x -= 1;
                }
            }
        }

        // Clear rows below the desired frame individually when clr_eos
        // did not already take care of them.
        if need_clear && !has_cleared_screen {
            for i in self.desired.line_count()..lines_with_stuff {
                self.r#move(0, i as i32, out);
                out.clear_to_eol();
            }
        }

        let (cx, cy) = (self.desired.cursor.x, self.desired.cursor.y);
        self.r#move(cx, cy, out);
        self.set_color(normal_color(), out);

        // Sync: one big assignment, never a partial copy.
        self.actual = self.desired.clone();
        self.last_right_prompt_width = right_prompt_width;
        trace!(target: "render.diff", rows = self.actual.line_count(), "frame reconciled");
    }

    /// Emit motion from the tracked actual cursor to (x, y).
    fn r#move(&mut self, new_x: i32, new_y: i32, out: &mut Outputter) {
        if self.actual.cursor.x == new_x && self.actual.cursor.y == new_y {
            return;
        }
        let y_steps = new_y - self.actual.cursor.y;
        if y_steps > 0 && out.caps().cursor_down_is_newline() {
            // A newline-style cud1 also carries the cursor to column 0.
            self.actual.cursor.x = 0;
        }
        out.move_relative(0, y_steps);

        let mut x_steps = new_x - self.actual.cursor.x;
        if x_steps != 0 && new_x == 0 {
            out.carriage_return();
            x_steps = 0;
        }
        out.move_relative(x_steps, 0);

        self.actual.cursor.x = new_x;
        self.actual.cursor.y = new_y;
    }

    fn set_color(&self, packed: u32, out: &mut Outputter) {
        let fg = ColorSpec::from_bits((packed & 0xFFFF) as u16);
        let bg = ColorSpec::from_bits((packed >> 16) as u16);
        out.set_color(fg, bg);
    }

    /// Write one cell, tracking the cursor and the spot where the
    /// terminal will soft wrap on its own.
    fn write_cell(&mut self, c: char, out: &mut Outputter) {
        self.actual.cursor.x += cp_width(c) as i32;
        out.write_char(c);
        if self.actual.cursor.x == self.actual_width as i32 && out.caps().auto_right_margin {
            self.soft_wrap_location = Some(Cursor {
                x: 0,
                y: self.actual.cursor.y + 1,
            });
            // Sticky right margin: the cursor holds in the last column.
            self.actual.cursor.x -= 1;
        } else {
            self.soft_wrap_location = None;
        }
    }

    /// About to write at (x, y): if the previous row soft-wraps exactly
    /// here, adopt the position without emitting any motion — the
    /// terminal has already wrapped for us.
    fn perform_any_impending_soft_wrap(&mut self, x: i32, y: i32) {
        if self.soft_wrap_location == Some(Cursor { x, y }) {
            let prev_wraps = y > 0
                && (y as usize - 1) < self.desired.line_count()
                && self.desired.line(y as usize - 1).soft_wrapped;
            if prev_wraps {
                self.actual.cursor = Cursor { x, y };
            }
        }
        self.soft_wrap_location = None;
    }
}

/// The packed "terminal default" color, used for the cursor cell and
/// after-frame pen reset.
pub fn normal_color() -> u32 {
    core_term::color::PackedColor::NORMAL.0
}

/// Builds the desired screen cell by cell, wrapping at the screen edge.
struct DesiredBuilder<'a> {
    data: &'a mut ScreenData,
    screen_width: usize,
    allow_soft_wrap: bool,
}

impl DesiredBuilder<'_> {
    fn append(&mut self, b: char, color: u32, indent: i32, prompt_width: usize) {
        match b {
            '\n' => {
                let y = self.data.cursor.y as usize;
                self.data.create_line(y).soft_wrapped = false;
                let count = self.data.line_count();
                self.data.create_line(count);
                self.data.cursor.y += 1;
                self.data.cursor.x = 0;
                let pad = prompt_width + indent.max(0) as usize * INDENT_STEP;
                for _ in 0..pad {
                    self.append(' ', normal_color(), indent, prompt_width);
                }
            }
            '\r' => {
                let y = self.data.cursor.y as usize;
                self.data.create_line(y).cells.clear();
                self.data.cursor.x = 0;
            }
            _ => {
                let cw = cp_width(b);
                let mut line_no = self.data.cursor.y as usize;
                self.data.create_line(line_no);

                // Without auto-margin the boundary column is reserved for
                // the explicit break marker.
                let row_limit = if self.allow_soft_wrap {
                    self.screen_width
                } else {
                    self.screen_width.saturating_sub(1)
                };
                if self.data.cursor.x as usize + cw > row_limit {
                    if self.allow_soft_wrap {
                        self.data.line_mut(self.data.cursor.y as usize).soft_wrapped = true;
                    } else {
                        // Hard wrap: mark the break explicitly and keep the
                        // rows disconnected.
                        let y = self.data.cursor.y as usize;
                        let line = self.data.line_mut(y);
                        line.soft_wrapped = false;
                        line.append(ELLIPSIS, normal_color());
                    }
                    self.data.add_line();
                    self.data.cursor.y += 1;
                    self.data.cursor.x = 0;
                    for _ in 0..prompt_width {
                        self.append(' ', normal_color(), indent, prompt_width);
                    }
                    line_no = self.data.cursor.y as usize;
                }

                self.data.create_line(line_no).append(b, color);
                self.data.cursor.x += cw as i32;

                // Wrap the cursor even when the cell exactly filled the
                // row, avoiding wonkiness in the last column.
                if self.data.cursor.x as usize >= self.screen_width {
                    if self.allow_soft_wrap {
                        self.data.line_mut(line_no).soft_wrapped = true;
                    }
                    self.data.cursor.x = 0;
                    self.data.cursor.y += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_term::caps::TermCaps;
    use core_term::output::{ByteSink, Outputter};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl ByteSink for SharedSink {
        fn write_bytes(&mut self, bytes: &[u8]) {
            self.0.lock().unwrap().extend_from_slice(bytes);
        }
    }

    fn outputter(term: &str) -> (Outputter, SharedSink) {
        let sink = SharedSink::default();
        let caps = TermCaps::from_term(Some(term)).unwrap();
        (Outputter::new(caps, Box::new(sink.clone())), sink)
    }

    fn drain(sink: &SharedSink) -> Vec<u8> {
        std::mem::take(&mut *sink.0.lock().unwrap())
    }

    fn frame<'a>(text: &'a [char], colors: &'a [u32], indents: &'a [i32]) -> Frame<'a> {
        Frame {
            left_prompt: "> ",
            right_prompt: "",
            text,
            colors,
            indents,
            autosuggestion: "",
            autosuggestion_color: 0,
            cursor: text.len(),
            screen_width: 80,
        }
    }

    fn simple_frame(text: &str) -> (Vec<char>, Vec<u32>, Vec<i32>) {
        let chars: Vec<char> = text.chars().collect();
        let colors = vec![normal_color(); chars.len()];
        let indents = vec![0; chars.len()];
        (chars, colors, indents)
    }

    #[test]
    fn render_converges_to_desired() {
        let (mut out, _sink) = outputter("xterm");
        let mut screen = Screen::new();
        let (chars, colors, indents) = simple_frame("echo hi");
        screen.write_frame(&frame(&chars, &colors, &indents), &mut out);
        assert_eq!(screen.actual(), screen.desired());
        let row: String = screen.actual().line(0).cells.iter().map(|&(c, _)| c).collect();
        assert_eq!(row, "  echo hi"); // two prompt spaces then the text
    }

    #[test]
    fn identical_frame_emits_zero_bytes() {
        let (mut out, sink) = outputter("xterm");
        let mut screen = Screen::new();
        let (chars, colors, indents) = simple_frame("ls -l");
        screen.write_frame(&frame(&chars, &colors, &indents), &mut out);
        drain(&sink);
        screen.write_frame(&frame(&chars, &colors, &indents), &mut out);
        assert_eq!(drain(&sink), Vec::<u8>::new());
    }

    #[test]
    fn dumb_terminal_writes_cr_prompt_line_only() {
        let (mut out, sink) = outputter("dumb");
        let mut screen = Screen::new();
        let (chars, colors, indents) = simple_frame("pwd");
        screen.write_frame(&frame(&chars, &colors, &indents), &mut out);
        assert_eq!(drain(&sink), b"\r> pwd".to_vec());
    }

    #[test]
    fn appending_emits_only_the_tail() {
        let (mut out, sink) = outputter("xterm");
        let mut screen = Screen::new();
        let (chars, colors, indents) = simple_frame("ech");
        screen.write_frame(&frame(&chars, &colors, &indents), &mut out);
        drain(&sink);

        let (chars, colors, indents) = simple_frame("echo");
        screen.write_frame(&frame(&chars, &colors, &indents), &mut out);
        let bytes = drain(&sink);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains('o'));
        assert!(!text.contains("ech"), "prefix was re-emitted: {text:?}");
    }

    #[test]
    fn width_change_forces_full_redraw() {
        let (mut out, sink) = outputter("xterm");
        let mut screen = Screen::new();
        let (chars, colors, indents) = simple_frame("stable");
        screen.write_frame(&frame(&chars, &colors, &indents), &mut out);
        drain(&sink);

        let mut narrow = frame(&chars, &colors, &indents);
        narrow.screen_width = 40;
        screen.write_frame(&narrow, &mut out);
        let text = String::from_utf8(drain(&sink)).unwrap();
        assert!(text.contains("stable"));
    }

    #[test]
    fn long_line_soft_wraps() {
        let (mut out, _sink) = outputter("xterm");
        let mut screen = Screen::new();
        let text: String = "x".repeat(100);
        let (chars, colors, indents) = simple_frame(&text);
        let mut f = frame(&chars, &colors, &indents);
        f.screen_width = 40;
        screen.write_frame(&f, &mut out);
        assert!(screen.actual().line_count() >= 2);
        assert!(screen.actual().line(0).soft_wrapped);
    }

    #[test]
    fn hard_wrap_breaks_with_ellipsis_when_auto_margin_is_off() {
        let sink = SharedSink::default();
        let mut caps = TermCaps::from_term(Some("xterm")).unwrap();
        caps.auto_right_margin = false;
        let mut out = Outputter::new(caps, Box::new(sink.clone()));

        let mut screen = Screen::new();
        let text: String = "y".repeat(60);
        let (chars, colors, indents) = simple_frame(&text);
        let mut f = frame(&chars, &colors, &indents);
        f.screen_width = 40;
        screen.write_frame(&f, &mut out);

        assert!(screen.actual().line_count() >= 2);
        let first = screen.actual().line(0);
        assert!(!first.soft_wrapped);
        assert_eq!(first.cells.last().map(|&(c, _)| c), Some('…'));
    }

    #[test]
    fn right_prompt_lands_at_the_right_edge() {
        let (mut out, sink) = outputter("xterm");
        let mut screen = Screen::new();
        let (chars, colors, indents) = simple_frame("cmd");
        let mut f = frame(&chars, &colors, &indents);
        f.right_prompt = "12:00";
        screen.write_frame(&f, &mut out);
        let text = String::from_utf8(drain(&sink)).unwrap();
        assert!(text.contains("12:00"));
    }

    #[test]
    fn shrinking_frame_clears_leftovers() {
        let (mut out, sink) = outputter("xterm");
        let mut screen = Screen::new();
        let (chars, colors, indents) = simple_frame("a long command line");
        screen.write_frame(&frame(&chars, &colors, &indents), &mut out);
        drain(&sink);

        let (chars, colors, indents) = simple_frame("a");
        screen.write_frame(&frame(&chars, &colors, &indents), &mut out);
        let bytes = drain(&sink);
        // clr_eol for the now-shorter row.
        let clear = b"\x1b[K";
        assert!(
            bytes.windows(clear.len()).any(|w| w == clear),
            "no clear-to-eol in {:?}",
            String::from_utf8_lossy(&bytes)
        );
    }

    #[test]
    fn multiline_command_renders_indented_rows() {
        let (mut out, _sink) = outputter("xterm");
        let mut screen = Screen::new();
        let chars: Vec<char> = "for x\nbody".chars().collect();
        let colors = vec![normal_color(); chars.len()];
        let mut indents = vec![0; chars.len()];
        // The newline and everything after it sit one level deep.
        for slot in indents.iter_mut().skip(5) {
            *slot = 1;
        }
        screen.write_frame(&frame(&chars, &colors, &indents), &mut out);
        assert_eq!(screen.actual().line_count(), 2);
        let row1: String = screen.actual().line(1).cells.iter().map(|&(c, _)| c).collect();
        // Continuation rows align under the prompt, then indent 4 per level.
        assert_eq!(row1, "      body");
    }
}
