//! Output primitives.
//!
//! [`Outputter`] turns the renderer's intentions (move, recolor, clear,
//! write a character) into bytes on a [`ByteSink`]. It keeps the color and
//! attribute state machine the terminal forces on us: leaving bold requires
//! a full attribute reset, a reset must re-establish a known foreground,
//! and indices beyond the classic palette fall back to the 256-color SGR
//! form.
//!
//! The sink can be swapped for a scratch buffer for the duration of a
//! scope ([`Outputter::buffered`]); the guard restores the previous sink on
//! every exit path, including unwinds.

use crate::caps::{TermCaps, expand_params};
use crate::color::ColorSpec;

/// Destination for emitted bytes.
pub trait ByteSink {
    fn write_bytes(&mut self, bytes: &[u8]);
}

/// Plain growable buffer sink.
#[derive(Debug, Default)]
pub struct VecSink(pub Vec<u8>);

impl ByteSink for VecSink {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }
}

impl ByteSink for Vec<u8> {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

enum Sink {
    External(Box<dyn ByteSink + Send>),
    Buffer(Vec<u8>),
}

impl Sink {
    fn write(&mut self, bytes: &[u8]) {
        match self {
            Sink::External(sink) => sink.write_bytes(bytes),
            Sink::Buffer(buf) => buf.extend_from_slice(bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AttrState {
    fg: ColorSpec,
    bg: ColorSpec,
    bold: bool,
    underline: bool,
}

impl AttrState {
    fn reset() -> Self {
        Self {
            fg: ColorSpec::NORMAL,
            bg: ColorSpec::NORMAL,
            bold: false,
            underline: false,
        }
    }
}

/// Emits control sequences and characters for one terminal.
pub struct Outputter {
    caps: TermCaps,
    sink: Sink,
    state: AttrState,
}

impl Outputter {
    pub fn new(caps: TermCaps, sink: Box<dyn ByteSink + Send>) -> Self {
        Self {
            caps,
            sink: Sink::External(sink),
            state: AttrState::reset(),
        }
    }

    pub fn caps(&self) -> &TermCaps {
        &self.caps
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.sink.write(bytes);
    }

    /// Encode one code point (UTF-8) into the sink.
    pub fn write_char(&mut self, cp: char) {
        let mut buf = [0u8; 4];
        self.sink.write(cp.encode_utf8(&mut buf).as_bytes());
    }

    pub fn write_str(&mut self, s: &str) {
        self.sink.write(s.as_bytes());
    }

    /// Emit relative cursor motion as repeated single-step capabilities.
    /// The caller owns position bookkeeping (including the newline-style
    /// `cursor_down` column reset).
    pub fn move_relative(&mut self, dx: i32, dy: i32) {
        let vertical: &[u8] = if dy < 0 {
            self.caps.cursor_up
        } else {
            self.caps.cursor_down
        };
        for _ in 0..dy.abs() {
            self.sink.write(vertical);
        }
        let horizontal: &[u8] = if dx < 0 {
            self.caps.cursor_left
        } else {
            self.caps.cursor_right
        };
        for _ in 0..dx.abs() {
            self.sink.write(horizontal);
        }
    }

    pub fn carriage_return(&mut self) {
        self.sink.write(b"\r");
    }

    /// Absolute addressing, when the capability exists.
    pub fn cursor_address(&mut self, x: i32, y: i32) {
        if !self.caps.cursor_address.is_empty() {
            let seq = expand_params(self.caps.cursor_address, y, x);
            self.sink.write(&seq);
        }
    }

    pub fn clear_to_eol(&mut self) {
        self.sink.write(self.caps.clr_eol);
    }

    pub fn clear_to_eos(&mut self) {
        self.sink.write(self.caps.clr_eos);
    }

    pub fn has_clr_eos(&self) -> bool {
        !self.caps.clr_eos.is_empty()
    }

    /// Reset the attribute state machine to "unknown default". Call after
    /// anything outside this struct may have touched the terminal.
    pub fn reset_attr_tracking(&mut self) {
        self.state = AttrState::reset();
    }

    /// Set foreground and background, emitting the minimum transition.
    pub fn set_color(&mut self, fg: ColorSpec, bg: ColorSpec) {
        if self.caps.exit_attribute_mode.is_empty() {
            return; // no attribute support at all
        }
        let want_bold = fg.is_bold() || bg.is_bold();
        let want_underline = fg.is_underline() || bg.is_underline();

        // The only way out of bold is a full attribute reset.
        if (self.state.bold && !want_bold) || (self.state.underline && !want_underline) {
            self.exit_attributes();
        }

        if self.state.fg != fg {
            match fg.index() {
                Some(idx) => self.write_fg_index(idx),
                None => {
                    // Back to default foreground: reset, then re-establish
                    // the background if one is still wanted.
                    self.exit_attributes();
                    if let Some(bg_idx) = bg.index() {
                        self.write_bg_index(bg_idx);
                        self.state.bg = bg;
                    }
                }
            }
            self.state.fg = fg;
        }

        if self.state.bg != bg {
            match bg.index() {
                Some(idx) => self.write_bg_index(idx),
                None => {
                    self.exit_attributes();
                    if let Some(fg_idx) = fg.index() {
                        self.write_fg_index(fg_idx);
                        self.state.fg = fg;
                    }
                }
            }
            self.state.bg = bg;
        }

        if want_bold && !self.state.bold {
            let bold = self.caps.enter_bold_mode;
            self.sink.write(bold);
            self.state.bold = true;
        }
        if want_underline && !self.state.underline {
            let underline = self.caps.enter_underline_mode;
            self.sink.write(underline);
            self.state.underline = true;
        }
    }

    fn exit_attributes(&mut self) {
        let reset = self.caps.exit_attribute_mode;
        self.sink.write(reset);
        self.state = AttrState::reset();
    }

    fn write_fg_index(&mut self, idx: u8) {
        let seq = sgr_color(idx, true, self.caps.max_colors);
        self.sink.write(&seq);
    }

    fn write_bg_index(&mut self, idx: u8) {
        let seq = sgr_color(idx, false, self.caps.max_colors);
        self.sink.write(&seq);
    }

    /// Run `body` with output redirected into a scratch buffer; the
    /// previous sink is restored afterwards regardless of how `body` exits,
    /// and the captured bytes are returned.
    pub fn buffered<R>(&mut self, body: impl FnOnce(&mut Outputter) -> R) -> (R, Vec<u8>) {
        let saved = std::mem::replace(&mut self.sink, Sink::Buffer(Vec::new()));
        let mut guard = SinkSwapGuard {
            out: self,
            saved: Some(saved),
        };
        let result = body(guard.out);
        let captured = guard.capture();
        (result, captured)
    }
}

/// Restores a swapped-out sink on drop. Created by [`Outputter::buffered`].
pub struct SinkSwapGuard<'a> {
    out: &'a mut Outputter,
    saved: Option<Sink>,
}

impl SinkSwapGuard<'_> {
    fn capture(&mut self) -> Vec<u8> {
        let saved = self.saved.take().expect("sink already restored");
        match std::mem::replace(&mut self.out.sink, saved) {
            Sink::Buffer(bytes) => bytes,
            Sink::External(_) => Vec::new(),
        }
    }
}

impl Drop for SinkSwapGuard<'_> {
    fn drop(&mut self) {
        // Unwind path: put the real sink back, discard the scratch.
        if let Some(saved) = self.saved.take() {
            self.out.sink = saved;
        }
    }
}

/// SGR bytes for one palette index. Indices 0..=7 use the classic 30/40
/// range, 8..=15 the bright 90/100 range on 16-color terminals, and
/// anything else the 256-color form.
fn sgr_color(idx: u8, is_fg: bool, max_colors: u32) -> Vec<u8> {
    if idx < 8 {
        let base = if is_fg { 30 } else { 40 };
        format!("\x1b[{}m", base + idx as u32).into_bytes()
    } else if idx < 16 && max_colors <= 16 {
        let base = if is_fg { 90 } else { 100 };
        format!("\x1b[{}m", base + (idx - 8) as u32).into_bytes()
    } else {
        let kind = if is_fg { 38 } else { 48 };
        format!("\x1b[{kind};5;{idx}m").into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::TermCaps;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl ByteSink for SharedSink {
        fn write_bytes(&mut self, bytes: &[u8]) {
            self.0.lock().unwrap().extend_from_slice(bytes);
        }
    }

    fn outputter() -> (Outputter, SharedSink) {
        let sink = SharedSink::default();
        let caps = TermCaps::from_term(Some("xterm-256color")).unwrap();
        (Outputter::new(caps, Box::new(sink.clone())), sink)
    }

    fn drain(sink: &SharedSink) -> Vec<u8> {
        std::mem::take(&mut *sink.0.lock().unwrap())
    }

    #[test]
    fn move_relative_emits_steps() {
        let (mut out, sink) = outputter();
        out.move_relative(2, -1);
        assert_eq!(drain(&sink), b"\x1b[A\x1b[C\x1b[C".to_vec());
        out.move_relative(-1, 0);
        assert_eq!(drain(&sink), b"\x08".to_vec());
    }

    #[test]
    fn color_state_machine_dedupes() {
        let (mut out, sink) = outputter();
        let blue = ColorSpec::indexed(4);
        out.set_color(blue, ColorSpec::NORMAL);
        out.set_color(blue, ColorSpec::NORMAL); // no transition, no bytes
        assert_eq!(drain(&sink), b"\x1b[34m".to_vec());
    }

    #[test]
    fn leaving_bold_resets_everything() {
        let (mut out, sink) = outputter();
        out.set_color(ColorSpec::indexed(1).bold(), ColorSpec::NORMAL);
        drain(&sink);
        out.set_color(ColorSpec::indexed(1), ColorSpec::NORMAL);
        let text = String::from_utf8(drain(&sink)).unwrap();
        assert!(text.starts_with("\x1b[0m"), "expected reset, got {text:?}");
        assert!(text.contains("\x1b[31m"), "fg must be re-established");
    }

    #[test]
    fn high_indices_use_256_color_form() {
        let (mut out, sink) = outputter();
        out.set_color(ColorSpec::indexed(160), ColorSpec::NORMAL);
        assert_eq!(drain(&sink), b"\x1b[38;5;160m".to_vec());
    }

    #[test]
    fn buffered_captures_and_restores() {
        let (mut out, sink) = outputter();
        let ((), captured) = out.buffered(|o| {
            o.write_str("hidden");
        });
        assert_eq!(captured, b"hidden".to_vec());
        assert!(drain(&sink).is_empty());
        out.write_str("visible");
        assert_eq!(drain(&sink), b"visible".to_vec());
    }

    #[test]
    fn cursor_address_is_one_based_on_the_wire() {
        let (mut out, sink) = outputter();
        out.cursor_address(0, 0);
        assert_eq!(drain(&sink), b"\x1b[1;1H".to_vec());
    }
}
