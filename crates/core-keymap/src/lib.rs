//! Binding tables and the longest-match resolution engine.
//!
//! A binding maps a key sequence to one or more named readline commands
//! within a mode, optionally switching to a new mode afterwards. Bindings
//! are partitioned into user and preset lists; user bindings shadow preset
//! ones, and within each list insertion order is the precedence.
//!
//! Resolution is deterministic: read provisionally through a [`Peeker`],
//! pick the longest binding whose sequence is a prefix of the pending
//! input (ties by insertion order), commit exactly the matched bytes, and
//! roll everything else back in order. A lone escape is disambiguated by
//! the queue's timed read: no follow-up byte within the delay means the
//! escape key itself was pressed.

mod peeker;
pub use peeker::Peeker;

use std::collections::HashSet;

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use core_events::{Event, InsertStyle, ReadlineCmd};
use core_input::CharQueue;

pub const DEFAULT_BIND_MODE: &str = "default";

pub type KeySeq = SmallVec<[char; 8]>;

/// One key binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Empty sequence marks the generic fallback binding.
    pub seq: KeySeq,
    pub mode: String,
    pub cmds: Vec<String>,
    pub sets_mode: Option<String>,
    pub user: bool,
}

impl Binding {
    pub fn is_generic(&self) -> bool {
        self.seq.is_empty()
    }

    /// Render in the binding DSL (`bind` listing form).
    fn dump_line(&self) -> String {
        let mut out = String::from("bind");
        if !self.user {
            out.push_str(" --preset");
        }
        if self.mode != DEFAULT_BIND_MODE {
            out.push_str(" -M ");
            out.push_str(&self.mode);
        }
        if let Some(new_mode) = &self.sets_mode {
            out.push_str(" -m ");
            out.push_str(new_mode);
        }
        out.push_str(" '");
        for &cp in &self.seq {
            match cp {
                '\x1b' => out.push_str("\\e"),
                '\r' => out.push_str("\\r"),
                '\n' => out.push_str("\\n"),
                c if (c as u32) < 32 => {
                    out.push_str("\\c");
                    out.push((c as u8 + b'a' - 1) as char);
                }
                c => out.push(c),
            }
        }
        out.push('\'');
        for cmd in &self.cmds {
            out.push(' ');
            out.push_str(cmd);
        }
        out
    }
}

/// The set of all mappings, user and preset.
#[derive(Debug, Default, Clone)]
pub struct BindingSet {
    user: Vec<Binding>,
    preset: Vec<Binding>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn list_mut(&mut self, user: bool) -> &mut Vec<Binding> {
        if user { &mut self.user } else { &mut self.preset }
    }

    /// Add or replace the binding for (seq, mode) in the given list.
    pub fn add(
        &mut self,
        seq: impl IntoIterator<Item = char>,
        mode: &str,
        cmds: Vec<String>,
        sets_mode: Option<String>,
        user: bool,
    ) {
        let seq: KeySeq = seq.into_iter().collect();
        let list = self.list_mut(user);
        if let Some(existing) = list
            .iter_mut()
            .find(|b| b.seq == seq && b.mode == mode)
        {
            existing.cmds = cmds;
            existing.sets_mode = sets_mode;
            return;
        }
        list.push(Binding {
            seq,
            mode: mode.to_string(),
            cmds,
            sets_mode,
            user,
        });
    }

    /// Remove the binding for (seq, mode). Returns whether one existed.
    pub fn erase(&mut self, seq: &[char], mode: &str, user: bool) -> bool {
        let list = self.list_mut(user);
        let before = list.len();
        list.retain(|b| !(b.seq.as_slice() == seq && b.mode == mode));
        list.len() != before
    }

    /// Erase all bindings, optionally restricted to one mode.
    pub fn clear(&mut self, mode: Option<&str>, user: bool) {
        let list = self.list_mut(user);
        match mode {
            Some(mode) => list.retain(|b| b.mode != mode),
            None => list.clear(),
        }
    }

    pub fn get(&self, seq: &[char], mode: &str, user: bool) -> Option<&Binding> {
        let list = if user { &self.user } else { &self.preset };
        list.iter().find(|b| b.seq.as_slice() == seq && b.mode == mode)
    }

    /// Bindings applicable in `mode`: user list first, then preset entries
    /// not shadowed by a user binding with the same sequence.
    pub fn for_mode(&self, mode: &str) -> Vec<&Binding> {
        let mut out: Vec<&Binding> = self.user.iter().filter(|b| b.mode == mode).collect();
        for preset in self.preset.iter().filter(|b| b.mode == mode) {
            if !out.iter().any(|u| u.seq == preset.seq) {
                out.push(preset);
            }
        }
        out
    }

    /// All bindings in DSL form, user bindings first.
    pub fn dump(&self) -> Vec<String> {
        self.user
            .iter()
            .chain(self.preset.iter())
            .map(Binding::dump_line)
            .collect()
    }
}

/// Resolution engine: owns the current bind mode and the once-per-name
/// diagnostic dedup for unknown command targets.
pub struct Keymapper {
    set: BindingSet,
    mode: String,
    warned_unknown: HashSet<String>,
}

impl Keymapper {
    pub fn new(set: BindingSet) -> Self {
        Self {
            set,
            mode: DEFAULT_BIND_MODE.to_string(),
            warned_unknown: HashSet::new(),
        }
    }

    pub fn bindings(&self) -> &BindingSet {
        &self.set
    }

    pub fn bindings_mut(&mut self) -> &mut BindingSet {
        &mut self.set
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn set_mode(&mut self, mode: &str) {
        self.mode = mode.to_string();
    }

    /// Read the next event, resolving bindings. Non-char events pass
    /// through untouched.
    pub fn read_event(&mut self, queue: &mut CharQueue) -> Event {
        loop {
            let mut peeker = Peeker::new(queue);
            let Some(first) = peeker.peek(0) else {
                // Timed out with nothing buffered; only possible when the
                // blocking first read itself returned nothing, which it
                // cannot. Treat as a wakeup.
                return Event::CheckExit;
            };
            if !first.is_char() {
                let evt = first.clone();
                peeker.commit(1);
                return evt;
            }

            match self.find_match(&mut peeker) {
                Some(matched) => {
                    let consumed = peeker.commit_matched(&matched);
                    drop(peeker); // release the queue for argument reads
                    let events = self.binding_events(&matched, &consumed, queue);
                    match events {
                        Some(evt) => return evt,
                        None => continue, // every target was unknown; keep reading
                    }
                }
                None => {
                    // No binding (not even generic): drop exactly one event.
                    let dropped = peeker.peek(0).cloned();
                    peeker.commit(1);
                    trace!(target: "input.bind", ?dropped, "no binding; event dropped");
                }
            }
        }
    }

    /// Longest match among the current mode's bindings; falls back to the
    /// generic binding consuming exactly one event.
    fn find_match(&self, peeker: &mut Peeker<'_>) -> Option<Binding> {
        let candidates = self.set.for_mode(&self.mode);
        let mut best: Option<&Binding> = None;
        let mut generic: Option<&Binding> = None;

        for binding in candidates {
            if binding.is_generic() {
                if generic.is_none() {
                    generic = Some(binding);
                }
                continue;
            }
            let longer = best.is_none_or(|b| binding.seq.len() > b.seq.len());
            if longer && peeker.matches(&binding.seq) {
                best = Some(binding);
            }
        }

        match best {
            Some(b) => Some(b.clone()),
            None => generic.cloned(),
        }
    }

    /// Translate a matched binding into events. The first event is
    /// returned; any additional ones are queued in order.
    fn binding_events(
        &mut self,
        binding: &Binding,
        consumed: &[char],
        queue: &mut CharQueue,
    ) -> Option<Event> {
        if let Some(new_mode) = &binding.sets_mode
            && *new_mode != self.mode
        {
            debug!(target: "input.bind", from = %self.mode, to = %new_mode, "bind mode change");
            self.mode = new_mode.clone();
        }

        let mut events: Vec<Event> = Vec::with_capacity(binding.cmds.len());
        for name in &binding.cmds {
            match ReadlineCmd::from_name(name) {
                Some(ReadlineCmd::SelfInsert) => {
                    for &cp in consumed {
                        events.push(Event::Char {
                            cp,
                            style: InsertStyle::Normal,
                        });
                    }
                }
                Some(ReadlineCmd::SelfInsertNotFirst) => {
                    for &cp in consumed {
                        events.push(Event::Char {
                            cp,
                            style: InsertStyle::NotFirst,
                        });
                    }
                }
                Some(cmd) => {
                    let arg = if cmd.wants_arg() {
                        self.read_arg(queue)
                    } else {
                        None
                    };
                    events.push(Event::Readline {
                        cmd,
                        seq: consumed.to_vec(),
                        arg,
                    });
                }
                None => {
                    if self.warned_unknown.insert(name.clone()) {
                        warn!(target: "input.bind", target_name = %name, "unknown binding target ignored");
                    }
                }
            }
        }

        let mut iter = events.into_iter();
        let first = iter.next()?;
        let rest: Vec<Event> = iter.collect();
        for evt in rest.into_iter().rev() {
            queue.push_front(evt);
        }
        Some(first)
    }

    /// One extra character argument for jump-style commands.
    fn read_arg(&mut self, queue: &mut CharQueue) -> Option<char> {
        let evt = queue.read_blocking();
        match evt {
            Event::Char { cp, .. } => Some(cp),
            other => {
                queue.push_front(other);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::os::fd::{AsRawFd, OwnedFd};

    fn pipe_queue() -> (CharQueue, OwnedFd, OwnedFd) {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        let mut queue = CharQueue::new(read_end.as_raw_fd());
        queue.set_escape_delay_ms(10);
        (queue, read_end, write_end)
    }

    fn write_all(fd: &OwnedFd, bytes: &[u8]) {
        let mut written = 0;
        while written < bytes.len() {
            written += nix::unistd::write(fd, &bytes[written..]).unwrap();
        }
    }

    fn cmds(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn mapper_with(bindings: &[(&str, &[&str])]) -> Keymapper {
        let mut set = BindingSet::new();
        for (seq, names) in bindings {
            set.add(seq.chars(), DEFAULT_BIND_MODE, cmds(names), None, true);
        }
        // Preset generic self-insert, like a real session.
        set.add([], DEFAULT_BIND_MODE, cmds(&["self-insert"]), None, false);
        Keymapper::new(set)
    }

    #[test]
    fn longest_match_wins() {
        let mut mapper = mapper_with(&[
            ("a", &["beginning-of-line"]),
            ("ab", &["end-of-line"]),
        ]);
        let (mut queue, _r, w) = pipe_queue();
        write_all(&w, b"ab");
        let evt = mapper.read_event(&mut queue);
        match evt {
            Event::Readline { cmd, seq, .. } => {
                assert_eq!(cmd, ReadlineCmd::EndOfLine);
                assert_eq!(seq, vec!['a', 'b']);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn shorter_match_leaves_the_tail_queued() {
        let mut mapper = mapper_with(&[
            ("a", &["beginning-of-line"]),
            ("ab", &["end-of-line"]),
        ]);
        let (mut queue, _r, w) = pipe_queue();
        write_all(&w, b"ac");
        let evt = mapper.read_event(&mut queue);
        assert!(matches!(
            evt,
            Event::Readline { cmd: ReadlineCmd::BeginningOfLine, .. }
        ));
        // The provisionally read 'c' was rolled back and self-inserts.
        assert_eq!(mapper.read_event(&mut queue), Event::plain('c'));
    }

    #[test]
    fn generic_binding_consumes_exactly_one_event() {
        let mut mapper = mapper_with(&[("abc", &["end-of-line"])]);
        let (mut queue, _r, w) = pipe_queue();
        write_all(&w, b"abd");
        // 'a' fails to extend into "abc", so the generic self-insert takes
        // it; then 'b' and 'd' follow one at a time.
        assert_eq!(mapper.read_event(&mut queue), Event::plain('a'));
        assert_eq!(mapper.read_event(&mut queue), Event::plain('b'));
        assert_eq!(mapper.read_event(&mut queue), Event::plain('d'));
    }

    #[test]
    fn lone_escape_is_delivered_as_escape() {
        let mut mapper = mapper_with(&[("\x1b[A", &["up-line"])]);
        let (mut queue, _r, w) = pipe_queue();
        write_all(&w, b"\x1b");
        // No follow-up within the delay: ESC self-inserts via the generic.
        assert_eq!(mapper.read_event(&mut queue), Event::plain('\x1b'));
    }

    #[test]
    fn escape_sequence_still_matches() {
        let mut mapper = mapper_with(&[("\x1b[A", &["up-line"])]);
        let (mut queue, _r, w) = pipe_queue();
        write_all(&w, b"\x1b[A");
        assert!(matches!(
            mapper.read_event(&mut queue),
            Event::Readline { cmd: ReadlineCmd::UpLine, .. }
        ));
    }

    #[test]
    fn user_binding_shadows_preset() {
        let mut set = BindingSet::new();
        set.add("q".chars(), DEFAULT_BIND_MODE, cmds(&["end-of-line"]), None, false);
        set.add("q".chars(), DEFAULT_BIND_MODE, cmds(&["beginning-of-line"]), None, true);
        let mut mapper = Keymapper::new(set);
        let (mut queue, _r, w) = pipe_queue();
        write_all(&w, b"q");
        assert!(matches!(
            mapper.read_event(&mut queue),
            Event::Readline { cmd: ReadlineCmd::BeginningOfLine, .. }
        ));
    }

    #[test]
    fn sets_mode_switches_future_lookups() {
        let mut set = BindingSet::new();
        set.add(
            "i".chars(),
            "command",
            cmds(&["repaint"]),
            Some("insert".to_string()),
            true,
        );
        set.add([], "insert", cmds(&["self-insert"]), None, false);
        let mut mapper = Keymapper::new(set);
        mapper.set_mode("command");
        let (mut queue, _r, w) = pipe_queue();
        write_all(&w, b"ix");
        assert!(matches!(
            mapper.read_event(&mut queue),
            Event::Readline { cmd: ReadlineCmd::Repaint, .. }
        ));
        assert_eq!(mapper.mode(), "insert");
        assert_eq!(mapper.read_event(&mut queue), Event::plain('x'));
    }

    #[test]
    fn multiple_commands_queue_in_order() {
        let mut mapper = mapper_with(&[("z", &["kill-line", "yank"])]);
        let (mut queue, _r, w) = pipe_queue();
        write_all(&w, b"z");
        assert!(matches!(
            mapper.read_event(&mut queue),
            Event::Readline { cmd: ReadlineCmd::KillLine, .. }
        ));
        assert!(matches!(
            mapper.read_event(&mut queue),
            Event::Readline { cmd: ReadlineCmd::Yank, .. }
        ));
    }

    #[test]
    fn unknown_target_is_skipped() {
        let mut mapper = mapper_with(&[("u", &["no-such-function"])]);
        let (mut queue, _r, w) = pipe_queue();
        write_all(&w, b"ux");
        // The binding matched but produced nothing; the next event comes
        // through normally.
        assert_eq!(mapper.read_event(&mut queue), Event::plain('x'));
    }

    #[test]
    fn jump_binding_reads_its_argument() {
        let mut mapper = mapper_with(&[("\x1bj", &["forward-jump"])]);
        let (mut queue, _r, w) = pipe_queue();
        write_all(&w, b"\x1bjX");
        match mapper.read_event(&mut queue) {
            Event::Readline {
                cmd: ReadlineCmd::ForwardJump,
                arg,
                ..
            } => assert_eq!(arg, Some('X')),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn erase_and_dump() {
        let mut set = BindingSet::new();
        set.add("\x1b[A".chars(), DEFAULT_BIND_MODE, cmds(&["up-line"]), None, true);
        set.add([], DEFAULT_BIND_MODE, cmds(&["self-insert"]), None, false);
        let lines = set.dump();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\\e[A"));
        assert!(lines[0].contains("up-line"));
        assert!(lines[1].contains("--preset"));
        assert!(set.erase(&['\x1b', '[', 'A'], DEFAULT_BIND_MODE, true));
        assert_eq!(set.dump().len(), 1);
    }
}
