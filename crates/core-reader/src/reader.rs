//! The reader loop.
//!
//! One instance owns the char queue, the binding engine, the worker pool,
//! and a stack of per-push editor states. `read_line` drives the
//! read → edit → merge → render cycle until Execute commits a complete
//! buffer or input ends; interactive errors never escape it.

use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tracing::{debug, info, trace, warn};

use core_edit::{EditContext, EditorState, Outcome, SyntaxStatus};
use core_events::jobs::JobPool;
use core_events::{Completion, CompletionFlags, Event, InsertStyle};
use core_history::{History, HistoryItem};
use core_input::CharQueue;
use core_keymap::Keymapper;
use core_render::screen::{Frame, Screen};
use core_term::TermCaps;
use core_term::output::{ByteSink, Outputter};

use crate::autosuggest::{self, SuggestInput};
use crate::bindings::preset_bindings;
use crate::config::ReaderConfig;
use crate::contract::{
    Completer, EnvProvider, Highlighter, PathProber, Prompter, SpecialSuggester, SyntaxTester,
    UvarNotifier,
};
use crate::jobs::JobOutcome;

/// Printable-burst coalescing cap.
const READAHEAD_MAX: usize = 256;
const JOB_POOL_THREADS: usize = 2;

/// Shared handles to the external machinery.
#[derive(Clone)]
pub struct Collaborators {
    pub syntax: Arc<dyn SyntaxTester>,
    pub completer: Arc<dyn Completer>,
    pub highlighter: Arc<dyn Highlighter>,
    pub env: Arc<dyn EnvProvider>,
    pub uvar: Arc<dyn UvarNotifier>,
    pub prober: Arc<dyn PathProber>,
    pub special: Arc<dyn SpecialSuggester>,
}

impl Collaborators {
    /// Everything stubbed out; useful for tests and key-dump mode.
    pub fn null() -> Self {
        use crate::contract::NullCollaborator;
        Self {
            syntax: Arc::new(NullCollaborator),
            completer: Arc::new(NullCollaborator),
            highlighter: Arc::new(NullCollaborator),
            env: Arc::new(NullCollaborator),
            uvar: Arc::new(NullCollaborator),
            prober: Arc::new(NullCollaborator),
            special: Arc::new(NullCollaborator),
        }
    }
}

/// How to get the shared history store for a name. Tests swap this for an
/// in-memory factory.
pub type HistoryFactory = Box<dyn Fn(&str) -> Arc<History> + Send>;

pub struct ReaderOptions {
    pub in_fd: RawFd,
    pub out_fd: RawFd,
    pub caps: TermCaps,
    pub collab: Collaborators,
    pub config: ReaderConfig,
    pub interrupted: Arc<AtomicBool>,
    pub history_factory: HistoryFactory,
}

/// Per-push editor state: its own edit core, screen, and history binding.
struct ReaderData {
    editor: EditorState,
    screen: Screen,
    history: Arc<History>,
    dirty: bool,
}

impl ReaderData {
    fn new(history: Arc<History>) -> Self {
        Self {
            editor: EditorState::new(history.clone()),
            screen: Screen::new(),
            history,
            dirty: true,
        }
    }
}

/// Adapter giving the edit core its collaborators.
struct CollabContext {
    collab: Collaborators,
}

impl EditContext for CollabContext {
    fn test_syntax(&mut self, text: &str) -> SyntaxStatus {
        self.collab.syntax.test_syntax(text)
    }

    fn complete(&mut self, text: &str, cursor: usize, flags: CompletionFlags) -> Vec<Completion> {
        self.collab.completer.complete(text, cursor, flags)
    }

    fn compute_indents(&self, text: &str) -> Vec<i32> {
        self.collab.syntax.compute_indents(text)
    }
}

pub struct Reader {
    queue: CharQueue,
    keymapper: Keymapper,
    pool: JobPool<JobOutcome>,
    out: Outputter,
    out_fd: RawFd,
    collab: Collaborators,
    config: ReaderConfig,
    ctx: CollabContext,
    stack: Vec<ReaderData>,
    interrupted: Arc<AtomicBool>,
    history_factory: HistoryFactory,
}

/// Sink that writes straight to a fd, retrying `EINTR` and logging (but
/// surviving) anything else; rendering is best-effort.
struct FdSink {
    fd: RawFd,
}

impl ByteSink for FdSink {
    fn write_bytes(&mut self, bytes: &[u8]) {
        let mut rest = bytes;
        while !rest.is_empty() {
            match nix::unistd::write(unsafe { std::os::fd::BorrowedFd::borrow_raw(self.fd) }, rest)
            {
                Ok(n) => rest = &rest[n..],
                Err(nix::errno::Errno::EINTR) => continue,
                Err(err) => {
                    warn!(target: "reader.loop", %err, "terminal write failed");
                    return;
                }
            }
        }
    }
}

impl Reader {
    pub fn new(opts: ReaderOptions) -> Result<Self> {
        let mut queue = CharQueue::new(opts.in_fd);
        if let Some(delay) = opts.config.escape_delay_ms {
            queue.set_escape_delay_ms(delay);
        }

        let pool: JobPool<JobOutcome> = JobPool::spawn(JOB_POOL_THREADS)?;
        queue.add_side_channel(pool.notify_fd());
        if let Some(fd) = opts.collab.uvar.notification_fd() {
            queue.add_side_channel(fd);
        }
        queue.set_poll_interval_ms(opts.collab.uvar.poll_interval_ms());

        let keymapper = Keymapper::new(preset_bindings(&opts.caps));
        let out = Outputter::new(opts.caps, Box::new(FdSink { fd: opts.out_fd }));

        let mut reader = Self {
            queue,
            keymapper,
            pool,
            out,
            out_fd: opts.out_fd,
            ctx: CollabContext {
                collab: opts.collab.clone(),
            },
            collab: opts.collab,
            config: opts.config,
            stack: Vec::new(),
            interrupted: opts.interrupted,
            history_factory: opts.history_factory,
        };
        let name = reader.config.history_name.clone();
        reader.push(&name);
        info!(target: "reader.loop", history = %name, "reader ready");
        Ok(reader)
    }

    /// Enter a nested reader with its own edit state and history binding.
    pub fn push(&mut self, history_name: &str) {
        let history = (self.history_factory)(history_name);
        self.stack.push(ReaderData::new(history));
        debug!(target: "reader.loop", depth = self.stack.len(), "reader push");
    }

    /// Return to the previous reader. The bottom entry stays.
    pub fn pop(&mut self) -> bool {
        if self.stack.len() > 1 {
            self.stack.pop();
            if let Some(data) = self.stack.last_mut() {
                data.screen.reset(true);
                data.dirty = true;
            }
            true
        } else {
            false
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn keymapper_mut(&mut self) -> &mut Keymapper {
        &mut self.keymapper
    }

    /// Current editor, for embedding and tests.
    pub fn editor(&self) -> &EditorState {
        &self.stack.last().expect("reader stack never empty").editor
    }

    /// One interactive line. `Ok(Some(text))` on commit, `Ok(None)` on end
    /// of input. Interactive errors are logged, never returned.
    pub fn read_line(&mut self, prompter: &mut dyn Prompter) -> Result<Option<String>> {
        // A previously committed line is real once we are asked for the
        // next one.
        self.top().history.resolve_pending();

        let left_prompt = prompter.left_prompt();
        let right_prompt = prompter.right_prompt();
        self.top().dirty = true;

        loop {
            self.drain_jobs();
            self.maybe_repaint(&left_prompt, &right_prompt);

            // Buffered wakeups outrank buffered characters.
            self.queue.promote_interruptions();

            let before_generation = self.top().editor.generation();
            let event = self.keymapper.read_event(&mut self.queue);

            let outcome = match event {
                Event::Eof => {
                    debug!(target: "reader.loop", "eof");
                    return Ok(None);
                }
                Event::CheckExit => {
                    self.handle_wakeup();
                    continue;
                }
                Event::Char {
                    cp,
                    style: InsertStyle::Normal,
                } if !cp.is_control() => self.insert_coalesced(cp),
                other => {
                    let data = self.stack.last_mut().expect("reader stack never empty");
                    data.editor.apply(&other, &mut self.ctx)
                }
            };

            if let Some(text) = outcome.commit {
                self.finish_line(&left_prompt, &right_prompt, &text);
                return Ok(Some(text));
            }
            if outcome.exit {
                return Ok(None);
            }
            if outcome.repaint {
                self.top().dirty = true;
            }
            if outcome.force_repaint {
                let data = self.stack.last_mut().expect("reader stack never empty");
                data.screen.reset(true);
                data.dirty = true;
            }

            if self.top().editor.generation() != before_generation {
                self.submit_jobs();
            }
        }
    }

    fn top(&mut self) -> &mut ReaderData {
        self.stack.last_mut().expect("reader stack never empty")
    }

    /// Accumulate a burst of printable characters into one insertion so a
    /// paste does not pay per-character repaints.
    fn insert_coalesced(&mut self, first: char) -> Outcome {
        let mut burst = String::new();
        burst.push(first);
        while burst.chars().count() < READAHEAD_MAX
            && (self.queue.pending_len() > 0 || self.queue.byte_available())
        {
            match self.keymapper.read_event(&mut self.queue) {
                Event::Char {
                    cp,
                    style: InsertStyle::Normal,
                } if !cp.is_control() => burst.push(cp),
                other => {
                    self.queue.push_front(other);
                    break;
                }
            }
        }
        trace!(target: "reader.loop", len = burst.chars().count(), "insert burst");
        let data = self.stack.last_mut().expect("reader stack never empty");
        data.editor.insert_at_cursor(&burst, &mut self.ctx);
        Outcome {
            repaint: true,
            ..Default::default()
        }
    }

    /// A side channel fired or a signal interrupted the wait.
    fn handle_wakeup(&mut self) {
        if self.interrupted.swap(false, Ordering::SeqCst) {
            // Ctrl-C: drop the current line, leave history alone.
            debug!(target: "reader.loop", "interrupt: line cleared");
            let data = self.stack.last_mut().expect("reader stack never empty");
            data.editor.reset_line(&mut self.ctx);
            data.dirty = true;
        }
        if self.collab.uvar.drain() {
            // Shared variables changed: re-read config, retune the escape
            // delay, and refresh colors against the new environment.
            self.config.refresh(self.collab.env.as_ref());
            if let Some(delay) = self.config.escape_delay_ms {
                self.queue.set_escape_delay_ms(delay);
            }
            self.submit_jobs();
        }
        self.drain_jobs();
    }

    fn maybe_repaint(&mut self, left_prompt: &str, right_prompt: &str) {
        // Window size may have changed since the last frame.
        if let Some(width) = self
            .collab
            .env
            .get("COLUMNS")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&w| w > 0)
        {
            self.config.screen_width = width;
        }

        let data = self.stack.last_mut().expect("reader stack never empty");
        if !data.dirty {
            return;
        }
        data.dirty = false;

        let text = data.editor.buffer();
        let suggestion_tail: String = data
            .editor
            .autosuggestion()
            .chars()
            .skip(text.len())
            .collect();
        let frame = Frame {
            left_prompt,
            right_prompt,
            text,
            colors: data.editor.colors(),
            indents: data.editor.indents(),
            autosuggestion: &suggestion_tail,
            autosuggestion_color: self.config.autosuggestion_color,
            cursor: data.editor.cursor(),
            screen_width: self.config.screen_width,
        };
        let ((), bytes) = self.out.buffered(|o| data.screen.write_frame(&frame, o));
        FdSink { fd: self.out_fd }.write_bytes(&bytes);
    }

    /// Paint the final state of an accepted line, move to a fresh row, and
    /// record history.
    fn finish_line(&mut self, left_prompt: &str, right_prompt: &str, text: &str) {
        self.top().dirty = true;
        self.maybe_repaint(left_prompt, right_prompt);
        FdSink { fd: self.out_fd }.write_bytes(b"\r\n");

        let tokens: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        let mut item = HistoryItem::new(text);
        item.required_paths = self.collab.prober.existing_paths(&tokens);

        let data = self.stack.last_mut().expect("reader stack never empty");
        data.history.add_pending(item);
        if let Err(err) = data.history.save() {
            // Already rate-limited and logged by the store; keep going.
            trace!(target: "reader.loop", %err, "history save deferred");
        }
        data.editor.reset_line(&mut self.ctx);
        data.screen = Screen::new();
    }

    /// Queue highlight and autosuggestion work for the current buffer.
    fn submit_jobs(&mut self) {
        let generation = self.top().editor.generation();
        let text = self.top().editor.text();
        let cursor = self.top().editor.cursor();

        let highlighter = self.collab.highlighter.clone();
        let env = self.collab.env.snapshot();
        let highlight_text = text.clone();
        self.pool.submit(move || {
            let colors = highlighter.highlight(&highlight_text, cursor, &env);
            JobOutcome::Highlight {
                generation,
                text: highlight_text,
                colors,
            }
        });

        let history = self.top().history.clone();
        let completer = self.collab.completer.clone();
        let prober = self.collab.prober.clone();
        let special = self.collab.special.clone();
        self.pool.submit(move || {
            let input = SuggestInput {
                text: text.clone(),
                cursor,
            };
            let suggestion = autosuggest::compute(
                &input,
                &history,
                special.as_ref(),
                completer.as_ref(),
                prober.as_ref(),
            );
            JobOutcome::Autosuggest { text, suggestion }
        });
    }

    /// Merge completed background work; stale results are dropped inside
    /// the editor's merge steps.
    fn drain_jobs(&mut self) {
        for outcome in self.pool.drain() {
            let data = self.stack.last_mut().expect("reader stack never empty");
            match outcome {
                JobOutcome::Highlight {
                    generation,
                    text,
                    colors,
                } => {
                    if data.editor.apply_colors(generation, &text, colors) {
                        data.dirty = true;
                    }
                }
                JobOutcome::Autosuggest { text, suggestion } => {
                    if let Some(suggestion) = suggestion
                        && data.editor.offer_autosuggestion(&text, &suggestion)
                    {
                        data.dirty = true;
                    }
                }
            }
        }
    }
}
