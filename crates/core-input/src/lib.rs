//! The char queue: raw bytes in, [`Event`]s out.
//!
//! Single-threaded and cooperatively blocked: the only place the main
//! thread ever sleeps is the `poll(2)` in here, over the input fd plus any
//! registered side channels (job-completion pipe, uvar notifier). A side
//! channel becoming readable hands control back to the caller as
//! `CheckExit`; this queue never consumes side-channel bytes itself.
//!
//! Events pushed to the front are returned before any byte is read, which
//! is how the binding engine's peeker rolls back a failed longest-match.

use std::collections::VecDeque;
use std::os::fd::{BorrowedFd, RawFd};
use std::sync::atomic::Ordering::Relaxed;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout};
use tracing::{trace, warn};

use core_events::{EVENTS_PUSHED_BACK, Event};

pub mod decode;
use decode::{Decoded, Utf8Decoder};

/// Default wait after a lone ESC before deciding it was the escape key.
pub const WAIT_ON_ESCAPE_DEFAULT_MS: u64 = 30;
/// Clamp bounds for the user-configured escape delay.
pub const WAIT_ON_ESCAPE_MIN_MS: u64 = 10;
pub const WAIT_ON_ESCAPE_MAX_MS: u64 = 5000;

enum RawRead {
    Byte(u8),
    Eof,
    /// A side channel fired, the poll interval elapsed, or a signal
    /// interrupted the wait.
    Wakeup,
}

/// Queue of decoded input events over one fd.
pub struct CharQueue {
    in_fd: RawFd,
    queue: VecDeque<Event>,
    decoder: Utf8Decoder,
    side_fds: Vec<RawFd>,
    escape_delay_ms: u64,
    /// Periodic wakeup for notifiers that need polling, in milliseconds.
    poll_interval_ms: Option<u64>,
}

impl CharQueue {
    pub fn new(in_fd: RawFd) -> Self {
        Self {
            in_fd,
            queue: VecDeque::new(),
            decoder: Utf8Decoder::new(),
            side_fds: Vec::new(),
            escape_delay_ms: WAIT_ON_ESCAPE_DEFAULT_MS,
            poll_interval_ms: None,
        }
    }

    /// Register an fd whose readability should wake the blocking read.
    pub fn add_side_channel(&mut self, fd: RawFd) {
        if fd >= 0 {
            self.side_fds.push(fd);
        }
    }

    /// Update the ESC disambiguation delay. Out-of-range values are
    /// rejected with a diagnostic, matching the env-var contract.
    pub fn set_escape_delay_ms(&mut self, ms: i64) {
        if !(WAIT_ON_ESCAPE_MIN_MS as i64..=WAIT_ON_ESCAPE_MAX_MS as i64).contains(&ms) {
            warn!(
                target: "input.queue",
                value = ms,
                "ignoring escape delay outside [{WAIT_ON_ESCAPE_MIN_MS}, {WAIT_ON_ESCAPE_MAX_MS}] ms"
            );
            return;
        }
        self.escape_delay_ms = ms as u64;
    }

    pub fn escape_delay_ms(&self) -> u64 {
        self.escape_delay_ms
    }

    /// Ask for periodic wakeups (used by polling-style uvar notifiers).
    pub fn set_poll_interval_ms(&mut self, ms: Option<u64>) {
        self.poll_interval_ms = ms;
    }

    pub fn push_back(&mut self, evt: Event) {
        EVENTS_PUSHED_BACK.fetch_add(1, Relaxed);
        self.queue.push_back(evt);
    }

    pub fn push_front(&mut self, evt: Event) {
        EVENTS_PUSHED_BACK.fetch_add(1, Relaxed);
        self.queue.push_front(evt);
    }

    pub fn pop_front(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Move non-char events to the front, preserving relative order on
    /// both sides of the partition.
    pub fn promote_interruptions(&mut self) {
        if self.queue.iter().all(|e| !e.is_interruption()) {
            return;
        }
        let (interruptions, chars): (Vec<_>, Vec<_>) = self
            .queue
            .drain(..)
            .partition(|e| e.is_interruption());
        self.queue.extend(interruptions);
        self.queue.extend(chars);
        trace!(target: "input.queue", "interruptions promoted");
    }

    /// True when a byte can be read without blocking (queue content does
    /// not count). Drives readahead coalescing.
    pub fn byte_available(&self) -> bool {
        let borrowed = unsafe { BorrowedFd::borrow_raw(self.in_fd) };
        let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];
        matches!(nix::poll::poll(&mut fds, PollTimeout::ZERO), Ok(n) if n > 0)
    }

    /// Block until an event is available.
    pub fn read_blocking(&mut self) -> Event {
        if let Some(evt) = self.queue.pop_front() {
            return evt;
        }
        loop {
            match self.read_raw_byte() {
                RawRead::Byte(byte) => match self.decoder.feed(byte) {
                    Decoded::Char(cp) => return Event::plain(cp),
                    Decoded::Pending => continue,
                    Decoded::Invalid => {
                        warn!(target: "input.queue", "illegal input byte; decoder reset");
                        return Event::CheckExit;
                    }
                },
                RawRead::Eof => return Event::Eof,
                RawRead::Wakeup => return Event::CheckExit,
            }
        }
    }

    /// Wait at most the escape delay for another event. Used solely for
    /// escape-sequence disambiguation.
    pub fn read_timed(&mut self) -> Option<Event> {
        if let Some(evt) = self.queue.pop_front() {
            return Some(evt);
        }
        let borrowed = unsafe { BorrowedFd::borrow_raw(self.in_fd) };
        let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];
        let timeout = PollTimeout::try_from(self.escape_delay_ms).unwrap_or(PollTimeout::MAX);
        loop {
            match nix::poll::poll(&mut fds, timeout) {
                Ok(0) => return None,
                Ok(_) => return Some(self.read_blocking()),
                Err(Errno::EINTR) | Err(Errno::EAGAIN) => continue,
                Err(err) => {
                    warn!(target: "input.queue", %err, "poll failed during timed read");
                    return None;
                }
            }
        }
    }

    /// One poll round. Input readability outranks side channels so the
    /// foreground never starves behind background completions.
    fn read_raw_byte(&mut self) -> RawRead {
        loop {
            let in_borrowed = unsafe { BorrowedFd::borrow_raw(self.in_fd) };
            let mut fds = Vec::with_capacity(1 + self.side_fds.len());
            fds.push(PollFd::new(in_borrowed, PollFlags::POLLIN));
            for &fd in &self.side_fds {
                let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
                fds.push(PollFd::new(borrowed, PollFlags::POLLIN));
            }

            let timeout = match self.poll_interval_ms {
                Some(ms) => PollTimeout::try_from(ms).unwrap_or(PollTimeout::MAX),
                None => PollTimeout::NONE,
            };

            match nix::poll::poll(&mut fds, timeout) {
                Ok(0) => return RawRead::Wakeup, // periodic poll elapsed
                Ok(_) => {
                    let input_ready = fds[0]
                        .revents()
                        .is_some_and(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP));
                    let side_ready = fds[1..].iter().any(|f| {
                        f.revents()
                            .is_some_and(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP))
                    });
                    drop(fds);
                    if input_ready {
                        match self.read_one_byte() {
                            Some(byte) => return RawRead::Byte(byte),
                            None => return RawRead::Eof,
                        }
                    }
                    if side_ready {
                        return RawRead::Wakeup;
                    }
                }
                Err(Errno::EINTR) | Err(Errno::EAGAIN) => return RawRead::Wakeup,
                Err(err) => {
                    warn!(target: "input.queue", %err, "poll failed; treating as EOF");
                    return RawRead::Eof;
                }
            }
        }
    }

    fn read_one_byte(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        loop {
            match nix::unistd::read(self.in_fd, &mut buf) {
                Ok(0) => return None,
                Ok(_) => return Some(buf[0]),
                Err(Errno::EINTR) | Err(Errno::EAGAIN) => continue,
                Err(err) => {
                    warn!(target: "input.queue", %err, "read failed; treating as EOF");
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::{InsertStyle, ReadlineCmd};
    use pretty_assertions::assert_eq;
    use std::os::fd::{AsRawFd, OwnedFd};

    fn pipe_queue() -> (CharQueue, OwnedFd, OwnedFd) {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        let queue = CharQueue::new(read_end.as_raw_fd());
        (queue, read_end, write_end)
    }

    fn write_all(fd: &OwnedFd, bytes: &[u8]) {
        let mut written = 0;
        while written < bytes.len() {
            written += nix::unistd::write(fd, &bytes[written..]).unwrap();
        }
    }

    #[test]
    fn decodes_ascii_and_multibyte() {
        let (mut queue, _r, w) = pipe_queue();
        write_all(&w, "aé🐚".as_bytes());
        assert_eq!(queue.read_blocking(), Event::plain('a'));
        assert_eq!(queue.read_blocking(), Event::plain('é'));
        assert_eq!(queue.read_blocking(), Event::plain('🐚'));
    }

    #[test]
    fn illegal_byte_yields_check_exit_then_recovers() {
        let (mut queue, _r, w) = pipe_queue();
        write_all(&w, &[0xFF, b'z']);
        assert_eq!(queue.read_blocking(), Event::CheckExit);
        assert_eq!(queue.read_blocking(), Event::plain('z'));
    }

    #[test]
    fn closed_writer_is_eof() {
        let (mut queue, _r, w) = pipe_queue();
        drop(w);
        assert_eq!(queue.read_blocking(), Event::Eof);
    }

    #[test]
    fn pushed_events_outrank_bytes() {
        let (mut queue, _r, w) = pipe_queue();
        write_all(&w, b"x");
        queue.push_back(Event::plain('1'));
        queue.push_front(Event::plain('0'));
        assert_eq!(queue.read_blocking(), Event::plain('0'));
        assert_eq!(queue.read_blocking(), Event::plain('1'));
        assert_eq!(queue.read_blocking(), Event::plain('x'));
    }

    #[test]
    fn timed_read_times_out_on_empty_input() {
        let (mut queue, _r, _w) = pipe_queue();
        queue.set_escape_delay_ms(10);
        assert_eq!(queue.read_timed(), None);
    }

    #[test]
    fn timed_read_returns_queued_event_without_polling() {
        let (mut queue, _r, _w) = pipe_queue();
        queue.push_back(Event::readline(ReadlineCmd::Repaint));
        assert_eq!(queue.read_timed(), Some(Event::readline(ReadlineCmd::Repaint)));
    }

    #[test]
    fn side_channel_wakes_as_check_exit() {
        let (mut queue, _r, w) = pipe_queue();
        let (side_r, side_w) = nix::unistd::pipe().unwrap();
        queue.add_side_channel(side_r.as_raw_fd());
        write_all(&side_w, &[1]);
        assert_eq!(queue.read_blocking(), Event::CheckExit);
        // Input still wins over the (still readable) side channel.
        write_all(&w, b"k");
        assert_eq!(queue.read_blocking(), Event::plain('k'));
    }

    #[test]
    fn promote_interruptions_is_stable() {
        let (mut queue, _r, _w) = pipe_queue();
        queue.push_back(Event::plain('a'));
        queue.push_back(Event::CheckExit);
        queue.push_back(Event::plain('b'));
        queue.push_back(Event::Eof);
        queue.promote_interruptions();
        assert_eq!(queue.read_blocking(), Event::CheckExit);
        assert_eq!(queue.read_blocking(), Event::Eof);
        assert_eq!(queue.read_blocking(), Event::plain('a'));
        assert_eq!(queue.read_blocking(), Event::plain('b'));
    }

    #[test]
    fn escape_delay_clamps_bad_values() {
        let (mut queue, _r, _w) = pipe_queue();
        queue.set_escape_delay_ms(5); // below minimum, ignored
        assert_eq!(queue.escape_delay_ms(), WAIT_ON_ESCAPE_DEFAULT_MS);
        queue.set_escape_delay_ms(100);
        assert_eq!(queue.escape_delay_ms(), 100);
        queue.set_escape_delay_ms(9999); // above maximum, ignored
        assert_eq!(queue.escape_delay_ms(), 100);
    }

    #[test]
    fn split_multibyte_survives_separate_writes() {
        let (mut queue, _r, w) = pipe_queue();
        let bytes = "ß".as_bytes();
        write_all(&w, &bytes[..1]);
        write_all(&w, &bytes[1..]);
        assert_eq!(queue.read_blocking(), Event::plain('ß'));
    }

    #[test]
    fn insert_style_defaults_to_normal() {
        match Event::plain('q') {
            Event::Char { style, .. } => assert_eq!(style, InsertStyle::Normal),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
