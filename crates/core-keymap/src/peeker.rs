//! Provisional reads over the char queue.
//!
//! A peeker reads ahead while a binding sequence is being matched. The
//! first event is read blocking; every later one uses the queue's timed
//! read so a lone ESC is not confused with the start of an escape
//! sequence. On drop, every event not explicitly committed is pushed back
//! to the front of the queue in its original order, so a failed match
//! leaves the queue exactly as it found it.

use core_events::Event;
use core_input::CharQueue;

use crate::Binding;

pub struct Peeker<'q> {
    queue: &'q mut CharQueue,
    peeked: Vec<Event>,
}

impl<'q> Peeker<'q> {
    pub fn new(queue: &'q mut CharQueue) -> Self {
        Self {
            queue,
            peeked: Vec::new(),
        }
    }

    /// Event at `idx`, reading more input if needed. Returns `None` when
    /// the timed read for a follow-up byte expires.
    pub fn peek(&mut self, idx: usize) -> Option<&Event> {
        while self.peeked.len() <= idx {
            let evt = if self.peeked.is_empty() {
                self.queue.read_blocking()
            } else {
                self.queue.read_timed()?
            };
            self.peeked.push(evt);
        }
        self.peeked.get(idx)
    }

    /// Whether the pending input starts with `seq`.
    pub fn matches(&mut self, seq: &[char]) -> bool {
        for (idx, &want) in seq.iter().enumerate() {
            match self.peek(idx) {
                Some(Event::Char { cp, .. }) if *cp == want => {}
                _ => return false,
            }
        }
        true
    }

    /// Permanently consume the first `n` peeked events, returning them.
    /// Everything beyond `n` is rolled back when the peeker drops.
    pub fn commit(&mut self, n: usize) -> Vec<Event> {
        let n = n.min(self.peeked.len());
        self.peeked.drain(..n).collect()
    }

    /// Consume the events a matched binding claims: its sequence length,
    /// or exactly one event for the generic binding. Returns the consumed
    /// characters.
    pub fn commit_matched(&mut self, binding: &Binding) -> Vec<char> {
        let take = if binding.is_generic() {
            1
        } else {
            binding.seq.len()
        };
        self.commit(take)
            .into_iter()
            .filter_map(|evt| evt.as_char())
            .collect()
    }
}

impl Drop for Peeker<'_> {
    fn drop(&mut self) {
        // Restore uncommitted events in their original order.
        for evt in self.peeked.drain(..).rev() {
            self.queue.push_front(evt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::ReadlineCmd;
    use pretty_assertions::assert_eq;

    fn queue_with(events: &[Event]) -> CharQueue {
        // Stdin is never read here: every test event is pre-queued.
        let mut queue = CharQueue::new(-1_i32 as std::os::fd::RawFd);
        for evt in events {
            queue.push_back(evt.clone());
        }
        queue
    }

    #[test]
    fn rollback_restores_order() {
        let mut queue = queue_with(&[Event::plain('x'), Event::plain('y'), Event::plain('z')]);
        {
            let mut peeker = Peeker::new(&mut queue);
            assert!(peeker.matches(&['x', 'y']));
            // dropped without commit
        }
        assert_eq!(queue.read_blocking(), Event::plain('x'));
        assert_eq!(queue.read_blocking(), Event::plain('y'));
        assert_eq!(queue.read_blocking(), Event::plain('z'));
    }

    #[test]
    fn commit_splits_consumed_from_restored() {
        let mut queue = queue_with(&[Event::plain('a'), Event::plain('b'), Event::plain('c')]);
        {
            let mut peeker = Peeker::new(&mut queue);
            assert!(peeker.matches(&['a', 'b', 'c']));
            let taken = peeker.commit(2);
            assert_eq!(taken.len(), 2);
        }
        assert_eq!(queue.read_blocking(), Event::plain('c'));
    }

    #[test]
    fn non_char_event_fails_sequence_match() {
        let mut queue = queue_with(&[
            Event::plain('a'),
            Event::readline(ReadlineCmd::Repaint),
        ]);
        {
            let mut peeker = Peeker::new(&mut queue);
            assert!(!peeker.matches(&['a', 'b']));
        }
        // Both events intact.
        assert_eq!(queue.read_blocking(), Event::plain('a'));
        assert_eq!(
            queue.read_blocking(),
            Event::readline(ReadlineCmd::Repaint)
        );
    }
}
