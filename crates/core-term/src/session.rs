//! Terminal mode ownership.
//!
//! The reader runs the tty in a cbreak-like key mode: no canonical line
//! assembly, no echo, byte-at-a-time reads, CR/NL translation off, and
//! signal generation off so control characters arrive as bytes. The modes
//! found at acquisition are saved and restored on drop, and temporarily
//! restored around running user code ([`TermSession::suspend`] /
//! [`TermSession::resume`]).

use std::os::fd::{BorrowedFd, RawFd};

use nix::sys::termios::{
    self, InputFlags, LocalFlags, SetArg, SpecialCharacterIndices, Termios,
};
use tracing::{debug, warn};

use crate::TermSetupError;

/// RAII holder of the terminal's saved modes.
pub struct TermSession {
    fd: RawFd,
    saved: Termios,
    raw: Termios,
    active: bool,
}

impl TermSession {
    /// Save the current modes on `fd` and switch to the interactive edit
    /// mode. `ISIG` stays on: ctrl-C must still deliver `SIGINT`, which
    /// the reader observes as its interrupt flag.
    pub fn acquire(fd: RawFd) -> Result<Self, TermSetupError> {
        Self::acquire_inner(fd, true)
    }

    /// Like [`TermSession::acquire`] but with signal generation off, so
    /// every byte — ctrl-C included — arrives as input. Key-dump mode.
    pub fn acquire_key_reader(fd: RawFd) -> Result<Self, TermSetupError> {
        Self::acquire_inner(fd, false)
    }

    fn acquire_inner(fd: RawFd, keep_isig: bool) -> Result<Self, TermSetupError> {
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        let saved = termios::tcgetattr(borrowed)?;

        let mut raw = saved.clone();
        raw.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
        if !keep_isig {
            raw.local_flags.remove(LocalFlags::ISIG);
        }
        raw.input_flags
            .remove(InputFlags::ICRNL | InputFlags::INLCR);
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;

        let mut session = Self {
            fd,
            saved,
            raw,
            active: false,
        };
        session.resume()?;
        debug!(target: "term.session", fd, keep_isig, "terminal acquired");
        Ok(session)
    }

    /// Restore the original modes (before handing the terminal to user
    /// code). Idempotent.
    pub fn suspend(&mut self) -> nix::Result<()> {
        if self.active {
            let borrowed = unsafe { BorrowedFd::borrow_raw(self.fd) };
            termios::tcsetattr(borrowed, SetArg::TCSANOW, &self.saved)?;
            self.active = false;
        }
        Ok(())
    }

    /// Re-enter key-reader mode (after user code finished). Idempotent.
    pub fn resume(&mut self) -> nix::Result<()> {
        if !self.active {
            let borrowed = unsafe { BorrowedFd::borrow_raw(self.fd) };
            termios::tcsetattr(borrowed, SetArg::TCSANOW, &self.raw)?;
            self.active = true;
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for TermSession {
    fn drop(&mut self) {
        if let Err(err) = self.suspend() {
            warn!(target: "term.session", %err, "failed to restore terminal modes");
        }
    }
}
