//! Key dump mode: decode raw input and print what the binding engine
//! would see. Useful for writing bindings against terminals that send
//! unusual sequences.

use std::os::fd::RawFd;

use anyhow::Result;

use core_events::Event;
use core_input::CharQueue;
use core_term::{TermCaps, TermSession};

/// Render a char the way binding listings spell it.
fn describe(cp: char) -> String {
    match cp {
        '\x1b' => "\\e".to_string(),
        '\r' => "\\r".to_string(),
        '\n' => "\\n".to_string(),
        '\x7f' => "\\x7f".to_string(),
        c if (c as u32) < 32 => format!("\\c{}", (c as u8 + b'a' - 1) as char),
        c => c.to_string(),
    }
}

/// Read events until ctrl-C or ctrl-D and print each decoded sequence
/// with the terminfo key name when one matches.
pub fn run(in_fd: RawFd, caps: &TermCaps) -> Result<()> {
    let mut session = TermSession::acquire_key_reader(in_fd)?;
    let mut queue = CharQueue::new(in_fd);

    println!("driftline key dump; press ctrl-C or ctrl-D to exit\r");
    loop {
        let first = match queue.read_blocking() {
            Event::Char { cp, .. } => cp,
            Event::Eof => break,
            _ => continue,
        };
        if first == '\x03' || first == '\x04' {
            break;
        }

        // Pull in the rest of an escape sequence within the delay window.
        let mut seq = vec![first];
        if first == '\x1b' {
            while let Some(Event::Char { cp, .. }) = queue.read_timed() {
                seq.push(cp);
                if seq.len() > 16 {
                    break;
                }
            }
        }

        let bytes: Vec<u8> = seq
            .iter()
            .flat_map(|c| {
                let mut buf = [0u8; 4];
                c.encode_utf8(&mut buf).as_bytes().to_vec()
            })
            .collect();
        let spelled: String = seq.iter().map(|&c| describe(c)).collect();
        match caps.name_for_sequence(&bytes) {
            Some(name) => println!("{spelled}  ({name})\r"),
            None => println!("{spelled}\r"),
        }
    }

    session.suspend()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_chars_are_spelled_caret_style() {
        assert_eq!(describe('\x01'), "\\ca");
        assert_eq!(describe('\x1b'), "\\e");
        assert_eq!(describe('q'), "q");
    }
}
