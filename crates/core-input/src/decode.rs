//! Incremental UTF-8 decoding.
//!
//! One decoder instance lives inside the char queue; no other component
//! touches multibyte state. Partial sequences persist across reads, so a
//! code point split over multiple `read(2)` calls still assembles.

/// Result of feeding one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// A complete code point.
    Char(char),
    /// Mid-sequence; feed more bytes.
    Pending,
    /// Illegal byte. The decoder has been reset.
    Invalid,
}

/// Stateful byte-at-a-time UTF-8 decoder.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    buf: [u8; 4],
    len: usize,
    need: usize,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a partial sequence is buffered.
    pub fn mid_sequence(&self) -> bool {
        self.need != 0
    }

    /// Drop any partial state.
    pub fn reset(&mut self) {
        self.len = 0;
        self.need = 0;
    }

    pub fn feed(&mut self, byte: u8) -> Decoded {
        if self.need == 0 {
            match byte {
                0x00..=0x7F => return Decoded::Char(byte as char),
                0xC2..=0xDF => self.need = 2,
                0xE0..=0xEF => self.need = 3,
                0xF0..=0xF4 => self.need = 4,
                _ => {
                    // Bare continuation byte or overlong/invalid lead.
                    self.reset();
                    return Decoded::Invalid;
                }
            }
            self.buf[0] = byte;
            self.len = 1;
            return Decoded::Pending;
        }

        if byte & 0xC0 != 0x80 {
            self.reset();
            return Decoded::Invalid;
        }
        self.buf[self.len] = byte;
        self.len += 1;
        if self.len < self.need {
            return Decoded::Pending;
        }

        let bytes = &self.buf[..self.len];
        let decoded = std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.chars().next());
        self.reset();
        match decoded {
            Some(cp) => Decoded::Char(cp),
            None => Decoded::Invalid, // surrogate or overlong encodings
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decode_all(decoder: &mut Utf8Decoder, bytes: &[u8]) -> Vec<Decoded> {
        bytes.iter().map(|&b| decoder.feed(b)).collect()
    }

    #[test]
    fn ascii_is_immediate() {
        let mut d = Utf8Decoder::new();
        assert_eq!(d.feed(b'a'), Decoded::Char('a'));
        assert_eq!(d.feed(0x1b), Decoded::Char('\x1b'));
    }

    #[test]
    fn multibyte_assembles_across_feeds() {
        let mut d = Utf8Decoder::new();
        let results = decode_all(&mut d, "é".as_bytes());
        assert_eq!(results, vec![Decoded::Pending, Decoded::Char('é')]);

        let results = decode_all(&mut d, "🐚".as_bytes());
        assert_eq!(
            results,
            vec![
                Decoded::Pending,
                Decoded::Pending,
                Decoded::Pending,
                Decoded::Char('🐚')
            ]
        );
    }

    #[test]
    fn illegal_byte_resets_state() {
        let mut d = Utf8Decoder::new();
        assert_eq!(d.feed(0xE2), Decoded::Pending); // start of 3-byte seq
        assert_eq!(d.feed(b'x'), Decoded::Invalid); // not a continuation
        assert!(!d.mid_sequence());
        // Decoder is usable again immediately.
        assert_eq!(d.feed(b'y'), Decoded::Char('y'));
    }

    #[test]
    fn bare_continuation_is_invalid() {
        let mut d = Utf8Decoder::new();
        assert_eq!(d.feed(0x80), Decoded::Invalid);
        assert_eq!(d.feed(0xFF), Decoded::Invalid);
    }
}
