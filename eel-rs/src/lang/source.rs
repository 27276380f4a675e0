//! Character source with one character of lookahead.
//!
//! Wraps any byte stream, decodes it as UTF-8 on the fly and enforces a hard
//! ceiling on the number of bytes read. Past the end of input both
//! [`Source::current`] and [`Source::next`] report [`END`] forever.

use std::io::{BufReader, Bytes, ErrorKind, Read};

use crate::error::{Error, Result};

/// Sentinel reported at end of input.
pub const END: char = '\u{FFFF}';

/// The smallest usable limit: enough for the current/next pair.
pub const MIN_LIMIT: usize = 2;

/// Buffered UTF-8 character cursor over a byte stream.
pub struct Source<'a> {
    bytes: Bytes<BufReader<Box<dyn Read + 'a>>>,
    limit: usize,
    consumed: usize,
    current: char,
    next: char,
    /// 1-based position of `current`.
    position: usize,
}

impl<'a> Source<'a> {
    /// Open a source over `reader`. `limit` is clamped to [`MIN_LIMIT`].
    pub fn new(reader: impl Read + 'a, limit: usize) -> Result<Self> {
        let boxed: Box<dyn Read + 'a> = Box::new(reader);
        let mut source = Source {
            bytes: BufReader::new(boxed).bytes(),
            limit: limit.max(MIN_LIMIT),
            consumed: 0,
            current: END,
            next: END,
            position: 1,
        };
        source.current = source.decode()?;
        source.next = source.decode()?;
        Ok(source)
    }

    /// Open a source over an in-memory string.
    pub fn from_str(text: &'a str, limit: usize) -> Result<Self> {
        Source::new(text.as_bytes(), limit)
    }

    pub fn current(&self) -> char {
        self.current
    }

    /// The character after [`Source::current`], without consuming anything.
    pub fn next(&self) -> char {
        self.next
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn at_end(&self) -> bool {
        self.current == END
    }

    /// Consume the current character and return it.
    pub fn read(&mut self) -> Result<char> {
        let c = self.current;
        if c == END {
            return Ok(END);
        }
        self.current = self.next;
        self.next = self.decode()?;
        self.position += 1;
        Ok(c)
    }

    fn take_byte(&mut self) -> Result<Option<u8>> {
        match self.bytes.next() {
            None => Ok(None),
            Some(Ok(b)) => {
                if self.consumed >= self.limit {
                    return Err(Error::TooLong { limit: self.limit });
                }
                self.consumed += 1;
                Ok(Some(b))
            }
            Some(Err(e)) => Err(Error::Io(e)),
        }
    }

    fn decode(&mut self) -> Result<char> {
        let Some(first) = self.take_byte()? else {
            return Ok(END);
        };
        let width = match first {
            0x00..=0x7F => 1,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return Err(invalid_utf8()),
        };
        let mut buf = [first, 0, 0, 0];
        for slot in buf.iter_mut().take(width).skip(1) {
            *slot = self.take_byte()?.ok_or_else(invalid_utf8)?;
        }
        let c = std::str::from_utf8(&buf[..width])
            .map_err(|_| invalid_utf8())?
            .chars()
            .next()
            .ok_or_else(invalid_utf8)?;
        if c == END {
            // Position of the character being decoded: after current and next.
            let at = self.position + if self.current == END { 0 } else { 1 };
            return Err(Error::syntax(at, "unexpected character '\u{FFFF}' (0xFFFF)"));
        }
        Ok(c)
    }
}

fn invalid_utf8() -> Error {
    Error::Io(std::io::Error::new(
        ErrorKind::InvalidData,
        "expression is not valid UTF-8",
    ))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookahead_and_read() {
        let mut s = Source::from_str("ab", 10).unwrap();
        assert_eq!((s.current(), s.next(), s.position()), ('a', 'b', 1));
        assert_eq!(s.read().unwrap(), 'a');
        assert_eq!((s.current(), s.next(), s.position()), ('b', END, 2));
        assert_eq!(s.read().unwrap(), 'b');
        assert!(s.at_end());
    }

    #[test]
    fn end_is_idempotent() {
        let mut s = Source::from_str("", 10).unwrap();
        for _ in 0..3 {
            assert_eq!(s.read().unwrap(), END);
            assert_eq!(s.current(), END);
            assert_eq!(s.next(), END);
            assert_eq!(s.position(), 1);
        }
    }

    #[test]
    fn decodes_multibyte_characters() {
        let mut s = Source::from_str("é€😀", 20).unwrap();
        assert_eq!(s.read().unwrap(), 'é');
        assert_eq!(s.read().unwrap(), '€');
        assert_eq!(s.read().unwrap(), '😀');
        assert!(s.at_end());
    }

    #[test]
    fn exceeding_the_limit_fails_with_the_limit() {
        let mut s = Source::from_str("abcd", 3).unwrap();
        s.read().unwrap();
        let err = s.read().unwrap_err();
        assert!(matches!(err, Error::TooLong { limit: 3 }));
    }

    #[test]
    fn exact_limit_is_fine() {
        let mut s = Source::from_str("abc", 3).unwrap();
        for _ in 0..3 {
            s.read().unwrap();
        }
        assert!(s.at_end());
    }

    #[test]
    fn limit_is_clamped_to_two() {
        let s = Source::from_str("ab", 0).unwrap();
        assert_eq!(s.limit(), MIN_LIMIT);
    }

    #[test]
    fn invalid_utf8_is_an_io_error() {
        let bytes: &[u8] = &[b'a', 0xFF, b'b'];
        assert!(matches!(Source::new(bytes, 10), Err(Error::Io(_))));
    }
}
