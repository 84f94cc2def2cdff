//! Host serial link: newline-framed command lines in, raw sample words out.
use embedded_io::{Read, Write};
use heapless::Vec;

use crate::{
    error::{link_error, CommandError, HardwareError, ParseError},
    logger::trace,
};

/// Longest accepted command line, excluding the newline
pub const LINE_CAPACITY: usize = 64;

/// Samples encoded per link write
const WORDS_PER_WRITE: usize = 32;

/// Accumulates link bytes into command lines.
///
/// A line that overflows [`LINE_CAPACITY`] is dropped up to and including its newline.
pub struct LineReader {
    line: Vec<u8, LINE_CAPACITY>,
    overflowed: bool,
}

impl LineReader {
    /// Empty reader
    pub const fn new() -> Self {
        Self {
            line: Vec::new(),
            overflowed: false,
        }
    }

    /// Block until a complete non-empty line arrives.
    ///
    /// Returns `Ok(None)` once the link reports end of stream. The trailing `\r\n` or `\n`
    /// is stripped.
    pub fn read_line<R: Read>(&mut self, link: &mut R) -> Result<Option<&str>, CommandError> {
        self.line.clear();
        self.overflowed = false;
        let mut byte = [0u8; 1];
        loop {
            if link.read(&mut byte).map_err(link_error)? == 0 {
                return Ok(None);
            }
            match byte[0] {
                b'\n' if self.overflowed => {
                    return Err(ParseError::LineTooLong(LINE_CAPACITY).into());
                }
                b'\n' => {
                    if self.line.last() == Some(&b'\r') {
                        self.line.pop();
                    }
                    if self.line.is_empty() {
                        continue;
                    }
                    break;
                }
                _ if self.overflowed => {}
                other => {
                    if self.line.push(other).is_err() {
                        self.overflowed = true;
                        self.line.clear();
                    }
                }
            }
        }
        trace!("Line of {} bytes", self.line.len());
        core::str::from_utf8(&self.line)
            .map(Some)
            .map_err(|_| ParseError::NotAscii.into())
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `samples` to the host as unframed little-endian 16-bit words
pub fn write_samples<W: Write>(link: &mut W, samples: &[u16]) -> Result<(), HardwareError> {
    let mut bytes = [0u8; WORDS_PER_WRITE * 2];
    for chunk in samples.chunks(WORDS_PER_WRITE) {
        for (word, pair) in chunk.iter().zip(bytes.chunks_exact_mut(2)) {
            pair.copy_from_slice(&word.to_le_bytes());
        }
        link.write_all(&bytes[..chunk.len() * 2])
            .map_err(link_error)?;
    }
    link.flush().map_err(link_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_split_and_trimmed() {
        let mut link: &[u8] = b"m2\r\n\n\ndz0550\nm1";
        let mut reader = LineReader::new();
        assert_eq!(reader.read_line(&mut link).unwrap(), Some("m2"));
        assert_eq!(reader.read_line(&mut link).unwrap(), Some("dz0550"));
        // Unterminated tail is not a line
        assert_eq!(reader.read_line(&mut link).unwrap(), None);
    }

    #[test]
    fn overlong_line_is_dropped_whole() {
        let mut input = std::vec![b'7'; LINE_CAPACITY + 10];
        input.extend_from_slice(b"\nm2\n");
        let mut link = input.as_slice();
        let mut reader = LineReader::new();
        assert_eq!(
            reader.read_line(&mut link),
            Err(CommandError::Parse(ParseError::LineTooLong(LINE_CAPACITY)))
        );
        assert_eq!(reader.read_line(&mut link).unwrap(), Some("m2"));
    }

    #[test]
    fn invalid_utf8_line_is_rejected_and_reader_recovers() {
        let mut link: &[u8] = b"m2\xff\nm2\n";
        let mut reader = LineReader::new();
        assert_eq!(
            reader.read_line(&mut link),
            Err(CommandError::Parse(ParseError::NotAscii))
        );
        assert_eq!(reader.read_line(&mut link).unwrap(), Some("m2"));
    }

    #[test]
    fn line_at_capacity_is_kept() {
        let mut input = std::vec![b'x'; LINE_CAPACITY];
        input.push(b'\n');
        let mut link = input.as_slice();
        let mut reader = LineReader::new();
        assert_eq!(
            reader.read_line(&mut link).unwrap().map(str::len),
            Some(LINE_CAPACITY)
        );
    }

    #[test]
    fn samples_are_little_endian() {
        let samples: std::vec::Vec<u16> = (0..70).map(|i| 0x0100 * i + 1).collect();
        let mut out = std::vec::Vec::new();
        write_samples(&mut out, &samples).unwrap();

        assert_eq!(out.len(), 140);
        assert_eq!(&out[..4], &[0x01, 0x00, 0x01, 0x01]);
        assert_eq!(&out[138..], &[0x01, 0x45]);
    }
}
