//! Track byte, line, and column positions while writing through a stream of
//! UTF-8 text.
//!
//! Offsets are zero-based. The byte offset counts every byte written; the
//! column counts Unicode scalar values, not bytes, so multi-byte sequences
//! advance the column once. Lines advance on `\n`, and a `\r\n` pair counts
//! as a single line break at the `\n`. A bare `\r` also advances the line,
//! matching the newline normalization performed by HTML tokenizers.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OffsetParseError {
    #[error("malformed text offset: {0:?}")]
    MalformedOffset(String),

    #[error("malformed text offset range: {0:?}")]
    MalformedRange(String),
}

/// A position within a text document.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextOffset {
    pub byte: usize,
    pub line: usize,
    pub column: usize,
}

impl TextOffset {
    pub fn new(byte: usize, line: usize, column: usize) -> Self {
        Self { byte, line, column }
    }
}

impl fmt::Display for TextOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{},{}", self.byte, self.line, self.column)
    }
}

impl FromStr for TextOffset {
    type Err = OffsetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || OffsetParseError::MalformedOffset(s.to_string());

        let (byte, line_column) = s.split_once(':').ok_or_else(malformed)?;
        let (line, column) = line_column.split_once(',').ok_or_else(malformed)?;

        Ok(Self {
            byte: byte.parse().map_err(|_| malformed())?,
            line: line.parse().map_err(|_| malformed())?,
            column: column.parse().map_err(|_| malformed())?,
        })
    }
}

/// A half-open span between two positions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextOffsetRange {
    pub from: TextOffset,
    pub until: TextOffset,
}

impl TextOffsetRange {
    pub fn new(from: TextOffset, until: TextOffset) -> Self {
        Self { from, until }
    }

    /// A range covering no text at the given position.
    pub fn collapsed(at: TextOffset) -> Self {
        Self { from: at, until: at }
    }
}

impl fmt::Display for TextOffsetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.until)
    }
}

impl FromStr for TextOffsetRange {
    type Err = OffsetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, until) = s
            .split_once('-')
            .ok_or_else(|| OffsetParseError::MalformedRange(s.to_string()))?;

        Ok(Self {
            from: from.parse()?,
            until: until.parse()?,
        })
    }
}

/// Advances a [`TextOffset`] over bytes as they are written through it.
///
/// Every byte fed to the writer counts toward the byte offset, so after a
/// whole document has been written the position's `byte` equals the document
/// length.
#[derive(Debug, Default, Clone)]
pub struct TextWriter {
    offset: TextOffset,
    pending_cr: bool,
}

impl TextWriter {
    pub fn new(initial: TextOffset) -> Self {
        Self {
            offset: initial,
            pending_cr: false,
        }
    }

    /// The current position; the start of whatever is written next.
    pub fn position(&self) -> TextOffset {
        self.offset
    }

    /// Advances the position over `bytes`.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.offset.byte += 1;

            match b {
                b'\n' => {
                    // A preceding \r already broke the line.
                    if self.pending_cr {
                        self.pending_cr = false;
                    } else {
                        self.offset.line += 1;
                        self.offset.column = 0;
                    }
                }
                b'\r' => {
                    self.offset.line += 1;
                    self.offset.column = 0;
                    self.pending_cr = true;
                }
                _ => {
                    self.pending_cr = false;

                    // UTF-8 continuation bytes do not start a new scalar value.
                    if b & 0xC0 != 0x80 {
                        self.offset.column += 1;
                    }
                }
            }
        }
    }

    /// Advances the position over `bytes` and returns the range they covered.
    pub fn write_for_offset_range(&mut self, bytes: &[u8]) -> TextOffsetRange {
        let from = self.offset;
        self.write(bytes);

        TextOffsetRange {
            from,
            until: self.offset,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn write_advances_bytes_and_columns() {
        let mut w = TextWriter::default();
        w.write(b"hello");

        assert_eq!(w.position(), TextOffset::new(5, 0, 5));
    }

    #[test]
    fn write_for_offset_range_brackets_bytes() {
        let mut w = TextWriter::default();
        w.write(b"ab");

        let range = w.write_for_offset_range(b"cde");
        assert_eq!(range.from, TextOffset::new(2, 0, 2));
        assert_eq!(range.until, TextOffset::new(5, 0, 5));
    }

    #[test]
    fn newline_resets_column() {
        let mut w = TextWriter::default();
        w.write(b"ab\ncd");

        assert_eq!(w.position(), TextOffset::new(5, 1, 2));
    }

    #[test]
    fn crlf_counts_one_line() {
        let mut w = TextWriter::default();
        w.write(b"a\r\nb");

        assert_eq!(w.position(), TextOffset::new(4, 1, 1));
    }

    #[test]
    fn bare_cr_counts_one_line() {
        let mut w = TextWriter::default();
        w.write(b"a\rb\rc");

        assert_eq!(w.position(), TextOffset::new(5, 2, 1));
    }

    #[test]
    fn crlf_split_across_writes() {
        let mut w = TextWriter::default();
        w.write(b"a\r");
        w.write(b"\nb");

        assert_eq!(w.position(), TextOffset::new(4, 1, 1));
    }

    #[test]
    fn multibyte_advances_column_once() {
        let mut w = TextWriter::default();
        // "é" is two bytes, "あ" is three.
        w.write("éあx".as_bytes());

        assert_eq!(w.position(), TextOffset::new(6, 0, 3));
    }

    #[test]
    fn initial_offset_seeds_position() {
        let mut w = TextWriter::new(TextOffset::new(10, 2, 3));
        w.write(b"ab");

        assert_eq!(w.position(), TextOffset::new(12, 2, 5));
    }

    #[test]
    fn offset_display_parse_round_trip() {
        let offset = TextOffset::new(12, 3, 7);
        let parsed: TextOffset = offset.to_string().parse().unwrap();

        assert_eq!(parsed, offset);
    }

    #[test]
    fn range_display_parse_round_trip() {
        let range = TextOffsetRange::new(TextOffset::new(4, 0, 4), TextOffset::new(9, 1, 2));
        let parsed: TextOffsetRange = range.to_string().parse().unwrap();

        assert_eq!(parsed, range);
        assert_eq!(range.to_string(), "4:0,4-9:1,2");
    }

    #[test]
    fn malformed_offsets_are_rejected() {
        assert!("".parse::<TextOffset>().is_err());
        assert!("12".parse::<TextOffset>().is_err());
        assert!("12:0".parse::<TextOffset>().is_err());
        assert!("a:0,0".parse::<TextOffset>().is_err());
        assert!("12:0,0".parse::<TextOffsetRange>().is_err());
        assert!("12:0,0-".parse::<TextOffsetRange>().is_err());
    }
}
