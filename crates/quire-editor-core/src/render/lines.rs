//! Line splitting with char-offset bookkeeping.
//!
//! Rules match on `&str` byte positions; everything they emit is converted
//! back into document char offsets here.

use std::ops::Range;

/// One source line, without its terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    pub index: usize,
    /// Char offset of the first char of the line.
    pub start: usize,
    pub text: &'a str,
    char_len: usize,
}

impl<'a> Line<'a> {
    /// Char offset just past the last char (before the newline).
    pub fn end(&self) -> usize {
        self.start + self.char_len
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Document char offset of a byte position within the line.
    pub fn char_at(&self, byte: usize) -> usize {
        self.start + self.text[..byte].chars().count()
    }

    /// Document char range of a byte range within the line.
    pub fn span(&self, bytes: Range<usize>) -> Range<usize> {
        let start = self.char_at(bytes.start);
        start..start + self.text[bytes].chars().count()
    }
}

/// Split `text` into lines. An empty document still has one (empty) line.
///
/// A trailing `\r` is excluded from the line text but still counted in the
/// offsets of the lines that follow.
pub fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (index, raw) in text.split('\n').enumerate() {
        let raw_len = raw.chars().count();
        let text = raw.strip_suffix('\r').unwrap_or(raw);
        lines.push(Line {
            index,
            start,
            text,
            char_len: text.chars().count(),
        });
        start += raw_len + 1;
    }
    lines
}
