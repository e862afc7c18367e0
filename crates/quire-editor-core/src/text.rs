//! Text buffer abstraction for the surface's local copy of the document.
//!
//! The `TextBuffer` trait provides a common interface for text storage so the
//! edit queue and session can work with any backend; `EditorRope` is the
//! ropey-backed default.

use std::ops::Range;

use quire_protocol::{TextChange, ordered_for_apply};
use smol_str::{SmolStr, ToSmolStr};

use crate::error::SurfaceError;

/// A text buffer that supports efficient editing and offset conversion.
///
/// All offsets are in Unicode scalar values (chars), not bytes or UTF-16.
pub trait TextBuffer {
    /// Total length in bytes (UTF-8).
    fn len_bytes(&self) -> usize;

    /// Total length in chars (Unicode scalar values).
    fn len_chars(&self) -> usize;

    /// Check if empty.
    fn is_empty(&self) -> bool {
        self.len_chars() == 0
    }

    /// Insert text at char offset.
    fn insert(&mut self, char_offset: usize, text: &str);

    /// Delete char range.
    fn delete(&mut self, char_range: Range<usize>);

    /// Replace char range with text.
    fn replace(&mut self, char_range: Range<usize>, text: &str) {
        self.delete(char_range.clone());
        self.insert(char_range.start, text);
    }

    /// Replace the whole content.
    fn set_text(&mut self, text: &str) {
        let len = self.len_chars();
        self.replace(0..len, text);
    }

    /// Get a slice as SmolStr. Returns None if range is invalid.
    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr>;

    /// Convert entire buffer to String.
    fn to_string(&self) -> String;
}

/// Apply a batch of changes, highest offset first.
///
/// The whole batch is bounds-checked against the current length before
/// anything is mutated, so a rejected batch leaves the buffer untouched.
pub fn apply_changes<B: TextBuffer + ?Sized>(
    buffer: &mut B,
    changes: &[TextChange],
) -> Result<(), SurfaceError> {
    let len = buffer.len_chars();
    if let Some(bad) = changes.iter().find(|c| c.end() > len) {
        return Err(SurfaceError::ChangeOutOfBounds {
            offset: bad.offset,
            length: bad.length,
            doc_len: len,
        });
    }

    for change in ordered_for_apply(changes) {
        buffer.replace(change.range(), &change.inserted_text);
    }
    Ok(())
}

/// Ropey-backed text buffer for local editing.
///
/// Provides O(log n) editing operations and offset conversions.
#[derive(Clone, Default)]
pub struct EditorRope {
    rope: ropey::Rope,
}

impl EditorRope {
    /// Create a new empty rope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from string.
    pub fn from_text(s: &str) -> Self {
        Self {
            rope: ropey::Rope::from_str(s),
        }
    }

    /// Get a reference to the underlying rope (for advanced operations).
    pub fn rope(&self) -> &ropey::Rope {
        &self.rope
    }

    /// Char offset of the start of the line containing `char_offset`.
    pub fn line_start(&self, char_offset: usize) -> usize {
        let offset = char_offset.min(self.rope.len_chars());
        self.rope.line_to_char(self.rope.char_to_line(offset))
    }

    /// Zero-based line index containing `char_offset`.
    pub fn line_of(&self, char_offset: usize) -> usize {
        self.rope
            .char_to_line(char_offset.min(self.rope.len_chars()))
    }
}

impl TextBuffer for EditorRope {
    fn len_bytes(&self) -> usize {
        self.rope.len_bytes()
    }

    fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    fn insert(&mut self, char_offset: usize, text: &str) {
        self.rope.insert(char_offset, text);
    }

    fn delete(&mut self, char_range: Range<usize>) {
        if char_range.is_empty() {
            return;
        }
        self.rope.remove(char_range);
    }

    fn set_text(&mut self, text: &str) {
        self.rope = ropey::Rope::from_str(text);
    }

    fn slice(&self, char_range: Range<usize>) -> Option<SmolStr> {
        if char_range.start > char_range.end || char_range.end > self.len_chars() {
            return None;
        }
        Some(self.rope.slice(char_range).to_smolstr())
    }

    fn to_string(&self) -> String {
        self.rope.to_string()
    }
}

impl From<&str> for EditorRope {
    fn from(s: &str) -> Self {
        Self::from_text(s)
    }
}

impl From<String> for EditorRope {
    fn from(s: String) -> Self {
        Self::from_text(&s)
    }
}
