//! Text change representation shared by both sides of the protocol.

use std::ops::Range;

use serde::Serialize;

/// Delete `length` chars at `offset`, then insert `inserted_text` there.
///
/// Offsets count Unicode scalar values, the same unit the editor buffers use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChange {
    #[serde(rename = "rangeOffset")]
    pub offset: usize,
    #[serde(rename = "rangeLength")]
    pub length: usize,
    #[serde(rename = "text")]
    pub inserted_text: String,
}

impl TextChange {
    /// Create a change replacing `range` with `text`.
    pub fn replace(range: Range<usize>, text: impl Into<String>) -> Self {
        Self {
            offset: range.start,
            length: range.end.saturating_sub(range.start),
            inserted_text: text.into(),
        }
    }

    /// Create a pure insertion.
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::replace(offset..offset, text)
    }

    /// Create a pure deletion.
    pub fn delete(range: Range<usize>) -> Self {
        Self::replace(range, String::new())
    }

    /// End of the replaced range (exclusive).
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// The replaced range in the pre-change text.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }

    /// Number of chars inserted.
    pub fn inserted_len(&self) -> usize {
        self.inserted_text.chars().count()
    }
}

/// Order a batch for application to a single buffer.
///
/// Changes are applied highest offset first so earlier offsets in the same
/// batch stay valid. The sort is stable, so changes sharing an offset keep
/// their submitted order.
pub fn ordered_for_apply(changes: &[TextChange]) -> Vec<&TextChange> {
    let mut ordered: Vec<&TextChange> = changes.iter().collect();
    ordered.sort_by(|a, b| b.offset.cmp(&a.offset));
    ordered
}

/// Apply a batch to a `String`, returning `None` if any change is out of bounds.
///
/// Bounds are checked for the whole batch before anything is mutated.
pub fn apply_to_string(text: &str, changes: &[TextChange]) -> Option<String> {
    let len = text.chars().count();
    if changes.iter().any(|c| c.end() > len) {
        return None;
    }

    let mut out = text.to_string();
    for change in ordered_for_apply(changes) {
        let start = char_to_byte(&out, change.offset);
        let end = char_to_byte(&out, change.end());
        out.replace_range(start..end, &change.inserted_text);
    }
    Some(out)
}

fn char_to_byte(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map(|(b, _)| b)
        .unwrap_or(text.len())
}
