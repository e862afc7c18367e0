//! Selection and viewport state for the surface.

use std::ops::Range;

use quire_protocol::{TextChange, ordered_for_apply};

/// A selection range in char offsets, `from <= to`.
///
/// A zero-width selection is a plain cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub from: usize,
    pub to: usize,
}

impl Selection {
    /// Create a selection, normalizing order and clamping into `[0, doc_len]`.
    pub fn new(a: usize, b: usize, doc_len: usize) -> Self {
        let (from, to) = if a <= b { (a, b) } else { (b, a) };
        Self {
            from: from.min(doc_len),
            to: to.min(doc_len),
        }
    }

    /// A collapsed cursor at `pos`.
    pub fn cursor(pos: usize) -> Self {
        Self { from: pos, to: pos }
    }

    pub fn is_cursor(&self) -> bool {
        self.from == self.to
    }

    pub fn range(&self) -> Range<usize> {
        self.from..self.to
    }

    /// Inclusive overlap test.
    ///
    /// A cursor sitting exactly on either boundary of `span` overlaps it.
    pub fn overlaps(&self, span: &Range<usize>) -> bool {
        self.from <= span.end && self.to >= span.start
    }

    /// Clamp into a (possibly shorter) document.
    pub fn clamped(self, doc_len: usize) -> Self {
        Self::new(self.from, self.to, doc_len)
    }

    /// Map both ends through a batch of changes applied to the text.
    pub fn map_through(self, changes: &[TextChange]) -> Self {
        Self {
            from: map_offset(self.from, changes),
            to: map_offset(self.to, changes),
        }
    }
}

/// Map a char offset through a batch applied highest-offset first.
///
/// Positions inside a replaced range land at the end of the inserted text.
pub fn map_offset(mut pos: usize, changes: &[TextChange]) -> usize {
    for change in ordered_for_apply(changes) {
        let shifts = if change.length == 0 {
            pos > change.offset
        } else {
            pos >= change.end()
        };
        if shifts {
            pos = pos - change.length + change.inserted_len();
        } else if pos > change.offset {
            pos = change.offset + change.inserted_len();
        }
    }
    pos
}

/// Visible line window, `top..bottom` (bottom exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub top: usize,
    pub bottom: usize,
}

impl Viewport {
    pub fn lines(range: Range<usize>) -> Self {
        Self {
            top: range.start,
            bottom: range.end.max(range.start),
        }
    }

    /// A viewport covering every line.
    pub fn everything() -> Self {
        Self {
            top: 0,
            bottom: usize::MAX,
        }
    }

    /// Lines to decorate once `margin` lines are added on both sides.
    pub fn with_margin(&self, margin: u32) -> Range<usize> {
        let margin = margin as usize;
        self.top.saturating_sub(margin)..self.bottom.saturating_add(margin)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::everything()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_at_boundary_overlaps() {
        let span = 4..8;
        assert!(Selection::cursor(4).overlaps(&span));
        assert!(Selection::cursor(8).overlaps(&span));
        assert!(!Selection::cursor(9).overlaps(&span));
        assert!(!Selection::cursor(3).overlaps(&span));
        assert!(Selection { from: 0, to: 5 }.overlaps(&span));
    }

    #[test]
    fn test_new_normalizes_and_clamps() {
        assert_eq!(Selection::new(9, 2, 5), Selection { from: 2, to: 5 });
        assert_eq!(Selection::cursor(40).clamped(3), Selection::cursor(3));
    }

    #[test]
    fn test_map_through_insert_before() {
        let sel = Selection { from: 5, to: 7 };
        let mapped = sel.map_through(&[TextChange::insert(0, "ab")]);
        assert_eq!(mapped, Selection { from: 7, to: 9 });
    }

    #[test]
    fn test_map_through_delete_around() {
        // cursor inside the deleted range collapses to the deletion point
        let mapped = Selection::cursor(5).map_through(&[TextChange::delete(3..8)]);
        assert_eq!(mapped, Selection::cursor(3));

        let mapped = Selection::cursor(10).map_through(&[TextChange::delete(3..8)]);
        assert_eq!(mapped, Selection::cursor(5));
    }

    #[test]
    fn test_insert_at_cursor_keeps_cursor() {
        let mapped = Selection::cursor(3).map_through(&[TextChange::insert(3, "xyz")]);
        assert_eq!(mapped, Selection::cursor(3));
    }

    #[test]
    fn test_viewport_margin() {
        let vp = Viewport::lines(10..20);
        assert_eq!(vp.with_margin(5), 5..25);
        assert_eq!(vp.with_margin(50), 0..70);
    }
}
