//! Decoration output of a render pass.
//!
//! Decorations are a closed set of shapes interpreted by whatever draws the
//! surface. They never alter the underlying text.

use std::fmt;
use std::ops::Range;

use quire_protocol::TextChange;
use smol_str::SmolStr;

/// Whether a mark styles a span or the whole line it starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkScope {
    Inline,
    Line,
}

/// Which side of its anchor point a widget sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

/// Load state of an image widget.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageState {
    #[default]
    Loading,
    Ready { handle: String },
    Failed { reason: SmolStr },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageWidget {
    /// The reference as written in the document.
    pub reference: String,
    pub alt: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub state: ImageState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableWidget {
    pub alignments: Vec<Alignment>,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableWidget {
    pub fn column_count(&self) -> usize {
        self.alignments.len()
    }

    /// Rows including the header row.
    pub fn row_count(&self) -> usize {
        self.rows.len() + 1
    }
}

/// Non-text elements a decoration can draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Widget {
    HorizontalRule,
    CodeLanguage { label: SmolStr },
    Table(TableWidget),
    /// Activating the checkbox applies `toggle` as a local edit.
    Checkbox { checked: bool, toggle: TextChange },
    Bullet,
    Image(ImageWidget),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecorationKind {
    /// Attach a style class without altering content.
    Mark { class: SmolStr, scope: MarkScope },
    /// Visually remove the range, optionally drawing a widget instead.
    Replace { widget: Option<Widget> },
    /// Insert a widget at a point (the range is empty).
    Widget { widget: Widget, side: Side },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    /// Char range in the document.
    pub range: Range<usize>,
    pub kind: DecorationKind,
}

impl Decoration {
    pub fn mark(range: Range<usize>, class: impl Into<SmolStr>) -> Self {
        Self {
            range,
            kind: DecorationKind::Mark {
                class: class.into(),
                scope: MarkScope::Inline,
            },
        }
    }

    pub fn line(range: Range<usize>, class: impl Into<SmolStr>) -> Self {
        Self {
            range,
            kind: DecorationKind::Mark {
                class: class.into(),
                scope: MarkScope::Line,
            },
        }
    }

    pub fn hide(range: Range<usize>) -> Self {
        Self {
            range,
            kind: DecorationKind::Replace { widget: None },
        }
    }

    pub fn replace(range: Range<usize>, widget: Widget) -> Self {
        Self {
            range,
            kind: DecorationKind::Replace {
                widget: Some(widget),
            },
        }
    }

    pub fn widget(at: usize, side: Side, widget: Widget) -> Self {
        Self {
            range: at..at,
            kind: DecorationKind::Widget { widget, side },
        }
    }

    pub fn class(&self) -> Option<&str> {
        match &self.kind {
            DecorationKind::Mark { class, .. } => Some(class.as_str()),
            _ => None,
        }
    }

    pub fn widget_ref(&self) -> Option<&Widget> {
        match &self.kind {
            DecorationKind::Replace { widget } => widget.as_ref(),
            DecorationKind::Widget { widget, .. } => Some(widget),
            DecorationKind::Mark { .. } => None,
        }
    }

    pub fn is_replace(&self) -> bool {
        matches!(self.kind, DecorationKind::Replace { .. })
    }
}

/// The full decoration set of one render pass, ordered by position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecorationSet {
    decorations: Vec<Decoration>,
}

impl DecorationSet {
    pub fn new(mut decorations: Vec<Decoration>) -> Self {
        // wider ranges first at the same start, so line marks lead
        decorations.sort_by(|a, b| {
            a.range
                .start
                .cmp(&b.range.start)
                .then(b.range.end.cmp(&a.range.end))
        });
        Self { decorations }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Decoration> {
        self.decorations.iter()
    }

    pub fn len(&self) -> usize {
        self.decorations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decorations.is_empty()
    }

    /// Mark decorations whose class list contains `class`.
    pub fn marks_with<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a Decoration> + 'a {
        self.decorations.iter().filter(move |d| {
            d.class()
                .is_some_and(|c| c.split_whitespace().any(|part| part == class))
        })
    }

    /// Whether some mark with `class` covers exactly `range`.
    pub fn has_mark(&self, range: Range<usize>, class: &str) -> bool {
        self.marks_with(class).any(|d| d.range == range)
    }

    /// Whether `range` is hidden or replaced by a single decoration.
    pub fn is_replaced(&self, range: Range<usize>) -> bool {
        self.decorations
            .iter()
            .any(|d| d.is_replace() && d.range.start <= range.start && d.range.end >= range.end)
    }

    pub fn widgets(&self) -> impl Iterator<Item = &Widget> {
        self.decorations.iter().filter_map(Decoration::widget_ref)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableWidget> {
        self.widgets().filter_map(|w| match w {
            Widget::Table(t) => Some(t),
            _ => None,
        })
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageWidget> {
        self.widgets().filter_map(|w| match w {
            Widget::Image(img) => Some(img),
            _ => None,
        })
    }

    pub(crate) fn images_mut(&mut self) -> impl Iterator<Item = &mut ImageWidget> {
        self.decorations.iter_mut().filter_map(|d| match &mut d.kind {
            DecorationKind::Replace {
                widget: Some(Widget::Image(img)),
            }
            | DecorationKind::Widget {
                widget: Widget::Image(img),
                ..
            } => Some(img),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a DecorationSet {
    type Item = &'a Decoration;
    type IntoIter = std::slice::Iter<'a, Decoration>;

    fn into_iter(self) -> Self::IntoIter {
        self.decorations.iter()
    }
}

impl fmt::Display for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Widget::HorizontalRule => write!(f, "hr"),
            Widget::CodeLanguage { label } => write!(f, "lang({label})"),
            Widget::Table(t) => write!(f, "table({}x{})", t.row_count(), t.column_count()),
            Widget::Checkbox { checked, .. } => {
                write!(f, "checkbox[{}]", if *checked { "x" } else { " " })
            }
            Widget::Bullet => write!(f, "bullet"),
            Widget::Image(img) => match &img.state {
                ImageState::Loading => write!(f, "image(loading) {}", img.reference),
                ImageState::Ready { handle } => write!(f, "image(ready) {handle}"),
                ImageState::Failed { reason } => {
                    write!(f, "image(failed: {reason}) {}", img.reference)
                }
            },
        }
    }
}

impl fmt::Display for Decoration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Range { start, end } = &self.range;
        match &self.kind {
            DecorationKind::Mark {
                class,
                scope: MarkScope::Inline,
            } => write!(f, "{start}..{end} mark {class}"),
            DecorationKind::Mark {
                class,
                scope: MarkScope::Line,
            } => write!(f, "{start}..{end} line {class}"),
            DecorationKind::Replace { widget: None } => write!(f, "{start}..{end} hide"),
            DecorationKind::Replace {
                widget: Some(widget),
            } => write!(f, "{start}..{end} replace {widget}"),
            DecorationKind::Widget { widget, side } => {
                let side = match side {
                    Side::Before => "before",
                    Side::After => "after",
                };
                write!(f, "{start} widget {side} {widget}")
            }
        }
    }
}

/// One decoration per line, used for logs and snapshot tests.
impl fmt::Display for DecorationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.decorations {
            writeln!(f, "{d}")?;
        }
        Ok(())
    }
}
