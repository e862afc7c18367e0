//! Line and block rules.
//!
//! Each rule looks at one line (or one discovered block) and pushes its
//! decorations. Rules never read another rule's output; the caller threads
//! the content offset from one rule to the next.

use std::ops::Range;
use std::sync::LazyLock;

use quire_protocol::{EditorSettings, SyntaxVisibility, TextChange};
use smol_str::format_smolstr;

use super::Regex;
use super::block::{FenceBlock, SetextHeading, TableBlock};
use super::decoration::{Decoration, Widget};
use super::lines::Line;
use super::table;
use crate::types::Selection;

/// Class for dimmed markup.
pub const SYNTAX: &str = "md-syntax";

static QUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?: {0,3}>[ \t]?)+").unwrap());

static TASK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*([-*+]|\d{1,9}[.)])[ \t]+\[([ xX])\](?:[ \t]|$)").unwrap()
});

static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*([-*+])(?:[ \t]+|$)").unwrap());

static ORDERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*(\d{1,9}[.)])(?:[ \t]+|$)").unwrap());

static ATX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ {0,3}(#{1,6})(?:[ \t]+|$)").unwrap());

static ATX_CLOSING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|[ \t]+)#+[ \t]*$").unwrap());

/// Selection and mode shared by every rule in a pass.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub selection: Selection,
    pub mode: SyntaxVisibility,
    pub settings: &'a EditorSettings,
}

impl<'a> RuleContext<'a> {
    pub fn new(selection: Selection, settings: &'a EditorSettings) -> Self {
        Self {
            selection,
            mode: settings.syntax_visibility,
            settings,
        }
    }

    pub fn overlaps(&self, span: &Range<usize>) -> bool {
        self.selection.overlaps(span)
    }

    /// Whether ordinary markup on `span` is dimmed.
    pub fn dims(&self, span: &Range<usize>) -> bool {
        self.mode.dims(self.overlaps(span))
    }

    /// Whether markup that is only visible because the selection reveals it
    /// is dimmed.
    pub fn dims_revealed(&self) -> bool {
        self.mode != SyntaxVisibility::Show
    }
}

/// Leading quote markers. Returns the byte offset where content starts.
pub fn quote(line: &Line<'_>, ctx: &RuleContext<'_>, out: &mut Vec<Decoration>) -> usize {
    let Some(m) = QUOTE.find(line.text) else {
        return 0;
    };
    let depth = m.as_str().matches('>').count();
    out.push(Decoration::line(
        line.range(),
        format_smolstr!("md-quote-depth-{depth}"),
    ));
    if ctx.dims(&line.range()) {
        out.push(Decoration::mark(line.span(m.range()), SYNTAX));
    }
    m.end()
}

pub(crate) fn is_horizontal_rule(text: &str) -> bool {
    if text.len() - text.trim_start_matches(' ').len() > 3 {
        return false;
    }
    let mut marks = text.chars().filter(|c| !c.is_whitespace());
    let Some(first) = marks.next() else {
        return false;
    };
    matches!(first, '-' | '*' | '_') && {
        let mut count = 1;
        marks.all(|c| {
            count += 1;
            c == first
        }) && count >= 3
    }
}

/// Thematic break. Returns true when the line was consumed.
pub fn horizontal_rule(
    line: &Line<'_>,
    content: usize,
    ctx: &RuleContext<'_>,
    out: &mut Vec<Decoration>,
) -> bool {
    if !is_horizontal_rule(&line.text[content..]) {
        return false;
    }
    let span = line.span(content..line.text.len());
    if !ctx.overlaps(&line.range()) {
        out.push(Decoration::replace(span, Widget::HorizontalRule));
    } else if ctx.dims_revealed() {
        out.push(Decoration::mark(span, SYNTAX));
    }
    true
}

/// The edit that flips the task checkbox on `line`, if it has one.
pub fn task_toggle(line: &Line<'_>) -> Option<TextChange> {
    let content = QUOTE.find(line.text).map_or(0, |m| m.end());
    let caps = TASK.captures(&line.text[content..])?;
    let state = caps.get(2)?;
    let checked = state.as_str() != " ";
    let at = line.char_at(content + state.start());
    Some(TextChange::replace(at..at + 1, if checked { " " } else { "x" }))
}

/// Task, bullet and ordered list markers. Returns the new content offset.
pub fn list_marker(
    line: &Line<'_>,
    content: usize,
    ctx: &RuleContext<'_>,
    out: &mut Vec<Decoration>,
) -> usize {
    let rest = &line.text[content..];

    if let Some(caps) = TASK.captures(rest) {
        if let (Some(whole), Some(marker), Some(state)) = (caps.get(0), caps.get(1), caps.get(2)) {
            let span = line.span(content + marker.start()..content + whole.end());
            if !ctx.overlaps(&span) {
                let checked = state.as_str() != " ";
                let at = line.char_at(content + state.start());
                let toggle = TextChange::replace(at..at + 1, if checked { " " } else { "x" });
                out.push(Decoration::replace(span, Widget::Checkbox { checked, toggle }));
            } else if ctx.dims_revealed() {
                out.push(Decoration::mark(span, SYNTAX));
            }
            return content + whole.end();
        }
    }

    if let Some(caps) = BULLET.captures(rest) {
        if let (Some(whole), Some(marker)) = (caps.get(0), caps.get(1)) {
            let span = line.span(content + marker.start()..content + whole.end());
            if !ctx.overlaps(&span) {
                out.push(Decoration::replace(span, Widget::Bullet));
            } else if ctx.dims_revealed() {
                out.push(Decoration::mark(span, SYNTAX));
            }
            return content + whole.end();
        }
    }

    if let Some(caps) = ORDERED.captures(rest) {
        if let (Some(whole), Some(marker)) = (caps.get(0), caps.get(1)) {
            let span = line.span(content + marker.start()..content + marker.end());
            if ctx.dims(&span) {
                out.push(Decoration::mark(span, SYNTAX));
            }
            return content + whole.end();
        }
    }

    content
}

/// ATX heading. Returns the new content offset.
pub fn atx_heading(
    line: &Line<'_>,
    content: usize,
    ctx: &RuleContext<'_>,
    out: &mut Vec<Decoration>,
) -> usize {
    let rest = &line.text[content..];
    let Some(caps) = ATX.captures(rest) else {
        return content;
    };
    let (Some(whole), Some(hashes)) = (caps.get(0), caps.get(1)) else {
        return content;
    };
    let level = hashes.as_str().len();
    let dim = ctx.dims(&line.range());

    out.push(Decoration::line(
        line.range(),
        format_smolstr!("md-line-heading md-line-h{level}"),
    ));
    if dim {
        out.push(Decoration::mark(
            line.span(content + hashes.start()..content + whole.end()),
            SYNTAX,
        ));
    }

    let body_start = content + whole.end();
    let mut body_end = body_start + line.text[body_start..].trim_end().len();
    if let Some(closing) = ATX_CLOSING.find(&line.text[body_start..body_end]) {
        let closing_start = body_start + closing.start();
        if dim {
            out.push(Decoration::mark(line.span(closing_start..body_end), SYNTAX));
        }
        body_end = closing_start;
    }

    if body_end > body_start {
        out.push(Decoration::mark(
            line.span(body_start..body_end),
            format_smolstr!("md-heading md-h{level}"),
        ));
    }
    body_start
}

fn lines_range(lines: &[Line<'_>], indices: &Range<usize>) -> Range<usize> {
    match (lines.get(indices.start), indices.end.checked_sub(1).and_then(|i| lines.get(i))) {
        (Some(first), Some(last)) => first.start..last.end(),
        _ => 0..0,
    }
}

/// Fenced code block.
pub fn fence(
    lines: &[Line<'_>],
    block: &FenceBlock,
    window: &Range<usize>,
    ctx: &RuleContext<'_>,
    out: &mut Vec<Decoration>,
) {
    let whole = lines_range(lines, &block.lines);
    let revealed = ctx.overlaps(&whole);
    let last = block.lines.end - 1;

    for line in &lines[block.lines.clone()] {
        if !window.contains(&line.index) {
            continue;
        }
        out.push(Decoration::line(line.range(), "md-code-block"));

        let is_fence_line =
            line.index == block.lines.start || (block.closed && line.index == last);
        if !is_fence_line {
            continue;
        }
        if revealed {
            if ctx.dims_revealed() && !line.text.is_empty() {
                out.push(Decoration::mark(line.range(), SYNTAX));
            }
        } else if line.index == block.lines.start {
            match &block.language {
                Some(label) => out.push(Decoration::replace(
                    line.range(),
                    Widget::CodeLanguage {
                        label: label.clone(),
                    },
                )),
                None => out.push(Decoration::hide(line.range())),
            }
        } else {
            out.push(Decoration::hide(line.range()));
        }
    }
}

/// Pipe table. Under the selection the lines stay raw with only their
/// pipes marked; cell content gets no inline styling.
pub fn table(
    lines: &[Line<'_>],
    block: &TableBlock,
    window: &Range<usize>,
    ctx: &RuleContext<'_>,
    out: &mut Vec<Decoration>,
) {
    let whole = lines_range(lines, &block.lines);
    let region = &lines[block.lines.clone()];

    if ctx.settings.render_tables && !ctx.overlaps(&whole) {
        let texts: Vec<&str> = region.iter().map(|l| l.text).collect();
        if let Some(widget) = table::parse_table(&texts) {
            out.push(Decoration::replace(whole, Widget::Table(widget)));
            return;
        }
    }

    let class = if ctx.dims_revealed() {
        "md-syntax md-table-raw-pipe"
    } else {
        "md-table-raw-pipe"
    };
    for line in region.iter().filter(|l| window.contains(&l.index)) {
        for pipe in table::pipe_positions(line.text) {
            out.push(Decoration::mark(line.span(pipe..pipe + 1), class));
        }
    }
}

/// Setext heading text line and underline.
pub fn setext(
    lines: &[Line<'_>],
    heading: &SetextHeading,
    ctx: &RuleContext<'_>,
    out: &mut Vec<Decoration>,
) {
    let level = heading.level;
    if let Some(text) = lines.get(heading.text_line) {
        out.push(Decoration::line(
            text.range(),
            format_smolstr!("md-line-heading md-line-h{level}"),
        ));
        let leading = text.text.len() - text.text.trim_start().len();
        let trailing = text.text.trim_end().len();
        if trailing > leading {
            out.push(Decoration::mark(
                text.span(leading..trailing),
                format_smolstr!("md-heading md-h{level}"),
            ));
        }
    }
    if let Some(underline) = lines.get(heading.text_line + 1) {
        if !ctx.overlaps(&underline.range()) {
            out.push(Decoration::hide(underline.range()));
        } else if ctx.dims_revealed() {
            out.push(Decoration::mark(underline.range(), SYNTAX));
        }
    }
}
