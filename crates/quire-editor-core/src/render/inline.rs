//! Inline span rules.
//!
//! Spans are found on a working copy of the line. Once a rule claims bytes
//! (code span contents, link destinations, delimiters) they are masked out so
//! later rules cannot match inside them. Masking swaps each byte for `\x01`,
//! so byte positions stay aligned with the real line.

use std::ops::Range;
use std::sync::LazyLock;

use super::Regex;
use super::decoration::{Decoration, ImageState, ImageWidget, Side, Widget};
use super::lines::Line;
use super::rules::{RuleContext, SYNTAX};

static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(!?)\[([^\]\n]*)\]\(([^()\s]*)(?:[ \t]+"[^"]*")?\)"#).unwrap()
});

static HTML_IMG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<img\b[^>]*>").unwrap());

static HTML_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(src|alt|width|height)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#).unwrap()
});

static BOLD_STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(?:[^*\s]|[^*\s].*?[^*\s])\*\*").unwrap());

static BOLD_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__(?:[^_\s]|[^_\s].*?[^_\s])__").unwrap());

static STRIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~~(?:[^~\s]|[^~\s].*?[^~\s])~~").unwrap());

static ITALIC_STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*(?:[^*\s]|[^*\s].*?[^*\s])\*").unwrap());

static ITALIC_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(?:[^_\s]|[^_\s].*?[^_\s])_").unwrap());

const MASK: char = '\u{1}';

/// Working copy of a line's content with claimed bytes masked.
struct Masked<'l, 'a> {
    line: &'l Line<'a>,
    /// Byte offset of the content within the line.
    base: usize,
    work: String,
}

impl<'l, 'a> Masked<'l, 'a> {
    fn new(line: &'l Line<'a>, base: usize) -> Self {
        Self {
            line,
            base,
            work: line.text[base..].to_string(),
        }
    }

    fn mask(&mut self, range: Range<usize>) {
        let filler: String = std::iter::repeat_n(MASK, range.len()).collect();
        self.work.replace_range(range, &filler);
    }

    /// The unmasked content for a byte range of the working copy.
    fn original(&self, range: Range<usize>) -> &'a str {
        let text: &'a str = self.line.text;
        &text[self.base + range.start..self.base + range.end]
    }

    /// Document char range for a byte range of the working copy.
    fn span(&self, range: Range<usize>) -> Range<usize> {
        self.line.span(self.base + range.start..self.base + range.end)
    }

    fn char_before(&self, byte: usize) -> Option<char> {
        self.line.text[..self.base + byte].chars().next_back()
    }

    fn char_after(&self, byte: usize) -> Option<char> {
        self.line.text[self.base + byte..].chars().next()
    }
}

/// Hide delimiters outside the selection, dim them inside it.
fn delimiters(
    whole: &Range<usize>,
    parts: &[Range<usize>],
    ctx: &RuleContext<'_>,
    out: &mut Vec<Decoration>,
) {
    if !ctx.overlaps(whole) {
        out.extend(parts.iter().cloned().map(Decoration::hide));
    } else if ctx.mode.dims(true) {
        out.extend(
            parts
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| Decoration::mark(p.clone(), SYNTAX)),
        );
    }
}

/// Code spans: a backtick run closed by a run of exactly the same length.
fn code_spans(s: &str) -> Vec<(Range<usize>, Range<usize>)> {
    let bytes = s.as_bytes();
    let run_at = |i: usize| bytes[i..].iter().take_while(|b| **b == b'`').count();

    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let open = run_at(i);
        let mut k = i + open;
        let mut close = None;
        while k < bytes.len() {
            if bytes[k] == b'`' {
                let run = run_at(k);
                if run == open {
                    close = Some(k);
                    break;
                }
                k += run;
            } else {
                k += 1;
            }
        }
        match close {
            Some(k) => {
                spans.push((i..i + open, k..k + open));
                i = k + open;
            }
            None => i += open,
        }
    }
    spans
}

fn parse_dimension(raw: &str) -> Option<u32> {
    raw.trim().trim_end_matches("px").parse().ok()
}

fn html_image(tag: &str) -> Option<ImageWidget> {
    let mut src = None;
    let mut alt = String::new();
    let mut width = None;
    let mut height = None;
    for caps in HTML_ATTR.captures_iter(tag) {
        let Some(name) = caps.get(1) else { continue };
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());
        match name.as_str().to_ascii_lowercase().as_str() {
            "src" => src = Some(value.to_string()),
            "alt" => alt = value.to_string(),
            "width" => width = parse_dimension(value),
            "height" => height = parse_dimension(value),
            _ => {}
        }
    }
    Some(ImageWidget {
        reference: src.filter(|s| !s.is_empty())?,
        alt,
        width,
        height,
        state: ImageState::Loading,
    })
}

fn value_span(tag: &str, name: &str) -> Option<Range<usize>> {
    HTML_ATTR.captures_iter(tag).find_map(|caps| {
        let attr = caps.get(1)?;
        if !attr.as_str().eq_ignore_ascii_case(name) {
            return None;
        }
        caps.get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.range())
    })
}

/// Paired delimiter spans (bold, strike, italic) of width `delim`.
fn paired(
    m: &mut Masked<'_, '_>,
    re: &Regex,
    delim: usize,
    class: &str,
    word_bound: bool,
    ctx: &RuleContext<'_>,
    out: &mut Vec<Decoration>,
) {
    let found: Vec<Range<usize>> = re.find_iter(&m.work).map(|f| f.range()).collect();
    for range in found {
        if word_bound
            && (m.char_before(range.start).is_some_and(char::is_alphanumeric)
                || m.char_after(range.end).is_some_and(char::is_alphanumeric))
        {
            continue;
        }
        let open = range.start..range.start + delim;
        let close = range.end - delim..range.end;
        let whole = m.span(range.clone());
        out.push(Decoration::mark(m.span(open.end..close.start), class));
        delimiters(&whole, &[m.span(open.clone()), m.span(close.clone())], ctx, out);
        m.mask(open);
        m.mask(close);
    }
}

/// Decorate inline spans in `line` from byte `content` onward.
pub fn decorate(
    line: &Line<'_>,
    content: usize,
    ctx: &RuleContext<'_>,
    out: &mut Vec<Decoration>,
) {
    if content >= line.text.len() {
        return;
    }
    let mut m = Masked::new(line, content);

    for (open, close) in code_spans(&m.work) {
        let whole = m.span(open.start..close.end);
        if open.end < close.start {
            out.push(Decoration::mark(
                m.span(open.end..close.start),
                "md-code-inline",
            ));
        }
        delimiters(&whole, &[m.span(open.clone()), m.span(close.clone())], ctx, out);
        m.mask(open.start..close.end);
    }

    let tags: Vec<Range<usize>> = HTML_IMG.find_iter(&m.work).map(|f| f.range()).collect();
    for tag in tags {
        let text = m.original(tag.clone());
        if let Some(widget) = html_image(text).filter(|_| ctx.settings.render_images) {
            let whole = m.span(tag.clone());
            if !ctx.overlaps(&whole) {
                out.push(Decoration::replace(whole, Widget::Image(widget)));
            } else {
                if let Some(src) = value_span(text, "src") {
                    out.push(Decoration::mark(
                        m.span(tag.start + src.start..tag.start + src.end),
                        "md-image-src",
                    ));
                }
                out.push(Decoration::widget(whole.end, Side::After, Widget::Image(widget)));
            }
        }
        m.mask(tag);
    }

    let links: Vec<_> = LINK
        .captures_iter(&m.work)
        .filter_map(|caps| {
            Some((
                caps.get(0)?.range(),
                !caps.get(1)?.as_str().is_empty(),
                caps.get(2)?.range(),
                caps.get(3)?.range(),
            ))
        })
        .collect();
    for (range, is_image, label, dest) in links {
        let whole = m.span(range.clone());
        let open = range.start..label.start;
        let close = label.end..range.end;

        if !is_image && !label.is_empty() {
            out.push(Decoration::mark(m.span(label.clone()), "md-link"));
        }
        if ctx.overlaps(&whole) {
            let dest_class = if is_image { "md-image-src" } else { SYNTAX };
            if (is_image || ctx.mode.dims(true)) && !dest.is_empty() {
                out.push(Decoration::mark(m.span(dest.clone()), dest_class));
            }
            delimiters(
                &whole,
                &[
                    m.span(open.clone()),
                    m.span(label.end..dest.start),
                    m.span(dest.end..range.end),
                ],
                ctx,
                out,
            );
        } else {
            delimiters(&whole, &[m.span(open.clone()), m.span(close.clone())], ctx, out);
        }

        if is_image && ctx.settings.render_images && !dest.is_empty() {
            out.push(Decoration::widget(
                whole.end,
                Side::After,
                Widget::Image(ImageWidget {
                    reference: m.original(dest.clone()).to_string(),
                    alt: m.work[label.clone()].replace(MASK, ""),
                    width: None,
                    height: None,
                    state: ImageState::Loading,
                }),
            ));
        }
        m.mask(open);
        m.mask(close);
    }

    paired(&mut m, &BOLD_STAR, 2, "md-bold", false, ctx, out);
    paired(&mut m, &BOLD_UNDERSCORE, 2, "md-bold", true, ctx, out);
    paired(&mut m, &STRIKE, 2, "md-strike", false, ctx, out);
    paired(&mut m, &ITALIC_STAR, 1, "md-italic", false, ctx, out);
    paired(&mut m, &ITALIC_UNDERSCORE, 1, "md-italic", true, ctx, out);
}
