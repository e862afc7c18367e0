//! Live rendering: raw markdown text plus selection in, decorations out.
//!
//! A pass discards the previous set and rebuilds everything for the lines in
//! the viewport (plus margin). Block structure is discovered from the top of
//! the document so a viewport that starts inside a fence still renders it as
//! code. Per line, rules run in a fixed order: quote, horizontal rule, list
//! markers, ATX heading, then inline spans. Fences, tables and setext headings
//! are handled as blocks before that.
//!
//! Rendering never blocks on resource resolution. Image widgets take whatever
//! state `ImageStates` reports right now; when a resolution lands, the owner
//! invalidates with `Trigger::ForceRedraw` and renders again.

mod block;
mod decoration;
mod inline;
mod lines;
mod rules;
mod table;

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use quire_protocol::{EditorSettings, TextChange};
use web_time::Instant;

#[cfg(not(all(target_family = "wasm", target_os = "unknown")))]
pub(crate) use regex::Regex;
#[cfg(all(target_family = "wasm", target_os = "unknown"))]
pub(crate) use regex_lite::Regex;

pub use block::{BlockMap, LineRole, scan_blocks};
pub use decoration::{
    Alignment, Decoration, DecorationKind, DecorationSet, ImageState, ImageWidget, MarkScope,
    Side, TableWidget, Widget,
};
pub use lines::{Line, split_lines};
pub use rules::SYNTAX;

use crate::error::RenderError;
use crate::types::{Selection, Viewport};

/// Why the decoration set must be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    TextChanged,
    ViewportChanged,
    SelectionChanged,
    /// An async resource resolved, or settings changed under the cache.
    ForceRedraw,
}

/// Inputs of one render pass.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub selection: Selection,
    pub viewport: Viewport,
    pub settings: &'a EditorSettings,
}

/// Reports the current load state of an image reference.
///
/// Called once per image widget per pass. Implementations may start a
/// resolution as a side effect but must answer immediately.
pub trait ImageStates {
    fn image_state(&mut self, reference: &str) -> ImageState;
}

/// Unit type implementation - every image stays loading.
impl ImageStates for () {
    fn image_state(&mut self, _reference: &str) -> ImageState {
        ImageState::Loading
    }
}

impl<T: ImageStates + ?Sized> ImageStates for &mut T {
    fn image_state(&mut self, reference: &str) -> ImageState {
        (**self).image_state(reference)
    }
}

impl<T: ImageStates> ImageStates for Option<T> {
    fn image_state(&mut self, reference: &str) -> ImageState {
        match self {
            Some(states) => states.image_state(reference),
            None => ImageState::Loading,
        }
    }
}

/// A failed render pass, as reported to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderDiagnostic {
    pub message: String,
    /// Document length in chars at the time of the failure.
    pub doc_len: usize,
    pub elapsed: Duration,
}

/// Receives render failures before the error is returned to the caller.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: RenderDiagnostic);
}

impl DiagnosticSink for () {
    fn report(&mut self, _diagnostic: RenderDiagnostic) {}
}

impl DiagnosticSink for Vec<RenderDiagnostic> {
    fn report(&mut self, diagnostic: RenderDiagnostic) {
        self.push(diagnostic);
    }
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for &mut T {
    fn report(&mut self, diagnostic: RenderDiagnostic) {
        (**self).report(diagnostic);
    }
}

/// The edit toggling the task checkbox on `line`, if the line is a task item.
pub fn task_toggle(line: &Line<'_>) -> Option<TextChange> {
    rules::task_toggle(line)
}

fn overlaps_window(lines: &Range<usize>, window: &Range<usize>) -> bool {
    lines.start < window.end && window.start < lines.end
}

/// Build the decoration set for `text`. Pure; images come out `Loading`.
pub fn build_decorations(text: &str, ctx: &RenderContext<'_>) -> DecorationSet {
    let lines = split_lines(text);
    let blocks = scan_blocks(&lines);
    let window = ctx.viewport.with_margin(ctx.settings.viewport_margin);
    let rule_ctx = rules::RuleContext::new(ctx.selection, ctx.settings);
    let mut out = Vec::new();

    for fence in &blocks.fences {
        if overlaps_window(&fence.lines, &window) {
            rules::fence(&lines, fence, &window, &rule_ctx, &mut out);
        }
    }

    for table in &blocks.tables {
        if !overlaps_window(&table.lines, &window) {
            continue;
        }
        rules::table(&lines, table, &window, &rule_ctx, &mut out);
    }

    for heading in &blocks.setext {
        let heading_lines = heading.text_line..heading.text_line + 2;
        if overlaps_window(&heading_lines, &window) {
            rules::setext(&lines, heading, &rule_ctx, &mut out);
            if let Some(line) = lines.get(heading.text_line) {
                inline::decorate(line, 0, &rule_ctx, &mut out);
            }
        }
    }

    let visible = window.start.min(lines.len())..window.end.min(lines.len());
    for line in &lines[visible] {
        if blocks.role(line.index) != LineRole::Plain {
            continue;
        }
        let mut content = rules::quote(line, &rule_ctx, &mut out);
        if rules::horizontal_rule(line, content, &rule_ctx, &mut out) {
            continue;
        }
        content = rules::list_marker(line, content, &rule_ctx, &mut out);
        content = rules::atx_heading(line, content, &rule_ctx, &mut out);
        inline::decorate(line, content, &rule_ctx, &mut out);
    }

    DecorationSet::new(out)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Caches the last decoration set and rebuilds it when triggered.
#[derive(Debug, Default)]
pub struct LiveRenderer {
    last: Option<DecorationSet>,
    pending: Vec<Trigger>,
    passes: u64,
}

impl LiveRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a rebuild on the next `render`.
    pub fn invalidate(&mut self, trigger: Trigger) {
        if !self.pending.contains(&trigger) {
            self.pending.push(trigger);
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.last.is_none() || !self.pending.is_empty()
    }

    /// The most recent successful set, if any.
    pub fn last(&self) -> Option<&DecorationSet> {
        self.last.as_ref()
    }

    /// Completed passes, for diagnostics.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Return the current decorations, rebuilding them if a trigger is
    /// pending.
    ///
    /// A failing pass is reported to `sink` before the error is returned, and
    /// the renderer stays dirty.
    pub fn render(
        &mut self,
        text: &str,
        ctx: &RenderContext<'_>,
        images: impl ImageStates,
        sink: impl DiagnosticSink,
    ) -> Result<&DecorationSet, RenderError> {
        self.render_with(text, ctx, images, sink, build_decorations)
    }

    fn render_with(
        &mut self,
        text: &str,
        ctx: &RenderContext<'_>,
        mut images: impl ImageStates,
        mut sink: impl DiagnosticSink,
        build: impl FnOnce(&str, &RenderContext<'_>) -> DecorationSet,
    ) -> Result<&DecorationSet, RenderError> {
        let set = match self.last.take() {
            Some(set) if self.pending.is_empty() => set,
            _ => {
                let started = Instant::now();
                let built = panic::catch_unwind(AssertUnwindSafe(|| build(text, ctx)));
                let elapsed = started.elapsed();

                let mut set = match built {
                    Ok(set) => set,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        tracing::error!(
                            target: "quire::render",
                            %message,
                            triggers = ?self.pending,
                            "decoration pass failed"
                        );
                        sink.report(RenderDiagnostic {
                            message: message.clone(),
                            doc_len: text.chars().count(),
                            elapsed,
                        });
                        return Err(RenderError::Panicked { message });
                    }
                };

                for image in set.images_mut() {
                    image.state = images.image_state(&image.reference);
                }

                self.passes += 1;
                tracing::trace!(
                    target: "quire::render",
                    triggers = ?self.pending,
                    decorations = set.len(),
                    elapsed_us = elapsed.as_micros() as u64,
                    "decorations rebuilt"
                );
                self.pending.clear();
                set
            }
        };
        Ok(self.last.insert(set))
    }
}

#[cfg(test)]
mod tests {
    use quire_protocol::SyntaxVisibility;

    use super::*;

    fn render(text: &str, selection: Selection) -> DecorationSet {
        let settings = EditorSettings::default();
        build_decorations(
            text,
            &RenderContext {
                selection,
                viewport: Viewport::everything(),
                settings: &settings,
            },
        )
    }

    #[test]
    fn test_heading_dims_hashes_away_from_cursor() {
        let set = render("# Title\n\nbody", Selection::cursor(13));
        insta::assert_snapshot!(set.to_string(), @r"
        0..7 line md-line-heading md-line-h1
        0..2 mark md-syntax
        2..7 mark md-heading md-h1
        ");
    }

    #[test]
    fn test_heading_hashes_full_strength_under_cursor() {
        let set = render("# Title\n\nbody", Selection::cursor(4));
        assert!(set.has_mark(2..7, "md-h1"));
        assert_eq!(set.marks_with(SYNTAX).count(), 0);
    }

    #[test]
    fn test_show_mode_never_dims_but_still_replaces() {
        let settings = EditorSettings {
            syntax_visibility: SyntaxVisibility::Show,
            ..EditorSettings::default()
        };
        let set = build_decorations(
            "# T\n\n---\n\nend",
            &RenderContext {
                selection: Selection::cursor(12),
                viewport: Viewport::everything(),
                settings: &settings,
            },
        );
        assert_eq!(set.marks_with(SYNTAX).count(), 0);
        assert!(set.is_replaced(5..8));
    }

    #[test]
    fn test_fence_hidden_with_language_label() {
        let text = "```rust\nlet x = 1;\n```\n\nafter";
        let set = render(text, Selection::cursor(26));
        insta::assert_snapshot!(set.to_string(), @r"
        0..7 line md-code-block
        0..7 replace lang(rust)
        8..18 line md-code-block
        19..22 line md-code-block
        19..22 hide
        ");
    }

    #[test]
    fn test_fence_revealed_when_selection_inside() {
        let text = "```rust\nlet x = 1;\n```\n\nafter";
        let set = render(text, Selection::cursor(10));
        assert!(!set.iter().any(Decoration::is_replace));
        assert!(set.has_mark(0..7, SYNTAX));
        assert!(set.has_mark(19..22, SYNTAX));
        // code lines never get inline rules
        assert_eq!(set.marks_with("md-code-inline").count(), 0);
    }

    #[test]
    fn test_viewport_inside_fence_still_code() {
        let mut text = String::from("```\n");
        for i in 0..50 {
            text.push_str(&format!("# line {i}\n"));
        }
        text.push_str("```\n");
        let settings = EditorSettings {
            viewport_margin: 0,
            ..EditorSettings::default()
        };
        let set = build_decorations(
            &text,
            &RenderContext {
                selection: Selection::cursor(0),
                viewport: Viewport::lines(30..32),
                settings: &settings,
            },
        );
        assert_eq!(set.marks_with("md-code-block").count(), 2);
        assert_eq!(set.marks_with("md-heading").count(), 0);
    }

    #[test]
    fn test_only_viewport_lines_decorated() {
        let text: String = (0..100).map(|i| format!("**{i}**\n")).collect();
        let settings = EditorSettings {
            viewport_margin: 2,
            ..EditorSettings::default()
        };
        let set = build_decorations(
            &text,
            &RenderContext {
                selection: Selection::cursor(0),
                viewport: Viewport::lines(50..60),
                settings: &settings,
            },
        );
        assert_eq!(set.marks_with("md-bold").count(), 14);
    }

    #[test]
    fn test_task_checkbox_and_bullet() {
        let text = "- [ ] todo\n- plain\n\nend";
        let set = render(text, Selection::cursor(22));
        insta::assert_snapshot!(set.to_string(), @r"
        0..6 replace checkbox[ ]
        11..13 replace bullet
        ");
        let toggle = set.iter().find_map(|d| match d.widget_ref() {
            Some(Widget::Checkbox { toggle, .. }) => Some(toggle.clone()),
            _ => None,
        });
        assert_eq!(toggle, Some(TextChange::replace(3..4, "x")));
    }

    #[test]
    fn test_quote_depth() {
        let set = render("> > nested\n\nend", Selection::cursor(14));
        assert!(set.has_mark(0..10, "md-quote-depth-2"));
        assert!(set.has_mark(0..4, SYNTAX));
    }

    #[test]
    fn test_leading_inline_code_leaves_later_blocks_alone() {
        let set = render("```x``` is inline code\n\n# Title\n\nbody", Selection::cursor(37));
        assert!(!set.to_string().contains("md-code-block"));
        assert!(set.has_mark(26..31, "md-h1"));
    }

    #[test]
    fn test_rule_above_dashes_stays_a_rule() {
        let set = render("***\n---\n\ntail", Selection::cursor(13));
        assert!(set.is_replaced(0..3));
        assert!(set.is_replaced(4..7));
        assert!(!set.to_string().contains("md-h2"));
    }

    #[test]
    fn test_raw_table_only_marks_pipes() {
        let set = render("| **a** | b |\n|---|---|\n| 1 | 2 |", Selection::cursor(3));
        assert_eq!(set.tables().count(), 0);
        assert_eq!(set.marks_with("md-bold").count(), 0);
        assert!(set.marks_with("md-table-raw-pipe").count() > 0);
        assert!(set.iter().all(|d| d.class().is_none_or(|c| c.contains("md-table-raw-pipe"))));
    }

    #[test]
    fn test_setext_underline_hidden() {
        let set = render("Title\n===\n\nend", Selection::cursor(14));
        assert!(set.has_mark(0..5, "md-h1"));
        assert!(set.is_replaced(6..9));
    }

    #[test]
    fn test_render_panic_reported_then_returned() {
        let settings = EditorSettings::default();
        let ctx = RenderContext {
            selection: Selection::cursor(0),
            viewport: Viewport::everything(),
            settings: &settings,
        };
        let mut renderer = LiveRenderer::new();
        let mut diagnostics: Vec<RenderDiagnostic> = Vec::new();
        let err = renderer
            .render_with("abc", &ctx, (), &mut diagnostics, |_, _| {
                panic!("rule exploded")
            })
            .unwrap_err();
        assert!(matches!(err, RenderError::Panicked { ref message } if message == "rule exploded"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].doc_len, 3);
        assert!(renderer.is_dirty());
    }

    #[test]
    fn test_cached_until_triggered() {
        let settings = EditorSettings::default();
        let ctx = RenderContext {
            selection: Selection::cursor(0),
            viewport: Viewport::everything(),
            settings: &settings,
        };
        let mut renderer = LiveRenderer::new();
        renderer.render("# a", &ctx, (), ()).unwrap();
        assert_eq!(renderer.passes(), 1);
        renderer.render("# a", &ctx, (), ()).unwrap();
        assert_eq!(renderer.passes(), 1);
        renderer.invalidate(Trigger::SelectionChanged);
        renderer.render("# a", &ctx, (), ()).unwrap();
        assert_eq!(renderer.passes(), 2);
    }
}
