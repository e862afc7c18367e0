//! Multi-line block discovery.
//!
//! Fences, tables and setext headings depend on lines outside the viewport,
//! so they are found by scanning the whole document from the start. The
//! result assigns every line a role; per-line rules only run on plain lines.

use std::ops::Range;
use std::sync::LazyLock;

use smol_str::SmolStr;

use super::lines::Line;
use super::rules::is_horizontal_rule;
use super::table;
use super::Regex;

static FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(`{3,}|~{3,})[ \t]*([^`\s]*)").unwrap());

static SETEXT_UNDERLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(=+|-+)[ \t]*$").unwrap());

/// Lines that can never be the text line of a setext heading.
static NOT_PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(#{1,6}(\s|$)|>|[-*+]\s|\d+[.)]\s|`{3,}|~{3,})").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceBlock {
    /// Line indices covered, fences included.
    pub lines: Range<usize>,
    pub language: Option<SmolStr>,
    /// False when the fence runs to the end of the document.
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBlock {
    /// Header, delimiter and body line indices.
    pub lines: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetextHeading {
    pub text_line: usize,
    pub level: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRole {
    Plain,
    Fence(usize),
    Table(usize),
    SetextText(usize),
    SetextUnderline(usize),
}

#[derive(Debug, Default)]
pub struct BlockMap {
    pub fences: Vec<FenceBlock>,
    pub tables: Vec<TableBlock>,
    pub setext: Vec<SetextHeading>,
    pub roles: Vec<LineRole>,
}

impl BlockMap {
    pub fn role(&self, line: usize) -> LineRole {
        self.roles.get(line).copied().unwrap_or(LineRole::Plain)
    }
}

/// Parse a fence opener, returning the fence char, run length and language.
///
/// A backtick run followed by another backtick on the same line is an
/// inline code span, not a fence.
fn fence_open(text: &str) -> Option<(char, usize, Option<SmolStr>)> {
    let caps = FENCE_OPEN.captures(text)?;
    let run_match = caps.get(1)?;
    let run = run_match.as_str();
    let marker = run.chars().next()?;
    if marker == '`' && text[run_match.end()..].contains('`') {
        return None;
    }
    let language = caps
        .get(2)
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .map(SmolStr::new);
    Some((marker, run.len(), language))
}

fn closes_fence(text: &str, marker: char, run: usize) -> bool {
    let trimmed = text.trim_start_matches(' ');
    if text.len() - trimmed.len() > 3 {
        return false;
    }
    let body = trimmed.trim_end();
    body.len() >= run && body.chars().all(|c| c == marker)
}

pub fn scan_blocks(lines: &[Line<'_>]) -> BlockMap {
    let mut map = BlockMap {
        roles: vec![LineRole::Plain; lines.len()],
        ..BlockMap::default()
    };

    let mut i = 0;
    while i < lines.len() {
        let text = lines[i].text;

        if let Some((marker, run, language)) = fence_open(text) {
            let close = (i + 1..lines.len()).find(|&j| closes_fence(lines[j].text, marker, run));
            let end = close.map_or(lines.len(), |j| j + 1);
            let idx = map.fences.len();
            map.fences.push(FenceBlock {
                lines: i..end,
                language,
                closed: close.is_some(),
            });
            for role in &mut map.roles[i..end] {
                *role = LineRole::Fence(idx);
            }
            i = end;
            continue;
        }

        if let Some(next) = lines.get(i + 1) {
            if table::is_table_start(text, next.text) {
                let mut end = i + 2;
                while end < lines.len() && lines[end].text.contains('|') {
                    end += 1;
                }
                let idx = map.tables.len();
                map.tables.push(TableBlock { lines: i..end });
                for role in &mut map.roles[i..end] {
                    *role = LineRole::Table(idx);
                }
                i = end;
                continue;
            }

            if !lines[i].is_blank() && !NOT_PARAGRAPH.is_match(text) && !is_horizontal_rule(text)
            {
                if let Some(caps) = SETEXT_UNDERLINE.captures(next.text) {
                    let level = if caps[1].starts_with('=') { 1 } else { 2 };
                    let idx = map.setext.len();
                    map.setext.push(SetextHeading {
                        text_line: i,
                        level,
                    });
                    map.roles[i] = LineRole::SetextText(idx);
                    map.roles[i + 1] = LineRole::SetextUnderline(idx);
                    i += 2;
                    continue;
                }
            }
        }

        i += 1;
    }

    map
}

#[cfg(test)]
mod tests {
    use super::super::lines::split_lines;
    use super::*;

    #[test]
    fn test_fence_with_language() {
        let lines = split_lines("text\n```rust\nfn main() {}\n```\nafter");
        let map = scan_blocks(&lines);
        assert_eq!(map.fences.len(), 1);
        assert_eq!(map.fences[0].lines, 1..4);
        assert_eq!(map.fences[0].language.as_deref(), Some("rust"));
        assert!(map.fences[0].closed);
        assert_eq!(map.role(0), LineRole::Plain);
        assert_eq!(map.role(2), LineRole::Fence(0));
        assert_eq!(map.role(4), LineRole::Plain);
    }

    #[test]
    fn test_fence_needs_same_char_and_length() {
        let lines = split_lines("````\n```\n~~~~\n````\nafter");
        let map = scan_blocks(&lines);
        assert_eq!(map.fences[0].lines, 0..4);
    }

    #[test]
    fn test_unclosed_fence_runs_to_end() {
        let lines = split_lines("~~~\n# not a heading\n| a | b |\n");
        let map = scan_blocks(&lines);
        assert_eq!(map.fences.len(), 1);
        assert!(!map.fences[0].closed);
        assert_eq!(map.fences[0].lines, 0..4);
        assert!(map.tables.is_empty());
    }

    #[test]
    fn test_table_region_extends_through_pipe_lines() {
        let lines = split_lines("a | b |c\n---|---|---\n1|2|3\n4|5|6\n\nnext");
        let map = scan_blocks(&lines);
        assert_eq!(map.tables.len(), 1);
        assert_eq!(map.tables[0].lines, 0..4);
        assert_eq!(map.role(5), LineRole::Plain);
    }

    #[test]
    fn test_setext_levels() {
        let lines = split_lines("Title\n=====\n\nSub\n---\n\n- item\n---");
        let map = scan_blocks(&lines);
        assert_eq!(
            map.setext,
            vec![
                SetextHeading { text_line: 0, level: 1 },
                SetextHeading { text_line: 3, level: 2 },
            ]
        );
        assert_eq!(map.role(1), LineRole::SetextUnderline(0));
        // a list item is not paragraph text, so the rule stays a rule
        assert_eq!(map.role(7), LineRole::Plain);
    }

    #[test]
    fn test_inline_code_at_line_start_is_not_a_fence() {
        let lines = split_lines("```x``` is inline code

# Title

body");
        let map = scan_blocks(&lines);
        assert!(map.fences.is_empty());
        assert!(map.roles.iter().all(|r| *r == LineRole::Plain));

        // tildes may appear in a tilde fence's info string
        let lines = split_lines("~~~ a`b
code
~~~");
        assert_eq!(scan_blocks(&lines).fences.len(), 1);
    }

    #[test]
    fn test_thematic_break_is_not_setext_text() {
        for doc in ["***\n---\n\ntail", "___\n---", "* * *\n==="] {
            let map = scan_blocks(&split_lines(doc));
            assert!(map.setext.is_empty(), "{doc:?}");
        }
        // paragraph text above a dash line is still a heading
        let map = scan_blocks(&split_lines("text ***\n---"));
        assert_eq!(map.setext.len(), 1);
    }
}
