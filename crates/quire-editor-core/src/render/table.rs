//! Pipe table parsing.

use super::decoration::{Alignment, TableWidget};

/// Byte positions of the structural pipes in a table line.
///
/// Escaped pipes (`\|`) and pipes inside single-backtick code spans are
/// cell content, not separators. A backtick with no closing partner is
/// literal.
pub fn pipe_positions(line: &str) -> Vec<usize> {
    let mut pipes = Vec::new();
    let mut in_code = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '`' if in_code => in_code = false,
            '`' if line[i + 1..].contains('`') => in_code = true,
            '|' if !in_code => pipes.push(i),
            _ => {}
        }
    }
    pipes
}

/// Split a table line into trimmed cell texts.
///
/// Leading and trailing pipes are optional.
pub fn split_cells(line: &str) -> Vec<String> {
    let pipes = pipe_positions(line);
    let mut bounds = Vec::with_capacity(pipes.len() + 2);
    bounds.push(0);
    for &p in &pipes {
        bounds.push(p);
        bounds.push(p + 1);
    }
    bounds.push(line.len());

    let mut cells: Vec<&str> = bounds.chunks(2).map(|b| &line[b[0]..b[1]]).collect();

    let trimmed = line.trim();
    if trimmed.starts_with('|') && cells.len() > 1 {
        cells.remove(0);
    }
    if trimmed.ends_with('|') && !trimmed.ends_with("\\|") && cells.len() > 1 {
        cells.pop();
    }

    cells
        .into_iter()
        .map(|cell| cell.trim().replace("\\|", "|"))
        .collect()
}

fn parse_alignment(cell: &str) -> Option<Alignment> {
    let leading = cell.starts_with(':');
    let trailing = cell.len() > 1 && cell.ends_with(':');
    let dashes = cell.trim_start_matches(':').trim_end_matches(':');
    if dashes.len() < 3 || !dashes.chars().all(|c| c == '-') {
        return None;
    }
    Some(match (leading, trailing) {
        (true, true) => Alignment::Center,
        (false, true) => Alignment::Right,
        _ => Alignment::Left,
    })
}

/// Parse the delimiter row under a table header.
pub fn parse_alignment_row(line: &str) -> Option<Vec<Alignment>> {
    if !line.contains('|') && !line.contains('-') {
        return None;
    }
    split_cells(line)
        .iter()
        .map(|cell| parse_alignment(cell))
        .collect()
}

/// Whether `header` followed by `delimiter` opens a table.
pub fn is_table_start(header: &str, delimiter: &str) -> bool {
    if !header.contains('|') {
        return false;
    }
    match parse_alignment_row(delimiter) {
        Some(alignments) => alignments.len() == split_cells(header).len(),
        None => false,
    }
}

/// Parse a table region: header line, delimiter line, then body lines.
///
/// Body rows are padded or truncated to the header's column count.
pub fn parse_table(lines: &[&str]) -> Option<TableWidget> {
    let [header, delimiter, body @ ..] = lines else {
        return None;
    };
    let alignments = parse_alignment_row(delimiter)?;
    let header = split_cells(header);
    if header.len() != alignments.len() {
        return None;
    }

    let columns = alignments.len();
    let rows = body
        .iter()
        .map(|line| {
            let mut cells = split_cells(line);
            cells.resize(columns, String::new());
            cells
        })
        .collect();

    Some(TableWidget {
        alignments,
        header,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_cells_optional_outer_pipes() {
        assert_eq!(split_cells("a | b |c"), vec!["a", "b", "c"]);
        assert_eq!(split_cells("| a | b |"), vec!["a", "b"]);
        assert_eq!(split_cells("|a|"), vec!["a"]);
    }

    #[test]
    fn test_escaped_and_code_pipes_are_content() {
        assert_eq!(split_cells(r"a \| b | c"), vec!["a | b", "c"]);
        assert_eq!(split_cells("`x | y` | z"), vec!["`x | y`", "z"]);
        // lone backtick is literal, so the pipe still splits
        assert_eq!(split_cells("a ` b | c"), vec!["a ` b", "c"]);
    }

    #[test]
    fn test_alignments() {
        assert_eq!(
            parse_alignment_row(":--- | ---: | :---: | ---"),
            Some(vec![
                Alignment::Left,
                Alignment::Right,
                Alignment::Center,
                Alignment::Left
            ])
        );
        assert_eq!(parse_alignment_row("-- | ---"), None);
        assert_eq!(parse_alignment_row("abc | ---"), None);
    }

    #[test]
    fn test_parse_table_pads_rows() {
        let table = parse_table(&["a | b |c", "---|---|---", "1|2|3", "4"]).unwrap();
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.header, vec!["a", "b", "c"]);
        assert_eq!(table.rows[1], vec!["4", "", ""]);
        assert!(table.alignments.iter().all(|a| *a == Alignment::Left));
    }

    #[test]
    fn test_table_start_requires_matching_columns() {
        assert!(is_table_start("a | b", "--- | ---"));
        assert!(!is_table_start("a | b", "---"));
        assert!(!is_table_start("a b", "---"));
    }
}
