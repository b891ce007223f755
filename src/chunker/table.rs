//! Tabular chunking: row blocks that always carry the header.
//!
//! A table row stripped of its header is meaningless, so every block
//! (macro and micro) re-emits the header rows before its slice of data
//! rows. Markdown pipe tables are detected by their separator line;
//! anything else treats the first line as the header.

/// A parsed table: header lines plus data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<String>,
}

/// Parse `text` as a table. Markdown pipe tables keep both the column
/// line and the `---|---` separator as the header; otherwise the first
/// non-empty line is the header.
pub fn parse_table(text: &str) -> Table {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();

    let is_markdown = lines.len() >= 2
        && lines[0].contains('|')
        && lines[1]
            .chars()
            .all(|c| matches!(c, '-' | '|' | ':' | ' '))
        && lines[1].contains('-');

    let header_len = if is_markdown { 2 } else { 1.min(lines.len()) };
    Table {
        header: lines[..header_len].iter().map(|l| l.to_string()).collect(),
        rows: lines[header_len..].iter().map(|l| l.to_string()).collect(),
    }
}

/// Cut `table` into blocks of at most `rows_per_block` data rows, each
/// block rendered with the header on top. An empty table yields nothing.
pub fn row_blocks(table: &Table, rows_per_block: usize) -> Vec<String> {
    assert!(rows_per_block > 0);
    if table.rows.is_empty() {
        let header = table.header.join("\n");
        return if header.trim().is_empty() {
            Vec::new()
        } else {
            vec![header]
        };
    }

    table
        .rows
        .chunks(rows_per_block)
        .map(|chunk| {
            let mut block = table.header.join("\n");
            if !block.is_empty() {
                block.push('\n');
            }
            block.push_str(&chunk.join("\n"));
            block
        })
        .collect()
}
