//! Block segmentation for markdown-like card documents.
//!
//! The segmenter is line oriented and infallible: anything it does not
//! recognize becomes paragraph text.

use core::ops::Range;

use serde::{Deserialize, Serialize};

use crate::markup::{parse_inline, StyledRun};

const TAB_WIDTH: usize = 4;
const SPACES_PER_LIST_LEVEL: usize = 2;
const MAX_HEADING_LEVEL: usize = 6;

/// One structural unit of a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    Heading {
        /// 1..=6
        level: u8,
        runs: Vec<StyledRun>,
    },
    Paragraph {
        runs: Vec<StyledRun>,
    },
    ListItem {
        ordered: bool,
        /// Source number for ordered items.
        number: Option<u32>,
        /// Nesting depth derived from leading indentation.
        depth: usize,
        /// `Some` for task items.
        checked: Option<bool>,
        runs: Vec<StyledRun>,
    },
    TableRow {
        cells: Vec<Vec<StyledRun>>,
        is_header: bool,
    },
    CodeBlock {
        raw_lines: Vec<String>,
        language: Option<String>,
    },
    Blockquote {
        /// Number of `>` markers, at least 1.
        depth: usize,
        runs: Vec<StyledRun>,
    },
    Rule,
    Signature {
        text: String,
    },
}

impl Block {
    /// Short kind name for logs and diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Heading { .. } => "heading",
            Self::Paragraph { .. } => "paragraph",
            Self::ListItem { .. } => "list_item",
            Self::TableRow { .. } => "table_row",
            Self::CodeBlock { .. } => "code_block",
            Self::Blockquote { .. } => "blockquote",
            Self::Rule => "rule",
            Self::Signature { .. } => "signature",
        }
    }
}

/// Segmented document: ordered blocks plus table grouping.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub blocks: Vec<Block>,
    /// Index ranges into `blocks`, one per table. Every range covers only
    /// `TableRow` blocks and rows of one range share one cell count.
    pub tables: Vec<Range<usize>>,
}

impl Document {
    /// Segment `text` into blocks and parse each block's inline markup.
    pub fn parse(text: &str) -> Self {
        let mut segmenter = Segmenter::default();
        let mut lines = text.lines().peekable();
        while let Some(line) = lines.next() {
            segmenter.push_line(line, lines.peek().copied(), &mut lines);
        }
        segmenter.finish()
    }

    /// Append a signature footer. Blank text is ignored.
    pub fn push_signature(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.blocks.push(Block::Signature {
            text: text.to_string(),
        });
    }

    /// Table range containing block `index`, if it is a table row.
    pub fn table_for(&self, index: usize) -> Option<Range<usize>> {
        self.tables
            .iter()
            .find(|range| range.contains(&index))
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[derive(Debug)]
enum Pending {
    Paragraph(String),
    ListItem {
        ordered: bool,
        number: Option<u32>,
        depth: usize,
        checked: Option<bool>,
        text: String,
    },
    Quote {
        depth: usize,
        text: String,
    },
}

#[derive(Debug, Default)]
struct Segmenter {
    blocks: Vec<Block>,
    tables: Vec<Range<usize>>,
    pending: Option<Pending>,
    table_start: Option<usize>,
    table_has_header: bool,
    last_list_depth: Option<usize>,
}

impl Segmenter {
    fn push_line<'a, I>(&mut self, line: &'a str, next: Option<&'a str>, rest: &mut I)
    where
        I: Iterator<Item = &'a str>,
    {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            self.flush_pending();
            self.end_table();
            return;
        }

        if let Some((fence, language)) = fence_open(line) {
            self.flush_pending();
            self.end_table();
            self.push_code_block(fence, language, rest);
            return;
        }

        if self.table_start.is_some() || is_table_start(trimmed, next) {
            if self.table_start.is_some() && is_delimiter_row(trimmed) {
                self.mark_header();
                return;
            }
            if trimmed.contains('|') {
                self.flush_pending();
                self.push_table_row(trimmed);
                return;
            }
            self.end_table();
        }

        if is_rule(trimmed) {
            self.flush_pending();
            self.blocks.push(Block::Rule);
            self.last_list_depth = None;
            return;
        }

        if let Some((level, text)) = heading(trimmed) {
            self.flush_pending();
            self.blocks.push(Block::Heading {
                level,
                runs: parse_inline(text),
            });
            self.last_list_depth = None;
            return;
        }

        if let Some((depth, text)) = blockquote(trimmed) {
            self.push_quote_line(depth, text);
            self.last_list_depth = None;
            return;
        }

        if let Some(item) = list_item(line) {
            self.flush_pending();
            let depth = match self.last_list_depth {
                Some(prev) => item.depth.min(prev + 1),
                None => 0,
            };
            self.last_list_depth = Some(depth);
            self.pending = Some(Pending::ListItem {
                ordered: item.ordered,
                number: item.number,
                depth,
                checked: item.checked,
                text: item.text.to_string(),
            });
            return;
        }

        match self.pending.as_mut() {
            Some(Pending::Paragraph(text))
            | Some(Pending::ListItem { text, .. })
            | Some(Pending::Quote { text, .. }) => {
                text.push(' ');
                text.push_str(trimmed);
            }
            None => {
                // An unindented paragraph closes any open list.
                if leading_columns(line) == 0 {
                    self.last_list_depth = None;
                }
                self.pending = Some(Pending::Paragraph(trimmed.to_string()));
            }
        }
    }

    fn push_quote_line(&mut self, depth: usize, text: &str) {
        if text.is_empty() {
            self.flush_pending();
            return;
        }
        if let Some(Pending::Quote {
            depth: open_depth,
            text: open_text,
        }) = self.pending.as_mut()
        {
            if *open_depth == depth {
                open_text.push(' ');
                open_text.push_str(text);
                return;
            }
        }
        self.flush_pending();
        self.pending = Some(Pending::Quote {
            depth,
            text: text.to_string(),
        });
    }

    fn push_code_block<'a, I>(&mut self, fence: Fence, language: Option<String>, rest: &mut I)
    where
        I: Iterator<Item = &'a str>,
    {
        let mut raw_lines = Vec::new();
        let mut closed = false;
        for line in rest.by_ref() {
            if fence.closes(line) {
                closed = true;
                break;
            }
            raw_lines.push(strip_indent(&expand_tabs(line), fence.indent));
        }
        if !closed {
            log::debug!("unterminated code fence runs to end of document");
        }
        self.blocks.push(Block::CodeBlock {
            raw_lines,
            language,
        });
        self.last_list_depth = None;
    }

    fn push_table_row(&mut self, trimmed: &str) {
        if self.table_start.is_none() {
            self.table_start = Some(self.blocks.len());
            self.table_has_header = false;
        }
        let cells = split_cells(trimmed)
            .iter()
            .map(|cell| parse_inline(cell))
            .collect();
        self.blocks.push(Block::TableRow {
            cells,
            is_header: false,
        });
    }

    fn mark_header(&mut self) {
        let Some(start) = self.table_start else {
            return;
        };
        if self.table_has_header || self.blocks.len() != start + 1 {
            // A delimiter row anywhere but under the first row is dropped.
            return;
        }
        if let Some(Block::TableRow { is_header, .. }) = self.blocks.get_mut(start) {
            *is_header = true;
            self.table_has_header = true;
        }
    }

    fn end_table(&mut self) {
        let Some(start) = self.table_start.take() else {
            return;
        };
        let end = self.blocks.len();
        if start >= end {
            return;
        }
        let columns = match &self.blocks[start] {
            Block::TableRow { cells, .. } => cells.len().max(1),
            _ => 1,
        };
        for block in &mut self.blocks[start..end] {
            if let Block::TableRow { cells, .. } = block {
                if cells.len() > columns {
                    log::debug!(
                        "table row has {} cells, dropping {} beyond the first row's {}",
                        cells.len(),
                        cells.len() - columns,
                        columns
                    );
                }
                cells.resize_with(columns, Vec::new);
            }
        }
        self.tables.push(start..end);
        self.last_list_depth = None;
    }

    fn flush_pending(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let block = match pending {
            Pending::Paragraph(text) => Block::Paragraph {
                runs: parse_inline(&text),
            },
            Pending::ListItem {
                ordered,
                number,
                depth,
                checked,
                text,
            } => Block::ListItem {
                ordered,
                number,
                depth,
                checked,
                runs: parse_inline(&text),
            },
            Pending::Quote { depth, text } => Block::Blockquote {
                depth,
                runs: parse_inline(&text),
            },
        };
        self.blocks.push(block);
    }

    fn finish(mut self) -> Document {
        self.flush_pending();
        self.end_table();
        Document {
            blocks: self.blocks,
            tables: self.tables,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Fence {
    marker: u8,
    len: usize,
    indent: usize,
}

impl Fence {
    fn closes(&self, line: &str) -> bool {
        let trimmed = line.trim();
        let run = trimmed.bytes().take_while(|b| *b == self.marker).count();
        run >= self.len && run == trimmed.len()
    }
}

fn fence_open(line: &str) -> Option<(Fence, Option<String>)> {
    let indent = leading_columns(line);
    let trimmed = line.trim_start();
    let marker = *trimmed.as_bytes().first()?;
    if marker != b'`' && marker != b'~' {
        return None;
    }
    let len = trimmed.bytes().take_while(|b| *b == marker).count();
    if len < 3 {
        return None;
    }
    let info = trimmed[len..].trim();
    if marker == b'`' && info.contains('`') {
        return None;
    }
    let language = info
        .split_whitespace()
        .next()
        .filter(|lang| !lang.is_empty())
        .map(str::to_string);
    Some((
        Fence {
            marker,
            len,
            indent,
        },
        language,
    ))
}

fn heading(trimmed: &str) -> Option<(u8, &str)> {
    let hashes = trimmed.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    let text = strip_closing_hashes(rest.trim());
    let level = hashes.clamp(1, MAX_HEADING_LEVEL) as u8;
    Some((level, text))
}

/// Drops a closing `#` run only when it stands alone or follows whitespace.
fn strip_closing_hashes(text: &str) -> &str {
    let without = text.trim_end_matches('#');
    if without.len() == text.len() {
        return text;
    }
    if without.is_empty() {
        return without;
    }
    if without.ends_with([' ', '\t']) {
        return without.trim_end();
    }
    text
}

fn blockquote(trimmed: &str) -> Option<(usize, &str)> {
    if !trimmed.starts_with('>') {
        return None;
    }
    let mut depth = 0usize;
    let mut rest = trimmed;
    while let Some(next) = rest.strip_prefix('>') {
        depth += 1;
        rest = next.trim_start();
    }
    Some((depth, rest.trim_end()))
}

fn is_rule(trimmed: &str) -> bool {
    let Some(first) = trimmed.chars().next() else {
        return false;
    };
    if !matches!(first, '-' | '*' | '_') {
        return false;
    }
    let mut count = 0usize;
    for ch in trimmed.chars() {
        if ch == first {
            count += 1;
        } else if ch != ' ' && ch != '\t' {
            return false;
        }
    }
    count >= 3
}

struct ListMarker<'a> {
    ordered: bool,
    number: Option<u32>,
    depth: usize,
    checked: Option<bool>,
    text: &'a str,
}

fn list_item(line: &str) -> Option<ListMarker<'_>> {
    let indent = leading_columns(line);
    let trimmed = line.trim_start();
    let (ordered, number, rest) = if let Some(rest) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("+ "))
    {
        (false, None, rest)
    } else {
        let digits = trimmed.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || digits > 9 {
            return None;
        }
        let after = &trimmed[digits..];
        let rest = after
            .strip_prefix(". ")
            .or_else(|| after.strip_prefix(") "))?;
        (true, trimmed[..digits].parse::<u32>().ok(), rest)
    };

    let rest = rest.trim_start();
    let (checked, text) = task_marker(rest);
    Some(ListMarker {
        ordered,
        number,
        depth: indent / SPACES_PER_LIST_LEVEL,
        checked,
        text: text.trim_end(),
    })
}

fn task_marker(text: &str) -> (Option<bool>, &str) {
    let checked = if text.starts_with("[ ]") {
        false
    } else if text.starts_with("[x]") || text.starts_with("[X]") {
        true
    } else {
        return (None, text);
    };
    let rest = &text[3..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return (None, text);
    }
    (Some(checked), rest.trim_start())
}

fn is_table_start(trimmed: &str, next: Option<&str>) -> bool {
    if !trimmed.contains('|') {
        return false;
    }
    if trimmed.starts_with('|') {
        return true;
    }
    next.is_some_and(|line| is_delimiter_row(line.trim()))
}

fn is_delimiter_row(trimmed: &str) -> bool {
    trimmed.contains('-')
        && trimmed.contains('|')
        && trimmed
            .chars()
            .all(|ch| matches!(ch, '|' | '-' | ':' | ' ' | '\t'))
}

fn split_cells(trimmed: &str) -> Vec<String> {
    let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let inner = if inner.ends_with('|') && !inner.ends_with("\\|") {
        &inner[..inner.len() - 1]
    } else {
        inner
    };

    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_code = false;
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'|') => {
                cell.push('|');
                chars.next();
            }
            '`' => {
                in_code = !in_code;
                cell.push(ch);
            }
            '|' if !in_code => {
                cells.push(cell.trim().to_string());
                cell.clear();
            }
            _ => cell.push(ch),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}

fn leading_columns(line: &str) -> usize {
    let mut columns = 0usize;
    for ch in line.chars() {
        match ch {
            ' ' => columns += 1,
            '\t' => columns += TAB_WIDTH - (columns % TAB_WIDTH),
            _ => break,
        }
    }
    columns
}

fn expand_tabs(line: &str) -> String {
    if !line.contains('\t') {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + 8);
    let mut column = 0usize;
    for ch in line.chars() {
        if ch == '\t' {
            let pad = TAB_WIDTH - (column % TAB_WIDTH);
            out.extend(core::iter::repeat_n(' ', pad));
            column += pad;
        } else {
            out.push(ch);
            column += 1;
        }
    }
    out
}

fn strip_indent(line: &str, indent: usize) -> String {
    let strip = line
        .bytes()
        .take(indent)
        .take_while(|b| *b == b' ')
        .count();
    line[strip..].trim_end().to_string()
}
