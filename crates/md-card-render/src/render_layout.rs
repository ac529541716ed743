use md_card::StyledRun;
use smallvec::SmallVec;
use std::sync::Arc;
use unicode_width::UnicodeWidthChar;

use crate::render_ir::{FontChoice, ResolvedTextStyle, TextRole};

const LINE_FIT_EPSILON_PX: f32 = 0.01;

/// Text measurement hook shared by pass 1 and pass 2.
///
/// Implementations must be deterministic: the same text and style always
/// measure the same, or the two passes disagree about the canvas size.
pub trait TextMeasurer: Send + Sync {
    /// Measure rendered text width for the provided style.
    fn measure_text_px(&self, text: &str, style: &ResolvedTextStyle) -> f32;

    /// Conservative (safe upper-bound) width estimate.
    ///
    /// Default delegates to `measure_text_px`.
    fn conservative_text_px(&self, text: &str, style: &ResolvedTextStyle) -> f32 {
        self.measure_text_px(text, style)
    }

    /// Face of the fallback chain that renders `ch`.
    fn select_font(&self, _ch: char, style: &ResolvedTextStyle) -> FontChoice {
        style.primary_font()
    }

    /// Vertical metrics for the primary face at the style's size.
    fn line_metrics(&self, style: &ResolvedTextStyle) -> LineMetrics {
        LineMetrics::heuristic(style.size_px)
    }
}

/// Ascent and descent in pixels, both positive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineMetrics {
    pub ascent: f32,
    pub descent: f32,
}

impl LineMetrics {
    pub fn heuristic(size_px: f32) -> Self {
        Self {
            ascent: size_px * 0.8,
            descent: size_px * 0.2,
        }
    }
}

/// Layout configuration for card construction.
///
/// Pass 1 and pass 2 read every size, gap, and padding from here.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutConfig {
    /// Canvas width.
    pub display_width: i32,
    /// Gap between canvas edge and frosted panel.
    pub margin_px: i32,
    /// Gap between panel edge and content.
    pub panel_padding_px: i32,
    /// Body text size.
    pub base_font_px: f32,
    /// Heading sizes for levels 1..=6.
    pub heading_font_px: [f32; 6],
    /// Code block text size.
    pub code_font_px: f32,
    /// Inline code size relative to surrounding text.
    pub inline_code_scale: f32,
    pub signature_font_px: f32,
    /// Line height multiplier.
    pub line_height: f32,
    /// Gap between ordinary blocks.
    pub block_gap_px: i32,
    /// Gap around heading blocks.
    pub heading_gap_px: i32,
    /// Gap between consecutive list items.
    pub list_item_gap_px: i32,
    /// Left indent per list nesting level.
    pub list_indent_px: i32,
    /// Space between a list marker and item text.
    pub list_marker_gap_px: i32,
    /// Left indent per blockquote level.
    pub quote_indent_px: i32,
    /// Blockquote accent bar width.
    pub quote_bar_px: i32,
    /// Space between accent bar and quote text.
    pub quote_text_gap_px: i32,
    /// Vertical padding inside a blockquote.
    pub quote_padding_px: i32,
    /// Padding inside the code block background.
    pub code_padding_px: i32,
    pub code_corner_radius_px: u32,
    /// Total vertical space of a horizontal rule block.
    pub rule_height_px: i32,
    pub rule_thickness_px: u32,
    pub table_cell_padding_x_px: i32,
    pub table_cell_padding_y_px: i32,
    /// Columns never shrink below this width.
    pub table_min_column_px: i32,
    pub table_border_px: u32,
    /// Space between title image and first block.
    pub title_gap_px: i32,
    pub title_corner_radius_px: u32,
    /// Space above the signature footer.
    pub signature_gap_px: i32,
    pub panel_corner_radius_px: u32,
    pub canvas_corner_radius_px: u32,
    /// Narrowest content area accepted by option validation.
    pub min_content_width_px: i32,
    pub max_canvas_width_px: i32,
    pub max_canvas_height_px: i32,
}

impl LayoutConfig {
    /// Defaults for a canvas of `width` pixels.
    pub fn for_width(width: i32) -> Self {
        Self {
            display_width: width,
            ..Self::default()
        }
    }

    /// Horizontal space available for wrapped text.
    pub fn content_width(&self) -> i32 {
        (self.display_width - 2 * (self.margin_px + self.panel_padding_px)).max(1)
    }

    /// Left edge of the content area.
    pub fn content_left(&self) -> i32 {
        self.margin_px + self.panel_padding_px
    }

    /// Top edge of the content area.
    pub fn content_top(&self) -> i32 {
        self.margin_px + self.panel_padding_px
    }

    /// Fixed vertical allowance outside the content area.
    pub fn vertical_chrome_px(&self) -> i32 {
        2 * (self.margin_px + self.panel_padding_px)
    }

    pub fn body_style(&self) -> ResolvedTextStyle {
        ResolvedTextStyle::body(self.base_font_px, self.line_height)
    }

    pub fn heading_style(&self, level: u8) -> ResolvedTextStyle {
        let idx = (level.clamp(1, 6) - 1) as usize;
        ResolvedTextStyle {
            weight: 700,
            ..ResolvedTextStyle::body(self.heading_font_px[idx], self.line_height)
        }
        .with_role(TextRole::Heading(level))
    }

    pub fn code_style(&self) -> ResolvedTextStyle {
        ResolvedTextStyle {
            monospace: true,
            ..ResolvedTextStyle::body(self.code_font_px, self.line_height)
        }
        .with_role(TextRole::Code)
    }

    pub fn table_header_style(&self) -> ResolvedTextStyle {
        ResolvedTextStyle {
            weight: 700,
            ..self.body_style()
        }
        .with_role(TextRole::TableHeader)
    }

    pub fn signature_style(&self) -> ResolvedTextStyle {
        ResolvedTextStyle::body(self.signature_font_px, self.line_height)
            .with_role(TextRole::Signature)
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            display_width: 1000,
            margin_px: 40,
            panel_padding_px: 40,
            base_font_px: 30.0,
            heading_font_px: [40.0, 35.0, 32.0, 30.0, 30.0, 30.0],
            code_font_px: 28.0,
            inline_code_scale: 28.0 / 30.0,
            signature_font_px: 24.0,
            line_height: 1.2,
            block_gap_px: 15,
            heading_gap_px: 25,
            list_item_gap_px: 8,
            list_indent_px: 30,
            list_marker_gap_px: 12,
            quote_indent_px: 20,
            quote_bar_px: 5,
            quote_text_gap_px: 15,
            quote_padding_px: 5,
            code_padding_px: 10,
            code_corner_radius_px: 8,
            rule_height_px: 20,
            rule_thickness_px: 2,
            table_cell_padding_x_px: 12,
            table_cell_padding_y_px: 8,
            table_min_column_px: 40,
            table_border_px: 1,
            title_gap_px: 20,
            title_corner_radius_px: 20,
            signature_gap_px: 20,
            panel_corner_radius_px: 30,
            canvas_corner_radius_px: 30,
            min_content_width_px: 120,
            max_canvas_width_px: 8192,
            max_canvas_height_px: 65_535,
        }
    }
}

/// Positioned slice of a run drawn with one face.
#[derive(Clone, Debug, PartialEq)]
pub struct LineFragment {
    pub text: String,
    pub style: ResolvedTextStyle,
    pub font: FontChoice,
    /// Offset from the line's left edge.
    pub x: f32,
    pub width: f32,
}

/// One wrapped line.
#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    pub fragments: SmallVec<[LineFragment; 4]>,
    /// Right edge of the last fragment.
    pub width: f32,
    pub height: i32,
    /// Baseline offset from the line top.
    pub baseline: i32,
}

impl Line {
    /// Visible text of the line.
    pub fn text(&self) -> String {
        let mut out = String::new();
        let mut cursor = 0.0f32;
        for fragment in &self.fragments {
            if !out.is_empty() && fragment.x > cursor + LINE_FIT_EPSILON_PX {
                out.push(' ');
            }
            out.push_str(&fragment.text);
            cursor = fragment.x + fragment.width;
        }
        out
    }
}

/// Input row for table layout.
#[derive(Clone, Copy, Debug)]
pub struct TableRowInput<'a> {
    pub cells: &'a [Vec<StyledRun>],
    pub is_header: bool,
}

/// Resolved table geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct TableLayout {
    /// Final column widths including cell padding.
    pub column_widths: Vec<i32>,
    /// Widest single-line measured cell text per column.
    pub content_widths: Vec<f32>,
    pub rows: Vec<TableRowLayout>,
    pub width: i32,
    pub height: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableRowLayout {
    /// Wrapped lines per cell.
    pub cells: Vec<Vec<Line>>,
    pub height: i32,
    pub is_header: bool,
}

/// Deterministic greedy line layout.
#[derive(Clone)]
pub struct LayoutEngine {
    cfg: LayoutConfig,
    text_measurer: Option<Arc<dyn TextMeasurer>>,
}

impl core::fmt::Debug for LayoutEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LayoutEngine")
            .field("cfg", &self.cfg)
            .field("has_text_measurer", &self.text_measurer.is_some())
            .finish()
    }
}

#[derive(Clone, Debug)]
struct Piece {
    text: String,
    style: ResolvedTextStyle,
    space_before: bool,
    break_before: bool,
    code: bool,
}

#[derive(Default)]
struct LineBuilder {
    fragments: SmallVec<[LineFragment; 4]>,
    width: f32,
}

impl LineBuilder {
    fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    fn last_style(&self) -> Option<&ResolvedTextStyle> {
        self.fragments.last().map(|fragment| &fragment.style)
    }
}

impl LayoutEngine {
    /// Create a layout engine.
    pub fn new(cfg: LayoutConfig) -> Self {
        Self {
            cfg,
            text_measurer: None,
        }
    }

    /// Install a shared text measurer for glyph-accurate width fitting.
    pub fn with_text_measurer(mut self, measurer: Arc<dyn TextMeasurer>) -> Self {
        self.text_measurer = Some(measurer);
        self
    }

    /// Same engine and measurer targeting a different canvas width.
    pub fn with_display_width(mut self, width: i32) -> Self {
        self.cfg.display_width = width;
        self
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.cfg
    }

    pub fn measure_text(&self, text: &str, style: &ResolvedTextStyle) -> f32 {
        self.text_measurer
            .as_ref()
            .map(|m| m.measure_text_px(text, style))
            .unwrap_or_else(|| heuristic_measure_text(text, style))
    }

    pub fn select_font(&self, ch: char, style: &ResolvedTextStyle) -> FontChoice {
        self.text_measurer
            .as_ref()
            .map(|m| m.select_font(ch, style))
            .unwrap_or_else(|| style.primary_font())
    }

    pub fn line_metrics(&self, style: &ResolvedTextStyle) -> LineMetrics {
        self.text_measurer
            .as_ref()
            .map(|m| m.line_metrics(style))
            .unwrap_or_else(|| LineMetrics::heuristic(style.size_px))
    }

    /// Height and baseline offset of a single line in `style`.
    pub fn line_box(&self, style: &ResolvedTextStyle) -> (i32, i32) {
        let metrics = self.line_metrics(style);
        let natural = metrics.ascent + metrics.descent;
        let height = (style.size_px * style.line_height).round().max(natural.ceil());
        let baseline = ((height - natural) / 2.0 + metrics.ascent).round();
        (height as i32, baseline as i32)
    }

    /// Style of `run` layered over the block's base style.
    pub fn style_for_run(&self, run: &StyledRun, base: &ResolvedTextStyle) -> ResolvedTextStyle {
        let mut style = base.clone();
        if run.bold {
            style.weight = style.weight.max(700);
        }
        style.italic |= run.italic;
        style.strikethrough |= run.strikethrough;
        if run.code && !base.monospace {
            style.monospace = true;
            style.size_px = (base.size_px * self.cfg.inline_code_scale).round().max(1.0);
        }
        if run.color.is_some() {
            style.color = run.color;
        }
        style
    }

    /// Width of `runs` laid out on a single unbounded line.
    pub fn measure_runs(&self, runs: &[StyledRun], base: &ResolvedTextStyle) -> f32 {
        let lines = self.layout_runs(runs, i32::MAX, base);
        lines.iter().map(|line| line.width).fold(0.0, f32::max)
    }

    /// Greedy line breaking of styled runs into lines at most `max_width`
    /// wide. A single token wider than `max_width` overflows on its own line.
    pub fn layout_runs(
        &self,
        runs: &[StyledRun],
        max_width: i32,
        base: &ResolvedTextStyle,
    ) -> Vec<Line> {
        let max = max_width.max(1) as f32;
        let pieces = self.pieces_from_runs(runs, base);
        let mut lines = Vec::new();
        let mut line = LineBuilder::default();

        let mut start = 0usize;
        while start < pieces.len() {
            let mut end = start + 1;
            while end < pieces.len() && !pieces[end].break_before {
                end += 1;
            }
            let word = &pieces[start..end];
            start = end;

            let word_w: f32 = word
                .iter()
                .map(|piece| self.measure_text(&piece.text, &piece.style))
                .sum();
            let mut gap = self.gap_before(&line, &word[0]);
            if !line.is_empty() && line.width + gap + word_w > max + LINE_FIT_EPSILON_PX {
                lines.push(self.finish_line(core::mem::take(&mut line), base));
                gap = 0.0;
            }

            if word_w <= max + LINE_FIT_EPSILON_PX {
                for (idx, piece) in word.iter().enumerate() {
                    let gap = if idx == 0 { gap } else { 0.0 };
                    self.push_piece(&mut line, &piece.text, &piece.style, gap);
                }
                continue;
            }

            if word.len() == 1 && word[0].code {
                self.push_split_code(&mut lines, &mut line, &word[0], max, base);
                continue;
            }

            log::debug!(
                "token wider than content width ({:.1}px > {}px) kept on its own line",
                word_w,
                max_width
            );
            for piece in word {
                self.push_piece(&mut line, &piece.text, &piece.style, 0.0);
            }
            lines.push(self.finish_line(core::mem::take(&mut line), base));
        }

        if !line.is_empty() {
            lines.push(self.finish_line(line, base));
        }
        lines
    }

    /// Wrap a plain string in one style.
    pub fn layout_text(&self, text: &str, max_width: i32, style: &ResolvedTextStyle) -> Vec<Line> {
        let run = StyledRun::plain(text);
        self.layout_runs(core::slice::from_ref(&run), max_width, style)
    }

    /// Lay out raw code lines. Whitespace is preserved and long lines wrap
    /// by character. Blank source lines keep their height.
    pub fn layout_code_lines(
        &self,
        raw_lines: &[String],
        max_width: i32,
        style: &ResolvedTextStyle,
    ) -> Vec<Line> {
        let max = max_width.max(1) as f32;
        let mut lines = Vec::with_capacity(raw_lines.len());
        for raw in raw_lines {
            let mut line = LineBuilder::default();
            let mut chunk = String::new();
            let mut chunk_w = 0.0f32;
            for ch in raw.chars() {
                let mut buf = [0u8; 4];
                let ch_w = self.measure_text(ch.encode_utf8(&mut buf), style);
                if !chunk.is_empty() && chunk_w + ch_w > max + LINE_FIT_EPSILON_PX {
                    self.push_piece(&mut line, &chunk, style, 0.0);
                    lines.push(self.finish_line(core::mem::take(&mut line), style));
                    chunk.clear();
                    chunk_w = 0.0;
                }
                chunk.push(ch);
                chunk_w += ch_w;
            }
            if !chunk.is_empty() {
                self.push_piece(&mut line, &chunk, style, 0.0);
            }
            lines.push(self.finish_line(line, style));
        }
        lines
    }

    /// Lay out a table inside `max_width`.
    ///
    /// Column widths come from the widest single-line cell in each column
    /// plus padding. If the total exceeds `max_width` columns shrink
    /// proportionally and text wraps inside its column.
    pub fn layout_table(&self, rows: &[TableRowInput<'_>], max_width: i32) -> TableLayout {
        let body = self.cfg.body_style().with_role(TextRole::TableCell);
        let header = self.cfg.table_header_style();
        let columns = rows.iter().map(|row| row.cells.len()).max().unwrap_or(0);
        let pad_x = self.cfg.table_cell_padding_x_px;
        let pad_y = self.cfg.table_cell_padding_y_px;

        let mut content_widths = vec![0.0f32; columns];
        for row in rows {
            let style = if row.is_header { &header } else { &body };
            for (col, cell) in row.cells.iter().enumerate() {
                let w = self.measure_runs(cell, style);
                if w > content_widths[col] {
                    content_widths[col] = w;
                }
            }
        }
        let natural: Vec<i32> = content_widths
            .iter()
            .map(|w| (w.ceil() as i32 + 2 * pad_x).max(self.cfg.table_min_column_px))
            .collect();
        let column_widths = fit_columns(&natural, max_width, self.cfg.table_min_column_px);

        let (empty_h, _) = self.line_box(&body);
        let mut table_rows = Vec::with_capacity(rows.len());
        let mut height = 0i32;
        for row in rows {
            let style = if row.is_header { &header } else { &body };
            let mut cells = Vec::with_capacity(columns);
            let mut text_h = empty_h;
            for (col, width) in column_widths.iter().enumerate() {
                let lines = match row.cells.get(col) {
                    Some(cell) => self.layout_runs(cell, (width - 2 * pad_x).max(1), style),
                    None => Vec::new(),
                };
                let cell_h: i32 = lines.iter().map(|line| line.height).sum();
                text_h = text_h.max(cell_h);
                cells.push(lines);
            }
            let row_h = text_h + 2 * pad_y;
            height += row_h;
            table_rows.push(TableRowLayout {
                cells,
                height: row_h,
                is_header: row.is_header,
            });
        }

        TableLayout {
            width: column_widths.iter().sum(),
            column_widths,
            content_widths,
            rows: table_rows,
            height,
        }
    }

    fn gap_before(&self, line: &LineBuilder, piece: &Piece) -> f32 {
        match line.last_style() {
            Some(prev) if piece.space_before => self.measure_text(" ", prev),
            _ => 0.0,
        }
    }

    fn pieces_from_runs(&self, runs: &[StyledRun], base: &ResolvedTextStyle) -> Vec<Piece> {
        let mut pieces = Vec::with_capacity(runs.len() * 4);
        let mut pending_space = false;
        let mut force_break = true;

        for run in runs {
            let style = self.style_for_run(run, base);
            if run.code {
                if run.text.trim().is_empty() {
                    pending_space = true;
                    continue;
                }
                pieces.push(Piece {
                    text: run.text.clone(),
                    style,
                    space_before: pending_space,
                    break_before: true,
                    code: true,
                });
                pending_space = false;
                force_break = true;
                continue;
            }

            let mut current: Option<Piece> = None;
            for ch in run.text.chars() {
                if ch.is_whitespace() {
                    if let Some(piece) = current.take() {
                        pieces.push(piece);
                    }
                    pending_space = true;
                    continue;
                }
                if is_wide_char(ch) {
                    if let Some(piece) = current.take() {
                        pieces.push(piece);
                    }
                    pieces.push(Piece {
                        text: ch.to_string(),
                        style: style.clone(),
                        space_before: pending_space,
                        break_before: true,
                        code: false,
                    });
                    pending_space = false;
                    force_break = true;
                    continue;
                }
                match current.as_mut() {
                    Some(piece) => piece.text.push(ch),
                    None => {
                        current = Some(Piece {
                            text: ch.to_string(),
                            style: style.clone(),
                            space_before: pending_space,
                            break_before: pending_space || force_break,
                            code: false,
                        });
                        pending_space = false;
                        force_break = false;
                    }
                }
            }
            if let Some(piece) = current.take() {
                pieces.push(piece);
            }
        }
        pieces
    }

    fn push_split_code(
        &self,
        lines: &mut Vec<Line>,
        line: &mut LineBuilder,
        piece: &Piece,
        max: f32,
        base: &ResolvedTextStyle,
    ) {
        if !line.is_empty() {
            lines.push(self.finish_line(core::mem::take(line), base));
        }
        let mut chunk = String::new();
        let mut chunk_w = 0.0f32;
        for ch in piece.text.chars() {
            let mut buf = [0u8; 4];
            let ch_w = self.measure_text(ch.encode_utf8(&mut buf), &piece.style);
            if !chunk.is_empty() && chunk_w + ch_w > max + LINE_FIT_EPSILON_PX {
                self.push_piece(line, &chunk, &piece.style, 0.0);
                lines.push(self.finish_line(core::mem::take(line), base));
                chunk.clear();
                chunk_w = 0.0;
            }
            chunk.push(ch);
            chunk_w += ch_w;
        }
        if !chunk.is_empty() {
            self.push_piece(line, &chunk, &piece.style, 0.0);
        }
    }

    /// Append `text` after `gap` pixels, splitting it wherever the fallback
    /// chain switches faces.
    fn push_piece(&self, line: &mut LineBuilder, text: &str, style: &ResolvedTextStyle, gap: f32) {
        let mut gap = gap;
        let mut group = String::new();
        let mut group_font: Option<FontChoice> = None;
        for ch in text.chars() {
            let font = self.select_font(ch, style);
            if group_font.is_some_and(|current| current != font) {
                self.push_fragment(line, &group, style, group_font, gap);
                gap = 0.0;
                group.clear();
            }
            group_font = Some(font);
            group.push(ch);
        }
        if !group.is_empty() {
            self.push_fragment(line, &group, style, group_font, gap);
        }
    }

    fn push_fragment(
        &self,
        line: &mut LineBuilder,
        text: &str,
        style: &ResolvedTextStyle,
        font: Option<FontChoice>,
        gap: f32,
    ) {
        let font = font.unwrap_or_else(|| style.primary_font());
        let width = self.measure_text(text, style);
        if let Some(last) = line.fragments.last_mut() {
            if last.font == font && last.style == *style {
                if gap > 0.0 {
                    last.text.push(' ');
                }
                last.text.push_str(text);
                last.width += gap + width;
                line.width = last.x + last.width;
                return;
            }
        }
        let x = line.width + gap;
        line.fragments.push(LineFragment {
            text: text.to_string(),
            style: style.clone(),
            font,
            x,
            width,
        });
        line.width = x + width;
    }

    fn finish_line(&self, line: LineBuilder, base: &ResolvedTextStyle) -> Line {
        let mut baseline = 0i32;
        let mut descent_box = 0i32;
        if line.fragments.is_empty() {
            let (h, b) = self.line_box(base);
            baseline = b;
            descent_box = h - b;
        }
        for fragment in &line.fragments {
            let (h, b) = self.line_box(&fragment.style);
            baseline = baseline.max(b);
            descent_box = descent_box.max(h - b);
        }
        Line {
            fragments: line.fragments,
            width: line.width,
            height: baseline + descent_box,
            baseline,
        }
    }
}

/// Fit natural column widths into `max_width`.
///
/// Proportional shrink, never below `min_column` unless that many minimum
/// columns would not fit, in which case the floor drops to an equal share of
/// `max_width` so the cap always holds. Remaining excess is taken
/// from the first widest column and rounding slack is given to it, so ties
/// resolve to the leftmost column.
pub fn fit_columns(natural: &[i32], max_width: i32, min_column: i32) -> Vec<i32> {
    let total: i64 = natural.iter().map(|w| *w as i64).sum();
    if total <= max_width as i64 || natural.is_empty() {
        return natural.to_vec();
    }
    let max_width = max_width.max(0);
    let min_column = min_column.min(max_width / natural.len() as i32);
    let mut widths: Vec<i32> = natural
        .iter()
        .map(|w| ((*w as i64 * max_width as i64) / total) as i32)
        .map(|w| w.max(min_column))
        .collect();
    let mut sum: i32 = widths.iter().sum();
    while sum > max_width {
        let Some(idx) = first_widest(&widths, |w| w > min_column) else {
            break;
        };
        let take = (sum - max_width).min(widths[idx] - min_column);
        widths[idx] -= take;
        sum -= take;
    }
    if sum < max_width {
        if let Some(idx) = first_widest(&widths, |_| true) {
            widths[idx] += max_width - sum;
        }
    }
    widths
}

fn first_widest(widths: &[i32], eligible: impl Fn(i32) -> bool) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, w) in widths.iter().copied().enumerate() {
        if !eligible(w) {
            continue;
        }
        if best.is_none_or(|b| w > widths[b]) {
            best = Some(idx);
        }
    }
    best
}

/// CJK ideographs, fullwidth forms, and emoji break between any two
/// characters.
pub fn is_wide_char(ch: char) -> bool {
    if UnicodeWidthChar::width(ch) == Some(2) {
        return true;
    }
    matches!(ch as u32, 0x1F300..=0x1FAFF | 0x2600..=0x27BF)
}

fn heuristic_measure_text(text: &str, style: &ResolvedTextStyle) -> f32 {
    let chars = text.chars().count();
    if chars == 0 {
        return 0.0;
    }
    let mut em_sum = 0.0f32;
    if style.monospace {
        for ch in text.chars() {
            em_sum += if is_wide_char(ch) { 1.0 } else { 0.6 };
        }
    } else {
        for ch in text.chars() {
            em_sum += proportional_glyph_em_width(ch);
        }
    }
    let mut scale = 1.0f32;
    if style.is_bold() {
        scale += 0.03;
    }
    if style.italic {
        scale += 0.01;
    }
    em_sum * style.size_px * scale
}

fn proportional_glyph_em_width(ch: char) -> f32 {
    match ch {
        ' ' => 0.32,
        '\u{00A0}' => 0.32,
        'i' | 'l' | 'I' | '|' | '!' => 0.24,
        '.' | ',' | ':' | ';' | '\'' | '"' | '`' => 0.23,
        '-' | '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' => 0.34,
        '(' | ')' | '[' | ']' | '{' | '}' => 0.30,
        'f' | 't' | 'j' | 'r' => 0.34,
        'm' | 'w' | 'M' | 'W' | '@' | '%' | '&' | '#' => 0.74,
        c if c.is_ascii_digit() => 0.52,
        c if c.is_ascii_uppercase() => 0.64,
        c if c.is_ascii_lowercase() => 0.52,
        c if c.is_whitespace() => 0.32,
        c if c.is_ascii_punctuation() => 0.42,
        c if is_wide_char(c) => 1.0,
        _ => 0.56,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use md_card::parse_inline;

    /// Every char is 10px wide; emoji resolve to the emoji face.
    struct FixedMeasurer;

    impl TextMeasurer for FixedMeasurer {
        fn measure_text_px(&self, text: &str, _style: &ResolvedTextStyle) -> f32 {
            text.chars().count() as f32 * 10.0
        }

        fn select_font(&self, ch: char, style: &ResolvedTextStyle) -> FontChoice {
            if (ch as u32) >= 0x1F300 {
                FontChoice::Emoji
            } else {
                style.primary_font()
            }
        }
    }

    fn engine() -> LayoutEngine {
        LayoutEngine::new(LayoutConfig::default()).with_text_measurer(Arc::new(FixedMeasurer))
    }

    fn line_texts(lines: &[Line]) -> Vec<String> {
        lines.iter().map(Line::text).collect()
    }

    fn body() -> ResolvedTextStyle {
        LayoutConfig::default().body_style()
    }

    #[test]
    fn greedy_wrap_fills_lines() {
        let lines = engine().layout_runs(&parse_inline("aa bb cc"), 50, &body());
        assert_eq!(line_texts(&lines), vec!["aa bb", "cc"]);
        assert!(lines.iter().all(|line| line.width <= 50.0));
    }

    #[test]
    fn oversized_word_sits_alone() {
        let lines = engine().layout_runs(&parse_inline("a verylongword b"), 50, &body());
        assert_eq!(line_texts(&lines), vec!["a", "verylongword", "b"]);
        assert_eq!(lines[1].width, 120.0);
    }

    #[test]
    fn cjk_wraps_per_character() {
        let lines = engine().layout_runs(&parse_inline("你好世界"), 25, &body());
        assert_eq!(line_texts(&lines), vec!["你好", "世界"]);
    }

    #[test]
    fn inline_code_moves_whole() {
        let lines = engine().layout_runs(&parse_inline("x `abc def`"), 80, &body());
        assert_eq!(line_texts(&lines), vec!["x", "abc def"]);
        assert!(lines[1].fragments[0].style.monospace);
        assert_eq!(lines[1].fragments.len(), 1);
    }

    #[test]
    fn inline_code_wider_than_line_is_split() {
        let lines = engine().layout_runs(&parse_inline("`abcdefghij`"), 40, &body());
        assert_eq!(line_texts(&lines), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn styled_runs_without_space_stay_glued() {
        let lines = engine().layout_runs(&parse_inline("aaa **bold**, next"), 70, &body());
        assert_eq!(line_texts(&lines), vec!["aaa", "bold,", "next"]);
        let second = &lines[1];
        assert_eq!(second.fragments.len(), 2);
        assert!(second.fragments[0].style.is_bold());
        assert_eq!(second.fragments[1].x, 40.0);
    }

    #[test]
    fn colors_and_fonts_split_fragments() {
        let runs = parse_inline("<span style=\"color:#FF0000\">red</span> text \u{1F600}");
        let lines = engine().layout_runs(&runs, 500, &body());
        assert_eq!(lines.len(), 1);
        let fragments = &lines[0].fragments;
        assert_eq!(fragments[0].text, "red");
        assert_eq!(fragments[0].style.color, Some(md_card::Rgb::new(255, 0, 0)));
        assert_eq!(fragments[1].text, "text");
        assert_eq!(fragments[1].x, 40.0);
        assert_eq!(fragments[2].font, FontChoice::Emoji);
    }

    #[test]
    fn line_box_uses_multiplier() {
        let engine = engine();
        let style = body();
        let (height, baseline) = engine.line_box(&style);
        assert_eq!(height, 36);
        assert!(baseline > 0 && baseline < height);
        let lines = engine.layout_runs(&parse_inline("x"), 100, &style);
        assert_eq!(lines[0].height, 36);
        assert_eq!(lines[0].baseline, baseline);
    }

    #[test]
    fn code_lines_keep_whitespace_and_blank_lines() {
        let raw = vec!["  indented".to_string(), String::new(), "abcdefgh".to_string()];
        let engine = engine();
        let style = engine.config().code_style();
        let lines = engine.layout_code_lines(&raw, 50, &style);
        assert_eq!(line_texts(&lines), vec!["  ind", "ented", "", "abcde", "fgh"]);
        assert_eq!(lines[0].fragments[0].text, "  ind");
        assert_eq!(lines[1].fragments[0].text, "ented");
        assert!(lines[2].fragments.is_empty());
        assert_eq!(lines[2].height, lines[0].height);
        assert_eq!(lines[3].fragments[0].text, "abcde");
        assert_eq!(lines[4].fragments[0].text, "fgh");
    }

    #[test]
    fn table_columns_cover_widest_cell() {
        let header = vec![parse_inline("Name"), parse_inline("Score")];
        let row = vec![parse_inline("Alexander"), parse_inline("7")];
        let rows = [
            TableRowInput {
                cells: &header,
                is_header: true,
            },
            TableRowInput {
                cells: &row,
                is_header: false,
            },
        ];
        let table = engine().layout_table(&rows, 840);
        assert_eq!(table.column_widths.len(), 2);
        assert_eq!(table.content_widths, vec![90.0, 50.0]);
        for (width, content) in table.column_widths.iter().zip(&table.content_widths) {
            assert!(*width as f32 >= *content);
        }
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.height, table.rows.iter().map(|r| r.height).sum::<i32>());
    }

    #[test]
    fn table_cap_shrinks_and_wraps() {
        let wide = vec![parse_inline("one two three four five six seven eight")];
        let rows = [TableRowInput {
            cells: &wide,
            is_header: false,
        }];
        let table = engine().layout_table(&rows, 200);
        assert_eq!(table.width, 200);
        assert!(table.rows[0].cells[0].len() > 1);
    }

    #[test]
    fn fit_columns_first_widest_wins() {
        assert_eq!(fit_columns(&[100, 100], 300, 40), vec![100, 100]);
        // 100 * 151 / 200 = 75 each; the slack pixel goes to the first column.
        assert_eq!(fit_columns(&[100, 100], 151, 40), vec![76, 75]);
        let fitted = fit_columns(&[400, 50, 50], 200, 40);
        assert_eq!(fitted.iter().sum::<i32>(), 200);
        assert!(fitted.iter().all(|w| *w >= 40));
    }

    #[test]
    fn fit_columns_holds_cap_when_minimums_overflow() {
        let fitted = fit_columns(&[60; 25], 840, 40);
        assert_eq!(fitted.len(), 25);
        assert_eq!(fitted.iter().sum::<i32>(), 840);
        // Floor drops to 840 / 25 = 33; the 15px of slack lands on the first column.
        assert_eq!(fitted[0], 48);
        assert!(fitted[1..].iter().all(|w| *w == 33));
    }

    #[test]
    fn heuristic_measure_is_used_without_measurer() {
        let engine = LayoutEngine::new(LayoutConfig::default());
        let style = body();
        let w = engine.measure_text("hello", &style);
        assert!(w > 0.0);
        let mut bold = style.clone();
        bold.weight = 700;
        assert!(engine.measure_text("hello", &bold) > w);
    }
}
