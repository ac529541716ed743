use md_card::{Block, CardError, Document, Rgb};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::render_ir::{
    BulletCommand, CardGeometry, CheckboxCommand, ClipCornersCommand, DrawCommand,
    GradientCommand, GradientDirection, ImageCommand, PxRect, RectCommand, RenderCard,
    RuleCommand, TextCommand, TextRole,
};
use crate::render_layout::{
    LayoutConfig, LayoutEngine, Line, TableLayout, TableRowInput, TextMeasurer,
};
use crate::theme::{document_seed, Clock, SystemClock, ThemeConfig, ThemePalette, ThemeVariant};

/// Runtime diagnostics from card layout.
#[derive(Clone, Debug, PartialEq)]
pub enum CardDiagnostic {
    LayoutTimeMs(u32),
    /// An explicit height below the content minimum was raised.
    HeightRaised { requested: u32, minimum: u32 },
    /// A line holding one unbreakable token exceeds its available width.
    OversizedLine {
        block_index: usize,
        width: i32,
        limit: i32,
    },
}

type DiagnosticCallback = Arc<Mutex<Box<dyn FnMut(CardDiagnostic) + Send + 'static>>>;
type DiagnosticSink = Option<DiagnosticCallback>;

/// Title image source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleImage {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// PNG compression effort.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    Fast,
    #[default]
    Default,
    Best,
}

/// Per-render options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardOptions {
    /// Canvas width in pixels.
    pub width: u32,
    /// Requested canvas height. Honored only when at least the content
    /// minimum.
    pub height: Option<u32>,
    pub title_image: Option<TitleImage>,
    /// Footer text drawn right-aligned at the bottom of the card.
    pub signature_text: Option<String>,
    /// Forces a palette instead of the time-of-day rule.
    pub theme_override: Option<ThemeVariant>,
    /// Picks the gradient pair. Defaults to a hash of the document.
    pub gradient_seed: Option<u64>,
    pub gradient_direction: Option<GradientDirection>,
    pub compression: PngCompression,
}

impl Default for CardOptions {
    fn default() -> Self {
        Self {
            width: 1000,
            height: None,
            title_image: None,
            signature_text: None,
            theme_override: None,
            gradient_seed: None,
            gradient_direction: None,
            compression: PngCompression::Default,
        }
    }
}

impl CardOptions {
    /// Reject option values that cannot produce a card.
    pub fn validate(&self, cfg: &LayoutConfig) -> Result<(), CardError> {
        if self.width == 0 {
            return Err(CardError::invalid_option(
                "WIDTH_INVALID",
                "card width must be positive",
            ));
        }
        if self.width > cfg.max_canvas_width_px as u32 {
            return Err(CardError::invalid_option(
                "WIDTH_INVALID",
                "card width exceeds the canvas limit",
            )
            .with_limit(
                "canvas_width",
                self.width as u64,
                cfg.max_canvas_width_px as u64,
            ));
        }
        let chrome = 2 * (cfg.margin_px + cfg.panel_padding_px);
        let content = self.width as i64 - chrome as i64;
        if content < cfg.min_content_width_px as i64 {
            return Err(CardError::invalid_option(
                "WIDTH_TOO_SMALL",
                "card width leaves no room for content",
            )
            .with_limit(
                "content_width",
                content.max(0) as u64,
                cfg.min_content_width_px as u64,
            ));
        }
        match self.height {
            Some(0) => Err(CardError::invalid_option(
                "HEIGHT_INVALID",
                "card height must be positive",
            )),
            Some(height) if height > cfg.max_canvas_height_px as u32 => {
                Err(CardError::invalid_option(
                    "HEIGHT_INVALID",
                    "card height exceeds the canvas limit",
                )
                .with_limit(
                    "canvas_height",
                    height as u64,
                    cfg.max_canvas_height_px as u64,
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Leading marker of a list item.
#[derive(Clone, Debug, PartialEq)]
pub enum ListMarker {
    Bullet { filled: bool, diameter: u32 },
    Number(Line),
    Checkbox { checked: bool, size: u32 },
}

/// Kind-specific geometry of a laid out block.
#[derive(Clone, Debug, PartialEq)]
pub enum LayoutBlockKind {
    Heading { level: u8 },
    Paragraph,
    ListItem {
        marker: ListMarker,
        /// Marker column left edge relative to the content left.
        marker_x: i32,
        checked: Option<bool>,
    },
    Table(TableLayout),
    Code,
    Quote {
        /// Accent bar left edge relative to the content left.
        bar_x: i32,
    },
    Rule,
}

/// A block's resolved geometry. Built in pass 1, consumed unchanged by
/// pass 2.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutBlock {
    pub kind: LayoutBlockKind,
    /// Wrapped text. Empty for tables and rules.
    pub lines: Vec<Line>,
    /// Text left edge relative to the content left.
    pub text_x: i32,
    /// Text top relative to the block top.
    pub text_y: i32,
    pub height: i32,
    pub gap_before: i32,
    pub gap_after: i32,
    /// Index of the first source block.
    pub source_index: usize,
}

/// Pass-1 result.
#[derive(Clone, Debug, PartialEq)]
pub struct CardLayout {
    pub blocks: Vec<LayoutBlock>,
    /// Signature lines, right-aligned inside `geometry.signature`.
    pub signature: Vec<Line>,
    pub geometry: CardGeometry,
    /// Height the content needs. The canvas is never shorter.
    pub minimum_height: u32,
}

/// Vertical cursor shared by both passes so block positions agree.
#[derive(Clone, Copy, Debug)]
pub struct BlockCursor {
    y: i32,
    prev_gap_after: Option<i32>,
}

impl BlockCursor {
    pub fn new(top: i32) -> Self {
        Self {
            y: top,
            prev_gap_after: None,
        }
    }

    /// Place `block` and return its top edge.
    pub fn advance(&mut self, block: &LayoutBlock) -> i32 {
        if let Some(prev) = self.prev_gap_after {
            self.y += prev.max(block.gap_before);
        }
        let top = self.y;
        self.y += block.height;
        self.prev_gap_after = Some(block.gap_after);
        top
    }

    pub fn y(&self) -> i32 {
        self.y
    }
}

/// Two-pass card engine: resolve dimensions, then compose draw commands.
#[derive(Clone)]
pub struct CardEngine {
    layout: LayoutEngine,
    theme: ThemeConfig,
    clock: Arc<dyn Clock>,
    diagnostic_sink: DiagnosticSink,
}

impl fmt::Debug for CardEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardEngine")
            .field("layout", &self.layout)
            .field("theme", &self.theme)
            .finish_non_exhaustive()
    }
}

impl CardEngine {
    /// Create a card engine using the wall clock for theme selection.
    pub fn new(cfg: LayoutConfig) -> Self {
        Self {
            layout: LayoutEngine::new(cfg),
            theme: ThemeConfig::default(),
            clock: Arc::new(SystemClock),
            diagnostic_sink: None,
        }
    }

    /// Install a shared text measurer for glyph-accurate width fitting.
    pub fn with_text_measurer(mut self, measurer: Arc<dyn TextMeasurer>) -> Self {
        self.layout = self.layout.with_text_measurer(measurer);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_theme_config(mut self, theme: ThemeConfig) -> Self {
        self.theme = theme;
        self
    }

    /// Register or replace the diagnostics sink.
    pub fn set_diagnostic_sink<F>(&mut self, sink: F)
    where
        F: FnMut(CardDiagnostic) + Send + 'static,
    {
        self.diagnostic_sink = Some(Arc::new(Mutex::new(Box::new(sink))));
    }

    fn emit_diagnostic(&self, diagnostic: CardDiagnostic) {
        let Some(sink) = &self.diagnostic_sink else {
            return;
        };
        if let Ok(mut sink) = sink.lock() {
            sink(diagnostic);
        }
    }

    pub fn layout_engine(&self) -> &LayoutEngine {
        &self.layout
    }

    pub fn config(&self) -> &LayoutConfig {
        self.layout.config()
    }

    /// Same engine targeting `width` pixels.
    pub fn for_width(&self, width: u32) -> Self {
        let mut engine = self.clone();
        engine.layout = engine.layout.with_display_width(width as i32);
        engine
    }

    /// Validate options, segment `source`, and run both passes.
    ///
    /// `title_size` is the decoded title image's pixel size.
    pub fn prepare(
        &self,
        source: &str,
        options: &CardOptions,
        title_size: Option<(u32, u32)>,
    ) -> Result<RenderCard, CardError> {
        options.validate(self.config())?;
        let engine = self.for_width(options.width);
        let mut document = Document::parse(source);
        if let Some(signature) = options.signature_text.as_deref() {
            document.push_signature(signature);
        }
        let layout = engine.resolve(&document, title_size, options.height);
        let limit = engine.config().max_canvas_height_px.max(1) as u32;
        if layout.geometry.canvas_height > limit {
            return Err(CardError::invalid_option(
                "HEIGHT_TOO_LARGE",
                "document needs a card taller than the canvas limit",
            )
            .with_limit(
                "canvas_height",
                layout.geometry.canvas_height as u64,
                limit as u64,
            ));
        }
        let palette = engine.palette(source, options);
        Ok(engine.compose(&layout, &palette))
    }

    /// Palette for this render: override or clock picks the variant, the
    /// seed or document hash picks the gradient.
    pub fn palette(&self, source: &str, options: &CardOptions) -> ThemePalette {
        let variant = self
            .theme
            .select_variant(options.theme_override, self.clock.as_ref());
        let seed = options
            .gradient_seed
            .unwrap_or_else(|| document_seed(source));
        ThemePalette::new(
            variant,
            seed,
            options.gradient_direction.unwrap_or_default(),
        )
    }

    /// Pass 1: lay out every block against the fixed width and compute the
    /// card geometry. Writes no pixels.
    pub fn resolve(
        &self,
        document: &Document,
        title_size: Option<(u32, u32)>,
        explicit_height: Option<u32>,
    ) -> CardLayout {
        let started = Instant::now();
        let cfg = *self.config();
        let content_w = cfg.content_width();

        let mut blocks = Vec::with_capacity(document.blocks.len());
        let mut signature = Vec::new();
        let mut index = 0usize;
        while index < document.blocks.len() {
            if let Some(range) = document.table_for(index) {
                let rows: Vec<TableRowInput<'_>> = document.blocks[range.clone()]
                    .iter()
                    .filter_map(|block| match block {
                        Block::TableRow { cells, is_header } => Some(TableRowInput {
                            cells,
                            is_header: *is_header,
                        }),
                        _ => None,
                    })
                    .collect();
                let table = self.layout.layout_table(&rows, content_w);
                blocks.push(LayoutBlock {
                    lines: Vec::new(),
                    text_x: 0,
                    text_y: 0,
                    height: table.height,
                    gap_before: cfg.block_gap_px,
                    gap_after: cfg.block_gap_px,
                    source_index: index,
                    kind: LayoutBlockKind::Table(table),
                });
                index = range.end.max(index + 1);
                continue;
            }
            match &document.blocks[index] {
                Block::Signature { text } => {
                    signature = self
                        .layout
                        .layout_text(text, content_w, &cfg.signature_style());
                }
                block => {
                    if let Some(laid) = self.layout_block(block, index) {
                        blocks.push(laid);
                    }
                }
            }
            index += 1;
        }

        for block in &blocks {
            self.report_overflow(block, content_w);
        }

        let content_top = cfg.content_top();
        let content_left = cfg.content_left();
        let mut y = content_top;
        let title = title_size
            .filter(|(w, h)| *w > 0 && *h > 0)
            .map(|(w, h)| {
                let scaled = ((h as f64 * content_w as f64) / w as f64).round().max(1.0) as u32;
                let rect = PxRect::new(content_left, y, content_w as u32, scaled);
                y += scaled as i32 + cfg.title_gap_px;
                rect
            });
        let mut cursor = BlockCursor::new(y);
        for block in &blocks {
            cursor.advance(block);
        }
        y = cursor.y();
        let signature_h: i32 = signature.iter().map(|line| line.height).sum();
        if !signature.is_empty() {
            y += cfg.signature_gap_px + signature_h;
        }
        let minimum = (y + cfg.panel_padding_px + cfg.margin_px).max(1) as u32;
        let canvas_h = match explicit_height {
            Some(requested) if requested >= minimum => requested,
            Some(requested) => {
                log::debug!(
                    "requested card height {}px below content minimum {}px",
                    requested,
                    minimum
                );
                self.emit_diagnostic(CardDiagnostic::HeightRaised { requested, minimum });
                minimum
            }
            None => minimum,
        };

        let canvas_w = cfg.display_width.max(1) as u32;
        let panel = PxRect::new(
            cfg.margin_px,
            cfg.margin_px,
            (canvas_w as i32 - 2 * cfg.margin_px).max(1) as u32,
            (canvas_h as i32 - 2 * cfg.margin_px).max(1) as u32,
        );
        let content = PxRect::new(
            content_left,
            content_top,
            content_w as u32,
            (canvas_h as i32 - cfg.vertical_chrome_px()).max(0) as u32,
        );
        let signature_rect = (!signature.is_empty()).then(|| {
            PxRect::new(
                content_left,
                content.bottom() - signature_h,
                content_w as u32,
                signature_h as u32,
            )
        });

        let elapsed = started.elapsed().as_millis().min(u32::MAX as u128) as u32;
        self.emit_diagnostic(CardDiagnostic::LayoutTimeMs(elapsed));

        CardLayout {
            blocks,
            signature,
            geometry: CardGeometry {
                canvas_width: canvas_w,
                canvas_height: canvas_h,
                panel,
                content,
                title,
                signature: signature_rect,
            },
            minimum_height: minimum,
        }
    }

    fn layout_block(&self, block: &Block, index: usize) -> Option<LayoutBlock> {
        let cfg = self.config();
        let content_w = cfg.content_width();
        let lines_height = |lines: &[Line]| -> i32 { lines.iter().map(|line| line.height).sum() };
        let text_block = |kind, lines: Vec<Line>, gap| LayoutBlock {
            height: lines_height(&lines),
            kind,
            lines,
            text_x: 0,
            text_y: 0,
            gap_before: gap,
            gap_after: gap,
            source_index: index,
        };

        let laid = match block {
            Block::Heading { level, runs } => {
                let style = cfg.heading_style(*level);
                let lines = self.layout.layout_runs(runs, content_w, &style);
                text_block(
                    LayoutBlockKind::Heading { level: *level },
                    lines,
                    cfg.heading_gap_px,
                )
            }
            Block::Paragraph { runs } => {
                let lines = self.layout.layout_runs(runs, content_w, &cfg.body_style());
                text_block(LayoutBlockKind::Paragraph, lines, cfg.block_gap_px)
            }
            Block::ListItem {
                ordered,
                number,
                depth,
                checked,
                runs,
            } => {
                let mut style = cfg.body_style().with_role(TextRole::ListItem);
                if *checked == Some(true) {
                    style.strikethrough = true;
                }
                let marker_x = *depth as i32 * cfg.list_indent_px;
                let (marker, marker_w) = match (checked, ordered) {
                    (Some(checked), _) => {
                        let size = (cfg.base_font_px * 0.7).round() as u32;
                        (
                            ListMarker::Checkbox {
                                checked: *checked,
                                size,
                            },
                            size as i32,
                        )
                    }
                    (None, true) => {
                        let label = format!("{}.", number.unwrap_or(1));
                        let marker_style = cfg.body_style().with_role(TextRole::ListMarker);
                        let mut lines = self.layout.layout_text(&label, i32::MAX, &marker_style);
                        let line = lines.pop().unwrap_or(Line {
                            fragments: Default::default(),
                            width: 0.0,
                            height: 0,
                            baseline: 0,
                        });
                        let width = line.width.ceil() as i32;
                        (ListMarker::Number(line), width)
                    }
                    (None, false) => (
                        ListMarker::Bullet {
                            filled: *depth == 0,
                            diameter: (cfg.base_font_px * 0.3).round() as u32,
                        },
                        (cfg.base_font_px * 0.6).round() as i32,
                    ),
                };
                let text_x = marker_x + marker_w + cfg.list_marker_gap_px;
                let lines = self
                    .layout
                    .layout_runs(runs, (content_w - text_x).max(1), &style);
                let (empty_h, _) = self.layout.line_box(&style);
                LayoutBlock {
                    height: lines_height(&lines).max(empty_h),
                    kind: LayoutBlockKind::ListItem {
                        marker,
                        marker_x,
                        checked: *checked,
                    },
                    lines,
                    text_x,
                    text_y: 0,
                    gap_before: cfg.list_item_gap_px,
                    gap_after: cfg.list_item_gap_px,
                    source_index: index,
                }
            }
            Block::CodeBlock { raw_lines, .. } => {
                let pad = cfg.code_padding_px;
                let style = cfg.code_style();
                let lines = if raw_lines.is_empty() {
                    self.layout
                        .layout_code_lines(&[String::new()], content_w - 2 * pad, &style)
                } else {
                    self.layout
                        .layout_code_lines(raw_lines, content_w - 2 * pad, &style)
                };
                LayoutBlock {
                    height: lines_height(&lines) + 2 * pad,
                    kind: LayoutBlockKind::Code,
                    lines,
                    text_x: pad,
                    text_y: pad,
                    gap_before: cfg.block_gap_px,
                    gap_after: cfg.block_gap_px,
                    source_index: index,
                }
            }
            Block::Blockquote { depth, runs } => {
                let bar_x = (*depth as i32 - 1).max(0) * cfg.quote_indent_px;
                let text_x = bar_x + cfg.quote_bar_px + cfg.quote_text_gap_px;
                let style = cfg.body_style().with_role(TextRole::Quote);
                let lines = self
                    .layout
                    .layout_runs(runs, (content_w - text_x).max(1), &style);
                LayoutBlock {
                    height: lines_height(&lines) + 2 * cfg.quote_padding_px,
                    kind: LayoutBlockKind::Quote { bar_x },
                    lines,
                    text_x,
                    text_y: cfg.quote_padding_px,
                    gap_before: cfg.block_gap_px,
                    gap_after: cfg.block_gap_px,
                    source_index: index,
                }
            }
            Block::Rule => LayoutBlock {
                kind: LayoutBlockKind::Rule,
                lines: Vec::new(),
                text_x: 0,
                text_y: 0,
                height: cfg.rule_height_px,
                gap_before: cfg.block_gap_px,
                gap_after: cfg.block_gap_px,
                source_index: index,
            },
            Block::TableRow { .. } | Block::Signature { .. } => return None,
        };
        Some(laid)
    }

    fn report_overflow(&self, block: &LayoutBlock, content_w: i32) {
        let limit = match &block.kind {
            LayoutBlockKind::Code => content_w - 2 * self.config().code_padding_px,
            _ => content_w - block.text_x,
        };
        for line in &block.lines {
            let width = line.width.ceil() as i32;
            if width > limit {
                self.emit_diagnostic(CardDiagnostic::OversizedLine {
                    block_index: block.source_index,
                    width,
                    limit,
                });
            }
        }
    }

    /// Pass 2: walk the pass-1 blocks in order and emit draw commands.
    pub fn compose(&self, layout: &CardLayout, palette: &ThemePalette) -> RenderCard {
        let cfg = self.config();
        let geometry = layout.geometry;
        let mut card = RenderCard::new(geometry);

        card.push_background_command(DrawCommand::Gradient(GradientCommand {
            width: geometry.canvas_width,
            height: geometry.canvas_height,
            stops: palette.background_gradient.clone(),
            direction: palette.gradient_direction,
        }));
        card.push_background_command(DrawCommand::Rect(RectCommand {
            x: geometry.panel.x,
            y: geometry.panel.y,
            width: geometry.panel.width,
            height: geometry.panel.height,
            fill: true,
            corner_radius: cfg.panel_corner_radius_px,
            color: palette.panel_rgba(),
        }));

        let left = geometry.content.x;
        let mut top = geometry.content.y;
        if let Some(title) = geometry.title {
            card.push_overlay_command(DrawCommand::Image(ImageCommand {
                x: title.x,
                y: title.y,
                width: title.width,
                height: title.height,
                corner_radius: cfg.title_corner_radius_px,
            }));
            top = title.bottom() + cfg.title_gap_px;
        }

        let mut cursor = BlockCursor::new(top);
        for block in &layout.blocks {
            let block_top = cursor.advance(block);
            self.compose_block(&mut card, block, left, block_top, palette);
        }

        if let Some(slot) = geometry.signature {
            let mut y = slot.y;
            for line in &layout.signature {
                let x = slot.right() - line.width.round() as i32;
                emit_line(
                    &mut card,
                    line,
                    x,
                    y,
                    Some(palette.muted_text_color),
                    palette,
                    Layer::Overlay,
                );
                y += line.height;
            }
        }

        card.push_overlay_command(DrawCommand::ClipCorners(ClipCornersCommand {
            radius: cfg.canvas_corner_radius_px,
        }));
        card
    }

    fn compose_block(
        &self,
        card: &mut RenderCard,
        block: &LayoutBlock,
        left: i32,
        top: i32,
        palette: &ThemePalette,
    ) {
        let cfg = self.config();
        let content_w = cfg.content_width();
        let mut color_override = None;

        match &block.kind {
            LayoutBlockKind::Heading { .. } | LayoutBlockKind::Paragraph => {}
            LayoutBlockKind::ListItem {
                marker,
                marker_x,
                checked,
            } => {
                if *checked == Some(true) {
                    color_override = Some(palette.muted_text_color);
                }
                let first = block.lines.first();
                let (line_h, baseline) = first
                    .map(|line| (line.height, line.baseline))
                    .unwrap_or_else(|| self.layout.line_box(&cfg.body_style()));
                let cy = top + line_h / 2;
                let x = left + marker_x;
                match marker {
                    ListMarker::Bullet { filled, diameter } => {
                        let box_w = (cfg.base_font_px * 0.6).round() as i32;
                        card.push_content_command(DrawCommand::Bullet(BulletCommand {
                            cx: x + box_w / 2,
                            cy,
                            diameter: *diameter,
                            filled: *filled,
                            color: palette.text_color_default,
                        }));
                    }
                    ListMarker::Number(line) => {
                        let shifted = Line {
                            baseline,
                            ..line.clone()
                        };
                        emit_line(card, &shifted, x, top, None, palette, Layer::Content);
                    }
                    ListMarker::Checkbox { checked, size } => {
                        let color = if *checked {
                            palette.quote_bar.rgb()
                        } else {
                            palette.muted_text_color
                        };
                        card.push_content_command(DrawCommand::Checkbox(CheckboxCommand {
                            x,
                            y: cy - *size as i32 / 2,
                            size: *size,
                            checked: *checked,
                            color,
                            mark_color: palette.check_mark_color,
                        }));
                    }
                }
            }
            LayoutBlockKind::Table(table) => {
                compose_table(card, cfg, table, left, top, palette);
                return;
            }
            LayoutBlockKind::Code => {
                card.push_content_command(DrawCommand::Rect(RectCommand {
                    x: left,
                    y: top,
                    width: content_w as u32,
                    height: block.height as u32,
                    fill: true,
                    corner_radius: cfg.code_corner_radius_px,
                    color: palette.code_background,
                }));
            }
            LayoutBlockKind::Quote { bar_x } => {
                let x = left + bar_x;
                card.push_content_command(DrawCommand::Rect(RectCommand {
                    x,
                    y: top,
                    width: (content_w - bar_x).max(1) as u32,
                    height: block.height as u32,
                    fill: true,
                    corner_radius: 0,
                    color: palette.quote_background,
                }));
                card.push_content_command(DrawCommand::Rect(RectCommand {
                    x,
                    y: top,
                    width: cfg.quote_bar_px as u32,
                    height: block.height as u32,
                    fill: true,
                    corner_radius: 0,
                    color: palette.quote_bar,
                }));
            }
            LayoutBlockKind::Rule => {
                let thickness = cfg.rule_thickness_px;
                card.push_content_command(DrawCommand::Rule(RuleCommand {
                    x: left,
                    y: top + (block.height - thickness as i32) / 2,
                    length: content_w as u32,
                    thickness,
                    horizontal: true,
                    color: palette.rule_color,
                }));
                return;
            }
        }

        let mut y = top + block.text_y;
        for line in &block.lines {
            emit_line(
                card,
                line,
                left + block.text_x,
                y,
                color_override,
                palette,
                Layer::Content,
            );
            y += line.height;
        }
    }
}

fn compose_table(
    card: &mut RenderCard,
    cfg: &LayoutConfig,
    table: &TableLayout,
    left: i32,
    top: i32,
    palette: &ThemePalette,
) {
    let border = cfg.table_border_px;
    let grid = palette.table_grid_color;
    let mut y = top;
    let mut body_index = 0usize;
    for row in &table.rows {
        let band = if row.is_header {
            Some(palette.table_header_background)
        } else {
            body_index += 1;
            // Every second body row gets a band.
            (body_index % 2 == 0).then_some(palette.table_row_alt_background)
        };
        if let Some(color) = band {
            card.push_content_command(DrawCommand::Rect(RectCommand {
                x: left,
                y,
                width: table.width as u32,
                height: row.height as u32,
                fill: true,
                corner_radius: 0,
                color,
            }));
        }
        let mut x = left;
        for (cell, width) in row.cells.iter().zip(&table.column_widths) {
            let mut line_y = y + cfg.table_cell_padding_y_px;
            for line in cell {
                emit_line(
                    card,
                    line,
                    x + cfg.table_cell_padding_x_px,
                    line_y,
                    None,
                    palette,
                    Layer::Content,
                );
                line_y += line.height;
            }
            x += width;
        }
        y += row.height;
        card.push_content_command(DrawCommand::Rule(RuleCommand {
            x: left,
            y: y - border as i32,
            length: table.width as u32,
            thickness: border,
            horizontal: true,
            color: grid,
        }));
    }

    let mut x = left;
    for width in table
        .column_widths
        .iter()
        .take(table.column_widths.len().saturating_sub(1))
    {
        x += width;
        card.push_content_command(DrawCommand::Rule(RuleCommand {
            x,
            y: top,
            length: table.height as u32,
            thickness: border,
            horizontal: false,
            color: grid,
        }));
    }
    card.push_content_command(DrawCommand::Rect(RectCommand {
        x: left,
        y: top,
        width: table.width as u32,
        height: table.height as u32,
        fill: false,
        corner_radius: 0,
        color: grid,
    }));
}

#[derive(Clone, Copy)]
enum Layer {
    Content,
    Overlay,
}

fn emit_line(
    card: &mut RenderCard,
    line: &Line,
    x: i32,
    top: i32,
    color_override: Option<Rgb>,
    palette: &ThemePalette,
    layer: Layer,
) {
    let baseline_y = top + line.baseline;
    for fragment in &line.fragments {
        let color = color_override
            .or(fragment.style.color)
            .unwrap_or(palette.text_color_default);
        let cmd = DrawCommand::Text(TextCommand {
            x: x + fragment.x.round() as i32,
            baseline_y,
            text: fragment.text.clone(),
            font: fragment.font,
            width: fragment.width.round() as i32,
            color,
            style: fragment.style.clone(),
        });
        match layer {
            Layer::Content => card.push_content_command(cmd),
            Layer::Overlay => card.push_overlay_command(cmd),
        }
    }
}
