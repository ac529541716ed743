use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use embedded_graphics::{
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle, Rectangle, RoundedRectangle},
};
use image::{
    codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder},
    imageops, ExtendedColorType, ImageEncoder, RgbaImage,
};
use md_card::{CardError, Rgb};
use md_card_render::{
    BulletCommand, CardEngine, CardOptions, CheckboxCommand, Clock, DrawCommand, FontChoice,
    ImageCommand, LayoutConfig, PngCompression, RectCommand, RenderCard, RuleCommand,
    TextCommand, ThemeConfig, TitleImage,
};

use crate::background::{clip_corners, paint_gradient, round_image_corners};
use crate::canvas::{AlphaTarget, BlendTarget, Canvas};
use crate::font::{
    placeholder_advance, FontBackend, FontFallbackReason, FontRegistry, FontSet, MonoFontBackend,
    TtfFontBackend,
};

/// Counters for text fallback reasons observed while drawing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextFallbackDiagnostics {
    pub missing_face: u64,
    pub missing_glyph: u64,
    pub placeholder: u64,
}

impl TextFallbackDiagnostics {
    pub fn total(&self) -> u64 {
        self.missing_face
            .saturating_add(self.missing_glyph)
            .saturating_add(self.placeholder)
    }

    fn note_reason(&mut self, reason: FontFallbackReason) {
        match reason {
            FontFallbackReason::MissingFace => {
                self.missing_face = self.missing_face.saturating_add(1)
            }
            FontFallbackReason::MissingGlyph => {
                self.missing_glyph = self.missing_glyph.saturating_add(1)
            }
            FontFallbackReason::Placeholder => {
                self.placeholder = self.placeholder.saturating_add(1)
            }
        }
    }
}

/// Per-render raster diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RasterDiagnostics {
    pub commands_drawn: u64,
    /// Text commands drawn with a face other than their style's primary.
    pub text_fallbacks: TextFallbackDiagnostics,
    /// Distinct codepoints drawn as placeholder boxes, in first-seen order.
    pub placeholder_codepoints: Vec<char>,
}

/// Renders markdown documents to card images.
///
/// Holds the shared font registry and card engine; each call builds its own
/// canvas and buffers, so one renderer can serve several threads.
#[derive(Debug)]
pub struct CardRenderer<B = MonoFontBackend> {
    registry: Arc<FontRegistry<B>>,
    engine: CardEngine,
}

impl<B> Clone for CardRenderer<B> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            engine: self.engine.clone(),
        }
    }
}

impl Default for CardRenderer<MonoFontBackend> {
    fn default() -> Self {
        Self::with_backend(MonoFontBackend)
    }
}

impl CardRenderer<MonoFontBackend> {
    /// Renderer over the built-in bitmap fonts.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CardRenderer<TtfFontBackend> {
    /// Renderer over TrueType faces. Fails when regular or bold is missing.
    pub fn from_fonts(fonts: &FontSet) -> Result<Self, CardError> {
        Ok(Self::with_backend(TtfFontBackend::load(fonts)?))
    }
}

impl<B> CardRenderer<B>
where
    B: FontBackend + 'static,
{
    pub fn with_backend(backend: B) -> Self {
        Self::with_registry(Arc::new(FontRegistry::new(backend)), LayoutConfig::default())
    }

    /// Share an existing registry and override layout constants.
    pub fn with_registry(registry: Arc<FontRegistry<B>>, cfg: LayoutConfig) -> Self {
        let engine = CardEngine::new(cfg).with_text_measurer(registry.clone());
        Self { registry, engine }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.engine = self.engine.with_clock(clock);
        self
    }

    pub fn with_theme_config(mut self, theme: ThemeConfig) -> Self {
        self.engine = self.engine.with_theme_config(theme);
        self
    }

    pub fn registry(&self) -> &Arc<FontRegistry<B>> {
        &self.registry
    }

    pub fn engine(&self) -> &CardEngine {
        &self.engine
    }

    /// Mutable engine access, e.g. to install a diagnostic sink.
    pub fn engine_mut(&mut self) -> &mut CardEngine {
        &mut self.engine
    }

    /// Run both layout passes and decode the title image without drawing.
    pub fn prepare(
        &self,
        document: &str,
        options: &CardOptions,
    ) -> Result<(RenderCard, Option<RgbaImage>), CardError> {
        options.validate(self.engine.config())?;
        let title = options.title_image.as_ref().map(load_title).transpose()?;
        let title_size = title.as_ref().map(RgbaImage::dimensions);
        let card = self.engine.prepare(document, options, title_size)?;
        Ok((card, title))
    }

    /// Render `document` and encode it as PNG.
    pub fn render(&self, document: &str, options: &CardOptions) -> Result<Vec<u8>, CardError> {
        let image = self.render_image(document, options)?;
        encode_png(&image, options.compression)
    }

    /// Render `document` to an RGBA buffer of the resolved card size.
    pub fn render_image(
        &self,
        document: &str,
        options: &CardOptions,
    ) -> Result<RgbaImage, CardError> {
        self.render_image_with_diagnostics(document, options)
            .map(|(image, _)| image)
    }

    /// Render and return per-render raster diagnostics.
    pub fn render_image_with_diagnostics(
        &self,
        document: &str,
        options: &CardOptions,
    ) -> Result<(RgbaImage, RasterDiagnostics), CardError> {
        let started = Instant::now();
        let (card, title) = self.prepare(document, options)?;
        let mut canvas = Canvas::new(card.width(), card.height());
        let mut diagnostics = RasterDiagnostics::default();
        let Ok(()) = self.execute(&card, title.as_ref(), &mut canvas, &mut diagnostics);
        log::debug!(
            "rendered {}x{} card with {} commands in {} ms",
            card.width(),
            card.height(),
            card.command_count(),
            started.elapsed().as_millis()
        );
        Ok((canvas.into_image(), diagnostics))
    }

    /// Execute every command of `card` onto `target`, layer by layer.
    pub fn execute<D>(
        &self,
        card: &RenderCard,
        title: Option<&RgbaImage>,
        target: &mut D,
        diagnostics: &mut RasterDiagnostics,
    ) -> Result<(), D::Error>
    where
        D: BlendTarget,
    {
        let mut pass = DrawPass {
            backend: self.registry.backend(),
            title,
            diagnostics,
            warned: HashSet::new(),
        };
        for cmd in card.commands() {
            pass.draw_command(target, cmd)?;
        }
        Ok(())
    }
}

/// Per-render drawing state.
struct DrawPass<'a, B> {
    backend: &'a B,
    title: Option<&'a RgbaImage>,
    diagnostics: &'a mut RasterDiagnostics,
    warned: HashSet<char>,
}

impl<B> DrawPass<'_, B>
where
    B: FontBackend,
{
    fn draw_command<D>(&mut self, target: &mut D, cmd: &DrawCommand) -> Result<(), D::Error>
    where
        D: BlendTarget,
    {
        self.diagnostics.commands_drawn = self.diagnostics.commands_drawn.saturating_add(1);
        match cmd {
            DrawCommand::Gradient(gradient) => paint_gradient(target, gradient),
            DrawCommand::Rect(rect) => draw_rect(target, rect),
            DrawCommand::Rule(rule) => draw_rule(target, rule),
            DrawCommand::Text(text) => self.draw_text(target, text),
            DrawCommand::Bullet(bullet) => draw_bullet(target, bullet),
            DrawCommand::Checkbox(checkbox) => draw_checkbox(target, checkbox),
            DrawCommand::Image(image) => self.draw_title(target, image),
            DrawCommand::ClipCorners(clip) => clip_corners(target, clip.radius),
        }
    }

    fn draw_text<D>(&mut self, target: &mut D, text: &TextCommand) -> Result<(), D::Error>
    where
        D: BlendTarget,
    {
        let color = rgb888(text.color);
        let origin = Point::new(text.x, text.baseline_y);
        let primary = text.style.primary_font();
        if text.font == FontChoice::Placeholder {
            let size = text.style.size_px;
            if text.text.chars().any(|ch| placeholder_advance(ch, size) > 0.0) {
                self.diagnostics
                    .text_fallbacks
                    .note_reason(FontFallbackReason::Placeholder);
            }
            self.draw_placeholder(target, text, color)?;
        } else {
            if text.font != primary {
                let reason = if self.backend.has_face(primary) {
                    FontFallbackReason::MissingGlyph
                } else {
                    FontFallbackReason::MissingFace
                };
                self.diagnostics.text_fallbacks.note_reason(reason);
            }
            self.backend
                .draw_glyph_run(target, text.font, &text.text, origin, &text.style, color)?;
        }
        if text.style.strikethrough {
            let size = text.style.size_px;
            let thickness = (size / 15.0).round().max(1.0) as u32;
            let y = text.baseline_y - (size * 0.3).round() as i32;
            Rectangle::new(
                Point::new(text.x, y),
                Size::new(text.width.max(0) as u32, thickness),
            )
            .into_styled(PrimitiveStyle::with_fill(color))
            .draw(target)?;
        }
        Ok(())
    }

    /// Hollow boxes for characters no face covers.
    fn draw_placeholder<D>(
        &mut self,
        target: &mut D,
        text: &TextCommand,
        color: Rgb888,
    ) -> Result<(), D::Error>
    where
        D: BlendTarget,
    {
        let size = text.style.size_px;
        let box_h = (size * 0.7).round().max(1.0) as u32;
        let style = PrimitiveStyle::with_stroke(color, 1);
        let mut pen_x = text.x as f32;
        for ch in text.text.chars() {
            let advance = placeholder_advance(ch, size);
            if advance <= 0.0 || ch.is_whitespace() {
                pen_x += advance;
                continue;
            }
            if self.warned.insert(ch) {
                self.diagnostics.placeholder_codepoints.push(ch);
                log::warn!("no font covers U+{:04X}; drawing placeholder", ch as u32);
            }
            let box_w = (advance - 2.0).max(1.0).round() as u32;
            let x = pen_x.round() as i32 + 1;
            let y = text.baseline_y - box_h as i32;
            Rectangle::new(Point::new(x, y), Size::new(box_w, box_h))
                .into_styled(style)
                .draw(target)?;
            pen_x += advance;
        }
        Ok(())
    }

    fn draw_title<D>(&mut self, target: &mut D, cmd: &ImageCommand) -> Result<(), D::Error>
    where
        D: BlendTarget,
    {
        let Some(source) = self.title else {
            log::debug!("image command without a decoded title image");
            return Ok(());
        };
        if cmd.width == 0 || cmd.height == 0 {
            return Ok(());
        }
        let mut scaled = imageops::resize(
            source,
            cmd.width,
            cmd.height,
            imageops::FilterType::Lanczos3,
        );
        round_image_corners(&mut scaled, cmd.corner_radius);
        for (x, y, px) in scaled.enumerate_pixels() {
            let [r, g, b, a] = px.0;
            if a == 0 {
                continue;
            }
            target.blend_pixel(
                Point::new(cmd.x + x as i32, cmd.y + y as i32),
                Rgb888::new(r, g, b),
                a,
            )?;
        }
        Ok(())
    }
}

fn rgb888(color: Rgb) -> Rgb888 {
    Rgb888::new(color.r, color.g, color.b)
}

fn draw_rect<D>(target: &mut D, rect: &RectCommand) -> Result<(), D::Error>
where
    D: BlendTarget,
{
    if rect.width == 0 || rect.height == 0 || rect.color.a == 0 {
        return Ok(());
    }
    let color = rgb888(rect.color.rgb());
    let style = if rect.fill {
        PrimitiveStyle::with_fill(color)
    } else {
        PrimitiveStyle::with_stroke(color, 1)
    };
    let bounds = Rectangle::new(Point::new(rect.x, rect.y), Size::new(rect.width, rect.height));
    let mut layer = AlphaTarget::new(target, rect.color.a);
    if rect.corner_radius > 0 {
        let r = rect.corner_radius;
        RoundedRectangle::with_equal_corners(bounds, Size::new(r, r))
            .into_styled(style)
            .draw(&mut layer)
    } else {
        bounds.into_styled(style).draw(&mut layer)
    }
}

fn draw_rule<D>(target: &mut D, rule: &RuleCommand) -> Result<(), D::Error>
where
    D: BlendTarget,
{
    let thickness = rule.thickness.max(1);
    let size = if rule.horizontal {
        Size::new(rule.length, thickness)
    } else {
        Size::new(thickness, rule.length)
    };
    let mut layer = AlphaTarget::new(target, rule.color.a);
    Rectangle::new(Point::new(rule.x, rule.y), size)
        .into_styled(PrimitiveStyle::with_fill(rgb888(rule.color.rgb())))
        .draw(&mut layer)
}

fn draw_bullet<D>(target: &mut D, bullet: &BulletCommand) -> Result<(), D::Error>
where
    D: BlendTarget,
{
    let color = rgb888(bullet.color);
    let style = if bullet.filled {
        PrimitiveStyle::with_fill(color)
    } else {
        PrimitiveStyle::with_stroke(color, 2)
    };
    Circle::with_center(Point::new(bullet.cx, bullet.cy), bullet.diameter.max(2))
        .into_styled(style)
        .draw(target)
}

fn draw_checkbox<D>(target: &mut D, checkbox: &CheckboxCommand) -> Result<(), D::Error>
where
    D: BlendTarget,
{
    let size = checkbox.size.max(4);
    let radius = (size / 5).max(1);
    let color = rgb888(checkbox.color);
    let style = if checkbox.checked {
        PrimitiveStyle::with_fill(color)
    } else {
        PrimitiveStyle::with_stroke(color, 2)
    };
    RoundedRectangle::with_equal_corners(
        Rectangle::new(Point::new(checkbox.x, checkbox.y), Size::new(size, size)),
        Size::new(radius, radius),
    )
    .into_styled(style)
    .draw(target)?;

    if checkbox.checked {
        let at = |fx: f32, fy: f32| {
            Point::new(
                checkbox.x + (size as f32 * fx).round() as i32,
                checkbox.y + (size as f32 * fy).round() as i32,
            )
        };
        let stroke = PrimitiveStyle::with_stroke(rgb888(checkbox.mark_color), (size / 8).max(2));
        let (start, corner, end) = (at(0.22, 0.52), at(0.42, 0.72), at(0.78, 0.3));
        Line::new(start, corner).into_styled(stroke).draw(target)?;
        Line::new(corner, end).into_styled(stroke).draw(target)?;
    }
    Ok(())
}

/// Read and decode a title image.
pub fn load_title(source: &TitleImage) -> Result<RgbaImage, CardError> {
    let bytes = match source {
        TitleImage::Path(path) => std::fs::read(path).map_err(|err| {
            CardError::decode("TITLE_IMAGE_READ", format!("cannot read title image: {err}"))
                .with_path(path.display().to_string())
        })?,
        TitleImage::Bytes(bytes) => bytes.clone(),
    };
    let image = image::load_from_memory(&bytes).map_err(|err| {
        let err = CardError::decode(
            "TITLE_IMAGE_DECODE",
            format!("cannot decode title image: {err}"),
        );
        match source {
            TitleImage::Path(path) => err.with_path(path.display().to_string()),
            TitleImage::Bytes(_) => err,
        }
    })?;
    Ok(image.to_rgba8())
}

/// Encode an RGBA buffer as PNG.
pub fn encode_png(image: &RgbaImage, compression: PngCompression) -> Result<Vec<u8>, CardError> {
    let level = match compression {
        PngCompression::Fast => CompressionType::Fast,
        PngCompression::Default => CompressionType::Default,
        PngCompression::Best => CompressionType::Best,
    };
    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, level, PngFilterType::Adaptive)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|err| CardError::encode("PNG_ENCODE", err.to_string()))?;
    Ok(out)
}

/// Render `document` with the built-in bitmap fonts and encode it as PNG.
pub fn render(document: &str, options: &CardOptions) -> Result<Vec<u8>, CardError> {
    CardRenderer::default().render(document, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use md_card_render::{FixedClock, ResolvedTextStyle, ThemeVariant};
    use std::sync::Mutex;

    fn pinned() -> CardRenderer {
        CardRenderer::default().with_clock(Arc::new(FixedClock::at(12, 0)))
    }

    fn light(width: u32) -> CardOptions {
        CardOptions {
            width,
            theme_override: Some(ThemeVariant::Light),
            gradient_seed: Some(1),
            ..CardOptions::default()
        }
    }

    #[test]
    fn rendered_image_matches_prepared_geometry() {
        let renderer = pinned();
        let options = light(600);
        let prepared = renderer.prepare("# Title\n\nbody text", &options);
        let image = renderer.render_image("# Title\n\nbody text", &options);
        let (Ok((card, _)), Ok(image)) = (prepared, image) else {
            panic!("render failed");
        };
        assert_eq!(image.dimensions(), (card.width(), card.height()));
        assert_eq!(image.get_pixel(0, 0).0[3], 0);
        let mid = image.get_pixel(card.width() / 2, 2).0;
        assert_eq!(mid[3], 255);
    }

    #[test]
    fn placeholder_warns_once_per_codepoint() {
        let renderer = pinned();
        let result =
            renderer.render_image_with_diagnostics("\u{1F600} and \u{1F600}\u{2603}", &light(600));
        let Ok((_, diagnostics)) = result else {
            panic!("render failed");
        };
        assert_eq!(diagnostics.placeholder_codepoints, vec!['\u{1F600}', '\u{2603}']);
        assert!(diagnostics.text_fallbacks.placeholder >= 1);
    }

    #[test]
    fn placeholder_skips_zero_width_selectors() {
        let renderer = pinned();
        let text = TextCommand {
            x: 10,
            baseline_y: 40,
            text: "\u{FE0F}\u{2603}\u{FE0F}".to_string(),
            font: FontChoice::Placeholder,
            width: 12,
            color: Rgb::new(255, 0, 0),
            style: ResolvedTextStyle::body(20.0, 1.2),
        };
        let mut card = RenderCard::default();
        card.push_content_command(DrawCommand::Text(text));
        let mut canvas = Canvas::new(60, 60);
        let mut diagnostics = RasterDiagnostics::default();
        let Ok(()) = renderer.execute(&card, None, &mut canvas, &mut diagnostics);
        // One 12px box whose left edge sits right after the origin.
        assert_eq!(canvas.pixel(11, 35), Some([255, 0, 0, 255]));
        assert_eq!(canvas.pixel(23, 35), Some([0, 0, 0, 0]));
        assert_eq!(diagnostics.placeholder_codepoints, vec!['\u{2603}']);
    }

    #[test]
    fn strikethrough_draws_bar_through_text() {
        let renderer = pinned();
        let mut style = ResolvedTextStyle::body(30.0, 1.2);
        style.strikethrough = true;
        let text = TextCommand {
            x: 10,
            baseline_y: 40,
            text: "    ".to_string(),
            font: FontChoice::Regular,
            width: 72,
            color: Rgb::new(0, 0, 255),
            style,
        };
        let mut card = RenderCard::default();
        card.push_content_command(DrawCommand::Text(text));
        let mut canvas = Canvas::new(100, 60);
        let mut diagnostics = RasterDiagnostics::default();
        let Ok(()) = renderer.execute(&card, None, &mut canvas, &mut diagnostics);
        assert_eq!(canvas.pixel(40, 31), Some([0, 0, 255, 255]));
        assert_eq!(canvas.pixel(40, 20), Some([0, 0, 0, 0]));
        assert_eq!(diagnostics.commands_drawn, 1);
    }

    #[test]
    fn translucent_rule_blends() {
        let mut canvas = Canvas::new(10, 4);
        let _ = canvas.draw_iter((0..10).flat_map(|x| {
            (0..4).map(move |y| Pixel(Point::new(x, y), Rgb888::new(0, 0, 0)))
        }));
        let rule = RuleCommand {
            x: 0,
            y: 1,
            length: 10,
            thickness: 2,
            horizontal: true,
            color: md_card::Rgba::new(255, 255, 255, 128),
        };
        let _ = draw_rule(&mut canvas, &rule);
        assert_eq!(canvas.pixel(5, 0), Some([0, 0, 0, 255]));
        assert_eq!(canvas.pixel(5, 1), Some([128, 128, 128, 255]));
        assert_eq!(canvas.pixel(5, 2), Some([128, 128, 128, 255]));
    }

    #[test]
    fn checked_checkbox_draws_mark_color() {
        let mut canvas = Canvas::new(40, 40);
        let checkbox = CheckboxCommand {
            x: 4,
            y: 4,
            size: 30,
            checked: true,
            color: Rgb::new(0, 120, 0),
            mark_color: Rgb::WHITE,
        };
        let _ = draw_checkbox(&mut canvas, &checkbox);
        let white = canvas
            .image()
            .pixels()
            .filter(|px| px.0 == [255, 255, 255, 255])
            .count();
        assert!(white > 10);

        let mut empty = Canvas::new(40, 40);
        let _ = draw_checkbox(
            &mut empty,
            &CheckboxCommand {
                checked: false,
                ..checkbox
            },
        );
        assert_eq!(empty.pixel(19, 19), Some([0, 0, 0, 0]));
        assert!((3..=5).any(|x| empty.pixel(x, 19).map(|p| p[3]) == Some(255)));
    }

    #[test]
    fn encoded_png_round_trips_dimensions() {
        let image = RgbaImage::from_pixel(7, 5, image::Rgba([1, 2, 3, 255]));
        for compression in [PngCompression::Fast, PngCompression::Default, PngCompression::Best] {
            let bytes = encode_png(&image, compression).unwrap_or_default();
            assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
            let decoded = image::load_from_memory(&bytes).map(|img| img.to_rgba8());
            assert_eq!(decoded.ok().map(|img| img.dimensions()), Some((7, 5)));
        }
    }

    #[test]
    fn engine_sink_sees_layout_diagnostics() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut renderer = pinned();
        let sink = seen.clone();
        renderer.engine_mut().set_diagnostic_sink(move |diag| {
            if let Ok(mut seen) = sink.lock() {
                seen.push(diag);
            }
        });
        let options = CardOptions {
            height: Some(50),
            ..light(600)
        };
        let _ = renderer.render("hello", &options);
        let seen = seen.lock().map(|seen| seen.clone()).unwrap_or_default();
        assert!(seen.iter().any(|diag| matches!(
            diag,
            md_card_render::CardDiagnostic::HeightRaised { requested: 50, .. }
        )));
    }
}
