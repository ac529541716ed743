use embedded_graphics::{
    mono_font::{
        ascii::{
            FONT_6X13, FONT_6X13_BOLD, FONT_7X14, FONT_7X14_BOLD, FONT_9X15, FONT_9X15_BOLD,
            FONT_9X18, FONT_9X18_BOLD,
        },
        MonoFont, MonoTextStyle,
    },
    pixelcolor::Rgb888,
    prelude::*,
    text::{Baseline, Text},
};
use md_card::CardError;
use md_card_render::{FontChoice, LineMetrics, ResolvedTextStyle, TextMeasurer};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::path::PathBuf;
use unicode_width::UnicodeWidthChar;

use crate::canvas::{BlendTarget, GlyphTarget};

/// Horizontal shear applied to synthesize italics.
pub const ITALIC_SHEAR: f32 = 0.2;

/// Width of the placeholder box drawn for uncovered characters, in em.
pub const PLACEHOLDER_EM: f32 = 0.6;

/// Advance of the placeholder box for `ch`. Zero-width characters such as
/// variation selectors and joiners take no space and draw no box.
pub fn placeholder_advance(ch: char, size_px: f32) -> f32 {
    if UnicodeWidthChar::width(ch) == Some(0) {
        0.0
    } else {
        size_px * PLACEHOLDER_EM
    }
}

/// Why a character was not drawn with its style's primary face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FontFallbackReason {
    /// The primary face is not loaded.
    MissingFace,
    /// The primary face lacks the glyph; a later face covers it.
    MissingGlyph,
    /// No face covers the glyph.
    Placeholder,
}

/// Face chosen for a character.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FontSelection {
    pub face: FontChoice,
    pub fallback_reason: Option<FontFallbackReason>,
}

/// Backend rendering capabilities used by callers for graceful degradation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub ttf: bool,
    pub antialiasing: bool,
    pub emoji: bool,
    pub fallback_faces: usize,
}

/// Font abstraction used by measurement and by the renderer's text paths.
pub trait FontBackend: Send + Sync {
    /// Whether `face` is loaded.
    fn has_face(&self, face: FontChoice) -> bool;

    /// Whether `face` has a glyph for `ch`.
    fn covers(&self, face: FontChoice, ch: char) -> bool;

    /// Advance width of `ch` in `face`.
    fn advance_px(&self, face: FontChoice, ch: char, size_px: f32) -> f32;

    fn line_metrics(&self, face: FontChoice, size_px: f32) -> LineMetrics;

    /// Draw `text` with its baseline-left corner at `origin`. Returns the
    /// advance in pixels.
    fn draw_glyph_run<D>(
        &self,
        target: &mut D,
        face: FontChoice,
        text: &str,
        origin: Point,
        style: &ResolvedTextStyle,
        color: Rgb888,
    ) -> Result<i32, D::Error>
    where
        D: BlendTarget;

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }
}

/// Built-in bitmap backend. Always available; covers printable ASCII.
#[derive(Clone, Copy, Debug, Default)]
pub struct MonoFontBackend;

#[derive(Clone, Copy)]
struct MonoFamily {
    regular: &'static MonoFont<'static>,
    bold: &'static MonoFont<'static>,
}

const MONO_FAMILIES: [MonoFamily; 4] = [
    MonoFamily {
        regular: &FONT_6X13,
        bold: &FONT_6X13_BOLD,
    },
    MonoFamily {
        regular: &FONT_7X14,
        bold: &FONT_7X14_BOLD,
    },
    MonoFamily {
        regular: &FONT_9X15,
        bold: &FONT_9X15_BOLD,
    },
    MonoFamily {
        regular: &FONT_9X18,
        bold: &FONT_9X18_BOLD,
    },
];

const MONO_MAX_SCALE: u32 = 8;

impl MonoFontBackend {
    /// Bitmap family and integer scale whose glyph height is closest to
    /// `size_px`. Ties keep the earlier (smaller) family.
    fn family_for(size_px: f32) -> (MonoFamily, u32) {
        let target = size_px.max(1.0);
        let mut best = (MONO_FAMILIES[0], 1u32);
        let mut best_err = f32::MAX;
        for family in MONO_FAMILIES {
            let h = family.regular.character_size.height;
            for scale in 1..=MONO_MAX_SCALE {
                let err = ((h * scale) as f32 - target).abs();
                if err < best_err {
                    best_err = err;
                    best = (family, scale);
                }
            }
        }
        best
    }

    fn font_for(face: FontChoice, style: &ResolvedTextStyle) -> (&'static MonoFont<'static>, u32) {
        let (family, scale) = Self::family_for(style.size_px);
        let bold = face == FontChoice::Bold || style.is_bold();
        (if bold { family.bold } else { family.regular }, scale)
    }

    fn mono_face(face: FontChoice) -> bool {
        matches!(
            face,
            FontChoice::Regular | FontChoice::Bold | FontChoice::Monospace
        )
    }
}

impl FontBackend for MonoFontBackend {
    fn has_face(&self, face: FontChoice) -> bool {
        Self::mono_face(face)
    }

    fn covers(&self, face: FontChoice, ch: char) -> bool {
        Self::mono_face(face) && (matches!(ch, ' '..='~') || mono_substitute(ch).is_some())
    }

    fn advance_px(&self, _face: FontChoice, ch: char, size_px: f32) -> f32 {
        let (family, scale) = Self::family_for(size_px);
        let cell = (family.regular.character_size.width * scale) as f32;
        let chars = mono_substitute(ch).map_or(1, |s| s.chars().count());
        cell * chars as f32
    }

    fn line_metrics(&self, _face: FontChoice, size_px: f32) -> LineMetrics {
        let (family, scale) = Self::family_for(size_px);
        let font = family.regular;
        let ascent = (font.baseline * scale) as f32;
        let descent = (font.character_size.height.saturating_sub(font.baseline) * scale) as f32;
        LineMetrics { ascent, descent }
    }

    fn draw_glyph_run<D>(
        &self,
        target: &mut D,
        face: FontChoice,
        text: &str,
        origin: Point,
        style: &ResolvedTextStyle,
        color: Rgb888,
    ) -> Result<i32, D::Error>
    where
        D: BlendTarget,
    {
        let (font, scale) = Self::font_for(face, style);
        let normalized = normalize_text_for_mono(text);
        let shear = if style.italic { ITALIC_SHEAR } else { 0.0 };
        let text_style = MonoTextStyle::new(font, color);
        let mut glyphs = GlyphTarget::new(target, origin, scale as i32, shear);
        Text::with_baseline(normalized.as_ref(), origin, text_style, Baseline::Alphabetic)
            .draw(&mut glyphs)?;
        let cell = (font.character_size.width * scale) as i32;
        Ok(normalized.chars().count() as i32 * cell)
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            ttf: false,
            antialiasing: false,
            emoji: false,
            fallback_faces: 0,
        }
    }
}

fn mono_substitute(ch: char) -> Option<&'static str> {
    match ch {
        '\u{00A0}' => Some(" "),
        '\u{2013}' | '\u{2014}' => Some("-"),
        '\u{2018}' | '\u{2019}' => Some("'"),
        '\u{201C}' | '\u{201D}' => Some("\""),
        '\u{2026}' => Some("..."),
        '\u{2022}' => Some("*"),
        _ => None,
    }
}

fn normalize_text_for_mono(text: &str) -> Cow<'_, str> {
    if !text.chars().any(|ch| mono_substitute(ch).is_some()) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match mono_substitute(ch) {
            Some(sub) => out.push_str(sub),
            None => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// Where to load a font face from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl FontSource {
    fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }

    fn read(&self) -> std::io::Result<Cow<'_, [u8]>> {
        match self {
            Self::Path(path) => std::fs::read(path).map(Cow::Owned),
            Self::Bytes(bytes) => Ok(Cow::Borrowed(bytes.as_slice())),
        }
    }
}

/// Face sources for the TrueType backend. Regular and bold are required.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontSet {
    pub regular: Option<FontSource>,
    pub bold: Option<FontSource>,
    pub monospace: Option<FontSource>,
    pub emoji: Option<FontSource>,
    /// Extra faces tried after emoji, in order.
    pub fallbacks: Vec<FontSource>,
}

impl FontSet {
    /// Whether any face is configured.
    pub fn is_empty(&self) -> bool {
        self.regular.is_none()
            && self.bold.is_none()
            && self.monospace.is_none()
            && self.emoji.is_none()
            && self.fallbacks.is_empty()
    }
}

/// TrueType/OpenType backend rasterized with `fontdue`.
pub struct TtfFontBackend {
    regular: fontdue::Font,
    bold: fontdue::Font,
    monospace: Option<fontdue::Font>,
    emoji: Option<fontdue::Font>,
    fallbacks: Vec<fontdue::Font>,
}

impl core::fmt::Debug for TtfFontBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TtfFontBackend")
            .field("monospace", &self.monospace.is_some())
            .field("emoji", &self.emoji.is_some())
            .field("fallbacks", &self.fallbacks.len())
            .finish_non_exhaustive()
    }
}

impl TtfFontBackend {
    /// Load every configured face.
    ///
    /// Missing or unparsable regular/bold faces are fatal; optional faces
    /// that fail to load are skipped with a warning.
    pub fn load(set: &FontSet) -> Result<Self, CardError> {
        let regular = load_required("regular", set.regular.as_ref())?;
        let bold = load_required("bold", set.bold.as_ref())?;
        let monospace = set
            .monospace
            .as_ref()
            .and_then(|source| load_optional("monospace", source));
        let emoji = set
            .emoji
            .as_ref()
            .and_then(|source| load_optional("emoji", source));
        let fallbacks = set
            .fallbacks
            .iter()
            .filter_map(|source| load_optional("fallback", source))
            .take(u8::MAX as usize)
            .collect();
        Ok(Self {
            regular,
            bold,
            monospace,
            emoji,
            fallbacks,
        })
    }

    fn face(&self, face: FontChoice) -> Option<&fontdue::Font> {
        match face {
            FontChoice::Regular => Some(&self.regular),
            FontChoice::Bold => Some(&self.bold),
            FontChoice::Monospace => self.monospace.as_ref(),
            FontChoice::Emoji => self.emoji.as_ref(),
            FontChoice::Fallback(idx) => self.fallbacks.get(idx as usize),
            FontChoice::Placeholder => None,
        }
    }
}

fn parse_face(role: &str, source: &FontSource) -> Result<fontdue::Font, CardError> {
    let bytes = source.read().map_err(|err| {
        CardError::init("FONT_MISSING", format!("cannot read {role} font: {err}"))
            .with_path(source.describe())
    })?;
    fontdue::Font::from_bytes(bytes.as_ref(), fontdue::FontSettings::default()).map_err(|err| {
        CardError::init("FONT_PARSE", format!("cannot parse {role} font: {err}"))
            .with_path(source.describe())
    })
}

fn load_required(role: &str, source: Option<&FontSource>) -> Result<fontdue::Font, CardError> {
    let Some(source) = source else {
        return Err(CardError::init(
            "FONT_MISSING",
            format!("no {role} font configured"),
        ));
    };
    parse_face(role, source)
}

fn load_optional(role: &str, source: &FontSource) -> Option<fontdue::Font> {
    match parse_face(role, source) {
        Ok(font) => Some(font),
        Err(err) => {
            log::warn!("skipping optional {} font: {}", role, err);
            None
        }
    }
}

impl FontBackend for TtfFontBackend {
    fn has_face(&self, face: FontChoice) -> bool {
        self.face(face).is_some()
    }

    fn covers(&self, face: FontChoice, ch: char) -> bool {
        self.face(face)
            .is_some_and(|font| font.lookup_glyph_index(ch) != 0)
    }

    fn advance_px(&self, face: FontChoice, ch: char, size_px: f32) -> f32 {
        self.face(face)
            .map(|font| font.metrics(ch, size_px).advance_width)
            .unwrap_or_else(|| placeholder_advance(ch, size_px))
    }

    fn line_metrics(&self, face: FontChoice, size_px: f32) -> LineMetrics {
        self.face(face)
            .or(Some(&self.regular))
            .and_then(|font| font.horizontal_line_metrics(size_px))
            .map(|m| LineMetrics {
                ascent: m.ascent,
                descent: -m.descent,
            })
            .unwrap_or_else(|| LineMetrics::heuristic(size_px))
    }

    fn draw_glyph_run<D>(
        &self,
        target: &mut D,
        face: FontChoice,
        text: &str,
        origin: Point,
        style: &ResolvedTextStyle,
        color: Rgb888,
    ) -> Result<i32, D::Error>
    where
        D: BlendTarget,
    {
        let Some(font) = self.face(face) else {
            return Ok(0);
        };
        let shear = if style.italic { ITALIC_SHEAR } else { 0.0 };
        let mut pen_x = origin.x as f32;
        for ch in text.chars() {
            let (metrics, coverage) = font.rasterize(ch, style.size_px);
            let left = pen_x.round() as i32 + metrics.xmin;
            let top = origin.y - metrics.ymin - metrics.height as i32;
            for row in 0..metrics.height {
                let y = top + row as i32;
                let slant = (shear * (origin.y - y) as f32).round() as i32;
                for col in 0..metrics.width {
                    let alpha = coverage[row * metrics.width + col];
                    if alpha == 0 {
                        continue;
                    }
                    target.blend_pixel(Point::new(left + col as i32 + slant, y), color, alpha)?;
                }
            }
            pen_x += metrics.advance_width;
        }
        Ok((pen_x - origin.x as f32).round() as i32)
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            ttf: true,
            antialiasing: true,
            emoji: self.emoji.is_some(),
            fallback_faces: self.fallbacks.len(),
        }
    }
}

/// Ordered face chain over a backend: monospace (code), then bold/regular,
/// then emoji and extra fallbacks, then the placeholder box.
///
/// Read-only after construction and shared across renders.
#[derive(Clone, Debug, Default)]
pub struct FontRegistry<B = MonoFontBackend> {
    backend: B,
}

impl FontRegistry<MonoFontBackend> {
    pub fn mono() -> Self {
        Self {
            backend: MonoFontBackend,
        }
    }
}

impl FontRegistry<TtfFontBackend> {
    /// Load TrueType faces. See [`TtfFontBackend::load`].
    pub fn from_fonts(set: &FontSet) -> Result<Self, CardError> {
        Ok(Self::new(TtfFontBackend::load(set)?))
    }
}

impl<B> FontRegistry<B>
where
    B: FontBackend,
{
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Faces tried for `style`, in order, skipping unloaded ones.
    pub fn fallback_chain(&self, style: &ResolvedTextStyle) -> SmallVec<[FontChoice; 8]> {
        let mut chain: SmallVec<[FontChoice; 8]> = SmallVec::new();
        if style.monospace {
            chain.push(FontChoice::Monospace);
        }
        if style.is_bold() {
            chain.push(FontChoice::Bold);
        }
        chain.push(FontChoice::Regular);
        chain.push(FontChoice::Emoji);
        let extra = self.backend.capabilities().fallback_faces.min(u8::MAX as usize);
        for idx in 0..extra {
            chain.push(FontChoice::Fallback(idx as u8));
        }
        chain.retain(|face| self.backend.has_face(*face));
        chain
    }

    /// First face in the chain covering `ch`.
    pub fn resolve(&self, ch: char, style: &ResolvedTextStyle) -> FontSelection {
        let primary = style.primary_font();
        let chain = self.fallback_chain(style);
        if ch.is_whitespace() {
            let face = chain.first().copied().unwrap_or(FontChoice::Placeholder);
            return FontSelection {
                face,
                fallback_reason: None,
            };
        }
        for face in chain.iter().copied() {
            if self.backend.covers(face, ch) {
                let fallback_reason = if face == primary {
                    None
                } else if !self.backend.has_face(primary) {
                    Some(FontFallbackReason::MissingFace)
                } else {
                    Some(FontFallbackReason::MissingGlyph)
                };
                return FontSelection {
                    face,
                    fallback_reason,
                };
            }
        }
        FontSelection {
            face: FontChoice::Placeholder,
            fallback_reason: Some(FontFallbackReason::Placeholder),
        }
    }

    fn advance(&self, face: FontChoice, ch: char, size_px: f32) -> f32 {
        if face == FontChoice::Placeholder {
            return placeholder_advance(ch, size_px);
        }
        self.backend.advance_px(face, ch, size_px)
    }
}

impl<B> TextMeasurer for FontRegistry<B>
where
    B: FontBackend,
{
    fn measure_text_px(&self, text: &str, style: &ResolvedTextStyle) -> f32 {
        text.chars()
            .map(|ch| self.advance(self.resolve(ch, style).face, ch, style.size_px))
            .sum()
    }

    fn select_font(&self, ch: char, style: &ResolvedTextStyle) -> FontChoice {
        self.resolve(ch, style).face
    }

    fn line_metrics(&self, style: &ResolvedTextStyle) -> LineMetrics {
        let face = self
            .fallback_chain(style)
            .first()
            .copied()
            .unwrap_or(FontChoice::Regular);
        self.backend.line_metrics(face, style.size_px)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;

    fn style(size: f32) -> ResolvedTextStyle {
        ResolvedTextStyle::body(size, 1.2)
    }

    #[test]
    fn mono_family_tracks_size() {
        let (family, scale) = MonoFontBackend::family_for(30.0);
        assert_eq!(family.regular.character_size.height * scale, 30);
        let (family, scale) = MonoFontBackend::family_for(13.0);
        assert_eq!((family.regular.character_size.height, scale), (13, 1));
        let small = MonoFontBackend.advance_px(FontChoice::Regular, 'a', 13.0);
        let large = MonoFontBackend.advance_px(FontChoice::Regular, 'a', 40.0);
        assert!(large > small);
    }

    #[test]
    fn mono_registry_measures_ascii_by_cell() {
        let registry = FontRegistry::mono();
        let style = style(30.0);
        let one = registry.measure_text_px("a", &style);
        assert_eq!(registry.measure_text_px("abcd", &style), one * 4.0);
        assert_eq!(registry.measure_text_px("a\u{2026}", &style), one * 4.0);
    }

    #[test]
    fn zero_width_chars_take_no_placeholder_space() {
        assert_eq!(placeholder_advance('\u{FE0F}', 20.0), 0.0);
        assert_eq!(placeholder_advance('\u{200D}', 20.0), 0.0);
        assert!((placeholder_advance('\u{2603}', 20.0) - 12.0).abs() < 1e-3);
        let registry = FontRegistry::mono();
        let with_selector = registry.measure_text_px("\u{2603}\u{FE0F}", &style(20.0));
        let bare = registry.measure_text_px("\u{2603}", &style(20.0));
        assert_eq!(with_selector, bare);
    }

    #[test]
    fn uncovered_chars_fall_to_placeholder() {
        let registry = FontRegistry::mono();
        let style = style(30.0);
        let selection = registry.resolve('\u{1F600}', &style);
        assert_eq!(selection.face, FontChoice::Placeholder);
        assert_eq!(
            selection.fallback_reason,
            Some(FontFallbackReason::Placeholder)
        );
        assert_eq!(registry.measure_text_px("\u{4E2D}", &style), 18.0);
    }

    #[test]
    fn chain_orders_monospace_bold_regular() {
        let registry = FontRegistry::mono();
        let mut code = style(28.0);
        code.monospace = true;
        code.weight = 700;
        let chain = registry.fallback_chain(&code);
        assert_eq!(
            chain.as_slice(),
            &[FontChoice::Monospace, FontChoice::Bold, FontChoice::Regular]
        );
        assert_eq!(registry.select_font('x', &code), FontChoice::Monospace);
    }

    #[test]
    fn mono_draw_uses_exact_color_and_returns_advance() {
        let mut canvas = Canvas::new(200, 60);
        let style = style(30.0);
        let red = Rgb888::new(255, 0, 0);
        let drawn = MonoFontBackend.draw_glyph_run(
            &mut canvas,
            FontChoice::Regular,
            "Hi",
            Point::new(10, 40),
            &style,
            red,
        );
        let expected = FontRegistry::mono().measure_text_px("Hi", &style) as i32;
        assert_eq!(drawn.ok(), Some(expected));
        let red_pixels = canvas
            .image()
            .pixels()
            .filter(|px| px.0 == [255, 0, 0, 255])
            .count();
        assert!(red_pixels > 20);
    }

    #[test]
    fn missing_required_ttf_face_is_fatal() {
        let err = TtfFontBackend::load(&FontSet::default()).err();
        assert_eq!(err.as_ref().map(|e| e.code), Some("FONT_MISSING"));
        assert!(err.is_some_and(|e| e.is_fatal_init()));

        let set = FontSet {
            regular: Some(FontSource::Path(PathBuf::from("/nonexistent/regular.ttf"))),
            bold: Some(FontSource::Bytes(vec![1, 2, 3])),
            ..FontSet::default()
        };
        let err = TtfFontBackend::load(&set).err();
        assert_eq!(err.as_ref().map(|e| e.code), Some("FONT_MISSING"));
        assert_eq!(
            err.and_then(|e| e.path).as_deref(),
            Some("/nonexistent/regular.ttf")
        );
    }

    #[test]
    fn garbage_ttf_bytes_fail_to_parse() {
        let set = FontSet {
            regular: Some(FontSource::Bytes(vec![0; 16])),
            bold: Some(FontSource::Bytes(vec![0; 16])),
            ..FontSet::default()
        };
        let err = TtfFontBackend::load(&set).err();
        assert_eq!(err.map(|e| e.code), Some("FONT_PARSE"));
    }

    #[test]
    fn font_set_deserializes_paths() {
        let set: FontSet = serde_json::from_str(
            r#"{"regular":{"path":"/fonts/a.ttf"},"fallbacks":[{"path":"/fonts/b.ttf"}]}"#,
        )
        .unwrap_or_default();
        assert_eq!(
            set.regular,
            Some(FontSource::Path(PathBuf::from("/fonts/a.ttf")))
        );
        assert_eq!(set.fallbacks.len(), 1);
        assert!(!set.is_empty());
    }
}
