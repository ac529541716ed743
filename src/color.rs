//! Color values and the name table used by inline color spans.

use serde::{Deserialize, Serialize};

/// Opaque 8-bit RGB color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Attach an alpha channel.
    pub const fn with_alpha(self, a: u8) -> Rgba {
        Rgba {
            r: self.r,
            g: self.g,
            b: self.b,
            a,
        }
    }

    /// Linear interpolation toward `other`; `t` is clamped to `[0, 1]`.
    pub fn lerp(self, other: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| -> u8 {
            (a as f32 + (b as f32 - a as f32) * t)
                .round()
                .clamp(0.0, 255.0) as u8
        };
        Self::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }
}

/// 8-bit RGB color with straight alpha.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(self) -> Rgb {
        Rgb::new(self.r, self.g, self.b)
    }
}

const NAMED_COLORS: &[(&str, Rgb)] = &[
    ("black", Rgb::new(0, 0, 0)),
    ("white", Rgb::new(255, 255, 255)),
    ("red", Rgb::new(255, 0, 0)),
    ("green", Rgb::new(0, 128, 0)),
    ("lime", Rgb::new(0, 255, 0)),
    ("blue", Rgb::new(0, 0, 255)),
    ("yellow", Rgb::new(255, 255, 0)),
    ("purple", Rgb::new(128, 0, 128)),
    ("orange", Rgb::new(255, 165, 0)),
    ("pink", Rgb::new(255, 192, 203)),
    ("brown", Rgb::new(165, 42, 42)),
    ("gray", Rgb::new(128, 128, 128)),
    ("grey", Rgb::new(128, 128, 128)),
    ("cyan", Rgb::new(0, 255, 255)),
    ("magenta", Rgb::new(255, 0, 255)),
    ("teal", Rgb::new(0, 128, 128)),
    ("navy", Rgb::new(0, 0, 128)),
    ("olive", Rgb::new(128, 128, 0)),
    ("maroon", Rgb::new(128, 0, 0)),
    ("silver", Rgb::new(192, 192, 192)),
    ("gold", Rgb::new(255, 215, 0)),
    ("coral", Rgb::new(255, 127, 80)),
    ("红色", Rgb::new(255, 0, 0)),
    ("蓝色", Rgb::new(0, 0, 255)),
    ("绿色", Rgb::new(0, 128, 0)),
    ("黄色", Rgb::new(255, 255, 0)),
    ("紫色", Rgb::new(128, 0, 128)),
    ("橙色", Rgb::new(255, 165, 0)),
    ("粉色", Rgb::new(255, 192, 203)),
    ("青色", Rgb::new(0, 255, 255)),
    ("灰色", Rgb::new(128, 128, 128)),
    ("棕色", Rgb::new(165, 42, 42)),
    ("黑色", Rgb::new(0, 0, 0)),
    ("白色", Rgb::new(255, 255, 255)),
    ("珊瑚色", Rgb::new(255, 127, 80)),
];

/// Look up a color by name. ASCII names match case-insensitively.
pub fn named_color(name: &str) -> Option<Rgb> {
    let name = name.trim();
    NAMED_COLORS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(_, rgb)| *rgb)
}

/// Parse a CSS-like color value: a known name, `#RGB`, `#RRGGBB`, or
/// `rgb(r, g, b)`.
pub fn parse_color(value: &str) -> Option<Rgb> {
    let value = value.trim().trim_end_matches(';').trim();
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(args) = value
        .strip_prefix("rgb(")
        .or_else(|| value.strip_prefix("RGB("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return parse_rgb_function(args);
    }
    named_color(value)
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        3 => {
            let mut digits = hex.chars().filter_map(|c| c.to_digit(16));
            let r = digits.next()? as u8;
            let g = digits.next()? as u8;
            let b = digits.next()? as u8;
            Some(Rgb::new(r * 17, g * 17, b * 17))
        }
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some(Rgb::new(r, g, b))
        }
        _ => None,
    }
}

fn parse_rgb_function(args: &str) -> Option<Rgb> {
    let mut parts = args.split(',').map(|part| part.trim().parse::<u8>());
    let r = parts.next()?.ok()?;
    let g = parts.next()?.ok()?;
    let b = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(Rgb::new(r, g, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_hex() {
        assert_eq!(parse_color("#FF0000"), Some(Rgb::new(255, 0, 0)));
        assert_eq!(parse_color("#0f8"), Some(Rgb::new(0, 255, 136)));
        assert_eq!(parse_color(" #12ab34; "), Some(Rgb::new(0x12, 0xab, 0x34)));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(parse_color("#zzzzzz"), None);
        assert_eq!(parse_color("#"), None);
    }

    #[test]
    fn resolves_english_and_chinese_names() {
        assert_eq!(parse_color("Red"), Some(Rgb::new(255, 0, 0)));
        assert_eq!(parse_color("grey"), parse_color("gray"));
        assert_eq!(parse_color("紫色"), Some(Rgb::new(128, 0, 128)));
        assert_eq!(parse_color("珊瑚色"), parse_color("coral"));
        assert_eq!(parse_color("chartreuse-ish"), None);
    }

    #[test]
    fn parses_rgb_function() {
        assert_eq!(parse_color("rgb(1, 2, 3)"), Some(Rgb::new(1, 2, 3)));
        assert_eq!(parse_color("rgb(1, 2)"), None);
        assert_eq!(parse_color("rgb(1, 2, 300)"), None);
    }

    #[test]
    fn lerp_hits_endpoints() {
        let a = Rgb::new(0, 100, 200);
        let b = Rgb::new(200, 100, 0);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
        assert_eq!(a.lerp(b, 0.5), Rgb::new(100, 100, 100));
    }
}
