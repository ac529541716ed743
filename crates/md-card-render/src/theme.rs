//! Light/dark palettes and time-of-day theme selection.

use chrono::Timelike;
use md_card::{Rgb, Rgba};
use serde::{Deserialize, Serialize};

use crate::render_ir::GradientDirection;

/// Palette family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeVariant {
    Light,
    Dark,
}

/// Local wall-clock source for theme selection.
pub trait Clock: Send + Sync {
    /// Minutes since local midnight, `0..1440`.
    fn local_minutes(&self) -> u32;
}

/// Production clock backed by the local timezone.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn local_minutes(&self) -> u32 {
        let now = chrono::Local::now();
        now.hour() * 60 + now.minute()
    }
}

/// Clock pinned to one time of day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedClock {
    pub minutes: u32,
}

impl FixedClock {
    pub const fn at(hour: u32, minute: u32) -> Self {
        Self {
            minutes: hour * 60 + minute,
        }
    }
}

impl Clock for FixedClock {
    fn local_minutes(&self) -> u32 {
        self.minutes % (24 * 60)
    }
}

/// Day window used when no theme is forced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThemeConfig {
    /// First light minute (inclusive).
    pub day_start_minutes: u32,
    /// First dark minute after the day (exclusive end of light).
    pub day_end_minutes: u32,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            day_start_minutes: 8 * 60 + 30,
            day_end_minutes: 19 * 60,
        }
    }
}

impl ThemeConfig {
    /// `override_variant` wins; otherwise light inside the day window.
    pub fn select_variant(
        &self,
        override_variant: Option<ThemeVariant>,
        clock: &dyn Clock,
    ) -> ThemeVariant {
        if let Some(variant) = override_variant {
            return variant;
        }
        let minutes = clock.local_minutes();
        if (self.day_start_minutes..self.day_end_minutes).contains(&minutes) {
            ThemeVariant::Light
        } else {
            ThemeVariant::Dark
        }
    }
}

const fn pair(a: (u8, u8, u8), b: (u8, u8, u8)) -> [Rgb; 2] {
    [Rgb::new(a.0, a.1, a.2), Rgb::new(b.0, b.1, b.2)]
}

const LIGHT_GRADIENTS: [[Rgb; 2]; 18] = [
    pair((246, 246, 248), (250, 250, 252)),
    pair((245, 245, 247), (248, 248, 250)),
    pair((191, 203, 255), (255, 203, 237)),
    pair((168, 225, 255), (203, 255, 242)),
    pair((255, 209, 209), (243, 209, 255)),
    pair((255, 230, 209), (255, 209, 247)),
    pair((213, 255, 219), (209, 247, 255)),
    pair((255, 236, 209), (255, 209, 216)),
    pair((237, 240, 245), (245, 237, 245)),
    pair((240, 245, 255), (245, 240, 245)),
    pair((255, 223, 242), (242, 223, 255)),
    pair((223, 255, 247), (223, 242, 255)),
    pair((255, 192, 203), (192, 203, 255)),
    pair((192, 255, 238), (238, 192, 255)),
    pair((230, 240, 255), (255, 240, 245)),
    pair((245, 240, 255), (240, 255, 240)),
    pair((255, 235, 235), (235, 235, 255)),
    pair((235, 255, 235), (255, 235, 245)),
];

const DARK_GRADIENTS: [[Rgb; 2]; 12] = [
    pair((20, 30, 48), (36, 59, 85)),
    pair((15, 32, 39), (44, 83, 100)),
    pair((35, 37, 38), (65, 67, 69)),
    pair((30, 19, 61), (58, 28, 113)),
    pair((18, 18, 40), (52, 40, 88)),
    pair((11, 26, 51), (40, 60, 110)),
    pair((25, 25, 35), (60, 45, 80)),
    pair((20, 40, 60), (60, 30, 70)),
    pair((10, 20, 40), (30, 50, 90)),
    pair((33, 20, 55), (20, 40, 80)),
    pair((28, 28, 48), (48, 28, 68)),
    pair((16, 36, 56), (36, 16, 56)),
];

/// Colors for one render. Selected once, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThemePalette {
    pub variant: ThemeVariant,
    /// At least two stops.
    pub background_gradient: Vec<Rgb>,
    pub gradient_direction: GradientDirection,
    /// Text without an explicit color.
    pub text_color_default: Rgb,
    pub panel_color: Rgb,
    pub panel_alpha: u8,
    /// Signature and completed task text.
    pub muted_text_color: Rgb,
    pub code_background: Rgba,
    pub quote_bar: Rgba,
    pub quote_background: Rgba,
    pub rule_color: Rgba,
    pub table_grid_color: Rgba,
    pub table_header_background: Rgba,
    /// Band behind every second body row.
    pub table_row_alt_background: Rgba,
    /// Check mark drawn over a filled checkbox.
    pub check_mark_color: Rgb,
}

impl ThemePalette {
    /// Palette for `variant` with the gradient pair picked by `seed`.
    pub fn new(variant: ThemeVariant, seed: u64, direction: GradientDirection) -> Self {
        let quote_bar = Rgba::new(100, 180, 255, 200);
        match variant {
            ThemeVariant::Light => {
                let stops = LIGHT_GRADIENTS[(seed % LIGHT_GRADIENTS.len() as u64) as usize];
                Self {
                    variant,
                    background_gradient: stops.to_vec(),
                    gradient_direction: direction,
                    text_color_default: Rgb::BLACK,
                    panel_color: Rgb::WHITE,
                    panel_alpha: 128,
                    muted_text_color: Rgb::new(110, 110, 110),
                    code_background: Rgba::new(230, 230, 230, 100),
                    quote_bar,
                    quote_background: Rgba::new(240, 240, 255, 70),
                    rule_color: Rgba::new(150, 150, 150, 255),
                    table_grid_color: Rgba::new(150, 150, 150, 255),
                    table_header_background: Rgba::new(225, 228, 240, 140),
                    table_row_alt_background: Rgba::new(236, 236, 236, 90),
                    check_mark_color: Rgb::WHITE,
                }
            }
            ThemeVariant::Dark => {
                let stops = DARK_GRADIENTS[(seed % DARK_GRADIENTS.len() as u64) as usize];
                Self {
                    variant,
                    background_gradient: stops.to_vec(),
                    gradient_direction: direction,
                    text_color_default: Rgb::WHITE,
                    panel_color: Rgb::new(50, 50, 50),
                    panel_alpha: 128,
                    muted_text_color: Rgb::new(170, 170, 170),
                    code_background: Rgba::new(50, 50, 50, 60),
                    quote_bar,
                    quote_background: Rgba::new(70, 70, 70, 40),
                    rule_color: Rgba::new(130, 130, 130, 255),
                    table_grid_color: Rgba::new(120, 120, 120, 255),
                    table_header_background: Rgba::new(80, 80, 90, 140),
                    table_row_alt_background: Rgba::new(90, 90, 90, 50),
                    check_mark_color: Rgb::new(30, 30, 30),
                }
            }
        }
    }

    pub fn panel_rgba(&self) -> Rgba {
        self.panel_color.with_alpha(self.panel_alpha)
    }
}

/// Stable FNV-1a hash of the document text, used as the default gradient
/// seed.
pub fn document_seed(text: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    text.bytes().fold(OFFSET, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_window_boundaries() {
        let cfg = ThemeConfig::default();
        let at = |h, m| cfg.select_variant(None, &FixedClock::at(h, m));
        assert_eq!(at(8, 29), ThemeVariant::Dark);
        assert_eq!(at(8, 30), ThemeVariant::Light);
        assert_eq!(at(18, 59), ThemeVariant::Light);
        assert_eq!(at(19, 0), ThemeVariant::Dark);
        assert_eq!(at(0, 0), ThemeVariant::Dark);
    }

    #[test]
    fn override_beats_clock() {
        let cfg = ThemeConfig::default();
        let noon = FixedClock::at(12, 0);
        assert_eq!(
            cfg.select_variant(Some(ThemeVariant::Dark), &noon),
            ThemeVariant::Dark
        );
    }

    #[test]
    fn seed_picks_gradient_deterministically() {
        let a = ThemePalette::new(ThemeVariant::Light, 2, GradientDirection::Diagonal);
        let b = ThemePalette::new(ThemeVariant::Light, 20, GradientDirection::Diagonal);
        assert_eq!(a.background_gradient, b.background_gradient);
        assert_eq!(a.background_gradient[0], Rgb::new(191, 203, 255));
        let dark = ThemePalette::new(ThemeVariant::Dark, 2, GradientDirection::Radial);
        assert_eq!(dark.text_color_default, Rgb::WHITE);
        assert_eq!(dark.gradient_direction, GradientDirection::Radial);
    }

    #[test]
    fn document_seed_is_stable() {
        assert_eq!(document_seed(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(document_seed("# T"), document_seed("# T"));
        assert_ne!(document_seed("# T"), document_seed("# U"));
    }
}
