//! Render IR, layout engine, and two-pass card composition for `md-card`.

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

mod render_engine;
mod render_ir;
mod render_layout;
mod theme;

pub use md_card::{Block, CardError, Document, ErrorPhase, Rgb, Rgba, StyledRun};
pub use render_engine::{
    BlockCursor, CardDiagnostic, CardEngine, CardLayout, CardOptions, LayoutBlock,
    LayoutBlockKind, ListMarker, PngCompression, TitleImage,
};
pub use render_ir::{
    BulletCommand, CardGeometry, CheckboxCommand, ClipCornersCommand, DrawCommand, FontChoice,
    GradientCommand, GradientDirection, ImageCommand, PxRect, RectCommand, RenderCard,
    ResolvedTextStyle, RuleCommand, TextCommand, TextRole,
};
pub use render_layout::{
    fit_columns, is_wide_char, LayoutConfig, LayoutEngine, Line, LineFragment, LineMetrics,
    TableLayout, TableRowInput, TableRowLayout, TextMeasurer,
};
pub use theme::{
    document_seed, Clock, FixedClock, SystemClock, ThemeConfig, ThemePalette, ThemeVariant,
};
