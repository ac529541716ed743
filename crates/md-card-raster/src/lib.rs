//! Raster backend for `md-card`: font registry, RGBA canvas, background
//! painting, draw-command execution, and PNG output.
//!
//! ```no_run
//! use md_card_raster::{render, CardOptions};
//!
//! let png = render("# Hello\n\nworld", &CardOptions::default())?;
//! std::fs::write("card.png", png)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

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

pub mod background;
pub mod canvas;
pub mod font;
mod renderer;

pub use canvas::{AlphaTarget, BlendTarget, Canvas};
pub use font::{
    BackendCapabilities, FontBackend, FontFallbackReason, FontRegistry, FontSelection, FontSet,
    FontSource, MonoFontBackend, TtfFontBackend,
};
pub use md_card::{CardError, ErrorPhase};
pub use md_card_render::{CardOptions, PngCompression, ThemeVariant, TitleImage};
pub use renderer::{
    encode_png, load_title, render, CardRenderer, RasterDiagnostics, TextFallbackDiagnostics,
};
