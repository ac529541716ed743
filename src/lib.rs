//! Markdown front-end for `md-card`.
//!
//! Splits a markdown-like document into typed [`Block`]s and parses each
//! block's inline markup (color spans, emphasis, strikethrough, inline code,
//! links) into flat [`StyledRun`]s. Layout and rasterization live in the
//! `md-card-render` and `md-card-raster` crates.

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

mod blocks;
mod color;
mod error;
mod markup;

pub use blocks::{Block, Document};
pub use color::{named_color, parse_color, Rgb, Rgba};
pub use error::{CardError, ErrorLimitContext, ErrorPhase};
pub use markup::{parse_inline, plain_text, StyledRun};
