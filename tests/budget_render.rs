mod common;

use std::sync::Arc;

use common::budget_alloc::BudgetAlloc;
use common::fixtures::{long_document, KITCHEN_SINK};
use md_card_raster::{CardOptions, CardRenderer, ThemeVariant};
use md_card_render::FixedClock;

// Layout-only peaks sit well under 1MiB for these documents.
const PREPARE_BUDGET_BYTES: usize = 2 * 1024 * 1024;
// Raster peaks are dominated by the RGBA canvas. The encoder holds its
// compressed stream and the output buffer at the same time.
const RASTER_OVERHEAD_BYTES: usize = 4 * 1024 * 1024;

#[global_allocator]
static ALLOC: BudgetAlloc = BudgetAlloc::new();

fn options() -> CardOptions {
    CardOptions {
        width: 720,
        theme_override: Some(ThemeVariant::Light),
        gradient_seed: Some(11),
        ..CardOptions::default()
    }
}

// Single test so no other test thread allocates during measurement.
#[test]
fn render_stays_under_budget() {
    let renderer = CardRenderer::default().with_clock(Arc::new(FixedClock::at(12, 0)));
    let long = long_document(24);
    for (name, doc) in [("kitchen_sink", KITCHEN_SINK), ("long", long.as_str())] {
        let (prepared, prep) = ALLOC.measure(|| renderer.prepare(doc, &options()));
        let (card, _) = prepared.unwrap_or_else(|e| panic!("prepare {name}: {e}"));
        assert!(
            prep.peak_bytes <= PREPARE_BUDGET_BYTES,
            "prepare peak over budget for {name}: {:.1}KiB, budget {}KiB",
            prep.peak_kib(),
            PREPARE_BUDGET_BYTES / 1024
        );

        let canvas_bytes = card.width() as usize * card.height() as usize * 4;
        let budget = 3 * canvas_bytes + RASTER_OVERHEAD_BYTES;
        let (png, full) = ALLOC.measure(|| renderer.render(doc, &options()));
        let png = png.unwrap_or_else(|e| panic!("render {name}: {e}"));
        assert!(!png.is_empty());
        assert!(
            full.peak_bytes <= budget,
            "render peak over budget for {name}: {:.1}KiB, budget {}KiB",
            full.peak_kib(),
            budget / 1024
        );
        println!(
            "budget doc={} size={}x{} prepare_peak_kib={:.1} render_peak_kib={:.1} allocs={}",
            name,
            card.width(),
            card.height(),
            prep.peak_kib(),
            full.peak_kib(),
            full.allocs
        );
    }
}
