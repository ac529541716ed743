use std::alloc::{GlobalAlloc, Layout, System};
use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use md_card::Document;
use md_card_raster::{CardOptions, CardRenderer, PngCompression, ThemeVariant};
use md_card_render::{CardEngine, FixedClock, LayoutConfig};

const WIDTHS: &[u32] = &[480, 1000];

struct TrackingAllocator;

static LIVE_BYTES: AtomicUsize = AtomicUsize::new(0);
static PEAK_BYTES: AtomicUsize = AtomicUsize::new(0);

#[global_allocator]
static GLOBAL_ALLOCATOR: TrackingAllocator = TrackingAllocator;

fn live_bytes() -> usize {
    LIVE_BYTES.load(Ordering::Relaxed)
}

fn reset_peak() -> usize {
    let live = live_bytes();
    PEAK_BYTES.store(live, Ordering::Relaxed);
    live
}

fn grow(delta: usize) {
    let live = LIVE_BYTES.fetch_add(delta, Ordering::Relaxed) + delta;
    PEAK_BYTES.fetch_max(live, Ordering::Relaxed);
}

fn shrink(delta: usize) {
    let _ = LIVE_BYTES.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |live| {
        Some(live.saturating_sub(delta))
    });
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            grow(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        shrink(layout.size());
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            grow(layout.size());
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            match new_size.checked_sub(layout.size()) {
                Some(grown) => grow(grown),
                None => shrink(layout.size() - new_size),
            }
        }
        new_ptr
    }
}

#[derive(Clone, Debug)]
struct CaseResult {
    document: String,
    case: String,
    iterations: usize,
    min_ns: u128,
    median_ns: u128,
    mean_ns: u128,
    max_ns: u128,
    median_peak_heap_bytes: usize,
    max_peak_heap_bytes: usize,
}

fn percentile<T: Copy>(sorted: &[T], percentile: f64) -> T {
    let idx = ((sorted.len().saturating_sub(1) as f64) * percentile).round() as usize;
    sorted[idx]
}

fn synthetic_document(sections: usize) -> String {
    let mut doc = String::from("# Benchmark card\n\n");
    for idx in 0..sections {
        doc.push_str(&format!(
            "## Part {idx}\n\n\
             Body text with **bold**, *italic*, ~~struck~~ and \
             <span style=\"color:#336699\">colored</span> words, long enough to wrap \
             several times on a narrow card.\n\n\
             - [x] done item\n\
             - [ ] open item with `inline code`\n\n\
             | key | value |\n\
             |-----|-------|\n\
             | alpha | {idx} |\n\n\
             > quoted remark {idx}\n\n\
             ```\n\
             fn part_{idx}() {{}}\n\
             ```\n\n"
        ));
    }
    doc
}

fn run_case<F>(
    document: &str,
    case: &str,
    warmup_iters: usize,
    measure_iters: usize,
    mut op: F,
) -> CaseResult
where
    F: FnMut() -> usize,
{
    for _ in 0..warmup_iters {
        black_box(op());
    }

    let mut time_samples = Vec::with_capacity(measure_iters);
    let mut mem_samples = Vec::with_capacity(measure_iters);
    for _ in 0..measure_iters {
        let baseline = reset_peak();
        let start = Instant::now();
        black_box(op());
        time_samples.push(start.elapsed().as_nanos());
        mem_samples.push(PEAK_BYTES.load(Ordering::Relaxed).saturating_sub(baseline));
    }

    time_samples.sort_unstable();
    mem_samples.sort_unstable();
    let time_sum: u128 = time_samples.iter().copied().sum();

    CaseResult {
        document: document.to_string(),
        case: case.to_string(),
        iterations: measure_iters,
        min_ns: time_samples[0],
        median_ns: percentile(&time_samples, 0.5),
        mean_ns: time_sum / time_samples.len() as u128,
        max_ns: time_samples[time_samples.len() - 1],
        median_peak_heap_bytes: percentile(&mem_samples, 0.5),
        max_peak_heap_bytes: mem_samples[mem_samples.len() - 1],
    }
}

fn main() {
    let quick = std::env::args().any(|arg| arg == "--quick");
    let warmup_iters = if quick { 1 } else { 2 };
    let measure_iters = if quick { 3 } else { 10 };

    println!("# md-card benchmark");
    println!(
        "# mode={} warmup_iters={} measure_iters={}",
        if quick { "quick" } else { "full" },
        warmup_iters,
        measure_iters
    );
    println!(
        "document,case,iterations,min_ns,median_ns,mean_ns,max_ns,median_peak_heap_bytes,max_peak_heap_bytes"
    );

    let clock = Arc::new(FixedClock::at(12, 0));
    let renderer = CardRenderer::default().with_clock(clock.clone());
    let engine = CardEngine::new(LayoutConfig::default())
        .with_text_measurer(renderer.registry().clone())
        .with_clock(clock);

    let mut results = Vec::new();
    for sections in [4usize, 32] {
        let source = synthetic_document(sections);
        for &width in WIDTHS {
            let key = format!("sections{sections}-w{width}");
            let options = CardOptions {
                width,
                theme_override: Some(ThemeVariant::Light),
                gradient_seed: Some(1),
                compression: PngCompression::Fast,
                ..CardOptions::default()
            };

            results.push(run_case(&key, "segment", warmup_iters, measure_iters, || {
                Document::parse(&source).blocks.len()
            }));

            results.push(run_case(&key, "layout", warmup_iters, measure_iters, || {
                engine
                    .prepare(&source, &options, None)
                    .map(|card| card.command_count())
                    .unwrap_or_else(|e| panic!("prepare failed: {}", e))
            }));

            results.push(run_case(&key, "rasterize", warmup_iters, measure_iters, || {
                renderer
                    .render_image(&source, &options)
                    .map(|image| image.height() as usize)
                    .unwrap_or_else(|e| panic!("render failed: {}", e))
            }));

            results.push(run_case(&key, "render_png", warmup_iters, measure_iters, || {
                renderer
                    .render(&source, &options)
                    .map(|png| png.len())
                    .unwrap_or_else(|e| panic!("render failed: {}", e))
            }));
        }
    }

    for result in &results {
        println!(
            "{},{},{},{},{},{},{},{},{}",
            result.document,
            result.case,
            result.iterations,
            result.min_ns,
            result.median_ns,
            result.mean_ns,
            result.max_ns,
            result.median_peak_heap_bytes,
            result.max_peak_heap_bytes,
        );
    }
}
