use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Live-byte, peak, and allocation-count totals since the last reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocSnapshot {
    pub live_bytes: usize,
    pub peak_bytes: usize,
    pub allocs: usize,
}

impl AllocSnapshot {
    pub fn peak_kib(&self) -> f64 {
        self.peak_bytes as f64 / 1024.0
    }
}

/// Counting allocator for peak-heap guardrails.
///
/// Peak is tracked relative to the live bytes at `reset`, so allocations
/// made before a measured section do not count against its budget.
pub struct BudgetAlloc {
    live: AtomicUsize,
    baseline: AtomicUsize,
    peak: AtomicUsize,
    allocs: AtomicUsize,
}

impl BudgetAlloc {
    pub const fn new() -> Self {
        Self {
            live: AtomicUsize::new(0),
            baseline: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            allocs: AtomicUsize::new(0),
        }
    }

    pub fn reset(&self) {
        let live = self.live.load(Ordering::SeqCst);
        self.baseline.store(live, Ordering::SeqCst);
        self.peak.store(live, Ordering::SeqCst);
        self.allocs.store(0, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> AllocSnapshot {
        let baseline = self.baseline.load(Ordering::SeqCst);
        AllocSnapshot {
            live_bytes: self.live.load(Ordering::SeqCst).saturating_sub(baseline),
            peak_bytes: self.peak.load(Ordering::SeqCst).saturating_sub(baseline),
            allocs: self.allocs.load(Ordering::SeqCst),
        }
    }

    /// Run `op` from a fresh reset and return its result with the totals.
    pub fn measure<R>(&self, op: impl FnOnce() -> R) -> (R, AllocSnapshot) {
        self.reset();
        let out = op();
        (out, self.snapshot())
    }

    fn grow(&self, bytes: usize) {
        let live = self.live.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.peak.fetch_max(live, Ordering::SeqCst);
    }

    fn shrink(&self, bytes: usize) {
        let _ = self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                Some(live.saturating_sub(bytes))
            });
    }
}

unsafe impl GlobalAlloc for BudgetAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            self.grow(layout.size());
            self.allocs.fetch_add(1, Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            self.grow(layout.size());
            self.allocs.fetch_add(1, Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        self.shrink(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            match new_size.checked_sub(layout.size()) {
                Some(grown) => self.grow(grown),
                None => self.shrink(layout.size() - new_size),
            }
            self.allocs.fetch_add(1, Ordering::SeqCst);
        }
        new_ptr
    }
}
