/// Instrumentation for pipeline microoptimization
/// Call counting is compiled in only with the `profiling` feature
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for pipeline stage tracking
pub struct FunctionCounters {
    // Setup counters
    pub draw_calls: AtomicU64,
    pub triangles_submitted: AtomicU64,
    pub triangles_culled: AtomicU64,
    pub triangles_degenerate: AtomicU64,

    // Binning counters
    pub pixel_tasks: AtomicU64,
    pub tiles_visited: AtomicU64,

    // Pixel counters
    pub quad_quads_shaded: AtomicU64,
    pub pixels_written: AtomicU64,
    pub destination_fetches: AtomicU64,
}

impl FunctionCounters {
    pub const fn new() -> Self {
        Self {
            draw_calls: AtomicU64::new(0),
            triangles_submitted: AtomicU64::new(0),
            triangles_culled: AtomicU64::new(0),
            triangles_degenerate: AtomicU64::new(0),
            pixel_tasks: AtomicU64::new(0),
            tiles_visited: AtomicU64::new(0),
            quad_quads_shaded: AtomicU64::new(0),
            pixels_written: AtomicU64::new(0),
            destination_fetches: AtomicU64::new(0),
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        for counter in self.all() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn all(&self) -> [&AtomicU64; 9] {
        [
            &self.draw_calls,
            &self.triangles_submitted,
            &self.triangles_culled,
            &self.triangles_degenerate,
            &self.pixel_tasks,
            &self.tiles_visited,
            &self.quad_quads_shaded,
            &self.pixels_written,
            &self.destination_fetches,
        ]
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            draw_calls: self.draw_calls.load(Ordering::Relaxed),
            triangles_submitted: self.triangles_submitted.load(Ordering::Relaxed),
            triangles_culled: self.triangles_culled.load(Ordering::Relaxed),
            triangles_degenerate: self.triangles_degenerate.load(Ordering::Relaxed),
            pixel_tasks: self.pixel_tasks.load(Ordering::Relaxed),
            tiles_visited: self.tiles_visited.load(Ordering::Relaxed),
            quad_quads_shaded: self.quad_quads_shaded.load(Ordering::Relaxed),
            pixels_written: self.pixels_written.load(Ordering::Relaxed),
            destination_fetches: self.destination_fetches.load(Ordering::Relaxed),
        }
    }
}

impl Default for FunctionCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of counter values at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub draw_calls: u64,
    pub triangles_submitted: u64,
    pub triangles_culled: u64,
    pub triangles_degenerate: u64,
    pub pixel_tasks: u64,
    pub tiles_visited: u64,
    pub quad_quads_shaded: u64,
    pub pixels_written: u64,
    pub destination_fetches: u64,
}

impl CounterSnapshot {
    /// Log a formatted report at info level
    pub fn log_report(&self) {
        log::info!("=== Performance Counters Report ===");
        log::info!("Setup:");
        log::info!("  draw calls:                 {:12}", self.draw_calls);
        log::info!("  triangles submitted:        {:12}", self.triangles_submitted);
        log::info!("  triangles culled:           {:12}", self.triangles_culled);
        log::info!("  triangles degenerate:       {:12}", self.triangles_degenerate);

        log::info!("Binning:");
        log::info!("  pixel tasks:                {:12}", self.pixel_tasks);
        log::info!("  tiles visited:              {:12}", self.tiles_visited);

        log::info!("Pixels:");
        log::info!("  quad-quads shaded:          {:12}", self.quad_quads_shaded);
        log::info!("  pixels written:             {:12}", self.pixels_written);
        log::info!("  destination fetches:        {:12}", self.destination_fetches);
        if self.quad_quads_shaded > 0 {
            let occupancy =
                self.pixels_written as f64 / (self.quad_quads_shaded as f64 * 16.0) * 100.0;
            log::info!("  lane occupancy:             {:11.2}%", occupancy);
        }
    }
}

/// Global function counters instance
pub static FUNCTION_COUNTERS: FunctionCounters = FunctionCounters::new();

/// Macro for incrementing a counter (only when profiling feature is enabled)
#[macro_export]
macro_rules! count_call {
    ($counter:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Macro for adding to a counter (only when profiling feature is enabled)
#[macro_export]
macro_rules! count_add {
    ($counter:expr, $value:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add($value as u64, std::sync::atomic::Ordering::Relaxed);
        }
    };
}
