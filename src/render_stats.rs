//! Render statistics tracking for debugging and performance analysis.
//!
//! Enable render stats by compiling with the `render-stats` feature:
//! ```bash
//! cargo test --features render-stats
//! ```
//!
//! When enabled, `end_frame` logs a summary at most once per second showing:
//! - Layout passes
//! - Bucket rebuilds vs cached texture reuse
//! - Context (texture pair) allocations
//! - Batches and quads handed to the device

/// Snapshot of accumulated render statistics.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub layout_passes: u64,
    pub buckets_rebuilt: u64,
    pub buckets_reused: u64,
    pub contexts_allocated: u64,
    pub batches_submitted: u64,
    pub quads_submitted: u64,
}

#[cfg(feature = "render-stats")]
mod inner {
    use std::cell::RefCell;
    use std::time::Instant;

    thread_local! {
        static STATS: RefCell<RenderStats> = RefCell::new(RenderStats::new());
    }

    struct RenderStats {
        layout_passes: u64,
        // Buckets
        buckets_rebuilt: u64,
        buckets_reused: u64,
        contexts_allocated: u64,
        // Device
        batches_submitted: u64,
        quads_submitted: u64,
        // Timing
        last_print: Instant,
    }

    impl RenderStats {
        fn new() -> Self {
            Self {
                layout_passes: 0,
                buckets_rebuilt: 0,
                buckets_reused: 0,
                contexts_allocated: 0,
                batches_submitted: 0,
                quads_submitted: 0,
                last_print: Instant::now(),
            }
        }

        fn reset(&mut self) {
            *self = Self::new();
        }
    }

    /// Record a completed measure + arrange pass.
    #[inline]
    pub fn record_layout_pass() {
        STATS.with(|s| {
            s.borrow_mut().layout_passes += 1;
        });
    }

    /// Record a bucket whose texture was re-rendered.
    #[inline]
    pub fn record_bucket_rebuilt() {
        STATS.with(|s| {
            s.borrow_mut().buckets_rebuilt += 1;
        });
    }

    /// Record a bucket that reused its cached texture.
    #[inline]
    pub fn record_bucket_reused() {
        STATS.with(|s| {
            s.borrow_mut().buckets_reused += 1;
        });
    }

    /// Record a new front/back texture pair.
    #[inline]
    pub fn record_context_allocated() {
        STATS.with(|s| {
            s.borrow_mut().contexts_allocated += 1;
        });
    }

    /// Record one submission to the device.
    #[inline]
    pub fn record_submission(batches: usize, quads: usize) {
        STATS.with(|s| {
            let mut stats = s.borrow_mut();
            stats.batches_submitted += batches as u64;
            stats.quads_submitted += quads as u64;
        });
    }

    /// Return a snapshot of the current stats (for testing).
    pub fn get_stats() -> super::StatsSnapshot {
        STATS.with(|s| {
            let stats = s.borrow();
            super::StatsSnapshot {
                layout_passes: stats.layout_passes,
                buckets_rebuilt: stats.buckets_rebuilt,
                buckets_reused: stats.buckets_reused,
                contexts_allocated: stats.contexts_allocated,
                batches_submitted: stats.batches_submitted,
                quads_submitted: stats.quads_submitted,
            }
        })
    }

    /// Reset all stats to zero (for test isolation).
    pub fn reset_stats() {
        STATS.with(|s| {
            s.borrow_mut().reset();
        });
    }

    /// Called at the end of each frame to potentially log stats.
    pub fn end_frame() {
        STATS.with(|s| {
            let mut stats = s.borrow_mut();
            if stats.last_print.elapsed().as_secs() < 1 {
                return;
            }

            let bucket_total = stats.buckets_rebuilt + stats.buckets_reused;
            let reuse_rate = if bucket_total > 0 {
                (stats.buckets_reused as f64 / bucket_total as f64) * 100.0
            } else {
                0.0
            };

            log::info!(
                "[Render Stats] layout_passes={} buckets rebuilt={} reused={} reuse_rate={:.1}%",
                stats.layout_passes,
                stats.buckets_rebuilt,
                stats.buckets_reused,
                reuse_rate
            );
            log::info!(
                "  device: contexts={} batches={} quads={}",
                stats.contexts_allocated,
                stats.batches_submitted,
                stats.quads_submitted
            );

            stats.reset();
        });
    }
}

#[cfg(feature = "render-stats")]
pub use inner::*;

// No-op implementations when feature is disabled - these get completely inlined away

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn get_stats() -> StatsSnapshot {
    StatsSnapshot::default()
}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn reset_stats() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_layout_pass() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_bucket_rebuilt() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_bucket_reused() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_context_allocated() {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn record_submission(_batches: usize, _quads: usize) {}

#[cfg(not(feature = "render-stats"))]
#[inline(always)]
pub fn end_frame() {}
