//! Per-frame profiling counters returned by the renderer.

use std::time::Duration;

/// Timings and funnel counters for one completed frame.
///
/// The counters form a monotone chain:
/// `input_splats >= visible_splats >= projected_splats >= rendered_splats`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameProfile {
    pub frame_number: u64,

    pub input_splats: usize,
    pub visible_splats: usize,
    pub projected_splats: usize,
    /// Projected splats that landed in at least one tile.
    pub rendered_splats: usize,

    pub visible_cells: usize,
    pub empty_cells: usize,
    pub hysteresis_kept: usize,

    pub tiles_rendered: usize,
    pub overlap_entries: usize,
    pub load_balance_factor: f32,
    pub sort_reused: bool,

    pub cull_ns: u64,
    pub project_ns: u64,
    pub bin_ns: u64,
    pub raster_ns: u64,
    pub frame_ns: u64,

    pub quality_level: u8,
    pub max_splats: usize,
    pub fallback_mode: bool,
}

impl FrameProfile {
    pub fn frame_time(&self) -> Duration {
        Duration::from_nanos(self.frame_ns)
    }

    /// Frames per second implied by the frame time, in hundredths.
    pub fn fps_x100(&self) -> u64 {
        if self.frame_ns == 0 {
            u64::MAX
        } else {
            100_000_000_000 / self.frame_ns
        }
    }
}
