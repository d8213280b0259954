use crate::camera::Camera;
use crate::data::Bounds;
use crate::error::Result;
use crate::lut::Luts;
use crate::splat::{Splat2D, Splat3D};

/// Counters for one completed projection batch. The difference between
/// `submitted` and `projected` is the per-splat drop count (behind the
/// near plane, outside NDC, numerically degenerate).
#[derive(Clone, Copy, Debug, Default)]
pub struct BatchStats {
    pub submitted: usize,
    pub projected: usize,
}

impl BatchStats {
    pub fn dropped(&self) -> usize {
        self.submitted - self.projected
    }
}

/// Batch projection stage, modeled as an asynchronous coprocessor with
/// a submit/wait protocol. At most one batch is in flight; the driver
/// double-buffers uploads against the in-flight batch.
pub trait Projector {
    /// Starts projecting a batch of at most [`crate::BATCH_SIZE`]
    /// splats. Must not be called while a batch is in flight.
    fn submit(&mut self, batch: &[Splat3D], camera: &Camera, luts: &Luts) -> Result<()>;

    /// Blocks until the in-flight batch completes and appends the
    /// surviving 2D splats to `out` in submission order.
    fn wait(&mut self, out: &mut Vec<Splat2D>) -> Result<BatchStats>;

    /// True while a batch is in flight.
    fn busy(&self) -> bool;
}

/// One tile's draw call: the scissor, the frame's projected splats and
/// the back-to-front order within the scissor.
#[derive(Clone, Copy)]
pub struct TileDraw<'a> {
    pub scissor: Bounds,
    pub splats: &'a [Splat2D],
    /// Indices into `splats`, most distant first.
    pub order: &'a [u32],
    /// Atlas footprints when set, procedural inverse-covariance
    /// evaluation otherwise (low quality tiers and fallback mode).
    pub use_atlas: bool,
}

/// Rasterization stage. A backend may pipeline across tiles but must
/// consume each tile's list strictly in order, so the composited result
/// matches a serial back-to-front reference.
pub trait RasterBackend {
    /// Starts a frame by clearing the back buffer to `clear` (packed
    /// RGBA).
    fn begin_frame(&mut self, clear: u32) -> Result<()>;

    /// Draws one tile's sorted splat list. Per-primitive overflow is
    /// dropped inside the backend; an `Err` marks the whole surface
    /// failed and the driver skips to the next tile.
    fn draw_tile(&mut self, draw: TileDraw<'_>, luts: &Luts) -> Result<()>;

    /// Frame barrier: completes all submitted tiles, then swaps the
    /// front and back buffers.
    fn end_frame(&mut self) -> Result<()>;
}
