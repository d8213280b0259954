//! A fixed-point 3D Gaussian splatting renderer for tile-based,
//! FPU-poor targets.
//!
//! All per-frame math runs in Q16.16 with lookup tables standing in for
//! transcendental functions. The pipeline is cull (spatial grid +
//! frustum), project (batched, double buffered), bin (16x16 tiles,
//! back-to-front) and rasterize, driven frame by frame through
//! [`Renderer`]. The projection and raster stages sit behind the
//! [`Projector`] and [`RasterBackend`] traits; the `software` feature
//! provides the scalar reference implementations.

pub mod arena;
pub mod grid;
pub mod pipeline;
pub mod profile;
pub mod scene;
pub mod tile;

pub use picosplat_core::{
    Aabb, BatchStats, Bounds, Camera, Error, FormatError, Fx, Fx8, Luts, Mat4, Projector,
    RasterBackend, Result, Size, Splat2D, Splat3D, TileDraw, fixed, format, lut, pack_rgba,
    unpack_rgba,
};
pub use picosplat_core::{
    BATCH_SIZE, MAX_SCENE_SPLATS, MAX_TILES, SCREEN_HEIGHT, SCREEN_WIDTH, TILE_SIZE, TILES_X,
    TILES_Y,
};

#[cfg(feature = "software")]
pub use picosplat_software as software;

pub use pipeline::Renderer;
pub use profile::FrameProfile;
pub use scene::SceneStore;

#[cfg(feature = "software")]
impl Renderer<software::ScalarProjector, software::SoftwareRaster> {
    /// A renderer over the scalar reference backends at the native
    /// 640x448 resolution.
    pub fn software(splats: Vec<Splat3D>) -> Result<Self> {
        Renderer::new(
            splats,
            software::ScalarProjector::new(),
            software::SoftwareRaster::new(SCREEN_WIDTH, SCREEN_HEIGHT),
        )
    }
}
