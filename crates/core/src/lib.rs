mod backend;
mod camera;
mod data;
mod error;
mod splat;

pub mod fixed;
pub mod format;
pub mod lut;

pub use backend::{BatchStats, Projector, RasterBackend, TileDraw};
pub use camera::Camera;
pub use data::{Aabb, Bounds, Size, pack_rgba, unpack_rgba};
pub use error::{Error, FormatError, Result};
pub use fixed::{Fx, Fx8, Mat4};
pub use lut::Luts;
pub use splat::{Splat2D, Splat3D};

/// Screen resolution the pipeline is tuned for.
pub const SCREEN_WIDTH: usize = 640;
pub const SCREEN_HEIGHT: usize = 448;

/// Fine tile configuration (16x16 pixels, 40x28 = 1120 tiles).
pub const TILE_SIZE: usize = 16;
pub const TILES_X: usize = SCREEN_WIDTH / TILE_SIZE;
pub const TILES_Y: usize = SCREEN_HEIGHT / TILE_SIZE;
pub const MAX_TILES: usize = TILES_X * TILES_Y;

/// Coarse tile configuration (64x64 pixels, hierarchical parent).
pub const COARSE_TILE_SIZE: usize = 64;
pub const COARSE_TILES_X: usize = SCREEN_WIDTH / COARSE_TILE_SIZE;
pub const COARSE_TILES_Y: usize = SCREEN_HEIGHT / COARSE_TILE_SIZE;
pub const MAX_COARSE_TILES: usize = COARSE_TILES_X * COARSE_TILES_Y;

/// Splats per coprocessor batch. Sized to the projector's memory window.
pub const BATCH_SIZE: usize = 128;

/// Hard cap on the scene size accepted by the loader.
pub const MAX_SCENE_SPLATS: usize = 65536;

/// Depth buckets used by the per-tile bucket sort.
pub const NUM_DEPTH_BUCKETS: usize = 256;

/// Alignment contracts for arena-carved buffers.
pub const CACHE_LINE_ALIGN: usize = 64;
pub const BATCH_BUFFER_ALIGN: usize = 128;
