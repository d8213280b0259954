//! Pure-scalar reference implementations of the projection and
//! rasterization stages. Slow but exact: the vectorized backends are
//! cross-validated against this crate.

mod buffer;
mod projector;
mod raster;

pub use buffer::{Buffer, blend_over};
pub use projector::{ScalarProjector, project_one};
pub use raster::SoftwareRaster;
