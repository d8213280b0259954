//! Immutable scene storage.
//!
//! Splats are validated and regularized once at load time so the frame
//! loop never has to branch on malformed covariance data.

use log::warn;

use picosplat_core::fixed::{Fx, Fx8, len_sq3};
use picosplat_core::{Aabb, Error, Luts, MAX_SCENE_SPLATS, Result, Splat3D, format};

pub struct SceneStore {
    splats: Vec<Splat3D>,
    bounds: Aabb,
    radius: Fx,
}

impl SceneStore {
    /// Takes ownership of the splat list, symmetrizes and floors each
    /// covariance, and precomputes the world bounds (padded by one unit
    /// so boundary splats never land outside the spatial grid).
    pub fn new(mut splats: Vec<Splat3D>, luts: &Luts) -> Result<SceneStore> {
        if splats.len() > MAX_SCENE_SPLATS {
            return Err(Error::InvalidParameter("scene exceeds the splat capacity"));
        }

        let mut regularized = 0usize;
        for s in &mut splats {
            if regularize(s) {
                regularized += 1;
            }
        }
        if regularized > 0 {
            warn!("regularized the covariance of {regularized} splats at load");
        }

        let mut bounds = Aabb::EMPTY;
        for s in &splats {
            bounds.grow(s.pos);
        }
        let bounds = if bounds.is_valid() {
            bounds.pad(Fx::ONE)
        } else {
            // empty scene still gets a valid unit box
            Aabb {
                min: [-Fx::ONE; 3],
                max: [Fx::ONE; 3],
            }
        };

        let e = bounds.extent();
        let half = [e[0] * Fx::HALF, e[1] * Fx::HALF, e[2] * Fx::HALF];
        let radius = luts.sqrt(len_sq3(half));

        Ok(SceneStore {
            splats,
            bounds,
            radius,
        })
    }

    pub fn from_file(path: &std::path::Path, luts: &Luts) -> Result<SceneStore> {
        SceneStore::new(format::load_file(path)?, luts)
    }

    pub fn splats(&self) -> &[Splat3D] {
        &self.splats
    }

    pub fn len(&self) -> usize {
        self.splats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splats.is_empty()
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Half-diagonal of the padded world bounds.
    pub fn radius(&self) -> Fx {
        self.radius
    }
}

/// Symmetrizes the off-diagonal mantissa pairs and floors the diagonal
/// at one mantissa LSB. Returns true when anything changed.
fn regularize(s: &mut Splat3D) -> bool {
    let mut touched = false;
    for (i, j) in [(1usize, 3usize), (2, 6), (5, 7)] {
        if s.cov_mant[i] != s.cov_mant[j] {
            let avg = ((s.cov_mant[i].0 as i32 + s.cov_mant[j].0 as i32) / 2) as i16;
            s.cov_mant[i] = Fx8(avg);
            s.cov_mant[j] = Fx8(avg);
            touched = true;
        }
    }
    for i in [0usize, 4, 8] {
        if s.cov_mant[i].0 <= 0 {
            s.cov_mant[i] = Fx8(1);
            touched = true;
        }
    }
    touched
}

/// An isotropic splat, mostly for demos and tests.
pub fn splat_at(pos: [f32; 3], variance: f32, color: [u8; 3], opacity: u8) -> Splat3D {
    let (cov_mant, cov_exp) = Splat3D::quantize_covariance([
        variance, 0.0, 0.0, //
        0.0, variance, 0.0, //
        0.0, 0.0, variance,
    ]);
    Splat3D {
        pos: [
            Fx::from_f32(pos[0]),
            Fx::from_f32(pos[1]),
            Fx::from_f32(pos[2]),
        ],
        cov_mant,
        cov_exp,
        color,
        opacity,
    }
}

/// A flat `nx` by `nz` grid of splats in the y=0 plane, centered on the
/// origin.
pub fn plane_grid(nx: usize, nz: usize, spacing: f32, variance: f32) -> Vec<Splat3D> {
    let mut out = Vec::with_capacity(nx * nz);
    let ox = (nx.saturating_sub(1)) as f32 * spacing * 0.5;
    let oz = (nz.saturating_sub(1)) as f32 * spacing * 0.5;
    for iz in 0..nz {
        for ix in 0..nx {
            let shade = (64 + (ix * 191) / nx.max(1)) as u8;
            out.push(splat_at(
                [ix as f32 * spacing - ox, 0.0, iz as f32 * spacing - oz],
                variance,
                [shade, 128, 255 - shade],
                220,
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_scenes() {
        let luts = Luts::new();
        let splats = vec![splat_at([0.0; 3], 0.05, [255, 0, 0], 255); MAX_SCENE_SPLATS + 1];
        assert!(SceneStore::new(splats, &luts).is_err());
    }

    #[test]
    fn empty_scene_is_valid() {
        let luts = Luts::new();
        let scene = SceneStore::new(Vec::new(), &luts).unwrap();
        assert!(scene.is_empty());
        assert!(scene.bounds().is_valid());
        assert!(scene.radius() > Fx::ZERO);
    }

    #[test]
    fn bounds_are_padded_by_one_unit() {
        let luts = Luts::new();
        let splats = vec![
            splat_at([-2.0, 0.0, 0.0], 0.05, [255, 0, 0], 255),
            splat_at([2.0, 1.0, 3.0], 0.05, [0, 255, 0], 255),
        ];
        let scene = SceneStore::new(splats, &luts).unwrap();
        let b = scene.bounds();
        assert_eq!(b.min[0], Fx::from_int(-3));
        assert_eq!(b.max[0], Fx::from_int(3));
        assert_eq!(b.min[1], -Fx::ONE);
        assert_eq!(b.max[2], Fx::from_int(4));
    }

    #[test]
    fn load_regularizes_bad_covariance() {
        let luts = Luts::new();
        let mut s = splat_at([0.0; 3], 0.05, [255, 0, 0], 255);
        s.cov_mant[0] = Fx8(-5);
        s.cov_mant[1] = Fx8(10);
        s.cov_mant[3] = Fx8(6);
        let scene = SceneStore::new(vec![s], &luts).unwrap();
        let fixed = &scene.splats()[0];
        assert!(fixed.cov_mant[0].0 > 0);
        assert_eq!(fixed.cov_mant[1], fixed.cov_mant[3]);
    }

    #[test]
    fn plane_grid_counts_and_extent() {
        let g = plane_grid(8, 8, 1.0, 0.02);
        assert_eq!(g.len(), 64);
        assert_eq!(g[0].pos[0], Fx::from_f32(-3.5));
        assert_eq!(g[63].pos[0], Fx::from_f32(3.5));
        assert_eq!(g[0].pos[1], Fx::ZERO);
    }
}
