//! Pure-scalar projection of 3D splats to screen space.
//!
//! This is the reference implementation of the [`Projector`] trait: the
//! submit/wait protocol is kept so the driver's double buffering works
//! unchanged against an actually asynchronous implementation, but the
//! work happens synchronously inside `submit`.

use log::warn;

use picosplat_core::fixed::{Fx, Fx8, Mat4, dot3};
use picosplat_core::{
    BATCH_SIZE, BatchStats, Camera, Error, Luts, Projector, Result, Splat2D, Splat3D,
};

/// Regularization added to covariance diagonals before eigen and
/// inverse computation.
const REG_EPSILON: Fx = Fx::EPSILON;

/// Jacobian element clamp against grazing incidence.
const JAC_LIMIT: Fx = Fx(1000 << 16);

#[derive(Default)]
pub struct ScalarProjector {
    staged: Vec<Splat2D>,
    stats: BatchStats,
    busy: bool,
}

impl ScalarProjector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Projector for ScalarProjector {
    fn submit(&mut self, batch: &[Splat3D], camera: &Camera, luts: &Luts) -> Result<()> {
        if self.busy {
            return Err(Error::InvalidParameter("projection batch already in flight"));
        }
        if batch.len() > BATCH_SIZE {
            return Err(Error::InvalidParameter("batch exceeds projector window"));
        }

        self.staged.clear();
        for splat in batch {
            if let Some(p) = project_one(splat, camera, luts) {
                self.staged.push(p);
            }
        }
        self.stats = BatchStats {
            submitted: batch.len(),
            projected: self.staged.len(),
        };
        self.busy = true;
        Ok(())
    }

    fn wait(&mut self, out: &mut Vec<Splat2D>) -> Result<BatchStats> {
        if !self.busy {
            return Ok(BatchStats::default());
        }
        self.busy = false;
        let stats = self.stats;
        if stats.submitted > 0 && stats.dropped() * 2 > stats.submitted {
            warn!(
                "projection batch dropped {}/{} splats",
                stats.dropped(),
                stats.submitted
            );
        }
        out.append(&mut self.staged);
        Ok(stats)
    }

    fn busy(&self) -> bool {
        self.busy
    }
}

/// Projects a single splat. `None` means the splat is skipped this
/// frame: behind the near plane, outside NDC, or numerically
/// unrecoverable.
pub fn project_one(splat: &Splat3D, camera: &Camera, luts: &Luts) -> Option<Splat2D> {
    // camera space
    let p = camera
        .view
        .mul_vec4([splat.pos[0], splat.pos[1], splat.pos[2], Fx::ONE]);
    if p[2] <= Fx::EPSILON {
        return None;
    }

    // clip space and perspective divide
    let clip = camera.proj.mul_vec4([p[0], p[1], p[2], p[3]]);
    if clip[3].abs() < Fx::EPSILON {
        return None;
    }
    let inv_w = luts.recip(clip[3]);
    let ndc = [clip[0] * inv_w, clip[1] * inv_w];
    if ndc[0] < -Fx::ONE || ndc[0] > Fx::ONE || ndc[1] < -Fx::ONE || ndc[1] > Fx::ONE {
        return None;
    }

    // viewport transform, y down
    let [vx, vy, vw, vh] = camera.viewport;
    let screen_pos = [
        ((ndc[0] + Fx::ONE) * Fx::HALF).mad(vw, vx),
        ((Fx::ONE - ndc[1]) * Fx::HALF).mad(vh, vy),
    ];

    let jac = jacobian([p[0], p[1], p[2]], &camera.proj, camera.viewport, luts);
    let cov_2d = project_covariance(&splat.covariance(), &jac);
    let (eigenvalues, eigenvectors) = eigen_2x2(&cov_2d, luts);
    let radius = Fx::from_int(3) * luts.sqrt(eigenvalues[0]);
    let inv_cov_2d = invert_2x2(&cov_2d, luts);
    let (atlas_u, atlas_v) = atlas_uv(&eigenvalues, &eigenvectors, luts);

    let light = lighting(splat, camera, luts);
    let color = [
        shade(splat.color[0], light),
        shade(splat.color[1], light),
        shade(splat.color[2], light),
        splat.opacity,
    ];

    Some(Splat2D {
        screen_pos,
        depth: p[2],
        radius,
        cov_2d,
        inv_cov_2d,
        eigenvalues,
        eigenvectors,
        atlas_u,
        atlas_v,
        color,
    })
}

/// Screen-space Jacobian of the projection at a camera-space point,
/// row-major 2x3 in pixels per world unit.
///
/// Derivative of `u/s` with the homogeneous `w/s` scale factor kept so
/// off-axis projections stay correct; each NDC element is clamped, then
/// the viewport half-extents fold the NDC derivative into pixels.
fn jacobian(p: [Fx; 3], proj: &Mat4, viewport: [Fx; 4], luts: &Luts) -> [Fx; 6] {
    let px = proj.row(0);
    let py = proj.row(1);
    let pw = proj.row(3);

    let hp = [p[0], p[1], p[2], Fx::ONE];
    let row_dot = |row: [Fx; 4]| -> Fx {
        let mut sum = 0i64;
        for i in 0..4 {
            sum += row[i].0 as i64 * hp[i].0 as i64;
        }
        Fx((sum >> 16).clamp(i32::MIN as i64, i32::MAX as i64) as i32)
    };
    let u = row_dot(px);
    let v = row_dot(py);
    let s = row_dot(pw);
    if s.abs() < Fx::EPSILON {
        return [Fx::ZERO; 6];
    }

    let inv_s = luts.recip(s);
    let inv_s_sq = inv_s * inv_s;
    let w_scale = inv_s; // homogeneous w = 1

    let half_w = viewport[2] * Fx::HALF;
    let half_h = viewport[3] * Fx::HALF;

    let mut jac = [Fx::ZERO; 6];
    for k in 0..3 {
        let du = (px[k] * s - u * pw[k]) * inv_s_sq * w_scale;
        let dv = (py[k] * s - v * pw[k]) * inv_s_sq * w_scale;
        jac[k] = du.clamp(-JAC_LIMIT, JAC_LIMIT) * half_w;
        jac[3 + k] = dv.clamp(-JAC_LIMIT, JAC_LIMIT) * half_h;
    }
    jac
}

/// `S2 = J * S3 * J^T` with 64-bit accumulators, narrowed to Q8.8 with
/// saturation.
fn project_covariance(cov3d: &[Fx; 9], jac: &[Fx; 6]) -> [Fx8; 4] {
    // J * S3 (2x3)
    let mut tmp = [0i64; 6];
    for i in 0..2 {
        for j in 0..3 {
            let mut sum = 0i64;
            for k in 0..3 {
                sum += jac[i * 3 + k].0 as i64 * cov3d[k * 3 + j].0 as i64;
            }
            tmp[i * 3 + j] = sum >> 16;
        }
    }
    // tmp * J^T (2x2), then Q16.16 -> Q8.8
    let mut out = [Fx8::ZERO; 4];
    for i in 0..2 {
        for j in 0..2 {
            let mut sum = 0i64;
            for k in 0..3 {
                sum += tmp[i * 3 + k] * jac[j * 3 + k].0 as i64;
            }
            let q8 = sum >> 16 >> 8;
            out[i * 2 + j] = Fx8(q8.clamp(i16::MIN as i64, i16::MAX as i64) as i16);
        }
    }
    out
}

/// Closed-form 2x2 symmetric eigen-decomposition. Returns eigenvalues
/// ordered `l1 >= l2 >= 0` and the eigenvector rotation (first column
/// is the major axis).
fn eigen_2x2(cov: &[Fx8; 4], luts: &Luts) -> ([Fx; 2], [Fx; 4]) {
    let a = cov[0].to_fx() + REG_EPSILON;
    let b = cov[1].to_fx();
    let c = cov[2].to_fx();
    let d = cov[3].to_fx() + REG_EPSILON;

    let trace = a + d;
    let det = a * d - b * c;
    let disc = trace * trace - Fx::from_int(4) * det;

    const IDENTITY: [Fx; 4] = [Fx::ONE, Fx::ZERO, Fx::ZERO, Fx::ONE];

    if disc < Fx::ZERO {
        // complex pair cannot happen for a symmetric matrix short of
        // quantization noise; collapse to the isotropic case
        let l = (trace * Fx::HALF).max(Fx::ZERO);
        return ([l, l], IDENTITY);
    }

    let sqrt_disc = luts.sqrt(disc);
    let l1 = ((trace + sqrt_disc) * Fx::HALF).max(Fx::ZERO);
    let l2 = ((trace - sqrt_disc) * Fx::HALF).max(Fx::ZERO);

    let vecs = if b.abs() > Fx::EPSILON {
        let vx = l1 - d;
        let vy = b;
        let len = luts.sqrt(vx * vx + vy * vy);
        if len > Fx::EPSILON {
            let inv = luts.recip(len);
            let e0 = vx * inv;
            let e1 = vy * inv;
            [e0, -e1, e1, e0]
        } else {
            IDENTITY
        }
    } else {
        IDENTITY
    };

    ([l1, l2], vecs)
}

/// 2x2 inverse with the same regularization; diagonal matrices take the
/// log-spaced LUT fast path (the diagonal entries are the eigenvalues).
fn invert_2x2(cov: &[Fx8; 4], luts: &Luts) -> [Fx8; 4] {
    let a = cov[0].to_fx() + REG_EPSILON;
    let b = cov[1].to_fx();
    let c = cov[2].to_fx();
    let d = cov[3].to_fx() + REG_EPSILON;

    if b.0 == 0 && c.0 == 0 {
        return luts.cov_inv(a, d);
    }

    let det = a * d - b * c;
    if det.abs() < Fx::EPSILON {
        return [Fx8::ONE, Fx8::ZERO, Fx8::ZERO, Fx8::ONE];
    }
    let inv_det = luts.recip(det);
    [
        (d * inv_det).to_fx8(),
        (-b * inv_det).to_fx8(),
        (-c * inv_det).to_fx8(),
        (a * inv_det).to_fx8(),
    ]
}

/// Footprint atlas cell for an eigen pair: aspect picks the row
/// (log2-spaced 1:1 .. 8:1), major-axis angle picks the column (22.5
/// degree steps). Returns the cell center texel.
fn atlas_uv(eigenvalues: &[Fx; 2], eigenvectors: &[Fx; 4], luts: &Luts) -> (u8, u8) {
    if eigenvalues[1] <= Fx::EPSILON {
        return (16, 16);
    }
    let aspect = (eigenvalues[0] * luts.recip(eigenvalues[1])).max(Fx::ONE);
    let row = aspect_bin(aspect);

    let mut angle = luts.atan2(eigenvectors[2], eigenvectors[0]);
    if angle < Fx::ZERO {
        angle += Fx::TAU;
    }
    let col = ((angle.0 as i64 * 8 / Fx::TAU.0 as i64) as i32).clamp(0, 7) as u8;

    (col * 32 + 16, row * 32 + 16)
}

/// Maps an aspect ratio >= 1 into one of 8 log2-spaced bins covering
/// 1..8.
fn aspect_bin(aspect: Fx) -> u8 {
    if aspect <= Fx::ONE {
        return 0;
    }
    let msb = 31 - aspect.0.leading_zeros() as i32;
    let int_log = msb - 16;
    // piecewise-linear fractional log2, enough for an 8-way bin pick
    let frac = Fx(((aspect.0 as i64 >> (msb - 16)) - 65536) as i32);
    let log2 = Fx::from_int(int_log) + frac;
    ((log2.0 as i64 * 7 / (3 * 65536)) as i32).clamp(0, 7) as u8
}

/// Static diffuse lighting: ambient + one directional light, read from
/// the precomputed direction table using the camera-to-splat direction.
fn lighting(splat: &Splat3D, camera: &Camera, luts: &Luts) -> u8 {
    let dir = [
        splat.pos[0] - camera.position[0],
        splat.pos[1] - camera.position[1],
        splat.pos[2] - camera.position[2],
    ];
    let planar = luts.sqrt(dot3([dir[0], dir[1], Fx::ZERO], [dir[0], dir[1], Fx::ZERO]));
    if planar.0 == 0 && dir[2].0 == 0 {
        return 255;
    }
    let mut azimuth = luts.atan2(dir[1], dir[0]);
    if azimuth < Fx::ZERO {
        azimuth += Fx::TAU;
    }
    let elevation = luts.atan2(planar, dir[2]); // [0, pi]
    let u = (azimuth.0 as i64 * 255 / Fx::TAU.0 as i64).clamp(0, 255) as u8;
    let v = (elevation.0 as i64 * 255 / Fx::PI.0 as i64).clamp(0, 255) as u8;
    luts.sh_lighting(u, v)
}

#[inline]
fn shade(c: u8, light: u8) -> u8 {
    ((c as u32 * light as u32 + 127) / 255) as u8
}
