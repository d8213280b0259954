//! Lookup tables backing the fixed-point transcendentals and the splat
//! footprints.
//!
//! All tables are generated once at startup (float math is allowed
//! there) and are read-only for the rest of the process. The accessors
//! clamp out-of-domain arguments to the boundary value instead of
//! erroring; hot paths never branch on failure.

use crate::fixed::{Fx, Fx8};

const LUT_SIZE: usize = 256;

/// 3σ cutoff: any Mahalanobis distance past this maps to alpha 0.
const CUTOFF: f64 = 3.0;

/// Reciprocal LUT domain: |d| below this diverges under Newton, so it
/// is served from the table instead.
const RECIP_LUT_DOMAIN: Fx = Fx(655); // 0.01

/// Eigenvalue range covered by the inverse-covariance fast path.
pub const COV_INV_RES: usize = 64;
const COV_MIN_EIGENVALUE: f64 = 1e-6;
const COV_MAX_EIGENVALUE: f64 = 10.0;

/// Footprint atlas: 8 aspect rows x 8 rotation columns of 32x32 cells.
pub const ATLAS_SIZE: usize = 256;
pub const FOOTPRINT_RES: usize = 32;

pub struct Luts {
    exp: [Fx; LUT_SIZE],
    sqrt: [Fx; LUT_SIZE],
    recip: [Fx; LUT_SIZE],
    sin: [Fx; LUT_SIZE],
    cos: [Fx; LUT_SIZE],
    atan2: Box<[Fx]>,
    cov_inv: Box<[[Fx8; 4]]>,
    atlas: Box<[u8]>,
    sh_lighting: Box<[u8]>,
}

impl Luts {
    pub fn new() -> Luts {
        let mut exp = [Fx::ZERO; LUT_SIZE];
        let mut sqrt = [Fx::ZERO; LUT_SIZE];
        let mut recip = [Fx::ZERO; LUT_SIZE];
        let mut sin = [Fx::ZERO; LUT_SIZE];
        let mut cos = [Fx::ZERO; LUT_SIZE];

        for i in 0..LUT_SIZE {
            let m = i as f64 / (LUT_SIZE - 1) as f64 * CUTOFF;
            exp[i] = Fx::from_f32((-0.5 * m * m).exp() as f32);

            sqrt[i] = Fx::from_f32((i as f64 / (LUT_SIZE - 1) as f64).sqrt() as f32);

            // domain (0, 0.01]; index 0 saturates
            let d = (i.max(1) as f64 / (LUT_SIZE - 1) as f64) * 0.01;
            recip[i] = Fx::from_f32((1.0 / d).min(i32::MAX as f64 / 65536.0) as f32);

            // divisor LUT_SIZE so index arithmetic wraps cleanly at 2π
            let angle = i as f64 / LUT_SIZE as f64 * std::f64::consts::TAU;
            sin[i] = Fx::from_f32(angle.sin() as f32);
            cos[i] = Fx::from_f32(angle.cos() as f32);
        }

        Luts {
            exp,
            sqrt,
            recip,
            sin,
            cos,
            atan2: gen_atan2(),
            cov_inv: gen_cov_inv(),
            atlas: gen_atlas(),
            sh_lighting: gen_sh_lighting(),
        }
    }

    /// Reciprocal via Newton iteration, `x <- x * (2 - d*x)`.
    ///
    /// The argument is normalized into [0.5, 1) by power-of-two shifts
    /// to pick the initial guess; four iterations drive the error below
    /// the Q16.16 step. |d| < 0.01 falls back to the table, d == 0
    /// saturates.
    pub fn recip(&self, d: Fx) -> Fx {
        if d.0 == 0 {
            return Fx::MAX;
        }
        let ad = d.abs();
        let r = if ad < RECIP_LUT_DOMAIN {
            let idx = (ad.0 as i64 * (LUT_SIZE - 1) as i64 / RECIP_LUT_DOMAIN.0 as i64)
                .min(LUT_SIZE as i64 - 1) as usize;
            self.recip[idx]
        } else {
            // normalize ad = m * 2^k with m in [0.5, 1], rounding the
            // discarded bits so the seed sees the full argument
            let msb = 31 - ad.0.leading_zeros() as i32;
            let k = msb - 15;
            let m = if k > 0 {
                Fx((((ad.0 as i64) + (1i64 << (k - 1))) >> k) as i32)
            } else {
                Fx(ad.0 << -k)
            };
            // minimax linear seed 48/17 - 32/17 * m
            let mut x = Fx(185_043) - Fx(123_362) * m;
            for _ in 0..4 {
                let dx = m * x;
                x = x * (Fx::TWO - dx);
            }
            shift_signed(x, -k)
        };
        if d.0 < 0 { -r } else { r }
    }

    /// Square root via power-of-four range reduction into [0.25, 1)
    /// and an interpolated table lookup. Negative arguments clamp to 0.
    pub fn sqrt(&self, x: Fx) -> Fx {
        if x.0 <= 0 {
            return Fx::ZERO;
        }
        let mut s = x;
        let mut k = 0i32;
        while s.0 >= Fx::ONE.0 {
            s.0 >>= 2;
            k += 1;
        }
        while s.0 < Fx::ONE.0 >> 2 {
            s.0 <<= 2;
            k -= 1;
        }
        let pos = s.0 as i64 * (LUT_SIZE - 1) as i64;
        let idx = (pos >> 16) as usize;
        let frac = Fx((pos & 0xFFFF) as i32);
        let a = self.sqrt[idx];
        let b = self.sqrt[(idx + 1).min(LUT_SIZE - 1)];
        shift_signed(a + (b - a) * frac, k)
    }

    pub fn sin(&self, angle: Fx) -> Fx {
        self.circular(&self.sin, angle)
    }

    pub fn cos(&self, angle: Fx) -> Fx {
        self.circular(&self.cos, angle)
    }

    fn circular(&self, table: &[Fx; LUT_SIZE], angle: Fx) -> Fx {
        let wrapped = angle.0.rem_euclid(Fx::TAU.0);
        let pos = wrapped as i64 * LUT_SIZE as i64;
        let idx = (pos / Fx::TAU.0 as i64) as usize % LUT_SIZE;
        let frac = Fx(((pos % Fx::TAU.0 as i64) * 65536 / Fx::TAU.0 as i64) as i32);
        let a = table[idx];
        let b = table[(idx + 1) % LUT_SIZE];
        a + (b - a) * frac
    }

    /// Angle of (x, y) in [-π, π], quantized to the 256x256 table.
    /// (0, 0) maps to 0.
    pub fn atan2(&self, y: Fx, x: Fx) -> Fx {
        let max = x.abs().max(y.abs());
        if max.0 == 0 {
            return Fx::ZERO;
        }
        let nx = x.div(max);
        let ny = y.div(max);
        let ix = grid_index(nx);
        let iy = grid_index(ny);
        self.atan2[iy * LUT_SIZE + ix]
    }

    /// Gaussian falloff `exp(-m²/2)` for a Mahalanobis distance `m`,
    /// zero past the 3σ cutoff.
    pub fn exp_falloff(&self, m: Fx) -> Fx {
        if m.0 <= 0 {
            return Fx::ONE;
        }
        if m >= Fx::from_int(3) {
            return Fx::ZERO;
        }
        let pos = m.0 as i64 * (LUT_SIZE - 1) as i64 / 3;
        let idx = (pos >> 16) as usize;
        let frac = Fx((pos & 0xFFFF) as i32);
        let a = self.exp[idx];
        let b = self.exp[(idx + 1).min(LUT_SIZE - 1)];
        a + (b - a) * frac
    }

    /// Falloff addressed by squared Mahalanobis distance, as produced
    /// by the inverse-covariance form.
    pub fn exp_falloff_sq(&self, m_sq: Fx) -> Fx {
        if m_sq >= Fx::from_int(9) {
            return Fx::ZERO;
        }
        self.exp_falloff(self.sqrt(m_sq))
    }

    /// Fast-path 2x2 inverse for a near-diagonal covariance, keyed on
    /// log-spaced eigenvalues. Row-major [a, b, c, d] in Q8.8.
    pub fn cov_inv(&self, lambda1: Fx, lambda2: Fx) -> [Fx8; 4] {
        let ix = cov_index(lambda1);
        let iy = cov_index(lambda2);
        self.cov_inv[iy * COV_INV_RES + ix]
    }

    /// Alpha sample from the footprint atlas. Coordinates are the
    /// atlas texel grid, clamped.
    #[inline]
    pub fn atlas_sample(&self, u: u8, v: u8) -> u8 {
        self.atlas[v as usize * ATLAS_SIZE + u as usize]
    }

    pub fn atlas(&self) -> &[u8] {
        &self.atlas
    }

    /// Lighting multiplier (0..=255) for a direction given as azimuth
    /// and elevation indices into the 256x256 table.
    #[inline]
    pub fn sh_lighting(&self, azimuth: u8, elevation: u8) -> u8 {
        self.sh_lighting[elevation as usize * 256 + azimuth as usize]
    }
}

impl Default for Luts {
    fn default() -> Luts {
        Luts::new()
    }
}

/// Left shift for positive `k` (saturating), rounding right shift for
/// negative.
#[inline]
fn shift_signed(v: Fx, k: i32) -> Fx {
    if k >= 0 {
        if k >= 31 {
            return if v.0 < 0 { Fx::MIN } else { Fx::MAX };
        }
        let wide = (v.0 as i64) << k;
        Fx(wide.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
    } else {
        let s = (-k).min(31) as u32;
        Fx(((v.0 as i64 + (1i64 << s >> 1)) >> s) as i32)
    }
}

/// Maps a [-1, 1] coordinate to a 0..=255 table index.
#[inline]
fn grid_index(v: Fx) -> usize {
    let pos = (v.0 as i64 + Fx::ONE.0 as i64) * (LUT_SIZE - 1) as i64 / (2 * Fx::ONE.0 as i64);
    pos.clamp(0, LUT_SIZE as i64 - 1) as usize
}

/// Log-spaced eigenvalue key over [1e-6, 10].
fn cov_index(lambda: Fx) -> usize {
    let v = (lambda.to_f32() as f64).clamp(COV_MIN_EIGENVALUE, COV_MAX_EIGENVALUE);
    let t = (v / COV_MIN_EIGENVALUE).ln() / (COV_MAX_EIGENVALUE / COV_MIN_EIGENVALUE).ln();
    ((t * (COV_INV_RES - 1) as f64) as usize).min(COV_INV_RES - 1)
}

fn gen_atan2() -> Box<[Fx]> {
    let mut table = vec![Fx::ZERO; LUT_SIZE * LUT_SIZE].into_boxed_slice();
    for y in 0..LUT_SIZE {
        for x in 0..LUT_SIZE {
            let fx = x as f64 / (LUT_SIZE - 1) as f64 * 2.0 - 1.0;
            let fy = y as f64 / (LUT_SIZE - 1) as f64 * 2.0 - 1.0;
            table[y * LUT_SIZE + x] = Fx::from_f32(fy.atan2(fx) as f32);
        }
    }
    table
}

fn gen_cov_inv() -> Box<[[Fx8; 4]]> {
    let mut table = vec![[Fx8::ZERO; 4]; COV_INV_RES * COV_INV_RES].into_boxed_slice();
    let ratio = COV_MAX_EIGENVALUE / COV_MIN_EIGENVALUE;
    for y in 0..COV_INV_RES {
        for x in 0..COV_INV_RES {
            let l1 = COV_MIN_EIGENVALUE * ratio.powf(x as f64 / (COV_INV_RES - 1) as f64);
            let l2 = COV_MIN_EIGENVALUE * ratio.powf(y as f64 / (COV_INV_RES - 1) as f64);
            table[y * COV_INV_RES + x] = [
                Fx8::from_f32((1.0 / l1) as f32),
                Fx8::ZERO,
                Fx8::ZERO,
                Fx8::from_f32((1.0 / l2) as f32),
            ];
        }
    }
    table
}

fn gen_atlas() -> Box<[u8]> {
    let mut atlas = vec![0u8; ATLAS_SIZE * ATLAS_SIZE].into_boxed_slice();
    for row in 0..8 {
        // log-spaced aspect ratios, 1:1 through 8:1
        let aspect = 8f64.powf(row as f64 / 7.0);
        for col in 0..8 {
            // 22.5 degree rotation steps
            let theta = col as f64 * std::f64::consts::PI / 8.0;
            let (sin_t, cos_t) = theta.sin_cos();
            for py in 0..FOOTPRINT_RES {
                for px in 0..FOOTPRINT_RES {
                    let nx = px as f64 / (FOOTPRINT_RES - 1) as f64 * 2.0 - 1.0;
                    let ny = py as f64 / (FOOTPRINT_RES - 1) as f64 * 2.0 - 1.0;
                    let rx = nx * cos_t - ny * sin_t;
                    let ry = nx * sin_t + ny * cos_t;
                    // the cell spans 3σ along the major axis
                    let sx = rx * CUTOFF * aspect.sqrt();
                    let sy = ry * CUTOFF / aspect.sqrt();
                    let dist_sq = sx * sx + sy * sy;
                    let alpha = if dist_sq > CUTOFF * CUTOFF {
                        0.0
                    } else {
                        (-0.5 * dist_sq).exp()
                    };
                    let ax = col * FOOTPRINT_RES + px;
                    let ay = row * FOOTPRINT_RES + py;
                    atlas[ay * ATLAS_SIZE + ax] = (alpha * 255.0) as u8;
                }
            }
        }
    }
    atlas
}

fn gen_sh_lighting() -> Box<[u8]> {
    // ambient + one diagonal directional light
    const AMBIENT: f64 = 0.3;
    const DIRECTIONAL: f64 = 0.7;
    const LIGHT_DIR: [f64; 3] = [0.577, 0.577, 0.577];

    let mut table = vec![0u8; 256 * 256].into_boxed_slice();
    for y in 0..256 {
        for x in 0..256 {
            let theta = x as f64 / 255.0 * std::f64::consts::TAU;
            let phi = y as f64 / 255.0 * std::f64::consts::PI;
            let dir = [phi.sin() * theta.cos(), phi.sin() * theta.sin(), phi.cos()];
            let ndotl = (dir[0] * LIGHT_DIR[0] + dir[1] * LIGHT_DIR[1] + dir[2] * LIGHT_DIR[2])
                .max(0.0);
            let lighting = (AMBIENT + DIRECTIONAL * ndotl).clamp(0.0, 1.0);
            table[y * 256 + x] = (lighting * 255.0) as u8;
        }
    }
    table
}
