use crate::fixed::{Fx, Fx8};

/// A 3D Gaussian as stored in the scene: mean position, block-exponent
/// covariance, diffuse color and opacity.
///
/// The covariance is 9 Q8.8 mantissas sharing a 4-bit exponent;
/// reconstructed value = mantissa * 2^(exp - 7). Only 6 entries are
/// independent (the matrix is symmetric) but the full 3x3 layout is
/// kept for straight-line batch loads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Splat3D {
    pub pos: [Fx; 3],
    pub cov_mant: [Fx8; 9],
    pub cov_exp: u8,
    pub color: [u8; 3],
    pub opacity: u8,
}

impl Splat3D {
    /// Dequantizes the covariance to Q16.16, row-major.
    pub fn covariance(&self) -> [Fx; 9] {
        let mut out = [Fx::ZERO; 9];
        let shift = self.cov_exp.min(15) as i32 - 7;
        for (out, mant) in out.iter_mut().zip(self.cov_mant) {
            let wide = mant.to_fx().0 as i64;
            let scaled = if shift >= 0 { wide << shift } else { wide >> -shift };
            *out = Fx(scaled.clamp(i32::MIN as i64, i32::MAX as i64) as i32);
        }
        out
    }

    /// Conservative bounding-sphere radius, `3 * sqrt(max diagonal)`
    /// with the sqrt taken by the caller's LUT. Returns the max
    /// diagonal entry; callers apply `3 * sqrt`.
    pub fn max_cov_diag(&self) -> Fx {
        let c = self.covariance();
        c[0].max(c[4]).max(c[8]).max(Fx::ZERO)
    }

    /// Quantizes an f32 covariance into the block-exponent layout.
    /// Init-time and test helper; the renderer never touches floats.
    pub fn quantize_covariance(cov: [f32; 9]) -> ([Fx8; 9], u8) {
        let max_abs = cov.iter().fold(0f32, |m, v| m.max(v.abs()));
        // pick the smallest exponent whose scale covers max_abs at
        // Q8.8 mantissa range (<128)
        let mut exp = 7i32;
        while exp < 15 && max_abs > 127.0 * 2f32.powi(exp - 7) {
            exp += 1;
        }
        while exp > 0 && max_abs <= 127.0 * 2f32.powi(exp - 8) {
            exp -= 1;
        }
        let scale = 2f32.powi(exp - 7);
        let mut mant = [Fx8::ZERO; 9];
        for (out, v) in mant.iter_mut().zip(cov) {
            *out = Fx8::from_f32(v / scale);
        }
        (mant, exp as u8)
    }
}

/// A projected splat, valid for one frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct Splat2D {
    /// Pixel-space center.
    pub screen_pos: [Fx; 2],
    /// Camera-space z, the sort key.
    pub depth: Fx,
    /// 3 * sqrt(lambda_max) in pixels.
    pub radius: Fx,
    /// Row-major 2x2 screen covariance.
    pub cov_2d: [Fx8; 4],
    /// Row-major 2x2 inverse covariance for the procedural footprint.
    pub inv_cov_2d: [Fx8; 4],
    /// lambda1 >= lambda2 >= 0.
    pub eigenvalues: [Fx; 2],
    /// Columns [major, minor]; stored row-major as a rotation.
    pub eigenvectors: [Fx; 4],
    /// Footprint atlas cell center.
    pub atlas_u: u8,
    pub atlas_v: u8,
    /// RGB + opacity as alpha.
    pub color: [u8; 4],
}
