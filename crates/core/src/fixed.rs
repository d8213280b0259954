//! Signed fixed-point scalar types and the small matrix/vector kit built
//! on them.
//!
//! [`Fx`] is Q16.16 and is the pervasive scalar of the pipeline; [`Fx8`]
//! is Q8.8 and is used where covariance values are stored densely.
//! Additions and subtractions saturate, multiplications widen to 64 bits
//! before the corrective shift so intermediate products never wrap.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Q16.16 signed fixed-point scalar.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Fx(pub i32);

impl Fx {
    pub const SHIFT: u32 = 16;
    pub const ZERO: Fx = Fx(0);
    pub const ONE: Fx = Fx(1 << 16);
    pub const TWO: Fx = Fx(2 << 16);
    pub const HALF: Fx = Fx(1 << 15);
    pub const MAX: Fx = Fx(i32::MAX);
    pub const MIN: Fx = Fx(i32::MIN);

    /// ~1e-3, the numerical-stability epsilon shared by the projector
    /// and the culler.
    pub const EPSILON: Fx = Fx(65);

    pub const PI: Fx = Fx(205_887);
    pub const TAU: Fx = Fx(411_775);

    #[inline]
    pub const fn from_bits(bits: i32) -> Fx {
        Fx(bits)
    }

    #[inline]
    pub const fn to_bits(self) -> i32 {
        self.0
    }

    #[inline]
    pub const fn from_int(v: i32) -> Fx {
        Fx(v.saturating_mul(1 << 16))
    }

    /// Truncates toward negative infinity.
    #[inline]
    pub const fn to_int(self) -> i32 {
        self.0 >> 16
    }

    #[inline]
    pub fn from_f32(v: f32) -> Fx {
        let scaled = v * 65536.0;
        if scaled >= i32::MAX as f32 {
            Fx::MAX
        } else if scaled <= i32::MIN as f32 {
            Fx::MIN
        } else {
            Fx(scaled as i32)
        }
    }

    #[inline]
    pub fn to_f32(self) -> f32 {
        self.0 as f32 / 65536.0
    }

    #[inline]
    pub const fn abs(self) -> Fx {
        if self.0 == i32::MIN { Fx::MAX } else { Fx(self.0.abs()) }
    }

    #[inline]
    pub fn min(self, other: Fx) -> Fx {
        Fx(self.0.min(other.0))
    }

    #[inline]
    pub fn max(self, other: Fx) -> Fx {
        Fx(self.0.max(other.0))
    }

    #[inline]
    pub fn clamp(self, lo: Fx, hi: Fx) -> Fx {
        Fx(self.0.clamp(lo.0, hi.0))
    }

    /// `self * b + c` with a single widened intermediate.
    #[inline]
    pub fn mad(self, b: Fx, c: Fx) -> Fx {
        let prod = (self.0 as i64 * b.0 as i64) >> 16;
        sat(prod + c.0 as i64)
    }

    /// Exact division through a widened 48.16 dividend. Slow path only;
    /// hot code divides by multiplying with [`crate::Luts::recip`].
    #[inline]
    pub fn div(self, b: Fx) -> Fx {
        if b.0 == 0 {
            return if self.0 < 0 { Fx::MIN } else { Fx::MAX };
        }
        sat(((self.0 as i64) << 16) / b.0 as i64)
    }

    /// Narrows to Q8.8 with saturation.
    #[inline]
    pub fn to_fx8(self) -> Fx8 {
        let v = self.0 >> 8;
        Fx8(v.clamp(i16::MIN as i32, i16::MAX as i32) as i16)
    }
}

#[inline]
fn sat(v: i64) -> Fx {
    Fx(v.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
}

impl Add for Fx {
    type Output = Fx;
    #[inline]
    fn add(self, rhs: Fx) -> Fx {
        Fx(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Fx {
    type Output = Fx;
    #[inline]
    fn sub(self, rhs: Fx) -> Fx {
        Fx(self.0.saturating_sub(rhs.0))
    }
}

impl Mul for Fx {
    type Output = Fx;
    #[inline]
    fn mul(self, rhs: Fx) -> Fx {
        sat((self.0 as i64 * rhs.0 as i64) >> 16)
    }
}

impl Neg for Fx {
    type Output = Fx;
    #[inline]
    fn neg(self) -> Fx {
        Fx(self.0.saturating_neg())
    }
}

impl AddAssign for Fx {
    #[inline]
    fn add_assign(&mut self, rhs: Fx) {
        *self = *self + rhs;
    }
}

impl SubAssign for Fx {
    #[inline]
    fn sub_assign(&mut self, rhs: Fx) {
        *self = *self - rhs;
    }
}

impl fmt::Debug for Fx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}fx", self.to_f32())
    }
}

/// Q8.8 signed fixed-point scalar.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Fx8(pub i16);

impl Fx8 {
    pub const SHIFT: u32 = 8;
    pub const ZERO: Fx8 = Fx8(0);
    pub const ONE: Fx8 = Fx8(1 << 8);
    pub const MAX: Fx8 = Fx8(i16::MAX);
    pub const MIN: Fx8 = Fx8(i16::MIN);

    /// Widens to Q16.16, always exact.
    #[inline]
    pub const fn to_fx(self) -> Fx {
        Fx((self.0 as i32) << 8)
    }

    #[inline]
    pub fn from_f32(v: f32) -> Fx8 {
        Fx::from_f32(v).to_fx8()
    }

    #[inline]
    pub fn to_f32(self) -> f32 {
        self.0 as f32 / 256.0
    }
}

impl fmt::Debug for Fx8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}fx8", self.to_f32())
    }
}

/// Row-major 4x4 Q16.16 matrix.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Mat4(pub [Fx; 16]);

impl Mat4 {
    pub const IDENTITY: Mat4 = {
        let mut m = [Fx::ZERO; 16];
        m[0] = Fx::ONE;
        m[5] = Fx::ONE;
        m[10] = Fx::ONE;
        m[15] = Fx::ONE;
        Mat4(m)
    };

    #[inline]
    pub fn from_f32(rows: [f32; 16]) -> Mat4 {
        let mut m = [Fx::ZERO; 16];
        for (out, v) in m.iter_mut().zip(rows) {
            *out = Fx::from_f32(v);
        }
        Mat4(m)
    }

    /// `self * rhs` with 64-bit row accumulators.
    pub fn mul(&self, rhs: &Mat4) -> Mat4 {
        let mut out = [Fx::ZERO; 16];
        for i in 0..4 {
            for j in 0..4 {
                let mut sum = 0i64;
                for k in 0..4 {
                    sum += self.0[i * 4 + k].0 as i64 * rhs.0[k * 4 + j].0 as i64;
                }
                out[i * 4 + j] = sat(sum >> 16);
            }
        }
        Mat4(out)
    }

    /// `self * v` with 64-bit row accumulators.
    pub fn mul_vec4(&self, v: [Fx; 4]) -> [Fx; 4] {
        let mut out = [Fx::ZERO; 4];
        for i in 0..4 {
            let mut sum = 0i64;
            for j in 0..4 {
                sum += self.0[i * 4 + j].0 as i64 * v[j].0 as i64;
            }
            out[i] = sat(sum >> 16);
        }
        out
    }

    pub fn transpose(&self) -> Mat4 {
        let mut out = [Fx::ZERO; 16];
        for i in 0..4 {
            for j in 0..4 {
                out[j * 4 + i] = self.0[i * 4 + j];
            }
        }
        Mat4(out)
    }

    #[inline]
    pub fn row(&self, i: usize) -> [Fx; 4] {
        [self.0[i * 4], self.0[i * 4 + 1], self.0[i * 4 + 2], self.0[i * 4 + 3]]
    }

    /// True when every element is zero; used to reject an unset camera.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| v.0 == 0)
    }
}

#[inline]
pub fn dot3(a: [Fx; 3], b: [Fx; 3]) -> Fx {
    let sum = a[0].0 as i64 * b[0].0 as i64
        + a[1].0 as i64 * b[1].0 as i64
        + a[2].0 as i64 * b[2].0 as i64;
    sat(sum >> 16)
}

/// Squared length of a 3-vector; take the root through [`crate::Luts::sqrt`].
#[inline]
pub fn len_sq3(v: [Fx; 3]) -> Fx {
    dot3(v, v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_widens_before_shifting() {
        let a = Fx::from_f32(180.0);
        let b = Fx::from_f32(0.25);
        assert_eq!((a * b).to_f32(), 45.0);
    }

    #[test]
    fn mul_saturates_on_overflow() {
        let big = Fx::from_f32(30000.0);
        assert_eq!(big * big, Fx::MAX);
        assert_eq!(big * -big, Fx::MIN);
    }

    #[test]
    fn add_sub_saturate() {
        assert_eq!(Fx::MAX + Fx::ONE, Fx::MAX);
        assert_eq!(Fx::MIN - Fx::ONE, Fx::MIN);
    }

    #[test]
    fn div_matches_float_reference() {
        let a = Fx::from_f32(7.5);
        let b = Fx::from_f32(-2.5);
        assert!((a.div(b).to_f32() + 3.0).abs() < 1e-3);
        assert_eq!(a.div(Fx::ZERO), Fx::MAX);
        assert_eq!((-a).div(Fx::ZERO), Fx::MIN);
    }

    #[test]
    fn fx8_round_trips_through_fx() {
        let v = Fx8::from_f32(-3.25);
        assert_eq!(v.to_fx().to_fx8(), v);
        assert_eq!(v.to_fx().to_f32(), -3.25);
    }

    #[test]
    fn fx8_narrowing_saturates() {
        assert_eq!(Fx::from_f32(200.0).to_fx8(), Fx8::MAX);
        assert_eq!(Fx::from_f32(-200.0).to_fx8(), Fx8::MIN);
    }

    #[test]
    fn mat4_identity_is_neutral() {
        let m = Mat4::from_f32([
            1.0, 2.0, 3.0, 4.0, //
            5.0, 6.0, 7.0, 8.0, //
            9.0, 10.0, 11.0, 12.0, //
            13.0, 14.0, 15.0, 16.0,
        ]);
        assert_eq!(m.mul(&Mat4::IDENTITY), m);
        assert_eq!(Mat4::IDENTITY.mul(&m), m);
        let v = [Fx::ONE, Fx::TWO, Fx::from_int(3), Fx::ONE];
        assert_eq!(Mat4::IDENTITY.mul_vec4(v), v);
    }

    #[test]
    fn mat4_transpose_involution() {
        let m = Mat4::from_f32([
            1.0, 2.0, 3.0, 4.0, //
            5.0, 6.0, 7.0, 8.0, //
            9.0, 10.0, 11.0, 12.0, //
            13.0, 14.0, 15.0, 16.0,
        ]);
        assert_eq!(m.transpose().transpose(), m);
    }

    #[test]
    fn dot3_matches_float_reference() {
        let a = [Fx::from_f32(1.5), Fx::from_f32(-2.0), Fx::from_f32(0.5)];
        let b = [Fx::from_f32(4.0), Fx::from_f32(1.0), Fx::from_f32(-8.0)];
        assert!((dot3(a, b).to_f32() - 0.0).abs() < 1e-3);
    }
}
