use crate::error::{Error, Result};
use crate::fixed::{Fx, Mat4, dot3};
use crate::lut::Luts;

/// Position threshold for temporal-coherence invalidation, 0.1 units.
const MOVE_THRESHOLD: Fx = Fx(6554);
/// Rotation threshold, 5 degrees in radians.
const ROT_THRESHOLD: Fx = Fx(5720);

/// Camera state for one frame: view/projection matrices in Q16.16, the
/// pixel viewport, and the decomposed pose used for temporal-coherence
/// checks.
///
/// The view convention puts visible points at positive camera-space z.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: [Fx; 3],
    /// World-from-camera rotation, quaternion (x, y, z, w).
    pub rotation: [Fx; 4],
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    /// (x, y, width, height) in pixels.
    pub viewport: [Fx; 4],
}

impl Camera {
    /// Validates and assembles a camera from raw matrices, as handed in
    /// by the controller once per frame.
    pub fn new(view: Mat4, proj: Mat4, viewport: [u32; 4]) -> Result<Camera> {
        if basis_det(&view).abs() < Fx::EPSILON {
            return Err(Error::InvalidParameter("view basis is singular"));
        }
        if proj.is_zero() || proj.row(3).iter().all(|v| v.0 == 0) {
            return Err(Error::InvalidParameter("projection matrix is singular"));
        }
        if viewport[2] == 0 || viewport[3] == 0 {
            return Err(Error::InvalidParameter("viewport is empty"));
        }

        // camera position is -R^T * t from the view matrix
        let t = [view.0[3], view.0[7], view.0[11]];
        let mut position = [Fx::ZERO; 3];
        for i in 0..3 {
            let col = [view.0[i], view.0[4 + i], view.0[8 + i]];
            position[i] = -dot3(col, t);
        }

        Ok(Camera {
            position,
            rotation: quat_from_view(&view),
            view,
            proj,
            view_proj: proj.mul(&view),
            viewport: [
                Fx::from_int(viewport[0] as i32),
                Fx::from_int(viewport[1] as i32),
                Fx::from_int(viewport[2] as i32),
                Fx::from_int(viewport[3] as i32),
            ],
        })
    }

    /// True when the pose differs from `prev` by more than 0.1 units or
    /// 5 degrees; the binner uses this to force a full re-sort.
    pub fn moved_significantly(&self, prev: &Camera, luts: &Luts) -> bool {
        let d = [
            self.position[0] - prev.position[0],
            self.position[1] - prev.position[1],
            self.position[2] - prev.position[2],
        ];
        if dot3(d, d) > MOVE_THRESHOLD * MOVE_THRESHOLD {
            return true;
        }

        let mut dot = Fx::ZERO;
        for i in 0..4 {
            dot += self.rotation[i] * prev.rotation[i];
        }
        let abs_dot = dot.abs();
        if abs_dot >= Fx::ONE {
            return false;
        }
        // small-angle acos(x) ~ sqrt(2 * (1 - x)); angle = 2 * acos
        let angle = luts.sqrt(Fx::TWO * (Fx::ONE - abs_dot)) * Fx::TWO;
        angle > ROT_THRESHOLD
    }

    /// Standard symmetric perspective matrix, +z forward. Float math;
    /// init-time and test helper only.
    pub fn perspective(fov_y_deg: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let f = 1.0 / (fov_y_deg.to_radians() * 0.5).tan();
        Mat4::from_f32([
            f / aspect, 0.0, 0.0, 0.0, //
            0.0, f, 0.0, 0.0, //
            0.0, 0.0, far / (far - near), -near * far / (far - near), //
            0.0, 0.0, 1.0, 0.0,
        ])
    }

    /// View matrix looking from `eye` toward `target`, +z forward.
    /// Float math; init-time and test helper only.
    pub fn look_at(eye: [f32; 3], target: [f32; 3], up: [f32; 3]) -> Mat4 {
        let f = normalize([
            target[0] - eye[0],
            target[1] - eye[1],
            target[2] - eye[2],
        ]);
        let r = normalize(cross(up, f));
        let u = cross(f, r);
        Mat4::from_f32([
            r[0], r[1], r[2], -fdot(r, eye), //
            u[0], u[1], u[2], -fdot(u, eye), //
            f[0], f[1], f[2], -fdot(f, eye), //
            0.0, 0.0, 0.0, 1.0,
        ])
    }
}

/// Determinant of the view's upper-left 3x3 basis with widened
/// intermediates. Near zero means the basis is rank deficient.
fn basis_det(view: &Mat4) -> Fx {
    let e = |r: usize, c: usize| view.0[r * 4 + c].0 as i64;
    let cof = |c1: usize, c2: usize| (e(1, c1) * e(2, c2) - e(1, c2) * e(2, c1)) >> 16;
    let det = (e(0, 0) * cof(1, 2) - e(0, 1) * cof(0, 2) + e(0, 2) * cof(0, 1)) >> 16;
    Fx(det.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
}

/// Shepperd's method on the transposed (world-from-camera) basis.
fn quat_from_view(view: &Mat4) -> [Fx; 4] {
    // world-from-camera rotation is the transpose of the view basis
    let m = |r: usize, c: usize| view.0[c * 4 + r].to_f32();
    let trace = m(0, 0) + m(1, 1) + m(2, 2);
    let (x, y, z, w);
    if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        w = 0.25 * s;
        x = (m(2, 1) - m(1, 2)) / s;
        y = (m(0, 2) - m(2, 0)) / s;
        z = (m(1, 0) - m(0, 1)) / s;
    } else if m(0, 0) > m(1, 1) && m(0, 0) > m(2, 2) {
        let s = (1.0 + m(0, 0) - m(1, 1) - m(2, 2)).sqrt() * 2.0;
        w = (m(2, 1) - m(1, 2)) / s;
        x = 0.25 * s;
        y = (m(0, 1) + m(1, 0)) / s;
        z = (m(0, 2) + m(2, 0)) / s;
    } else if m(1, 1) > m(2, 2) {
        let s = (1.0 + m(1, 1) - m(0, 0) - m(2, 2)).sqrt() * 2.0;
        w = (m(0, 2) - m(2, 0)) / s;
        x = (m(0, 1) + m(1, 0)) / s;
        y = 0.25 * s;
        z = (m(1, 2) + m(2, 1)) / s;
    } else {
        let s = (1.0 + m(2, 2) - m(0, 0) - m(1, 1)).sqrt() * 2.0;
        w = (m(1, 0) - m(0, 1)) / s;
        x = (m(0, 2) + m(2, 0)) / s;
        y = (m(1, 2) + m(2, 1)) / s;
        z = 0.25 * s;
    }
    [
        Fx::from_f32(x),
        Fx::from_f32(y),
        Fx::from_f32(z),
        Fx::from_f32(w),
    ]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn fdot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = fdot(v, v).sqrt();
    if len < 1e-12 {
        return [0.0, 0.0, 1.0];
    }
    [v[0] / len, v[1] / len, v[2] / len]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_camera(eye: [f32; 3]) -> Camera {
        let view = Camera::look_at(eye, [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        let proj = Camera::perspective(60.0, 640.0 / 448.0, 0.1, 100.0);
        Camera::new(view, proj, [0, 0, 640, 448]).unwrap()
    }

    #[test]
    fn rejects_degenerate_inputs() {
        let proj = Camera::perspective(60.0, 1.0, 0.1, 100.0);
        assert!(Camera::new(Mat4(Default::default()), proj, [0, 0, 640, 448]).is_err());
        let view = Camera::look_at([0.0, 0.0, 5.0], [0.0; 3], [0.0, 1.0, 0.0]);
        assert!(Camera::new(view, Mat4(Default::default()), [0, 0, 640, 448]).is_err());
        assert!(Camera::new(view, proj, [0, 0, 0, 448]).is_err());
    }

    #[test]
    fn rejects_rank_deficient_view() {
        let proj = Camera::perspective(60.0, 1.0, 0.1, 100.0);
        let mut view = Camera::look_at([0.0, 0.0, 5.0], [0.0; 3], [0.0, 1.0, 0.0]);
        // duplicate basis row: nonzero but singular
        for c in 0..4 {
            view.0[4 + c] = view.0[c];
        }
        assert!(Camera::new(view, proj, [0, 0, 640, 448]).is_err());
    }

    #[test]
    fn recovers_eye_position() {
        let cam = test_camera([1.0, 2.0, 5.0]);
        assert!((cam.position[0].to_f32() - 1.0).abs() < 0.01);
        assert!((cam.position[1].to_f32() - 2.0).abs() < 0.01);
        assert!((cam.position[2].to_f32() - 5.0).abs() < 0.01);
    }

    #[test]
    fn view_puts_target_at_positive_z() {
        let cam = test_camera([0.0, 0.0, 5.0]);
        let p = cam.view.mul_vec4([Fx::ZERO, Fx::ZERO, Fx::ZERO, Fx::ONE]);
        assert!((p[2].to_f32() - 5.0).abs() < 0.01);
        assert!(p[0].abs() < Fx::EPSILON + Fx::EPSILON);
        assert!(p[1].abs() < Fx::EPSILON + Fx::EPSILON);
    }

    #[test]
    fn movement_thresholds() {
        let luts = Luts::new();
        let a = test_camera([0.0, 0.0, 5.0]);
        let nudged = test_camera([0.05, 0.0, 5.0]);
        let moved = test_camera([1.0, 0.0, 5.0]);
        assert!(!a.moved_significantly(&a, &luts));
        assert!(!nudged.moved_significantly(&a, &luts));
        assert!(moved.moved_significantly(&a, &luts));

        // ~11 degree orbit at constant distance trips the rotation check
        let orbit = test_camera([1.0, 0.0, 4.9]);
        assert!(orbit.moved_significantly(&a, &luts));
    }
}
