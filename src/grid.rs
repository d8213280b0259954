//! Spatial grid and frustum culling.
//!
//! The scene is bucketed once into an 8x8x8 grid over its padded world
//! bounds. Each frame the culler extracts six planes from the combined
//! view-projection matrix, rejects whole cells with a positive-vertex
//! AABB test, then sphere-tests the survivors per splat. A 3-bit
//! visibility history keeps recently visible splats alive for a few
//! frames so cell-boundary flicker cannot appear during slow pans.

use log::{debug, warn};

use picosplat_core::fixed::{Fx, Mat4, dot3, len_sq3};
use picosplat_core::{Aabb, BATCH_SIZE, Camera, Luts, Splat3D};

pub const GRID_DIM: usize = 8;
pub const GRID_CELLS: usize = GRID_DIM * GRID_DIM * GRID_DIM;
/// Per-cell index capacity; assignments beyond it are dropped.
pub const MAX_SPLATS_PER_CELL: usize = 512;

struct Cell {
    bounds: Aabb,
    splats: Vec<u32>,
}

pub struct SpatialGrid {
    cells: Vec<Cell>,
    truncated: usize,
}

impl SpatialGrid {
    /// Buckets every splat into the cell containing its centroid.
    /// `world` must be the scene's padded bounds; centroids are clamped
    /// into it so nothing is ever lost to rounding.
    pub fn build(splats: &[Splat3D], world: Aabb) -> SpatialGrid {
        let e = world.extent();
        let dim = Fx::from_int(GRID_DIM as i32);
        let cell_size = [e[0].div(dim), e[1].div(dim), e[2].div(dim)];

        let mut cells = Vec::with_capacity(GRID_CELLS);
        for z in 0..GRID_DIM {
            for y in 0..GRID_DIM {
                for x in 0..GRID_DIM {
                    let lo = [
                        world.min[0] + cell_size[0] * Fx::from_int(x as i32),
                        world.min[1] + cell_size[1] * Fx::from_int(y as i32),
                        world.min[2] + cell_size[2] * Fx::from_int(z as i32),
                    ];
                    cells.push(Cell {
                        bounds: Aabb {
                            min: lo,
                            max: [lo[0] + cell_size[0], lo[1] + cell_size[1], lo[2] + cell_size[2]],
                        },
                        splats: Vec::new(),
                    });
                }
            }
        }

        let mut truncated = 0usize;
        for (i, s) in splats.iter().enumerate() {
            let mut coord = [0usize; 3];
            for a in 0..3 {
                let t = (s.pos[a] - world.min[a]).div(cell_size[a].max(Fx::EPSILON));
                coord[a] = t.to_int().clamp(0, GRID_DIM as i32 - 1) as usize;
            }
            let cell = &mut cells[(coord[2] * GRID_DIM + coord[1]) * GRID_DIM + coord[0]];
            if cell.splats.len() < MAX_SPLATS_PER_CELL {
                cell.splats.push(i as u32);
            } else {
                truncated += 1;
            }
        }
        if truncated > 0 {
            debug!("grid build dropped {truncated} splats from full cells");
        }

        SpatialGrid { cells, truncated }
    }

    pub fn truncated(&self) -> usize {
        self.truncated
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.iter().filter(|c| !c.splats.is_empty()).count()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Plane {
    pub normal: [Fx; 3],
    pub dist: Fx,
}

impl Plane {
    #[inline]
    fn signed_distance(&self, p: [Fx; 3]) -> Fx {
        dot3(self.normal, p) + self.dist
    }
}

/// Six view-frustum planes with inward-facing normals, order: left,
/// right, bottom, top, near, far.
pub struct Frustum {
    pub planes: [Plane; 6],
    /// Set when any plane's normal length collapses to ~0; the culler
    /// falls back to all-visible for the frame.
    pub degenerate: bool,
}

impl Frustum {
    /// Row add/subtract plane extraction from the combined
    /// view-projection matrix.
    pub fn from_matrix(m: &Mat4, luts: &Luts) -> Frustum {
        let r0 = m.row(0);
        let r1 = m.row(1);
        let r2 = m.row(2);
        let r3 = m.row(3);
        let raw = [
            row_add(r3, r0),
            row_sub(r3, r0),
            row_add(r3, r1),
            row_sub(r3, r1),
            row_add(r3, r2),
            row_sub(r3, r2),
        ];

        let mut planes = [Plane::default(); 6];
        let mut degenerate = false;
        for (plane, c) in planes.iter_mut().zip(raw) {
            let normal = [c[0], c[1], c[2]];
            let len_sq = len_sq3(normal);
            if len_sq <= Fx::EPSILON {
                degenerate = true;
                // everything passes a zeroed plane
                *plane = Plane {
                    normal: [Fx::ZERO; 3],
                    dist: Fx::MAX,
                };
                continue;
            }
            let inv_len = luts.recip(luts.sqrt(len_sq));
            *plane = Plane {
                normal: [normal[0] * inv_len, normal[1] * inv_len, normal[2] * inv_len],
                dist: c[3] * inv_len,
            };
        }

        Frustum { planes, degenerate }
    }

    /// Positive-vertex test: the box is outside iff its most-inward
    /// corner is behind some plane.
    pub fn intersects_aabb(&self, b: &Aabb) -> bool {
        for plane in &self.planes {
            let mut p = [Fx::ZERO; 3];
            for a in 0..3 {
                p[a] = if plane.normal[a] >= Fx::ZERO { b.max[a] } else { b.min[a] };
            }
            if plane.signed_distance(p) < Fx::ZERO {
                return false;
            }
        }
        true
    }

    pub fn intersects_sphere(&self, center: [Fx; 3], radius: Fx) -> bool {
        for plane in &self.planes {
            if plane.signed_distance(center) < -radius {
                return false;
            }
        }
        true
    }
}

fn row_add(a: [Fx; 4], b: [Fx; 4]) -> [Fx; 4] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]]
}

fn row_sub(a: [Fx; 4], b: [Fx; 4]) -> [Fx; 4] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2], a[3] - b[3]]
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CullStats {
    pub visible_cells: usize,
    pub empty_cells: usize,
    pub tested_splats: usize,
    pub visible_splats: usize,
    pub hysteresis_kept: usize,
}

/// Per-frame frustum culler. Owns the per-splat visibility history,
/// which survives across frames.
pub struct Culler {
    history: Vec<u8>,
}

impl Culler {
    pub fn new(splat_count: usize) -> Culler {
        Culler {
            history: vec![0; splat_count],
        }
    }

    /// Raw history bits for a splat, newest frame in bit 0.
    pub fn history_bits(&self, idx: usize) -> u8 {
        self.history.get(idx).copied().unwrap_or(0)
    }

    #[inline]
    fn retained(&self, idx: usize) -> bool {
        self.history[idx] & 0x07 == 0x07
    }

    #[inline]
    fn record(&mut self, idx: usize, visible: bool) {
        let h = &mut self.history[idx];
        *h = (*h << 1) | visible as u8;
    }

    /// Culls the scene against the camera frustum, copying survivors
    /// into `out` in cell order. Candidates from AABB-visible cells are
    /// gathered into batches matching the projector's consumption unit.
    pub fn cull(
        &mut self,
        grid: &SpatialGrid,
        splats: &[Splat3D],
        camera: &Camera,
        luts: &Luts,
        out: &mut Vec<Splat3D>,
    ) -> CullStats {
        out.clear();
        if self.history.len() != splats.len() {
            self.history = vec![0; splats.len()];
        }

        let mut stats = CullStats::default();
        let frustum = Frustum::from_matrix(&camera.view_proj, luts);
        if frustum.degenerate {
            warn!("degenerate view-projection matrix, frustum culling disabled this frame");
            out.extend_from_slice(splats);
            for idx in 0..splats.len() {
                self.record(idx, true);
            }
            stats.visible_splats = splats.len();
            stats.visible_cells = grid.occupied_cells();
            return stats;
        }

        let mut pending = [0u32; BATCH_SIZE];
        let mut staged = 0usize;
        for cell in &grid.cells {
            if cell.splats.is_empty() {
                stats.empty_cells += 1;
                continue;
            }
            if !frustum.intersects_aabb(&cell.bounds) {
                for &i in &cell.splats {
                    self.record(i as usize, false);
                }
                continue;
            }
            stats.visible_cells += 1;

            for &i in &cell.splats {
                pending[staged] = i;
                staged += 1;
                if staged == BATCH_SIZE {
                    self.test_batch(&frustum, splats, luts, &pending[..staged], out, &mut stats);
                    staged = 0;
                }
            }
        }
        if staged > 0 {
            self.test_batch(&frustum, splats, luts, &pending[..staged], out, &mut stats);
        }
        stats
    }

    /// Sphere-tests one batch of candidates, applying the hysteresis
    /// override and recording each outcome.
    fn test_batch(
        &mut self,
        frustum: &Frustum,
        splats: &[Splat3D],
        luts: &Luts,
        batch: &[u32],
        out: &mut Vec<Splat3D>,
        stats: &mut CullStats,
    ) {
        let three = Fx::from_int(3);
        for &i in batch {
            let idx = i as usize;
            let Some(s) = splats.get(idx) else { continue };
            let radius = three * luts.sqrt(s.max_cov_diag());
            stats.tested_splats += 1;

            let mut visible = frustum.intersects_sphere(s.pos, radius);
            if !visible && self.retained(idx) {
                visible = true;
                stats.hysteresis_kept += 1;
            }
            self.record(idx, visible);
            if visible {
                out.push(*s);
                stats.visible_splats += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{SceneStore, splat_at};

    fn test_camera(eye: [f32; 3], target: [f32; 3]) -> Camera {
        let view = Camera::look_at(eye, target, [0.0, 1.0, 0.0]);
        let proj = Camera::perspective(60.0, 640.0 / 448.0, 0.1, 100.0);
        Camera::new(view, proj, [0, 0, 640, 448]).unwrap()
    }

    fn cull_scene(splats: Vec<Splat3D>, camera: &Camera) -> (Vec<Splat3D>, CullStats, Culler) {
        let luts = Luts::new();
        let scene = SceneStore::new(splats, &luts).unwrap();
        let grid = SpatialGrid::build(scene.splats(), scene.bounds());
        let mut culler = Culler::new(scene.len());
        let mut out = Vec::new();
        let stats = culler.cull(&grid, scene.splats(), camera, &luts, &mut out);
        (out, stats, culler)
    }

    #[test]
    fn grid_buckets_by_centroid() {
        let splats = vec![
            splat_at([-4.0, -4.0, -4.0], 0.05, [255, 0, 0], 255),
            splat_at([4.0, 4.0, 4.0], 0.05, [0, 255, 0], 255),
            splat_at([4.1, 4.0, 4.0], 0.05, [0, 0, 255], 255),
        ];
        let luts = Luts::new();
        let scene = SceneStore::new(splats, &luts).unwrap();
        let grid = SpatialGrid::build(scene.splats(), scene.bounds());
        assert_eq!(grid.occupied_cells(), 2);
        assert_eq!(grid.truncated(), 0);
    }

    #[test]
    fn grid_cell_capacity_truncates() {
        let splats = vec![splat_at([0.0; 3], 0.05, [255, 0, 0], 255); MAX_SPLATS_PER_CELL + 10];
        let luts = Luts::new();
        let scene = SceneStore::new(splats, &luts).unwrap();
        let grid = SpatialGrid::build(scene.splats(), scene.bounds());
        assert_eq!(grid.truncated(), 10);
    }

    #[test]
    fn frustum_planes_split_front_and_back() {
        let luts = Luts::new();
        let camera = test_camera([0.0, 0.0, 5.0], [0.0, 0.0, 0.0]);
        let frustum = Frustum::from_matrix(&camera.view_proj, &luts);
        assert!(!frustum.degenerate);
        // looking down -z from (0,0,5): origin visible, points behind
        // the camera are not
        assert!(frustum.intersects_sphere([Fx::ZERO; 3], Fx::from_f32(0.1)));
        assert!(!frustum.intersects_sphere([Fx::ZERO, Fx::ZERO, Fx::from_int(10)], Fx::ONE));
        // far off to the side
        assert!(!frustum.intersects_sphere([Fx::from_int(50), Fx::ZERO, Fx::ZERO], Fx::ONE));
    }

    #[test]
    fn aabb_positive_vertex_test() {
        let luts = Luts::new();
        let camera = test_camera([0.0, 0.0, 5.0], [0.0, 0.0, 0.0]);
        let frustum = Frustum::from_matrix(&camera.view_proj, &luts);
        let front = Aabb {
            min: [-Fx::ONE, -Fx::ONE, -Fx::ONE],
            max: [Fx::ONE, Fx::ONE, Fx::ONE],
        };
        assert!(frustum.intersects_aabb(&front));
        let behind = Aabb {
            min: [-Fx::ONE, -Fx::ONE, Fx::from_int(8)],
            max: [Fx::ONE, Fx::ONE, Fx::from_int(9)],
        };
        assert!(!frustum.intersects_aabb(&behind));
    }

    #[test]
    fn culls_splats_behind_the_camera() {
        let camera = test_camera([0.0, 0.0, 5.0], [0.0, 0.0, 0.0]);
        let splats = vec![
            splat_at([0.0, 0.0, 0.0], 0.05, [255, 0, 0], 255),
            splat_at([0.0, 0.0, 20.0], 0.05, [0, 255, 0], 255),
        ];
        let (out, stats, culler) = cull_scene(splats, &camera);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].color, [255, 0, 0]);
        assert_eq!(stats.visible_splats, 1);
        assert_eq!(culler.history_bits(0) & 1, 1);
        assert_eq!(culler.history_bits(1) & 1, 0);
    }

    #[test]
    fn full_cells_cull_through_multiple_batches() {
        let camera = test_camera([0.0, 0.0, 5.0], [0.0, 0.0, 0.0]);
        // 300 co-located splats overflow two 128-entry batches
        let splats: Vec<_> = (0..300)
            .map(|i| splat_at([0.0; 3], 0.05, [i as u8, 0, 0], 255))
            .collect();
        let (out, stats, _) = cull_scene(splats.clone(), &camera);
        assert_eq!(stats.tested_splats, 300);
        assert_eq!(out.len(), 300);
        // survivors keep their cell order
        for (got, want) in out.iter().zip(&splats) {
            assert_eq!(got.color, want.color);
        }
    }

    #[test]
    fn hysteresis_keeps_recently_visible_splats() {
        let luts = Luts::new();
        let scene = SceneStore::new(
            vec![splat_at([0.0; 3], 0.05, [255, 0, 0], 255)],
            &luts,
        )
        .unwrap();
        let grid = SpatialGrid::build(scene.splats(), scene.bounds());
        let mut culler = Culler::new(1);
        let mut out = Vec::new();

        let facing = test_camera([0.0, 0.0, 5.0], [0.0, 0.0, 0.0]);
        for _ in 0..3 {
            culler.cull(&grid, scene.splats(), &facing, &luts, &mut out);
        }
        assert_eq!(culler.history_bits(0) & 0x07, 0x07);

        // turned away: the plane test fails but the history override
        // keeps the splat in the output
        let away = test_camera([0.0, 0.0, 5.0], [0.0, 0.0, 10.0]);
        let stats = culler.cull(&grid, scene.splats(), &away, &luts, &mut out);
        assert_eq!(stats.hysteresis_kept, 1);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn fresh_history_does_not_retain() {
        let away = test_camera([0.0, 0.0, 5.0], [0.0, 0.0, 10.0]);
        let (out, stats, _) = cull_scene(vec![splat_at([0.0; 3], 0.05, [255, 0, 0], 255)], &away);
        assert!(out.is_empty());
        assert_eq!(stats.hysteresis_kept, 0);
    }

    #[test]
    fn degenerate_matrix_disables_culling() {
        let luts = Luts::new();
        let scene = SceneStore::new(
            vec![
                splat_at([0.0; 3], 0.05, [255, 0, 0], 255),
                splat_at([0.0, 0.0, 20.0], 0.05, [0, 255, 0], 255),
            ],
            &luts,
        )
        .unwrap();
        let grid = SpatialGrid::build(scene.splats(), scene.bounds());
        let mut culler = Culler::new(2);
        let mut out = Vec::new();

        let mut camera =
            Camera::new(Mat4::IDENTITY, Camera::perspective(60.0, 1.0, 0.1, 100.0), [0, 0, 640, 448])
                .unwrap();
        camera.view_proj = Mat4(Default::default());
        camera.view_proj.0[0] = Fx::EPSILON; // nonzero but unusable

        let frustum = Frustum::from_matrix(&camera.view_proj, &luts);
        assert!(frustum.degenerate);
        let stats = culler.cull(&grid, scene.splats(), &camera, &luts, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(stats.visible_splats, 2);
    }
}
