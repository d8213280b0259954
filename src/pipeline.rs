//! Frame driver: cull, project, bin, rasterize.
//!
//! [`Renderer`] owns the whole pipeline state and runs one frame per
//! [`render_frame`] call. Projection goes to the [`Projector`] in
//! double-buffered batches: the next batch is staged while the previous
//! one is in flight, and each wait is held against a time budget so a
//! stalled coprocessor degrades the frame instead of hanging it.
//!
//! [`render_frame`]: Renderer::render_frame

use std::time::Instant;

use log::{error, warn};

use picosplat_core::fixed::Mat4;
use picosplat_core::{
    BATCH_SIZE, Bounds, Camera, Error, Luts, MAX_SCENE_SPLATS, Projector, RasterBackend, Result,
    Splat2D, Splat3D, TILE_SIZE, TILES_X, TILES_Y, TileDraw,
};

use crate::arena::FrameArenas;
use crate::grid::{CullStats, Culler, SpatialGrid};
use crate::profile::FrameProfile;
use crate::scene::SceneStore;
use crate::tile::TileBinner;

/// Frames fallback mode persists after a batch timeout.
const FALLBACK_FRAMES: u32 = 60;
/// Adaptive floor for the per-frame splat cap.
const MIN_MAX_SPLATS: usize = 1000;

/// Runtime tuning state driven by the adaptive-quality controller.
#[derive(Clone, Copy, Debug)]
struct Tuning {
    target_fps: u32,
    adaptive: bool,
    max_splats: usize,
    quality_level: u8,
    fallback_frames: u32,
    batch_budget_us: Option<u64>,
}

impl Default for Tuning {
    fn default() -> Self {
        Tuning {
            target_fps: 60,
            adaptive: true,
            max_splats: MAX_SCENE_SPLATS,
            quality_level: 3,
            fallback_frames: 0,
            batch_budget_us: None,
        }
    }
}

impl Tuning {
    fn fallback(&self) -> bool {
        self.fallback_frames > 0
    }

    fn batch_budget_ns(&self) -> u64 {
        match self.batch_budget_us {
            Some(us) => us * 1000,
            None => 1_000_000_000 / self.target_fps.max(1) as u64,
        }
    }

    /// One controller step from a measured frame rate. Below 90% of
    /// target the splat cap shrinks 10% (down to the floor, then the
    /// quality tier drops); above 110% the tier recovers first, then the
    /// cap grows back in steps of 100.
    fn adapt(&mut self, fps_x100: u64) {
        let target = self.target_fps as u64;
        if fps_x100 < target * 90 {
            if self.max_splats > MIN_MAX_SPLATS {
                self.max_splats = (self.max_splats * 9 / 10).max(MIN_MAX_SPLATS);
            } else {
                self.quality_level = self.quality_level.saturating_sub(1);
            }
        } else if fps_x100 > target * 110 {
            if self.quality_level < 3 {
                self.quality_level += 1;
            } else {
                self.max_splats = (self.max_splats + 100).min(MAX_SCENE_SPLATS);
            }
        }
    }
}

pub struct Renderer<P: Projector, R: RasterBackend> {
    luts: Luts,
    scene: SceneStore,
    grid: SpatialGrid,
    culler: Culler,
    binner: TileBinner,
    arenas: FrameArenas,
    projector: P,
    raster: R,
    camera: Option<Camera>,
    tuning: Tuning,
    clear_color: u32,
    frame_number: u64,
    visible: Vec<Splat3D>,
    projected: Vec<Splat2D>,
}

impl<P: Projector, R: RasterBackend> Renderer<P, R> {
    pub fn new(splats: Vec<Splat3D>, projector: P, raster: R) -> Result<Renderer<P, R>> {
        let luts = Luts::new();
        let scene = SceneStore::new(splats, &luts)?;
        let grid = SpatialGrid::build(scene.splats(), scene.bounds());
        let culler = Culler::new(scene.len());
        Ok(Renderer {
            luts,
            scene,
            grid,
            culler,
            binner: TileBinner::new(),
            arenas: FrameArenas::default(),
            projector,
            raster,
            camera: None,
            tuning: Tuning::default(),
            clear_color: 0,
            frame_number: 0,
            visible: Vec::new(),
            projected: Vec::new(),
        })
    }

    /// Replaces the scene; the grid and visibility history restart from
    /// scratch, tuning state is kept.
    pub fn load_scene(&mut self, splats: Vec<Splat3D>) -> Result<()> {
        self.scene = SceneStore::new(splats, &self.luts)?;
        self.grid = SpatialGrid::build(self.scene.splats(), self.scene.bounds());
        self.culler = Culler::new(self.scene.len());
        self.binner = TileBinner::new();
        Ok(())
    }

    pub fn load_scene_file(&mut self, path: &std::path::Path) -> Result<()> {
        self.load_scene(picosplat_core::format::load_file(path)?)
    }

    pub fn set_camera(&mut self, view: Mat4, proj: Mat4, viewport: [u32; 4]) -> Result<()> {
        self.camera = Some(Camera::new(view, proj, viewport)?);
        Ok(())
    }

    pub fn set_clear_color(&mut self, color: u32) {
        self.clear_color = color;
    }

    pub fn set_target_fps(&mut self, fps: u32) -> Result<()> {
        if fps == 0 {
            return Err(Error::InvalidParameter("target fps must be positive"));
        }
        self.tuning.target_fps = fps;
        Ok(())
    }

    pub fn set_adaptive_quality(&mut self, enabled: bool) {
        self.tuning.adaptive = enabled;
    }

    pub fn set_max_splats(&mut self, cap: usize) -> Result<()> {
        if cap == 0 {
            return Err(Error::InvalidParameter("splat cap must be positive"));
        }
        self.tuning.max_splats = cap.min(MAX_SCENE_SPLATS);
        Ok(())
    }

    pub fn set_quality_level(&mut self, level: u8) -> Result<()> {
        if level > 3 {
            return Err(Error::InvalidParameter("quality level range is 0..=3"));
        }
        self.tuning.quality_level = level;
        Ok(())
    }

    /// Overrides the derived per-batch projection budget.
    pub fn set_batch_budget_us(&mut self, budget: Option<u64>) {
        self.tuning.batch_budget_us = budget;
    }

    pub fn max_splats(&self) -> usize {
        self.tuning.max_splats
    }

    pub fn quality_level(&self) -> u8 {
        self.tuning.quality_level
    }

    pub fn fallback_mode(&self) -> bool {
        self.tuning.fallback()
    }

    pub fn scene(&self) -> &SceneStore {
        &self.scene
    }

    pub fn backend(&self) -> &R {
        &self.raster
    }

    pub fn luts(&self) -> &Luts {
        &self.luts
    }

    /// Runs one frame. On `Err` the frame is abandoned (the back buffer
    /// holds only the clear color and is not presented); a batch timeout
    /// additionally arms fallback mode for the following frames.
    pub fn render_frame(&mut self) -> Result<FrameProfile> {
        let camera = self
            .camera
            .ok_or(Error::InvalidParameter("no camera set"))?;
        let frame_start = Instant::now();
        self.frame_number += 1;
        self.arenas.reset();

        let mut profile = FrameProfile {
            frame_number: self.frame_number,
            input_splats: self.scene.len(),
            ..Default::default()
        };

        self.raster.begin_frame(self.clear_color)?;

        // cull
        let t = Instant::now();
        let cull = self.culler.cull(
            &self.grid,
            self.scene.splats(),
            &camera,
            &self.luts,
            &mut self.visible,
        );
        if self.visible.len() > self.tuning.max_splats {
            self.visible.truncate(self.tuning.max_splats);
        }
        profile.cull_ns = t.elapsed().as_nanos() as u64;
        self.note_cull(&mut profile, &cull);

        // project
        let t = Instant::now();
        if let Err(e) = self.project_visible(&camera) {
            if let Error::BatchTimeout { .. } = e {
                warn!("projection batch timed out, arming fallback mode: {e}");
                self.tuning.fallback_frames = FALLBACK_FRAMES;
                self.tuning.max_splats = (self.tuning.max_splats / 2).max(MIN_MAX_SPLATS);
            }
            return Err(e);
        }
        profile.project_ns = t.elapsed().as_nanos() as u64;
        profile.projected_splats = self.projected.len();

        // bin and sort
        let t = Instant::now();
        let bin = self
            .binner
            .bin(&self.projected, &camera, &self.luts, &mut self.arenas);
        profile.bin_ns = t.elapsed().as_nanos() as u64;
        profile.rendered_splats = bin.binned;
        profile.overlap_entries = bin.overlap_entries;
        profile.load_balance_factor = bin.load_balance_factor();
        profile.sort_reused = bin.reused_order;

        // rasterize, row-major tile order
        let t = Instant::now();
        let use_atlas = self.tuning.quality_level >= 2 && !self.tuning.fallback();
        for ty in 0..TILES_Y {
            for tx in 0..TILES_X {
                let order = self.binner.order(tx, ty);
                if order.is_empty() {
                    continue;
                }
                let draw = TileDraw {
                    scissor: tile_scissor(tx, ty),
                    splats: &self.projected,
                    order,
                    use_atlas,
                };
                if let Err(e) = self.raster.draw_tile(draw, &self.luts) {
                    error!("tile ({tx},{ty}) failed, skipping: {e}");
                    continue;
                }
                profile.tiles_rendered += 1;
            }
        }
        self.raster.end_frame()?;
        profile.raster_ns = t.elapsed().as_nanos() as u64;

        profile.frame_ns = frame_start.elapsed().as_nanos().max(1) as u64;
        self.tuning.fallback_frames = self.tuning.fallback_frames.saturating_sub(1);
        if self.tuning.adaptive {
            self.tuning.adapt(profile.fps_x100());
        }
        profile.quality_level = self.tuning.quality_level;
        profile.max_splats = self.tuning.max_splats;
        profile.fallback_mode = self.tuning.fallback();
        Ok(profile)
    }

    fn note_cull(&self, profile: &mut FrameProfile, cull: &CullStats) {
        profile.visible_splats = self.visible.len();
        profile.visible_cells = cull.visible_cells;
        profile.empty_cells = cull.empty_cells;
        profile.hysteresis_kept = cull.hysteresis_kept;
    }

    /// Projects the visible set in batches. The upload of batch `n+1`
    /// is staged while batch `n` is in flight; the wait on each batch is
    /// measured against the time budget.
    fn project_visible(&mut self, camera: &Camera) -> Result<()> {
        self.projected.clear();
        let budget_ns = self.tuning.batch_budget_ns();
        let mut in_flight: Option<Instant> = None;

        for chunk in self.visible.chunks(BATCH_SIZE) {
            let staged = match self.arenas.stage_batch(chunk) {
                Ok(s) => s,
                Err(e) => {
                    warn!("batch staging failed, {} splats skipped: {e}", chunk.len());
                    continue;
                }
            };
            if let Some(started) = in_flight.take() {
                self.projector.wait(&mut self.projected)?;
                check_budget(started, budget_ns)?;
            }
            self.projector.submit(staged, camera, &self.luts)?;
            in_flight = Some(Instant::now());
        }
        if let Some(started) = in_flight {
            self.projector.wait(&mut self.projected)?;
            check_budget(started, budget_ns)?;
        }
        Ok(())
    }
}

fn check_budget(started: Instant, budget_ns: u64) -> Result<()> {
    let elapsed_ns = started.elapsed().as_nanos() as u64;
    if elapsed_ns > budget_ns {
        return Err(Error::BatchTimeout {
            elapsed_us: elapsed_ns / 1000,
            budget_us: budget_ns / 1000,
        });
    }
    Ok(())
}

fn tile_scissor(tx: usize, ty: usize) -> Bounds {
    Bounds {
        left: (tx * TILE_SIZE) as u32,
        right: ((tx + 1) * TILE_SIZE) as u32,
        top: (ty * TILE_SIZE) as u32,
        bottom: ((ty + 1) * TILE_SIZE) as u32,
    }
}

#[cfg(all(test, feature = "software"))]
mod tests {
    use super::*;
    use crate::scene::splat_at;
    use picosplat_core::{SCREEN_HEIGHT, SCREEN_WIDTH};
    use picosplat_software::{ScalarProjector, SoftwareRaster};

    fn renderer(splats: Vec<Splat3D>) -> Renderer<ScalarProjector, SoftwareRaster> {
        Renderer::new(
            splats,
            ScalarProjector::new(),
            SoftwareRaster::new(SCREEN_WIDTH, SCREEN_HEIGHT),
        )
        .unwrap()
    }

    fn aim(r: &mut Renderer<ScalarProjector, SoftwareRaster>, eye: [f32; 3]) {
        let view = Camera::look_at(eye, [0.0; 3], [0.0, 1.0, 0.0]);
        let proj = Camera::perspective(60.0, 640.0 / 448.0, 0.1, 100.0);
        r.set_camera(view, proj, [0, 0, 640, 448]).unwrap();
    }

    #[test]
    fn render_without_camera_fails() {
        let mut r = renderer(vec![splat_at([0.0; 3], 0.05, [255, 0, 0], 255)]);
        assert!(matches!(
            r.render_frame(),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn tuning_setters_validate() {
        let mut r = renderer(Vec::new());
        assert!(r.set_target_fps(0).is_err());
        assert!(r.set_quality_level(4).is_err());
        assert!(r.set_max_splats(0).is_err());
        r.set_quality_level(1).unwrap();
        assert_eq!(r.quality_level(), 1);
        r.set_max_splats(2000).unwrap();
        assert_eq!(r.max_splats(), 2000);
    }

    #[test]
    fn adapt_shrinks_cap_then_quality() {
        let mut t = Tuning {
            max_splats: 1100,
            ..Default::default()
        };
        t.adapt(1000); // 10 fps against a 60 fps target
        assert_eq!(t.max_splats, MIN_MAX_SPLATS);
        assert_eq!(t.quality_level, 3);
        t.adapt(1000);
        assert_eq!(t.max_splats, MIN_MAX_SPLATS);
        assert_eq!(t.quality_level, 2);
    }

    #[test]
    fn adapt_recovers_quality_then_cap() {
        let mut t = Tuning {
            max_splats: 5000,
            quality_level: 1,
            ..Default::default()
        };
        t.adapt(20000); // 200 fps
        assert_eq!(t.quality_level, 2);
        t.adapt(20000);
        t.adapt(20000);
        assert_eq!(t.quality_level, 3);
        assert_eq!(t.max_splats, 5100);
        // inside the 90..110% dead band nothing moves
        t.adapt(6000);
        assert_eq!(t.max_splats, 5100);
    }

    #[test]
    fn unreachable_target_reduces_max_splats() {
        let mut r = renderer(crate::scene::plane_grid(8, 8, 1.0, 0.02));
        aim(&mut r, [0.0, 3.0, 10.0]);
        r.set_target_fps(1_000_000).unwrap(); // never reachable
        let before = r.max_splats();
        r.render_frame().unwrap();
        assert!(r.max_splats() < before);
    }

    #[test]
    fn batch_timeout_arms_fallback_mode() {
        let mut r = renderer(vec![splat_at([0.0; 3], 0.05, [255, 0, 0], 255)]);
        aim(&mut r, [0.0, 0.0, 5.0]);
        r.set_batch_budget_us(Some(0));
        match r.render_frame() {
            Err(Error::BatchTimeout { .. }) => {}
            other => panic!("expected a batch timeout, got {other:?}"),
        }
        assert!(r.fallback_mode());

        // with the budget restored the next frame completes, still in
        // fallback
        r.set_batch_budget_us(None);
        let profile = r.render_frame().unwrap();
        assert!(profile.fallback_mode);
        assert_eq!(profile.projected_splats, 1);
    }

    #[test]
    fn profile_counts_are_monotone() {
        let mut r = renderer(crate::scene::plane_grid(8, 8, 1.0, 0.02));
        aim(&mut r, [0.0, 3.0, 10.0]);
        r.set_adaptive_quality(false);
        let p = r.render_frame().unwrap();
        assert!(p.input_splats >= p.visible_splats);
        assert!(p.visible_splats >= p.projected_splats);
        assert!(p.projected_splats >= p.rendered_splats);
        assert!(p.rendered_splats > 0);
        assert!(p.tiles_rendered > 0);
    }

    #[test]
    fn max_splats_caps_the_visible_set() {
        let mut r = renderer(crate::scene::plane_grid(8, 8, 1.0, 0.02));
        aim(&mut r, [0.0, 3.0, 10.0]);
        r.set_adaptive_quality(false);
        r.set_max_splats(10).unwrap();
        let p = r.render_frame().unwrap();
        assert_eq!(p.visible_splats, 10);
        assert!(p.projected_splats <= 10);
    }
}
