use picosplat::scene::{plane_grid, splat_at};
use picosplat::{
    Camera, Fx, Fx8, Renderer, SCREEN_HEIGHT, SCREEN_WIDTH, Splat3D, pack_rgba, unpack_rgba,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn aim(r: &mut Renderer<impl picosplat::Projector, impl picosplat::RasterBackend>, eye: [f32; 3]) {
    let view = Camera::look_at(eye, [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
    let proj = Camera::perspective(60.0, SCREEN_WIDTH as f32 / SCREEN_HEIGHT as f32, 0.1, 100.0);
    r.set_camera(view, proj, [0, 0, SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32])
        .unwrap();
}

/// an empty scene renders to the clear color
/// - every funnel counter is zero
/// - no tile is dispatched and the swap still happens
#[test]
fn empty_scene() {
    let mut r = Renderer::software(Vec::new()).unwrap();
    aim(&mut r, [0.0, 0.0, 5.0]);
    r.set_clear_color(pack_rgba(8, 16, 24, 255));
    let p = r.render_frame().unwrap();

    assert_eq!(p.visible_splats, 0);
    assert_eq!(p.projected_splats, 0);
    assert_eq!(p.rendered_splats, 0);
    assert_eq!(p.tiles_rendered, 0);

    let front = r.backend().front();
    assert_eq!(front.pixel(0, 0), pack_rgba(8, 16, 24, 255));
    assert_eq!(front.pixel(320, 224), pack_rgba(8, 16, 24, 255));
}

/// one red splat at the origin seen from (0, 0, 5)
/// - projects to the viewport center with a sensible radius
/// - the composited center pixel carries the 0.8 opacity over black
/// - pixels outside the footprint keep the clear color
#[test]
fn single_red_splat() {
    let mut r = Renderer::software(vec![splat_at([0.0; 3], 0.05, [255, 0, 0], 204)]).unwrap();
    aim(&mut r, [0.0, 0.0, 5.0]);
    r.set_adaptive_quality(false);
    let p = r.render_frame().unwrap();

    assert_eq!(p.visible_splats, 1);
    assert_eq!(p.projected_splats, 1);
    assert_eq!(p.rendered_splats, 1);
    assert!(p.tiles_rendered >= 1);

    let front = r.backend().front();
    let (red, _, _, alpha) = unpack_rgba(front.pixel(320, 224));
    assert!(red > 150, "center red {red}");
    assert!(alpha > 150, "center alpha {alpha}");
    assert_eq!(front.pixel(5, 5), 0);
}

/// an 8x8 grid of splats in the ground plane
/// - all 64 survive culling and projection
/// - the footprints spread across several tiles
#[test]
fn ground_grid() {
    let mut r = Renderer::software(plane_grid(8, 8, 1.0, 0.02)).unwrap();
    aim(&mut r, [0.0, 4.0, 14.0]);
    r.set_adaptive_quality(false);
    let p = r.render_frame().unwrap();

    assert_eq!(p.input_splats, 64);
    assert_eq!(p.visible_splats, 64);
    assert_eq!(p.projected_splats, 64);
    assert!(p.rendered_splats > 0);
    assert!(p.tiles_rendered >= 4, "tiles {}", p.tiles_rendered);
}

/// 1024 splats spread uniformly along the view axis, half behind the
/// camera
/// - the culled fraction lands within 5% of one half
/// - the frame completes and draws only the front half
#[test]
fn half_culled_cloud() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut splats = Vec::with_capacity(1024);
    for _ in 0..1024 {
        splats.push(splat_at(
            [
                rng.gen_range(-0.1..0.1),
                rng.gen_range(-0.1..0.1),
                rng.gen_range(-95.0..105.0),
            ],
            0.05,
            [200, 200, 200],
            180,
        ));
    }
    let mut r = Renderer::software(splats).unwrap();
    aim(&mut r, [0.0, 0.0, 5.0]);
    r.set_adaptive_quality(false);
    let p = r.render_frame().unwrap();

    let visible = p.visible_splats as i64;
    assert!(
        (visible - 512).abs() <= 51,
        "visible {visible} not within 5% of half"
    );
    assert!(p.projected_splats <= p.visible_splats);
    assert!(p.rendered_splats > 0);
}

/// a 16k splat cluster crammed into a small screen region
/// - the frame still completes
/// - tile occupancy is badly skewed (load balance factor below 0.5)
/// - with an unreachable target the adaptive controller sheds splats
#[test]
fn overload_cluster() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut splats = Vec::with_capacity(16384);
    for _ in 0..16384 {
        splats.push(splat_at(
            [
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            ],
            0.01,
            [
                rng.gen_range(50..=255),
                rng.gen_range(50..=255),
                rng.gen_range(50..=255),
            ],
            150,
        ));
    }
    let mut r = Renderer::software(splats).unwrap();
    aim(&mut r, [0.0, 0.0, 5.0]);
    r.set_target_fps(1_000_000).unwrap(); // force the controller down
    let p = r.render_frame().unwrap();

    assert!(p.visible_splats > 0);
    assert!(p.rendered_splats > 0);
    assert!(
        p.load_balance_factor < 0.5,
        "load balance {}",
        p.load_balance_factor
    );
    assert!(p.max_splats < picosplat::MAX_SCENE_SPLATS);
}

/// the covariance saturation hazard: maximum mantissas at the maximum
/// block exponent
/// - projection saturates instead of wrapping, no panic anywhere
/// - the drawn radius is the clamped maximum, so the quad stays small
#[test]
fn saturated_covariance() {
    let splat = Splat3D {
        pos: [Fx::ZERO; 3],
        cov_mant: [Fx8::MAX; 9],
        cov_exp: 15,
        color: [255, 255, 255],
        opacity: 255,
    };
    let mut r = Renderer::software(vec![splat]).unwrap();
    aim(&mut r, [0.0, 0.0, 5.0]);
    r.set_adaptive_quality(false);
    let p = r.render_frame().unwrap();

    assert_eq!(p.projected_splats, 1);
    assert!(p.rendered_splats <= 1);

    // far corners stay untouched by the clamped footprint
    let front = r.backend().front();
    assert_eq!(front.pixel(0, 0), 0);
    assert_eq!(front.pixel(SCREEN_WIDTH - 1, SCREEN_HEIGHT - 1), 0);
}

/// repeated frames under a static camera
/// - the second frame reuses the sort order
/// - moving the camera past the threshold forces a rebuild
#[test]
fn temporal_sort_reuse() {
    let mut r = Renderer::software(plane_grid(8, 8, 1.0, 0.02)).unwrap();
    aim(&mut r, [0.0, 4.0, 14.0]);
    r.set_adaptive_quality(false);
    let first = r.render_frame().unwrap();
    assert!(!first.sort_reused);
    let second = r.render_frame().unwrap();
    assert!(second.sort_reused);

    aim(&mut r, [3.0, 4.0, 14.0]);
    let moved = r.render_frame().unwrap();
    assert!(!moved.sort_reused);
}
