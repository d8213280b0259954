//! Renders a procedural scene for a few frames of a camera orbit and
//! writes the last frame to `render_scene.png`.

use std::time::Instant;

use picosplat::scene::{plane_grid, splat_at};
use picosplat::{Camera, FrameProfile, Renderer, SCREEN_HEIGHT, SCREEN_WIDTH, pack_rgba};

fn main() {
    // a splat carpet plus a loose arch over it
    let mut splats = plane_grid(48, 48, 0.4, 0.01);
    for i in 0..24 {
        let t = i as f32 / 23.0 * std::f32::consts::PI;
        splats.push(splat_at(
            [t.cos() * 4.0, t.sin() * 3.0, 0.0],
            0.03,
            [255, (i * 10) as u8, 60],
            230,
        ));
    }

    let mut renderer = Renderer::software(splats).expect("scene rejected");
    renderer.set_clear_color(pack_rgba(12, 12, 20, 255));

    let proj = Camera::perspective(60.0, SCREEN_WIDTH as f32 / SCREEN_HEIGHT as f32, 0.1, 100.0);
    let start = Instant::now();
    let mut last = FrameProfile::default();
    for frame in 0..120 {
        let t = frame as f32 * 0.02;
        let eye = [t.sin() * 14.0, 6.0, t.cos() * 14.0];
        let view = Camera::look_at(eye, [0.0, 1.0, 0.0], [0.0, 1.0, 0.0]);
        renderer
            .set_camera(view, proj, [0, 0, SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32])
            .expect("bad camera");

        match renderer.render_frame() {
            Ok(profile) => last = profile,
            Err(e) => eprintln!("frame {frame} failed: {e}"),
        }
    }
    let elapsed = start.elapsed();

    println!(
        "120 frames in {:.2}s ({:.1} fps average)",
        elapsed.as_secs_f32(),
        120.0 / elapsed.as_secs_f32()
    );
    println!(
        "last frame: {} visible, {} projected, {} tiles, balance {:.2}, {:.2}ms",
        last.visible_splats,
        last.projected_splats,
        last.tiles_rendered,
        last.load_balance_factor,
        last.frame_ns as f64 / 1e6,
    );

    let front = renderer.backend().front();
    image::save_buffer(
        "render_scene.png",
        &front.to_rgba8(),
        SCREEN_WIDTH as u32,
        SCREEN_HEIGHT as u32,
        image::ExtendedColorType::Rgba8,
    )
    .expect("failed to write render_scene.png");
    println!("wrote render_scene.png");
}
