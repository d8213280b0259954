//! Scalar tile rasterizer.
//!
//! Draws each tile's sorted splat list as scissored quads with
//! source-alpha over blending and a greater-or-equal depth test, either
//! sampling the footprint atlas or evaluating the inverse-covariance
//! Gaussian per pixel. Owns the front/back framebuffer pair; the swap
//! happens at the frame barrier.

use log::debug;

use picosplat_core::fixed::Fx;
use picosplat_core::lut::FOOTPRINT_RES;
use picosplat_core::{Bounds, Luts, RasterBackend, Result, Size, Splat2D, TileDraw};

use crate::buffer::{Buffer, blend_over};

pub struct SoftwareRaster {
    front: Buffer,
    back: Buffer,
    size: Size,
    dropped_primitives: u64,
}

impl SoftwareRaster {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            front: Buffer::new(width, height),
            back: Buffer::new(width, height),
            size: Size {
                width: width as u32,
                height: height as u32,
            },
            dropped_primitives: 0,
        }
    }

    /// The last completed frame.
    pub fn front(&self) -> &Buffer {
        &self.front
    }

    pub fn dropped_primitives(&self) -> u64 {
        self.dropped_primitives
    }

    fn draw_splat(&mut self, splat: &Splat2D, scissor: Bounds, use_atlas: bool, luts: &Luts) {
        let quad = Bounds::around(splat.screen_pos[0], splat.screen_pos[1], splat.radius, self.size)
            .intersect(scissor);
        if quad.is_empty() {
            return;
        }

        let base_alpha = splat.color[3] as u32;
        // inverse depth grows toward the camera, so GE keeps the nearest
        let inv_z = luts.recip(splat.depth);
        // maps a pixel offset from the center into the cell's [0, 1)
        let inv_diameter = luts.recip(splat.radius + splat.radius);
        let cell_u = splat.atlas_u.saturating_sub((FOOTPRINT_RES / 2) as u8) as usize;
        let cell_v = splat.atlas_v.saturating_sub((FOOTPRINT_RES / 2) as u8) as usize;

        let ia = splat.inv_cov_2d[0].to_fx();
        let ib = splat.inv_cov_2d[1].to_fx();
        let id = splat.inv_cov_2d[3].to_fx();

        for py in quad.top..quad.bottom {
            for px in quad.left..quad.right {
                let dx = Fx::from_int(px as i32) + Fx::HALF - splat.screen_pos[0];
                let dy = Fx::from_int(py as i32) + Fx::HALF - splat.screen_pos[1];

                let footprint = if use_atlas {
                    let tx = texel(dx, inv_diameter);
                    let ty = texel(dy, inv_diameter);
                    luts.atlas_sample((cell_u + tx) as u8, (cell_v + ty) as u8) as u32
                } else {
                    let m_sq = dx * dx * ia + Fx::TWO * dx * dy * ib + dy * dy * id;
                    (luts.exp_falloff_sq(m_sq).0 as i64 * 255 >> 16).clamp(0, 255) as u32
                };

                let a = ((footprint * base_alpha + 127) / 255) as u8;
                if a == 0 {
                    continue;
                }
                let (x, y) = (px as usize, py as usize);
                // GE test against the cleared-to-zero plane; only fully
                // opaque pixels write depth
                if inv_z < self.back.depth_at(x, y) {
                    continue;
                }
                let blended = blend_over(
                    self.back.pixel(x, y),
                    splat.color[0],
                    splat.color[1],
                    splat.color[2],
                    a,
                );
                self.back.set_pixel(x, y, blended);
                if a == 255 {
                    self.back.set_depth(x, y, inv_z);
                }
            }
        }
    }
}

/// Offset-from-center to footprint-cell texel, clamped to the cell.
#[inline]
fn texel(d: Fx, inv_diameter: Fx) -> usize {
    let t = d * inv_diameter + Fx::HALF;
    ((t.0 as i64 * (FOOTPRINT_RES - 1) as i64) >> 16).clamp(0, FOOTPRINT_RES as i64 - 1) as usize
}

impl RasterBackend for SoftwareRaster {
    fn begin_frame(&mut self, clear: u32) -> Result<()> {
        self.back.clear(clear);
        Ok(())
    }

    fn draw_tile(&mut self, draw: TileDraw<'_>, luts: &Luts) -> Result<()> {
        for &idx in draw.order {
            let Some(splat) = draw.splats.get(idx as usize) else {
                self.dropped_primitives += 1;
                debug!("tile list index {idx} out of range, primitive dropped");
                continue;
            };
            if splat.radius <= Fx::ZERO {
                self.dropped_primitives += 1;
                continue;
            }
            self.draw_splat(splat, draw.scissor, draw.use_atlas, luts);
        }
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        std::mem::swap(&mut self.front, &mut self.back);
        Ok(())
    }
}
