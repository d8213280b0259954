use picosplat_core::{Fx, pack_rgba};

/// An RGBA8 framebuffer with a Q16.16 depth plane.
///
/// Color is packed with [`pack_rgba`]; depth holds inverse camera-space
/// z (larger is nearer) and clears to 0 so the greater-or-equal test
/// passes anything until an opaque pixel lands.
#[derive(Clone)]
pub struct Buffer {
    color: Box<[u32]>,
    depth: Box<[i32]>,
    width: usize,
    height: usize,
}

impl Buffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            color: vec![0; width * height].into_boxed_slice(),
            depth: vec![0; width * height].into_boxed_slice(),
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn clear(&mut self, color: u32) {
        self.color.fill(color);
        self.depth.fill(0);
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        self.color[y * self.width + x]
    }

    #[inline]
    pub fn set_pixel(&mut self, x: usize, y: usize, color: u32) {
        self.color[y * self.width + x] = color;
    }

    #[inline]
    pub fn depth_at(&self, x: usize, y: usize) -> Fx {
        Fx(self.depth[y * self.width + x])
    }

    #[inline]
    pub fn set_depth(&mut self, x: usize, y: usize, depth: Fx) {
        self.depth[y * self.width + x] = depth.0;
    }

    pub fn pixels(&self) -> &[u32] {
        &self.color
    }

    /// Copies the color plane out as tightly packed RGBA8 rows.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.color.len() * 4);
        for p in &self.color {
            let (r, g, b, a) = picosplat_core::unpack_rgba(*p);
            out.extend_from_slice(&[r, g, b, a]);
        }
        out
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Integer source-alpha over blend: `out = src*a + dst*(1-a)`, alpha
/// accumulates toward opaque.
#[inline]
pub fn blend_over(dst: u32, sr: u8, sg: u8, sb: u8, sa: u8) -> u32 {
    let (dr, dg, db, da) = picosplat_core::unpack_rgba(dst);
    let a = sa as u32;
    let na = 255 - a;
    let r = (sr as u32 * a + dr as u32 * na + 127) / 255;
    let g = (sg as u32 * a + dg as u32 * na + 127) / 255;
    let b = (sb as u32 * a + db as u32 * na + 127) / 255;
    let out_a = (a + da as u32 * na / 255).min(255);
    pack_rgba(r as u8, g as u8, b as u8, out_a as u8)
}
