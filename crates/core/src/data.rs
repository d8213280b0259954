use crate::fixed::Fx;

/// A struct representing a size in physical pixels.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

/// A struct representing an axis aligned rectangle in physical pixels with origin in the top left corner.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct Bounds {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl Bounds {
    /// Get the size of the rectangle
    pub fn size(&self) -> Size {
        Size {
            width: self.right.saturating_sub(self.left),
            height: self.bottom.saturating_sub(self.top),
        }
    }

    /// Get the width of the rectangle
    pub fn width(&self) -> u32 {
        self.size().width
    }

    /// Get the height of the rectangle
    pub fn height(&self) -> u32 {
        self.size().height
    }

    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    pub fn intersect(&self, other: Self) -> Self {
        let left = self.left.max(other.left);
        let right = self.right.min(other.right);
        let top = self.top.max(other.top);
        let bottom = self.bottom.min(other.bottom);

        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    pub fn union(&self, other: Self) -> Self {
        let left = self.left.min(other.left);
        let right = self.right.max(other.right);
        let top = self.top.min(other.top);
        let bottom = self.bottom.max(other.bottom);

        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    /// Screen AABB of a disc at `(cx, cy)` with radius `r`, clipped to
    /// `limit`. Fractional extents round outward.
    pub fn around(cx: Fx, cy: Fx, r: Fx, limit: Size) -> Self {
        let left = (cx - r).to_int().max(0) as u32;
        let top = (cy - r).to_int().max(0) as u32;
        let right = ((cx + r).to_int() + 1).max(0) as u32;
        let bottom = ((cy + r).to_int() + 1).max(0) as u32;
        Self {
            left: left.min(limit.width),
            right: right.min(limit.width),
            top: top.min(limit.height),
            bottom: bottom.min(limit.height),
        }
    }
}

impl From<[u32; 2]> for Size {
    fn from(value: [u32; 2]) -> Self {
        Self {
            width: value[0],
            height: value[1],
        }
    }
}

impl From<[u32; 4]> for Bounds {
    fn from(value: [u32; 4]) -> Self {
        Self {
            left: value[0],
            right: value[2],
            top: value[1],
            bottom: value[3],
        }
    }
}

/// World-space axis aligned box, Q16.16 corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Aabb {
    pub min: [Fx; 3],
    pub max: [Fx; 3],
}

impl Aabb {
    /// Inverted empty box; growing it with any point makes it valid.
    pub const EMPTY: Aabb = Aabb {
        min: [Fx::MAX; 3],
        max: [Fx::MIN; 3],
    };

    pub fn grow(&mut self, p: [Fx; 3]) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    pub fn pad(&self, eps: Fx) -> Aabb {
        Aabb {
            min: [self.min[0] - eps, self.min[1] - eps, self.min[2] - eps],
            max: [self.max[0] + eps, self.max[1] + eps, self.max[2] + eps],
        }
    }

    pub fn center(&self) -> [Fx; 3] {
        [
            (self.min[0] + self.max[0]) * Fx::HALF,
            (self.min[1] + self.max[1]) * Fx::HALF,
            (self.min[2] + self.max[2]) * Fx::HALF,
        ]
    }

    pub fn extent(&self) -> [Fx; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    pub fn is_valid(&self) -> bool {
        (0..3).all(|i| self.min[i] <= self.max[i])
    }
}

#[inline(always)]
pub fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    (r as u32) << 16 | (g as u32) << 8 | (b as u32) | ((a as u32) << 24)
}

#[inline(always)]
pub fn unpack_rgba(p: u32) -> (u8, u8, u8, u8) {
    (
        (p >> 16) as u8,
        (p >> 8) as u8,
        p as u8,
        (p >> 24) as u8,
    )
}
