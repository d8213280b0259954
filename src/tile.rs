//! Screen-space tile binning and depth sorting.
//!
//! Projected splats are assigned to 16x16 tiles through a 64x64 coarse
//! pre-pass, sorted back-to-front per tile (insertion sort for short
//! lists, a 256-bucket counting sort otherwise), then lightly load
//! balanced across 4-connected neighbors. When the camera has not moved
//! past the coherence thresholds the previous frame's tile orderings
//! are reused wholesale.

use log::debug;

use picosplat_core::fixed::Fx;
use picosplat_core::{
    COARSE_TILE_SIZE, COARSE_TILES_X, Camera, Luts, MAX_COARSE_TILES, MAX_TILES,
    NUM_DEPTH_BUCKETS, SCREEN_HEIGHT, SCREEN_WIDTH, Splat2D, TILE_SIZE, TILES_X, TILES_Y,
};

use crate::arena::{BufferPool, FrameArenas};

/// Frames a stale sort order may be reused before a rebuild is forced.
pub const SORT_REUSE_FRAMES: u32 = 10;
/// Lists at or below this length use insertion sort.
const INSERTION_SORT_MAX: usize = 32;

#[derive(Clone, Copy, Debug, Default)]
pub struct TileRange {
    pub count: u32,
    pub min_depth: Fx,
    pub max_depth: Fx,
}

#[derive(Clone, Copy, Debug, Default)]
struct CoarseTile {
    count: u32,
    min_depth: Fx,
    max_depth: Fx,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BinStats {
    /// Splats that landed in at least one tile.
    pub binned: usize,
    /// Total tile-list entries (a splat counts once per tile).
    pub overlap_entries: usize,
    pub nonempty_tiles: usize,
    /// Entries dropped because a tile list could not grow.
    pub dropped: usize,
    /// Entries moved by the load balancer.
    pub rebalanced: usize,
    pub reused_order: bool,
    min_count: u32,
    max_count: u32,
}

impl BinStats {
    /// min/max occupancy over non-empty tiles, 1.0 when perfectly even.
    pub fn load_balance_factor(&self) -> f32 {
        if self.max_count == 0 {
            1.0
        } else {
            self.min_count as f32 / self.max_count as f32
        }
    }
}

pub struct TileBinner {
    lists: Vec<Vec<u32>>,
    ranges: Vec<TileRange>,
    coarse: Vec<CoarseTile>,
    stats: BinStats,
    frames_since_sort: u32,
    last_camera: Option<Camera>,
    last_count: usize,
}

impl Default for TileBinner {
    fn default() -> Self {
        Self::new()
    }
}

impl TileBinner {
    pub fn new() -> TileBinner {
        TileBinner {
            lists: (0..MAX_TILES).map(|_| Vec::new()).collect(),
            ranges: vec![TileRange::default(); MAX_TILES],
            coarse: vec![CoarseTile::default(); MAX_COARSE_TILES],
            stats: BinStats::default(),
            frames_since_sort: 0,
            last_camera: None,
            last_count: usize::MAX,
        }
    }

    /// Sorted back-to-front index list for one tile.
    pub fn order(&self, tx: usize, ty: usize) -> &[u32] {
        &self.lists[ty * TILES_X + tx]
    }

    pub fn range(&self, tx: usize, ty: usize) -> TileRange {
        self.ranges[ty * TILES_X + tx]
    }

    pub fn stats(&self) -> &BinStats {
        &self.stats
    }

    /// Bins `splats` for the frame. Tile buffers cycle through the
    /// arena's buffer pool so the steady state allocates nothing; the
    /// bucket sort carves its scratch from the scratch arena.
    pub fn bin(
        &mut self,
        splats: &[Splat2D],
        camera: &Camera,
        luts: &Luts,
        arenas: &mut FrameArenas,
    ) -> BinStats {
        let moved = match &self.last_camera {
            Some(prev) => camera.moved_significantly(prev, luts),
            None => true,
        };
        let rebuild = moved
            || splats.len() != self.last_count
            || self.frames_since_sort >= SORT_REUSE_FRAMES;
        if !rebuild {
            self.frames_since_sort += 1;
            self.stats.reused_order = true;
            return self.stats;
        }

        self.frames_since_sort = 0;
        self.last_camera = Some(*camera);
        self.last_count = splats.len();
        self.stats = BinStats::default();

        let pool = arenas.pool();
        for list in &mut self.lists {
            pool.put(std::mem::take(list));
        }
        for range in &mut self.ranges {
            *range = TileRange {
                count: 0,
                min_depth: Fx::MAX,
                max_depth: Fx::MIN,
            };
        }

        self.coarse_pass(splats);
        self.assign(splats, luts, pool);
        self.balance();
        self.sort(splats, luts, arenas);

        for (list, range) in self.lists.iter().zip(self.ranges.iter_mut()) {
            range.count = list.len() as u32;
            if !list.is_empty() {
                self.stats.nonempty_tiles += 1;
                self.stats.overlap_entries += list.len();
                self.stats.min_count = if self.stats.min_count == 0 {
                    range.count
                } else {
                    self.stats.min_count.min(range.count)
                };
                self.stats.max_count = self.stats.max_count.max(range.count);
            }
        }
        self.stats
    }

    /// Counts splat centroids per 64x64 coarse tile and records each
    /// coarse tile's depth range. Empty coarse tiles gate the fine pass.
    fn coarse_pass(&mut self, splats: &[Splat2D]) {
        for c in &mut self.coarse {
            *c = CoarseTile {
                count: 0,
                min_depth: Fx::MAX,
                max_depth: Fx::MIN,
            };
        }
        for s in splats {
            if s.radius <= Fx::ZERO {
                continue;
            }
            let cx = s.screen_pos[0].to_int();
            let cy = s.screen_pos[1].to_int();
            if cx < 0 || cy < 0 || cx >= SCREEN_WIDTH as i32 || cy >= SCREEN_HEIGHT as i32 {
                continue;
            }
            let ci = (cy as usize / COARSE_TILE_SIZE) * COARSE_TILES_X
                + cx as usize / COARSE_TILE_SIZE;
            let c = &mut self.coarse[ci];
            c.count += 1;
            c.min_depth = c.min_depth.min(s.depth);
            c.max_depth = c.max_depth.max(s.depth);
        }
    }

    fn assign(&mut self, splats: &[Splat2D], luts: &Luts, pool: &mut BufferPool) {
        let three = Fx::from_int(3);
        for (i, s) in splats.iter().enumerate() {
            if s.radius <= Fx::ZERO {
                continue;
            }

            // oriented-box half extents of the 3 sigma ellipse; a
            // degenerate minor axis falls back to the bounding circle
            let (hx, hy) = if s.eigenvalues[1] <= Fx::EPSILON {
                (s.radius, s.radius)
            } else {
                let b = three * luts.sqrt(s.eigenvalues[1]);
                let cos = s.eigenvectors[0];
                let sin = s.eigenvectors[2];
                (
                    (s.radius * cos).abs() + (b * sin).abs(),
                    (s.radius * sin).abs() + (b * cos).abs(),
                )
            };

            let left = (s.screen_pos[0] - hx).to_int();
            let right = (s.screen_pos[0] + hx).to_int();
            let top = (s.screen_pos[1] - hy).to_int();
            let bottom = (s.screen_pos[1] + hy).to_int();
            if right < 0 || bottom < 0 || left >= SCREEN_WIDTH as i32 || top >= SCREEN_HEIGHT as i32
            {
                continue;
            }
            let tx0 = left.max(0) as usize / TILE_SIZE;
            let tx1 = (right.max(0) as usize / TILE_SIZE).min(TILES_X - 1);
            let ty0 = top.max(0) as usize / TILE_SIZE;
            let ty1 = (bottom.max(0) as usize / TILE_SIZE).min(TILES_Y - 1);

            let mut hit = false;
            for ty in ty0..=ty1 {
                let cy = ty * TILE_SIZE / COARSE_TILE_SIZE;
                for tx in tx0..=tx1 {
                    let cx = tx * TILE_SIZE / COARSE_TILE_SIZE;
                    if self.coarse[cy * COARSE_TILES_X + cx].count == 0 {
                        continue;
                    }
                    let ti = ty * TILES_X + tx;
                    let list = &mut self.lists[ti];
                    if list.capacity() == 0 {
                        *list = pool.take();
                    }
                    if list.len() == list.capacity()
                        && list.try_reserve(list.capacity().max(8)).is_err()
                    {
                        self.stats.dropped += 1;
                        continue;
                    }
                    list.push(i as u32);
                    let range = &mut self.ranges[ti];
                    range.min_depth = range.min_depth.min(s.depth);
                    range.max_depth = range.max_depth.max(s.depth);
                    hit = true;
                }
            }
            self.stats.binned += hit as usize;
        }
    }

    /// Moves tail entries from tiles above twice the average occupancy
    /// to 4-connected neighbors below it. Runs before the depth sort so
    /// moved entries end up correctly ordered.
    fn balance(&mut self) {
        let mut total = 0usize;
        let mut nonempty = 0usize;
        for list in &self.lists {
            if !list.is_empty() {
                total += list.len();
                nonempty += 1;
            }
        }
        if nonempty == 0 {
            return;
        }
        let avg = total / nonempty;
        let ceiling = avg * 2;
        if ceiling == 0 {
            return;
        }

        let mut moved = 0usize;
        for ty in 0..TILES_Y {
            for tx in 0..TILES_X {
                let ti = ty * TILES_X + tx;
                if self.lists[ti].len() <= ceiling {
                    continue;
                }
                let neighbors = [
                    (tx.wrapping_sub(1), ty),
                    (tx + 1, ty),
                    (tx, ty.wrapping_sub(1)),
                    (tx, ty + 1),
                ];
                for (nx, ny) in neighbors {
                    if nx >= TILES_X || ny >= TILES_Y {
                        continue;
                    }
                    let ni = ny * TILES_X + nx;
                    while self.lists[ti].len() > ceiling && self.lists[ni].len() < avg {
                        let Some(idx) = self.lists[ti].pop() else { break };
                        let ni_len = self.lists[ni].len();
                        let full = ni_len == self.lists[ni].capacity();
                        if full && self.lists[ni].try_reserve(ni_len.max(8)).is_err()
                        {
                            // put it back rather than lose it
                            self.lists[ti].push(idx);
                            break;
                        }
                        self.lists[ni].push(idx);
                        let d_min = self.ranges[ti].min_depth;
                        let d_max = self.ranges[ti].max_depth;
                        let range = &mut self.ranges[ni];
                        range.min_depth = range.min_depth.min(d_min);
                        range.max_depth = range.max_depth.max(d_max);
                        moved += 1;
                    }
                    if self.lists[ti].len() <= ceiling {
                        break;
                    }
                }
            }
        }
        if moved > 0 {
            debug!("load balancer moved {moved} tile entries");
        }
        self.stats.rebalanced = moved;
    }

    fn sort(&mut self, splats: &[Splat2D], luts: &Luts, arenas: &FrameArenas) {
        for (list, range) in self.lists.iter_mut().zip(&self.ranges) {
            if list.len() <= 1 {
                continue;
            }
            if list.len() <= INSERTION_SORT_MAX {
                insertion_sort_by_depth(list, splats);
            } else {
                bucket_sort_by_depth(list, splats, range, luts, arenas);
            }
        }
    }
}

/// Descending depth, so distant splats draw first.
fn insertion_sort_by_depth(list: &mut [u32], splats: &[Splat2D]) {
    for i in 1..list.len() {
        let key = list[i];
        let kd = splats[key as usize].depth;
        let mut j = i;
        while j > 0 && splats[list[j - 1] as usize].depth < kd {
            list[j] = list[j - 1];
            j -= 1;
        }
        list[j] = key;
    }
}

/// Stable 256-bucket counting sort over the tile's own depth range,
/// distant buckets first.
fn bucket_sort_by_depth(
    list: &mut [u32],
    splats: &[Splat2D],
    range: &TileRange,
    luts: &Luts,
    arenas: &FrameArenas,
) {
    let span = range.max_depth - range.min_depth;
    if span <= Fx::ZERO {
        return;
    }
    let Ok(scratch) = arenas.scratch_indices(list.len()) else {
        // scratch exhausted, sort in place instead
        insertion_sort_by_depth(list, splats);
        return;
    };
    let inv_span = luts.recip(span);
    let bucket = |idx: u32| -> usize {
        let d = splats[idx as usize].depth;
        let t = (range.max_depth - d) * inv_span;
        ((t.0 as i64 * (NUM_DEPTH_BUCKETS as i64 - 1)) >> 16)
            .clamp(0, NUM_DEPTH_BUCKETS as i64 - 1) as usize
    };

    let mut counts = [0u32; NUM_DEPTH_BUCKETS];
    for &idx in list.iter() {
        counts[bucket(idx)] += 1;
    }
    let mut starts = [0u32; NUM_DEPTH_BUCKETS];
    let mut acc = 0u32;
    for (start, count) in starts.iter_mut().zip(counts) {
        *start = acc;
        acc += count;
    }

    for &idx in list.iter() {
        let b = bucket(idx);
        scratch[starts[b] as usize] = idx;
        starts[b] += 1;
    }
    list.copy_from_slice(scratch);
}
