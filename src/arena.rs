//! Per-frame memory: two bump arenas and a free-list of recycled index
//! buffers.
//!
//! The `frame` arena holds everything produced for one frame (batch
//! staging buffers, scratch tables) and is reset wholesale at the start
//! of the next; the `scratch` arena is for short-lived intermediates
//! inside a single phase. Both carry allocation limits so overflow
//! degrades (the affected batch is skipped) instead of aborting.

use std::alloc::Layout;

use bumpalo::Bump;
use picosplat_core::{BATCH_BUFFER_ALIGN, CACHE_LINE_ALIGN, Error, Result, Splat3D};

/// Default budget for the frame arena: enough for a full 16k-splat
/// frame with headroom.
pub const DEFAULT_FRAME_LIMIT: usize = 8 << 20;
pub const DEFAULT_SCRATCH_LIMIT: usize = 2 << 20;

pub struct FrameArenas {
    frame: Bump,
    scratch: Bump,
    pool: BufferPool,
}

impl FrameArenas {
    pub fn new(frame_limit: usize, scratch_limit: usize) -> Self {
        let frame = Bump::new();
        frame.set_allocation_limit(Some(frame_limit));
        let scratch = Bump::new();
        scratch.set_allocation_limit(Some(scratch_limit));
        Self {
            frame,
            scratch,
            pool: BufferPool::default(),
        }
    }

    /// Frame boundary: drops everything allocated during the last
    /// frame, keeping the backing chunks.
    pub fn reset(&mut self) {
        self.frame.reset();
        self.scratch.reset();
    }

    pub fn pool(&mut self) -> &mut BufferPool {
        &mut self.pool
    }

    /// Carves a cache-line aligned, zeroed index slice from the scratch
    /// arena. Lives until the next [`reset`].
    ///
    /// [`reset`]: FrameArenas::reset
    pub fn scratch_indices(&self, n: usize) -> Result<&mut [u32]> {
        if n == 0 {
            return Ok(&mut []);
        }
        let layout = Layout::array::<u32>(n)
            .and_then(|l| l.align_to(CACHE_LINE_ALIGN))
            .map_err(|_| Error::InvalidParameter("scratch slice too large for a layout"))?;
        let ptr = self.scratch.try_alloc_layout(layout).map_err(|_| Error::Allocation {
            what: "sort scratch",
            requested: layout.size(),
        })?;
        unsafe {
            let dst = ptr.as_ptr() as *mut u32;
            std::ptr::write_bytes(dst, 0, n);
            Ok(std::slice::from_raw_parts_mut(dst, n))
        }
    }

    /// Copies a projection batch into an upload buffer aligned for the
    /// coprocessor handoff. Lives until the next [`reset`].
    ///
    /// [`reset`]: FrameArenas::reset
    pub fn stage_batch<'a>(&'a self, src: &[Splat3D]) -> Result<&'a [Splat3D]> {
        if src.is_empty() {
            return Ok(&[]);
        }
        let layout = Layout::array::<Splat3D>(src.len())
            .and_then(|l| l.align_to(BATCH_BUFFER_ALIGN))
            .map_err(|_| Error::InvalidParameter("batch too large for a layout"))?;
        let ptr = self.frame.try_alloc_layout(layout).map_err(|_| Error::Allocation {
            what: "projection batch",
            requested: layout.size(),
        })?;
        // freshly carved, non-overlapping by construction
        unsafe {
            let dst = ptr.as_ptr() as *mut Splat3D;
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
            Ok(std::slice::from_raw_parts(dst, src.len()))
        }
    }
}

impl Default for FrameArenas {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_LIMIT, DEFAULT_SCRATCH_LIMIT)
    }
}

/// Free-list of tile index buffers. Buffers keep their capacity across
/// frames, so the steady state allocates nothing.
#[derive(Default)]
pub struct BufferPool {
    free: Vec<Vec<u32>>,
}

impl BufferPool {
    pub fn take(&mut self) -> Vec<u32> {
        match self.free.pop() {
            Some(mut v) => {
                v.clear();
                v
            }
            None => Vec::new(),
        }
    }

    pub fn put(&mut self, v: Vec<u32>) {
        if v.capacity() > 0 {
            self.free.push(v);
        }
    }

    pub fn pooled(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picosplat_core::fixed::{Fx, Fx8};

    fn splat() -> Splat3D {
        Splat3D {
            pos: [Fx::ONE; 3],
            cov_mant: [Fx8::ONE; 9],
            cov_exp: 7,
            color: [1, 2, 3],
            opacity: 255,
        }
    }

    #[test]
    fn staged_batch_is_aligned_and_equal() {
        let arenas = FrameArenas::default();
        let src = vec![splat(); 128];
        let staged = arenas.stage_batch(&src).unwrap();
        assert_eq!(staged, &src[..]);
        assert_eq!(staged.as_ptr() as usize % 128, 0);
    }

    #[test]
    fn allocation_limit_degrades_gracefully() {
        let arenas = FrameArenas::new(256, 256);
        let src = vec![splat(); 1024];
        match arenas.stage_batch(&src) {
            Err(Error::Allocation { .. }) => {}
            other => panic!("expected allocation failure, got {other:?}"),
        }
    }

    #[test]
    fn reset_allows_reuse() {
        let mut arenas = FrameArenas::new(64 << 10, 64 << 10);
        for _ in 0..100 {
            let src = vec![splat(); 128];
            arenas.stage_batch(&src).unwrap();
            arenas.reset();
        }
    }

    #[test]
    fn scratch_indices_are_aligned_and_zeroed() {
        let arenas = FrameArenas::default();
        let s = arenas.scratch_indices(100).unwrap();
        assert_eq!(s.len(), 100);
        assert_eq!(s.as_ptr() as usize % 64, 0);
        assert!(s.iter().all(|&v| v == 0));
    }

    #[test]
    fn scratch_limit_degrades_gracefully() {
        let arenas = FrameArenas::new(DEFAULT_FRAME_LIMIT, 64);
        match arenas.scratch_indices(4096) {
            Err(Error::Allocation { .. }) => {}
            other => panic!("expected allocation failure, got {other:?}"),
        }
    }

    #[test]
    fn pool_recycles_capacity() {
        let mut pool = BufferPool::default();
        let mut v = pool.take();
        v.extend(0..100u32);
        let cap = v.capacity();
        pool.put(v);
        assert_eq!(pool.pooled(), 1);
        let v2 = pool.take();
        assert!(v2.is_empty());
        assert_eq!(v2.capacity(), cap);
    }
}
