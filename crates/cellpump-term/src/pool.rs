// SPDX-License-Identifier: MIT
//
// Pools — reusable pixel grids and chunks.
//
// A repainting application resizes its frame buffer on every terminal
// resize and builds dozens of chunks per row on every paint. Both would
// churn the allocator if every resize and every row allocated fresh
// storage. Instead:
//
//   PixelPool — free list of pixel grid allocations. A frame buffer rents a
//   grid on construction and resize, and hands the old one back on resize
//   and on drop. `rent` picks the smallest free grid whose capacity fits.
//
//   ChunkPool — free lists keyed by exact chunk width. A chunk given back
//   under width W is only ever handed out again for rows of width W, so a
//   chunk sized for a narrow terminal never ends up serving a wide one.
//
// Pool return may happen on any thread (a buffer can be dropped wherever
// its owner ends up), so both free lists sit behind a `Mutex`. A poisoned
// lock is recovered: the free list holds plain data and stays valid even
// if a holder panicked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::trace;

use crate::cell::{Cell, Pixel};
use crate::color::Rgb;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── PoolStats ───────────────────────────────────────────────────────────────

/// Counters describing how well a pool is being reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Rents satisfied from the free list.
    pub hits: u64,
    /// Rents that had to allocate.
    pub misses: u64,
    /// Allocations handed back.
    pub returns: u64,
}

impl PoolStats {
    /// Percentage of rents served from the free list (0 when nothing rented).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            100.0 * self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    returns: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
        }
    }
}

// ─── PixelPool ───────────────────────────────────────────────────────────────

/// Free list of pixel grids.
///
/// # Examples
///
/// ```
/// use cellpump_term::pool::PixelPool;
///
/// let pool = PixelPool::new();
/// let grid = pool.rent(80 * 24);
/// assert_eq!(grid.len(), 1920);
/// pool.give_back(grid);
///
/// let again = pool.rent(40 * 12);
/// assert_eq!(pool.stats().hits, 1);
/// # drop(again);
/// ```
#[derive(Debug, Default)]
pub struct PixelPool {
    free: Mutex<Vec<Vec<Pixel>>>,
    counters: Counters,
}

impl PixelPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rent a grid of `len` blank, never-painted pixels.
    #[must_use]
    pub fn rent(&self, len: usize) -> Vec<Pixel> {
        if len == 0 {
            return Vec::new();
        }

        let reused = {
            let mut free = lock(&self.free);
            let best = free
                .iter()
                .enumerate()
                .filter(|(_, grid)| grid.capacity() >= len)
                .min_by_key(|(_, grid)| grid.capacity())
                .map(|(i, _)| i);
            best.map(|i| free.swap_remove(i))
        };

        if let Some(mut grid) = reused {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            grid.clear();
            grid.resize(len, Pixel::BLANK);
            grid
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            trace!("pixel pool miss: allocating {len} pixels");
            vec![Pixel::BLANK; len]
        }
    }

    /// Hand a grid back for reuse. Empty allocations are dropped.
    pub fn give_back(&self, mut grid: Vec<Pixel>) {
        if grid.capacity() == 0 {
            return;
        }
        grid.clear();
        lock(&self.free).push(grid);
        self.counters.returns.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of grids waiting on the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        lock(&self.free).len()
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }
}

// ─── Chunk ───────────────────────────────────────────────────────────────────

/// A run of consecutive characters on one row that share a changed flag
/// and, when changed, a style.
#[derive(Debug, Clone)]
pub struct Chunk {
    text: String,
    len: usize,
    max_width: usize,
    pub fg: Rgb,
    pub bg: Rgb,
    pub underline: bool,
    pub changed: bool,
}

impl Chunk {
    /// An empty chunk able to hold one full row of `max_width` cells.
    #[must_use]
    pub fn new(max_width: usize) -> Self {
        Self {
            text: String::with_capacity(max_width),
            len: 0,
            max_width,
            fg: Rgb::default(),
            bg: Rgb::default(),
            underline: false,
            changed: false,
        }
    }

    /// Start the chunk at `cell`: take its style and changed flag.
    pub fn seed(&mut self, cell: &Cell, changed: bool) {
        self.clear();
        self.fg = cell.fg;
        self.bg = cell.bg;
        self.underline = cell.underline;
        self.changed = changed;
        self.push(cell.ch);
    }

    #[inline]
    pub fn push(&mut self, ch: char) {
        debug_assert!(self.len < self.max_width, "chunk overflow");
        self.text.push(ch);
        self.len += 1;
    }

    /// Number of cells in the chunk.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub const fn max_width(&self) -> usize {
        self.max_width
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Reset to empty, keeping the allocation.
    pub fn clear(&mut self) {
        self.text.clear();
        self.len = 0;
        self.fg = Rgb::default();
        self.bg = Rgb::default();
        self.underline = false;
        self.changed = false;
    }
}

// ─── ChunkPool ───────────────────────────────────────────────────────────────

/// Free lists of chunks keyed by their exact width.
#[derive(Debug, Default)]
pub struct ChunkPool {
    free: Mutex<HashMap<usize, Vec<Chunk>>>,
    counters: Counters,
}

impl ChunkPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rent an empty chunk of exactly `width` capacity.
    #[must_use]
    pub fn rent(&self, width: usize) -> Chunk {
        let reused = lock(&self.free).get_mut(&width).and_then(Vec::pop);
        if let Some(chunk) = reused {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            chunk
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            trace!("chunk pool miss: allocating width {width}");
            Chunk::new(width)
        }
    }

    /// Hand a chunk back under its own width.
    pub fn give_back(&self, mut chunk: Chunk) {
        chunk.clear();
        lock(&self.free)
            .entry(chunk.max_width)
            .or_default()
            .push(chunk);
        self.counters.returns.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of free chunks of exactly `width`.
    #[must_use]
    pub fn free_count(&self, width: usize) -> usize {
        lock(&self.free).get(&width).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    // ── PixelPool ───────────────────────────────────────────────────────

    #[test]
    fn empty_pool_allocates() {
        let pool = PixelPool::new();
        let grid = pool.rent(6);
        assert_eq!(grid.len(), 6);
        assert!(grid.iter().all(|p| *p == Pixel::BLANK));
        assert_eq!(pool.stats().misses, 1);
        assert_eq!(pool.stats().hits, 0);
    }

    #[test]
    fn returned_grid_is_reused_and_reset() {
        let pool = PixelPool::new();
        let mut grid = pool.rent(10);
        grid[3].value = Cell::new('x');
        grid[3].commit();
        pool.give_back(grid);

        let grid = pool.rent(8);
        assert_eq!(pool.stats().hits, 1);
        assert_eq!(grid.len(), 8);
        assert!(grid.iter().all(|p| *p == Pixel::BLANK));
    }

    #[test]
    fn too_small_grid_is_not_reused() {
        let pool = PixelPool::new();
        pool.give_back(pool.rent(4));
        let grid = pool.rent(100);
        assert_eq!(grid.len(), 100);
        assert_eq!(pool.stats().hits, 0);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn best_fit_grid_is_chosen() {
        let pool = PixelPool::new();
        pool.give_back(Vec::with_capacity(1000));
        pool.give_back(Vec::with_capacity(50));
        let grid = pool.rent(40);
        assert!(grid.capacity() < 1000);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn zero_length_rent_skips_pool() {
        let pool = PixelPool::new();
        assert!(pool.rent(0).is_empty());
        assert_eq!(pool.stats(), PoolStats::default());
    }

    #[test]
    fn concurrent_rent_and_return() {
        let pool = Arc::new(PixelPool::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let g = pool.rent(64);
                        pool.give_back(g);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let stats = pool.stats();
        assert_eq!(stats.hits + stats.misses, 400);
        assert_eq!(stats.returns, 400);
    }

    #[test]
    fn hit_rate() {
        let stats = PoolStats {
            hits: 3,
            misses: 1,
            returns: 0,
        };
        assert!((stats.hit_rate() - 75.0).abs() < f64::EPSILON);
        assert!(PoolStats::default().hit_rate().abs() < f64::EPSILON);
    }

    // ── Chunk ───────────────────────────────────────────────────────────

    #[test]
    fn chunk_seed_takes_style() {
        let mut chunk = Chunk::new(10);
        let cell = Cell::styled('a', Rgb::RED, Rgb::BLUE).with_underline(true);
        chunk.seed(&cell, true);
        chunk.push('b');
        assert_eq!(chunk.as_str(), "ab");
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.fg, Rgb::RED);
        assert_eq!(chunk.bg, Rgb::BLUE);
        assert!(chunk.underline);
        assert!(chunk.changed);
    }

    #[test]
    fn chunk_len_counts_cells_not_bytes() {
        let mut chunk = Chunk::new(4);
        chunk.push('█');
        chunk.push('é');
        assert_eq!(chunk.len(), 2);
        assert!(chunk.as_str().len() > 2);
    }

    #[test]
    fn chunk_clear_resets() {
        let mut chunk = Chunk::new(3);
        chunk.seed(&Cell::new('z'), true);
        chunk.clear();
        assert!(chunk.is_empty());
        assert_eq!(chunk.as_str(), "");
        assert!(!chunk.changed);
    }

    // ── ChunkPool ───────────────────────────────────────────────────────

    #[test]
    fn chunks_reused_only_within_width() {
        let pool = ChunkPool::new();
        let mut c = pool.rent(80);
        c.push('x');
        pool.give_back(c);

        assert_eq!(pool.free_count(80), 1);
        let other = pool.rent(120);
        assert_eq!(other.max_width(), 120);
        assert_eq!(pool.free_count(80), 1);

        let same = pool.rent(80);
        assert_eq!(same.max_width(), 80);
        assert!(same.is_empty());
        assert_eq!(pool.free_count(80), 0);
        assert_eq!(pool.stats().hits, 1);
        assert_eq!(pool.stats().misses, 2);
    }
}
