// SPDX-License-Identifier: MIT
//
// FrameBuffer — the in-memory cell grid everything paints into.
//
// A frame buffer is a width × height grid of pixels in row-major order
// (`index = y * width + x`). Drawing primitives write the current value of
// pixels; the compositor later compares each value against the pixel's
// last-drawn shadow and sends only the differences to the terminal.
//
// Coordinates are `i32` so callers can draw partially off-screen shapes and
// let the checked primitives clip them. The `_unchecked` primitives skip
// bounds checks and panic on out-of-range input; they exist for hot loops
// that already know their coordinates are valid.
//
// Text is clipped, never shifted: a character that lands outside the
// buffer is dropped but still advances the pen, so a string starting left
// of column 0 shows only its tail, at the columns it would have occupied.
//
// Most primitives draw with the buffer's pen. The `*_with` variants take a
// temporary pen and restore the previous one on return, even if drawing
// unwinds.
//
// Pixel storage is rented from a `PixelPool` and handed back on resize and
// on drop, so a long-running app that resizes or clones buffers keeps
// reusing the same allocations.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use unicode_width::UnicodeWidthChar;

use crate::cell::{Cell, Pixel};
use crate::color::Rgb;
use crate::line::{Point, define_line};
use crate::pool::PixelPool;

/// The default pen: an asterisk in the default colors.
pub const DEFAULT_PEN: Cell = Cell::new('*');

// ─── FrameBuffer ─────────────────────────────────────────────────────────────

/// A 2D grid of pixels with a pen and pooled storage.
///
/// # Examples
///
/// ```
/// use cellpump_term::buffer::FrameBuffer;
/// use cellpump_term::cell::Cell;
///
/// let mut buf = FrameBuffer::new(10, 3);
/// buf.set_pen(Cell::new('#'));
/// buf.fill_rect(0, 0, 10, 3);
/// buf.draw_string("hi", 2, 1, false);
/// assert_eq!(buf.row_text(1), "##hi######");
/// ```
pub struct FrameBuffer {
    width: u16,
    height: u16,
    pixels: Vec<Pixel>,
    pen: Cell,
    pool: Arc<PixelPool>,
    /// Reused by `draw_line` so drawing lines never allocates.
    line_scratch: Vec<Point>,
}

impl FrameBuffer {
    /// Create a blank buffer backed by its own pixel pool.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self::with_pool(width, height, Arc::new(PixelPool::new()))
    }

    /// Create a blank buffer that rents its storage from `pool`.
    #[must_use]
    pub fn with_pool(width: u16, height: u16, pool: Arc<PixelPool>) -> Self {
        let pixels = pool.rent(usize::from(width) * usize::from(height));
        Self {
            width,
            height,
            pixels,
            pen: DEFAULT_PEN,
            pool,
            line_scratch: Vec::new(),
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub const fn width(&self) -> u16 {
        self.width
    }

    #[inline]
    #[must_use]
    pub const fn height(&self) -> u16 {
        self.height
    }

    /// The pen used by primitives that do not take an explicit cell.
    #[inline]
    #[must_use]
    pub const fn pen(&self) -> Cell {
        self.pen
    }

    #[inline]
    pub const fn set_pen(&mut self, pen: Cell) {
        self.pen = pen;
    }

    /// The pool this buffer rents its storage from.
    #[must_use]
    pub fn pool(&self) -> &Arc<PixelPool> {
        &self.pool
    }

    /// Whether `(x, y)` lies inside the buffer.
    #[inline]
    #[must_use]
    pub fn is_in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < i32::from(self.width) && y < i32::from(self.height)
    }

    /// Flat index of an in-bounds coordinate.
    #[inline]
    #[allow(clippy::cast_sign_loss)]
    fn index(&self, x: i32, y: i32) -> usize {
        y as usize * usize::from(self.width) + x as usize
    }

    /// The pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> &Pixel {
        assert!(
            self.is_in_bounds(x, y),
            "pixel ({x}, {y}) outside {}x{} buffer",
            self.width,
            self.height
        );
        &self.pixels[self.index(x, y)]
    }

    /// The current cell at `(x, y)`, or `None` if out of bounds.
    #[must_use]
    pub fn get(&self, x: i32, y: i32) -> Option<Cell> {
        self.is_in_bounds(x, y)
            .then(|| self.pixels[self.index(x, y)].value)
    }

    /// All pixels, row-major.
    #[inline]
    #[must_use]
    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    /// One row of pixels. Returns `None` if `y` is out of bounds.
    #[must_use]
    pub fn row(&self, y: u16) -> Option<&[Pixel]> {
        (y < self.height).then(|| {
            let w = usize::from(self.width);
            let start = usize::from(y) * w;
            &self.pixels[start..start + w]
        })
    }

    /// Mark every pixel as matching what the terminal shows.
    ///
    /// Called by the compositor after a successful write pass.
    pub fn commit(&mut self) {
        for p in &mut self.pixels {
            p.commit();
        }
    }

    /// Forget the last-drawn shadow so the next paint rewrites everything.
    pub fn invalidate(&mut self) {
        for p in &mut self.pixels {
            p.invalidate();
        }
    }

    // ─── Pen scoping ─────────────────────────────────────────────────────

    /// Swap in `pen` until the returned guard is dropped.
    ///
    /// The guard derefs to the buffer, so any primitive can be called
    /// through it. The previous pen comes back on drop, including during
    /// unwinding.
    pub fn scoped_pen(&mut self, pen: Cell) -> PenGuard<'_> {
        let saved = std::mem::replace(&mut self.pen, pen);
        PenGuard { buf: self, saved }
    }

    // ─── Rectangles ──────────────────────────────────────────────────────

    /// Clip `x, y, w, h` to the buffer, returning `(x0, y0, x1, y1)` with
    /// exclusive far edges, or `None` if nothing is visible.
    fn clip(&self, x: i32, y: i32, w: i32, h: i32) -> Option<(i32, i32, i32, i32)> {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(w).min(i32::from(self.width));
        let y1 = y.saturating_add(h).min(i32::from(self.height));
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }

    /// Fill a rectangle with the pen, clipped to the buffer.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32) {
        if let Some((x0, y0, x1, y1)) = self.clip(x, y, w, h) {
            self.fill_span(x0, y0, x1, y1);
        }
    }

    /// Fill a rectangle with the pen without clipping.
    ///
    /// # Panics
    ///
    /// Panics if any part of the rectangle lies outside the buffer.
    pub fn fill_rect_unchecked(&mut self, x: i32, y: i32, w: i32, h: i32) {
        let (x1, y1) = (x + w, y + h);
        assert!(
            x >= 0 && y >= 0 && x1 <= i32::from(self.width) && y1 <= i32::from(self.height),
            "rect ({x}, {y}, {w}, {h}) outside {}x{} buffer",
            self.width,
            self.height
        );
        self.fill_span(x, y, x1, y1);
    }

    fn fill_span(&mut self, x0: i32, y0: i32, x1: i32, y1: i32) {
        if x1 <= x0 || y1 <= y0 {
            return;
        }
        let pen = self.pen;
        for row in y0..y1 {
            let start = self.index(x0, row);
            let end = self.index(x1 - 1, row) + 1;
            for p in &mut self.pixels[start..end] {
                p.value = pen;
            }
        }
    }

    /// Fill a rectangle with an explicit cell.
    pub fn fill_rect_with(&mut self, cell: Cell, x: i32, y: i32, w: i32, h: i32) {
        self.scoped_pen(cell).fill_rect(x, y, w, h);
    }

    /// Paint the whole buffer as spaces on `bg`.
    pub fn fill_with_color(&mut self, bg: Rgb) {
        let (w, h) = (i32::from(self.width), i32::from(self.height));
        self.fill_rect_with(Cell::background(bg), 0, 0, w, h);
    }

    /// Draw the border of a rectangle with the pen, clipped to the buffer.
    ///
    /// A border that sticks out of the buffer is pulled in: its edges land on
    /// the outermost visible column and row.
    pub fn draw_rect(&mut self, x: i32, y: i32, w: i32, h: i32) {
        let Some((x0, y0, x1, y1)) = self.clip(x, y, w, h) else {
            return;
        };
        let (right, bottom) = (x1 - 1, y1 - 1);
        let pen = self.pen;
        for row in y0..y1 {
            self.put(x0, row, pen);
            self.put(right, row, pen);
        }
        for col in x0..x1 {
            self.put(col, y0, pen);
            self.put(col, bottom, pen);
        }
    }

    /// Draw the border of a rectangle with an explicit cell.
    pub fn draw_rect_with(&mut self, cell: Cell, x: i32, y: i32, w: i32, h: i32) {
        self.scoped_pen(cell).draw_rect(x, y, w, h);
    }

    // ─── Points & lines ──────────────────────────────────────────────────

    #[inline]
    fn put(&mut self, x: i32, y: i32, cell: Cell) {
        let idx = self.index(x, y);
        self.pixels[idx].value = cell;
    }

    /// Draw one pen cell if `(x, y)` is in bounds.
    #[inline]
    pub fn draw_point(&mut self, x: i32, y: i32) {
        if self.is_in_bounds(x, y) {
            self.put(x, y, self.pen);
        }
    }

    /// Draw one pen cell without a bounds check.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    #[inline]
    pub fn draw_point_unchecked(&mut self, x: i32, y: i32) {
        assert!(
            self.is_in_bounds(x, y),
            "point ({x}, {y}) outside {}x{} buffer",
            self.width,
            self.height
        );
        self.put(x, y, self.pen);
    }

    pub fn draw_point_with(&mut self, cell: Cell, x: i32, y: i32) {
        self.scoped_pen(cell).draw_point(x, y);
    }

    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn draw_point_unchecked_with(&mut self, cell: Cell, x: i32, y: i32) {
        self.scoped_pen(cell).draw_point_unchecked(x, y);
    }

    /// Draw the segment `(x1, y1) → (x2, y2)` with the pen, clipped.
    ///
    /// The far endpoint is not drawn; see [`define_line`].
    pub fn draw_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32) {
        let mut pts = std::mem::take(&mut self.line_scratch);
        define_line(x1, y1, x2, y2, &mut pts);
        for p in &pts {
            self.draw_point(p.x, p.y);
        }
        self.line_scratch = pts;
    }

    pub fn draw_line_with(&mut self, cell: Cell, x1: i32, y1: i32, x2: i32, y2: i32) {
        self.scoped_pen(cell).draw_line(x1, y1, x2, y2);
    }

    // ─── Text ────────────────────────────────────────────────────────────

    /// Draw `text` in the default colors starting at `(x, y)`.
    ///
    /// `'\n'` moves to the next row and back to the start column, `'\r'` is
    /// ignored, and zero-width characters are dropped. Characters that fall
    /// outside the buffer are skipped but still advance the cursor.
    pub fn draw_string(&mut self, text: &str, x: i32, y: i32, vertical: bool) {
        self.draw_glyphs(text.chars().map(Cell::new), x, y, vertical);
    }

    /// Draw pre-styled cells with the same layout rules as [`draw_string`].
    ///
    /// [`draw_string`]: Self::draw_string
    pub fn draw_cells(&mut self, cells: &[Cell], x: i32, y: i32, vertical: bool) {
        self.draw_glyphs(cells.iter().copied(), x, y, vertical);
    }

    fn draw_glyphs(&mut self, cells: impl Iterator<Item = Cell>, x: i32, y: i32, vertical: bool) {
        let (mut cx, mut cy) = (x, y);
        for cell in cells {
            match cell.ch {
                '\n' => {
                    cy += 1;
                    cx = x;
                    continue;
                }
                '\r' => continue,
                ch if ch.width().unwrap_or(0) == 0 => continue,
                _ => {}
            }
            if self.is_in_bounds(cx, cy) {
                self.put(cx, cy, cell);
            }
            if vertical {
                cy += 1;
            } else {
                cx += 1;
            }
        }
    }

    // ─── Resize & copy ───────────────────────────────────────────────────

    /// Change the dimensions, keeping the cells that still fit.
    ///
    /// New cells are blank. The whole buffer is invalidated, so the next
    /// paint rewrites every cell. The old storage goes back to the pool.
    pub fn resize(&mut self, width: u16, height: u16) {
        let mut next = self.pool.rent(usize::from(width) * usize::from(height));
        let keep_w = usize::from(self.width.min(width));
        for y in 0..usize::from(self.height.min(height)) {
            let src = y * usize::from(self.width);
            let dst = y * usize::from(width);
            for x in 0..keep_w {
                next[dst + x] = Pixel::new(self.pixels[src + x].value);
            }
        }
        let old = std::mem::replace(&mut self.pixels, next);
        self.pool.give_back(old);
        self.width = width;
        self.height = height;
        self.invalidate();
    }

    /// Draw every cell of this buffer into `target` at the same position.
    ///
    /// Cells that do not fit in `target` are clipped. `target` keeps its
    /// size, pen and shadow.
    pub fn clone_to(&self, target: &mut Self) {
        let w = usize::from(self.width);
        for (i, p) in self.pixels.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let (x, y) = ((i % w) as i32, (i / w) as i32);
            if target.is_in_bounds(x, y) {
                target.put(x, y, p.value);
            }
        }
    }

    // ─── Text export ─────────────────────────────────────────────────────

    /// The characters of row `y` as a string. Empty if out of bounds.
    #[must_use]
    pub fn row_text(&self, y: u16) -> String {
        self.row(y)
            .map(|r| r.iter().map(|p| p.value.ch).collect())
            .unwrap_or_default()
    }

    /// The whole grid as text, one line per row.
    ///
    /// With `trim`, trailing whitespace is removed from every row.
    #[must_use]
    pub fn to_text(&self, trim: bool) -> String {
        let mut out = String::with_capacity(self.pixels.len() + usize::from(self.height));
        for y in 0..self.height {
            if y > 0 {
                out.push('\n');
            }
            let row = self.row_text(y);
            out.push_str(if trim { row.trim_end() } else { &row });
        }
        out
    }
}

impl Clone for FrameBuffer {
    /// A deep copy with a fresh shadow, sharing the pool.
    fn clone(&self) -> Self {
        let mut pixels = self.pool.rent(self.pixels.len());
        for (dst, src) in pixels.iter_mut().zip(&self.pixels) {
            *dst = Pixel::new(src.value);
        }
        Self {
            width: self.width,
            height: self.height,
            pixels,
            pen: self.pen,
            pool: Arc::clone(&self.pool),
            line_scratch: Vec::new(),
        }
    }
}

/// Equal when both buffers have the same size and characters. Colors and
/// underline are not compared.
impl PartialEq for FrameBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self
                .pixels
                .iter()
                .zip(&other.pixels)
                .all(|(a, b)| a.value.ch == b.value.ch)
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pen", &self.pen)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text(false))
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.pixels));
    }
}

// ─── PenGuard ────────────────────────────────────────────────────────────────

/// Restores a buffer's previous pen when dropped. See
/// [`FrameBuffer::scoped_pen`].
pub struct PenGuard<'a> {
    buf: &'a mut FrameBuffer,
    saved: Cell,
}

impl Deref for PenGuard<'_> {
    type Target = FrameBuffer;

    fn deref(&self) -> &FrameBuffer {
        self.buf
    }
}

impl DerefMut for PenGuard<'_> {
    fn deref_mut(&mut self) -> &mut FrameBuffer {
        self.buf
    }
}

impl Drop for PenGuard<'_> {
    fn drop(&mut self) {
        self.buf.pen = self.saved;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
