// SPDX-License-Identifier: MIT
//
// Canvas — a control's window onto the frame buffer.
//
// Coordinates are relative to the node being painted. Everything is
// clipped to the node's visible area (its own rectangle intersected with
// every ancestor's), so a control cannot scribble over its siblings.

use cellpump_term::color::{DEFAULT_BG, DEFAULT_FG};
use cellpump_term::{Cell, FrameBuffer, Rgb};
use unicode_width::UnicodeWidthChar;

/// Absolute, clipped drawing surface for one node.
pub struct Canvas<'a> {
    buf: &'a mut FrameBuffer,
    origin: (i32, i32),
    size: (u16, u16),
    clip: (i32, i32, i32, i32),
    focused: bool,
}

impl<'a> Canvas<'a> {
    /// `origin` is the node's absolute top-left, `size` its full size and
    /// `clip` the visible absolute area as `(x0, y0, x1, y1)`, exclusive.
    pub(crate) const fn new(
        buf: &'a mut FrameBuffer,
        origin: (i32, i32),
        size: (u16, u16),
        clip: (i32, i32, i32, i32),
        focused: bool,
    ) -> Self {
        Self {
            buf,
            origin,
            size,
            clip,
            focused,
        }
    }

    #[inline]
    #[must_use]
    pub const fn width(&self) -> u16 {
        self.size.0
    }

    #[inline]
    #[must_use]
    pub const fn height(&self) -> u16 {
        self.size.1
    }

    /// Whether the node being painted has focus.
    #[inline]
    #[must_use]
    pub const fn is_focused(&self) -> bool {
        self.focused
    }

    fn visible(&self, ax: i32, ay: i32) -> bool {
        let (x0, y0, x1, y1) = self.clip;
        ax >= x0 && ax < x1 && ay >= y0 && ay < y1
    }

    /// Set one cell. Outside the visible area it is dropped.
    pub fn put(&mut self, x: i32, y: i32, cell: Cell) {
        let (ax, ay) = (self.origin.0 + x, self.origin.1 + y);
        if self.visible(ax, ay) {
            self.buf.draw_point_with(cell, ax, ay);
        }
    }

    /// The cell currently at `(x, y)`, if visible.
    #[must_use]
    pub fn get(&self, x: i32, y: i32) -> Option<Cell> {
        let (ax, ay) = (self.origin.0 + x, self.origin.1 + y);
        if self.visible(ax, ay) {
            self.buf.get(ax, ay)
        } else {
            None
        }
    }

    /// Fill the whole node with `cell`.
    pub fn fill(&mut self, cell: Cell) {
        self.fill_rect(cell, 0, 0, i32::from(self.size.0), i32::from(self.size.1));
    }

    pub fn fill_rect(&mut self, cell: Cell, x: i32, y: i32, w: i32, h: i32) {
        let (x0, y0, x1, y1) = self.clip;
        let ax0 = (self.origin.0 + x).max(x0);
        let ay0 = (self.origin.1 + y).max(y0);
        let ax1 = (self.origin.0 + x + w).min(x1);
        let ay1 = (self.origin.1 + y + h).min(y1);
        if ax1 > ax0 && ay1 > ay0 {
            self.buf.fill_rect_with(cell, ax0, ay0, ax1 - ax0, ay1 - ay0);
        }
    }

    /// Unfilled border around `x, y, w, h`.
    pub fn draw_rect(&mut self, cell: Cell, x: i32, y: i32, w: i32, h: i32) {
        if w <= 0 || h <= 0 {
            return;
        }
        for dx in 0..w {
            self.put(x + dx, y, cell);
            self.put(x + dx, y + h - 1, cell);
        }
        for dy in 0..h {
            self.put(x, y + dy, cell);
            self.put(x + w - 1, y + dy, cell);
        }
    }

    /// Draw `text` in `fg` on `bg`, left to right. `'\n'` returns to
    /// column `x` on the next row.
    pub fn draw_text(&mut self, text: &str, x: i32, y: i32, fg: Rgb, bg: Rgb) {
        let (mut cx, mut cy) = (x, y);
        for ch in text.chars() {
            match ch {
                '\n' => {
                    cx = x;
                    cy += 1;
                }
                '\r' => {}
                c if c.width().unwrap_or(0) == 0 => {}
                c => {
                    self.put(cx, cy, Cell::styled(c, fg, bg));
                    cx += 1;
                }
            }
        }
    }

    /// [`draw_text`](Self::draw_text) in the default colors.
    pub fn draw_string(&mut self, text: &str, x: i32, y: i32) {
        self.draw_text(text, x, y, DEFAULT_FG, DEFAULT_BG);
    }

    /// Draw pre-styled cells left to right.
    pub fn draw_cells(&mut self, cells: &[Cell], x: i32, y: i32) {
        for (dx, &cell) in (0..).zip(cells) {
            self.put(x + dx, y, cell);
        }
    }

    /// A line between two points with the frame buffer's sampling, clipped
    /// to the node.
    pub fn draw_line(&mut self, cell: Cell, x1: i32, y1: i32, x2: i32, y2: i32) {
        let mut points = Vec::new();
        let (ox, oy) = self.origin;
        cellpump_term::line::define_line(ox + x1, oy + y1, ox + x2, oy + y2, &mut points);
        for p in points {
            if self.visible(p.x, p.y) {
                self.buf.draw_point_with(cell, p.x, p.y);
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn draws_relative_to_origin() {
        let mut buf = FrameBuffer::new(6, 2);
        {
            let mut c = Canvas::new(&mut buf, (2, 1), (3, 1), (2, 1, 5, 2), false);
            c.draw_string("ab", 0, 0);
        }
        assert_eq!(buf.row_text(1), "  ab  ");
    }

    #[test]
    fn clips_to_visible_area() {
        let mut buf = FrameBuffer::new(6, 1);
        {
            let mut c = Canvas::new(&mut buf, (1, 0), (10, 1), (1, 0, 4, 1), false);
            c.draw_string("abcdef", 0, 0);
            c.put(-1, 0, Cell::new('!'));
        }
        assert_eq!(buf.row_text(0), " abc  ");
    }

    #[test]
    fn fill_and_border() {
        let mut buf = FrameBuffer::new(4, 3);
        {
            let mut c = Canvas::new(&mut buf, (0, 0), (4, 3), (0, 0, 4, 3), true);
            assert!(c.is_focused());
            c.fill(Cell::new('.'));
            c.draw_rect(Cell::new('#'), 0, 0, 4, 3);
        }
        assert_eq!(buf.to_text(false), "####\n#..#\n####");
    }

    #[test]
    fn fill_rect_outside_clip_is_noop() {
        let mut buf = FrameBuffer::new(4, 1);
        {
            let mut c = Canvas::new(&mut buf, (0, 0), (2, 1), (0, 0, 2, 1), false);
            c.fill_rect(Cell::new('x'), 3, 0, 2, 1);
            assert_eq!(c.get(3, 0), None);
        }
        assert_eq!(buf.row_text(0), "    ");
    }

    #[test]
    fn line_is_clipped() {
        let mut buf = FrameBuffer::new(5, 1);
        {
            let mut c = Canvas::new(&mut buf, (0, 0), (5, 1), (0, 0, 3, 1), false);
            c.draw_line(Cell::new('-'), 0, 0, 5, 0);
        }
        assert_eq!(buf.row_text(0), "---  ");
    }
}
