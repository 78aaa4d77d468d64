// SPDX-License-Identifier: MIT
//
// Line rasterization.
//
// This is deliberately not Bresenham. Axis-aligned segments enumerate
// integer steps. Diagonal segments walk the dominant axis in fixed half-cell
// steps, compute the other axis on the exact line, round both coordinates
// half-away-from-zero, and keep a point only if it differs from the one
// before it. Existing renders depend on the exact cells this produces, so
// the step and the rounding must not change.
//
// The far endpoint is excluded in every case: a segment from x=0 to x=4
// lights columns 0 through 3 on a horizontal line, and samples stop before
// reaching 4 on a diagonal.

/// Sampling step along the dominant axis, in cells.
///
/// Larger is faster but leaves gaps.
pub const DRAW_PRECISION: f32 = 0.5;

/// An integer cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

/// Round half away from zero, matching `f32::round`.
#[inline]
#[allow(clippy::cast_possible_truncation)]
fn round(v: f32) -> i32 {
    v.round() as i32
}

/// Compute the cells of the segment `(x1, y1) → (x2, y2)` into `out`.
///
/// `out` is cleared first and reused, so callers can keep one scratch
/// vector across many lines. Returns the number of points written.
///
/// # Examples
///
/// ```
/// use cellpump_term::line::{define_line, Point};
///
/// let mut pts = Vec::new();
/// define_line(0, 0, 4, 2, &mut pts);
/// assert_eq!(pts.first(), Some(&Point::new(0, 0)));
/// assert_eq!(pts.last(), Some(&Point::new(4, 2)));
/// ```
#[allow(clippy::cast_precision_loss)]
pub fn define_line(x1: i32, y1: i32, x2: i32, y2: i32, out: &mut Vec<Point>) -> usize {
    out.clear();

    if x1 == x2 {
        out.extend((y1.min(y2)..y1.max(y2)).map(|y| Point::new(x1, y)));
        return out.len();
    }
    if y1 == y2 {
        out.extend((x1.min(x2)..x1.max(x2)).map(|x| Point::new(x, y1)));
        return out.len();
    }

    let (fx1, fy1) = (x1 as f32, y1 as f32);
    let slope = (y2 - y1) as f32 / (x2 - x1) as f32;
    let dx = (x1 - x2).abs();
    let dy = (y1 - y2).abs();

    let mut last: Option<Point> = None;
    let mut push = |p: Point| {
        if last != Some(p) {
            out.push(p);
            last = Some(p);
        }
    };

    if dx >= dy {
        let end = x1.max(x2) as f32;
        let mut x = x1.min(x2) as f32;
        while x < end {
            let y = slope.mul_add(x - fx1, fy1);
            push(Point::new(round(x), round(y)));
            x += DRAW_PRECISION;
        }
    } else {
        let end = y1.max(y2) as f32;
        let mut y = y1.min(y2) as f32;
        while y < end {
            let x = (y - fy1) / slope + fx1;
            push(Point::new(round(x), round(y)));
            y += DRAW_PRECISION;
        }
    }

    out.len()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
