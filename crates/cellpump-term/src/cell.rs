// SPDX-License-Identifier: MIT
//
// Cell and Pixel — the atoms of rendering.
//
// A `Cell` is a value: one character, its foreground and background color,
// and an underline flag. Two cells are equal only if every field matches,
// which is exactly the comparison the compositor performs per frame.
//
// A `Pixel` is the stored form of a cell inside a frame buffer. Besides the
// current value it remembers what the compositor last wrote to the physical
// terminal at that position (`None` = never painted). Drawing only touches
// `value`; only the compositor touches `last_drawn`.

use crate::color::{DEFAULT_BG, DEFAULT_FG, Rgb};

// ─── Cell ────────────────────────────────────────────────────────────────────

/// One character position: character, colors, underline.
///
/// # Examples
///
/// ```
/// use cellpump_term::cell::Cell;
/// use cellpump_term::color::Rgb;
///
/// let warn = Cell::styled('!', Rgb::YELLOW, Rgb::BLACK).with_underline(true);
/// assert!(warn.underline);
/// assert_ne!(warn, Cell::new('!'));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub ch: char,
    pub fg: Rgb,
    pub bg: Rgb,
    pub underline: bool,
}

impl Cell {
    /// A space in the default colors.
    pub const BLANK: Self = Self::new(' ');

    /// A character in the default colors.
    #[inline]
    #[must_use]
    pub const fn new(ch: char) -> Self {
        Self {
            ch,
            fg: DEFAULT_FG,
            bg: DEFAULT_BG,
            underline: false,
        }
    }

    /// A character with explicit colors, not underlined.
    #[inline]
    #[must_use]
    pub const fn styled(ch: char, fg: Rgb, bg: Rgb) -> Self {
        Self {
            ch,
            fg,
            bg,
            underline: false,
        }
    }

    /// A space painted in `bg`. Used to fill areas with a solid color.
    #[inline]
    #[must_use]
    pub const fn background(bg: Rgb) -> Self {
        Self::styled(' ', DEFAULT_FG, bg)
    }

    #[inline]
    #[must_use]
    pub const fn with_fg(self, fg: Rgb) -> Self {
        Self { fg, ..self }
    }

    #[inline]
    #[must_use]
    pub const fn with_bg(self, bg: Rgb) -> Self {
        Self { bg, ..self }
    }

    #[inline]
    #[must_use]
    pub const fn with_underline(self, underline: bool) -> Self {
        Self { underline, ..self }
    }

    /// Whether `other` renders with the same colors and underline.
    #[inline]
    #[must_use]
    pub fn same_style(&self, other: &Self) -> bool {
        self.fg == other.fg && self.bg == other.bg && self.underline == other.underline
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::BLANK
    }
}

impl From<char> for Cell {
    fn from(ch: char) -> Self {
        Self::new(ch)
    }
}

// ─── Pixel ───────────────────────────────────────────────────────────────────

/// A cell as stored in a frame buffer, paired with its last-drawn shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pixel {
    /// What the buffer currently holds.
    pub value: Cell,
    /// What the compositor last wrote here; `None` means never painted.
    pub last_drawn: Option<Cell>,
}

impl Pixel {
    /// A blank pixel that has never been painted.
    pub const BLANK: Self = Self {
        value: Cell::BLANK,
        last_drawn: None,
    };

    #[inline]
    #[must_use]
    pub const fn new(value: Cell) -> Self {
        Self {
            value,
            last_drawn: None,
        }
    }

    /// Whether the terminal is out of date at this position.
    #[inline]
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.last_drawn != Some(self.value)
    }

    /// Record that `value` is now what the terminal shows.
    #[inline]
    pub const fn commit(&mut self) {
        self.last_drawn = Some(self.value);
    }

    /// Forget what the terminal shows, forcing the next paint to write.
    #[inline]
    pub const fn invalidate(&mut self) {
        self.last_drawn = None;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_is_space_in_default_colors() {
        assert_eq!(Cell::BLANK.ch, ' ');
        assert_eq!(Cell::BLANK.fg, DEFAULT_FG);
        assert_eq!(Cell::BLANK.bg, DEFAULT_BG);
        assert!(!Cell::BLANK.underline);
        assert_eq!(Cell::default(), Cell::BLANK);
    }

    #[test]
    fn equality_covers_every_field() {
        let base = Cell::new('a');
        assert_ne!(base, base.with_fg(Rgb::RED));
        assert_ne!(base, base.with_bg(Rgb::RED));
        assert_ne!(base, base.with_underline(true));
        assert_ne!(base, Cell::new('b'));
        assert_eq!(base, Cell::from('a'));
    }

    #[test]
    fn same_style_ignores_character() {
        let a = Cell::styled('a', Rgb::RED, Rgb::BLUE);
        let b = Cell::styled('b', Rgb::RED, Rgb::BLUE);
        assert!(a.same_style(&b));
        assert!(!a.same_style(&b.with_underline(true)));
    }

    #[test]
    fn background_cell_is_a_space() {
        let c = Cell::background(Rgb::DARK_BLUE);
        assert_eq!(c.ch, ' ');
        assert_eq!(c.bg, Rgb::DARK_BLUE);
    }

    // ── Pixel ───────────────────────────────────────────────────────────

    #[test]
    fn new_pixel_is_changed() {
        assert!(Pixel::BLANK.has_changed());
    }

    #[test]
    fn commit_clears_change() {
        let mut p = Pixel::new(Cell::new('x'));
        p.commit();
        assert!(!p.has_changed());
        p.value = Cell::new('y');
        assert!(p.has_changed());
    }

    #[test]
    fn invalidate_forces_change() {
        let mut p = Pixel::BLANK;
        p.commit();
        p.invalidate();
        assert!(p.has_changed());
        assert_eq!(p.last_drawn, None);
    }
}
