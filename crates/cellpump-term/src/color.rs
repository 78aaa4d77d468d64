// SPDX-License-Identifier: MIT
//
// Rgb — the 24-bit color stored in every cell.
//
// Cells carry plain sRGB triples. The true-color compositor writes them
// verbatim as `38;2` / `48;2` escapes; the legacy compositor hands them to
// the console, which may downgrade to the 16-color palette a classic
// console understands (see `nearest_ansi16`).
//
// Default colors follow the classic console: light gray on black.

use std::fmt;

// ─── Rgb ─────────────────────────────────────────────────────────────────────

/// A 24-bit sRGB color.
///
/// # Examples
///
/// ```
/// use cellpump_term::color::Rgb;
///
/// let orange = Rgb::hex("#ff8800").unwrap();
/// assert_eq!(orange, Rgb::new(255, 136, 0));
/// assert_eq!(orange.to_string(), "#ff8800");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    #[inline]
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RGB` or `#RRGGBB` (the `#` is optional).
    ///
    /// Returns `None` for anything else.
    #[must_use]
    pub fn hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix('#').unwrap_or(s);
        if !s.is_ascii() {
            return None;
        }
        match s.len() {
            3 => {
                let mut it = s.chars().map(|c| c.to_digit(16));
                let r = it.next()??;
                let g = it.next()??;
                let b = it.next()??;
                // 0xF → 0xFF: each nibble is duplicated.
                #[allow(clippy::cast_possible_truncation)]
                Some(Self::new((r * 17) as u8, (g * 17) as u8, (b * 17) as u8))
            }
            6 => {
                let r = u8::from_str_radix(&s[0..2], 16).ok()?;
                let g = u8::from_str_radix(&s[2..4], 16).ok()?;
                let b = u8::from_str_radix(&s[4..6], 16).ok()?;
                Some(Self::new(r, g, b))
            }
            _ => None,
        }
    }

    /// Squared euclidean distance in RGB space.
    #[must_use]
    pub fn distance_sq(self, other: Self) -> u32 {
        let d = |a: u8, b: u8| {
            let d = i32::from(a) - i32::from(b);
            d.unsigned_abs() * d.unsigned_abs()
        };
        d(self.r, other.r) + d(self.g, other.g) + d(self.b, other.b)
    }

    /// Index (0–15) of the closest classic console color.
    #[must_use]
    pub fn nearest_ansi16(self) -> u8 {
        let mut best = 0u8;
        let mut best_dist = u32::MAX;
        for (idx, &(r, g, b)) in ANSI16_RGB.iter().enumerate() {
            let dist = self.distance_sq(Self::new(r, g, b));
            if dist < best_dist {
                best_dist = dist;
                // 16 entries, always fits.
                #[allow(clippy::cast_possible_truncation)]
                {
                    best = idx as u8;
                }
            }
        }
        best
    }

    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const DARK_BLUE: Self = Self::new(0, 0, 128);
    pub const DARK_GREEN: Self = Self::new(0, 128, 0);
    pub const DARK_CYAN: Self = Self::new(0, 128, 128);
    pub const DARK_RED: Self = Self::new(128, 0, 0);
    pub const DARK_MAGENTA: Self = Self::new(128, 0, 128);
    pub const DARK_YELLOW: Self = Self::new(128, 128, 0);
    pub const GRAY: Self = Self::new(192, 192, 192);
    pub const DARK_GRAY: Self = Self::new(128, 128, 128);
    pub const BLUE: Self = Self::new(0, 0, 255);
    pub const GREEN: Self = Self::new(0, 255, 0);
    pub const CYAN: Self = Self::new(0, 255, 255);
    pub const RED: Self = Self::new(255, 0, 0);
    pub const MAGENTA: Self = Self::new(255, 0, 255);
    pub const YELLOW: Self = Self::new(255, 255, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<(u8, u8, u8)> for Rgb {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

/// Foreground of a blank cell.
pub const DEFAULT_FG: Rgb = Rgb::GRAY;

/// Background of a blank cell.
pub const DEFAULT_BG: Rgb = Rgb::BLACK;

/// The 16 classic console colors, in SGR order (30–37, then 90–97).
pub const ANSI16_RGB: [(u8, u8, u8); 16] = [
    (0, 0, 0),       // 0: Black
    (128, 0, 0),     // 1: Red
    (0, 128, 0),     // 2: Green
    (128, 128, 0),   // 3: Yellow
    (0, 0, 128),     // 4: Blue
    (128, 0, 128),   // 5: Magenta
    (0, 128, 128),   // 6: Cyan
    (192, 192, 192), // 7: White
    (128, 128, 128), // 8: Bright Black
    (255, 0, 0),     // 9: Bright Red
    (0, 255, 0),     // 10: Bright Green
    (255, 255, 0),   // 11: Bright Yellow
    (0, 0, 255),     // 12: Bright Blue
    (255, 0, 255),   // 13: Bright Magenta
    (0, 255, 255),   // 14: Bright Cyan
    (255, 255, 255), // 15: Bright White
];

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_long_form() {
        assert_eq!(Rgb::hex("#102030"), Some(Rgb::new(0x10, 0x20, 0x30)));
        assert_eq!(Rgb::hex("a0b0c0"), Some(Rgb::new(0xa0, 0xb0, 0xc0)));
    }

    #[test]
    fn hex_short_form_duplicates_nibbles() {
        assert_eq!(Rgb::hex("#fa0"), Some(Rgb::new(0xff, 0xaa, 0x00)));
    }

    #[test]
    fn hex_rejects_garbage() {
        assert_eq!(Rgb::hex(""), None);
        assert_eq!(Rgb::hex("#12345"), None);
        assert_eq!(Rgb::hex("#gg0000"), None);
        assert_eq!(Rgb::hex("#ü0000"), None);
    }

    #[test]
    fn display_round_trips_through_hex() {
        let c = Rgb::new(1, 254, 128);
        assert_eq!(Rgb::hex(&c.to_string()), Some(c));
    }

    #[test]
    fn nearest_ansi16_exact_palette_entries() {
        for (idx, &(r, g, b)) in ANSI16_RGB.iter().enumerate() {
            assert_eq!(usize::from(Rgb::new(r, g, b).nearest_ansi16()), idx);
        }
    }

    #[test]
    fn nearest_ansi16_approximates() {
        assert_eq!(Rgb::new(250, 10, 10).nearest_ansi16(), 9);
        assert_eq!(Rgb::new(20, 20, 20).nearest_ansi16(), 0);
    }

    #[test]
    fn defaults_are_gray_on_black() {
        assert_eq!(DEFAULT_FG, Rgb::GRAY);
        assert_eq!(DEFAULT_BG, Rgb::BLACK);
    }
}
