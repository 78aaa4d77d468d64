// SPDX-License-Identifier: MIT
//
// ANSI escape sequence generation.
//
// Pure functions that write escape sequences to any `impl Write`. No state
// and no decisions about when to emit: the compositor decides, this module
// only knows the bytes.
//
// Cursor positions are 0-indexed in our API and converted to the 1-indexed
// form ANSI uses on the wire.
//
// All functions return `io::Result` propagated from the underlying writer.
// Writing into an `OutputBuffer` never fails.

use std::io::{self, Write};

use crate::color::Rgb;

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// Move the cursor to `(x, y)` with CUP.
#[inline]
pub fn cursor_to(w: &mut impl Write, x: u16, y: u16) -> io::Result<()> {
    write!(w, "\x1b[{};{}H", u32::from(y) + 1, u32::from(x) + 1)
}

/// Hide the cursor (DECTCEM reset).
#[inline]
pub fn cursor_hide(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?25l")
}

/// Show the cursor (DECTCEM set).
#[inline]
pub fn cursor_show(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?25h")
}

// ─── Screen ──────────────────────────────────────────────────────────────────

/// Clear the entire screen (ED 2).
#[inline]
pub fn clear_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[2J")
}

/// Reset all SGR attributes to terminal defaults (SGR 0).
#[inline]
pub fn reset(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[0m")
}

/// Switch to the alternate screen buffer.
#[inline]
pub fn enter_alt_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1049h")
}

/// Return to the main screen buffer.
#[inline]
pub fn exit_alt_screen(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[?1049l")
}

// ─── Color ───────────────────────────────────────────────────────────────────

/// 24-bit foreground (`38;2`).
#[inline]
pub fn fg_rgb(w: &mut impl Write, c: Rgb) -> io::Result<()> {
    write!(w, "\x1b[38;2;{};{};{}m", c.r, c.g, c.b)
}

/// 24-bit background (`48;2`).
#[inline]
pub fn bg_rgb(w: &mut impl Write, c: Rgb) -> io::Result<()> {
    write!(w, "\x1b[48;2;{};{};{}m", c.r, c.g, c.b)
}

/// Classic 16-color foreground: 30–37 for 0–7, 90–97 for 8–15.
pub fn fg16(w: &mut impl Write, idx: u8) -> io::Result<()> {
    let idx = u16::from(idx & 0x0f);
    if idx < 8 {
        write!(w, "\x1b[{}m", 30 + idx)
    } else {
        write!(w, "\x1b[{}m", 82 + idx)
    }
}

/// Classic 16-color background: 40–47 for 0–7, 100–107 for 8–15.
pub fn bg16(w: &mut impl Write, idx: u8) -> io::Result<()> {
    let idx = u16::from(idx & 0x0f);
    if idx < 8 {
        write!(w, "\x1b[{}m", 40 + idx)
    } else {
        write!(w, "\x1b[{}m", 92 + idx)
    }
}

// ─── Underline ───────────────────────────────────────────────────────────────

#[inline]
pub fn underline_on(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[4m")
}

#[inline]
pub fn underline_off(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"\x1b[24m")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn emit(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    // ── Cursor ──────────────────────────────────────────────────────────

    #[test]
    fn cursor_to_is_one_based() {
        assert_eq!(emit(|w| cursor_to(w, 0, 0)), "\x1b[1;1H");
        assert_eq!(emit(|w| cursor_to(w, 9, 4)), "\x1b[5;10H");
    }

    #[test]
    fn cursor_to_max_does_not_overflow() {
        assert_eq!(
            emit(|w| cursor_to(w, u16::MAX, u16::MAX)),
            "\x1b[65536;65536H"
        );
    }

    #[test]
    fn cursor_visibility() {
        assert_eq!(emit(|w| cursor_hide(w)), "\x1b[?25l");
        assert_eq!(emit(|w| cursor_show(w)), "\x1b[?25h");
    }

    // ── Screen ──────────────────────────────────────────────────────────

    #[test]
    fn screen_sequences() {
        assert_eq!(emit(|w| clear_screen(w)), "\x1b[2J");
        assert_eq!(emit(|w| reset(w)), "\x1b[0m");
        assert_eq!(emit(|w| enter_alt_screen(w)), "\x1b[?1049h");
        assert_eq!(emit(|w| exit_alt_screen(w)), "\x1b[?1049l");
    }

    // ── Color ───────────────────────────────────────────────────────────

    #[test]
    fn truecolor_sequences() {
        let c = Rgb::new(255, 128, 0);
        assert_eq!(emit(|w| fg_rgb(w, c)), "\x1b[38;2;255;128;0m");
        assert_eq!(emit(|w| bg_rgb(w, c)), "\x1b[48;2;255;128;0m");
    }

    #[test]
    fn sixteen_color_sequences() {
        assert_eq!(emit(|w| fg16(w, 1)), "\x1b[31m");
        assert_eq!(emit(|w| fg16(w, 9)), "\x1b[91m");
        assert_eq!(emit(|w| bg16(w, 0)), "\x1b[40m");
        assert_eq!(emit(|w| bg16(w, 15)), "\x1b[107m");
    }

    #[test]
    fn underline_pair() {
        assert_eq!(emit(|w| underline_on(w)), "\x1b[4m");
        assert_eq!(emit(|w| underline_off(w)), "\x1b[24m");
    }
}
