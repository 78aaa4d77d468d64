// SPDX-License-Identifier: MIT
//
// Console — the terminal provider the compositor writes through.
//
// The compositor never touches stdout directly. It talks to a `Console`,
// which exposes exactly the operations a classic text console offers:
// size, cursor row and column, foreground and background color, write
// text, clear. The legacy compositor drives those operations one by one;
// the true-color compositor embeds its own escapes in the text and makes a
// single `write` per frame.
//
// Two implementations:
//
//   StdConsole — the real terminal on stdout. Colors set through the
//   console API are mapped to the 16 classic colors, since a terminal that
//   needs the legacy path cannot be assumed to understand 24-bit escapes.
//
//   MemoryConsole — an in-memory console for tests and headless runs. It
//   interprets text and the escape subset the compositor emits into a cell
//   grid, counts writes, and can be told to fail or change size. Clones
//   share state, so a test can keep a handle while the app owns the box.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::ansi;
use crate::cell::Cell;
use crate::color::{DEFAULT_BG, DEFAULT_FG, Rgb};
use crate::error::out_of_range;
use crate::pool::lock;
use crate::terminal::get_size;

// ─── Console ─────────────────────────────────────────────────────────────────

/// A character-cell terminal.
///
/// Every operation that can fail returns `io::Result`. Moving the cursor
/// outside the current size is an error of kind `InvalidInput`.
pub trait Console: Send {
    /// Current width in columns.
    fn width(&self) -> i32;

    /// Current height in rows.
    fn height(&self) -> i32;

    fn set_cursor_left(&mut self, x: i32) -> io::Result<()>;

    fn set_cursor_top(&mut self, y: i32) -> io::Result<()>;

    fn set_foreground(&mut self, color: Rgb) -> io::Result<()>;

    fn set_background(&mut self, color: Rgb) -> io::Result<()>;

    /// Write text at the cursor. May contain escapes understood by the
    /// console.
    fn write(&mut self, text: &str) -> io::Result<()>;

    /// Clear the whole screen.
    fn clear(&mut self) -> io::Result<()>;

    /// Return to the default colors.
    fn reset_colors(&mut self) -> io::Result<()> {
        self.set_foreground(DEFAULT_FG)?;
        self.set_background(DEFAULT_BG)
    }
}

fn check_axis(axis: &str, value: i32, limit: i32) -> io::Result<()> {
    if value < 0 || value >= limit {
        Err(out_of_range(axis, value, limit))
    } else {
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
const fn to_u16(v: i32) -> u16 {
    v as u16
}

// ─── StdConsole ──────────────────────────────────────────────────────────────

/// The process terminal, on stdout.
///
/// Size is queried from the OS on every call, falling back to 80×24 when
/// stdout is not a terminal. Raw mode and the alternate screen are handled
/// separately by [`Terminal`](crate::terminal::Terminal).
#[derive(Debug)]
pub struct StdConsole {
    out: io::Stdout,
    x: i32,
    y: i32,
}

impl StdConsole {
    #[must_use]
    pub fn new() -> Self {
        Self {
            out: io::stdout(),
            x: 0,
            y: 0,
        }
    }

    fn size(&self) -> (i32, i32) {
        get_size().map_or((80, 24), |s| (i32::from(s.cols), i32::from(s.rows)))
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for StdConsole {
    fn width(&self) -> i32 {
        self.size().0
    }

    fn height(&self) -> i32 {
        self.size().1
    }

    fn set_cursor_left(&mut self, x: i32) -> io::Result<()> {
        check_axis("left", x, self.width())?;
        self.x = x;
        ansi::cursor_to(&mut self.out, to_u16(self.x), to_u16(self.y))
    }

    fn set_cursor_top(&mut self, y: i32) -> io::Result<()> {
        check_axis("top", y, self.height())?;
        self.y = y;
        ansi::cursor_to(&mut self.out, to_u16(self.x), to_u16(self.y))
    }

    fn set_foreground(&mut self, color: Rgb) -> io::Result<()> {
        ansi::fg16(&mut self.out, color.nearest_ansi16())
    }

    fn set_background(&mut self, color: Rgb) -> io::Result<()> {
        ansi::bg16(&mut self.out, color.nearest_ansi16())
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        let mut lock = self.out.lock();
        lock.write_all(text.as_bytes())?;
        lock.flush()
    }

    fn clear(&mut self) -> io::Result<()> {
        let mut lock = self.out.lock();
        ansi::clear_screen(&mut lock)?;
        ansi::cursor_to(&mut lock, 0, 0)?;
        lock.flush()?;
        self.x = 0;
        self.y = 0;
        Ok(())
    }

    fn reset_colors(&mut self) -> io::Result<()> {
        let mut lock = self.out.lock();
        ansi::reset(&mut lock)?;
        lock.flush()
    }
}

// ─── MemoryConsole ───────────────────────────────────────────────────────────

#[derive(Debug)]
struct Screen {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
    x: i32,
    y: i32,
    fg: Rgb,
    bg: Rgb,
    underline: bool,
    writes: usize,
    clears: usize,
    column_moves: usize,
    row_moves: usize,
    output: String,
    fail_next: usize,
}

impl Screen {
    #[allow(clippy::cast_sign_loss)]
    fn blank(width: i32, height: i32) -> Vec<Cell> {
        vec![Cell::BLANK; (width.max(0) * height.max(0)) as usize]
    }

    fn injected_failure(&mut self) -> io::Result<()> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(io::Error::other("injected console failure"));
        }
        Ok(())
    }

    #[allow(clippy::cast_sign_loss)]
    fn put(&mut self, ch: char) {
        if self.x >= 0 && self.x < self.width && self.y >= 0 && self.y < self.height {
            let idx = (self.y * self.width + self.x) as usize;
            self.cells[idx] = Cell {
                ch,
                fg: self.fg,
                bg: self.bg,
                underline: self.underline,
            };
        }
        self.x += 1;
    }

    fn interpret(&mut self, text: &str) {
        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch != '\x1b' || chars.peek() != Some(&'[') {
                self.put(ch);
                continue;
            }
            chars.next();
            let mut params = String::new();
            let mut final_byte = None;
            for c in chars.by_ref() {
                if c.is_ascii_digit() || c == ';' || c == '?' {
                    params.push(c);
                } else {
                    final_byte = Some(c);
                    break;
                }
            }
            match final_byte {
                Some('H') => self.cup(&params),
                Some('m') => self.sgr(&params),
                Some('J') if params == "2" => self.cells.fill(Cell::BLANK),
                _ => {}
            }
        }
    }

    fn cup(&mut self, params: &str) {
        let mut it = params.split(';').map(|p| p.parse::<i32>().unwrap_or(1));
        self.y = it.next().unwrap_or(1) - 1;
        self.x = it.next().unwrap_or(1) - 1;
    }

    fn sgr(&mut self, params: &str) {
        let nums: Vec<u16> = params
            .split(';')
            .map(|p| p.parse().unwrap_or(0))
            .collect();
        let rgb = |i: usize| {
            let c = |j: usize| u8::try_from(nums.get(j).copied().unwrap_or(0)).unwrap_or(u8::MAX);
            Rgb::new(c(i), c(i + 1), c(i + 2))
        };
        match nums.as_slice() {
            [38, 2, ..] => self.fg = rgb(2),
            [48, 2, ..] => self.bg = rgb(2),
            [4] => self.underline = true,
            [24] => self.underline = false,
            [0] => {
                self.fg = DEFAULT_FG;
                self.bg = DEFAULT_BG;
                self.underline = false;
            }
            _ => {}
        }
    }
}

/// An in-memory console that renders writes into a cell grid.
///
/// # Examples
///
/// ```
/// use cellpump_term::console::{Console, MemoryConsole};
///
/// let mut console = MemoryConsole::new(10, 2);
/// console.write("\x1b[2;3Hhi").unwrap();
/// assert_eq!(console.row_text(1), "  hi      ");
/// assert_eq!(console.writes(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryConsole {
    screen: Arc<Mutex<Screen>>,
}

impl MemoryConsole {
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            screen: Arc::new(Mutex::new(Screen {
                width,
                height,
                cells: Screen::blank(width, height),
                x: 0,
                y: 0,
                fg: DEFAULT_FG,
                bg: DEFAULT_BG,
                underline: false,
                writes: 0,
                clears: 0,
                column_moves: 0,
                row_moves: 0,
                output: String::new(),
                fail_next: 0,
            })),
        }
    }

    /// Change the reported size. The grid is blanked.
    pub fn set_size(&self, width: i32, height: i32) {
        let mut s = lock(&self.screen);
        s.width = width;
        s.height = height;
        s.cells = Screen::blank(width, height);
        s.x = 0;
        s.y = 0;
    }

    /// Make the next `n` fallible operations return an error.
    pub fn fail_next(&self, n: usize) {
        lock(&self.screen).fail_next = n;
    }

    /// Number of successful `write` calls so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        lock(&self.screen).writes
    }

    /// Number of successful `clear` calls so far.
    #[must_use]
    pub fn clears(&self) -> usize {
        lock(&self.screen).clears
    }

    /// Successful `(set_cursor_left, set_cursor_top)` calls so far.
    #[must_use]
    pub fn cursor_moves(&self) -> (usize, usize) {
        let s = lock(&self.screen);
        (s.column_moves, s.row_moves)
    }

    /// Everything written so far, escapes included.
    #[must_use]
    pub fn output(&self) -> String {
        lock(&self.screen).output.clone()
    }

    /// Drain the write log.
    #[must_use]
    pub fn take_output(&self) -> String {
        std::mem::take(&mut lock(&self.screen).output)
    }

    /// The cell at `(x, y)`, if on screen.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn cell(&self, x: i32, y: i32) -> Option<Cell> {
        let s = lock(&self.screen);
        (x >= 0 && y >= 0 && x < s.width && y < s.height)
            .then(|| s.cells[(y * s.width + x) as usize])
    }

    /// The characters of row `y`.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn row_text(&self, y: i32) -> String {
        let s = lock(&self.screen);
        if y < 0 || y >= s.height {
            return String::new();
        }
        let start = (y * s.width) as usize;
        s.cells[start..start + s.width as usize]
            .iter()
            .map(|c| c.ch)
            .collect()
    }

    /// The whole screen, one line per row.
    #[must_use]
    pub fn text(&self) -> String {
        let height = self.height();
        (0..height)
            .map(|y| self.row_text(y))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Current cursor position.
    #[must_use]
    pub fn cursor(&self) -> (i32, i32) {
        let s = lock(&self.screen);
        (s.x, s.y)
    }

    /// Current pen colors.
    #[must_use]
    pub fn colors(&self) -> (Rgb, Rgb) {
        let s = lock(&self.screen);
        (s.fg, s.bg)
    }
}

impl Console for MemoryConsole {
    fn width(&self) -> i32 {
        lock(&self.screen).width
    }

    fn height(&self) -> i32 {
        lock(&self.screen).height
    }

    fn set_cursor_left(&mut self, x: i32) -> io::Result<()> {
        let mut s = lock(&self.screen);
        s.injected_failure()?;
        check_axis("left", x, s.width)?;
        s.x = x;
        s.column_moves += 1;
        Ok(())
    }

    fn set_cursor_top(&mut self, y: i32) -> io::Result<()> {
        let mut s = lock(&self.screen);
        s.injected_failure()?;
        check_axis("top", y, s.height)?;
        s.y = y;
        s.row_moves += 1;
        Ok(())
    }

    fn set_foreground(&mut self, color: Rgb) -> io::Result<()> {
        let mut s = lock(&self.screen);
        s.injected_failure()?;
        s.fg = color;
        Ok(())
    }

    fn set_background(&mut self, color: Rgb) -> io::Result<()> {
        let mut s = lock(&self.screen);
        s.injected_failure()?;
        s.bg = color;
        Ok(())
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        let mut s = lock(&self.screen);
        s.injected_failure()?;
        s.writes += 1;
        s.output.push_str(text);
        s.interpret(text);
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        let mut s = lock(&self.screen);
        s.injected_failure()?;
        s.clears += 1;
        s.cells.fill(Cell::BLANK);
        s.x = 0;
        s.y = 0;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
