// SPDX-License-Identifier: MIT
//
// Compositor — sends a frame buffer to the console, changes only.
//
// Each pixel remembers what was last written to the terminal at its
// position. A paint walks every row left to right and groups cells into
// chunks:
//
//   - consecutive unchanged cells form one chunk whatever their style;
//   - consecutive changed cells form one chunk while their style matches
//     (fg and bg, plus underline in true-color mode);
//   - anything else closes the current chunk and opens a new one.
//
// Only changed chunks are emitted. Unchanged chunks just advance the
// column. Two back ends:
//
//   Legacy — drives the console API one operation at a time: the cursor
//   row once per changed row, the column only after a gap of unchanged
//   cells, then fg, bg and the raw text. After a paint that wrote anything
//   the cursor goes home and colors go back to the defaults.
//
//   TrueColor — builds the whole frame in one `OutputBuffer`: for every
//   changed chunk an absolute cursor move, 24-bit fg and bg escapes, and
//   the text (wrapped in underline on/off when needed). The frame ends by
//   parking the cursor on the bottom-right cell and goes out in a single
//   `write`. A frame with no changes writes nothing.
//
// A console that changed width since the last paint, or a switch between
// back ends, invalidates the buffer and clears the screen. A console with
// no height is skipped. Any I/O failure invalidates and retries once.

use std::env;
use std::io;

use log::{debug, warn};

use crate::ansi;
use crate::buffer::FrameBuffer;
use crate::cell::{Cell, Pixel};
use crate::console::Console;
use crate::error::RenderError;
use crate::output::OutputBuffer;
use crate::pool::{Chunk, ChunkPool, PoolStats};

// ─── RenderMode ──────────────────────────────────────────────────────────────

/// Which back end writes frames to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Console API calls, 16 colors, no underline.
    #[default]
    Legacy,
    /// One write per frame of 24-bit ANSI escapes.
    TrueColor,
}

impl RenderMode {
    /// Pick a mode from `COLORTERM`.
    #[must_use]
    pub fn detect() -> Self {
        Self::from_colorterm(env::var("COLORTERM").ok().as_deref())
    }

    /// `truecolor` or `24bit` select [`TrueColor`](Self::TrueColor);
    /// anything else, or nothing, selects legacy.
    #[must_use]
    pub fn from_colorterm(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("truecolor" | "24bit") => Self::TrueColor,
            _ => Self::Legacy,
        }
    }

    /// Parse a mode name (`legacy`, `truecolor`), case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "legacy" => Some(Self::Legacy),
            "truecolor" | "true-color" | "24bit" => Some(Self::TrueColor),
            _ => None,
        }
    }
}

// ─── PaintStats ──────────────────────────────────────────────────────────────

/// What a paint sent to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaintStats {
    /// Changed chunks emitted.
    pub chunks: usize,
    /// Cells covered by those chunks.
    pub cells: usize,
    /// Bytes handed to the console's `write`.
    pub bytes: usize,
}

impl PaintStats {
    /// Whether the paint sent anything at all.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.chunks == 0
    }
}

// ─── Compositor ──────────────────────────────────────────────────────────────

/// Differencing compositor. Owns its chunk pool and output scratch.
#[derive(Debug)]
pub struct Compositor {
    mode: RenderMode,
    last_mode: Option<RenderMode>,
    last_width: Option<i32>,
    pool: ChunkPool,
    line: Vec<Chunk>,
    out: OutputBuffer,
}

impl Compositor {
    #[must_use]
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            last_mode: None,
            last_width: None,
            pool: ChunkPool::new(),
            line: Vec::new(),
            out: OutputBuffer::new(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Switch back end. The next paint clears and redraws everything.
    pub const fn set_mode(&mut self, mode: RenderMode) {
        self.mode = mode;
    }

    /// Reuse statistics of the chunk pool.
    #[must_use]
    pub fn chunk_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Write the changed parts of `buf` to `console`.
    ///
    /// On success every pixel of `buf` is committed. On an I/O failure
    /// the buffer is invalidated and the paint retried once.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::RetryFailed`] if the retry fails too.
    pub fn paint(
        &mut self,
        buf: &mut FrameBuffer,
        console: &mut dyn Console,
    ) -> Result<PaintStats, RenderError> {
        match self.paint_once(buf, console) {
            Ok(stats) => Ok(stats),
            Err(first) => {
                warn!("paint failed ({first}); invalidating and retrying");
                buf.invalidate();
                self.paint_once(buf, console)
                    .map_err(RenderError::RetryFailed)
            }
        }
    }

    fn paint_once(
        &mut self,
        buf: &mut FrameBuffer,
        console: &mut dyn Console,
    ) -> io::Result<PaintStats> {
        if console.height() <= 0 {
            return Ok(PaintStats::default());
        }

        let width = console.width();
        if self.last_mode != Some(self.mode) || self.last_width != Some(width) {
            buf.invalidate();
            console.clear()?;
            self.last_mode = Some(self.mode);
            self.last_width = Some(width);
        }

        let stats = match self.mode {
            RenderMode::Legacy => self.paint_legacy(buf, console)?,
            RenderMode::TrueColor => self.paint_truecolor(buf, console)?,
        };

        buf.commit();
        if !stats.is_empty() {
            debug!(
                "painted {} chunks, {} cells, {} bytes",
                stats.chunks, stats.cells, stats.bytes
            );
        }
        Ok(stats)
    }

    // ─── Chunking ────────────────────────────────────────────────────────

    /// Split `row` into chunks in `self.line`. Returns whether any cell on
    /// the row changed.
    fn build_row(&mut self, row: &[Pixel], underline_matters: bool) -> bool {
        let width = row.len();
        let mut changed_on_line = false;
        let mut current: Option<Chunk> = None;

        for p in row {
            let changed = p.has_changed();
            changed_on_line |= changed;
            match current.as_mut() {
                Some(chunk) if extends(chunk, &p.value, changed, underline_matters) => {
                    chunk.push(p.value.ch);
                }
                _ => {
                    let mut next = self.pool.rent(width);
                    next.seed(&p.value, changed);
                    if let Some(done) = current.replace(next) {
                        self.line.push(done);
                    }
                }
            }
        }
        if let Some(done) = current {
            self.line.push(done);
        }
        changed_on_line
    }

    fn recycle_line(&mut self) {
        for chunk in self.line.drain(..) {
            self.pool.give_back(chunk);
        }
    }

    // ─── Legacy ──────────────────────────────────────────────────────────

    fn paint_legacy(
        &mut self,
        buf: &FrameBuffer,
        console: &mut dyn Console,
    ) -> io::Result<PaintStats> {
        let mut stats = PaintStats::default();

        for y in 0..buf.height() {
            let Some(row) = buf.row(y) else { break };
            let changed = self.build_row(row, false);
            let result = if changed {
                emit_legacy_row(&self.line, i32::from(y), console, &mut stats)
            } else {
                Ok(())
            };
            self.recycle_line();
            result?;
        }

        if !stats.is_empty() {
            console.set_cursor_left(0)?;
            console.set_cursor_top(0)?;
            console.reset_colors()?;
        }
        Ok(stats)
    }

    // ─── True color ──────────────────────────────────────────────────────

    fn paint_truecolor(
        &mut self,
        buf: &FrameBuffer,
        console: &mut dyn Console,
    ) -> io::Result<PaintStats> {
        let mut stats = PaintStats::default();
        self.out.clear();

        for y in 0..buf.height() {
            let Some(row) = buf.row(y) else { break };
            let result = if self.build_row(row, true) {
                emit_truecolor_row(&self.line, y, &mut self.out, &mut stats)
            } else {
                Ok(())
            };
            self.recycle_line();
            result?;
        }

        if stats.is_empty() {
            return Ok(stats);
        }
        // Non-empty stats imply a non-empty buffer.
        ansi::cursor_to(&mut self.out, buf.width() - 1, buf.height() - 1)?;
        console.write(self.out.as_str()?)?;
        stats.bytes = self.out.len();
        Ok(stats)
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(RenderMode::default())
    }
}

/// Whether `cell` joins `chunk`.
fn extends(chunk: &Chunk, cell: &Cell, changed: bool, underline_matters: bool) -> bool {
    if !chunk.changed && !changed {
        return true;
    }
    chunk.changed
        && changed
        && chunk.fg == cell.fg
        && chunk.bg == cell.bg
        && (!underline_matters || chunk.underline == cell.underline)
}

fn emit_legacy_row(
    line: &[Chunk],
    y: i32,
    console: &mut dyn Console,
    stats: &mut PaintStats,
) -> io::Result<()> {
    console.set_cursor_top(y)?;
    let mut left = 0usize;
    let mut move_left = true;
    for chunk in line {
        if chunk.changed {
            if move_left {
                console.set_cursor_left(i32::try_from(left).unwrap_or(i32::MAX))?;
                move_left = false;
            }
            console.set_foreground(chunk.fg)?;
            console.set_background(chunk.bg)?;
            console.write(chunk.as_str())?;
            stats.chunks += 1;
            stats.cells += chunk.len();
            stats.bytes += chunk.as_str().len();
        } else {
            move_left = true;
        }
        left += chunk.len();
    }
    Ok(())
}

fn emit_truecolor_row(
    line: &[Chunk],
    y: u16,
    out: &mut OutputBuffer,
    stats: &mut PaintStats,
) -> io::Result<()> {
    let mut left = 0u16;
    for chunk in line {
        if chunk.changed {
            ansi::cursor_to(out, left, y)?;
            ansi::fg_rgb(out, chunk.fg)?;
            ansi::bg_rgb(out, chunk.bg)?;
            if chunk.underline {
                ansi::underline_on(out)?;
            }
            out.push_str(chunk.as_str());
            if chunk.underline {
                ansi::underline_off(out)?;
            }
            stats.chunks += 1;
            stats.cells += chunk.len();
        }
        // Chunk lengths sum to the row width, a u16.
        #[allow(clippy::cast_possible_truncation)]
        {
            left += chunk.len() as u16;
        }
    }
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
