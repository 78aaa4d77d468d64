// SPDX-License-Identifier: MIT
//
// cellpump-term — Cell-grid terminal rendering engine.
//
// A frame buffer of styled cells with a per-cell shadow of what was last
// drawn, drawing primitives on top of it, and a compositor that turns the
// difference into as few console writes as it can. Two emission paths:
// a legacy one that drives a cursor-and-color console API chunk by chunk,
// and a true-color one that builds the whole frame as one ANSI string.
//
// Terminal plumbing (raw mode, resize signal, key parsing, the stdin
// reader thread) lives here too. The scheduler that drives all of it is
// in cellpump-app.

pub mod ansi;
pub mod buffer;
pub mod cell;
pub mod color;
pub mod compositor;
pub mod console;
pub mod error;
pub mod input;
pub mod line;
pub mod output;
pub mod pool;
pub mod reader;
pub mod terminal;

pub use buffer::FrameBuffer;
pub use cell::{Cell, Pixel};
pub use color::Rgb;
pub use compositor::{Compositor, PaintStats, RenderMode};
pub use console::{Console, MemoryConsole, StdConsole};
pub use error::RenderError;
