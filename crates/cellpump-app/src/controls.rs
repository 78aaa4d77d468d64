// SPDX-License-Identifier: MIT
//
// Stock controls: a container and a text label.

use cellpump_term::Rgb;
use cellpump_term::cell::Cell;
use cellpump_term::color::{DEFAULT_BG, DEFAULT_FG};

use crate::canvas::Canvas;
use crate::tree::Control;

/// A container. Paints an optional background and lets its children be
/// removed individually. The app's root is a `Panel`.
#[derive(Debug, Clone, Default)]
pub struct Panel {
    pub background: Option<Rgb>,
}

impl Panel {
    #[must_use]
    pub const fn new() -> Self {
        Self { background: None }
    }

    #[must_use]
    pub const fn with_background(bg: Rgb) -> Self {
        Self {
            background: Some(bg),
        }
    }
}

impl Control for Panel {
    fn paint(&mut self, canvas: &mut Canvas<'_>) {
        if let Some(bg) = self.background {
            canvas.fill(Cell::background(bg));
        }
    }

    fn accepts_child_removal(&self) -> bool {
        true
    }
}

/// Single- or multi-line text.
#[derive(Debug, Clone)]
pub struct Label {
    text: String,
    pub fg: Rgb,
    pub bg: Rgb,
}

impl Label {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fg: DEFAULT_FG,
            bg: DEFAULT_BG,
        }
    }

    #[must_use]
    pub const fn with_colors(mut self, fg: Rgb, bg: Rgb) -> Self {
        self.fg = fg;
        self.bg = bg;
        self
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }
}

impl Control for Label {
    fn paint(&mut self, canvas: &mut Canvas<'_>) {
        canvas.draw_text(&self.text, 0, 0, self.fg, self.bg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellpump_term::FrameBuffer;

    #[test]
    fn panel_fills_background() {
        let mut buf = FrameBuffer::new(3, 1);
        let mut c = Canvas::new(&mut buf, (0, 0), (2, 1), (0, 0, 2, 1), false);
        Panel::with_background(Rgb::BLUE).paint(&mut c);
        assert_eq!(buf.get(1, 0).map(|c| c.bg), Some(Rgb::BLUE));
        assert_eq!(buf.get(2, 0).map(|c| c.bg), Some(DEFAULT_BG));
    }

    #[test]
    fn plain_panel_paints_nothing() {
        let mut buf = FrameBuffer::new(2, 1);
        buf.draw_string("ab", 0, 0, false);
        let mut c = Canvas::new(&mut buf, (0, 0), (2, 1), (0, 0, 2, 1), false);
        Panel::new().paint(&mut c);
        assert_eq!(buf.row_text(0), "ab");
    }

    #[test]
    fn label_paints_text_and_updates() {
        let mut label = Label::new("hi").with_colors(Rgb::YELLOW, Rgb::BLACK);
        label.set_text("yo");
        let mut buf = FrameBuffer::new(3, 1);
        let mut c = Canvas::new(&mut buf, (1, 0), (2, 1), (1, 0, 3, 1), false);
        label.paint(&mut c);
        assert_eq!(buf.row_text(0), " yo");
        assert_eq!(buf.get(1, 0).map(|c| c.fg), Some(Rgb::YELLOW));
    }

    #[test]
    fn only_panels_accept_child_removal() {
        assert!(Panel::new().accepts_child_removal());
        assert!(!Label::new("x").accepts_child_removal());
    }
}
