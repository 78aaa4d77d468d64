// SPDX-License-Identifier: MIT
//
// App configuration.

use cellpump_term::RenderMode;

/// Environment variable that forces a render mode (`legacy`/`truecolor`).
pub const RENDER_ENV: &str = "CELLPUMP_RENDER";

/// How a [`ConsoleApp`](crate::app::ConsoleApp) sets itself up.
///
/// The default is a full-screen app: the frame is as wide as the console
/// and one row shorter, and it follows console resizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppConfig {
    pub render_mode: RenderMode,
    /// Queue a focus move to the first focusable node at start.
    pub set_focus_on_start: bool,
    /// Resize the frame and root to the console on resize notifications.
    pub auto_fill_on_resize: bool,
    /// Fixed frame size. `None` sizes the frame from the console.
    pub size: Option<(u16, u16)>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            render_mode: RenderMode::default(),
            set_focus_on_start: true,
            auto_fill_on_resize: true,
            size: None,
        }
    }
}

impl AppConfig {
    /// A fixed `width × height` app that ignores console resizes.
    #[must_use]
    pub fn fixed(width: u16, height: u16) -> Self {
        Self {
            auto_fill_on_resize: false,
            size: Some((width, height)),
            ..Self::default()
        }
    }

    /// Defaults, with the render mode taken from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let forced = std::env::var(RENDER_ENV).ok();
        let colorterm = std::env::var("COLORTERM").ok();
        Self {
            render_mode: mode_from(forced.as_deref(), colorterm.as_deref()),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }
}

/// An explicit mode name wins; otherwise detect from `COLORTERM`.
fn mode_from(forced: Option<&str>, colorterm: Option<&str>) -> RenderMode {
    forced
        .and_then(RenderMode::from_name)
        .unwrap_or_else(|| RenderMode::from_colorterm(colorterm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_full_screen() {
        let c = AppConfig::default();
        assert!(c.auto_fill_on_resize);
        assert!(c.set_focus_on_start);
        assert_eq!(c.size, None);
        assert_eq!(c.render_mode, RenderMode::Legacy);
    }

    #[test]
    fn fixed_does_not_follow_resizes() {
        let c = AppConfig::fixed(40, 10);
        assert!(!c.auto_fill_on_resize);
        assert_eq!(c.size, Some((40, 10)));
    }

    #[test]
    fn forced_mode_wins() {
        assert_eq!(
            mode_from(Some("legacy"), Some("truecolor")),
            RenderMode::Legacy
        );
        assert_eq!(mode_from(Some("truecolor"), None), RenderMode::TrueColor);
    }

    #[test]
    fn unknown_forced_mode_falls_back_to_detection() {
        assert_eq!(mode_from(Some("sparkly"), Some("24bit")), RenderMode::TrueColor);
        assert_eq!(mode_from(None, None), RenderMode::Legacy);
    }
}
