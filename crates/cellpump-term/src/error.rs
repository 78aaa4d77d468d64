// SPDX-License-Identifier: MIT
//
// Render errors.
//
// Terminal I/O failures during a paint are transient by nature: a window
// that just shrank makes the cursor position out of range, a pipe hiccups.
// The compositor recovers from one of those by invalidating and painting
// again. Only when the retry fails too does an error reach the caller.

use std::io;

use thiserror::Error;

/// Errors produced by the compositor and the console implementations.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A terminal write, cursor move, or color change failed.
    #[error("terminal I/O error: {0}")]
    Io(#[from] io::Error),

    /// The paint failed, was invalidated and retried, and failed again.
    #[error("paint failed again after invalidate-and-retry: {0}")]
    RetryFailed(#[source] io::Error),
}

impl RenderError {
    /// The underlying I/O error.
    #[must_use]
    pub const fn io(&self) -> &io::Error {
        match self {
            Self::Io(e) | Self::RetryFailed(e) => e,
        }
    }
}

/// An out-of-range cursor position, reported as an I/O error.
///
/// Consoles use this when asked to move outside their current size, which
/// is what happens when the window shrinks between two paints.
#[must_use]
pub fn out_of_range(axis: &str, value: i32, limit: i32) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("cursor {axis} {value} out of range 0..{limit}"),
    )
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let err: RenderError = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, RenderError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn retry_failed_mentions_retry() {
        let err = RenderError::RetryFailed(io::Error::other("boom"));
        let msg = err.to_string();
        assert!(msg.contains("retry"));
        assert!(msg.contains("boom"));
        assert_eq!(err.io().kind(), io::ErrorKind::Other);
    }

    #[test]
    fn out_of_range_is_invalid_input() {
        let err = out_of_range("left", 90, 80);
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("90"));
    }
}
