// SPDX-License-Identifier: MIT
//
// Frame recorder sink.
//
// The app hands every composed frame to an optional recorder just before
// compositing, and one last forced full frame at shutdown. Encoding and
// storage are the recorder's business; the app only writes.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cellpump_term::FrameBuffer;

/// Receives frames from a running app.
pub trait FrameRecorder: Send {
    /// Record `buffer`.
    ///
    /// `force_full` asks for a self-contained frame rather than a delta.
    /// `timestamp` is the time since the app started, when known.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be stored.
    fn write_frame(
        &mut self,
        buffer: &FrameBuffer,
        force_full: bool,
        timestamp: Option<Duration>,
    ) -> io::Result<()>;

    /// Frames written so far. Never decreases.
    fn frames_written(&self) -> u64;

    /// Called once at shutdown, after the final frame.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing the recording fails.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ─── In-memory recorder ─────────────────────────────────────────────────────

/// One frame captured by [`MemoryRecorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFrame {
    pub text: String,
    pub force_full: bool,
    pub timestamp: Option<Duration>,
}

#[derive(Debug, Default)]
struct Tape {
    frames: Vec<RecordedFrame>,
    finished: bool,
}

/// Keeps every frame as text. Clones share the same tape, so a test can
/// keep one handle and give the other to the app.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    tape: Arc<Mutex<Tape>>,
}

impl MemoryRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tape(&self) -> std::sync::MutexGuard<'_, Tape> {
        self.tape.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.tape().frames.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.tape().finished
    }
}

impl FrameRecorder for MemoryRecorder {
    fn write_frame(
        &mut self,
        buffer: &FrameBuffer,
        force_full: bool,
        timestamp: Option<Duration>,
    ) -> io::Result<()> {
        self.tape().frames.push(RecordedFrame {
            text: buffer.to_text(true),
            force_full,
            timestamp,
        });
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.tape().frames.len() as u64
    }

    fn finish(&mut self) -> io::Result<()> {
        self.tape().finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn clones_share_the_tape() {
        let recorder = MemoryRecorder::new();
        let mut sink = recorder.clone();
        let mut buf = FrameBuffer::new(4, 1);
        buf.draw_string("ok", 0, 0, false);

        sink.write_frame(&buf, false, None).unwrap();
        sink.write_frame(&buf, true, Some(Duration::from_millis(5))).unwrap();
        sink.finish().unwrap();

        assert_eq!(recorder.frames_written(), 2);
        assert!(recorder.is_finished());
        let frames = recorder.frames();
        assert_eq!(frames[0].text, "ok");
        assert!(frames[1].force_full);
        assert_eq!(frames[1].timestamp, Some(Duration::from_millis(5)));
    }
}
