// SPDX-License-Identifier: MIT
#![allow(unsafe_code)]
//
// Background stdin reader — turns terminal bytes into key events.
//
// A dedicated thread reads stdin, runs the bytes through an input
// `Parser`, and hands every decoded key to a sink closure. The sink is
// typically a pump dispatcher's `send_key`, so keys enter the
// application queue from this thread without touching application state.
//
// Shutdown and the ESC timeout share one mechanism: the thread `poll()`s
// stdin with a short timeout. On every timeout it checks the stop flag
// and, if a lone ESC is pending in the parser, flushes it as an Escape
// key. The sink returning `false` also ends the thread.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use log::debug;

use crate::input::{KeyEvent, Parser};

/// Bytes read per `read()`: a keypress is 1-6 bytes, a paste can be more.
const READ_BUF_SIZE: usize = 4096;

/// Poll timeout in milliseconds. Bounds both shutdown latency and how long
/// a lone ESC waits before counting as the Escape key.
const POLL_TIMEOUT_MS: i32 = 50;

/// Background stdin key reader.
///
/// Runs until [`stop`](Self::stop) is called, the reader is dropped, stdin
/// hits EOF, or the sink returns `false`.
///
/// # Example
///
/// ```no_run
/// use cellpump_term::reader::StdinReader;
///
/// let reader = StdinReader::spawn(|key| {
///     println!("{key:?}");
///     true
/// })?;
/// # drop(reader);
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct StdinReader {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl StdinReader {
    /// Spawn the reader thread, delivering keys to `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS cannot spawn the thread.
    pub fn spawn<F>(sink: F) -> io::Result<Self>
    where
        F: FnMut(KeyEvent) -> bool + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("stdin-reader".into())
            .spawn(move || reader_loop(sink, &stop_flag))?;

        Ok(Self {
            handle: Some(handle),
            stop,
        })
    }

    /// Signal the thread to stop and wait for it. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Whether the thread has exited on its own (EOF or sink refusal).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for StdinReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Deliver keys to `sink` until it refuses one.
fn deliver(keys: Vec<KeyEvent>, sink: &mut impl FnMut(KeyEvent) -> bool) -> bool {
    keys.into_iter().all(sink)
}

#[cfg(unix)]
fn reader_loop(mut sink: impl FnMut(KeyEvent) -> bool, stop: &AtomicBool) {
    use std::os::unix::io::AsRawFd;

    let stdin_fd = io::stdin().as_raw_fd();
    let mut buf = [0u8; READ_BUF_SIZE];
    let mut parser = Parser::new();

    while !stop.load(Ordering::Relaxed) {
        let ready = unsafe {
            let mut pfd = libc::pollfd {
                fd: stdin_fd,
                events: libc::POLLIN,
                revents: 0,
            };
            libc::poll(&raw mut pfd, 1, POLL_TIMEOUT_MS)
        };

        if ready <= 0 {
            if parser.has_pending() && !deliver(parser.flush(), &mut sink) {
                break;
            }
            continue;
        }

        let n = unsafe { libc::read(stdin_fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n <= 0 {
            debug!("stdin closed; reader exiting");
            break;
        }

        #[allow(clippy::cast_sign_loss)] // n > 0 checked above.
        let keys = parser.advance(&buf[..n as usize]);
        if !deliver(keys, &mut sink) {
            break;
        }
    }
}

/// Blocking fallback without `poll()`: pending ESC is flushed after every
/// read, since there is no timeout to wait on.
#[cfg(not(unix))]
fn reader_loop(mut sink: impl FnMut(KeyEvent) -> bool, stop: &AtomicBool) {
    use std::io::Read;

    let stdin = std::io::stdin();
    let mut buf = [0u8; READ_BUF_SIZE];
    let mut parser = Parser::new();

    while !stop.load(Ordering::Relaxed) {
        match stdin.lock().read(&mut buf) {
            Ok(0) | Err(_) => {
                debug!("stdin closed; reader exiting");
                break;
            }
            Ok(n) => {
                let mut keys = parser.advance(&buf[..n]);
                keys.extend(parser.flush());
                if !deliver(keys, &mut sink) {
                    break;
                }
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::KeyCode;

    #[test]
    fn spawn_and_stop() {
        let mut reader = StdinReader::spawn(|_| true).unwrap();
        reader.stop();
        assert!(reader.is_finished());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut reader = StdinReader::spawn(|_| true).unwrap();
        reader.stop();
        reader.stop();
    }

    #[test]
    fn drop_stops_reader() {
        let reader = StdinReader::spawn(|_| true).unwrap();
        drop(reader);
    }

    #[test]
    fn deliver_stops_at_refusal() {
        let mut seen = Vec::new();
        let keys = vec![KeyEvent::char('a'), KeyEvent::char('b'), KeyEvent::char('c')];
        let ok = deliver(keys, &mut |k: KeyEvent| {
            seen.push(k.code);
            k.code != KeyCode::Char('b')
        });
        assert!(!ok);
        assert_eq!(seen, vec![KeyCode::Char('a'), KeyCode::Char('b')]);
    }

    #[test]
    fn poll_timeout_is_short() {
        assert!((10..=100).contains(&POLL_TIMEOUT_MS));
    }
}
