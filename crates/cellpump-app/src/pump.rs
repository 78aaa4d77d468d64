// SPDX-License-Identifier: MIT
//
// Pump plumbing — the message queue between the world and the app thread.
//
// Everything that touches app state travels as a `Message` through one
// FIFO channel, and only the pump thread receives from it. `Dispatcher`
// is the sending half: cheap to clone, `Send`, and the only way other
// threads (the stdin reader, a timer, a network task) get anything done.
//
// The pump drains the channel in batches. Inside a batch, work and keys
// run in order as they come out, while paint, resize and stop requests
// only raise flags in a `Cycle`. After the batch the flags are acted on
// once: one resize with the console's latest size, then one physical
// paint for however many paint requests arrived, then teardown.
//
// A batch holds what was queued when it began. The pump posts a
// `CycleEnd` marker before draining and stops at it, so messages queued
// from inside the batch wait for the next one. While a stop is pending the
// batch runs on past the marker up to the `Stop` itself.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use cellpump_term::input::KeyEvent;
use log::trace;

use crate::app::ConsoleApp;
use crate::error::AppError;

// ─── Identity & lifecycle ───────────────────────────────────────────────────

/// Process-unique id of a [`ConsoleApp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppId(u64);

impl AppId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app#{}", self.0)
    }
}

/// App lifecycle. Moves forward only; `Stopped` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Lifecycle {
    Created = 0,
    Started = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl Lifecycle {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Started,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    /// Whether new work is still accepted.
    #[must_use]
    pub const fn accepts_work(self) -> bool {
        (self as u8) < (Self::Stopping as u8)
    }
}

/// Lifecycle shared between the app and its dispatchers.
#[derive(Debug, Clone)]
pub(crate) struct SharedLifecycle(Arc<AtomicU8>);

impl SharedLifecycle {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(Lifecycle::Created as u8)))
    }

    pub(crate) fn get(&self) -> Lifecycle {
        Lifecycle::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: Lifecycle) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to` if still in `from`.
    pub(crate) fn advance(&self, from: Lifecycle, to: Lifecycle) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move to `Stopping` unless already there or past it. Returns whether
    /// this call made the transition.
    pub(crate) fn begin_stop(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Lifecycle::from_u8(v)
                    .accepts_work()
                    .then_some(Lifecycle::Stopping as u8)
            })
            .is_ok()
    }
}

// ─── Messages ───────────────────────────────────────────────────────────────

/// A closure run on the pump thread with the app.
pub(crate) type Work = Box<dyn FnOnce(&mut ConsoleApp) -> Result<(), AppError> + Send>;

pub(crate) enum Message {
    Work(Work),
    /// Repaint; the sender, if any, is notified once the paint is done.
    Paint(Option<Sender<()>>),
    Key(KeyEvent),
    /// The console changed size; the pump reads the new size itself.
    Resize,
    Stop,
    /// Posted by the pump itself; marks the end of the current batch.
    CycleEnd,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Work(_) => f.write_str("Work"),
            Self::Paint(_) => f.write_str("Paint"),
            Self::Key(k) => write!(f, "Key({k:?})"),
            Self::Resize => f.write_str("Resize"),
            Self::Stop => f.write_str("Stop"),
            Self::CycleEnd => f.write_str("CycleEnd"),
        }
    }
}

// ─── Cycle ──────────────────────────────────────────────────────────────────

/// Deferred requests collected while draining one batch.
#[derive(Debug, Default)]
pub(crate) struct Cycle {
    pub(crate) paint: bool,
    pub(crate) receipts: Vec<Sender<()>>,
    pub(crate) paint_requests: usize,
    pub(crate) resize: bool,
    pub(crate) resize_requests: usize,
    pub(crate) stop: bool,
}

impl Cycle {
    /// Whether anything is waiting for the end of the batch.
    pub(crate) const fn is_pending(&self) -> bool {
        self.paint || self.resize || self.stop
    }

    pub(crate) fn request_paint(&mut self, receipt: Option<Sender<()>>) {
        self.paint = true;
        self.paint_requests += 1;
        if let Some(tx) = receipt {
            self.receipts.push(tx);
        }
    }

    pub(crate) fn request_resize(&mut self) {
        self.resize = true;
        self.resize_requests += 1;
    }

    /// Notify every paint waiter. Waiters that went away are ignored.
    pub(crate) fn complete_paints(&mut self) {
        if self.paint_requests > 1 {
            trace!("coalesced {} paint requests into one", self.paint_requests);
        }
        for tx in self.receipts.drain(..) {
            let _ = tx.send(());
        }
        self.paint = false;
        self.paint_requests = 0;
    }
}

// ─── PaintReceipt ───────────────────────────────────────────────────────────

/// Completes when the paint it was issued for has reached the console.
#[derive(Debug)]
pub struct PaintReceipt(Receiver<()>);

impl PaintReceipt {
    /// Block until the paint is done.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Stopped`] if the app stopped (or the paint
    /// failed) before the paint completed.
    pub fn wait(self) -> Result<(), AppError> {
        self.0.recv().map_err(|_| AppError::Stopped)
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`. Returns
    /// `Ok(false)` on timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Stopped`] if the paint can no longer happen.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, AppError> {
        match self.0.recv_timeout(timeout) {
            Ok(()) => Ok(true),
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Err(AppError::Stopped),
        }
    }

    /// Whether the paint has completed, without blocking.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.0.try_recv().is_ok()
    }
}

// ─── Dispatcher ─────────────────────────────────────────────────────────────

/// Thread-safe handle for queueing work on an app's pump.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    app: AppId,
    tx: Sender<Message>,
    lifecycle: SharedLifecycle,
}

impl Dispatcher {
    pub(crate) const fn new(app: AppId, tx: Sender<Message>, lifecycle: SharedLifecycle) -> Self {
        Self { app, tx, lifecycle }
    }

    #[inline]
    #[must_use]
    pub const fn app_id(&self) -> AppId {
        self.app
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.get()
    }

    /// A send that passes the lifecycle check while the pump is stopping
    /// may still land behind the `Stop`. Such messages never run: the pump
    /// drops them when it releases, which fails any receipt they carry.
    fn send(&self, msg: Message) -> Result<(), AppError> {
        if !self.lifecycle.get().accepts_work() {
            return Err(AppError::Stopped);
        }
        self.tx.send(msg).map_err(|_| AppError::Stopped)
    }

    /// Run `work` on the pump thread, after everything queued before it.
    ///
    /// An error returned by `work` is fatal: it stops the app. Work queued
    /// while a stop is being processed may be dropped without running.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Stopped`] once the app is stopping.
    pub fn queue<F>(&self, work: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut ConsoleApp) -> Result<(), AppError> + Send + 'static,
    {
        self.send(Message::Work(Box::new(work)))
    }

    /// Ask for a repaint. Requests queued together share one paint.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Stopped`] once the app is stopping.
    pub fn request_paint(&self) -> Result<PaintReceipt, AppError> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.send(Message::Paint(Some(tx)))?;
        Ok(PaintReceipt(rx))
    }

    /// Deliver a key press.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Stopped`] once the app is stopping.
    pub fn send_key(&self, key: KeyEvent) -> Result<(), AppError> {
        self.send(Message::Key(key))
    }

    /// Tell the pump the console changed size.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Stopped`] once the app is stopping.
    pub fn notify_resize(&self) -> Result<(), AppError> {
        self.send(Message::Resize)
    }

    /// Stop the app after the work already queued. Idempotent.
    pub fn request_stop(&self) {
        if self.lifecycle.begin_stop() {
            let _ = self.tx.send(Message::Stop);
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn dispatcher() -> (Dispatcher, Receiver<Message>) {
        let (tx, rx) = mpsc::channel();
        (Dispatcher::new(AppId::next(), tx, SharedLifecycle::new()), rx)
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    #[test]
    fn lifecycle_round_trips_through_atomic() {
        let l = SharedLifecycle::new();
        for s in [
            Lifecycle::Created,
            Lifecycle::Started,
            Lifecycle::Running,
            Lifecycle::Stopping,
            Lifecycle::Stopped,
        ] {
            l.set(s);
            assert_eq!(l.get(), s);
        }
    }

    #[test]
    fn begin_stop_only_once() {
        let l = SharedLifecycle::new();
        l.set(Lifecycle::Running);
        assert!(l.begin_stop());
        assert!(!l.begin_stop());
        assert_eq!(l.get(), Lifecycle::Stopping);
    }

    #[test]
    fn advance_requires_expected_state() {
        let l = SharedLifecycle::new();
        assert!(!l.advance(Lifecycle::Started, Lifecycle::Running));
        assert!(l.advance(Lifecycle::Created, Lifecycle::Started));
        assert_eq!(l.get(), Lifecycle::Started);
    }

    #[test]
    fn app_ids_are_unique() {
        assert_ne!(AppId::next(), AppId::next());
    }

    // ── Dispatcher ──────────────────────────────────────────────────────

    #[test]
    fn messages_arrive_in_order() {
        let (d, rx) = dispatcher();
        d.send_key(KeyEvent::char('a')).unwrap();
        d.notify_resize().unwrap();
        let _receipt = d.request_paint().unwrap();
        let got: Vec<String> = rx.try_iter().map(|m| format!("{m:?}")).collect();
        assert_eq!(got[0], format!("Key({:?})", KeyEvent::char('a')));
        assert_eq!(got[1..], ["Resize".to_string(), "Paint".to_string()]);
    }

    #[test]
    fn rejects_work_once_stopping() {
        let (d, rx) = dispatcher();
        d.request_stop();
        d.request_stop();
        assert!(matches!(d.send_key(KeyEvent::char('x')), Err(AppError::Stopped)));
        assert!(matches!(d.queue(|_| Ok(())), Err(AppError::Stopped)));
        let stops = rx.try_iter().filter(|m| matches!(m, Message::Stop)).count();
        assert_eq!(stops, 1);
    }

    // ── Cycle & receipts ────────────────────────────────────────────────

    #[test]
    fn cycle_completes_every_receipt() {
        let (d, rx) = dispatcher();
        let receipts: Vec<_> = (0..3).map(|_| d.request_paint().unwrap()).collect();
        let mut cycle = Cycle::default();
        for msg in rx.try_iter() {
            if let Message::Paint(tx) = msg {
                cycle.request_paint(tx);
            }
        }
        assert_eq!(cycle.paint_requests, 3);
        assert!(receipts.iter().all(|r| !r.is_done()));
        cycle.complete_paints();
        assert!(!cycle.paint);
        assert!(receipts.iter().all(PaintReceipt::is_done));
    }

    #[test]
    fn dropped_receipt_sender_reports_stopped() {
        let (tx, rx) = mpsc::channel::<()>();
        drop(tx);
        assert!(matches!(PaintReceipt(rx).wait(), Err(AppError::Stopped)));
    }
}
