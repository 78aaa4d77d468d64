// SPDX-License-Identifier: MIT
//
// ConsoleApp — one frame buffer, one visual tree, one pump thread.
//
// The app owns everything that is not thread-safe: the frame buffer, the
// compositor and its shadow state, the console, the visual tree and the
// focus manager. Once `begin` runs, the calling thread is the app's pump
// thread and every mutating call checks it. Other threads go through a
// `Dispatcher`.
//
// A drain cycle takes every message currently queued, runs work and keys
// in order, then settles the deferred requests: resize first (so the
// paint sees the new size), then at most one paint, then teardown if a
// stop was queued. An error anywhere in the cycle is fatal: the app tears
// down as best it can, ends `Stopped`, and the error goes to the caller.

use std::cell::RefCell;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use cellpump_term::color::DEFAULT_BG;
use cellpump_term::input::{KeyCode, KeyEvent};
use cellpump_term::{Cell, Compositor, Console, FrameBuffer, PaintStats};
use log::{debug, error, info, warn};

use crate::canvas::Canvas;
use crate::config::AppConfig;
use crate::controls::Panel;
use crate::error::AppError;
use crate::event::Event;
use crate::focus::{FocusManager, GlobalKeyHandlers};
use crate::pump::{AppId, Cycle, Dispatcher, Lifecycle, Message, SharedLifecycle};
use crate::recorder::FrameRecorder;
use crate::tree::{Control, NodeId, NodeState, Rect, Tree};

thread_local! {
    /// The app whose pump runs on this thread.
    static CURRENT: RefCell<Option<Dispatcher>> = const { RefCell::new(None) };
}

/// Frame size for a full-screen app: the console minus its last row, so
/// writing the bottom-right cell never scrolls.
fn frame_size(console: &dyn Console) -> Option<(u16, u16)> {
    let w = u16::try_from(console.width()).ok()?;
    let h = u16::try_from(console.height().saturating_sub(1)).ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

fn wrong_thread(app: AppId) -> AppError {
    let t = thread::current();
    AppError::WrongThread {
        app,
        thread: t
            .name()
            .map_or_else(|| format!("{:?}", t.id()), str::to_owned),
    }
}

/// Where one node paints, in absolute buffer coordinates.
struct PaintJob {
    id: NodeId,
    origin: (i32, i32),
    size: (u16, u16),
    clip: (i32, i32, i32, i32),
}

/// Pre-order paint list: every node with its origin and its clip, the
/// intersection of its own rectangle with its ancestors'.
fn layout(
    tree: &Tree,
    id: NodeId,
    parent: (i32, i32),
    clip: (i32, i32, i32, i32),
    out: &mut Vec<PaintJob>,
) {
    let Some(b) = tree.bounds(id) else {
        return;
    };
    let origin = (parent.0 + i32::from(b.x), parent.1 + i32::from(b.y));
    let clip = (
        clip.0.max(origin.0),
        clip.1.max(origin.1),
        clip.2.min(origin.0 + i32::from(b.w)),
        clip.3.min(origin.1 + i32::from(b.h)),
    );
    if clip.2 <= clip.0 || clip.3 <= clip.1 {
        return;
    }
    out.push(PaintJob {
        id,
        origin,
        size: (b.w, b.h),
        clip,
    });
    for &child in tree.children(id) {
        layout(tree, child, origin, clip, out);
    }
}

// ─── ConsoleApp ─────────────────────────────────────────────────────────────

/// A terminal application driven by a single-threaded pump.
///
/// # Example
///
/// ```
/// use cellpump_app::{AppConfig, ConsoleApp, Label, Rect};
/// use cellpump_term::MemoryConsole;
///
/// let console = MemoryConsole::new(20, 3);
/// let mut app = ConsoleApp::new(console.clone(), AppConfig::fixed(20, 2));
/// let root = app.root();
/// app.add(root, Label::new("hello"), Rect::sized(5, 1))?;
///
/// app.begin()?;
/// app.pump_once()?;
/// assert_eq!(console.row_text(0).trim_end(), "hello");
/// # Ok::<(), cellpump_app::AppError>(())
/// ```
pub struct ConsoleApp {
    id: AppId,
    config: AppConfig,
    buffer: FrameBuffer,
    compositor: Compositor,
    console: Box<dyn Console>,
    tree: Tree,
    focus: FocusManager,
    recorder: Option<Box<dyn FrameRecorder>>,

    tx: Sender<Message>,
    rx: Receiver<Message>,
    lifecycle: SharedLifecycle,
    owner: Option<ThreadId>,
    started_at: Option<Instant>,
    cycle: Cycle,

    stopping: Event<()>,
    stopped: Event<()>,
    control_added: Event<NodeId>,
    control_removed: Event<NodeId>,
    after_paint: Event<PaintStats>,
}

impl ConsoleApp {
    /// Create an app drawing to `console`. Nothing is written until the
    /// pump starts.
    pub fn new(console: impl Console + 'static, config: AppConfig) -> Self {
        let console: Box<dyn Console> = Box::new(console);
        let (w, h) = config
            .size
            .or_else(|| frame_size(console.as_ref()))
            .unwrap_or((0, 0));
        let (tx, rx) = mpsc::channel();
        Self {
            id: AppId::next(),
            config,
            buffer: FrameBuffer::new(w, h),
            compositor: Compositor::new(config.render_mode),
            console,
            tree: Tree::new(Box::new(Panel::new()), Rect::sized(w, h)),
            focus: FocusManager::new(),
            recorder: None,
            tx,
            rx,
            lifecycle: SharedLifecycle::new(),
            owner: None,
            started_at: None,
            cycle: Cycle::default(),
            stopping: Event::new(),
            stopped: Event::new(),
            control_added: Event::new(),
            control_removed: Event::new(),
            after_paint: Event::new(),
        }
    }

    // ─── Identity & threading ────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub const fn id(&self) -> AppId {
        self.id
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.get()
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// A handle other threads can use to queue work.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.id, self.tx.clone(), self.lifecycle.clone())
    }

    /// Dispatcher of the app whose pump runs on the calling thread.
    #[must_use]
    pub fn current() -> Option<Dispatcher> {
        CURRENT.with(|c| c.borrow().clone())
    }

    /// Check that the calling thread runs the pump of app `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::WrongThread`] otherwise.
    pub fn assert_app_thread(expected: AppId) -> Result<(), AppError> {
        match Self::current() {
            Some(d) if d.app_id() == expected => Ok(()),
            _ => Err(wrong_thread(expected)),
        }
    }

    fn guard(&self) -> Result<(), AppError> {
        match self.owner {
            Some(owner) if owner != thread::current().id() => Err(wrong_thread(self.id)),
            _ => Ok(()),
        }
    }

    /// Thread check, and refuse once stopped.
    fn guard_live(&self) -> Result<(), AppError> {
        self.guard()?;
        if self.lifecycle.get() == Lifecycle::Stopped {
            return Err(AppError::Stopped);
        }
        Ok(())
    }

    fn post(&self, msg: Message) {
        // The app holds the receiver, so the channel is always open.
        let _ = self.tx.send(msg);
    }

    fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.tree.root()
    }

    #[must_use]
    pub const fn tree(&self) -> &Tree {
        &self.tree
    }

    #[must_use]
    pub const fn focus(&self) -> &FocusManager {
        &self.focus
    }

    #[must_use]
    pub const fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    #[must_use]
    pub fn console(&self) -> &dyn Console {
        self.console.as_ref()
    }

    #[must_use]
    pub const fn stopping(&self) -> &Event<()> {
        &self.stopping
    }

    #[must_use]
    pub const fn stopped(&self) -> &Event<()> {
        &self.stopped
    }

    #[must_use]
    pub const fn control_added(&self) -> &Event<NodeId> {
        &self.control_added
    }

    #[must_use]
    pub const fn control_removed(&self) -> &Event<NodeId> {
        &self.control_removed
    }

    #[must_use]
    pub const fn after_paint(&self) -> &Event<PaintStats> {
        &self.after_paint
    }

    /// Global key handlers, consulted before anything else.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::WrongThread`] off the pump thread.
    pub fn global_keys(&mut self) -> Result<&mut GlobalKeyHandlers, AppError> {
        self.guard()?;
        Ok(self.focus.global_keys())
    }

    /// The control of node `id` as its concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::WrongThread`] off the pump thread, and
    /// [`AppError::UnknownNode`] if `id` is stale or not a `T`.
    pub fn control_mut<T: Control + 'static>(&mut self, id: NodeId) -> Result<&mut T, AppError> {
        self.guard()?;
        self.tree.get_mut::<T>(id).ok_or(AppError::UnknownNode(id))
    }

    /// Install the frame recorder.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::WrongThread`] off the pump thread.
    pub fn set_recorder(&mut self, recorder: impl FrameRecorder + 'static) -> Result<(), AppError> {
        self.guard_live()?;
        self.recorder = Some(Box::new(recorder));
        Ok(())
    }

    // ─── Visual tree ─────────────────────────────────────────────────────

    /// Create a node and attach it under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UnknownNode`] if `parent` is not live.
    pub fn add(
        &mut self,
        parent: NodeId,
        control: impl Control + 'static,
        bounds: Rect,
    ) -> Result<NodeId, AppError> {
        self.guard_live()?;
        if !self.tree.contains(parent) {
            return Err(AppError::UnknownNode(parent));
        }
        let id = self.tree.insert(Box::new(control), bounds);
        self.attach(parent, id)?;
        Ok(id)
    }

    /// Create a detached node, to be placed later with [`attach`].
    ///
    /// [`attach`]: Self::attach
    ///
    /// # Errors
    ///
    /// Returns [`AppError::WrongThread`] off the pump thread.
    pub fn create(&mut self, control: impl Control + 'static, bounds: Rect) -> Result<NodeId, AppError> {
        self.guard_live()?;
        Ok(self.tree.insert(Box::new(control), bounds))
    }

    /// Make parentless `child` (with its subtree) the last child of
    /// `parent`. If `parent` is attached, the subtree is attached too:
    /// hooks run, nodes register for focus and `control_added` fires,
    /// parents before children.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UnknownNode`] for a stale id and
    /// [`AppError::InvalidAttach`] if `child` already has a parent or
    /// `parent` lies inside `child`'s subtree.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<(), AppError> {
        self.guard_live()?;
        for id in [parent, child] {
            if !self.tree.contains(id) {
                return Err(AppError::UnknownNode(id));
            }
        }
        if child == self.root()
            || self.tree.parent(child).is_some()
            || self.tree.is_within(parent, child)
        {
            return Err(AppError::InvalidAttach(child));
        }

        self.tree.link(parent, child);
        if self.tree.is_attached(parent) {
            for id in self.tree.pre_order(child) {
                if let Some(c) = self.tree.control_mut(id) {
                    c.before_added();
                }
                self.tree.set_attached(id, true);
                self.focus.register(id);
                if let Some(c) = self.tree.control_mut(id) {
                    c.added();
                }
                self.control_added.fire(&id);
            }
            self.cycle.request_paint(None);
        }
        Ok(())
    }

    fn check_removable(&self, id: NodeId) -> Result<(), AppError> {
        if id == self.root() {
            return Err(AppError::RootRemoval);
        }
        if !self.tree.contains(id) {
            return Err(AppError::UnknownNode(id));
        }
        if let Some(parent) = self.tree.parent(id).and_then(|p| self.tree.control(p)) {
            if !parent.accepts_child_removal() {
                return Err(AppError::Unsupported {
                    parent: parent.type_name(),
                });
            }
        }
        Ok(())
    }

    /// Remove `id` from its parent and dispose its subtree.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Unsupported`] if the parent does not accept
    /// child removal, [`AppError::RootRemoval`] for the root and
    /// [`AppError::UnknownNode`] for a stale id.
    pub fn remove(&mut self, id: NodeId) -> Result<(), AppError> {
        self.guard_live()?;
        self.check_removable(id)?;
        self.detach(id);
        Ok(())
    }

    /// Dispose `id`. A node with a parent is detached first, which needs
    /// the same capability as [`remove`](Self::remove).
    ///
    /// # Errors
    ///
    /// Same as [`remove`](Self::remove).
    pub fn dispose(&mut self, id: NodeId) -> Result<(), AppError> {
        self.guard_live()?;
        self.check_removable(id)?;
        self.tree.set_state(id, NodeState::Disposing);
        self.detach(id);
        Ok(())
    }

    /// Unlink `top`, run the removal protocol on its subtree (children
    /// first) and free every node.
    fn detach(&mut self, top: NodeId) {
        let was_attached = self.tree.is_attached(top);
        self.tree.unlink(top);

        let nodes = self.tree.post_order(top);
        for &n in &nodes {
            if self.tree.state(n) == Some(NodeState::Alive) {
                self.tree.set_state(n, NodeState::BeingRemoved);
            }
        }

        let mut focus_lost = false;
        for &n in &nodes {
            if was_attached {
                if let Some(c) = self.tree.control_mut(n) {
                    c.before_removed();
                }
                if self.focus.focused() == Some(n) {
                    self.focus.clear_focus(&mut self.tree);
                    focus_lost = true;
                }
                self.focus.unregister(n);
                if let Some(c) = self.tree.control_mut(n) {
                    c.removed();
                }
                self.tree.set_attached(n, false);
                self.control_removed.fire(&n);
            }
            if self.tree.state(n) != Some(NodeState::Disposed) {
                self.tree.set_state(n, NodeState::Disposing);
                if let Some(c) = self.tree.control_mut(n) {
                    c.disposed();
                }
                self.tree.set_state(n, NodeState::Disposed);
            }
        }
        for &n in &nodes {
            self.tree.free(n);
        }

        if focus_lost {
            self.focus.try_restore_focus(&mut self.tree);
        }
        debug!("{}: detached {} node(s) under {top}", self.id, nodes.len());
        if was_attached {
            self.cycle.request_paint(None);
        }
    }

    /// Move `id`. Takes effect at the next paint, which this requests.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UnknownNode`] for a stale id.
    pub fn set_bounds(&mut self, id: NodeId, bounds: Rect) -> Result<(), AppError> {
        self.guard_live()?;
        if !self.tree.set_bounds(id, bounds) {
            return Err(AppError::UnknownNode(id));
        }
        self.cycle.request_paint(None);
        Ok(())
    }

    // ─── Focus ───────────────────────────────────────────────────────────

    /// Focus `id`. Returns `false` if it cannot take focus.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::WrongThread`] off the pump thread.
    pub fn set_focus(&mut self, id: NodeId) -> Result<bool, AppError> {
        self.guard_live()?;
        let moved = self.focus.set_focus(&mut self.tree, id);
        if moved {
            self.cycle.request_paint(None);
        }
        Ok(moved)
    }

    /// Tab-order focus move.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::WrongThread`] off the pump thread.
    pub fn move_focus(&mut self, forward: bool) -> Result<bool, AppError> {
        self.guard_live()?;
        let moved = self.focus.try_move_focus(&mut self.tree, forward);
        if moved {
            self.cycle.request_paint(None);
        }
        Ok(moved)
    }

    // ─── Requests ────────────────────────────────────────────────────────

    /// Repaint at the end of the current (or next) drain cycle.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::WrongThread`] off the pump thread.
    pub fn request_paint(&mut self) -> Result<(), AppError> {
        self.guard()?;
        self.cycle.request_paint(None);
        Ok(())
    }

    /// Stop after the work already queued. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::WrongThread`] off the pump thread.
    pub fn stop(&mut self) -> Result<(), AppError> {
        self.guard()?;
        if self.lifecycle.begin_stop() {
            info!("{}: stop requested", self.id);
            self.post(Message::Stop);
        }
        Ok(())
    }

    // ─── Pump ────────────────────────────────────────────────────────────

    /// Make the calling thread the pump thread and queue the start-up work:
    /// the initial focus move (if configured) and the first paint.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AlreadyStarted`] or [`AppError::AlreadyStopped`]
    /// when not freshly created, and [`AppError::ThreadBusy`] if this
    /// thread already pumps another app.
    pub fn begin(&mut self) -> Result<(), AppError> {
        match self.lifecycle.get() {
            Lifecycle::Created => {}
            Lifecycle::Started | Lifecycle::Running => return Err(AppError::AlreadyStarted),
            Lifecycle::Stopping | Lifecycle::Stopped => return Err(AppError::AlreadyStopped),
        }
        if let Some(other) = Self::current() {
            return Err(AppError::ThreadBusy(other.app_id()));
        }
        if !self.lifecycle.advance(Lifecycle::Created, Lifecycle::Started) {
            return Err(AppError::AlreadyStopped);
        }

        self.owner = Some(thread::current().id());
        self.started_at = Some(Instant::now());
        let dispatcher = self.dispatcher();
        CURRENT.with(|c| *c.borrow_mut() = Some(dispatcher));
        info!(
            "{} started: {}x{}, {:?}",
            self.id,
            self.buffer.width(),
            self.buffer.height(),
            self.compositor.mode()
        );

        if self.config.set_focus_on_start {
            self.post(Message::Work(Box::new(|app: &mut Self| {
                app.move_focus(true).map(|_| ())
            })));
        }
        self.post(Message::Paint(None));
        Ok(())
    }

    /// Run one drain cycle over what is queued right now, without blocking.
    /// Messages queued during the cycle wait for the next one.
    ///
    /// Returns `Ok(false)` once the app has stopped.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotStarted`] before [`begin`](Self::begin),
    /// [`AppError::WrongThread`] off the pump thread, and any fatal error
    /// raised during the cycle (after which the app is stopped).
    pub fn pump_once(&mut self) -> Result<bool, AppError> {
        self.guard()?;
        match self.lifecycle.get() {
            Lifecycle::Created => return Err(AppError::NotStarted),
            Lifecycle::Stopped => return Ok(false),
            _ => {}
        }
        let first = self.rx.try_recv().ok();
        if first.is_none() && !self.cycle.is_pending() {
            return Ok(true);
        }
        self.cycle_with(first)
    }

    /// Pump on the calling thread until the app stops.
    ///
    /// # Errors
    ///
    /// Returns start-up errors from [`begin`](Self::begin) and the first
    /// fatal error of any cycle.
    pub fn run(&mut self) -> Result<(), AppError> {
        self.begin()?;
        loop {
            let first = if self.cycle.is_pending() {
                self.rx.try_recv().ok()
            } else {
                match self.rx.recv() {
                    Ok(msg) => Some(msg),
                    Err(_) => break,
                }
            };
            if !self.cycle_with(first)? {
                break;
            }
        }
        Ok(())
    }

    /// Run the pump on a new thread.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AlreadyStarted`] or [`AppError::AlreadyStopped`]
    /// when not freshly created, and [`AppError::Io`] if the thread cannot
    /// be spawned.
    pub fn start(mut self) -> Result<RunningApp, AppError> {
        match self.lifecycle.get() {
            Lifecycle::Created => {}
            Lifecycle::Started | Lifecycle::Running => return Err(AppError::AlreadyStarted),
            Lifecycle::Stopping | Lifecycle::Stopped => return Err(AppError::AlreadyStopped),
        }
        let dispatcher = self.dispatcher();
        let handle = thread::Builder::new()
            .name(format!("pump-{}", self.id))
            .spawn(move || self.run())?;
        Ok(RunningApp {
            dispatcher,
            handle: Some(handle),
        })
    }

    fn cycle_with(&mut self, first: Option<Message>) -> Result<bool, AppError> {
        match self.drain(first) {
            Ok(alive) => Ok(alive),
            Err(e) => {
                error!("{}: fatal error, stopping: {e}", self.id);
                self.abort();
                Err(e)
            }
        }
    }

    fn drain(&mut self, first: Option<Message>) -> Result<bool, AppError> {
        self.lifecycle.advance(Lifecycle::Started, Lifecycle::Running);
        self.post(Message::CycleEnd);

        let mut next = first;
        while let Some(msg) = next.take() {
            match msg {
                Message::Work(work) => work(self)?,
                Message::Paint(receipt) => self.cycle.request_paint(receipt),
                Message::Key(key) => self.dispatch_key(key)?,
                Message::Resize => self.cycle.request_resize(),
                Message::Stop => {
                    self.cycle.stop = true;
                    break;
                }
                Message::CycleEnd => {
                    if self.lifecycle.get() != Lifecycle::Stopping {
                        break;
                    }
                }
            }
            next = self.rx.try_recv().ok();
        }

        if self.cycle.resize {
            self.handle_resize();
        }
        if self.cycle.paint {
            self.paint_now()?;
            self.cycle.complete_paints();
        }
        if self.cycle.stop {
            self.teardown()?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Route a key: global handlers, then Tab/Shift+Tab focus moves, then
    /// Escape, then the focused node.
    fn dispatch_key(&mut self, key: KeyEvent) -> Result<(), AppError> {
        if !self.focus.global_keys().try_intercept(&key) {
            if key.code == KeyCode::Escape {
                return self.stop();
            }
            if key.is_tab() || key.is_back_tab() {
                self.focus.try_move_focus(&mut self.tree, key.is_tab());
            } else if let Some(id) = self
                .focus
                .focused()
                .filter(|&id| self.tree.state(id) == Some(NodeState::Alive))
            {
                if let Some(c) = self.tree.control_mut(id) {
                    c.handle_key(&key);
                }
            }
        }
        self.cycle.request_paint(None);
        Ok(())
    }

    /// Settle a burst of resize notifications against the console's
    /// current size.
    fn handle_resize(&mut self) {
        let requests = std::mem::take(&mut self.cycle.resize_requests);
        self.cycle.resize = false;

        let Some((w, h)) = frame_size(self.console.as_ref()) else {
            debug!(
                "{}: ignoring resize to {}x{}",
                self.id,
                self.console.width(),
                self.console.height()
            );
            return;
        };
        if self.config.auto_fill_on_resize {
            self.buffer.resize(w, h);
            let root = self.root();
            self.tree.set_bounds(root, Rect::sized(w, h));
            debug!("{}: resized to {w}x{h} ({requests} notification(s))", self.id);
        }
        self.cycle.request_paint(None);
    }

    /// Compose the tree into the buffer and composite it to the console.
    fn paint_now(&mut self) -> Result<(), AppError> {
        let area = self.tree.bounds(self.root()).unwrap_or_default();
        self.buffer.fill_rect_with(
            Cell::background(DEFAULT_BG),
            0,
            0,
            i32::from(area.w),
            i32::from(area.h),
        );

        let mut jobs = Vec::new();
        let full = (
            0,
            0,
            i32::from(self.buffer.width()),
            i32::from(self.buffer.height()),
        );
        layout(&self.tree, self.root(), (0, 0), full, &mut jobs);
        let focused = self.focus.focused();
        for job in jobs {
            if let Some(control) = self.tree.control_mut(job.id) {
                let mut canvas = Canvas::new(
                    &mut self.buffer,
                    job.origin,
                    job.size,
                    job.clip,
                    focused == Some(job.id),
                );
                control.paint(&mut canvas);
            }
        }

        let timestamp = self.elapsed();
        if let Some(rec) = self.recorder.as_mut() {
            rec.write_frame(&self.buffer, false, timestamp)?;
        }
        let stats = self.compositor.paint(&mut self.buffer, self.console.as_mut())?;
        self.after_paint.fire(&stats);
        Ok(())
    }

    // ─── Shutdown ────────────────────────────────────────────────────────

    /// Stopping: notify, flush the recorder with a full frame, wipe the
    /// console. Then release everything and end `Stopped`.
    fn teardown(&mut self) -> Result<(), AppError> {
        info!("{}: stopping", self.id);
        self.stopping.fire(&());

        let mut first_err: Option<AppError> = None;
        if let Some(mut rec) = self.recorder.take() {
            let ts = self.elapsed();
            let flushed = rec
                .write_frame(&self.buffer, true, ts)
                .and_then(|()| rec.finish());
            if let Err(e) = flushed {
                first_err.get_or_insert(e.into());
            }
        }
        if let Err(e) = self.console.clear().and_then(|()| self.console.reset_colors()) {
            first_err.get_or_insert(e.into());
        }

        self.release();
        first_err.map_or(Ok(()), Err)
    }

    fn release(&mut self) {
        self.lifecycle.set(Lifecycle::Stopped);
        // Sends that raced the stop; dropping them disconnects their receipts.
        let dropped = self.rx.try_iter().count();
        if dropped > 0 {
            debug!("{}: dropped {dropped} message(s) queued behind the stop", self.id);
        }
        let id = self.id;
        let _ = CURRENT.try_with(|c| {
            let mut c = c.borrow_mut();
            if c.as_ref().is_some_and(|d| d.app_id() == id) {
                *c = None;
            }
        });
        self.stopped.fire(&());

        let root = self.root();
        for child in self.tree.children(root).to_vec() {
            self.detach(child);
        }
        self.cycle = Cycle::default();
        self.buffer.resize(0, 0);
        info!("{}: stopped", self.id);
    }

    /// Best-effort teardown after a fatal error.
    fn abort(&mut self) {
        self.cycle = Cycle::default();
        if self.lifecycle.get() == Lifecycle::Stopped {
            return;
        }
        self.lifecycle.begin_stop();
        if let Err(e) = self.teardown() {
            warn!("{}: teardown after failure also failed: {e}", self.id);
        }
    }
}

impl Drop for ConsoleApp {
    fn drop(&mut self) {
        let id = self.id;
        let _ = CURRENT.try_with(|c| {
            if let Ok(mut c) = c.try_borrow_mut() {
                if c.as_ref().is_some_and(|d| d.app_id() == id) {
                    *c = None;
                }
            }
        });
    }
}

// ─── RunningApp ─────────────────────────────────────────────────────────────

/// An app pumping on its own thread. Dropping it stops the app and waits.
pub struct RunningApp {
    dispatcher: Dispatcher,
    handle: Option<JoinHandle<Result<(), AppError>>>,
}

impl RunningApp {
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Wait for the pump to finish on its own.
    ///
    /// # Errors
    ///
    /// Returns the pump's fatal error, or [`AppError::PumpPanicked`].
    pub fn join(mut self) -> Result<(), AppError> {
        self.handle
            .take()
            .map_or(Ok(()), |h| h.join().unwrap_or(Err(AppError::PumpPanicked)))
    }

    /// Request a stop and wait for teardown.
    ///
    /// # Errors
    ///
    /// Same as [`join`](Self::join).
    pub fn stop(self) -> Result<(), AppError> {
        self.dispatcher.request_stop();
        self.join()
    }
}

impl Drop for RunningApp {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.dispatcher.request_stop();
            let _ = handle.join();
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::Label;
    use cellpump_term::{MemoryConsole, RenderMode};
    use pretty_assertions::assert_eq;

    fn app(w: i32, h: i32) -> (ConsoleApp, MemoryConsole) {
        let console = MemoryConsole::new(w, h);
        let config = AppConfig::default().with_render_mode(RenderMode::TrueColor);
        (ConsoleApp::new(console.clone(), config), console)
    }

    // ── Sizing ──────────────────────────────────────────────────────────

    #[test]
    fn full_screen_frame_leaves_last_row() {
        let (app, _) = app(12, 5);
        assert_eq!((app.buffer().width(), app.buffer().height()), (12, 4));
        assert_eq!(app.tree().bounds(app.root()), Some(Rect::sized(12, 4)));
    }

    #[test]
    fn fixed_size_wins() {
        let console = MemoryConsole::new(80, 24);
        let app = ConsoleApp::new(console, AppConfig::fixed(10, 3));
        assert_eq!((app.buffer().width(), app.buffer().height()), (10, 3));
    }

    // ── Layout ──────────────────────────────────────────────────────────

    #[test]
    fn nested_nodes_paint_at_absolute_positions() {
        let (mut app, console) = app(10, 4);
        let root = app.root();
        let panel = app.add(root, Panel::new(), Rect::new(2, 1, 6, 2)).unwrap();
        app.add(panel, Label::new("abcdefgh"), Rect::new(1, 1, 3, 1))
            .unwrap();
        app.begin().unwrap();
        app.pump_once().unwrap();
        assert_eq!(console.row_text(2), "   abc    ");
    }

    #[test]
    fn lifecycle_progresses() {
        let (mut app, _) = app(5, 3);
        assert_eq!(app.lifecycle(), Lifecycle::Created);
        assert!(matches!(app.pump_once(), Err(AppError::NotStarted)));
        app.begin().unwrap();
        assert_eq!(app.lifecycle(), Lifecycle::Started);
        app.pump_once().unwrap();
        assert_eq!(app.lifecycle(), Lifecycle::Running);
        app.stop().unwrap();
        assert_eq!(app.lifecycle(), Lifecycle::Stopping);
        assert!(!app.pump_once().unwrap());
        assert_eq!(app.lifecycle(), Lifecycle::Stopped);
        assert!(matches!(app.begin(), Err(AppError::AlreadyStopped)));
    }

    #[test]
    fn begin_twice_fails() {
        let (mut app, _) = app(5, 3);
        app.begin().unwrap();
        assert!(matches!(app.begin(), Err(AppError::AlreadyStarted)));
    }

    #[test]
    fn current_is_registered_for_the_pump_thread() {
        let (mut app, _) = app(5, 3);
        let id = app.id();
        assert!(ConsoleApp::assert_app_thread(id).is_err());
        app.begin().unwrap();
        assert_eq!(ConsoleApp::current().map(|d| d.app_id()), Some(id));
        ConsoleApp::assert_app_thread(id).unwrap();

        let (mut other, _) = self::app(5, 3);
        assert!(matches!(other.begin(), Err(AppError::ThreadBusy(busy)) if busy == id));

        app.stop().unwrap();
        app.pump_once().unwrap();
        assert!(ConsoleApp::current().is_none());
    }

    // ── Hooks ───────────────────────────────────────────────────────────

    struct HookLog {
        name: &'static str,
        log: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl HookLog {
        fn push(&self, hook: &str) {
            self.log.lock().unwrap().push(format!("{}:{hook}", self.name));
        }
    }

    impl Control for HookLog {
        fn accepts_child_removal(&self) -> bool {
            true
        }
        fn before_added(&mut self) {
            self.push("before_added");
        }
        fn added(&mut self) {
            self.push("added");
        }
        fn before_removed(&mut self) {
            self.push("before_removed");
        }
        fn removed(&mut self) {
            self.push("removed");
        }
        fn disposed(&mut self) {
            self.push("disposed");
        }
    }

    #[test]
    fn hooks_run_parents_first_on_attach_and_children_first_on_detach() {
        let (mut app, _) = app(5, 3);
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let logged = |name| HookLog {
            name,
            log: std::sync::Arc::clone(&log),
        };
        let parent = app.create(logged("p"), Rect::sized(5, 2)).unwrap();
        app.add(parent, logged("c"), Rect::sized(1, 1)).unwrap();
        assert!(log.lock().unwrap().is_empty());

        let root = app.root();
        app.attach(root, parent).unwrap();
        app.remove(parent).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            [
                "p:before_added",
                "p:added",
                "c:before_added",
                "c:added",
                "c:before_removed",
                "c:removed",
                "c:disposed",
                "p:before_removed",
                "p:removed",
                "p:disposed",
            ]
        );
    }

    #[test]
    fn messages_behind_the_stop_release_their_receipts() {
        let (mut app, _) = app(5, 3);
        app.begin().unwrap();
        app.pump_once().unwrap();

        app.stop().unwrap();
        let (tx, rx) = mpsc::channel();
        app.post(Message::Paint(Some(tx)));

        assert!(!app.pump_once().unwrap());
        assert!(matches!(rx.try_recv(), Err(mpsc::TryRecvError::Disconnected)));
    }

    #[test]
    fn work_errors_are_fatal() {
        let (mut app, _) = app(5, 3);
        app.begin().unwrap();
        app.dispatcher()
            .queue(|_| Err(AppError::RootRemoval))
            .unwrap();
        assert!(matches!(app.pump_once(), Err(AppError::RootRemoval)));
        assert_eq!(app.lifecycle(), Lifecycle::Stopped);
    }
}
