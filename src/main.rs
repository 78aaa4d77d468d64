// SPDX-License-Identifier: MIT
//
// cellpump — a small live dashboard on top of the cellpump crates.
//
//   cellpump-term → frame buffer, compositor, console, terminal, input
//   cellpump-app  → the pump: visual tree, focus, paint coalescing
//
// Threads:
//
//   main          → terminal setup, resize polling, shutdown
//   pump-app#N    → owns the app; every paint happens here
//   stdin-reader  → keys → dispatcher.send_key
//   ticker        → once a second, queues a status update
//
// Layout:
//
//   ┌──────────────────────────────┐
//   │ title                        │
//   │ [ counter A ]  ████████      │  ← Tab / Shift+Tab moves focus
//   │ [ counter B ]  ███           │  ← +/- or ↑/↓ change the focused one
//   │ uptime · last paint stats    │
//   │ help                         │
//   └──────────────────────────────┘

use std::env;
use std::process;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cellpump_app::{
    AppConfig, AppError, Canvas, ConsoleApp, Control, Dispatcher, Label, Lifecycle, NodeId, Panel,
    Rect,
};
use cellpump_term::color::{DEFAULT_BG, DEFAULT_FG};
use cellpump_term::input::{KeyCode, KeyEvent, Modifiers};
use cellpump_term::reader::StdinReader;
use cellpump_term::terminal::{self, Terminal};
use cellpump_term::{Cell, PaintStats, RenderMode, Rgb, StdConsole};
use log::{debug, info};

const USAGE: &str = "usage: cellpump [--legacy | --truecolor]";

/// How often the main thread checks for a pending resize.
const RESIZE_POLL: Duration = Duration::from_millis(50);

const TICK: Duration = Duration::from_secs(1);

// ─── Controls ───────────────────────────────────────────────────────────────

/// A focusable number with a bar next to it.
#[derive(Debug)]
struct Counter {
    name: &'static str,
    value: i32,
    color: Rgb,
}

impl Counter {
    const MAX: i32 = 20;

    const fn new(name: &'static str, value: i32, color: Rgb) -> Self {
        Self { name, value, color }
    }
}

impl Control for Counter {
    fn paint(&mut self, canvas: &mut Canvas<'_>) {
        let (fg, bg) = if canvas.is_focused() {
            (Rgb::BLACK, self.color)
        } else {
            (DEFAULT_FG, DEFAULT_BG)
        };
        let text = format!("[ {} {:>3} ]", self.name, self.value);
        canvas.draw_text(&text, 0, 0, fg, bg);

        let start = i32::try_from(text.chars().count()).unwrap_or(0) + 2;
        if self.value > 0 {
            let bar = Cell::styled('█', self.color, DEFAULT_BG);
            canvas.draw_line(bar, start, 0, start + self.value, 0);
        }
    }

    fn handle_key(&mut self, key: &KeyEvent) {
        match key.code {
            KeyCode::Char('+') | KeyCode::Up => self.value = (self.value + 1).min(Self::MAX),
            KeyCode::Char('-') | KeyCode::Down => self.value = (self.value - 1).max(0),
            KeyCode::Char('0') => self.value = 0,
            _ => {}
        }
    }

    fn can_focus(&self) -> bool {
        true
    }
}

// ─── Dashboard ──────────────────────────────────────────────────────────────

struct Dashboard {
    status: NodeId,
}

fn build(app: &mut ConsoleApp) -> Result<Dashboard, AppError> {
    let root = app.root();
    let size = app.tree().bounds(root).unwrap_or_default();
    let body = app.add(
        root,
        Panel::with_background(Rgb::new(16, 16, 32)),
        Rect::sized(size.w, size.h),
    )?;

    app.add(
        body,
        Label::new("cellpump dashboard").with_colors(Rgb::WHITE, Rgb::DARK_BLUE),
        Rect::new(1, 0, 18, 1),
    )?;
    app.add(body, Counter::new("A", 8, Rgb::CYAN), Rect::new(1, 2, 40, 1))?;
    app.add(body, Counter::new("B", 3, Rgb::YELLOW), Rect::new(1, 3, 40, 1))?;
    let status = app.add(body, Label::new(""), Rect::new(1, 5, 60, 1))?;
    app.add(
        body,
        Label::new("Tab: focus   +/-: change   Esc / Ctrl+C: quit")
            .with_colors(Rgb::DARK_GRAY, DEFAULT_BG),
        Rect::new(1, 7, 60, 1),
    )?;

    let stop = app.dispatcher();
    app.global_keys()?
        .register(KeyCode::Char('c'), Modifiers::CTRL, move |_| stop.request_stop());

    Ok(Dashboard { status })
}

fn status_line(uptime: Duration, stats: PaintStats) -> String {
    format!(
        "up {:>4}s   last paint: {} chunk(s), {} cell(s), {} byte(s)",
        uptime.as_secs(),
        stats.chunks,
        stats.cells,
        stats.bytes
    )
}

/// Queue a status update every tick until the app stops taking work.
fn spawn_ticker(
    dispatcher: Dispatcher,
    status: NodeId,
    last_paint: Arc<Mutex<PaintStats>>,
) -> std::io::Result<thread::JoinHandle<()>> {
    let started = Instant::now();
    thread::Builder::new()
        .name("ticker".into())
        .spawn(move || {
            loop {
                let stats = last_paint.lock().map(|s| *s).unwrap_or_default();
                let text = status_line(started.elapsed(), stats);
                let queued = dispatcher.queue(move |app| {
                    app.control_mut::<Label>(status)?.set_text(text);
                    app.request_paint()
                });
                if queued.is_err() {
                    break;
                }
                thread::sleep(TICK);
            }
            debug!("ticker exiting");
        })
}

// ─── Main ───────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Cli {
    Run(Option<RenderMode>),
    Help,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Cli, String> {
    let mut mode = None;
    for arg in args {
        match arg.as_str() {
            "--legacy" => mode = Some(RenderMode::Legacy),
            "--truecolor" => mode = Some(RenderMode::TrueColor),
            "-h" | "--help" => return Ok(Cli::Help),
            other => return Err(format!("unknown argument `{other}`")),
        }
    }
    Ok(Cli::Run(mode))
}

fn run(mode: Option<RenderMode>) -> Result<(), AppError> {
    let mut config = AppConfig::from_env();
    if let Some(mode) = mode {
        config = config.with_render_mode(mode);
    }
    info!("render mode {:?}", config.render_mode);

    let mut term = Terminal::new();
    term.enter()?;
    terminal::install_resize_handler();

    let mut app = ConsoleApp::new(StdConsole::new(), config);
    let dashboard = build(&mut app)?;

    let last_paint = Arc::new(Mutex::new(PaintStats::default()));
    let sink = Arc::clone(&last_paint);
    app.after_paint().subscribe(move |stats| {
        if let Ok(mut s) = sink.lock() {
            *s = *stats;
        }
    });

    let running = app.start()?;
    let dispatcher = running.dispatcher().clone();

    let keys = dispatcher.clone();
    let mut reader = StdinReader::spawn(move |key| keys.send_key(key).is_ok())?;
    let ticker = spawn_ticker(dispatcher.clone(), dashboard.status, last_paint)?;

    while dispatcher.lifecycle() != Lifecycle::Stopped {
        if terminal::take_resize() && dispatcher.notify_resize().is_err() {
            break;
        }
        if reader.is_finished() {
            dispatcher.request_stop();
        }
        thread::sleep(RESIZE_POLL);
    }

    let result = running.join();
    reader.stop();
    let _ = ticker.join();
    term.leave()?;
    result
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mode = match parse_args(env::args().skip(1)) {
        Ok(Cli::Run(mode)) => mode,
        Ok(Cli::Help) => {
            println!("{USAGE}");
            return;
        }
        Err(msg) => {
            eprintln!("cellpump: {msg}\n{USAGE}");
            process::exit(2);
        }
    };

    if let Err(e) = run(mode) {
        eprintln!("cellpump: {e}");
        process::exit(1);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use cellpump_term::MemoryConsole;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    // ── Arguments ─────────────────────────────────────────────────────────

    #[test]
    fn no_args_uses_detected_mode() {
        assert_eq!(parse_args(args(&[])), Ok(Cli::Run(None)));
    }

    #[test]
    fn mode_flags() {
        assert_eq!(
            parse_args(args(&["--legacy"])),
            Ok(Cli::Run(Some(RenderMode::Legacy)))
        );
        assert_eq!(
            parse_args(args(&["--legacy", "--truecolor"])),
            Ok(Cli::Run(Some(RenderMode::TrueColor)))
        );
        assert_eq!(parse_args(args(&["--help"])), Ok(Cli::Help));
        assert!(parse_args(args(&["--bogus"])).is_err());
    }

    // ── Counter ───────────────────────────────────────────────────────────

    #[test]
    fn counter_clamps() {
        let mut c = Counter::new("A", Counter::MAX, Rgb::CYAN);
        c.handle_key(&KeyEvent::char('+'));
        assert_eq!(c.value, Counter::MAX);
        c.handle_key(&KeyEvent::char('0'));
        c.handle_key(&KeyEvent::new(KeyCode::Down));
        assert_eq!(c.value, 0);
    }

    #[test]
    fn status_line_reports_stats() {
        let stats = PaintStats {
            chunks: 2,
            cells: 10,
            bytes: 64,
        };
        let line = status_line(Duration::from_secs(7), stats);
        assert!(line.starts_with("up    7s"));
        assert!(line.contains("2 chunk(s), 10 cell(s), 64 byte(s)"));
    }

    // ── Dashboard ─────────────────────────────────────────────────────────

    #[test]
    fn dashboard_renders_and_focuses_first_counter() {
        let console = MemoryConsole::new(64, 10);
        let config = AppConfig::default().with_render_mode(RenderMode::TrueColor);
        let mut app = ConsoleApp::new(console.clone(), config);
        build(&mut app).unwrap();

        app.begin().unwrap();
        app.pump_once().unwrap();
        assert!(console.row_text(0).starts_with(" cellpump dashboard"));
        assert!(console.row_text(2).starts_with(" [ A   8 ]  ████████ "));

        app.dispatcher().send_key(KeyEvent::char('+')).unwrap();
        app.pump_once().unwrap();
        assert!(console.row_text(2).starts_with(" [ A   9 ]  █████████ "));
    }

    #[test]
    fn ctrl_c_stops_the_dashboard() {
        let console = MemoryConsole::new(64, 10);
        let mut app = ConsoleApp::new(console, AppConfig::default());
        build(&mut app).unwrap();
        app.begin().unwrap();
        app.pump_once().unwrap();

        app.dispatcher()
            .send_key(KeyEvent::with_modifiers(KeyCode::Char('c'), Modifiers::CTRL))
            .unwrap();
        assert!(!app.pump_once().unwrap());
        assert_eq!(app.lifecycle(), Lifecycle::Stopped);
    }
}
