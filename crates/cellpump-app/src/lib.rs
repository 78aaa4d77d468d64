// SPDX-License-Identifier: MIT
//
// cellpump-app — Single-threaded application pump.
//
// A `ConsoleApp` owns a frame buffer, a visual tree of controls and the
// focus state, and mutates them only on its pump thread. Everything else
// talks to it through a `Dispatcher`: queued work, key presses, resize
// notifications and paint requests. Paint requests made in the same drain
// cycle collapse into one paint.

pub mod app;
pub mod canvas;
pub mod config;
pub mod controls;
pub mod error;
pub mod event;
pub mod focus;
pub mod pump;
pub mod recorder;
pub mod tree;

pub use app::{ConsoleApp, RunningApp};
pub use canvas::Canvas;
pub use config::AppConfig;
pub use controls::{Label, Panel};
pub use error::AppError;
pub use event::{Event, Subscription};
pub use focus::{FocusManager, GlobalKeyHandlers, HandlerId};
pub use pump::{AppId, Dispatcher, Lifecycle, PaintReceipt};
pub use recorder::{FrameRecorder, MemoryRecorder, RecordedFrame};
pub use tree::{Control, NodeId, NodeState, Rect, Tree};
