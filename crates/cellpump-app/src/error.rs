// SPDX-License-Identifier: MIT
//
// Application errors.
//
// Render failures that survived the compositor's retry, plus the
// programming errors the pump refuses to paper over: touching the app
// from the wrong thread, removing children from a parent that does not
// allow it, restarting a stopped app.

use std::io;

use cellpump_term::RenderError;
use thiserror::Error;

use crate::pump::AppId;
use crate::tree::NodeId;

/// Errors returned by [`ConsoleApp`](crate::app::ConsoleApp) and its
/// [`Dispatcher`](crate::pump::Dispatcher).
#[derive(Debug, Error)]
pub enum AppError {
    /// A paint failed even after invalidating and retrying.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Terminal or recorder I/O outside the paint path.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// App state was touched from a thread that does not run its pump.
    #[error("{app} used from thread {thread}, which does not run its pump")]
    WrongThread { app: AppId, thread: String },

    /// The parent of a node being removed does not accept child removal.
    #[error("parent control `{parent}` does not support removing children")]
    Unsupported { parent: &'static str },

    /// The id does not name a live node.
    #[error("no live node with id {0}")]
    UnknownNode(NodeId),

    /// Only a parentless node can be attached, and never below itself.
    #[error("node {0} cannot be attached there")]
    InvalidAttach(NodeId),

    /// The tree root is owned by the app.
    #[error("the root node cannot be removed")]
    RootRemoval,

    #[error("app already started")]
    AlreadyStarted,

    /// The pump has not been started on any thread yet.
    #[error("app not started")]
    NotStarted,

    /// Each thread pumps at most one app at a time.
    #[error("this thread already runs the pump of {0}")]
    ThreadBusy(AppId),

    /// Stopped is terminal; an app runs at most once.
    #[error("app already stopped and cannot be restarted")]
    AlreadyStopped,

    /// The app is stopping and accepts no new work.
    #[error("app is stopping; no new work is accepted")]
    Stopped,

    #[error("pump thread panicked")]
    PumpPanicked,
}
