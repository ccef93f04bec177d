//! # FerroSync Core
//!
//! SyncTeX forward and backward search between a text editor and an external document
//! viewer, independent of the message bus that carries it.
//!
//! ## Overview
//!
//! Forward search asks the viewer to highlight the rendered location of a source line;
//! backward search is the viewer telling the editor which source line the user clicked.
//! Before either can happen the viewer process and window showing the compiled document
//! must be discovered (and possibly started), which is asynchronous and racy: the daemon's
//! reply and the viewer's `DocumentLoaded` broadcast can report the same viewer in either
//! order.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐  requests   ┌───────────────┐  actions   ┌──────────────────┐
//! │ SyncSessionHandle  │ ──────────► │ session actor │ ─────────► │ dyn ViewerBus    │
//! │ (editor side)      │             │ (tokio task)  │ ◄───────── │ (ferrosync-dbus, │
//! └────────────────────┘             │  SyncSession  │   events   │  mocks in tests) │
//!          ▲                         └───────┬───────┘            └──────────────────┘
//!          │        backward search          │
//!          └─────────────────────────────────┘
//! ```
//!
//! - [`session`] - The state machine, free of I/O
//! - [`actor`] - Drives one session per document on the tokio event loop
//! - [`bus`] - The [`ViewerBus`] trait implemented by bus backends
//! - [`registry`] - One lazily created session per compiled document
//! - [`uri`] - Path and `file://` URI translation
//! - [`editor`] - Turning a backward search into editor navigation
//!
//! ## Examples
//!
//! ```no_run
//! use ferrosync_core::{new_sync_session, ViewerBus};
//! use std::sync::Arc;
//!
//! # async fn demo(bus: Arc<dyn ViewerBus>) -> ferrosync_core::Result<()> {
//! let session = new_sync_session(bus, "file:///home/me/thesis/main.pdf", true)?;
//! session.set_backward_search_handler(|file, line, _column| {
//!     println!("jump to {}:{}", file.display(), line);
//! });
//! session.request_forward_search("/home/me/thesis/intro.tex", 42, 1, 0);
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod bus;
pub mod command;
pub mod config;
pub mod editor;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod uri;

pub use actor::{new_sync_session, spawn_session, SessionOptions, SessionStatus, SyncSessionHandle};
pub use bus::{ViewerBus, ViewerWindow, WindowSignal};
pub use command::{BackwardSearchEvent, DocumentLoaded, SyncCommand};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use protocol::{BusNames, ViewerKind};
pub use registry::SyncRegistry;
pub use session::{SessionState, SpawnPolicy, SyncSession};
pub use uri::DocumentUri;
