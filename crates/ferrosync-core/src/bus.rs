//! The seam between sessions and the message bus.
//!
//! Production code talks to the session bus through `ferrosync-dbus`; tests substitute a
//! recording mock. Every method is one asynchronous bus round trip.

use crate::command::{BackwardSearchEvent, DocumentLoaded, SyncCommand};
use crate::error::Result;
use crate::uri::DocumentUri;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A signal emitted by one bound viewer window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowSignal {
    Closed,
    SyncSource(BackwardSearchEvent),
}

/// Stream of a window's signals. Dropping it unsubscribes.
pub type WindowSignals = mpsc::UnboundedReceiver<WindowSignal>;

/// Stream of `DocumentLoaded` broadcasts from every viewer instance.
pub type DocumentLoadedSignals = mpsc::UnboundedReceiver<DocumentLoaded>;

/// One viewer window a session has bound to.
#[async_trait]
pub trait ViewerWindow: Send + Sync {
    /// Sends `SyncView` without waiting for a reply.
    async fn sync_view(&self, command: &SyncCommand) -> Result<()>;
}

/// Access to the viewer daemon and viewer instances.
///
/// # Thread Safety
///
/// One bus is shared by every session of the process, hence `Send + Sync`.
#[async_trait]
pub trait ViewerBus: Send + Sync {
    /// `FindDocument`: the unique name of the viewer showing `uri`, or `""`.
    async fn find_document(&self, uri: &DocumentUri, spawn: bool) -> Result<String>;

    /// `GetWindowList` on the viewer instance `owner`.
    async fn get_window_list(&self, owner: &str) -> Result<Vec<String>>;

    /// Subscribes to the `Closed` and `SyncSource` signals of `window` and returns a handle
    /// for issuing forward searches to it.
    async fn bind_window(
        &self,
        owner: &str,
        window: &str,
    ) -> Result<(Box<dyn ViewerWindow>, WindowSignals)>;

    /// Subscribes to the `DocumentLoaded` broadcast.
    async fn subscribe_document_loaded(&self) -> Result<DocumentLoadedSignals>;
}
