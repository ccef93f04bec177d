//! Runs a [`SyncSession`] against a [`ViewerBus`] on the tokio event loop.
//!
//! Each session is one task that owns the state machine and processes its inputs one at a
//! time. Bus calls with replies are spawned and post their completion back to the task, so
//! the session never blocks on the viewer. When every [`SyncSessionHandle`] is dropped the
//! task exits, its event channel closes and outstanding replies are discarded.

use crate::bus::{ViewerBus, ViewerWindow, WindowSignal};
use crate::command::SyncCommand;
use crate::error::Result;
use crate::session::{
    Action, BackwardSearchHandler, SessionEvent, SessionState, SpawnPolicy, SyncSession,
    DEFAULT_DISCOVERY_TIMEOUT,
};
use crate::uri::DocumentUri;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Snapshot of a session published after every input it processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Empty while closed.
    pub owner: String,
}

enum Request {
    Forward(SyncCommand),
    SetHandler(BackwardSearchHandler),
}

/// Editor-side handle of a running session. Cheap to clone.
#[derive(Clone)]
pub struct SyncSessionHandle {
    uri: DocumentUri,
    requests: mpsc::UnboundedSender<Request>,
    status: watch::Receiver<SessionStatus>,
}

impl std::fmt::Debug for SyncSessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSessionHandle")
            .field("uri", &self.uri)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl SyncSessionHandle {
    pub fn uri(&self) -> &DocumentUri {
        &self.uri
    }

    /// Asks the viewer to highlight `line`/`column` of `input_file`.
    ///
    /// Never fails: a search that cannot be delivered is logged by the session.
    pub fn request_forward_search(
        &self,
        input_file: impl Into<PathBuf>,
        line: i32,
        column: i32,
        timestamp: u32,
    ) {
        self.forward(SyncCommand::new(input_file, line, column, timestamp));
    }

    pub fn forward(&self, command: SyncCommand) {
        if self.requests.send(Request::Forward(command)).is_err() {
            debug!("Session for {} has stopped, dropping forward search", self.uri);
        }
    }

    /// Registers the backward-search callback, replacing any previous one.
    pub fn set_backward_search_handler<F>(&self, handler: F)
    where
        F: FnMut(&Path, i32, i32) + Send + 'static,
    {
        if self
            .requests
            .send(Request::SetHandler(Box::new(handler)))
            .is_err()
        {
            debug!("Session for {} has stopped, dropping backward search handler", self.uri);
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Waits until the session reaches `state`. Returns `false` on timeout.
    pub async fn wait_for_state(&self, state: SessionState, timeout: Duration) -> bool {
        let mut status = self.status.clone();
        tokio::time::timeout(timeout, status.wait_for(|s| s.state == state))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }
}

/// Options fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub spawn: SpawnPolicy,
    pub discovery_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            spawn: SpawnPolicy::Allowed,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }
}

/// Creates a session for `document_uri` and starts it on the current runtime.
///
/// This is the only operation that fails synchronously: `document_uri` must be an absolute
/// `file://` URI.
pub fn new_sync_session(
    bus: Arc<dyn ViewerBus>,
    document_uri: &str,
    spawn_allowed: bool,
) -> Result<SyncSessionHandle> {
    let uri = DocumentUri::parse(document_uri)?;
    let options = SessionOptions {
        spawn: SpawnPolicy::from_flag(spawn_allowed),
        ..SessionOptions::default()
    };
    Ok(spawn_session(bus, uri, options))
}

/// Starts a session task for `uri`. Must be called from within a tokio runtime.
pub fn spawn_session(
    bus: Arc<dyn ViewerBus>,
    uri: DocumentUri,
    options: SessionOptions,
) -> SyncSessionHandle {
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(SessionStatus {
        state: SessionState::Closed,
        owner: String::new(),
    });

    let session = SyncSession::new(uri.clone(), options.spawn)
        .with_discovery_timeout(options.discovery_timeout);
    let actor = SessionActor {
        session,
        bus,
        events_tx,
        status_tx,
        window: None,
        tasks: Vec::new(),
    };
    tokio::spawn(actor.run(requests_rx, events_rx));

    SyncSessionHandle {
        uri,
        requests: requests_tx,
        status: status_rx,
    }
}

struct ActiveWindow {
    binding: u64,
    handle: Box<dyn ViewerWindow>,
    signals: JoinHandle<()>,
}

struct SessionActor {
    session: SyncSession,
    bus: Arc<dyn ViewerBus>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    status_tx: watch::Sender<SessionStatus>,
    window: Option<ActiveWindow>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        self.subscribe_document_loaded().await;
        let actions = self.session.start();
        self.execute_all(actions).await;

        loop {
            let actions = tokio::select! {
                request = requests.recv() => match request {
                    Some(Request::Forward(command)) => self.session.request_forward_search(command),
                    Some(Request::SetHandler(handler)) => {
                        self.session.set_backward_search_handler(handler);
                        Vec::new()
                    }
                    None => break,
                },
                Some(event) = events.recv() => self.session.handle(event),
            };
            self.execute_all(actions).await;
        }

        debug!("Session for {} stopped", self.session.uri());
        self.release_window();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    async fn subscribe_document_loaded(&mut self) {
        match self.bus.subscribe_document_loaded().await {
            Ok(mut loaded) => {
                let uri = self.session.uri().clone();
                let events = self.events_tx.clone();
                self.tasks.push(tokio::spawn(async move {
                    while let Some(signal) = loaded.recv().await {
                        if !uri.matches(&signal.uri) {
                            continue;
                        }
                        if events
                            .send(SessionEvent::DocumentLoadedSignal(signal))
                            .is_err()
                        {
                            break;
                        }
                    }
                }));
            }
            Err(e) => warn!(
                "Not watching for DocumentLoaded on {}: {}",
                self.session.uri(),
                e
            ),
        }
    }

    async fn execute_all(&mut self, actions: Vec<Action>) {
        for action in actions {
            self.execute(action).await;
        }
        self.publish();
    }

    async fn execute(&mut self, action: Action) {
        match action {
            Action::FindDocument { generation, spawn } => {
                let bus = self.bus.clone();
                let uri = self.session.uri().clone();
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = bus.find_document(&uri, spawn).await;
                    let _ = events.send(SessionEvent::DiscoveryReply { generation, result });
                });
            }
            Action::GetWindowList { generation, owner } => {
                let bus = self.bus.clone();
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = bus.get_window_list(&owner).await;
                    let _ = events.send(SessionEvent::WindowListReply { generation, result });
                });
            }
            Action::ArmTimeout { generation, after } => {
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = events.send(SessionEvent::DiscoveryTimeout { generation });
                });
            }
            Action::BindWindow {
                binding,
                owner,
                window,
            } => self.bind_window(binding, &owner, &window).await,
            Action::SyncView { binding, command } => match &self.window {
                Some(active) if active.binding == binding => {
                    if let Err(e) = active.handle.sync_view(&command).await {
                        warn!("SyncView on {} failed: {}", self.session.uri(), e);
                    }
                }
                _ => debug!(
                    "Window {} is gone, dropping forward search to line {}",
                    binding, command.line
                ),
            },
            Action::ReleaseWindow { binding } => {
                if self.window.as_ref().is_some_and(|w| w.binding == binding) {
                    self.release_window();
                }
            }
        }
    }

    async fn bind_window(&mut self, binding: u64, owner: &str, window: &str) {
        self.release_window();
        match self.bus.bind_window(owner, window).await {
            Ok((handle, mut signals)) => {
                // Queued ahead of anything the forwarder can report for this window.
                let _ = self.events_tx.send(SessionEvent::BindSucceeded { binding });
                let events = self.events_tx.clone();
                let forwarder = tokio::spawn(async move {
                    while let Some(signal) = signals.recv().await {
                        let event = match signal {
                            WindowSignal::Closed => SessionEvent::ClosedSignal { binding },
                            WindowSignal::SyncSource(event) => {
                                SessionEvent::SyncSourceSignal { binding, event }
                            }
                        };
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                });
                self.window = Some(ActiveWindow {
                    binding,
                    handle,
                    signals: forwarder,
                });
            }
            Err(error) => {
                let _ = self
                    .events_tx
                    .send(SessionEvent::BindFailed { binding, error });
            }
        }
    }

    fn release_window(&mut self) {
        if let Some(active) = self.window.take() {
            active.signals.abort();
        }
    }

    fn publish(&self) {
        let status = SessionStatus {
            state: self.session.state(),
            owner: self.session.owner().to_string(),
        };
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}
