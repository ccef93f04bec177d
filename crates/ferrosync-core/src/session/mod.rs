//! The per-document synchronization state machine.
//!
//! ## Overview
//!
//! [`SyncSession`] decides *what* to do; it never touches the bus itself. Every input
//! (an editor request or a bus completion) is fed in and answered with a list of
//! [`Action`]s for the driver to execute, in order. Completions of those actions come back
//! later as [`SessionEvent`]s.
//!
//! ```text
//!              request_forward_search()          ┌──────────────┐
//!   editor ────────────────────────────────────► │              │ ──► Vec<Action>
//!                                                 │ SyncSession  │
//!   bus completions ── handle(SessionEvent) ────► │              │ ──► Vec<Action>
//!                                                 └──────────────┘
//! ```
//!
//! ## Discovery
//!
//! A discovery attempt resolves the viewer instance (owner) and then its window. The owner
//! can arrive from the `FindDocument` reply or from a `DocumentLoaded` broadcast, in either
//! order. Each attempt carries a generation; anything tagged with an older generation, or
//! arriving after the attempt moved past the owner stage, is ignored. Bound windows carry
//! their own binding id so that signals of a released window are ignored too.

use crate::command::{BackwardSearchEvent, DocumentLoaded, SyncCommand};
use crate::error::SyncError;
use crate::uri::{source_uri_to_path, DocumentUri};
use log::{debug, info, warn};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default bound on one discovery attempt.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives backward searches as `(local source file, line, column)`.
pub type BackwardSearchHandler = Box<dyn FnMut(&Path, i32, i32) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No window is bound.
    Closed,
    /// A viewer window is bound and accepts forward searches.
    Running,
}

/// Whether forward searches may start a viewer for a document that is not open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnPolicy {
    Allowed,
    Forbidden,
}

impl SpawnPolicy {
    pub fn from_flag(allowed: bool) -> Self {
        if allowed {
            SpawnPolicy::Allowed
        } else {
            SpawnPolicy::Forbidden
        }
    }
}

/// Holds the forward search waiting for a window.
///
/// Only the latest cursor position matters, so the slot keeps one command and a newer
/// offer replaces the older one instead of queueing behind it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingSlot(Option<SyncCommand>);

impl PendingSlot {
    /// Stores `command` and returns the command it displaced, if any.
    pub fn offer(&mut self, command: SyncCommand) -> Option<SyncCommand> {
        self.0.replace(command)
    }

    pub fn take(&mut self) -> Option<SyncCommand> {
        self.0.take()
    }

    pub fn peek(&self) -> Option<&SyncCommand> {
        self.0.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

/// Identity of the window a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowBinding {
    pub binding: u64,
    /// Unique bus name of the viewer instance.
    pub owner: String,
    /// Object path of the window.
    pub window: String,
}

/// Completions and signals routed to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    DiscoveryReply {
        generation: u64,
        result: Result<String, SyncError>,
    },
    WindowListReply {
        generation: u64,
        result: Result<Vec<String>, SyncError>,
    },
    /// The chosen window's signals are subscribed and it accepts forward searches.
    BindSucceeded { binding: u64 },
    /// Subscribing to the signals of a freshly chosen window failed.
    BindFailed { binding: u64, error: SyncError },
    ClosedSignal { binding: u64 },
    SyncSourceSignal {
        binding: u64,
        event: BackwardSearchEvent,
    },
    DocumentLoadedSignal(DocumentLoaded),
    DiscoveryTimeout { generation: u64 },
}

/// Bus work requested by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    FindDocument { generation: u64, spawn: bool },
    GetWindowList { generation: u64, owner: String },
    /// Report [`SessionEvent::DiscoveryTimeout`] after `after` unless the attempt finished.
    ArmTimeout { generation: u64, after: Duration },
    BindWindow {
        binding: u64,
        owner: String,
        window: String,
    },
    SyncView { binding: u64, command: SyncCommand },
    /// Drop the window handle and its signal subscriptions.
    ReleaseWindow { binding: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Stage {
    AwaitingOwner,
    AwaitingWindows { owner: String },
    /// A window was chosen; the session turns RUNNING once its signals are subscribed.
    Binding {
        binding: u64,
        owner: String,
        window: String,
    },
}

#[derive(Debug, Clone)]
struct Discovery {
    generation: u64,
    spawn: bool,
    stage: Stage,
}

/// Synchronization state for one viewable document.
pub struct SyncSession {
    uri: DocumentUri,
    spawn: SpawnPolicy,
    discovery_timeout: Duration,
    state: SessionState,
    window: Option<WindowBinding>,
    pending: PendingSlot,
    discovery: Option<Discovery>,
    next_id: u64,
    backward_handler: Option<BackwardSearchHandler>,
    last_error: Option<SyncError>,
}

impl fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSession")
            .field("uri", &self.uri)
            .field("spawn", &self.spawn)
            .field("state", &self.state)
            .field("window", &self.window)
            .field("pending", &self.pending)
            .field("discovery", &self.discovery)
            .field("has_backward_handler", &self.backward_handler.is_some())
            .finish()
    }
}

impl SyncSession {
    pub fn new(uri: DocumentUri, spawn: SpawnPolicy) -> Self {
        Self {
            uri,
            spawn,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            state: SessionState::Closed,
            window: None,
            pending: PendingSlot::default(),
            discovery: None,
            next_id: 0,
            backward_handler: None,
            last_error: None,
        }
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn uri(&self) -> &DocumentUri {
        &self.uri
    }

    pub fn spawn_policy(&self) -> SpawnPolicy {
        self.spawn
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bus name of the viewer serving the document, empty while closed.
    pub fn owner(&self) -> &str {
        self.window.as_ref().map(|w| w.owner.as_str()).unwrap_or("")
    }

    pub fn window(&self) -> Option<&WindowBinding> {
        self.window.as_ref()
    }

    pub fn pending(&self) -> Option<&SyncCommand> {
        self.pending.peek()
    }

    pub fn is_discovering(&self) -> bool {
        self.discovery.is_some()
    }

    /// The most recent bus failure, kept for diagnostics.
    pub fn last_error(&self) -> Option<&SyncError> {
        self.last_error.as_ref()
    }

    /// Replaces the backward-search handler.
    pub fn set_backward_search_handler(&mut self, handler: BackwardSearchHandler) {
        self.backward_handler = Some(handler);
    }

    /// Probes, without spawning, for a viewer that already shows the document.
    pub fn start(&mut self) -> Vec<Action> {
        if self.state == SessionState::Running || self.discovery.is_some() {
            return Vec::new();
        }
        self.begin_discovery(false)
    }

    /// Forward search: highlight `command` in the viewer.
    pub fn request_forward_search(&mut self, command: SyncCommand) -> Vec<Action> {
        if let (SessionState::Running, Some(window)) = (self.state, &self.window) {
            return vec![Action::SyncView {
                binding: window.binding,
                command,
            }];
        }

        if self.spawn == SpawnPolicy::Forbidden {
            debug!(
                "No viewer window for {}, dropping forward search to {}:{}",
                self.uri,
                command.input_file.display(),
                command.line
            );
            return Vec::new();
        }

        if let Some(old) = self.pending.offer(command) {
            debug!(
                "Forward search to line {} superseded while waiting for {}",
                old.line, self.uri
            );
        }

        // A startup probe never spawns; supersede it so the request can open a viewer.
        let needs_discovery = match &self.discovery {
            None => true,
            Some(d) => !d.spawn && d.stage == Stage::AwaitingOwner,
        };
        if needs_discovery {
            self.begin_discovery(true)
        } else {
            Vec::new()
        }
    }

    /// Routes one completion or signal.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Action> {
        match event {
            SessionEvent::DiscoveryReply { generation, result } => {
                self.on_discovery_reply(generation, result)
            }
            SessionEvent::WindowListReply { generation, result } => {
                self.on_window_list_reply(generation, result)
            }
            SessionEvent::BindSucceeded { binding } => self.on_bind_succeeded(binding),
            SessionEvent::BindFailed { binding, error } => {
                if self.take_binding(binding).is_none() {
                    return Vec::new();
                }
                warn!("Could not subscribe to viewer window for {}: {}", self.uri, error);
                self.last_error = Some(error);
                vec![Action::ReleaseWindow { binding }]
            }
            SessionEvent::ClosedSignal { binding } => {
                if !self.is_current_binding(binding) {
                    return Vec::new();
                }
                info!("Viewer window for {} closed", self.uri);
                self.window = None;
                self.state = SessionState::Closed;
                vec![Action::ReleaseWindow { binding }]
            }
            SessionEvent::SyncSourceSignal { binding, event } => {
                if self.is_current_binding(binding) {
                    self.deliver_backward_search(&event);
                }
                Vec::new()
            }
            SessionEvent::DocumentLoadedSignal(loaded) => self.on_document_loaded(loaded),
            SessionEvent::DiscoveryTimeout { generation } => {
                if self.is_current_generation(generation) {
                    let error = SyncError::Timeout(self.discovery_timeout);
                    warn!("Discovery of a viewer for {} abandoned: {}", self.uri, error);
                    self.discovery = None;
                    self.last_error = Some(error);
                }
                Vec::new()
            }
        }
    }

    /// Hands a backward search to the editor.
    pub fn deliver_backward_search(&mut self, event: &BackwardSearchEvent) {
        let path = match source_uri_to_path(&event.source_file_uri) {
            Ok(path) => path,
            Err(e) => {
                warn!("Ignoring backward search: {}", e);
                return;
            }
        };
        match self.backward_handler.as_mut() {
            Some(handler) => handler(&path, event.line, event.column),
            None => debug!(
                "Backward search to {}:{} with no handler registered",
                path.display(),
                event.line
            ),
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn begin_discovery(&mut self, spawn: bool) -> Vec<Action> {
        let generation = self.next_id();
        debug!(
            "Looking up viewer for {} (spawn: {}, attempt {})",
            self.uri, spawn, generation
        );
        self.discovery = Some(Discovery {
            generation,
            spawn,
            stage: Stage::AwaitingOwner,
        });
        vec![
            Action::FindDocument { generation, spawn },
            Action::ArmTimeout {
                generation,
                after: self.discovery_timeout,
            },
        ]
    }

    fn is_current_generation(&self, generation: u64) -> bool {
        self.discovery
            .as_ref()
            .is_some_and(|d| d.generation == generation)
    }

    fn is_current_binding(&self, binding: u64) -> bool {
        self.window.as_ref().is_some_and(|w| w.binding == binding)
    }

    fn on_discovery_reply(
        &mut self,
        generation: u64,
        result: Result<String, SyncError>,
    ) -> Vec<Action> {
        let spawn = match &self.discovery {
            Some(d) if d.generation == generation && d.stage == Stage::AwaitingOwner => d.spawn,
            _ => {
                debug!("Ignoring stale FindDocument reply for {}", self.uri);
                return Vec::new();
            }
        };

        match result {
            Err(error) => {
                warn!("FindDocument for {} failed: {}", self.uri, error);
                self.discovery = None;
                self.last_error = Some(error);
                Vec::new()
            }
            Ok(owner) if owner.is_empty() => {
                if spawn {
                    debug!("Viewer for {} is starting, waiting for it to load", self.uri);
                } else {
                    debug!("{} is not open in any viewer", self.uri);
                    self.discovery = None;
                }
                Vec::new()
            }
            Ok(owner) => self.owner_found(generation, owner),
        }
    }

    fn on_document_loaded(&mut self, loaded: DocumentLoaded) -> Vec<Action> {
        if !self.uri.matches(&loaded.uri) || loaded.owner.is_empty() {
            return Vec::new();
        }
        if self.state == SessionState::Running {
            debug!("{} loaded again by {}, already bound", self.uri, loaded.owner);
            return Vec::new();
        }

        let in_flight = self
            .discovery
            .as_ref()
            .map(|d| (d.generation, d.stage == Stage::AwaitingOwner));
        match in_flight {
            Some((generation, true)) => self.owner_found(generation, loaded.owner),
            // The window list for this attempt is already on its way.
            Some((_, false)) => Vec::new(),
            None => {
                // Opened without our asking; attach so backward search works.
                let generation = self.next_id();
                self.discovery = Some(Discovery {
                    generation,
                    spawn: false,
                    stage: Stage::AwaitingOwner,
                });
                let mut actions = self.owner_found(generation, loaded.owner);
                actions.push(Action::ArmTimeout {
                    generation,
                    after: self.discovery_timeout,
                });
                actions
            }
        }
    }

    fn owner_found(&mut self, generation: u64, owner: String) -> Vec<Action> {
        debug!("{} is served by {}", self.uri, owner);
        if let Some(d) = self.discovery.as_mut() {
            d.stage = Stage::AwaitingWindows {
                owner: owner.clone(),
            };
        }
        vec![Action::GetWindowList { generation, owner }]
    }

    fn on_window_list_reply(
        &mut self,
        generation: u64,
        result: Result<Vec<String>, SyncError>,
    ) -> Vec<Action> {
        let owner = match self.discovery.as_ref() {
            Some(Discovery {
                generation: current,
                stage: Stage::AwaitingWindows { owner },
                ..
            }) if *current == generation => owner.clone(),
            _ => {
                debug!("Ignoring stale GetWindowList reply for {}", self.uri);
                return Vec::new();
            }
        };

        let windows = match result {
            Ok(windows) => windows,
            Err(error) => {
                warn!("GetWindowList on {} failed: {}", owner, error);
                self.discovery = None;
                self.last_error = Some(error);
                return Vec::new();
            }
        };
        let Some(window) = windows.into_iter().next() else {
            let error = SyncError::Integrity { owner };
            warn!("{}", error);
            self.discovery = None;
            self.last_error = Some(error);
            return Vec::new();
        };

        let binding = self.next_id();
        debug!("Subscribing to window {} of {} for {}", window, owner, self.uri);
        if let Some(d) = self.discovery.as_mut() {
            d.stage = Stage::Binding {
                binding,
                owner: owner.clone(),
                window: window.clone(),
            };
        }
        vec![Action::BindWindow {
            binding,
            owner,
            window,
        }]
    }

    fn on_bind_succeeded(&mut self, binding: u64) -> Vec<Action> {
        let Some((owner, window)) = self.take_binding(binding) else {
            // The attempt was abandoned while subscribing.
            debug!("Releasing window {} bound after its attempt ended", binding);
            return vec![Action::ReleaseWindow { binding }];
        };

        info!("Bound {} to viewer window {} of {}", self.uri, window, owner);
        self.window = Some(WindowBinding {
            binding,
            owner,
            window,
        });
        self.state = SessionState::Running;
        self.last_error = None;

        match self.pending.take() {
            Some(command) => vec![Action::SyncView { binding, command }],
            None => Vec::new(),
        }
    }

    /// Ends the discovery attempt if it is subscribing to `binding`.
    fn take_binding(&mut self, binding: u64) -> Option<(String, String)> {
        match self.discovery.take() {
            Some(Discovery {
                stage:
                    Stage::Binding {
                        binding: current,
                        owner,
                        window,
                    },
                ..
            }) if current == binding => Some((owner, window)),
            other => {
                self.discovery = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests;
