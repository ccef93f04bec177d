use crate::actor::{spawn_session, SessionOptions, SyncSessionHandle};
use crate::bus::ViewerBus;
use crate::command::SyncCommand;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::session::SpawnPolicy;
use crate::uri::DocumentUri;
use dashmap::DashMap;
use log::{info, warn};
use std::path::Path;
use std::sync::{Arc, Mutex};

type SharedHandler = Arc<dyn Fn(&Path, i32, i32) + Send + Sync>;

/// One synchronization session per compiled document, created on first use.
///
/// When the bus is unreachable the registry is disabled: the failure is logged once and
/// every request becomes a no-op.
pub struct SyncRegistry {
    bus: Option<Arc<dyn ViewerBus>>,
    config: SyncConfig,
    sessions: DashMap<DocumentUri, SyncSessionHandle>,
    backward_handler: Mutex<Option<SharedHandler>>,
}

impl std::fmt::Debug for SyncRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRegistry")
            .field("enabled", &self.is_enabled())
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl SyncRegistry {
    pub fn new(bus: Arc<dyn ViewerBus>, config: SyncConfig) -> Self {
        Self {
            bus: Some(bus),
            config,
            sessions: DashMap::new(),
            backward_handler: Mutex::new(None),
        }
    }

    /// A registry that ignores every request.
    pub fn disabled(config: SyncConfig, reason: &SyncError) -> Self {
        warn!("Viewer synchronization disabled: {}", reason);
        Self {
            bus: None,
            config,
            sessions: DashMap::new(),
            backward_handler: Mutex::new(None),
        }
    }

    /// Builds a registry from a bus connection attempt.
    pub fn from_connection(
        connection: Result<Arc<dyn ViewerBus>>,
        config: SyncConfig,
    ) -> Self {
        if !config.enabled {
            info!("Viewer synchronization turned off in config");
            return Self {
                bus: None,
                config,
                sessions: DashMap::new(),
                backward_handler: Mutex::new(None),
            };
        }
        match connection {
            Ok(bus) => Self::new(bus, config),
            Err(e) => Self::disabled(config, &e),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.bus.is_some()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The session for `uri`, started with the configured spawn policy if new.
    pub fn session(&self, uri: &DocumentUri) -> Option<SyncSessionHandle> {
        let bus = self.bus.as_ref()?;
        let handle = self
            .sessions
            .entry(uri.clone())
            .or_insert_with(|| {
                let options = SessionOptions {
                    spawn: SpawnPolicy::from_flag(self.config.spawn_viewer),
                    discovery_timeout: self.config.discovery_timeout(),
                };
                let handle = spawn_session(bus.clone(), uri.clone(), options);
                if let Some(handler) = self.current_handler() {
                    handle.set_backward_search_handler(move |path: &Path, line, column| {
                        handler(path, line, column)
                    });
                }
                handle
            })
            .clone();
        Some(handle)
    }

    /// Forward search from `source` (any file of the project) in the output of `master`.
    pub fn forward_search(&self, master: &Path, source: &Path, line: i32, column: i32) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let uri = DocumentUri::for_output(master, &self.config.output_extension)?;
        if let Some(session) = self.session(&uri) {
            session.forward(SyncCommand::now(source, line, column));
        }
        Ok(())
    }

    /// Installs the backward-search handler on every current and future session.
    pub fn set_backward_search_handler<F>(&self, handler: F)
    where
        F: Fn(&Path, i32, i32) + Send + Sync + 'static,
    {
        let handler: SharedHandler = Arc::new(handler);
        if let Ok(mut slot) = self.backward_handler.lock() {
            *slot = Some(handler.clone());
        }
        for entry in self.sessions.iter() {
            let handler = handler.clone();
            entry
                .value()
                .set_backward_search_handler(move |path: &Path, line, column| {
                    handler(path, line, column)
                });
        }
    }

    /// Ends the session for `uri`; its task stops once the last handle is dropped.
    pub fn remove(&self, uri: &DocumentUri) -> Option<SyncSessionHandle> {
        self.sessions.remove(uri).map(|(_, handle)| handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn current_handler(&self) -> Option<SharedHandler> {
        self.backward_handler
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
    }
}
