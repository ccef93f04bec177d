use crate::app::ViewerAppProxy;
use crate::connection::BusConnection;
use crate::daemon::DaemonProxy;
use crate::window::WindowHandle;
use async_trait::async_trait;
use ferrosync_core::bus::{DocumentLoadedSignals, ViewerBus, ViewerWindow, WindowSignals};
use ferrosync_core::{BusNames, DocumentUri, Result, ViewerKind};
use std::sync::Arc;

/// [`ViewerBus`] over the session bus for one viewer flavour.
#[derive(Debug, Clone)]
pub struct BusContext {
    connection: BusConnection,
    daemon: DaemonProxy,
    names: BusNames,
}

impl BusContext {
    /// Connects to the session bus and creates the daemon proxy.
    pub async fn connect(viewer: ViewerKind) -> Result<Self> {
        let connection = BusConnection::acquire().await?;
        Self::with_connection(connection, viewer).await
    }

    pub async fn with_connection(connection: BusConnection, viewer: ViewerKind) -> Result<Self> {
        let names = viewer.bus_names();
        let daemon = DaemonProxy::new(&connection, names).await?;
        log::debug!("Talking to {} via {}", viewer, names.daemon_service);
        Ok(Self {
            connection,
            daemon,
            names,
        })
    }

    pub fn names(&self) -> BusNames {
        self.names
    }

    pub fn into_bus(self) -> Arc<dyn ViewerBus> {
        Arc::new(self)
    }
}

#[async_trait]
impl ViewerBus for BusContext {
    async fn find_document(&self, uri: &DocumentUri, spawn: bool) -> Result<String> {
        self.daemon.find_document(uri.as_str(), spawn).await
    }

    async fn get_window_list(&self, owner: &str) -> Result<Vec<String>> {
        ViewerAppProxy::new(&self.connection, owner, self.names)
            .await?
            .get_window_list()
            .await
    }

    async fn bind_window(
        &self,
        owner: &str,
        window: &str,
    ) -> Result<(Box<dyn ViewerWindow>, WindowSignals)> {
        let handle = WindowHandle::new(&self.connection, owner, window, self.names).await?;
        let signals = handle.signals().await?;
        Ok((Box::new(handle), signals))
    }

    async fn subscribe_document_loaded(&self) -> Result<DocumentLoadedSignals> {
        self.daemon.document_loaded().await
    }
}
