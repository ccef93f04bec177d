use ferrosync_core::{Result, SyncError};
use zbus::Connection;

/// The session bus connection shared by every proxy of the process.
#[derive(Debug, Clone)]
pub struct BusConnection {
    inner: Connection,
}

impl BusConnection {
    /// Connects to the session bus.
    ///
    /// # Errors
    ///
    /// [`SyncError::Connection`] when no session bus is reachable (no
    /// `DBUS_SESSION_BUS_ADDRESS`, a headless terminal, a sandbox). Nothing retries this.
    pub async fn acquire() -> Result<Self> {
        let inner = Connection::session()
            .await
            .map_err(|e| SyncError::Connection(e.to_string()))?;
        log::debug!("Connected to session bus as {:?}", inner.unique_name());
        Ok(Self { inner })
    }

    /// Wraps an already established connection.
    pub fn from_connection(inner: Connection) -> Self {
        Self { inner }
    }

    pub fn connection(&self) -> &Connection {
        &self.inner
    }
}
