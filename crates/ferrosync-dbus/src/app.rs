use crate::connection::BusConnection;
use ferrosync_core::protocol::GET_WINDOW_LIST;
use ferrosync_core::{BusNames, Result, SyncError};
use zbus::zvariant::OwnedObjectPath;
use zbus::Proxy;

/// Client of one running viewer instance, addressed by its unique bus name.
#[derive(Debug, Clone)]
pub struct ViewerAppProxy {
    proxy: Proxy<'static>,
}

impl ViewerAppProxy {
    pub async fn new(connection: &BusConnection, owner: &str, names: BusNames) -> Result<Self> {
        let proxy = Proxy::new(
            connection.connection(),
            owner.to_owned(),
            names.app_path,
            names.app_interface,
        )
        .await
        .map_err(|e| SyncError::call_failed(GET_WINDOW_LIST, e))?;
        Ok(Self { proxy })
    }

    /// Object paths of the instance's windows, in the order the viewer reports them.
    pub async fn get_window_list(&self) -> Result<Vec<String>> {
        let windows: Vec<OwnedObjectPath> = self
            .proxy
            .call(GET_WINDOW_LIST, &())
            .await
            .map_err(|e| SyncError::call_failed(GET_WINDOW_LIST, e))?;
        Ok(windows.iter().map(|w| w.as_str().to_owned()).collect())
    }
}
