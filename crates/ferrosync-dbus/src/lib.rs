//! # FerroSync D-Bus
//!
//! Session bus transport for [`ferrosync_core`]: the `FindDocument` daemon call, the
//! viewer's `GetWindowList`, and the window's `SyncView`, `SyncSource` and `Closed`.
//!
//! ```no_run
//! use ferrosync_core::{new_sync_session, ViewerKind};
//! use ferrosync_dbus::BusContext;
//!
//! # async fn demo() -> ferrosync_core::Result<()> {
//! let bus = BusContext::connect(ViewerKind::Evince).await?.into_bus();
//! let session = new_sync_session(bus, "file:///home/me/thesis/main.pdf", true)?;
//! session.request_forward_search("/home/me/thesis/intro.tex", 42, 1, 0);
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod connection;
pub mod context;
pub mod daemon;
pub mod window;

pub use app::ViewerAppProxy;
pub use connection::BusConnection;
pub use context::BusContext;
pub use daemon::DaemonProxy;
pub use window::WindowHandle;

use ferrosync_core::{SyncConfig, SyncRegistry};

/// Builds a registry for `config`, disabled when the session bus is unreachable.
pub async fn registry_from_config(config: SyncConfig) -> SyncRegistry {
    let bus = if config.enabled {
        BusContext::connect(config.viewer).await.map(BusContext::into_bus)
    } else {
        Err(ferrosync_core::SyncError::Connection("disabled by configuration".into()))
    };
    SyncRegistry::from_connection(bus, config)
}
