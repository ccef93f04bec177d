use crate::connection::BusConnection;
use async_trait::async_trait;
use ferrosync_core::bus::{ViewerWindow, WindowSignal, WindowSignals};
use ferrosync_core::protocol::{CLOSED, SYNC_SOURCE, SYNC_VIEW};
use ferrosync_core::{BackwardSearchEvent, BusNames, Result, SyncCommand, SyncError};
use futures_util::{Stream, StreamExt};
use std::fmt;
use tokio::sync::mpsc;
use zbus::Proxy;

/// Body of `SyncView`: source path, `(line, column)`, timestamp.
pub type SyncViewArgs<'a> = (&'a str, (i32, i32), u32);

/// Body of the `SyncSource` signal: source URI, `(line, column)`, timestamp.
pub type SyncSourceArgs = (String, (i32, i32), u32);

/// One viewer window, addressed by owner and object path.
#[derive(Debug, Clone)]
pub struct WindowHandle {
    proxy: Proxy<'static>,
}

impl WindowHandle {
    pub async fn new(
        connection: &BusConnection,
        owner: &str,
        window: &str,
        names: BusNames,
    ) -> Result<Self> {
        let proxy = Proxy::new(
            connection.connection(),
            owner.to_owned(),
            window.to_owned(),
            names.window_interface,
        )
        .await
        .map_err(|e| SyncError::call_failed("bind window", e))?;
        Ok(Self { proxy })
    }

    /// Subscribes to `Closed` and `SyncSource` and forwards both into one channel.
    ///
    /// The forwarding task ends, and the match rules are removed, once the receiver is
    /// dropped or the viewer leaves the bus. Leaving the bus is reported as `Closed`.
    pub async fn signals(&self) -> Result<WindowSignals> {
        let closed = self
            .proxy
            .receive_signal(CLOSED)
            .await
            .map_err(|e| SyncError::call_failed("AddMatch", e))?;
        let sync_source = self
            .proxy
            .receive_signal(SYNC_SOURCE)
            .await
            .map_err(|e| SyncError::call_failed("AddMatch", e))?;

        let sync_source =
            sync_source.map(|message| message.body().deserialize::<SyncSourceArgs>());

        let (tx, rx) = mpsc::unbounded_channel();
        let path = self.proxy.path().to_string();
        tokio::spawn(forward_signals(closed, sync_source, tx, path));
        Ok(rx)
    }
}

/// Merges a window's `Closed` and decoded `SyncSource` streams into `tx`.
///
/// Signal streams end when the viewer drops off the bus without saying goodbye; that
/// is forwarded as `Closed` too.
async fn forward_signals<C, S, E>(
    closed: C,
    sync_source: S,
    tx: mpsc::UnboundedSender<WindowSignal>,
    path: String,
) where
    C: Stream,
    S: Stream<Item = std::result::Result<SyncSourceArgs, E>>,
    E: fmt::Display,
{
    let mut closed = std::pin::pin!(closed);
    let mut sync_source = std::pin::pin!(sync_source);
    loop {
        let (signal, ended) = tokio::select! {
            _ = tx.closed() => break,
            next = closed.next() => (WindowSignal::Closed, next.is_none()),
            next = sync_source.next() => match next {
                Some(Ok(args)) => (WindowSignal::SyncSource(backward_search_event(args)), false),
                Some(Err(e)) => {
                    log::warn!("Malformed SyncSource from {}: {}", path, e);
                    continue;
                }
                None => (WindowSignal::Closed, true),
            },
        };
        if ended {
            log::info!("Window {} left the bus", path);
        }
        if tx.send(signal).is_err() || ended {
            break;
        }
    }
    log::debug!("Stopped listening to window {}", path);
}

#[async_trait]
impl ViewerWindow for WindowHandle {
    async fn sync_view(&self, command: &SyncCommand) -> Result<()> {
        let file = command.input_file.to_string_lossy();
        let args: SyncViewArgs<'_> = (&*file, (command.line, command.column), command.timestamp);
        self.proxy
            .call_noreply(SYNC_VIEW, &args)
            .await
            .map_err(|e| SyncError::call_failed(SYNC_VIEW, e))
    }
}

pub(crate) fn backward_search_event((uri, (line, column), timestamp): SyncSourceArgs) -> BackwardSearchEvent {
    BackwardSearchEvent {
        source_file_uri: uri,
        line,
        column,
        timestamp,
    }
}
