use crate::connection::BusConnection;
use ferrosync_core::bus::DocumentLoadedSignals;
use ferrosync_core::protocol::{DOCUMENT_LOADED, FIND_DOCUMENT};
use ferrosync_core::{BusNames, DocumentLoaded, Result, SyncError};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use zbus::{MatchRule, Message, MessageStream, Proxy};

/// Client of the viewer daemon that maps documents to viewer instances.
#[derive(Debug, Clone)]
pub struct DaemonProxy {
    proxy: Proxy<'static>,
    connection: BusConnection,
    names: BusNames,
}

impl DaemonProxy {
    pub async fn new(connection: &BusConnection, names: BusNames) -> Result<Self> {
        let proxy = Proxy::new(
            connection.connection(),
            names.daemon_service,
            names.daemon_path,
            names.daemon_interface,
        )
        .await
        .map_err(|e| SyncError::DaemonUnavailable(e.to_string()))?;
        Ok(Self {
            proxy,
            connection: connection.clone(),
            names,
        })
    }

    /// `FindDocument(uri, spawn)`: the unique name of the viewer showing `uri`, or `""`.
    pub async fn find_document(&self, uri: &str, spawn: bool) -> Result<String> {
        let owner: String = self
            .proxy
            .call(FIND_DOCUMENT, &(uri, spawn))
            .await
            .map_err(|e| SyncError::DaemonUnavailable(e.to_string()))?;
        Ok(owner)
    }

    /// Subscribes to `DocumentLoaded` from every viewer instance on the bus.
    ///
    /// The broadcast is emitted by viewer windows rather than by the daemon, so the match
    /// rule filters on the window interface only and the owner is taken from the sender.
    pub async fn document_loaded(&self) -> Result<DocumentLoadedSignals> {
        let rule = MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .interface(self.names.window_interface)
            .and_then(|b| b.member(DOCUMENT_LOADED))
            .map_err(|e| SyncError::call_failed("AddMatch", e))?
            .build();
        let stream = MessageStream::for_match_rule(rule, self.connection.connection(), None)
            .await
            .map_err(|e| SyncError::call_failed("AddMatch", e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = std::pin::pin!(stream);
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    next = stream.next() => match next {
                        Some(Ok(message)) => {
                            let Some(loaded) = parse_document_loaded(&message) else {
                                continue;
                            };
                            if tx.send(loaded).is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => log::debug!("Dropping malformed bus message: {}", e),
                        None => break,
                    },
                }
            }
        });
        Ok(rx)
    }
}

fn parse_document_loaded(message: &Message) -> Option<DocumentLoaded> {
    let header = message.header();
    let sender = header.sender().map(|s| s.to_string());
    let uri: String = message.body().deserialize().ok()?;
    document_loaded(uri, sender)
}

pub(crate) fn document_loaded(uri: String, sender: Option<String>) -> Option<DocumentLoaded> {
    let owner = sender.filter(|s| !s.is_empty())?;
    Some(DocumentLoaded { uri, owner })
}
