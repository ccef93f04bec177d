use std::time::Duration;

/// Failures of the viewer synchronization bridge.
///
/// Apart from [`SyncError::InvalidDocument`], none of these reach the caller of a
/// forward search: the session logs them and stays closed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The session bus could not be reached. Synchronization is disabled for the process.
    #[error("session bus unreachable: {0}")]
    Connection(String),
    /// The `FindDocument` call on the viewer daemon failed.
    #[error("viewer daemon unavailable: {0}")]
    DaemonUnavailable(String),
    /// A viewer claimed the document but reported no windows.
    #[error("viewer {owner} owns the document but has no windows")]
    Integrity { owner: String },
    /// Generic reply-side failure of a bus call.
    #[error("{call} failed: {message}")]
    CallFailed { call: &'static str, message: String },
    /// Discovery did not resolve to a window in time.
    #[error("discovery timed out after {0:?}")]
    Timeout(Duration),
    /// The document identifier handed to a new session is unusable.
    #[error("invalid document identifier: {0}")]
    InvalidDocument(String),
}

impl SyncError {
    pub fn call_failed(call: &'static str, message: impl ToString) -> Self {
        Self::CallFailed {
            call,
            message: message.to_string(),
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
