use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// A forward search: highlight `line`/`column` of `input_file` in the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCommand {
    /// Source file, sent to the viewer as an absolute path.
    pub input_file: PathBuf,
    /// 1-based line.
    pub line: i32,
    /// 1-based column; viewers ignore it when SyncTeX has no column information.
    pub column: i32,
    /// Unix time of the user action that triggered the search.
    pub timestamp: u32,
}

impl SyncCommand {
    pub fn new(input_file: impl Into<PathBuf>, line: i32, column: i32, timestamp: u32) -> Self {
        Self {
            input_file: input_file.into(),
            line,
            column,
            timestamp,
        }
    }

    /// Same as [`SyncCommand::new`], stamped with the current time.
    pub fn now(input_file: impl Into<PathBuf>, line: i32, column: i32) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        Self::new(input_file, line, column, timestamp)
    }
}

/// A backward search reported by the viewer's `SyncSource` signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackwardSearchEvent {
    /// Source file as the viewer reports it, usually a `file://` URI.
    pub source_file_uri: String,
    pub line: i32,
    pub column: i32,
    pub timestamp: u32,
}

/// The daemon-wide `DocumentLoaded` broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLoaded {
    pub uri: String,
    /// Unique bus name of the viewer instance that loaded the document.
    pub owner: String,
}
