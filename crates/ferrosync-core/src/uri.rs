//! Translation between local paths and the `file://` URIs spoken on the bus.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Canonical identifier of a viewable document (the compiled output of a source file).
///
/// Always an absolute `file://` URI with a percent-encoded path. The value is fixed once a
/// session has been created for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentUri(String);

impl DocumentUri {
    /// Builds the URI of an absolute local path.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.is_absolute() {
            return Err(SyncError::InvalidDocument(format!(
                "{} is not an absolute path",
                path.display()
            )));
        }
        let url = Url::from_file_path(path)
            .map_err(|_| SyncError::InvalidDocument(path.display().to_string()))?;
        Ok(Self(url.into()))
    }

    /// Parses an existing `file://` URI.
    pub fn parse(uri: &str) -> Result<Self> {
        let url =
            Url::parse(uri).map_err(|e| SyncError::InvalidDocument(format!("{}: {}", uri, e)))?;
        if url.scheme() != "file" {
            return Err(SyncError::InvalidDocument(format!(
                "{}: only file:// documents can be synchronized",
                uri
            )));
        }
        // Rejects hosts and relative forms the viewer could never open.
        url.to_file_path()
            .map_err(|_| SyncError::InvalidDocument(format!("{}: not a local path", uri)))?;
        Ok(Self(url.into()))
    }

    /// URI of the compiled output for `source`, e.g. `main.tex` + `pdf` -> `file:///…/main.pdf`.
    pub fn for_output(source: &Path, extension: &str) -> Result<Self> {
        Self::from_path(&source.with_extension(extension))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_file_path(&self) -> Option<PathBuf> {
        Url::parse(&self.0).ok()?.to_file_path().ok()
    }

    /// Compares against a URI received from the bus.
    ///
    /// Viewers do not always escape paths the same way, so both sides are normalized
    /// through the URL parser before comparing.
    pub fn matches(&self, other: &str) -> bool {
        if self.0 == other {
            return true;
        }
        Url::parse(other)
            .map(|url| url.as_str() == self.0)
            .unwrap_or(false)
    }
}

impl fmt::Display for DocumentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentUri {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DocumentUri> for String {
    fn from(uri: DocumentUri) -> Self {
        uri.0
    }
}

/// Turns the source file reported by a backward search into a local path.
///
/// `file://` URIs are percent-decoded and stripped of their scheme. Plain paths, which some
/// viewers send instead, are passed through.
pub fn source_uri_to_path(uri: &str) -> Result<PathBuf> {
    if uri.starts_with("file:") {
        let url = Url::parse(uri)
            .map_err(|e| SyncError::InvalidDocument(format!("{}: {}", uri, e)))?;
        return url
            .to_file_path()
            .map_err(|_| SyncError::InvalidDocument(format!("{}: not a local path", uri)));
    }
    Ok(PathBuf::from(uri))
}
