use crate::protocol::ViewerKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User settings for viewer synchronization.
///
/// Stored as JSON in `~/.config/ferrosync/config.json`. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Master switch; when off no bus connection is attempted.
    pub enabled: bool,
    /// Whether a forward search may start a viewer for a document that is not open.
    pub spawn_viewer: bool,
    pub viewer: ViewerKind,
    /// Upper bound on one discovery attempt, in milliseconds.
    pub discovery_timeout_ms: u64,
    /// Extension of the compiled document next to each source file.
    pub output_extension: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            spawn_viewer: true,
            viewer: ViewerKind::Evince,
            discovery_timeout_ms: 10_000,
            output_extension: "pdf".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    /// Returns the default config file path: ~/.config/ferrosync/config.json
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ferrosync").join("config.json"))
    }

    /// Loads the user config, falling back to defaults.
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|path| Self::load_from_path(&path))
            .unwrap_or_default()
    }

    pub fn load_from_path(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<SyncConfig>(&content) {
                Ok(config) => {
                    log::debug!("Loaded sync config from {:?}", path);
                    return Some(config);
                }
                Err(e) => log::warn!("Ignoring malformed config {:?}: {}", path, e),
            },
            Err(e) => log::warn!("Failed to read config {:?}: {}", path, e),
        }
        None
    }

    pub fn save_to_path(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}
