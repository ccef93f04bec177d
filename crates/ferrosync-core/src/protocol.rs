//! Bus names of the Evince-family viewers.
//!
//! Evince, Xreader and Atril share one SyncTeX protocol and differ only in the names
//! their daemon, application and window objects are published under.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const FIND_DOCUMENT: &str = "FindDocument";
pub const GET_WINDOW_LIST: &str = "GetWindowList";
pub const SYNC_VIEW: &str = "SyncView";
pub const SYNC_SOURCE: &str = "SyncSource";
pub const CLOSED: &str = "Closed";
pub const DOCUMENT_LOADED: &str = "DocumentLoaded";

/// Which viewer implementation to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerKind {
    #[default]
    Evince,
    Xreader,
    Atril,
}

impl ViewerKind {
    pub fn bus_names(self) -> BusNames {
        match self {
            ViewerKind::Evince => BusNames {
                daemon_service: "org.gnome.evince.Daemon",
                daemon_path: "/org/gnome/evince/Daemon",
                daemon_interface: "org.gnome.evince.Daemon",
                app_path: "/org/gnome/evince/Evince",
                app_interface: "org.gnome.evince.Application",
                window_interface: "org.gnome.evince.Window",
            },
            ViewerKind::Xreader => BusNames {
                daemon_service: "org.x.reader.Daemon",
                daemon_path: "/org/x/reader/Daemon",
                daemon_interface: "org.x.reader.Daemon",
                app_path: "/org/x/reader/Xreader",
                app_interface: "org.x.reader.Application",
                window_interface: "org.x.reader.Window",
            },
            ViewerKind::Atril => BusNames {
                daemon_service: "org.mate.atril.Daemon",
                daemon_path: "/org/mate/atril/Daemon",
                daemon_interface: "org.mate.atril.Daemon",
                app_path: "/org/mate/atril/Atril",
                app_interface: "org.mate.atril.Application",
                window_interface: "org.mate.atril.Window",
            },
        }
    }
}

impl fmt::Display for ViewerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViewerKind::Evince => "evince",
            ViewerKind::Xreader => "xreader",
            ViewerKind::Atril => "atril",
        })
    }
}

impl FromStr for ViewerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "evince" => Ok(ViewerKind::Evince),
            "xreader" => Ok(ViewerKind::Xreader),
            "atril" => Ok(ViewerKind::Atril),
            other => Err(format!("unknown viewer '{}'", other)),
        }
    }
}

/// Well-known names and object paths of one viewer implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusNames {
    pub daemon_service: &'static str,
    pub daemon_path: &'static str,
    pub daemon_interface: &'static str,
    pub app_path: &'static str,
    pub app_interface: &'static str,
    /// Carries `SyncView`, `SyncSource`, `Closed` and the `DocumentLoaded` broadcast.
    pub window_interface: &'static str,
}

impl Default for BusNames {
    fn default() -> Self {
        ViewerKind::default().bus_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_kind_parse_is_case_insensitive() {
        assert_eq!("Evince".parse::<ViewerKind>(), Ok(ViewerKind::Evince));
        assert_eq!("ATRIL".parse::<ViewerKind>(), Ok(ViewerKind::Atril));
        assert!("okular".parse::<ViewerKind>().is_err());
    }

    #[test]
    fn test_default_names_are_evince() {
        let names = BusNames::default();
        assert_eq!(names.daemon_service, "org.gnome.evince.Daemon");
        assert_eq!(names.window_interface, "org.gnome.evince.Window");
    }
}
