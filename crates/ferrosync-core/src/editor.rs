//! Editor-side helpers for acting on a backward search.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Where a backward search asks the editor to go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationTarget {
    pub file: PathBuf,
    pub line: i32,
    pub column: i32,
}

impl NavigationTarget {
    pub fn new(file: &Path, line: i32, column: i32) -> Self {
        Self {
            file: file.to_path_buf(),
            line: line.max(1),
            column: column.max(1),
        }
    }

    /// A single Vim command line that switches to the file's buffer (loading it if
    /// needed), puts the cursor on the line and selects it linewise.
    pub fn vim_command(&self) -> String {
        let escaped = escape_vim_path(&self.file);
        format!(
            "if bufloaded('{}') | buffer {} | else | edit {} | endif | call cursor({}, 1) | normal! V",
            self.file.to_string_lossy().replace('\'', "''"),
            escaped,
            escaped,
            self.line
        )
    }
}

/// Escapes a path for use as an Ex command argument.
pub fn escape_vim_path(path: &Path) -> String {
    let mut out = String::new();
    for c in path.to_string_lossy().chars() {
        if matches!(c, ' ' | '\\' | '%' | '#' | '|' | '"' | '\t') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
