//! Display policy: what a row offers and how a delete is confirmed.
//!
//! Nothing here changes what is sent to the server. A lost record and a
//! normal file go through the same delete request; only the wording and the
//! quota expectation shown to the user differ.

use std::fmt;

use crate::types::FileNode;

/// What the current session may do. Unknown sessions are read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub can_delete: bool,
    pub can_write: bool,
}

impl Capabilities {
    pub fn read_only() -> Self {
        Self::default()
    }

    pub fn full() -> Self {
        Self {
            can_delete: true,
            can_write: true,
        }
    }
}

/// Confirmation shown before a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePrompt {
    /// Stored bytes go away and the quota shrinks.
    FullDelete { reclaimed_bytes: u64, is_folder: bool },
    /// Only the metadata record is removed; quota is unaffected.
    MetadataCleanup,
}

impl DeletePrompt {
    pub fn frees_quota(&self) -> bool {
        matches!(self, Self::FullDelete { reclaimed_bytes, .. } if *reclaimed_bytes > 0)
    }

    /// Prompt text for `name`.
    pub fn text(&self, name: &str) -> String {
        match self {
            Self::FullDelete {
                is_folder: true, ..
            } => format!("Delete folder \"{}\" and everything in it?", name),
            Self::FullDelete {
                reclaimed_bytes, ..
            } => format!(
                "Delete \"{}\"? This frees {}.",
                name,
                human_bytes(*reclaimed_bytes)
            ),
            Self::MetadataCleanup => format!(
                "\"{}\" has no stored data. Remove the record? Quota is not affected.",
                name
            ),
        }
    }
}

/// Choose the confirmation for deleting `node`. Folders are always full deletes.
pub fn delete_prompt(node: &FileNode) -> DeletePrompt {
    if node.is_folder {
        return DeletePrompt::FullDelete {
            reclaimed_bytes: node.size,
            is_folder: true,
        };
    }
    if node.is_lost() {
        return DeletePrompt::MetadataCleanup;
    }
    DeletePrompt::FullDelete {
        reclaimed_bytes: node.size,
        is_folder: false,
    }
}

/// Action offered on a listing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowAction {
    Open,
    Preview,
    Download,
    DownloadZip,
    Rename,
    Delete,
}

impl fmt::Display for RowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Open => "open",
            Self::Preview => "preview",
            Self::Download => "download",
            Self::DownloadZip => "download zip",
            Self::Rename => "rename",
            Self::Delete => "delete",
        };
        f.write_str(label)
    }
}

/// Actions available on `node` for a session with `caps`.
pub fn row_actions(node: &FileNode, caps: Capabilities) -> Vec<RowAction> {
    if node.is_optimistic {
        return Vec::new();
    }
    if !node.is_folder && node.is_lost() {
        return if caps.can_delete {
            vec![RowAction::Delete]
        } else {
            Vec::new()
        };
    }

    let mut actions = if node.is_folder {
        vec![RowAction::Open, RowAction::DownloadZip]
    } else {
        vec![RowAction::Preview, RowAction::Download]
    };
    if caps.can_write {
        actions.push(RowAction::Rename);
    }
    if caps.can_delete {
        actions.push(RowAction::Delete);
    }
    actions
}

/// `2048` → `"2.0 KB"`.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
