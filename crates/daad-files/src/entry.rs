//! Directory entries and tree nodes

use serde::Serialize;
use std::cmp::Ordering;
use std::path::PathBuf;

/// One directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    /// File name
    pub name: String,
    /// Full path
    pub path: PathBuf,
    /// Whether the entry is a directory
    pub is_directory: bool,
}

impl DirEntry {
    /// Dot-files are hidden from the project tree
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}

/// Entry in the project tree, with expanded children for directories
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    /// The entry itself
    #[serde(flatten)]
    pub entry: DirEntry,
    /// Children (empty for files and for directories past the depth limit)
    pub children: Vec<TreeNode>,
}

/// Directories first, then case-insensitive by name
pub(crate) fn compare_entries(a: &DirEntry, b: &DirEntry) -> Ordering {
    b.is_directory
        .cmp(&a.is_directory)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}
