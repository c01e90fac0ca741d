//! FileStore - async file operations for the project tree

use futures::future::{BoxFuture, FutureExt};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::entry::{compare_entries, DirEntry, TreeNode};
use crate::error::{Error, FileOp, Result};

/// Directory levels expanded below the tree root
pub const DEFAULT_TREE_DEPTH: usize = 2;

/// File operations, optionally confined to a workspace root
#[derive(Debug, Clone, Default)]
pub struct FileStore {
    root: Option<PathBuf>,
}

impl FileStore {
    /// Store without path restrictions
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store confined to `root`; relative paths are resolved against it
    #[must_use]
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let absolute = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        Self {
            root: Some(normalize(&absolute)),
        }
    }

    /// Workspace root, if confined
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Resolve `path` against the workspace and check containment.
    ///
    /// `..` components are folded lexically so paths that do not exist yet
    /// can be checked. The longest existing prefix is then canonicalized,
    /// so a symlink inside the root cannot lead outside it.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        let Some(root) = &self.root else {
            return Ok(path.to_path_buf());
        };

        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        let resolved = normalize(&joined);
        if !resolved.starts_with(root) {
            warn!(path = %path.display(), "Blocked path outside workspace");
            return Err(Error::OutsideWorkspace(path.to_path_buf()));
        }

        let physical_root = std::fs::canonicalize(root).unwrap_or_else(|_| root.clone());
        match physical(&resolved) {
            Some(target) if target.starts_with(&physical_root) => Ok(resolved),
            target => {
                warn!(
                    path = %path.display(),
                    target = ?target,
                    "Blocked path leaving workspace through a symlink"
                );
                Err(Error::OutsideWorkspace(path.to_path_buf()))
            }
        }
    }

    /// List a directory, directories first then by name
    pub async fn list_directory(&self, path: impl AsRef<Path>) -> Result<Vec<DirEntry>> {
        let dir = self.resolve(path)?;
        debug!(path = %dir.display(), "Listing directory");

        let mut entries = read_entries(&dir).await?;
        entries.sort_by(compare_entries);
        Ok(entries)
    }

    /// Walk the project tree below `path`.
    ///
    /// Hidden entries are skipped and directories are expanded `max_depth`
    /// levels deep. A subdirectory that cannot be read is logged and shown
    /// without children; only a failure on `path` itself is an error.
    pub async fn tree(&self, path: impl AsRef<Path>, max_depth: usize) -> Result<Vec<TreeNode>> {
        let dir = self.resolve(path)?;
        debug!(path = %dir.display(), max_depth, "Walking project tree");
        walk(dir, max_depth).await
    }

    /// Read a UTF-8 file
    pub async fn read_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = self.resolve(path)?;
        fs::read_to_string(&path)
            .await
            .map_err(|e| Error::io(FileOp::ReadFile, &path, e))
    }

    /// Replace a file's contents
    pub async fn write_file(&self, path: impl AsRef<Path>, content: &str) -> Result<()> {
        let path = self.resolve(path)?;
        fs::write(&path, content)
            .await
            .map_err(|e| Error::io(FileOp::WriteFile, &path, e))?;
        debug!(path = %path.display(), bytes = content.len(), "Wrote file");
        Ok(())
    }

    /// Create an empty file; fails if the path already exists
    pub async fn create_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = self.resolve(path)?;
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| Error::io(FileOp::CreateFile, &path, e))?;
        debug!(path = %path.display(), "Created file");
        Ok(())
    }

    /// Delete a file, or a directory with everything inside it
    pub async fn delete_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = self.resolve(path)?;
        if self.root.as_deref() == Some(path.as_path()) {
            return Err(Error::OutsideWorkspace(path));
        }

        let metadata = fs::symlink_metadata(&path)
            .await
            .map_err(|e| Error::io(FileOp::Delete, &path, e))?;
        let removed = if metadata.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        removed.map_err(|e| Error::io(FileOp::Delete, &path, e))?;
        debug!(path = %path.display(), "Deleted path");
        Ok(())
    }

    /// Rename or move a file or directory
    pub async fn rename_path(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<()> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        fs::rename(&from, &to)
            .await
            .map_err(|e| Error::io(FileOp::Rename, &from, e))?;
        debug!(from = %from.display(), to = %to.display(), "Renamed path");
        Ok(())
    }
}

async fn read_entries(dir: &Path) -> Result<Vec<DirEntry>> {
    let mut reader = fs::read_dir(dir)
        .await
        .map_err(|e| Error::io(FileOp::ReadDirectory, dir, e))?;

    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| Error::io(FileOp::ReadDirectory, dir, e))?
    {
        let is_directory = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        entries.push(DirEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path(),
            is_directory,
        });
    }
    Ok(entries)
}

fn walk(dir: PathBuf, depth: usize) -> BoxFuture<'static, Result<Vec<TreeNode>>> {
    async move {
        let mut entries: Vec<DirEntry> = read_entries(&dir)
            .await?
            .into_iter()
            .filter(|e| !e.is_hidden())
            .collect();
        entries.sort_by(compare_entries);

        let mut nodes = Vec::with_capacity(entries.len());
        for entry in entries {
            let children = if entry.is_directory && depth > 0 {
                match walk(entry.path.clone(), depth - 1).await {
                    Ok(children) => children,
                    Err(e) => {
                        warn!(path = %entry.path.display(), error = %e, "Skipping unreadable directory");
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            };
            nodes.push(TreeNode { entry, children });
        }
        Ok(nodes)
    }
    .boxed()
}

/// Canonicalize the longest existing prefix of `path` and re-append the rest.
///
/// `None` when a dangling symlink sits on the path, since its target
/// cannot be checked.
fn physical(path: &Path) -> Option<PathBuf> {
    let mut existing = path;
    let mut rest = Vec::new();
    loop {
        match std::fs::canonicalize(existing) {
            Ok(canonical) => {
                return Some(rest.iter().rev().fold(canonical, |acc: PathBuf, part| acc.join(part)));
            }
            Err(_) => {
                if std::fs::symlink_metadata(existing).is_ok_and(|m| m.file_type().is_symlink()) {
                    return None;
                }
                let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                    return Some(path.to_path_buf());
                };
                rest.push(name.to_os_string());
                existing = parent;
            }
        }
    }
}

/// Fold `.` and `..` components lexically
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
