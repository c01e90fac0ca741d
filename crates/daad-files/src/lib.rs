//! Daad Files - Project file store
//!
//! Async file operations behind the editor's file tree:
//! listing, tree walking, read/write, create, delete and rename.
//! An optional workspace root confines every path to the opened project.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod entry;
pub mod error;
pub mod store;


pub use entry::{DirEntry, TreeNode};
pub use error::{Error, FileOp, Result};
pub use store::{FileStore, DEFAULT_TREE_DEPTH};
