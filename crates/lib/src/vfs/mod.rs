//! Virtual filesystem layer.
//!
//! Every tree the build reads or writes goes through the [`FileSystem`] trait
//! so in-memory, on-disk and composed trees are interchangeable.
//!
//! # Trees
//!
//! A [`Workspace`] bundles the three trees a session works with:
//!
//! ```text
//! root/        # library sources, read-mostly, shared across sessions
//! path/        # fetched and user sources, exclusive to one session
//! temporary/   # compiler scratch output, discarded with the workspace
//! ```
//!
//! Paths are `/`-separated and relative to the tree root. Package sources live
//! at `src/<import path>/` in every tree.

mod mem;
mod mount;
mod os;

use std::sync::Arc;

use thiserror::Error;

use crate::consts::SRC_DIR;

pub use mem::MemFs;
pub use mount::{MountFs, Overlay};
pub use os::OsFs;

/// Errors raised by filesystem trees.
#[derive(Debug, Error)]
pub enum FsError {
  #[error("file not found: {0}")]
  NotFound(String),

  #[error("not a directory: {0}")]
  NotADirectory(String),

  #[error("is a directory: {0}")]
  IsADirectory(String),

  #[error("invalid path: {0}")]
  InvalidPath(String),

  #[error("io error at {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

impl FsError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, FsError::NotFound(_))
  }
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind {
  File,
  Dir,
}

/// A single entry returned by [`FileSystem::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
  pub name: String,
  pub kind: EntryKind,
}

impl DirEntry {
  pub fn is_dir(&self) -> bool {
    self.kind == EntryKind::Dir
  }
}

/// A tree of files and directories.
///
/// Implementations must be safe to share between build workers; writes take
/// whatever internal lock the tree needs.
pub trait FileSystem: Send + Sync + std::fmt::Debug {
  /// Read a whole file.
  fn read(&self, path: &str) -> Result<Vec<u8>, FsError>;

  /// Create or truncate a file, creating missing parent directories.
  fn write(&self, path: &str, contents: &[u8]) -> Result<(), FsError>;

  /// Create a directory and all of its parents.
  fn create_dir_all(&self, path: &str) -> Result<(), FsError>;

  /// List the direct children of a directory, sorted by name.
  fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError>;

  /// Kind of the entry at `path`, or `None` if it does not exist.
  fn kind(&self, path: &str) -> Option<EntryKind>;

  fn exists(&self, path: &str) -> bool {
    self.kind(path).is_some()
  }

  fn is_dir(&self, path: &str) -> bool {
    self.kind(path) == Some(EntryKind::Dir)
  }
}

/// Normalize a virtual path.
///
/// Leading and repeated separators and `.` components are dropped. `..` is
/// rejected so no path can escape the tree it is resolved against.
pub fn normalize(path: &str) -> Result<String, FsError> {
  let mut parts = Vec::new();
  for part in path.split('/') {
    match part {
      "" | "." => {}
      ".." => return Err(FsError::InvalidPath(path.to_string())),
      p if p.contains('\\') => return Err(FsError::InvalidPath(path.to_string())),
      p => parts.push(p),
    }
  }
  Ok(parts.join("/"))
}

/// Join two virtual paths.
pub fn join(base: &str, rest: &str) -> String {
  match (base.is_empty(), rest.is_empty()) {
    (true, _) => rest.to_string(),
    (_, true) => base.to_string(),
    _ => format!("{}/{}", base.trim_end_matches('/'), rest.trim_start_matches('/')),
  }
}

/// Directory of a package inside a tree.
pub fn package_dir(import_path: &str) -> String {
  join(SRC_DIR, import_path)
}

/// The trees one session works with.
#[derive(Debug, Clone)]
pub struct Workspace {
  /// Library/default sources. Shared read-only between sessions.
  pub root: Arc<dyn FileSystem>,

  /// Fetched and user-provided sources. Exclusive to one session.
  pub path: Arc<dyn FileSystem>,

  /// Scratch space for compiler output.
  pub temporary: Arc<dyn FileSystem>,
}

impl Workspace {
  /// Create a workspace over a shared root tree with fresh path and temporary trees.
  pub fn new(root: Arc<dyn FileSystem>) -> Self {
    Self {
      root,
      path: Arc::new(MemFs::new()),
      temporary: Arc::new(MemFs::new()),
    }
  }

  /// Create a workspace whose path tree falls back to `local` under `src/`.
  ///
  /// Packages in `local` become visible without being copied; anything the
  /// session writes still lands in memory.
  pub fn with_local(root: Arc<dyn FileSystem>, local: Arc<dyn FileSystem>) -> Self {
    let path = MountFs::new(Arc::new(MemFs::new()), SRC_DIR, local);
    Self {
      root,
      path: Arc::new(path),
      temporary: Arc::new(MemFs::new()),
    }
  }

  /// The source view used by builds: the path tree overrides the root tree.
  pub fn sources(&self) -> Overlay {
    Overlay::new(vec![self.path.clone(), self.root.clone()])
  }

  /// Write a package's files into the path tree.
  pub fn add_package<'a>(
    &self,
    import_path: &str,
    files: impl IntoIterator<Item = (&'a str, &'a [u8])>,
  ) -> Result<(), FsError> {
    let dir = package_dir(import_path);
    self.path.create_dir_all(&dir)?;
    for (name, contents) in files {
      self.path.write(&join(&dir, name), contents)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_strips_separators_and_dots() {
    assert_eq!(normalize("/src//fmt/./print.go").unwrap(), "src/fmt/print.go");
    assert_eq!(normalize("").unwrap(), "");
    assert_eq!(normalize("/").unwrap(), "");
  }

  #[test]
  fn normalize_rejects_parent_components() {
    assert!(matches!(normalize("src/../etc"), Err(FsError::InvalidPath(_))));
  }

  #[test]
  fn join_handles_empty_sides() {
    assert_eq!(join("", "a"), "a");
    assert_eq!(join("a", ""), "a");
    assert_eq!(join("a/", "/b"), "a/b");
    assert_eq!(package_dir("github.com/x/y"), "src/github.com/x/y");
  }

  #[test]
  fn path_tree_overrides_root() {
    let root = MemFs::new();
    root.write("src/fmt/print.go", b"root").unwrap();
    let ws = Workspace::new(Arc::new(root));

    assert_eq!(ws.sources().read("src/fmt/print.go").unwrap(), b"root");

    ws.add_package("fmt", [("print.go", b"path".as_slice())]).unwrap();
    assert_eq!(ws.sources().read("src/fmt/print.go").unwrap(), b"path");

    // Root is untouched.
    assert_eq!(ws.root.read("src/fmt/print.go").unwrap(), b"root");
  }

  #[test]
  fn local_tree_is_visible_but_not_written() {
    let local = MemFs::new();
    local.write("example.com/lib/lib.go", b"package lib").unwrap();
    let local: Arc<dyn FileSystem> = Arc::new(local);
    let ws = Workspace::with_local(Arc::new(MemFs::new()), local.clone());

    assert!(ws.sources().is_dir("src/example.com/lib"));
    ws.add_package("main", [("main.go", b"package main".as_slice())]).unwrap();
    assert!(ws.path.exists("src/main/main.go"));
    assert!(!local.exists("main/main.go"));
  }
}
