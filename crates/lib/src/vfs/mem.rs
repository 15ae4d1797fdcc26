//! In-memory filesystem tree.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::RwLock;

use walkdir::WalkDir;

use super::{DirEntry, EntryKind, FileSystem, FsError, join, normalize};

#[derive(Debug, Default)]
struct Tree {
  files: BTreeMap<String, Vec<u8>>,
  dirs: BTreeSet<String>,
}

impl Tree {
  fn add_dir_all(&mut self, path: &str) {
    let mut current = String::new();
    for part in path.split('/').filter(|p| !p.is_empty()) {
      current = join(&current, part);
      self.dirs.insert(current.clone());
    }
  }

  fn kind(&self, path: &str) -> Option<EntryKind> {
    if path.is_empty() || self.dirs.contains(path) {
      Some(EntryKind::Dir)
    } else if self.files.contains_key(path) {
      Some(EntryKind::File)
    } else {
      None
    }
  }
}

/// A filesystem held entirely in memory.
///
/// Used for the per-session path tree, the temporary tree, and for root trees
/// loaded up front in batch mode.
#[derive(Debug, Default)]
pub struct MemFs {
  tree: RwLock<Tree>,
}

impl MemFs {
  pub fn new() -> Self {
    Self::default()
  }

  /// Copy an on-disk directory into this tree under `prefix`.
  ///
  /// Symlinks are followed; special files are skipped.
  pub fn copy_from_dir(&self, dir: &Path, prefix: &str) -> Result<usize, FsError> {
    let prefix = normalize(prefix)?;
    let mut copied = 0;

    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
      let entry = entry.map_err(|e| FsError::Io {
        path: dir.display().to_string(),
        source: e.into(),
      })?;
      let rel = entry
        .path()
        .strip_prefix(dir)
        .unwrap_or(entry.path())
        .to_string_lossy()
        .replace('\\', "/");
      let target = join(&prefix, &rel);

      if entry.file_type().is_dir() {
        self.create_dir_all(&target)?;
      } else if entry.file_type().is_file() {
        let contents = std::fs::read(entry.path()).map_err(|e| FsError::Io {
          path: entry.path().display().to_string(),
          source: e,
        })?;
        self.write(&target, &contents)?;
        copied += 1;
      }
    }

    Ok(copied)
  }

  /// Number of files in the tree.
  pub fn file_count(&self) -> usize {
    self.tree.read().map(|t| t.files.len()).unwrap_or(0)
  }

  fn read_tree(&self) -> std::sync::RwLockReadGuard<'_, Tree> {
    // A panic while holding the lock cannot leave the maps half-updated.
    self.tree.read().unwrap_or_else(|e| e.into_inner())
  }

  fn write_tree(&self) -> std::sync::RwLockWriteGuard<'_, Tree> {
    self.tree.write().unwrap_or_else(|e| e.into_inner())
  }
}

impl FileSystem for MemFs {
  fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
    let path = normalize(path)?;
    let tree = self.read_tree();
    match tree.files.get(&path) {
      Some(contents) => Ok(contents.clone()),
      None if tree.kind(&path) == Some(EntryKind::Dir) => Err(FsError::IsADirectory(path)),
      None => Err(FsError::NotFound(path)),
    }
  }

  fn write(&self, path: &str, contents: &[u8]) -> Result<(), FsError> {
    let path = normalize(path)?;
    let mut tree = self.write_tree();
    if tree.kind(&path) == Some(EntryKind::Dir) {
      return Err(FsError::IsADirectory(path));
    }
    if let Some((parent, _)) = path.rsplit_once('/') {
      if tree.files.contains_key(parent) {
        return Err(FsError::NotADirectory(parent.to_string()));
      }
      tree.add_dir_all(parent);
    }
    tree.files.insert(path, contents.to_vec());
    Ok(())
  }

  fn create_dir_all(&self, path: &str) -> Result<(), FsError> {
    let path = normalize(path)?;
    let mut tree = self.write_tree();
    if tree.files.contains_key(&path) {
      return Err(FsError::NotADirectory(path));
    }
    tree.add_dir_all(&path);
    Ok(())
  }

  fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
    let path = normalize(path)?;
    let tree = self.read_tree();
    match tree.kind(&path) {
      Some(EntryKind::Dir) => {}
      Some(EntryKind::File) => return Err(FsError::NotADirectory(path)),
      None => return Err(FsError::NotFound(path)),
    }

    let prefix = if path.is_empty() { String::new() } else { format!("{}/", path) };
    let child = |key: &String| -> Option<String> {
      let rest = key.strip_prefix(&prefix)?;
      (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
    };

    let mut entries: Vec<DirEntry> = tree
      .dirs
      .iter()
      .filter_map(|d| child(d).map(|name| DirEntry { name, kind: EntryKind::Dir }))
      .chain(
        tree
          .files
          .keys()
          .filter_map(|f| child(f).map(|name| DirEntry { name, kind: EntryKind::File })),
      )
      .collect();
    entries.sort();
    Ok(entries)
  }

  fn kind(&self, path: &str) -> Option<EntryKind> {
    let path = normalize(path).ok()?;
    self.read_tree().kind(&path)
  }
}
