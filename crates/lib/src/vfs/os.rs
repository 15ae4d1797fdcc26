//! On-disk filesystem tree rooted at a base directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{DirEntry, EntryKind, FileSystem, FsError, normalize};

/// A view of a directory on disk.
///
/// Virtual paths resolve relative to `base`; `..` components are rejected by
/// [`normalize`], so nothing outside `base` is reachable.
#[derive(Debug, Clone)]
pub struct OsFs {
  base: PathBuf,
}

impl OsFs {
  pub fn new(base: impl Into<PathBuf>) -> Self {
    Self { base: base.into() }
  }

  pub fn base(&self) -> &Path {
    &self.base
  }

  fn resolve(&self, path: &str) -> Result<(String, PathBuf), FsError> {
    let path = normalize(path)?;
    let full = if path.is_empty() { self.base.clone() } else { self.base.join(&path) };
    Ok((path, full))
  }
}

fn map_io(path: String, e: io::Error) -> FsError {
  if e.kind() == io::ErrorKind::NotFound {
    FsError::NotFound(path)
  } else {
    FsError::Io { path, source: e }
  }
}

impl FileSystem for OsFs {
  fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
    let (path, full) = self.resolve(path)?;
    if full.is_dir() {
      return Err(FsError::IsADirectory(path));
    }
    fs::read(&full).map_err(|e| map_io(path, e))
  }

  fn write(&self, path: &str, contents: &[u8]) -> Result<(), FsError> {
    let (path, full) = self.resolve(path)?;
    if let Some(parent) = full.parent() {
      fs::create_dir_all(parent).map_err(|e| map_io(path.clone(), e))?;
    }
    fs::write(&full, contents).map_err(|e| map_io(path, e))
  }

  fn create_dir_all(&self, path: &str) -> Result<(), FsError> {
    let (path, full) = self.resolve(path)?;
    fs::create_dir_all(&full).map_err(|e| map_io(path, e))
  }

  fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
    let (path, full) = self.resolve(path)?;
    if full.is_file() {
      return Err(FsError::NotADirectory(path));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(&full).map_err(|e| map_io(path.clone(), e))? {
      let entry = entry.map_err(|e| map_io(path.clone(), e))?;
      // Follow symlinks so a linked package directory behaves like a real one.
      let Ok(meta) = fs::metadata(entry.path()) else {
        continue;
      };
      let kind = if meta.is_dir() {
        EntryKind::Dir
      } else if meta.is_file() {
        EntryKind::File
      } else {
        continue;
      };
      entries.push(DirEntry {
        name: entry.file_name().to_string_lossy().to_string(),
        kind,
      });
    }
    entries.sort();
    Ok(entries)
  }

  fn kind(&self, path: &str) -> Option<EntryKind> {
    let (_, full) = self.resolve(path).ok()?;
    let meta = fs::metadata(full).ok()?;
    if meta.is_dir() {
      Some(EntryKind::Dir)
    } else if meta.is_file() {
      Some(EntryKind::File)
    } else {
      None
    }
  }
}
