//! Composed trees: prefix mounts and ordered overlays.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{DirEntry, EntryKind, FileSystem, FsError, normalize};

/// Merge directory listings; the first listing to name an entry wins.
fn merge_listings(listings: impl IntoIterator<Item = Vec<DirEntry>>) -> Vec<DirEntry> {
  let mut merged: BTreeMap<String, EntryKind> = BTreeMap::new();
  for listing in listings {
    for entry in listing {
      merged.entry(entry.name).or_insert(entry.kind);
    }
  }
  let mut entries: Vec<DirEntry> = merged.into_iter().map(|(name, kind)| DirEntry { name, kind }).collect();
  entries.sort();
  entries
}

/// A host tree with a second tree mounted at `prefix` as a read fallback.
///
/// Paths under `prefix` are looked up in the host first and then in the
/// mounted tree (with the prefix stripped). All writes go to the host, so the
/// mounted tree is never modified.
#[derive(Debug, Clone)]
pub struct MountFs {
  host: Arc<dyn FileSystem>,
  prefix: String,
  mounted: Arc<dyn FileSystem>,
}

impl MountFs {
  pub fn new(host: Arc<dyn FileSystem>, prefix: &str, mounted: Arc<dyn FileSystem>) -> Self {
    Self {
      host,
      prefix: normalize(prefix).unwrap_or_default(),
      mounted,
    }
  }

  /// The path inside the mounted tree, if `path` is at or under the prefix.
  fn mounted_path(&self, path: &str) -> Option<String> {
    if self.prefix.is_empty() {
      return Some(path.to_string());
    }
    if path == self.prefix {
      return Some(String::new());
    }
    path.strip_prefix(&format!("{}/", self.prefix)).map(str::to_string)
  }

  /// Whether `path` is a strict ancestor of the mount point.
  fn is_mount_ancestor(&self, path: &str) -> bool {
    !self.prefix.is_empty() && (path.is_empty() || self.prefix.starts_with(&format!("{}/", path)))
  }
}

impl FileSystem for MountFs {
  fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
    let path = normalize(path)?;
    match self.host.read(&path) {
      Err(e) if e.is_not_found() => match self.mounted_path(&path) {
        Some(inner) => self.mounted.read(&inner),
        None => Err(e),
      },
      other => other,
    }
  }

  fn write(&self, path: &str, contents: &[u8]) -> Result<(), FsError> {
    self.host.write(path, contents)
  }

  fn create_dir_all(&self, path: &str) -> Result<(), FsError> {
    self.host.create_dir_all(path)
  }

  fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
    let path = normalize(path)?;
    let mut listings = Vec::new();
    let mut found = false;

    match self.host.read_dir(&path) {
      Ok(entries) => {
        found = true;
        listings.push(entries);
      }
      Err(e) if !e.is_not_found() => return Err(e),
      Err(_) => {}
    }

    if let Some(inner) = self.mounted_path(&path) {
      match self.mounted.read_dir(&inner) {
        Ok(entries) => {
          found = true;
          listings.push(entries);
        }
        Err(e) if !e.is_not_found() => return Err(e),
        Err(_) => {}
      }
    } else if self.is_mount_ancestor(&path) {
      // Expose the next component of the mount point as a directory.
      let rest = if path.is_empty() { self.prefix.as_str() } else { &self.prefix[path.len() + 1..] };
      let name = rest.split('/').next().unwrap_or(rest).to_string();
      found = true;
      listings.push(vec![DirEntry { name, kind: EntryKind::Dir }]);
    }

    if !found {
      return Err(FsError::NotFound(path));
    }
    Ok(merge_listings(listings))
  }

  fn kind(&self, path: &str) -> Option<EntryKind> {
    let path = normalize(path).ok()?;
    if let Some(kind) = self.host.kind(&path) {
      return Some(kind);
    }
    if self.is_mount_ancestor(&path) {
      return Some(EntryKind::Dir);
    }
    self.mounted_path(&path).and_then(|inner| self.mounted.kind(&inner))
  }
}

/// An ordered stack of trees; lookups take the first layer that has the path.
///
/// Directories are not merged: a directory in an earlier layer hides the
/// same directory in every later layer, so a package is read whole from one
/// layer. Writes go to the first layer.
#[derive(Debug, Clone)]
pub struct Overlay {
  layers: Vec<Arc<dyn FileSystem>>,
}

impl Overlay {
  pub fn new(layers: Vec<Arc<dyn FileSystem>>) -> Self {
    Self { layers }
  }

  /// The index of the first layer containing `path`.
  pub fn layer_of(&self, path: &str) -> Option<usize> {
    self.layers.iter().position(|layer| layer.exists(path))
  }
}

impl FileSystem for Overlay {
  fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
    let path = normalize(path)?;
    for layer in &self.layers {
      match layer.read(&path) {
        Err(e) if e.is_not_found() => continue,
        other => return other,
      }
    }
    Err(FsError::NotFound(path))
  }

  fn write(&self, path: &str, contents: &[u8]) -> Result<(), FsError> {
    match self.layers.first() {
      Some(top) => top.write(path, contents),
      None => Err(FsError::InvalidPath(path.to_string())),
    }
  }

  fn create_dir_all(&self, path: &str) -> Result<(), FsError> {
    match self.layers.first() {
      Some(top) => top.create_dir_all(path),
      None => Err(FsError::InvalidPath(path.to_string())),
    }
  }

  fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
    let path = normalize(path)?;
    match self.layer_of(&path) {
      Some(idx) => self.layers[idx].read_dir(&path),
      None => Err(FsError::NotFound(path)),
    }
  }

  fn kind(&self, path: &str) -> Option<EntryKind> {
    self.layers.iter().find_map(|layer| layer.kind(path))
  }
}
