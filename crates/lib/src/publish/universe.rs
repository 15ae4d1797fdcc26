//! Package universe enumeration.

use std::collections::BTreeSet;

use tracing::debug;

use crate::build::package::has_sources;
use crate::consts::SRC_DIR;
use crate::vfs::{FileSystem, FsError, join};

/// Packages that never build for the target environment.
pub const DEFAULT_EXCLUDES: &[&str] = &["builtin", "internal/cpu", "net/http/pprof", "plugin", "runtime/cgo"];

/// Directory names that never hold packages of the universe.
const SKIPPED_DIRS: &[&str] = &["testdata", "vendor"];

fn skip_dir(name: &str) -> bool {
  SKIPPED_DIRS.contains(&name) || name.starts_with('.') || name.starts_with('_')
}

/// List every buildable package under `src/` in `fs`, sorted.
///
/// Directories without source files are walked but not listed. Paths in
/// `exclude` are dropped (exact match).
pub fn enumerate_universe(fs: &dyn FileSystem, ext: &str, exclude: &[String]) -> Result<Vec<String>, FsError> {
  let exclude: BTreeSet<&str> = exclude.iter().map(String::as_str).collect();
  let mut packages = Vec::new();

  if !fs.is_dir(SRC_DIR) {
    return Ok(packages);
  }

  let mut pending = vec![String::new()];
  while let Some(import_path) = pending.pop() {
    if !import_path.is_empty() {
      if exclude.contains(import_path.as_str()) {
        debug!(path = %import_path, "excluded from universe");
      } else if has_sources(fs, &import_path, ext) {
        packages.push(import_path.clone());
      }
    }

    for entry in fs.read_dir(&join(SRC_DIR, &import_path))? {
      if entry.is_dir() && !skip_dir(&entry.name) {
        pending.push(join(&import_path, &entry.name));
      }
    }
  }

  packages.sort();
  Ok(packages)
}
