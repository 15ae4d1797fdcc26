//! Loading packages from a source tree.

use std::collections::BTreeMap;

use crate::types::Package;
use crate::vfs::{FileSystem, join, normalize, package_dir};

use super::imports::merge_imports;
use super::types::BuildError;

/// Whether `name` is a buildable source file for extension `ext`.
pub fn is_source_file(name: &str, ext: &str) -> bool {
  let Some(stem) = name.strip_suffix(ext).and_then(|s| s.strip_suffix('.')) else {
    return false;
  };
  !stem.is_empty() && !stem.ends_with("_test") && !name.starts_with('.') && !name.starts_with('_')
}

/// Whether the directory for `import_path` holds at least one source file.
pub fn has_sources(fs: &dyn FileSystem, import_path: &str, ext: &str) -> bool {
  fs.read_dir(&package_dir(import_path))
    .map(|entries| entries.iter().any(|e| !e.is_dir() && is_source_file(&e.name, ext)))
    .unwrap_or(false)
}

/// Read a package's source files and direct imports.
pub fn load_package(fs: &dyn FileSystem, import_path: &str, ext: &str) -> Result<Package, BuildError> {
  if normalize(import_path).map(|p| p != import_path).unwrap_or(true) || import_path.is_empty() {
    return Err(BuildError::InvalidImportPath(import_path.to_string()));
  }

  let dir = package_dir(import_path);
  let entries = fs.read_dir(&dir).map_err(|e| {
    if e.is_not_found() {
      BuildError::PackageNotFound(import_path.to_string())
    } else {
      BuildError::Fs(e)
    }
  })?;

  let mut files = BTreeMap::new();
  for entry in entries {
    if entry.is_dir() || !is_source_file(&entry.name, ext) {
      continue;
    }
    let contents = fs.read(&join(&dir, &entry.name))?;
    files.insert(entry.name, contents);
  }

  if files.is_empty() {
    return Err(BuildError::NoSourceFiles(import_path.to_string()));
  }

  let imports = merge_imports(files.values().map(|bytes| std::str::from_utf8(bytes).unwrap_or_default()));

  Ok(Package {
    import_path: import_path.to_string(),
    files,
    imports,
  })
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::vfs::{MemFs, Workspace};

  #[test]
  fn source_file_filter() {
    assert!(is_source_file("print.go", "go"));
    assert!(!is_source_file("print_test.go", "go"));
    assert!(!is_source_file(".hidden.go", "go"));
    assert!(!is_source_file("_skip.go", "go"));
    assert!(!is_source_file("README.md", "go"));
    assert!(!is_source_file(".go", "go"));
    assert!(!is_source_file("notgo", "go"));
  }

  #[test]
  fn loads_files_and_imports() {
    let fs = MemFs::new();
    fs.write("src/app/a.go", b"package app\nimport \"fmt\"\n").unwrap();
    fs.write("src/app/b.go", b"package app\nimport (\"os\"\n\"fmt\")\n").unwrap();
    fs.write("src/app/a_test.go", b"package app\nimport \"testing\"\n").unwrap();
    fs.write("src/app/sub/c.go", b"package sub\n").unwrap();

    let pkg = load_package(&fs, "app", "go").unwrap();
    assert_eq!(pkg.files.keys().collect::<Vec<_>>(), vec!["a.go", "b.go"]);
    assert_eq!(pkg.imports, vec!["fmt", "os"]);
  }

  #[test]
  fn path_package_replaces_root_package() {
    let root = MemFs::new();
    root.write("src/fmt/print.go", b"package fmt\nimport \"io\"\n").unwrap();
    let ws = Workspace::new(Arc::new(root));
    ws.add_package("fmt", [("mine.go", b"package fmt\n".as_slice())]).unwrap();

    let pkg = load_package(&ws.sources(), "fmt", "go").unwrap();
    assert_eq!(pkg.files.keys().collect::<Vec<_>>(), vec!["mine.go"]);
    assert!(pkg.imports.is_empty());
  }

  #[test]
  fn missing_package() {
    let fs = MemFs::new();
    assert!(matches!(
      load_package(&fs, "nowhere", "go"),
      Err(BuildError::PackageNotFound(p)) if p == "nowhere"
    ));
  }

  #[test]
  fn directory_without_sources() {
    let fs = MemFs::new();
    fs.write("src/docs/README.md", b"hi").unwrap();
    assert!(matches!(load_package(&fs, "docs", "go"), Err(BuildError::NoSourceFiles(_))));
    assert!(!has_sources(&fs, "docs", "go"));
  }

  #[test]
  fn rejects_non_canonical_paths() {
    let fs = MemFs::new();
    assert!(matches!(load_package(&fs, "../etc", "go"), Err(BuildError::InvalidImportPath(_))));
    assert!(matches!(load_package(&fs, "/abs", "go"), Err(BuildError::InvalidImportPath(_))));
    assert!(matches!(load_package(&fs, "", "go"), Err(BuildError::InvalidImportPath(_))));
  }
}
