//! Universe record and lookup table.
//!
//! The universe record lists both hashes of every published package and is
//! uploaded next to the artifacts. The lookup table carries the same hashes
//! in the shape clients resolve storage keys from, and is written to a local
//! file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::util::hash::ContentHash;

use super::PublishError;

/// Both hashes of one published package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseEntry {
  pub hash_optimized: ContentHash,
  pub hash_full: ContentHash,
}

/// Every published package, keyed by import path.
pub type UniverseRecord = BTreeMap<String, UniverseEntry>;

/// Lookup table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
  pub hash_min: ContentHash,
  pub hash_max: ContentHash,
}

/// Import path to published hashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LookupTable(pub BTreeMap<String, TableEntry>);

impl From<&UniverseRecord> for LookupTable {
  fn from(record: &UniverseRecord) -> Self {
    LookupTable(
      record
        .iter()
        .map(|(path, entry)| {
          (
            path.clone(),
            TableEntry {
              hash_min: entry.hash_optimized.clone(),
              hash_max: entry.hash_full.clone(),
            },
          )
        })
        .collect(),
    )
  }
}

impl LookupTable {
  pub fn get(&self, import_path: &str) -> Option<&TableEntry> {
    self.0.get(import_path)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Load a table written by [`LookupTable::save`].
  pub fn load(path: &Path) -> Result<Self, PublishError> {
    let content = fs::read_to_string(path).map_err(|e| PublishError::Table {
      path: path.to_path_buf(),
      source: e,
    })?;
    Ok(serde_json::from_str(&content)?)
  }

  /// Write the table as pretty JSON.
  ///
  /// Uses atomic write (write to temp, then rename) so readers never see a
  /// partial table.
  pub fn save(&self, path: &Path) -> Result<(), PublishError> {
    let table_error = |e: std::io::Error| PublishError::Table {
      path: path.to_path_buf(),
      source: e,
    };

    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent).map_err(table_error)?;
    }

    let content = serde_json::to_string_pretty(self)?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, content).map_err(table_error)?;
    fs::rename(&temp_path, path).map_err(table_error)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  fn record() -> UniverseRecord {
    UniverseRecord::from([(
      "fmt".to_string(),
      UniverseEntry {
        hash_optimized: "min".into(),
        hash_full: "max".into(),
      },
    )])
  }

  #[test]
  fn table_json_shape() {
    let table = LookupTable::from(&record());
    assert_eq!(
      serde_json::to_value(&table).unwrap(),
      serde_json::json!({"fmt": {"hash_min": "min", "hash_max": "max"}})
    );
  }

  #[test]
  fn save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out").join("table.json");
    let table = LookupTable::from(&record());

    table.save(&path).unwrap();
    assert_eq!(LookupTable::load(&path).unwrap(), table);
    assert!(!dir.path().join("out").join("table.json.tmp").exists());
  }

  #[test]
  fn load_missing_fails() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
      LookupTable::load(&dir.path().join("nope.json")),
      Err(PublishError::Table { .. })
    ));
  }
}
