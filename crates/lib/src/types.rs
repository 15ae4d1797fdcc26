//! Core data model shared by the build, render, sync and publish stages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The two rendering modes every package is built in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
  /// Size-reduced output.
  Optimized,
  /// Fully-named, debuggable output.
  #[default]
  Full,
}

impl Variant {
  pub const ALL: [Variant; 2] = [Variant::Optimized, Variant::Full];

  pub fn as_str(self) -> &'static str {
    match self {
      Variant::Optimized => "optimized",
      Variant::Full => "full",
    }
  }

  /// Suffix appended to storage keys (`.min` for optimized output).
  pub fn key_suffix(self) -> &'static str {
    match self {
      Variant::Optimized => ".min",
      Variant::Full => "",
    }
  }
}

impl std::fmt::Display for Variant {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for Variant {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "optimized" | "min" => Ok(Variant::Optimized),
      "full" | "max" => Ok(Variant::Full),
      other => Err(format!("unknown variant '{}'", other)),
    }
  }
}

/// A package as read from a source tree.
///
/// Immutable once handed to a build session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
  pub import_path: String,

  /// Source files by filename.
  pub files: BTreeMap<String, Vec<u8>>,

  /// Directly imported paths, in first-seen order, without duplicates.
  pub imports: Vec<String>,
}

/// A compiled unit: the front end's output for one package.
///
/// Never mutated after creation; sessions share it as `Arc<Archive>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
  pub import_path: String,

  /// Lowered representation; opaque to everything except the renderer.
  pub payload: Vec<u8>,

  /// Import paths this unit was built against, in import order.
  pub dependencies: Vec<String>,
}

/// Compiled units for a whole closure, keyed by import path.
pub type ArchiveSet = BTreeMap<String, std::sync::Arc<Archive>>;
