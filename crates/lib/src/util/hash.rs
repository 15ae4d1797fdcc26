//! Hashing utilities for content-addressed artifacts.
//!
//! This module provides:
//! - `ContentHash`: a full 64-character SHA-256 hash of rendered bytes
//! - `hash_bytes()`: arbitrary byte hashing
//! - `hash_source_tree()`: deterministic hashing of a package's file map

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A full 64-character SHA-256 hash.
///
/// Artifacts are keyed by this hash everywhere: in the client manifest, in
/// the sync index, in storage keys and in the published lookup table.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// Shortened form for logs and human output.
  pub fn short(&self) -> &str {
    let len = self.0.len().min(crate::consts::SHORT_HASH_LEN);
    &self.0[..len]
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for ContentHash {
  fn from(value: &str) -> Self {
    ContentHash(value.to_string())
  }
}

/// Hash arbitrary bytes.
///
/// Returns the full 64-character SHA-256 hash.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}

/// Compute a deterministic hash of a package's files.
///
/// Entries are hashed in filename order as `F:<name>:<content hash>` lines,
/// so renaming a file changes the hash even if its content does not.
pub fn hash_source_tree(files: &BTreeMap<String, Vec<u8>>) -> ContentHash {
  let mut hasher = Sha256::new();
  for (name, content) in files {
    let entry = format!("F:{}:{}", name, hash_bytes(content).0);
    hasher.update(entry.as_bytes());
    hasher.update(b"\n");
  }
  ContentHash(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tree(entries: &[(&str, &str)]) -> BTreeMap<String, Vec<u8>> {
    entries
      .iter()
      .map(|(name, content)| (name.to_string(), content.as_bytes().to_vec()))
      .collect()
  }

  #[test]
  fn hash_bytes_is_full_length_hex() {
    let hash = hash_bytes(b"hello world");
    assert_eq!(hash.0.len(), 64);
    assert!(hash.0.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
  }

  #[test]
  fn hash_bytes_known_value() {
    assert_eq!(
      hash_bytes(b"").0,
      "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
  }

  #[test]
  fn hash_is_deterministic() {
    assert_eq!(hash_bytes(b"content"), hash_bytes(b"content"));
    let files = tree(&[("a.go", "package a"), ("b.go", "package a")]);
    assert_eq!(hash_source_tree(&files), hash_source_tree(&files.clone()));
  }

  #[test]
  fn tree_hash_changes_with_content() {
    let before = tree(&[("a.go", "package a")]);
    let after = tree(&[("a.go", "package a // edited")]);
    assert_ne!(hash_source_tree(&before), hash_source_tree(&after));
  }

  #[test]
  fn same_content_different_name_different_hash() {
    let one = tree(&[("a.go", "package a")]);
    let two = tree(&[("b.go", "package a")]);
    assert_ne!(hash_source_tree(&one), hash_source_tree(&two));
  }

  #[test]
  fn short_truncates() {
    let hash = hash_bytes(b"x");
    assert_eq!(hash.short().len(), 12);
    assert_eq!(ContentHash("abc".into()).short(), "abc");
  }
}
