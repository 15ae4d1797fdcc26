//! Delta computation between a fresh build and a client's cache.
//!
//! Given every package of a closure rendered in both variants and the hashes
//! a client already holds for the variant it tracks, decide which artifacts
//! must be sent. The client always gets a complete index; only packages whose
//! hash changed come with a payload.
//!
//! # Diff Logic
//!
//! For each package in the closure:
//! - Entry package → always sent, `unchanged = false`
//! - Manifest hash equals the fresh hash → `unchanged = true`, not sent
//! - Otherwise (different or absent) → `unchanged = false`, sent

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::render::{RenderError, RenderedSet};
use crate::types::Variant;
use crate::util::hash::ContentHash;

/// Hashes a client holds, keyed by import path, for one variant.
pub type ClientManifest = BTreeMap<String, ContentHash>;

/// What the client learns about one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
  pub hash_optimized: ContentHash,
  pub hash_full: ContentHash,
  pub unchanged: bool,
}

/// An artifact queued for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedArtifact {
  pub import_path: String,
  pub hash: ContentHash,

  /// Gzipped rendered module.
  pub contents: Vec<u8>,
}

/// The outcome of a diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
  /// One entry per package of the closure.
  pub index: BTreeMap<String, IndexEntry>,

  /// Artifacts to send, in import-path order, at most one per package.
  pub artifacts: Vec<QueuedArtifact>,
}

impl SyncPlan {
  /// Number of artifacts that will be sent.
  pub fn sent(&self) -> usize {
    self.artifacts.len()
  }

  /// Number of packages the client can reuse.
  pub fn reused(&self) -> usize {
    self.index.values().filter(|e| e.unchanged).count()
  }

  pub fn is_sent(&self, import_path: &str) -> bool {
    self.artifacts.iter().any(|a| a.import_path == import_path)
  }
}

/// Compute the index and artifacts for a client.
///
/// `variant` is the variant the client tracks; its hashes are compared and
/// its artifacts are sent. `entry` names the package that is always sent.
pub fn diff(
  rendered: &RenderedSet,
  manifest: &ClientManifest,
  variant: Variant,
  entry: &str,
) -> Result<SyncPlan, RenderError> {
  let mut plan = SyncPlan::default();
  let mut queued: BTreeSet<&str> = BTreeSet::new();

  for (import_path, package) in rendered {
    let fresh = package.get(variant);
    let unchanged = import_path != entry && manifest.get(import_path) == Some(&fresh.hash);

    plan.index.insert(
      import_path.clone(),
      IndexEntry {
        hash_optimized: package.optimized.hash.clone(),
        hash_full: package.full.hash.clone(),
        unchanged,
      },
    );

    if unchanged || !queued.insert(import_path.as_str()) {
      continue;
    }
    debug!(path = %import_path, hash = %fresh.hash.short(), "queueing artifact");
    plan.artifacts.push(QueuedArtifact {
      import_path: import_path.clone(),
      hash: fresh.hash.clone(),
      contents: fresh.compressed()?,
    });
  }

  Ok(plan)
}

/// The manifest a client holds after applying `plan`.
pub fn manifest_after(plan: &SyncPlan, variant: Variant) -> ClientManifest {
  plan
    .index
    .iter()
    .map(|(path, entry)| {
      let hash = match variant {
        Variant::Optimized => entry.hash_optimized.clone(),
        Variant::Full => entry.hash_full.clone(),
      };
      (path.clone(), hash)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::build::VariantArchives;
  use crate::render::render_all;
  use crate::types::Archive;

  fn rendered(units: &[(&str, &str, &[&str])]) -> RenderedSet {
    let mut archives = VariantArchives::default();
    for (path, payload, deps) in units {
      let unit = Arc::new(Archive {
        import_path: path.to_string(),
        payload: payload.as_bytes().to_vec(),
        dependencies: deps.iter().map(|s| s.to_string()).collect(),
      });
      archives.full.insert(path.to_string(), unit.clone());
      archives.optimized.insert(path.to_string(), unit);
    }
    render_all(&archives).unwrap()
  }

  fn closure() -> RenderedSet {
    rendered(&[
      ("main", "main()", &["fmt", "helperlib"]),
      ("helperlib", "help()", &["fmt"]),
      ("fmt", "print()", &[]),
    ])
  }

  #[test]
  fn empty_manifest_sends_everything() {
    let plan = diff(&closure(), &ClientManifest::new(), Variant::Full, "main").unwrap();

    assert_eq!(plan.index.len(), 3);
    assert_eq!(plan.sent(), 3);
    assert_eq!(plan.reused(), 0);
    assert!(plan.index.values().all(|e| !e.unchanged));
  }

  #[test]
  fn own_manifest_sends_only_entry() {
    let set = closure();
    let first = diff(&set, &ClientManifest::new(), Variant::Full, "main").unwrap();
    let manifest = manifest_after(&first, Variant::Full);

    let second = diff(&set, &manifest, Variant::Full, "main").unwrap();
    assert_eq!(second.index.len(), 3);
    assert_eq!(second.sent(), 1);
    assert!(second.is_sent("main"));
    assert!(!second.index["main"].unchanged);
    assert!(second.index["fmt"].unchanged);
    assert!(second.index["helperlib"].unchanged);
  }

  #[test]
  fn upstream_change_is_sent() {
    let before = closure();
    let manifest = manifest_after(&diff(&before, &ClientManifest::new(), Variant::Full, "main").unwrap(), Variant::Full);

    let after = rendered(&[
      ("main", "main()", &["fmt", "helperlib"]),
      ("helperlib", "help(2)", &["fmt"]),
      ("fmt", "print()", &[]),
    ]);
    let plan = diff(&after, &manifest, Variant::Full, "main").unwrap();

    assert!(plan.is_sent("helperlib"));
    assert!(plan.is_sent("main"));
    assert!(!plan.is_sent("fmt"));
    assert_eq!(plan.reused(), 1);
  }

  #[test]
  fn compares_tracked_variant_only() {
    let set = closure();
    let full_manifest = manifest_after(&diff(&set, &ClientManifest::new(), Variant::Full, "main").unwrap(), Variant::Full);

    // Full hashes mean nothing to an optimized client.
    let plan = diff(&set, &full_manifest, Variant::Optimized, "main").unwrap();
    assert_eq!(plan.sent(), 3);
    assert_eq!(plan.artifacts[0].hash, set[&plan.artifacts[0].import_path].optimized.hash);
  }

  #[test]
  fn index_carries_both_hashes() {
    let set = closure();
    let plan = diff(&set, &ClientManifest::new(), Variant::Full, "main").unwrap();
    let entry = &plan.index["fmt"];
    assert_eq!(entry.hash_full, set["fmt"].full.hash);
    assert_eq!(entry.hash_optimized, set["fmt"].optimized.hash);
  }

  #[test]
  fn index_entry_json_shape() {
    let entry = IndexEntry {
      hash_optimized: "aa".into(),
      hash_full: "bb".into(),
      unchanged: true,
    };
    assert_eq!(
      serde_json::to_value(&entry).unwrap(),
      serde_json::json!({"hash_optimized": "aa", "hash_full": "bb", "unchanged": true})
    );
  }
}
