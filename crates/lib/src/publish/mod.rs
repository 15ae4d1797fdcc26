//! Batch publishing.
//!
//! Precompiles a whole package universe once and uploads every package in
//! both variants to durable storage, so clients can load library packages
//! straight from the bucket.
//!
//! # Steps
//!
//! 1. Build every package of the universe in both variants, reusing one
//!    session map per variant across all roots.
//! 2. Render and hash every (package, variant).
//! 3. Upload each artifact under `sys/<import path>.<hash>[.min].js`.
//! 4. Upload the universe record, then write the lookup table.
//!
//! Any failure stops the publish before the lookup table is written. Uploads
//! already made stay in place; they are content-addressed and get rewritten
//! identically by the next run.

mod table;
mod universe;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::build::{BuildConfig, BuildError, VariantArchives, VariantSessions};
use crate::consts::{MODULE_CONTENT_TYPE, STORAGE_PREFIX, UNIVERSE_RECORD_NAME};
use crate::frontend::Frontend;
use crate::render::{RenderError, render_all};
use crate::storage::{ObjectStore, StorageError};
use crate::types::Variant;
use crate::util::hash::ContentHash;
use crate::vfs::{FileSystem, FsError, Workspace};

pub use table::{LookupTable, TableEntry, UniverseEntry, UniverseRecord};
pub use universe::{DEFAULT_EXCLUDES, enumerate_universe};

/// Content type of the uploaded universe record.
const RECORD_CONTENT_TYPE: &str = "application/json";

/// Errors that fail a publish.
#[derive(Debug, Error)]
pub enum PublishError {
  #[error(transparent)]
  Build(#[from] BuildError),

  #[error(transparent)]
  Render(#[from] RenderError),

  #[error(transparent)]
  Storage(#[from] StorageError),

  #[error("filesystem error: {0}")]
  Fs(#[from] FsError),

  #[error("failed to write lookup table {path}: {source}")]
  Table {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to serialize: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("internal error: upload worker failed: {0}")]
  Worker(String),
}

/// Summary of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
  /// Packages published.
  pub packages: usize,

  /// Objects uploaded, artifacts and universe record included.
  pub uploaded: usize,

  pub table_path: PathBuf,
}

/// Storage key of one artifact.
pub fn storage_key(import_path: &str, hash: &ContentHash, variant: Variant) -> String {
  format!("{}/{}.{}{}.js", STORAGE_PREFIX, import_path, hash, variant.key_suffix())
}

/// Storage key of the universe record.
pub fn record_key() -> String {
  format!("{}/{}", STORAGE_PREFIX, UNIVERSE_RECORD_NAME)
}

/// Publishes package universes to an object store.
pub struct Publisher<S> {
  store: Arc<S>,
  frontend: Arc<dyn Frontend>,
  config: BuildConfig,
  table_path: PathBuf,
}

impl<S: ObjectStore + 'static> Publisher<S> {
  pub fn new(store: Arc<S>, frontend: Arc<dyn Frontend>, table_path: impl Into<PathBuf>) -> Self {
    Self {
      store,
      frontend,
      config: BuildConfig::default(),
      table_path: table_path.into(),
    }
  }

  pub fn with_config(mut self, config: BuildConfig) -> Self {
    self.config = config;
    self
  }

  /// Build, upload and index every package in `universe`.
  pub async fn publish_all(&self, workspace: &Workspace, universe: &[String]) -> Result<PublishReport, PublishError> {
    info!(packages = universe.len(), "publishing universe");

    let archives = self.build_universe(workspace, universe).await?;
    let rendered = render_all(&archives)?;

    let mut uploads = Vec::with_capacity(rendered.len() * 2);
    let mut record = UniverseRecord::new();
    for (import_path, package) in &rendered {
      for variant in Variant::ALL {
        let artifact = package.get(variant);
        uploads.push((storage_key(import_path, &artifact.hash, variant), artifact.bytes.clone()));
      }
      record.insert(
        import_path.clone(),
        UniverseEntry {
          hash_optimized: package.optimized.hash.clone(),
          hash_full: package.full.hash.clone(),
        },
      );
    }

    let mut uploaded = self.upload_all(uploads).await?;

    let record_bytes = serde_json::to_vec_pretty(&record)?;
    self.store.put(&record_key(), record_bytes, RECORD_CONTENT_TYPE).await?;
    uploaded += 1;

    LookupTable::from(&record).save(&self.table_path)?;
    info!(
      packages = record.len(),
      uploaded,
      table = %self.table_path.display(),
      "publish complete"
    );

    Ok(PublishReport {
      packages: record.len(),
      uploaded,
      table_path: self.table_path.clone(),
    })
  }

  /// Publish every package of the workspace's root tree, minus `exclude`.
  pub async fn publish_root(&self, workspace: &Workspace, exclude: &[String]) -> Result<PublishReport, PublishError> {
    let universe = enumerate_universe(workspace.root.as_ref(), &self.config.source_ext, exclude)?;
    self.publish_all(workspace, &universe).await
  }

  async fn build_universe(&self, workspace: &Workspace, universe: &[String]) -> Result<VariantArchives, PublishError> {
    let mut sessions = VariantSessions::new(self.frontend.clone(), self.config.clone());
    let sources: Arc<dyn FileSystem> = Arc::new(workspace.sources());

    for import_path in universe {
      info!(path = %import_path, "compiling");
      sessions
        .build_variants(sources.clone(), workspace.temporary.clone(), std::slice::from_ref(import_path))
        .await?;
    }

    Ok(VariantArchives {
      optimized: sessions.optimized.archives().clone(),
      full: sessions.full.archives().clone(),
    })
  }

  async fn upload_all(&self, uploads: Vec<(String, Vec<u8>)>) -> Result<usize, PublishError> {
    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
    let mut join_set = JoinSet::new();

    for (key, bytes) in uploads {
      let store = self.store.clone();
      let semaphore = semaphore.clone();
      join_set.spawn(async move {
        let _permit = semaphore
          .acquire_owned()
          .await
          .map_err(|e| PublishError::Worker(e.to_string()))?;
        info!(key = %key, "storing");
        store.put(&key, bytes, MODULE_CONTENT_TYPE).await?;
        Ok::<_, PublishError>(())
      });
    }

    let mut uploaded = 0;
    while let Some(result) = join_set.join_next().await {
      match result {
        Ok(Ok(())) => uploaded += 1,
        Ok(Err(e)) => {
          join_set.abort_all();
          error!(error = %e, "upload failed");
          return Err(e);
        }
        Err(e) => {
          join_set.abort_all();
          return Err(PublishError::Worker(e.to_string()));
        }
      }
    }

    Ok(uploaded)
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;
  use crate::frontend::BundleFrontend;
  use crate::storage::{DirStore, MemStore};
  use crate::util::testutil::{library, tree};

  fn universe(paths: &[&str]) -> Vec<String> {
    paths.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn keys_mark_optimized_variant() {
    let hash = ContentHash::from("abc");
    assert_eq!(storage_key("fmt", &hash, Variant::Full), "sys/fmt.abc.js");
    assert_eq!(storage_key("net/http", &hash, Variant::Optimized), "sys/net/http.abc.min.js");
    assert_eq!(record_key(), "sys/index.json");
  }

  #[tokio::test]
  async fn publishes_every_package_in_both_variants() {
    let dir = TempDir::new().unwrap();
    let table_path = dir.path().join("table.json");
    let store = Arc::new(MemStore::new());
    let publisher = Publisher::new(store.clone(), Arc::new(BundleFrontend), &table_path);

    let workspace = Workspace::new(library());
    let report = publisher
      .publish_all(&workspace, &universe(&["fmt", "helperlib", "io", "os"]))
      .await
      .unwrap();

    assert_eq!(report.packages, 4);
    assert_eq!(report.uploaded, 9);
    assert_eq!(store.keys().len(), 9);

    let table = LookupTable::load(&table_path).unwrap();
    let fmt = table.get("fmt").unwrap();
    let object = store.get(&storage_key("fmt", &fmt.hash_max, Variant::Full)).unwrap();
    assert_eq!(object.content_type, "application/javascript");
    assert_eq!(crate::util::hash::hash_bytes(&object.bytes), fmt.hash_max);
    assert!(store.get(&storage_key("fmt", &fmt.hash_min, Variant::Optimized)).is_some());

    let record: UniverseRecord = serde_json::from_slice(&store.get("sys/index.json").unwrap().bytes).unwrap();
    assert_eq!(record["fmt"].hash_full, fmt.hash_max);
  }

  #[tokio::test]
  async fn universe_includes_transitive_dependencies() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemStore::new());
    let publisher = Publisher::new(store, Arc::new(BundleFrontend), dir.path().join("t.json"));

    let report = publisher
      .publish_all(&Workspace::new(library()), &universe(&["helperlib"]))
      .await
      .unwrap();
    assert_eq!(report.packages, 3);
  }

  #[tokio::test]
  async fn publishing_twice_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let bucket = DirStore::new(dir.path().join("bucket"));
    let table_path = dir.path().join("table.json");
    let publisher = Publisher::new(Arc::new(bucket), Arc::new(BundleFrontend), &table_path);
    let workspace = Workspace::new(library());

    publisher.publish_all(&workspace, &universe(&["fmt"])).await.unwrap();
    let first = std::fs::read(&table_path).unwrap();
    publisher.publish_all(&workspace, &universe(&["fmt"])).await.unwrap();
    assert_eq!(std::fs::read(&table_path).unwrap(), first);
  }

  #[tokio::test]
  async fn publish_root_skips_excluded_packages() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemStore::new());
    let publisher = Publisher::new(store, Arc::new(BundleFrontend), dir.path().join("t.json"));

    let report = publisher
      .publish_root(&Workspace::new(library()), &["os".to_string()])
      .await
      .unwrap();
    assert_eq!(report.packages, 3);
    assert!(LookupTable::load(&report.table_path).unwrap().get("os").is_none());
  }

  #[tokio::test]
  async fn compile_failure_writes_no_table() {
    let dir = TempDir::new().unwrap();
    let table_path = dir.path().join("table.json");
    let store = Arc::new(MemStore::new());
    let publisher = Publisher::new(store.clone(), Arc::new(BundleFrontend), &table_path);
    let workspace = Workspace::new(tree(&[
      ("good", "good.go", "package good\n"),
      ("bad", "bad.go", "not go at all\n"),
    ]));

    let err = publisher
      .publish_all(&workspace, &universe(&["good", "bad"]))
      .await
      .unwrap_err();

    assert!(matches!(err, PublishError::Build(BuildError::Compile(_))));
    assert!(!table_path.exists());
    assert!(store.keys().is_empty());
  }

  #[tokio::test]
  async fn storage_failure_writes_no_table() {
    let dir = TempDir::new().unwrap();
    let table_path = dir.path().join("table.json");
    let store = Arc::new(MemStore::failing_on("helperlib"));
    let publisher = Publisher::new(store, Arc::new(BundleFrontend), &table_path);

    let err = publisher
      .publish_all(&Workspace::new(library()), &universe(&["helperlib"]))
      .await
      .unwrap_err();

    assert!(matches!(err, PublishError::Storage(_)));
    assert!(!table_path.exists());
  }
}
