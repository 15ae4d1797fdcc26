//! Implementation of the `playbuild publish` command.
//!
//! Precompiles library packages in both variants, uploads them under their
//! content hashes, and writes the lookup table clients resolve them with.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use playbuild_lib::config::Config;
use playbuild_lib::consts::SRC_DIR;
use playbuild_lib::frontend::BundleFrontend;
use playbuild_lib::publish::{PublishError, PublishReport, Publisher};
use playbuild_lib::storage::{DirStore, HttpStore, ObjectStore};
use playbuild_lib::vfs::{MemFs, Workspace};

use crate::output::{OutputFormat, format_duration, print_json, print_stat, print_success};

/// Where published artifacts go.
pub enum PublishTarget {
  /// A local directory laid out like the bucket.
  Dir(PathBuf),
  /// A bucket accepting `PUT <base>/<key>`.
  Bucket(String),
}

pub fn cmd_publish(
  config: &Config,
  packages: &[String],
  target: PublishTarget,
  table: &Path,
  output: OutputFormat,
) -> Result<()> {
  // Both variant passes read every package.
  let root = MemFs::new();
  let src = config.root.join(SRC_DIR);
  let files = root
    .copy_from_dir(&src, SRC_DIR)
    .with_context(|| format!("Failed to load library sources: {}", src.display()))?;
  info!(files, root = %config.root.display(), "loaded library sources");
  let workspace = Workspace::new(Arc::new(root));
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let start = Instant::now();

  let report = match &target {
    PublishTarget::Dir(dir) => {
      let publisher = Publisher::new(Arc::new(DirStore::new(dir)), Arc::new(BundleFrontend), table);
      rt.block_on(publish(publisher, &workspace, packages, config))
    }
    PublishTarget::Bucket(url) => {
      let publisher = Publisher::new(Arc::new(HttpStore::new(url)), Arc::new(BundleFrontend), table);
      rt.block_on(publish(publisher, &workspace, packages, config))
    }
  }
  .context("Publish failed")?;
  let elapsed = start.elapsed();

  if output.is_json() {
    print_json(&serde_json::json!({
      "packages": report.packages,
      "uploaded": report.uploaded,
      "table": report.table_path,
      "elapsed_ms": elapsed.as_millis(),
    }))?;
  } else {
    print_success(&format!("Published {} package(s)", report.packages));
    print_stat("Uploaded", &report.uploaded.to_string());
    print_stat("Table", &report.table_path.display().to_string());
    print_stat("Time", &format_duration(elapsed));
  }

  Ok(())
}

async fn publish<S: ObjectStore + 'static>(
  publisher: Publisher<S>,
  workspace: &Workspace,
  packages: &[String],
  config: &Config,
) -> Result<PublishReport, PublishError> {
  let publisher = publisher.with_config(config.build_config());
  if packages.is_empty() {
    publisher.publish_root(workspace, &config.exclude).await
  } else {
    publisher.publish_all(workspace, packages).await
  }
}
