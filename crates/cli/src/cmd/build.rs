//! Implementation of the `playbuild build` command.
//!
//! Builds packages from the library root in both variants and prints the
//! content hash of each rendered module, without uploading anything.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use playbuild_lib::build::VariantSessions;
use playbuild_lib::config::Config;
use playbuild_lib::frontend::BundleFrontend;
use playbuild_lib::progress::TracingProgress;
use playbuild_lib::render::render_all;
use playbuild_lib::vfs::{FileSystem, OsFs, Workspace};

use crate::output::{OutputFormat, format_duration, format_rendered, print_json, print_stat, print_success, symbols};

pub fn cmd_build(config: &Config, packages: &[String], verbose: bool, output: OutputFormat) -> Result<()> {
  let workspace = Workspace::new(Arc::new(OsFs::new(&config.root)));
  let sources: Arc<dyn FileSystem> = Arc::new(workspace.sources());
  let mut sessions = VariantSessions::new(Arc::new(BundleFrontend), config.build_config());
  if verbose {
    sessions = sessions.with_progress(Arc::new(TracingProgress));
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let start = Instant::now();
  let archives = rt
    .block_on(sessions.build_variants(sources, workspace.temporary.clone(), packages))
    .context("Build failed")?;
  let rendered = render_all(&archives).context("Failed to render modules")?;
  let elapsed = start.elapsed();

  if output.is_json() {
    let items: serde_json::Map<String, serde_json::Value> = rendered
      .iter()
      .map(|(path, package)| {
        (
          path.clone(),
          serde_json::json!({
            "hash_optimized": package.optimized.hash,
            "hash_full": package.full.hash,
            "size_full": package.full.bytes.len(),
          }),
        )
      })
      .collect();
    print_json(&items)?;
    return Ok(());
  }

  print_success(&format!("Built {} package(s)", rendered.len()));
  for (path, package) in &rendered {
    println!("  {} {}", symbols::INFO, format_rendered(path, package));
  }
  print_stat("Time", &format_duration(elapsed));

  Ok(())
}
