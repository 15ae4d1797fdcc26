//! Build sessions.
//!
//! A [`BuildSession`] compiles the transitive closure of some root packages
//! for one variant. It keeps every unit it produced, so a package requested
//! again in the same session is reused rather than recompiled. Packages are
//! compiled wave by wave: everything in a wave has its dependencies in
//! earlier waves, and a wave runs in parallel up to the configured limit.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::frontend::{CompileRequest, Frontend};
use crate::progress::{NoProgress, ProgressEvent, ProgressSink};
use crate::types::{Archive, ArchiveSet, Package, Variant};
use crate::vfs::FileSystem;

use super::cancel::CancelToken;
use super::dag::ImportGraph;
use super::package::load_package;
use super::types::{BuildConfig, BuildError};

/// Compiles package closures for one variant.
pub struct BuildSession {
  variant: Variant,
  frontend: Arc<dyn Frontend>,
  config: BuildConfig,
  archives: ArchiveSet,
  progress: Arc<dyn ProgressSink>,
  cancel: CancelToken,
}

impl std::fmt::Debug for BuildSession {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BuildSession")
      .field("variant", &self.variant)
      .field("config", &self.config)
      .field("archives", &self.archives.len())
      .finish()
  }
}

impl BuildSession {
  pub fn new(variant: Variant, frontend: Arc<dyn Frontend>) -> Self {
    Self {
      variant,
      frontend,
      config: BuildConfig::default(),
      archives: ArchiveSet::new(),
      progress: Arc::new(NoProgress),
      cancel: CancelToken::new(),
    }
  }

  pub fn with_config(mut self, config: BuildConfig) -> Self {
    self.config = config;
    self
  }

  pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
    self.progress = progress;
    self
  }

  pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn variant(&self) -> Variant {
    self.variant
  }

  /// Every unit compiled so far in this session.
  pub fn archives(&self) -> &ArchiveSet {
    &self.archives
  }

  pub fn get(&self, import_path: &str) -> Option<&Arc<Archive>> {
    self.archives.get(import_path)
  }

  /// Compile the closure of `roots` from `sources`.
  ///
  /// Returns the units of exactly the transitive closure of `roots`. On any
  /// error nothing is added to the session.
  pub async fn build(
    &mut self,
    sources: Arc<dyn FileSystem>,
    scratch: Arc<dyn FileSystem>,
    roots: &[String],
  ) -> Result<ArchiveSet, BuildError> {
    if self.cancel.is_cancelled() {
      return Err(BuildError::Cancelled);
    }

    let packages = {
      let known: BTreeSet<String> = self.archives.keys().cloned().collect();
      let roots = roots.to_vec();
      let ext = self.config.source_ext.clone();
      let sources = sources.clone();
      tokio::task::spawn_blocking(move || discover(sources.as_ref(), &roots, &known, &ext))
        .await
        .map_err(|e| BuildError::Worker(e.to_string()))??
    };

    let dag = ImportGraph::from_packages(packages.values().map(|p| p.as_ref()))?;
    let waves = dag.waves()?;
    info!(
      variant = %self.variant,
      packages = packages.len(),
      reused = self.archives.len(),
      waves = waves.len(),
      "building closure"
    );

    let mut built = self.archives.clone();
    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));

    for (wave_idx, wave) in waves.iter().enumerate() {
      debug!(variant = %self.variant, wave = wave_idx, packages = wave.len(), "compiling wave");
      let results = self
        .compile_wave(wave, &packages, &built, &scratch, semaphore.clone())
        .await?;
      built.extend(results);
    }

    let closure = ImportGraph::from_archives(&built).closure(roots.iter().map(String::as_str));
    let mut result = ArchiveSet::new();
    for path in closure {
      let archive = built.get(&path).ok_or_else(|| BuildError::PackageNotFound(path.clone()))?;
      result.insert(path, archive.clone());
    }

    self.archives = built;
    Ok(result)
  }

  async fn compile_wave(
    &self,
    wave: &[String],
    packages: &HashMap<String, Arc<Package>>,
    built: &ArchiveSet,
    scratch: &Arc<dyn FileSystem>,
    semaphore: Arc<Semaphore>,
  ) -> Result<Vec<(String, Arc<Archive>)>, BuildError> {
    let mut join_set = JoinSet::new();

    for import_path in wave {
      let package = packages
        .get(import_path)
        .cloned()
        .ok_or_else(|| BuildError::PackageNotFound(import_path.clone()))?;

      let dependencies = package
        .imports
        .iter()
        .map(|dep| {
          built.get(dep).cloned().ok_or_else(|| BuildError::MissingDependency {
            import_path: import_path.clone(),
            dependency: dep.clone(),
          })
        })
        .collect::<Result<Vec<_>, _>>()?;

      self.progress.report(ProgressEvent::Log(format!("compiling {}", import_path)));

      let frontend = self.frontend.clone();
      let scratch = scratch.clone();
      let semaphore = semaphore.clone();
      let variant = self.variant;

      join_set.spawn(async move {
        let _permit = semaphore
          .acquire_owned()
          .await
          .map_err(|e| BuildError::Worker(e.to_string()))?;

        let archive = tokio::task::spawn_blocking(move || {
          frontend.compile(CompileRequest {
            package: &package,
            dependencies: &dependencies,
            variant,
            scratch: scratch.as_ref(),
          })
        })
        .await
        .map_err(|e| BuildError::Worker(e.to_string()))??;

        Ok::<_, BuildError>(Arc::new(archive))
      });
    }

    let mut results = Vec::with_capacity(wave.len());
    loop {
      let next = tokio::select! {
        biased;
        _ = self.cancel.cancelled() => {
          join_set.abort_all();
          info!(variant = %self.variant, "build cancelled");
          return Err(BuildError::Cancelled);
        }
        next = join_set.join_next() => next,
      };

      match next {
        None => break,
        Some(Ok(Ok(archive))) => {
          debug!(variant = %self.variant, package = %archive.import_path, "compiled");
          results.push((archive.import_path.clone(), archive));
        }
        Some(Ok(Err(e))) => {
          join_set.abort_all();
          error!(variant = %self.variant, error = %e, "build failed");
          return Err(e);
        }
        Some(Err(e)) => {
          join_set.abort_all();
          error!(variant = %self.variant, error = %e, "compile task panicked");
          return Err(BuildError::Worker(e.to_string()));
        }
      }
    }

    Ok(results)
  }
}

/// Load every package reachable from `roots` that is not in `known`.
///
/// Known packages are not descended into: their closure was compiled with
/// them.
fn discover(
  sources: &dyn FileSystem,
  roots: &[String],
  known: &BTreeSet<String>,
  ext: &str,
) -> Result<HashMap<String, Arc<Package>>, BuildError> {
  let mut packages = HashMap::new();
  let mut visited: BTreeSet<String> = BTreeSet::new();
  let mut queue: VecDeque<String> = roots.iter().cloned().collect();

  while let Some(import_path) = queue.pop_front() {
    if known.contains(&import_path) || !visited.insert(import_path.clone()) {
      continue;
    }

    let package = load_package(sources, &import_path, ext)?;
    for import in &package.imports {
      if !visited.contains(import) && !known.contains(import) {
        queue.push_back(import.clone());
      }
    }
    packages.insert(import_path, Arc::new(package));
  }

  Ok(packages)
}

/// Units for both variants of one closure.
#[derive(Debug, Clone, Default)]
pub struct VariantArchives {
  pub optimized: ArchiveSet,
  pub full: ArchiveSet,
}

impl VariantArchives {
  pub fn get(&self, variant: Variant) -> &ArchiveSet {
    match variant {
      Variant::Optimized => &self.optimized,
      Variant::Full => &self.full,
    }
  }

  /// Import paths of the closure (identical across variants).
  pub fn import_paths(&self) -> impl Iterator<Item = &String> {
    self.full.keys()
  }

  pub fn len(&self) -> usize {
    self.full.len()
  }

  pub fn is_empty(&self) -> bool {
    self.full.is_empty()
  }
}

/// One build session per variant, run side by side over the same sources.
#[derive(Debug)]
pub struct VariantSessions {
  pub optimized: BuildSession,
  pub full: BuildSession,
}

impl VariantSessions {
  pub fn new(frontend: Arc<dyn Frontend>, config: BuildConfig) -> Self {
    Self {
      optimized: BuildSession::new(Variant::Optimized, frontend.clone()).with_config(config.clone()),
      full: BuildSession::new(Variant::Full, frontend).with_config(config),
    }
  }

  /// Report progress from the full pass only, so each package is logged once.
  pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
    self.full = self.full.with_progress(progress);
    self
  }

  pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
    self.optimized = self.optimized.with_cancel(cancel.clone());
    self.full = self.full.with_cancel(cancel);
    self
  }

  /// Build the closure of `roots` in both variants.
  ///
  /// Fails with [`BuildError::VariantMismatch`] if the passes disagree on
  /// which packages make up the closure.
  pub async fn build_variants(
    &mut self,
    sources: Arc<dyn FileSystem>,
    scratch: Arc<dyn FileSystem>,
    roots: &[String],
  ) -> Result<VariantArchives, BuildError> {
    let (optimized, full) = tokio::try_join!(
      self.optimized.build(sources.clone(), scratch.clone(), roots),
      self.full.build(sources, scratch, roots),
    )?;

    check_parity(&optimized, &full)?;
    Ok(VariantArchives { optimized, full })
  }
}

fn check_parity(optimized: &ArchiveSet, full: &ArchiveSet) -> Result<(), BuildError> {
  let only_optimized: Vec<String> = optimized.keys().filter(|k| !full.contains_key(*k)).cloned().collect();
  let only_full: Vec<String> = full.keys().filter(|k| !optimized.contains_key(*k)).cloned().collect();
  if only_optimized.is_empty() && only_full.is_empty() {
    return Ok(());
  }
  error!(?only_optimized, ?only_full, "variant builds differ");
  Err(BuildError::VariantMismatch {
    only_optimized,
    only_full,
  })
}
