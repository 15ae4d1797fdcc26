//! Dependency fetching.
//!
//! Makes every package a program imports available in the workspace's path
//! tree before the build starts. Packages already present in the path tree or
//! the root tree are used as they are; anything else is retrieved from a
//! [`PackageHost`] and written into the path tree, then its own imports are
//! resolved the same way.
//!
//! # Policy
//!
//! An import path whose first element contains a `.` (`github.com/x/y`) is
//! remote. Remote paths are only fetched from allow-listed hosts; a local
//! path missing from every tree can never be fetched.

mod http;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info};

use crate::build::imports::merge_imports;
use crate::build::package::{has_sources, is_source_file};
use crate::consts::SOURCE_EXT;
use crate::progress::{NoProgress, ProgressEvent, ProgressSink};
use crate::vfs::{FileSystem, FsError, Workspace, join, package_dir};

pub use http::HttpHost;

/// Files of one package directory, by filename.
pub type SourceTree = BTreeMap<String, Vec<u8>>;

/// Errors raised while fetching.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error("{import_path}: package host unreachable: {cause}")]
  Unreachable { import_path: String, cause: String },

  #[error("cannot find package \"{import_path}\"")]
  NotFound { import_path: String },

  #[error("{import_path}: host {host} is not allowed")]
  PolicyDenied { import_path: String, host: String },

  #[error("{import_path}: invalid package archive: {cause}")]
  InvalidArchive { import_path: String, cause: String },

  #[error("filesystem error: {0}")]
  Fs(#[from] FsError),
}

impl FetchError {
  /// The import path the failure is about, if any.
  pub fn import_path(&self) -> Option<&str> {
    match self {
      FetchError::Unreachable { import_path, .. }
      | FetchError::NotFound { import_path }
      | FetchError::PolicyDenied { import_path, .. }
      | FetchError::InvalidArchive { import_path, .. } => Some(import_path),
      FetchError::Fs(_) => None,
    }
  }

  pub fn not_found(import_path: &str) -> Self {
    FetchError::NotFound {
      import_path: import_path.to_string(),
    }
  }
}

/// A remote source of packages.
pub trait PackageHost: Send + Sync {
  /// Retrieve the files of one package directory.
  fn fetch(&self, import_path: &str) -> impl Future<Output = Result<SourceTree, FetchError>> + Send;
}

/// Which import paths may be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
  pub allowed_hosts: Vec<String>,
}

impl Default for FetchPolicy {
  fn default() -> Self {
    Self {
      allowed_hosts: vec!["github.com".to_string()],
    }
  }
}

impl FetchPolicy {
  pub fn new(allowed_hosts: impl IntoIterator<Item = impl Into<String>>) -> Self {
    Self {
      allowed_hosts: allowed_hosts.into_iter().map(Into::into).collect(),
    }
  }

  /// The host element of a remote import path.
  pub fn host_of(import_path: &str) -> Option<&str> {
    let first = import_path.split('/').next()?;
    first.contains('.').then_some(first)
  }

  /// Check that `import_path` may be fetched.
  pub fn check(&self, import_path: &str) -> Result<(), FetchError> {
    let Some(host) = Self::host_of(import_path) else {
      return Err(FetchError::not_found(import_path));
    };
    if self.allowed_hosts.iter().any(|h| h == host) {
      Ok(())
    } else {
      Err(FetchError::PolicyDenied {
        import_path: import_path.to_string(),
        host: host.to_string(),
      })
    }
  }
}

/// A host serving packages from memory.
#[derive(Debug, Default)]
pub struct MemHost {
  packages: HashMap<String, SourceTree>,
  requests: Mutex<Vec<String>>,
}

impl MemHost {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_package<'a>(mut self, import_path: &str, files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
    let tree = files
      .into_iter()
      .map(|(name, source)| (name.to_string(), source.as_bytes().to_vec()))
      .collect();
    self.packages.insert(import_path.to_string(), tree);
    self
  }

  /// Import paths requested so far, in request order.
  pub fn requests(&self) -> Vec<String> {
    self.requests.lock().map(|r| r.clone()).unwrap_or_default()
  }
}

impl PackageHost for MemHost {
  async fn fetch(&self, import_path: &str) -> Result<SourceTree, FetchError> {
    if let Ok(mut requests) = self.requests.lock() {
      requests.push(import_path.to_string());
    }
    self
      .packages
      .get(import_path)
      .cloned()
      .ok_or_else(|| FetchError::not_found(import_path))
  }
}

impl<H: PackageHost> PackageHost for Arc<H> {
  fn fetch(&self, import_path: &str) -> impl Future<Output = Result<SourceTree, FetchError>> + Send {
    self.as_ref().fetch(import_path)
  }
}

/// Resolves imports into a workspace's path tree.
///
/// Each import path is considered at most once per resolver, so resolving is
/// idempotent and import cycles terminate.
pub struct Resolver<H> {
  host: H,
  policy: FetchPolicy,
  workspace: Workspace,
  progress: Arc<dyn ProgressSink>,
  source_ext: String,
  seen: HashSet<String>,
}

impl<H: PackageHost> Resolver<H> {
  pub fn new(host: H, policy: FetchPolicy, workspace: Workspace) -> Self {
    Self {
      host,
      policy,
      workspace,
      progress: Arc::new(NoProgress),
      source_ext: SOURCE_EXT.to_string(),
      seen: HashSet::new(),
    }
  }

  pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
    self.progress = progress;
    self
  }

  /// Import paths considered so far.
  pub fn seen(&self) -> &HashSet<String> {
    &self.seen
  }

  /// Make `import_path` and everything it imports available.
  pub async fn resolve(&mut self, import_path: &str) -> Result<(), FetchError> {
    let mut pending = vec![import_path.to_string()];

    while let Some(path) = pending.pop() {
      if !self.seen.insert(path.clone()) {
        continue;
      }

      let imports = if has_sources(self.workspace.path.as_ref(), &path, &self.source_ext) {
        debug!(path = %path, "package present in path tree");
        self.imports_in(self.workspace.path.as_ref(), &path)?
      } else if has_sources(self.workspace.root.as_ref(), &path, &self.source_ext) {
        // Root packages only import other root packages.
        continue;
      } else {
        self.fetch_into_path(&path).await?
      };

      pending.extend(imports.into_iter().filter(|i| !self.seen.contains(i)).rev());
    }

    Ok(())
  }

  fn imports_in(&self, fs: &dyn FileSystem, import_path: &str) -> Result<Vec<String>, FetchError> {
    let dir = package_dir(import_path);
    let mut sources = Vec::new();
    for entry in fs.read_dir(&dir)? {
      if !entry.is_dir() && is_source_file(&entry.name, &self.source_ext) {
        sources.push(fs.read(&join(&dir, &entry.name))?);
      }
    }
    Ok(merge_imports(sources.iter().map(|b| std::str::from_utf8(b).unwrap_or_default())))
  }

  async fn fetch_into_path(&mut self, import_path: &str) -> Result<Vec<String>, FetchError> {
    self.policy.check(import_path)?;

    info!(path = %import_path, "fetching package");
    self.progress.report(ProgressEvent::FetchStarted {
      import_path: import_path.to_string(),
    });
    let tree = self.host.fetch(import_path).await?;

    let sources: Vec<&[u8]> = tree
      .iter()
      .filter(|(name, _)| is_source_file(name, &self.source_ext))
      .map(|(_, bytes)| bytes.as_slice())
      .collect();
    if sources.is_empty() {
      return Err(FetchError::not_found(import_path));
    }
    let imports = merge_imports(sources.iter().map(|b| std::str::from_utf8(b).unwrap_or_default()));

    self
      .workspace
      .add_package(import_path, tree.iter().map(|(name, bytes)| (name.as_str(), bytes.as_slice())))?;

    self.progress.report(ProgressEvent::FetchFinished {
      import_path: import_path.to_string(),
    });
    debug!(path = %import_path, files = tree.len(), imports = imports.len(), "fetched package");
    Ok(imports)
  }
}
