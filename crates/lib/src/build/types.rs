//! Types for build sessions.
//!
//! This module defines the error type and configuration for compiling a
//! package closure.

use thiserror::Error;

use crate::consts::SOURCE_EXT;
use crate::frontend::CompileError;
use crate::vfs::FsError;

/// Errors that can occur while building a closure.
#[derive(Debug, Error)]
pub enum BuildError {
  /// No tree has a directory for this import path.
  #[error("cannot find package \"{0}\"")]
  PackageNotFound(String),

  /// The package directory has no buildable source files.
  #[error("no buildable source files in \"{0}\"")]
  NoSourceFiles(String),

  /// The import path is empty, absolute, or climbs out of the tree.
  #[error("invalid import path \"{0}\"")]
  InvalidImportPath(String),

  /// The front end rejected a package.
  #[error("compile error: {0}")]
  Compile(#[from] CompileError),

  /// Reading sources failed.
  #[error("filesystem error: {0}")]
  Fs(#[from] FsError),

  /// Cycle detected in the import graph.
  #[error("import cycle detected")]
  CycleDetected,

  /// A package was scheduled before one of its dependencies was built.
  #[error("internal error: {import_path} scheduled before dependency {dependency}")]
  MissingDependency { import_path: String, dependency: String },

  /// The two variant passes produced different import-path sets.
  #[error("internal error: variant builds differ (only optimized: {only_optimized:?}, only full: {only_full:?})")]
  VariantMismatch {
    only_optimized: Vec<String>,
    only_full: Vec<String>,
  },

  /// A compile worker panicked or was torn down.
  #[error("internal error: compile worker failed: {0}")]
  Worker(String),

  /// The session was cancelled.
  #[error("build cancelled")]
  Cancelled,
}

impl BuildError {
  /// Whether the error is caused by user input rather than a bug.
  pub fn is_user_error(&self) -> bool {
    matches!(
      self,
      BuildError::PackageNotFound(_)
        | BuildError::NoSourceFiles(_)
        | BuildError::InvalidImportPath(_)
        | BuildError::Compile(_)
        | BuildError::CycleDetected
    )
  }
}

/// Configuration for build sessions.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Maximum number of packages compiled in parallel.
  pub parallelism: usize,

  /// Extension of source files inside package directories.
  pub source_ext: String,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      source_ext: SOURCE_EXT.to_string(),
    }
  }
}

/// Get the number of CPUs for default parallelism.
pub(crate) fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
