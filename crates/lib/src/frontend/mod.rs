//! Compiler front-end adapter.
//!
//! The front end type-checks one package and lowers it to an [`Archive`]. It
//! is an external collaborator: the build session only relies on the
//! [`Frontend`] contract. [`BundleFrontend`] is a reference implementation that
//! validates package clauses and bundles sources, enough to drive the whole
//! pipeline without a real compiler.

mod bundle;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{Archive, Package, Variant};
use crate::vfs::FileSystem;

pub use bundle::BundleFrontend;

/// Location of a compile error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
  pub file: String,
  pub line: u32,
  pub column: u32,
}

impl std::fmt::Display for Position {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}:{}", self.file, self.line, self.column)
  }
}

/// The front end rejected a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
  pub import_path: String,
  pub message: String,
  pub position: Option<Position>,
}

impl std::fmt::Display for CompileError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self.position {
      Some(position) => write!(f, "{}: {}: {}", self.import_path, position, self.message),
      None => write!(f, "{}: {}", self.import_path, self.message),
    }
  }
}

impl std::error::Error for CompileError {}

impl CompileError {
  pub fn new(import_path: &str, message: impl Into<String>) -> Self {
    Self {
      import_path: import_path.to_string(),
      message: message.into(),
      position: None,
    }
  }

  pub fn at(mut self, position: Position) -> Self {
    self.position = Some(position);
    self
  }
}

/// Everything the front end gets for one package.
pub struct CompileRequest<'a> {
  pub package: &'a Package,

  /// Units of the package's direct imports, in import order.
  pub dependencies: &'a [Arc<Archive>],

  pub variant: Variant,

  /// Scratch tree for intermediate output.
  pub scratch: &'a dyn FileSystem,
}

/// A source-to-target compiler front end.
///
/// Implementations are called from blocking worker threads, possibly for
/// several packages at once.
pub trait Frontend: Send + Sync {
  fn compile(&self, request: CompileRequest<'_>) -> Result<Archive, CompileError>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn compile_error_display_includes_position() {
    let err = CompileError::new("fmt", "unexpected token").at(Position {
      file: "print.go".into(),
      line: 3,
      column: 7,
    });
    assert_eq!(err.to_string(), "fmt: print.go:3:7: unexpected token");
  }

  #[test]
  fn compile_error_display_without_position() {
    let err = CompileError::new("fmt", "no source files");
    assert_eq!(err.to_string(), "fmt: no source files");
  }
}
