//! Test utilities for playbuild-lib.
//!
//! Small source trees and front-end wrappers shared by the build, sync,
//! session and publish tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::frontend::{BundleFrontend, CompileError, CompileRequest, Frontend};
use crate::types::Archive;
use crate::vfs::{FileSystem, MemFs, join, package_dir};

/// In-memory tree with `(import path, file, source)` entries under `src/`.
pub fn tree(files: &[(&str, &str, &str)]) -> Arc<MemFs> {
  let fs = MemFs::new();
  for (import_path, name, source) in files {
    fs.write(&join(&package_dir(import_path), name), source.as_bytes())
      .unwrap();
  }
  Arc::new(fs)
}

/// A small library: `fmt` imports `io`, `helperlib` imports `fmt`.
pub fn library() -> Arc<MemFs> {
  tree(&[
    ("io", "io.go", "package io\n\nfunc Write() {}\n"),
    ("fmt", "print.go", "package fmt\n\nimport \"io\"\n\nfunc Println() { io.Write() }\n"),
    ("helperlib", "helper.go", "package helperlib\n\nimport \"fmt\"\n\nfunc Help() { fmt.Println() }\n"),
    ("os", "os.go", "package os\n"),
  ])
}

/// Entry program importing `fmt` and `helperlib`.
pub const MAIN_SOURCE: &str = "package main\n\nimport (\n\t\"fmt\"\n\t\"helperlib\"\n)\n\nfunc main() { fmt.Println(); helperlib.Help() }\n";

/// Front end that counts compiles per import path.
#[derive(Debug, Default)]
pub struct CountingFrontend {
  counts: Mutex<HashMap<String, usize>>,
  total: AtomicUsize,
}

impl CountingFrontend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn count(&self, import_path: &str) -> usize {
    self.counts.lock().unwrap().get(import_path).copied().unwrap_or(0)
  }

  pub fn total(&self) -> usize {
    self.total.load(Ordering::SeqCst)
  }
}

impl Frontend for CountingFrontend {
  fn compile(&self, request: CompileRequest<'_>) -> Result<Archive, CompileError> {
    *self
      .counts
      .lock()
      .unwrap()
      .entry(request.package.import_path.clone())
      .or_default() += 1;
    self.total.fetch_add(1, Ordering::SeqCst);
    BundleFrontend.compile(request)
  }
}

/// Front end that blocks for a while before delegating.
#[derive(Debug)]
pub struct SlowFrontend(pub std::time::Duration);

impl Frontend for SlowFrontend {
  fn compile(&self, request: CompileRequest<'_>) -> Result<Archive, CompileError> {
    std::thread::sleep(self.0);
    BundleFrontend.compile(request)
  }
}
