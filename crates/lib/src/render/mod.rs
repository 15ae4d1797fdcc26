//! Artifact rendering and hashing.
//!
//! Rendering turns a compiled unit into a self-registering script module. It
//! is a pure function of the unit and the variant: the same unit always
//! renders to the same bytes and therefore the same hash.
//!
//! # Module format
//!
//! ```text
//! // package helperlib
//! // imports: fmt
//! $module("helperlib", function () {
//! $load("fmt");
//! <payload>
//! });
//! ```
//!
//! The optimized variant drops comment lines and blank lines and trims every
//! line.

use std::collections::BTreeMap;
use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use thiserror::Error;

use crate::build::VariantArchives;
use crate::types::{Archive, Variant};
use crate::util::hash::{ContentHash, hash_bytes};

/// Errors raised while rendering.
#[derive(Debug, Error)]
pub enum RenderError {
  #[error("unit for \"{0}\" is not valid UTF-8")]
  InvalidPayload(String),

  #[error("internal error: no {variant} unit for \"{import_path}\"")]
  MissingUnit { import_path: String, variant: Variant },

  #[error("compression failed: {0}")]
  Compress(#[from] std::io::Error),
}

/// Rendered bytes and their hash for one package and variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
  pub import_path: String,
  pub variant: Variant,
  pub bytes: Vec<u8>,
  pub hash: ContentHash,
}

impl Artifact {
  /// Gzipped bytes, as sent to clients.
  pub fn compressed(&self) -> Result<Vec<u8>, RenderError> {
    compress(&self.bytes)
  }
}

/// Both renderings of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPackage {
  pub optimized: Artifact,
  pub full: Artifact,
}

impl RenderedPackage {
  pub fn get(&self, variant: Variant) -> &Artifact {
    match variant {
      Variant::Optimized => &self.optimized,
      Variant::Full => &self.full,
    }
  }
}

/// Rendered packages of a closure, keyed by import path.
pub type RenderedSet = BTreeMap<String, RenderedPackage>;

/// Render one unit in one variant.
pub fn render(archive: &Archive, variant: Variant) -> Result<Artifact, RenderError> {
  let payload =
    std::str::from_utf8(&archive.payload).map_err(|_| RenderError::InvalidPayload(archive.import_path.clone()))?;

  let mut module = String::new();
  module.push_str(&format!("// package {}\n", archive.import_path));
  if !archive.dependencies.is_empty() {
    module.push_str(&format!("// imports: {}\n", archive.dependencies.join(", ")));
  }
  module.push_str(&format!("$module({}, function () {{\n", quote(&archive.import_path)));
  for dep in &archive.dependencies {
    module.push_str(&format!("$load({});\n", quote(dep)));
  }
  module.push_str(payload);
  if !payload.ends_with('\n') {
    module.push('\n');
  }
  module.push_str("});\n");

  let bytes = match variant {
    Variant::Full => module.into_bytes(),
    Variant::Optimized => strip(&module).into_bytes(),
  };
  let hash = hash_bytes(&bytes);

  Ok(Artifact {
    import_path: archive.import_path.clone(),
    variant,
    bytes,
    hash,
  })
}

/// Render every package of a closure in both variants.
pub fn render_all(archives: &VariantArchives) -> Result<RenderedSet, RenderError> {
  let mut rendered = RenderedSet::new();
  for (import_path, full) in &archives.full {
    let optimized = archives.optimized.get(import_path).ok_or_else(|| RenderError::MissingUnit {
      import_path: import_path.clone(),
      variant: Variant::Optimized,
    })?;
    rendered.insert(
      import_path.clone(),
      RenderedPackage {
        optimized: render(optimized, Variant::Optimized)?,
        full: render(full, Variant::Full)?,
      },
    );
  }
  Ok(rendered)
}

/// Gzip bytes.
///
/// The gzip header carries no timestamp or filename, so equal input gives
/// equal output.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, RenderError> {
  let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
  encoder.write_all(bytes)?;
  Ok(encoder.finish()?)
}

fn quote(s: &str) -> String {
  serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

fn strip(module: &str) -> String {
  let mut out = String::with_capacity(module.len());
  for line in module.lines().map(str::trim) {
    if line.is_empty() || line.starts_with("//") {
      continue;
    }
    out.push_str(line);
    out.push('\n');
  }
  out
}
