//! Reference front end that bundles validated sources into a unit.

use sha2::{Digest, Sha256};
use tracing::warn;

use super::{CompileError, CompileRequest, Frontend, Position};
use crate::types::{Archive, Variant};
use crate::util::hash::hash_source_tree;
use crate::vfs::join;

/// Bundles a package's sources without translating them.
///
/// Checks that every file opens with a `package` clause naming the same
/// package, then emits one `$dep` line per dependency (carrying a digest of
/// the dependency's payload, so upstream changes reach every dependent) and
/// one `$file` line per source file. The optimized variant drops comment-only
/// and blank lines from the sources.
#[derive(Debug, Default, Clone, Copy)]
pub struct BundleFrontend;

impl BundleFrontend {
  pub fn new() -> Self {
    Self
  }
}

/// Find the package clause of a file.
///
/// Returns the package name, or the position of the first offending token.
fn package_clause(file: &str, source: &str) -> Result<String, (Position, String)> {
  let mut in_block = false;
  for (idx, line) in source.lines().enumerate() {
    let mut rest = line.trim();
    loop {
      if in_block {
        match rest.find("*/") {
          Some(end) => {
            in_block = false;
            rest = rest[end + 2..].trim_start();
          }
          None => {
            rest = "";
            break;
          }
        }
      } else if let Some(after) = rest.strip_prefix("/*") {
        in_block = true;
        rest = after;
      } else {
        break;
      }
    }
    if rest.is_empty() || rest.starts_with("//") {
      continue;
    }

    let column = (line.len() - line.trim_start().len() + 1) as u32;
    let position = Position {
      file: file.to_string(),
      line: idx as u32 + 1,
      column,
    };
    let Some(name) = rest.strip_prefix("package ") else {
      return Err((position, "expected 'package' clause".to_string()));
    };
    let name = name.split("//").next().unwrap_or(name).trim().trim_end_matches(';');
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
      return Err((position, format!("invalid package name '{}'", name)));
    }
    return Ok(name.to_string());
  }

  Err((
    Position {
      file: file.to_string(),
      line: 1,
      column: 1,
    },
    "expected 'package' clause".to_string(),
  ))
}

fn minify(source: &str) -> String {
  source
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with("//"))
    .collect::<Vec<_>>()
    .join("\n")
}

fn digest(payload: &[u8]) -> String {
  hex::encode(Sha256::digest(payload))
}

impl Frontend for BundleFrontend {
  fn compile(&self, request: CompileRequest<'_>) -> Result<Archive, CompileError> {
    let package = request.package;
    let import_path = package.import_path.as_str();

    if package.files.is_empty() {
      return Err(CompileError::new(import_path, "no buildable source files"));
    }

    let mut package_name: Option<String> = None;
    let mut payload = String::new();

    if request.variant == Variant::Full {
      payload.push_str(&format!(
        "// sources {}\n",
        hash_source_tree(&package.files).short()
      ));
    }

    for dep in request.dependencies {
      payload.push_str(&format!(
        "$dep({}, \"{}\");\n",
        serde_json::to_string(&dep.import_path).unwrap_or_default(),
        digest(&dep.payload)
      ));
    }

    for (name, bytes) in &package.files {
      let source = std::str::from_utf8(bytes).map_err(|e| {
        CompileError::new(import_path, format!("invalid UTF-8: {}", e)).at(Position {
          file: name.clone(),
          line: 1,
          column: 1,
        })
      })?;

      let found = package_clause(name, source).map_err(|(pos, msg)| CompileError::new(import_path, msg).at(pos))?;
      match &package_name {
        None => package_name = Some(found),
        Some(expected) if *expected != found => {
          return Err(
            CompileError::new(
              import_path,
              format!("found packages {} and {} in the same directory", expected, found),
            )
            .at(Position {
              file: name.clone(),
              line: 1,
              column: 1,
            }),
          );
        }
        Some(_) => {}
      }

      let body = match request.variant {
        Variant::Optimized => minify(source),
        Variant::Full => source.to_string(),
      };
      payload.push_str(&format!(
        "$file({}, {});\n",
        serde_json::to_string(name).unwrap_or_default(),
        serde_json::to_string(&body).unwrap_or_default()
      ));
    }

    let scratch_path = join(
      &format!("pkg/{}", request.variant),
      &format!("{}.a", import_path),
    );
    if let Err(e) = request.scratch.write(&scratch_path, payload.as_bytes()) {
      warn!(path = %scratch_path, error = %e, "could not write scratch archive");
    }

    Ok(Archive {
      import_path: import_path.to_string(),
      payload: payload.into_bytes(),
      dependencies: request.dependencies.iter().map(|d| d.import_path.clone()).collect(),
    })
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::sync::Arc;

  use super::*;
  use crate::types::Package;
  use crate::vfs::{FileSystem, MemFs};

  fn package(path: &str, files: &[(&str, &str)]) -> Package {
    Package {
      import_path: path.to_string(),
      files: files
        .iter()
        .map(|(n, s)| (n.to_string(), s.as_bytes().to_vec()))
        .collect::<BTreeMap<_, _>>(),
      imports: vec![],
    }
  }

  fn compile(pkg: &Package, deps: &[Arc<Archive>], variant: Variant) -> Result<Archive, CompileError> {
    let scratch = MemFs::new();
    BundleFrontend.compile(CompileRequest {
      package: pkg,
      dependencies: deps,
      variant,
      scratch: &scratch,
    })
  }

  #[test]
  fn compiles_valid_package() {
    let pkg = package("fmtlike", &[("print.go", "// Package fmtlike.\npackage fmtlike\n\nfunc P() {}\n")]);
    let archive = compile(&pkg, &[], Variant::Full).unwrap();

    assert_eq!(archive.import_path, "fmtlike");
    assert!(archive.dependencies.is_empty());
    let text = String::from_utf8(archive.payload).unwrap();
    assert!(text.contains("$file(\"print.go\""));
  }

  #[test]
  fn missing_package_clause_reports_position() {
    let pkg = package("bad", &[("bad.go", "\n\n  func main() {}\n")]);
    let err = compile(&pkg, &[], Variant::Full).unwrap_err();

    assert_eq!(err.import_path, "bad");
    assert_eq!(
      err.position,
      Some(Position {
        file: "bad.go".into(),
        line: 3,
        column: 3
      })
    );
  }

  #[test]
  fn block_comment_before_clause_is_skipped() {
    let pkg = package("doc", &[("doc.go", "/*\nDocs here.\n*/\npackage doc\n")]);
    assert!(compile(&pkg, &[], Variant::Full).is_ok());
  }

  #[test]
  fn mixed_package_names_fail() {
    let pkg = package("mixed", &[("a.go", "package a\n"), ("b.go", "package b\n")]);
    let err = compile(&pkg, &[], Variant::Optimized).unwrap_err();
    assert!(err.message.contains("found packages a and b"));
  }

  #[test]
  fn empty_package_fails() {
    let pkg = package("empty", &[]);
    assert!(compile(&pkg, &[], Variant::Full).is_err());
  }

  #[test]
  fn dependency_change_changes_payload() {
    let dep_v1 = Arc::new(Archive {
      import_path: "helperlib".into(),
      payload: b"v1".to_vec(),
      dependencies: vec![],
    });
    let dep_v2 = Arc::new(Archive {
      payload: b"v2".to_vec(),
      ..(*dep_v1).clone()
    });
    let pkg = package("main", &[("main.go", "package main\n")]);

    let one = compile(&pkg, &[dep_v1], Variant::Full).unwrap();
    let two = compile(&pkg, &[dep_v2], Variant::Full).unwrap();
    assert_ne!(one.payload, two.payload);
    assert_eq!(one.dependencies, vec!["helperlib".to_string()]);
  }

  #[test]
  fn optimized_drops_comments() {
    let pkg = package("p", &[("p.go", "package p\n// note\n\nvar X = 1\n")]);
    let full = String::from_utf8(compile(&pkg, &[], Variant::Full).unwrap().payload).unwrap();
    let min = String::from_utf8(compile(&pkg, &[], Variant::Optimized).unwrap().payload).unwrap();

    assert!(full.contains("// note"));
    assert!(!min.contains("note"));
    assert!(min.len() < full.len());
  }

  #[test]
  fn writes_scratch_archive() {
    let pkg = package("a/b", &[("b.go", "package b\n")]);
    let scratch = MemFs::new();
    BundleFrontend
      .compile(CompileRequest {
        package: &pkg,
        dependencies: &[],
        variant: Variant::Optimized,
        scratch: &scratch,
      })
      .unwrap();
    assert!(scratch.exists("pkg/optimized/a/b.a"));
  }

  #[test]
  fn unwritable_scratch_does_not_fail_compile() {
    let pkg = package("fmtlike", &[("print.go", "package fmtlike\n")]);
    let blocked = MemFs::new();
    blocked.create_dir_all("pkg/full/fmtlike.a").unwrap();

    let archive = BundleFrontend
      .compile(CompileRequest {
        package: &pkg,
        dependencies: &[],
        variant: Variant::Full,
        scratch: &blocked,
      })
      .unwrap();
    assert_eq!(archive, compile(&pkg, &[], Variant::Full).unwrap());
  }
}
