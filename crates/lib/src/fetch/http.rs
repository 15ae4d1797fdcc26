//! HTTP package host.
//!
//! Packages are served by a mirror as gzipped tarballs at
//! `<mirror>/<import path>.tar.gz`, holding the files of the package
//! directory at the archive root.

use std::io::Read;
use std::path::Component;

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info};

use super::{FetchError, PackageHost, SourceTree};

/// Fetches packages from an HTTP mirror.
#[derive(Debug, Clone)]
pub struct HttpHost {
  client: reqwest::Client,
  mirror: String,
}

impl HttpHost {
  pub fn new(mirror: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      mirror: mirror.into().trim_end_matches('/').to_string(),
    }
  }

  pub fn url_for(&self, import_path: &str) -> String {
    format!("{}/{}.tar.gz", self.mirror, import_path)
  }
}

impl PackageHost for HttpHost {
  async fn fetch(&self, import_path: &str) -> Result<SourceTree, FetchError> {
    let url = self.url_for(import_path);
    info!(url = %url, "downloading package");

    let unreachable = |cause: String| FetchError::Unreachable {
      import_path: import_path.to_string(),
      cause,
    };

    let response = self
      .client
      .get(&url)
      .send()
      .await
      .map_err(|e| unreachable(e.to_string()))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
      return Err(FetchError::not_found(import_path));
    }
    if !response.status().is_success() {
      return Err(unreachable(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| unreachable(e.to_string()))?;
    debug!(url = %url, size = bytes.len(), "download complete");

    unpack_source_tree(import_path, &bytes)
  }
}

/// Read the top-level files of a gzipped tarball.
///
/// Nested directories are ignored; they hold other packages.
pub fn unpack_source_tree(import_path: &str, bytes: &[u8]) -> Result<SourceTree, FetchError> {
  let invalid = |e: std::io::Error| FetchError::InvalidArchive {
    import_path: import_path.to_string(),
    cause: e.to_string(),
  };

  let mut archive = Archive::new(GzDecoder::new(bytes));
  let mut tree = SourceTree::new();

  for entry in archive.entries().map_err(invalid)? {
    let mut entry = entry.map_err(invalid)?;
    if !entry.header().entry_type().is_file() {
      continue;
    }

    let path = entry.path().map_err(invalid)?.into_owned();
    let mut names = path.components().filter(|c| !matches!(c, Component::CurDir));
    let (Some(Component::Normal(name)), None) = (names.next(), names.next()) else {
      continue;
    };
    let Some(name) = name.to_str().map(str::to_string) else {
      continue;
    };

    let mut contents = Vec::new();
    entry.read_to_end(&mut contents).map_err(invalid)?;
    tree.insert(name, contents);
  }

  Ok(tree)
}
