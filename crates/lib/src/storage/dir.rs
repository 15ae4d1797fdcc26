//! Local directory bucket.
//!
//! # Layout
//!
//! ```text
//! {base}/
//! └── sys/
//!     ├── fmt.<hash>.js
//!     └── fmt.<hash>.min.js
//! ```

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use super::{ObjectStore, StorageError, validate_key};

/// Stores objects as files under a base directory.
#[derive(Debug, Clone)]
pub struct DirStore {
  base: PathBuf,
}

impl DirStore {
  pub fn new(base: impl Into<PathBuf>) -> Self {
    Self { base: base.into() }
  }

  pub fn base(&self) -> &Path {
    &self.base
  }

  pub fn path_for(&self, key: &str) -> PathBuf {
    key.split('/').fold(self.base.clone(), |path, part| path.join(part))
  }
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> StorageError + '_ {
  move |source| StorageError::Io {
    path: path.to_path_buf(),
    source,
  }
}

impl ObjectStore for DirStore {
  async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
    validate_key(key)?;
    let path = self.path_for(key);

    // Identical object already stored.
    if let Ok(existing) = fs::read(&path).await
      && existing == bytes
    {
      debug!(key = %key, "object unchanged");
      return Ok(());
    }

    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await.map_err(io_error(parent))?;
    }

    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("object");
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));
    fs::write(&temp_path, &bytes).await.map_err(io_error(&temp_path))?;
    fs::rename(&temp_path, &path).await.map_err(io_error(&path))?;

    debug!(key = %key, size = bytes.len(), content_type = %content_type, "stored object");
    Ok(())
  }
}
