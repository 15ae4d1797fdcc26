//! Durable object storage for published artifacts.
//!
//! Objects are addressed by `/`-separated keys. Keys embed content hashes, so
//! writing the same key twice writes the same bytes and uploads are safe to
//! repeat or run in parallel.

mod dir;
mod http;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use thiserror::Error;

pub use dir::DirStore;
pub use http::HttpStore;

/// Errors raised by object stores.
#[derive(Debug, Error)]
pub enum StorageError {
  #[error("invalid object key: {0}")]
  InvalidKey(String),

  #[error("failed to write {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("upload of {key} failed: {cause}")]
  Upload { key: String, cause: String },
}

/// A bucket of immutable objects.
pub trait ObjectStore: Send + Sync {
  /// Store `bytes` under `key`.
  fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}

impl<S: ObjectStore> ObjectStore for Arc<S> {
  fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> impl Future<Output = Result<(), StorageError>> + Send {
    self.as_ref().put(key, bytes, content_type)
  }
}

/// Reject keys that are empty, absolute or climb out of the bucket.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
  let bad = key.is_empty()
    || key.starts_with('/')
    || key.contains('\\')
    || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
  if bad {
    return Err(StorageError::InvalidKey(key.to_string()));
  }
  Ok(())
}

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
  pub bytes: Vec<u8>,
  pub content_type: String,
}

/// An in-memory bucket.
///
/// Can be told to reject keys containing a marker, to exercise failure paths.
#[derive(Debug, Default)]
pub struct MemStore {
  objects: Mutex<BTreeMap<String, StoredObject>>,
  fail_on: Option<String>,
}

impl MemStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Reject every key containing `marker`.
  pub fn failing_on(marker: impl Into<String>) -> Self {
    Self {
      objects: Mutex::default(),
      fail_on: Some(marker.into()),
    }
  }

  pub fn get(&self, key: &str) -> Option<StoredObject> {
    self.objects.lock().ok()?.get(key).cloned()
  }

  pub fn keys(&self) -> Vec<String> {
    self
      .objects
      .lock()
      .map(|o| o.keys().cloned().collect())
      .unwrap_or_default()
  }
}

impl ObjectStore for MemStore {
  async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
    validate_key(key)?;
    if let Some(marker) = &self.fail_on
      && key.contains(marker.as_str())
    {
      return Err(StorageError::Upload {
        key: key.to_string(),
        cause: "rejected".to_string(),
      });
    }
    let mut objects = self.objects.lock().map_err(|_| StorageError::Upload {
      key: key.to_string(),
      cause: "store lock poisoned".to_string(),
    })?;
    objects.insert(
      key.to_string(),
      StoredObject {
        bytes,
        content_type: content_type.to_string(),
      },
    );
    Ok(())
  }
}
