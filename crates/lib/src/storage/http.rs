//! HTTP bucket: `PUT <base>/<key>`.

use tracing::debug;

use super::{ObjectStore, StorageError, validate_key};

/// Uploads objects with plain HTTP `PUT` requests.
#[derive(Debug, Clone)]
pub struct HttpStore {
  client: reqwest::Client,
  base_url: String,
}

impl HttpStore {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: base_url.into().trim_end_matches('/').to_string(),
    }
  }

  pub fn url_for(&self, key: &str) -> String {
    format!("{}/{}", self.base_url, key)
  }
}

impl ObjectStore for HttpStore {
  async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
    validate_key(key)?;
    let url = self.url_for(key);
    let size = bytes.len();

    let upload_error = |cause: String| StorageError::Upload {
      key: key.to_string(),
      cause,
    };

    let response = self
      .client
      .put(&url)
      .header(reqwest::header::CONTENT_TYPE, content_type)
      .body(bytes)
      .send()
      .await
      .map_err(|e| upload_error(e.to_string()))?;

    if !response.status().is_success() {
      return Err(upload_error(format!("HTTP {}", response.status())));
    }

    debug!(url = %url, size, "uploaded object");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn puts_with_content_type() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("PUT", "/sys/fmt.abc.js")
      .match_header("content-type", "application/javascript")
      .match_body("module")
      .with_status(200)
      .create_async()
      .await;

    let store = HttpStore::new(server.url());
    store
      .put("sys/fmt.abc.js", b"module".to_vec(), "application/javascript")
      .await
      .unwrap();
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn rejected_upload_fails() {
    let mut server = mockito::Server::new_async().await;
    server.mock("PUT", "/sys/fmt.abc.js").with_status(403).create_async().await;

    let store = HttpStore::new(server.url());
    let err = store.put("sys/fmt.abc.js", vec![], "x").await.unwrap_err();
    assert!(matches!(err, StorageError::Upload { key, .. } if key == "sys/fmt.abc.js"));
  }
}
