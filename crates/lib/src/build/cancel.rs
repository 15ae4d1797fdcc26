//! Session-scoped cancellation.

use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable flag that in-flight work can wait on.
///
/// Cancelling any clone cancels them all. Once cancelled a token stays
/// cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
  tx: Arc<watch::Sender<bool>>,
  rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
  fn default() -> Self {
    Self::new()
  }
}

impl CancelToken {
  pub fn new() -> Self {
    let (tx, rx) = watch::channel(false);
    Self { tx: Arc::new(tx), rx }
  }

  pub fn cancel(&self) {
    self.tx.send_replace(true);
  }

  pub fn is_cancelled(&self) -> bool {
    *self.rx.borrow()
  }

  /// Resolve once the token is cancelled.
  pub async fn cancelled(&self) {
    let mut rx = self.rx.clone();
    // The sender lives as long as any clone of the token, so this only
    // errors if every sender is gone, which cannot happen while `self` exists.
    let _ = rx.wait_for(|cancelled| *cancelled).await;
  }
}
