//! Advisory progress reporting.
//!
//! Fetching and building report what they are doing through a
//! [`ProgressSink`]. Events are delivered in the order they are produced but
//! nothing depends on them for correctness.

use std::sync::Mutex;

/// A single progress event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
  /// Retrieval of a remote package started.
  FetchStarted { import_path: String },
  /// Retrieval of a remote package finished.
  FetchFinished { import_path: String },
  /// Free-form build log line.
  Log(String),
}

/// Receiver of progress events.
pub trait ProgressSink: Send + Sync {
  fn report(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
  fn report(&self, _event: ProgressEvent) {}
}

/// Logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
  fn report(&self, event: ProgressEvent) {
    match event {
      ProgressEvent::FetchStarted { import_path } => tracing::info!(path = %import_path, "fetching"),
      ProgressEvent::FetchFinished { import_path } => tracing::debug!(path = %import_path, "fetched"),
      ProgressEvent::Log(line) => tracing::info!("{}", line),
    }
  }
}

/// Records events in memory.
#[derive(Debug, Default)]
pub struct RecordingProgress {
  events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn events(&self) -> Vec<ProgressEvent> {
    self.events.lock().map(|e| e.clone()).unwrap_or_default()
  }
}

impl ProgressSink for RecordingProgress {
  fn report(&self, event: ProgressEvent) {
    if let Ok(mut events) = self.events.lock() {
      events.push(event);
    }
  }
}

impl<F> ProgressSink for F
where
  F: Fn(ProgressEvent) + Send + Sync,
{
  fn report(&self, event: ProgressEvent) {
    self(event)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn recording_keeps_order() {
    let sink = RecordingProgress::new();
    sink.report(ProgressEvent::FetchStarted { import_path: "a".into() });
    sink.report(ProgressEvent::Log("compiling a".into()));
    sink.report(ProgressEvent::FetchFinished { import_path: "a".into() });

    let events = sink.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[1], ProgressEvent::Log("compiling a".into()));
  }

  #[test]
  fn closures_are_sinks() {
    let seen = Mutex::new(0);
    let sink = |_: ProgressEvent| *seen.lock().unwrap() += 1;
    sink.report(ProgressEvent::Log("x".into()));
    sink.report(ProgressEvent::Log("y".into()));
    assert_eq!(*seen.lock().unwrap(), 2);
  }
}
