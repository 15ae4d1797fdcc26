//! Interactive sessions.
//!
//! One session serves one client: it waits for an `update` message, fetches
//! whatever the submitted program imports, builds the closure in both
//! variants, and streams back the artifacts the client does not already hold
//! followed by a complete index.
//!
//! # Message flow
//!
//! ```text
//! client                      server
//!   update ───────────────▶
//!                ◀─────────── downloading {starting}
//!                ◀─────────── downloading {message: <path>}   (per fetch)
//!                ◀─────────── downloading {message: <path> done}
//!                ◀─────────── downloading {done}
//!                ◀─────────── updating {starting}
//!                ◀─────────── updating {message: compiling <path>}
//!                ◀─────────── archive                          (per changed package)
//!                ◀─────────── index
//!                ◀─────────── updating {done}
//! ```
//!
//! Any failure ends the session with a single `error` message. Once the
//! update is accepted, the client closing its side of the connection or the
//! outbound channel going away cancels the fetch or build in flight.

mod stdio;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::build::{BuildConfig, BuildError, CancelToken, VariantSessions};
use crate::config::{Config, DEFAULT_INSTRUCTION_TIMEOUT};
use crate::consts::ENTRY_PACKAGE;
use crate::fetch::{FetchError, FetchPolicy, PackageHost, Resolver};
use crate::frontend::Frontend;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::protocol::{Message, Progress, ProtocolError, Update};
use crate::render::{RenderError, render_all};
use crate::sync::diff;
use crate::vfs::{FileSystem, FsError, Workspace};

pub use stdio::serve_lines;

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
  #[error(transparent)]
  Protocol(#[from] ProtocolError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error(transparent)]
  Render(#[from] RenderError),

  #[error("filesystem error: {0}")]
  Fs(#[from] FsError),

  #[error("session cancelled")]
  Cancelled,

  #[error("client disconnected")]
  Disconnected,
}

impl SessionError {
  /// The `error` message reported to the client.
  pub fn to_message(&self) -> Message {
    match self {
      SessionError::Build(BuildError::Compile(e)) => Message::Error {
        message: e.message.clone(),
        path: Some(e.import_path.clone()),
        position: e.position.clone(),
      },
      SessionError::Build(BuildError::PackageNotFound(path) | BuildError::NoSourceFiles(path)) => Message::Error {
        message: self.to_string(),
        path: Some(path.clone()),
        position: None,
      },
      SessionError::Fetch(e) => Message::Error {
        message: e.to_string(),
        path: e.import_path().map(str::to_string),
        position: None,
      },
      other => Message::error(other.to_string()),
    }
  }

  /// Whether the client's submission caused the failure.
  pub fn is_user_error(&self) -> bool {
    match self {
      SessionError::Build(e) => e.is_user_error(),
      SessionError::Fetch(e) => matches!(e, FetchError::NotFound { .. } | FetchError::PolicyDenied { .. }),
      SessionError::Protocol(e) => matches!(
        e,
        ProtocolError::Malformed(_)
          | ProtocolError::UnexpectedMessage(_)
          | ProtocolError::MissingEntryPackage
          | ProtocolError::MissingEntryFile
      ),
      _ => false,
    }
  }
}

/// What a finished session did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
  /// Packages in the built closure.
  pub packages: usize,

  /// Artifacts sent.
  pub sent: usize,

  /// Packages the client already held.
  pub reused: usize,
}

/// Forwards progress events to the client.
///
/// A closed outbound channel means the client is gone, so the session is
/// cancelled.
struct ChannelProgress {
  outbound: mpsc::UnboundedSender<Message>,
  cancel: CancelToken,
}

impl ProgressSink for ChannelProgress {
  fn report(&self, event: ProgressEvent) {
    let message = match event {
      ProgressEvent::FetchStarted { import_path } => Message::Downloading(Progress::message(import_path)),
      ProgressEvent::FetchFinished { import_path } => {
        Message::Downloading(Progress::message(format!("{} done", import_path)))
      }
      ProgressEvent::Log(line) => Message::Updating(Progress::message(line)),
    };
    if self.outbound.send(message).is_err() && !self.cancel.is_cancelled() {
      debug!("outbound channel closed, cancelling session");
      self.cancel.cancel();
    }
  }
}

/// One client session.
pub struct Session<H> {
  workspace: Workspace,
  frontend: Arc<dyn Frontend>,
  host: Arc<H>,
  policy: FetchPolicy,
  fetch: bool,
  build_config: BuildConfig,
  instruction_timeout: Duration,
  cancel: CancelToken,
}

impl<H: PackageHost> Session<H> {
  pub fn new(workspace: Workspace, frontend: Arc<dyn Frontend>, host: H) -> Self {
    Self {
      workspace,
      frontend,
      host: Arc::new(host),
      policy: FetchPolicy::default(),
      fetch: true,
      build_config: BuildConfig::default(),
      instruction_timeout: DEFAULT_INSTRUCTION_TIMEOUT,
      cancel: CancelToken::new(),
    }
  }

  /// Apply timeout, parallelism, fetch policy and local mode from `config`.
  pub fn with_config(mut self, config: &Config) -> Self {
    self.policy = config.fetch_policy();
    self.build_config = config.build_config();
    self.instruction_timeout = config.instruction_timeout;
    self.fetch = config.local_path.is_none();
    self
  }

  pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_instruction_timeout(mut self, timeout: Duration) -> Self {
    self.instruction_timeout = timeout;
    self
  }

  /// Skip fetching; imports must already be visible in the workspace.
  pub fn without_fetch(mut self) -> Self {
    self.fetch = false;
    self
  }

  /// Token that cancels this session's fetches and builds.
  pub fn cancel_token(&self) -> CancelToken {
    self.cancel.clone()
  }

  /// Serve one client.
  ///
  /// `inbound` carries raw JSON lines from the client. Every terminal error
  /// is also sent to the client as an `error` message. Messages after the
  /// update are ignored, but `inbound` closing cancels the session.
  pub async fn run(
    mut self,
    mut inbound: mpsc::Receiver<String>,
    outbound: mpsc::UnboundedSender<Message>,
  ) -> Result<SessionSummary, SessionError> {
    match self.serve(&mut inbound, &outbound).await {
      Ok(summary) => {
        info!(
          packages = summary.packages,
          sent = summary.sent,
          reused = summary.reused,
          "session complete"
        );
        Ok(summary)
      }
      Err(e) => {
        if e.is_user_error() {
          warn!(error = %e, "session rejected");
        } else {
          error!(error = %e, "session failed");
        }
        let _ = outbound.send(e.to_message());
        Err(e)
      }
    }
  }

  async fn serve(
    &mut self,
    inbound: &mut mpsc::Receiver<String>,
    outbound: &mpsc::UnboundedSender<Message>,
  ) -> Result<SessionSummary, SessionError> {
    let update = self.receive_update(inbound).await?;
    update.entry_source()?;

    let cancel = self.cancel.clone();
    let hangup = async move {
      while let Some(line) = inbound.recv().await {
        debug!(bytes = line.len(), "ignoring message after update");
      }
      info!("client closed its input, cancelling session");
      cancel.cancel();
      std::future::pending::<()>().await
    };

    tokio::select! {
      result = self.sync(update, outbound) => result,
      _ = hangup => Err(SessionError::Cancelled),
    }
  }

  /// Fetch, build and stream the artifacts for one accepted update.
  async fn sync(
    &mut self,
    update: Update,
    outbound: &mpsc::UnboundedSender<Message>,
  ) -> Result<SessionSummary, SessionError> {
    let cancel = self.cancel.clone();
    let send = |message: Message| {
      outbound.send(message).map_err(|_| {
        cancel.cancel();
        SessionError::Disconnected
      })
    };
    let progress: Arc<dyn ProgressSink> = Arc::new(ChannelProgress {
      outbound: outbound.clone(),
      cancel: self.cancel.clone(),
    });

    send(Message::Downloading(Progress::starting()))?;
    for (import_path, files) in &update.source {
      self
        .workspace
        .add_package(import_path, files.iter().map(|(name, src)| (name.as_str(), src.as_bytes())))?;
    }
    if self.fetch {
      self.fetch_imports(progress.clone()).await?;
    }
    send(Message::Downloading(Progress::done()))?;

    send(Message::Updating(Progress::starting()))?;
    let mut sessions = VariantSessions::new(self.frontend.clone(), self.build_config.clone())
      .with_progress(progress)
      .with_cancel(self.cancel.clone());
    let sources: Arc<dyn FileSystem> = Arc::new(self.workspace.sources());
    let archives = sessions
      .build_variants(sources, self.workspace.temporary.clone(), &[ENTRY_PACKAGE.to_string()])
      .await
      .map_err(|e| match e {
        BuildError::Cancelled => SessionError::Cancelled,
        e => e.into(),
      })?;

    let rendered = render_all(&archives)?;
    let plan = diff(&rendered, &update.cache, update.variant, ENTRY_PACKAGE)?;

    let mut sent: HashSet<&str> = HashSet::new();
    for artifact in &plan.artifacts {
      if !sent.insert(artifact.import_path.as_str()) {
        continue;
      }
      debug!(path = %artifact.import_path, hash = %artifact.hash.short(), "sending artifact");
      send(Message::archive(artifact))?;
    }
    send(Message::Index {
      packages: plan.index.clone(),
    })?;
    send(Message::Updating(Progress::done()))?;

    Ok(SessionSummary {
      packages: plan.index.len(),
      sent: sent.len(),
      reused: plan.reused(),
    })
  }

  async fn receive_update(&self, inbound: &mut mpsc::Receiver<String>) -> Result<Update, SessionError> {
    let line = tokio::select! {
      biased;
      _ = self.cancel.cancelled() => return Err(SessionError::Cancelled),
      received = tokio::time::timeout(self.instruction_timeout, inbound.recv()) => {
        received.map_err(|_| ProtocolError::Timeout)?.ok_or(ProtocolError::Closed)?
      }
    };

    match Message::from_json(&line)? {
      Message::Update(update) => {
        info!(
          packages = update.source.len(),
          cached = update.cache.len(),
          variant = %update.variant,
          "received update"
        );
        Ok(update)
      }
      other => Err(ProtocolError::UnexpectedMessage(other.kind().to_string()).into()),
    }
  }

  async fn fetch_imports(&self, progress: Arc<dyn ProgressSink>) -> Result<(), SessionError> {
    let mut resolver =
      Resolver::new(self.host.clone(), self.policy.clone(), self.workspace.clone()).with_progress(progress);
    tokio::select! {
      biased;
      _ = self.cancel.cancelled() => Err(SessionError::Cancelled),
      resolved = resolver.resolve(ENTRY_PACKAGE) => Ok(resolved?),
    }
  }
}
