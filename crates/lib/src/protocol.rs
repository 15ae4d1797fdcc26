//! Session messages.
//!
//! Every message is one JSON object tagged by `"type"`. The client sends a
//! single `update`; the server answers with progress messages, zero or more
//! `archive` messages, one `index` and a final `updating` with `done`, or a
//! terminal `error`.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{ENTRY_FILE, ENTRY_PACKAGE};
use crate::frontend::Position;
use crate::sync::{ClientManifest, IndexEntry, QueuedArtifact};
use crate::types::Variant;
use crate::util::hash::ContentHash;

/// Errors in the message exchange itself.
#[derive(Debug, Error)]
pub enum ProtocolError {
  #[error("timed out waiting for instruction from client")]
  Timeout,

  #[error("connection closed before instruction was received")]
  Closed,

  #[error("invalid message: {0}")]
  Malformed(#[from] serde_json::Error),

  #[error("invalid init message: expected update, got {0}")]
  UnexpectedMessage(String),

  #[error("can't find main package in source")]
  MissingEntryPackage,

  #[error("can't find main.go in source")]
  MissingEntryFile,

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Submitted sources: package import path to filename to source text.
pub type SourceMap = BTreeMap<String, BTreeMap<String, String>>;

/// The initiation message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
  pub source: SourceMap,

  #[serde(default)]
  pub cache: ClientManifest,

  #[serde(default)]
  pub variant: Variant,
}

impl Update {
  /// Source of the entry file.
  pub fn entry_source(&self) -> Result<&str, ProtocolError> {
    let package = self.source.get(ENTRY_PACKAGE).ok_or(ProtocolError::MissingEntryPackage)?;
    package
      .get(ENTRY_FILE)
      .map(String::as_str)
      .ok_or(ProtocolError::MissingEntryFile)
  }
}

/// Start/finish/log notice for one phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub starting: bool,

  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub done: bool,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

impl Progress {
  pub fn starting() -> Self {
    Self {
      starting: true,
      ..Self::default()
    }
  }

  pub fn done() -> Self {
    Self {
      done: true,
      ..Self::default()
    }
  }

  pub fn message(message: impl Into<String>) -> Self {
    Self {
      message: Some(message.into()),
      ..Self::default()
    }
  }
}

/// A message in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
  Update(Update),
  Downloading(Progress),
  Updating(Progress),
  Index {
    packages: BTreeMap<String, IndexEntry>,
  },
  Archive {
    path: String,
    hash: ContentHash,

    /// Base64 of the gzipped module.
    contents: String,
  },
  Error {
    message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    position: Option<Position>,
  },
}

impl Message {
  pub fn archive(artifact: &QueuedArtifact) -> Self {
    Message::Archive {
      path: artifact.import_path.clone(),
      hash: artifact.hash.clone(),
      contents: BASE64.encode(&artifact.contents),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Message::Error {
      message: message.into(),
      path: None,
      position: None,
    }
  }

  /// Name of the `type` tag.
  pub fn kind(&self) -> &'static str {
    match self {
      Message::Update(_) => "update",
      Message::Downloading(_) => "downloading",
      Message::Updating(_) => "updating",
      Message::Index { .. } => "index",
      Message::Archive { .. } => "archive",
      Message::Error { .. } => "error",
    }
  }

  pub fn to_json(&self) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(self)?)
  }

  pub fn from_json(line: &str) -> Result<Self, ProtocolError> {
    Ok(serde_json::from_str(line)?)
  }
}

/// Decode the contents of an `archive` message.
pub fn decode_contents(contents: &str) -> Result<Vec<u8>, base64::DecodeError> {
  BASE64.decode(contents)
}
