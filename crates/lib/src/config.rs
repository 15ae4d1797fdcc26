//! Runtime configuration.
//!
//! Every setting has a default and can be overridden by a `PLAYBUILD_*`
//! environment variable. The CLI applies its own flags on top.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `PLAYBUILD_ROOT` | library sources directory | `{data_dir}/root` |
//! | `PLAYBUILD_LOCAL_PATH` | local package tree mounted instead of fetching | unset |
//! | `PLAYBUILD_MIRROR` | package host base URL | unset |
//! | `PLAYBUILD_ALLOWED_HOSTS` | comma-separated fetchable hosts | `github.com` |
//! | `PLAYBUILD_INSTRUCTION_TIMEOUT_SECS` | wait for the session's first message | `5` |
//! | `PLAYBUILD_PARALLELISM` | concurrent compiles and uploads | CPU count |
//! | `PLAYBUILD_EXCLUDE` | comma-separated packages left out of publishing | see [`DEFAULT_EXCLUDES`] |

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::build::BuildConfig;
use crate::fetch::FetchPolicy;
use crate::platform::paths::data_dir;
use crate::publish::DEFAULT_EXCLUDES;

pub const ROOT_VAR: &str = "PLAYBUILD_ROOT";
pub const LOCAL_PATH_VAR: &str = "PLAYBUILD_LOCAL_PATH";
pub const MIRROR_VAR: &str = "PLAYBUILD_MIRROR";
pub const ALLOWED_HOSTS_VAR: &str = "PLAYBUILD_ALLOWED_HOSTS";
pub const INSTRUCTION_TIMEOUT_VAR: &str = "PLAYBUILD_INSTRUCTION_TIMEOUT_SECS";
pub const PARALLELISM_VAR: &str = "PLAYBUILD_PARALLELISM";
pub const EXCLUDE_VAR: &str = "PLAYBUILD_EXCLUDE";

/// Default wait for a session's initiation message.
pub const DEFAULT_INSTRUCTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid value '{value}' for {var}: {reason}")]
  InvalidValue {
    var: &'static str,
    value: String,
    reason: String,
  },
}

/// Settings shared by both operating modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Directory holding the library sources (`src/<import path>/`).
  pub root: PathBuf,

  /// Local package tree; when set, sessions mount it instead of fetching.
  pub local_path: Option<PathBuf>,

  /// Base URL of the package mirror.
  pub mirror: Option<String>,

  pub allowed_hosts: Vec<String>,

  pub instruction_timeout: Duration,

  pub parallelism: usize,

  /// Packages left out of the published universe.
  pub exclude: Vec<String>,
}

impl Default for Config {
  fn default() -> Self {
    let build = BuildConfig::default();
    Self {
      root: data_dir().join("root"),
      local_path: None,
      mirror: None,
      allowed_hosts: FetchPolicy::default().allowed_hosts,
      instruction_timeout: DEFAULT_INSTRUCTION_TIMEOUT,
      parallelism: build.parallelism,
      exclude: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
    }
  }
}

fn env_var(var: &str) -> Option<String> {
  std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn list(value: &str) -> Vec<String> {
  value
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .collect()
}

fn positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
  match value.trim().parse::<u64>() {
    Ok(n) if n > 0 => Ok(n),
    Ok(_) => Err(ConfigError::InvalidValue {
      var,
      value: value.to_string(),
      reason: "must be greater than zero".to_string(),
    }),
    Err(e) => Err(ConfigError::InvalidValue {
      var,
      value: value.to_string(),
      reason: e.to_string(),
    }),
  }
}

impl Config {
  /// Defaults overridden by `PLAYBUILD_*` environment variables.
  pub fn from_env() -> Result<Self, ConfigError> {
    let mut config = Self::default();

    if let Some(root) = env_var(ROOT_VAR) {
      config.root = PathBuf::from(root);
    }
    config.local_path = env_var(LOCAL_PATH_VAR).map(PathBuf::from);
    config.mirror = env_var(MIRROR_VAR);
    if let Some(hosts) = env_var(ALLOWED_HOSTS_VAR) {
      config.allowed_hosts = list(&hosts);
    }
    if let Some(secs) = env_var(INSTRUCTION_TIMEOUT_VAR) {
      config.instruction_timeout = Duration::from_secs(positive(INSTRUCTION_TIMEOUT_VAR, &secs)?);
    }
    if let Some(n) = env_var(PARALLELISM_VAR) {
      config.parallelism = positive(PARALLELISM_VAR, &n)? as usize;
    }
    if let Some(exclude) = env_var(EXCLUDE_VAR) {
      config.exclude = list(&exclude);
    }

    Ok(config)
  }

  pub fn build_config(&self) -> BuildConfig {
    BuildConfig {
      parallelism: self.parallelism,
      ..BuildConfig::default()
    }
  }

  pub fn fetch_policy(&self) -> FetchPolicy {
    FetchPolicy::new(self.allowed_hosts.iter().cloned())
  }
}
