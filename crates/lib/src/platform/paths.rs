//! Per-user directories for playbuild data.
//!
//! Follows the XDG base directory variables on Unix and the `APPDATA`
//! family on Windows. When neither the specific variable nor the home
//! directory is known, falls back to the system temp directory.

use std::path::PathBuf;

use crate::consts::APP_NAME;

fn env_path(var: &str) -> Option<PathBuf> {
  std::env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  env_path("USERPROFILE").unwrap_or_else(std::env::temp_dir)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  env_path("HOME").unwrap_or_else(std::env::temp_dir)
}

/// Returns the directory for data files for the application
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  env_path("APPDATA").unwrap_or_else(home_dir).join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  env_path("XDG_DATA_HOME")
    .unwrap_or_else(|| home_dir().join(".local").join("share"))
    .join(APP_NAME)
}

/// Returns the directory for cache files for the application
#[cfg(windows)]
pub fn cache_dir() -> PathBuf {
  env_path("LOCALAPPDATA")
    .unwrap_or_else(home_dir)
    .join(APP_NAME)
    .join("Cache")
}

/// Returns the directory for cache files for the application
#[cfg(not(windows))]
pub fn cache_dir() -> PathBuf {
  env_path("XDG_CACHE_HOME")
    .unwrap_or_else(|| home_dir().join(".cache"))
    .join(APP_NAME)
}

#[cfg(test)]
#[cfg(not(windows))]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn xdg_data_home_takes_precedence() {
    temp_env::with_vars(
      [("XDG_DATA_HOME", Some("/custom/data")), ("HOME", Some("/home/user"))],
      || {
        assert_eq!(data_dir(), PathBuf::from("/custom/data").join(APP_NAME));
      },
    );
  }

  #[test]
  #[serial]
  fn xdg_fallback_to_home_directories() {
    temp_env::with_vars(
      [
        ("XDG_DATA_HOME", None::<&str>),
        ("XDG_CACHE_HOME", None::<&str>),
        ("HOME", Some("/home/user")),
      ],
      || {
        assert_eq!(data_dir(), PathBuf::from("/home/user/.local/share").join(APP_NAME));
        assert_eq!(cache_dir(), PathBuf::from("/home/user/.cache").join(APP_NAME));
      },
    );
  }

  #[test]
  #[serial]
  fn missing_home_falls_back_to_temp() {
    temp_env::with_vars([("XDG_CACHE_HOME", None::<&str>), ("HOME", None::<&str>)], || {
      assert_eq!(cache_dir(), std::env::temp_dir().join(".cache").join(APP_NAME));
    });
  }
}
