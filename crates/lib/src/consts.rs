//! Crate-wide constants.

/// Application name, used for data/cache directory names.
pub const APP_NAME: &str = "playbuild";

/// Import path of the package a client session runs.
pub const ENTRY_PACKAGE: &str = "main";

/// File that must be present in the entry package.
pub const ENTRY_FILE: &str = "main.go";

/// Default source file extension recognised inside package directories.
pub const SOURCE_EXT: &str = "go";

/// Directory (inside every filesystem tree) holding package directories.
pub const SRC_DIR: &str = "src";

/// Key prefix for published artifacts in durable storage.
pub const STORAGE_PREFIX: &str = "sys";

/// Content type of rendered modules.
pub const MODULE_CONTENT_TYPE: &str = "application/javascript";

/// Key (under [`STORAGE_PREFIX`]) of the published build universe record.
pub const UNIVERSE_RECORD_NAME: &str = "index.json";

/// Number of hash characters shown in human output.
pub const SHORT_HASH_LEN: usize = 12;
