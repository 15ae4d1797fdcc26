//! playbuild-lib: build orchestration and delta sync for the playground
//!
//! This crate provides the pieces behind both operating modes:
//! - `vfs`: layered in-memory/OS/mounted filesystem trees
//! - `fetch`: resolving and retrieving imported packages
//! - `build`: dependency-ordered, memoized compilation in two variants
//! - `render` and `sync`: content-hashed modules and client delta plans
//! - `session`: the interactive message protocol driver
//! - `publish`: precompiling a package universe into durable storage

pub mod build;
pub mod config;
pub mod consts;
pub mod fetch;
pub mod frontend;
pub mod platform;
pub mod progress;
pub mod protocol;
pub mod publish;
pub mod render;
pub mod session;
pub mod storage;
pub mod sync;
pub mod types;
pub mod util;
pub mod vfs;
