//! Build sessions.
//!
//! Turns root import paths into compiled units for their whole closure.
//!
//! # Pipeline
//!
//! 1. Discover: read each reachable package from the source tree and scan its
//!    imports ([`imports`], [`package`]).
//! 2. Schedule: order packages into dependency waves ([`ImportGraph`]).
//! 3. Compile: hand each package and its dependencies' units to the
//!    [`Frontend`](crate::frontend::Frontend), a wave at a time.
//!
//! Builds are all-or-nothing: a session only records units once the whole
//! closure compiled.

mod cancel;
mod dag;
pub mod imports;
pub mod package;
mod session;
mod types;

pub use cancel::CancelToken;
pub use dag::ImportGraph;
pub use session::{BuildSession, VariantArchives, VariantSessions};
pub use types::*;
