//! # opkg-source
//!
//! Turns a user-supplied input string (a command-line argument, or a
//! dependency entry in a manifest) into a package loaded onto local disk
//! and base-detected: classification (`classify`), loading
//! (`load`/`local`/`registry`/`git`), and base detection (`base`).
//!
//! Network and Git transport are out of scope here (they're a caller's
//! collaborator, via [`git::GitFetcher`]/[`registry::RegistryClient`]);
//! everything this crate does is deterministic given what's already on
//! disk or what a collaborator hands back.

#![deny(missing_docs)]

pub mod base;
pub mod classify;
pub mod errors;
pub mod git;
pub mod load;
pub mod local;
pub mod registry;

pub use base::{detect_base, BaseCandidate, BaseOutcome, BaseSource, MARKETPLACE_MANIFEST_FILE};
pub use classify::classify;
pub use errors::{Result, SourceError};
pub use git::{git_cache_path, load_git, GitFetcher};
pub use load::{LoadedPackage, MANIFEST_FILENAME};
pub use local::load_local;
pub use registry::{load_registry, registry_cache_path, RegistryClient, RegistryMode};
