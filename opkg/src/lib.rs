#![deny(missing_docs)]

//! # opkg
//!
//! The orchestration and CLI crate for `opkg`: a cross-platform package
//! manager for AI assistant configuration assets (agents, skills, rules,
//! commands, hooks, MCP server entries). This crate owns everything that
//! isn't pure schema (`opkg_schema`) or source loading (`opkg_source`) —
//! the dependency resolver, the flow pipeline, conflict arbitration, the
//! workspace index, the save/uninstall engines, and the `ops` layer that
//! wires all of it into the commands `cli`/`main` expose.

#![allow(clippy::single_match)]

pub mod cache;
pub mod cli;
pub mod conflict;
pub mod config;
pub mod errors;
pub mod flow;
pub mod formats;
pub mod index;
pub mod map_pipeline;
pub mod ops;
pub mod platform;
pub mod resolver;
pub mod resources;
pub mod save;
pub mod transport;
pub mod uninstall;

pub use errors::{OpkgError, Result};
