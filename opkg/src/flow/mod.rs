//! The flow engine: resolves a flow's `from`/`to` globs,
//! evaluates its `when` condition, runs it through parse → map → merge →
//! serialize, and hands back rendered writes for the caller to persist.

pub mod context;
pub mod engine;
pub mod merge;
pub mod target;
pub mod when;

pub use context::FlowContext;
pub use engine::{run_flows, FlowRunOutcome, FlowWrite};
