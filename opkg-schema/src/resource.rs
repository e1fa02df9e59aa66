//! Typed assets discovered inside a package.

use camino::Utf8PathBuf;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The kind of asset a [`Resource`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// An autonomous assistant agent definition.
    Agent,
    /// A reusable skill definition.
    Skill,
    /// A standing rule/instruction file.
    Rule,
    /// A user-invocable command/slash-command definition.
    Command,
    /// A lifecycle hook definition.
    Hook,
    /// An MCP server entry.
    McpServer,
}

impl ResourceKind {
    /// All known resource kinds, in a stable order (used when iterating
    /// "install everything" without a filter).
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Agent,
        ResourceKind::Skill,
        ResourceKind::Rule,
        ResourceKind::Command,
        ResourceKind::Hook,
        ResourceKind::McpServer,
    ];
}

/// A typed sub-asset found inside a package, scanned under its detected
/// base.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Resource {
    /// What kind of asset this is.
    pub kind: ResourceKind,
    /// A human/CLI-facing name for this resource (usually derived from its
    /// filename, minus extension).
    pub name: String,
    /// Path to the resource's source file, relative to the package's base.
    pub source_path: Utf8PathBuf,
}
