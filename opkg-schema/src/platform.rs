//! Platform definitions: the declarative document describing one target
//! platform's native layout. opkg reads this document; it never writes it
//! (spec §6 — the platform-definition document itself is an external
//! collaborator's concern).

use camino::Utf8PathBuf;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::flow::Flow;
use crate::package::PlatformId;

/// The reserved platform id whose flows apply to every platform, not just
/// one (spec §3: "global flows apply to all platforms; per-platform flows
/// apply to their platform only"). A [`PlatformDefinition`] with this id
/// is not itself installable; it's folded into every other platform's run
/// by the flow engine.
pub const GLOBAL_PLATFORM_ID: &str = "global";

/// A declarative description of one target platform's native config
/// layout.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct PlatformDefinition {
    /// The platform's id (e.g. `cursor`, `claude-code`). Matched against
    /// `$$platform` in flow `when` conditions.
    pub name: PlatformId,
    /// The platform's root config directory, relative to the workspace
    /// root.
    pub root_dir: Utf8PathBuf,
    /// The platform's root manifest file, if it has a single well-known
    /// one (relative to `root_dir`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_file: Option<Utf8PathBuf>,
    /// Glob patterns used by the base detector to recognize a package
    /// meant for this platform.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detection: Vec<String>,
    /// Flows that convert workspace files back into universal package
    /// form (used by the save engine).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub import: Vec<Flow>,
    /// Flows that materialize package files into this platform's native
    /// workspace layout (used by the install engine).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub export: Vec<Flow>,
}

impl PlatformDefinition {
    /// Whether this definition is the reserved "global" bucket of flows
    /// rather than an actual installable platform.
    pub fn is_global(&self) -> bool {
        self.name.as_str() == GLOBAL_PLATFORM_ID
    }
}
