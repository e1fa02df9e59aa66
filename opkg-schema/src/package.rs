//! Packages and the sources they're resolved from.

use camino::Utf8PathBuf;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::macros::declare_strongly_typed_string;
use crate::manifest::Manifest;

declare_strongly_typed_string! {
    /// A normalized package name (lowercase, no leading/trailing whitespace).
    pub struct PackageName => &PackageNameRef;
}

declare_strongly_typed_string! {
    /// The id of a target platform, as named by the platform-definition
    /// document (e.g. `cursor`, `claude-code`, `windsurf`).
    pub struct PlatformId => &PlatformIdRef;
}

impl PackageName {
    /// Normalize a raw, user-typed name: lowercase and trimmed.
    ///
    /// This does not validate shape (registry-specific rules, if any, are
    /// the registry's concern); it only canonicalizes so that `Tech` and
    /// `tech` refer to the same workspace-index entry.
    pub fn normalize(raw: &str) -> Self {
        Self::new(raw.trim().to_ascii_lowercase())
    }
}

/// The three kinds of place a package can come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceVariant {
    /// A versioned package fetched from the remote registry (or its local
    /// cache).
    Registry {
        /// The package name as given to the registry.
        name: PackageName,
        /// The version constraint/selector the user asked for, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    /// A package living inside a Git repository.
    Git {
        /// The clone URL.
        url: String,
        /// The ref (branch, tag, or commit) to resolve, if pinned.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        git_ref: Option<String>,
        /// An in-repo path to treat as the resource filter, not a
        /// subdirectory to clone (per spec: `gh@owner/repo/subpath` filters
        /// resources rather than narrowing the clone).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resource_filter: Option<String>,
    },
    /// A package living at a local path (directory or tarball).
    LocalPath {
        /// Absolute path to the directory or tarball.
        path: Utf8PathBuf,
    },
}

impl SourceVariant {
    /// A short, stable discriminant string, used for cache-scope partition
    /// naming and diagnostics.
    pub fn kind_str(&self) -> &'static str {
        match self {
            SourceVariant::Registry { .. } => "registry",
            SourceVariant::Git { .. } => "git",
            SourceVariant::LocalPath { .. } => "local-path",
        }
    }
}

/// An immutable snapshot of a source at a specific version: the unit the
/// install/save engines operate on.
#[derive(Debug, Clone)]
pub struct Package {
    /// The normalized package name.
    pub name: PackageName,
    /// The resolved version, if the source variant carries one (registry
    /// and most Git sources do; a bare local path may not).
    pub version: Option<semver::Version>,
    /// The package's manifest (dependencies, base hint, metadata).
    pub manifest: Manifest,
    /// Absolute path to the directory containing the package's raw files.
    pub content_root: Utf8PathBuf,
    /// Which source variant this snapshot came from.
    pub source: SourceVariant,
    /// Whether this source is a marketplace (a catalog of sub-packages),
    /// handled out-of-band from the ordinary install pipeline.
    pub is_marketplace: bool,
}
