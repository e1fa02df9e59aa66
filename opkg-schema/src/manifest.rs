//! Package manifests and the dependencies they declare.

use camino::Utf8PathBuf;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::package::PackageName;

/// A package's manifest: its declared dependencies, an optional base hint,
/// and free-form metadata the manifest format may carry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct Manifest {
    /// This package's own name, as declared in its manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// This package's own version, as declared in its manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Declared dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ManifestDependency>,
    /// A previously-detected base path, so installs are reproducible
    /// without re-running base detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<Utf8PathBuf>,
    /// Free-form metadata the manifest format carries that opkg itself
    /// doesn't interpret (author info, descriptions, and the like).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// One dependency entry in a [`Manifest`].
///
/// The fields are mutually constrained (spec §3): presence of `url` marks a
/// Git dependency (with optional `git_ref` and in-repo `path`); `path`
/// alone (no `url`) marks a local dependency; otherwise it's a registry
/// dependency resolved by `version`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestDependency {
    /// The dependency's package name.
    pub name: String,
    /// A SemVer constraint, for registry dependencies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// A Git clone URL. Presence of this field marks the dependency as a
    /// Git dependency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// An optional Git ref (branch, tag, commit) to resolve within `url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// An in-repo or local-filesystem path. Marks a local dependency when
    /// `url` is absent; narrows the checkout when `url` is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// A previously-detected base path for this dependency, recorded so
    /// re-installs don't need to re-run base detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<Utf8PathBuf>,
}

/// What kind of dependency a [`ManifestDependency`] actually describes,
/// derived from which fields are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// Resolved by SemVer constraint against the registry.
    Registry,
    /// Resolved by cloning `url` (optionally pinned to `git_ref`, optionally
    /// narrowed to `path` within the clone).
    Git,
    /// Resolved from a local directory or tarball at `path`.
    Local,
}

/// An error produced when a [`ManifestDependency`]'s fields are mutually
/// inconsistent (this should never happen for manifests that passed
/// [`ManifestDependency::kind`], but a manifest may still have a `url` with
/// no name, etc. — callers validate at load time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DependencyShapeError {
    /// Both `url` and a sibling field combination that only makes sense
    /// without `url` were present in a way the manifest format itself
    /// should have already rejected (defensive; kept for completeness).
    #[error("dependency has no name")]
    MissingName,
}

impl ManifestDependency {
    /// Classify this dependency per the mutual-constraint rules in spec §3.
    pub fn kind(&self) -> DependencyKind {
        if self.url.is_some() {
            DependencyKind::Git
        } else if self.path.is_some() {
            DependencyKind::Local
        } else {
            DependencyKind::Registry
        }
    }

    /// The normalized name of this dependency's target package.
    pub fn package_name(&self) -> PackageName {
        PackageName::normalize(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(name: &str) -> ManifestDependency {
        ManifestDependency {
            name: name.to_string(),
            version: None,
            url: None,
            git_ref: None,
            path: None,
            base: None,
        }
    }

    #[test]
    fn classifies_registry_dependency() {
        let mut d = dep("tech");
        d.version = Some("^1.0".into());
        assert_eq!(d.kind(), DependencyKind::Registry);
    }

    #[test]
    fn classifies_git_dependency_even_with_path() {
        let mut d = dep("tech");
        d.url = Some("https://example.com/tech.git".into());
        d.path = Some("packages/tech".into());
        assert_eq!(d.kind(), DependencyKind::Git);
    }

    #[test]
    fn classifies_local_dependency() {
        let mut d = dep("tech");
        d.path = Some("../tech".into());
        assert_eq!(d.kind(), DependencyKind::Local);
    }
}
