//! The workspace index: the durable, human-readable document mapping
//! installed packages to the files they wrote and the keys they own
//! inside merged targets.

use camino::Utf8PathBuf;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::flow::MergeStrategy;
use crate::package::PackageName;

/// A canonically-ordered map, used wherever the spec calls for a stable,
/// sorted on-disk document (the workspace index file itself, and the
/// per-package/per-file maps inside it) rather than insertion order.
pub type SortedMap<K, V> = BTreeMap<K, V>;

/// The whole persisted workspace index: `packageName -> entry`.
///
/// Reads tolerate a missing file (treated as an empty index, per spec
/// §4.7); this type's [`Default`] is exactly that empty state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct WorkspaceIndex {
    /// One entry per installed package.
    #[serde(default, skip_serializing_if = "SortedMap::is_empty")]
    pub packages: SortedMap<PackageName, PackageIndexEntry>,
}

/// One installed package's entry in the [`WorkspaceIndex`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct PackageIndexEntry {
    /// The installed version, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Where this package's content root was loaded from (kept so `save`
    /// and re-install can find it again without re-resolving the source).
    pub path: Utf8PathBuf,
    /// `sourceKey -> [targetMapping...]`: for every source file this
    /// package contributed from, which workspace targets it wrote and how.
    #[serde(default, skip_serializing_if = "SortedMap::is_empty")]
    pub files: SortedMap<Utf8PathBuf, Vec<TargetMapping>>,
}

/// One target a package wrote, for one of its source files.
///
/// A bare mapping (just a path) is used for `replace`-merged or brand-new
/// targets; a structured mapping additionally records the merge strategy
/// and the leaf key paths this package owns inside the target, so
/// uninstall can remove exactly those keys.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TargetMapping {
    /// A target this package owns outright.
    Bare(Utf8PathBuf),
    /// A target this package co-owns with other packages via a merge
    /// strategy, differentiated by the listed keys.
    Structured {
        /// The target path.
        target: Utf8PathBuf,
        /// The merge strategy that produced this target.
        merge: MergeStrategy,
        /// The leaf key paths (dotted) this package contributed.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        keys: Vec<String>,
    },
}

impl TargetMapping {
    /// The target path, regardless of which variant this is.
    pub fn target_path(&self) -> &Utf8PathBuf {
        match self {
            TargetMapping::Bare(path) => path,
            TargetMapping::Structured { target, .. } => target,
        }
    }

    /// The contributed keys, if this is a [`TargetMapping::Structured`]
    /// entry with `merge` in `{deep, shallow}`.
    pub fn keys(&self) -> &[String] {
        match self {
            TargetMapping::Bare(_) => &[],
            TargetMapping::Structured { keys, .. } => keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_index_round_trips_through_json() {
        let index = WorkspaceIndex::default();
        let json = serde_json::to_string(&index).unwrap();
        let back: WorkspaceIndex = serde_json::from_str(&json).unwrap();
        assert!(back.packages.is_empty());
    }

    #[test]
    fn bare_and_structured_mappings_deserialize() {
        let bare: TargetMapping = serde_json::from_str(r#"".cursor/rules/tech.mdc""#).unwrap();
        assert_eq!(bare.target_path().as_str(), ".cursor/rules/tech.mdc");

        let structured: TargetMapping = serde_json::from_str(
            r#"{"target": ".cursor/mcp.json", "merge": "deep", "keys": ["mcpServers.tech.url"]}"#,
        )
        .unwrap();
        assert_eq!(structured.keys(), &["mcpServers.tech.url".to_string()]);
    }
}
