//! The workspace index service: load/persist the durable
//! `opkg_schema::WorkspaceIndex` document and apply the bookkeeping updates
//! every command produces.

use camino::{Utf8Path, Utf8PathBuf};
use opkg_schema::{MergeStrategy, PackageIndexEntry, PackageName, TargetMapping, WorkspaceIndex};

use crate::errors::Result;
use crate::flow::FlowWrite;

/// The file the workspace index is persisted under, relative to the
/// workspace root.
pub const INDEX_FILENAME: &str = "opkg.index.json";

/// Load the workspace index from `workspace_root`. A missing file is not
/// an error — it's the empty index.
pub fn load(workspace_root: &Utf8Path) -> Result<WorkspaceIndex> {
    let path = workspace_root.join(INDEX_FILENAME);
    if !path.exists() {
        return Ok(WorkspaceIndex::default());
    }
    let content = axoasset::LocalAsset::load_string(&path)?;
    serde_json::from_str(&content)
        .map_err(|e| crate::errors::OpkgError::Internal(format!("corrupt workspace index: {e}")))
}

/// Persist `index` to `workspace_root`, replacing the whole file.
///
/// `WorkspaceIndex`'s `SortedMap` fields make this serialization
/// deterministic, so every write is a full, self-consistent replacement —
/// there is no partial/append path. A write is either fully applied or
/// not visible at all.
pub fn save(workspace_root: &Utf8Path, index: &WorkspaceIndex) -> Result<()> {
    let path = workspace_root.join(INDEX_FILENAME);
    let json = serde_json::to_string_pretty(index)
        .map_err(|e| crate::errors::OpkgError::Internal(format!("failed to serialize workspace index: {e}")))?;
    axoasset::LocalAsset::write_new_all(&json, &path)?;
    Ok(())
}

/// Record one package's flow writes (after conflict arbitration has
/// already decided final target paths) into `index`, replacing any
/// previous entry for that package outright.
pub fn record_package(
    index: &mut WorkspaceIndex,
    package: &PackageName,
    version: Option<String>,
    content_root: Utf8PathBuf,
    writes: &[FlowWrite],
) {
    let mut entry = PackageIndexEntry {
        version,
        path: content_root,
        files: Default::default(),
    };
    for write in writes {
        let mapping = if matches!(write.merge, MergeStrategy::Shallow | MergeStrategy::Deep) && !write.keys.is_empty() {
            TargetMapping::Structured {
                target: write.target.clone(),
                merge: write.merge,
                keys: write.keys.clone(),
            }
        } else if matches!(write.merge, MergeStrategy::Composite) {
            TargetMapping::Structured {
                target: write.target.clone(),
                merge: write.merge,
                keys: vec![],
            }
        } else {
            TargetMapping::Bare(write.target.clone())
        };
        entry
            .files
            .entry(write.source_file.clone())
            .or_default()
            .push(mapping);
    }
    index.packages.insert(package.clone(), entry);
}

/// Remove `package`'s entry entirely (used by uninstall once every target
/// it owns has been physically cleaned up).
pub fn remove_package(index: &mut WorkspaceIndex, package: &PackageName) {
    index.packages.remove(package);
}

/// Every target path `package` currently owns, across all its source
/// files, with the mapping describing how it owns it.
pub fn targets_for<'a>(
    index: &'a WorkspaceIndex,
    package: &PackageName,
) -> Vec<(&'a Utf8PathBuf, &'a TargetMapping)> {
    let Some(entry) = index.packages.get(package) else {
        return vec![];
    };
    entry
        .files
        .values()
        .flatten()
        .map(|mapping| (mapping.target_path(), mapping))
        .collect()
}

/// True if `package` is fully installed: it has an index entry at all.
/// Used to check whether a containing package already covers a
/// dependency that would otherwise be installed separately.
pub fn is_fully_installed(index: &WorkspaceIndex, package: &PackageName) -> bool {
    index.packages.contains_key(package)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_package_classifies_mappings() {
        let mut index = WorkspaceIndex::default();
        let writes = vec![
            FlowWrite {
                source_file: "rules/tech.mdc".into(),
                target: ".cursor/rules/tech.mdc".into(),
                merge: MergeStrategy::Replace,
                keys: vec![],
                incoming: opkg_schema::Doc::empty_object(),
                rendered: String::new(),
                conflicts: vec![],
            },
            FlowWrite {
                source_file: "mcp.jsonc".into(),
                target: ".cursor/mcp.json".into(),
                merge: MergeStrategy::Deep,
                keys: vec!["mcpServers.tech.url".to_string()],
                incoming: opkg_schema::Doc::empty_object(),
                rendered: String::new(),
                conflicts: vec![],
            },
        ];
        record_package(
            &mut index,
            &PackageName::normalize("tech"),
            Some("1.0.0".to_string()),
            "/pkgs/tech".into(),
            &writes,
        );
        let targets = targets_for(&index, &PackageName::normalize("tech"));
        assert_eq!(targets.len(), 2);
        assert!(is_fully_installed(&index, &PackageName::normalize("tech")));
        assert!(!is_fully_installed(&index, &PackageName::normalize("other")));
    }

    #[test]
    fn remove_package_clears_entry() {
        let mut index = WorkspaceIndex::default();
        record_package(
            &mut index,
            &PackageName::normalize("tech"),
            None,
            "/pkgs/tech".into(),
            &[],
        );
        remove_package(&mut index, &PackageName::normalize("tech"));
        assert!(!is_fully_installed(&index, &PackageName::normalize("tech")));
    }
}
