//! The uninstall engine: precisely remove one package's
//! contribution to the workspace — whole files for bare targets, just the
//! tracked keys for merged ones — then prune directories left empty.

use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};
use opkg_schema::{Doc, MergeStrategy, PackageName, TargetMapping, WorkspaceIndex};

use crate::errors::Result;
use crate::flow::merge::composite_remove;
use crate::formats;
use crate::index;

/// What happened to one target during an uninstall.
#[derive(Debug, Clone)]
pub enum TargetAction {
    /// The whole file was deleted.
    Deleted(Utf8PathBuf),
    /// The tracked keys were removed and the file rewritten.
    Rewritten(Utf8PathBuf),
    /// The tracked keys were removed and the result was empty, so the
    /// file was deleted too.
    EmptiedAndDeleted(Utf8PathBuf),
    /// The target no longer existed on disk; nothing to do.
    AlreadyGone(Utf8PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct UninstallOutcome {
    pub actions: Vec<TargetAction>,
    pub directories_removed: Vec<Utf8PathBuf>,
}

/// Compute what `index` becomes once `package`'s entries (restricted to
/// `source_keys` if given) are removed, without touching any files on
/// disk. The caller persists this *before* running [`apply_file_removals`]
/// so a crash or I/O failure partway through the file side never leaves
/// the durable index claiming ownership of files that are gone, or
/// silent about files that remain.
pub fn plan_removal(
    index: &WorkspaceIndex,
    package: &PackageName,
    source_keys: Option<&[Utf8PathBuf]>,
) -> WorkspaceIndex {
    let mut next = index.clone();
    let Some(entry) = index.packages.get(package) else {
        return next;
    };

    let mut remaining_files = entry.files.clone();
    for source_file in entry.files.keys() {
        if let Some(keys) = source_keys {
            if !keys.contains(source_file) {
                continue;
            }
        }
        remaining_files.remove(source_file);
    }

    if remaining_files.is_empty() {
        index::remove_package(&mut next, package);
    } else {
        next.packages.get_mut(package).unwrap().files = remaining_files;
    }
    next
}

/// Perform the file-side half of an uninstall for `package`'s `entry`
/// (the index entry as it stood before [`plan_removal`] ran), restricted
/// to `source_keys` if given.
///
/// `read_target`/`write_target`/`delete_target` perform the file I/O;
/// `preserved_dirs` (a platform's `root_dir`s) are never removed even if
/// they end up empty. The index itself is not touched here — the caller
/// has already persisted the post-removal index via [`plan_removal`], and
/// is expected to restore the pre-removal snapshot if this returns an
/// error partway through.
#[allow(clippy::too_many_arguments)]
pub fn apply_file_removals(
    entry: &opkg_schema::PackageIndexEntry,
    package: &PackageName,
    source_keys: Option<&[Utf8PathBuf]>,
    workspace_root: &Utf8Path,
    preserved_dirs: &[Utf8PathBuf],
    read_target: &dyn Fn(&Utf8Path) -> Option<String>,
    write_target: &mut dyn FnMut(&Utf8Path, &str) -> Result<()>,
    delete_target: &mut dyn FnMut(&Utf8Path) -> Result<()>,
    dir_is_empty: &dyn Fn(&Utf8Path) -> bool,
) -> Result<UninstallOutcome> {
    let mut outcome = UninstallOutcome::default();
    let mut touched_dirs: BTreeSet<Utf8PathBuf> = BTreeSet::new();

    for (source_file, mappings) in &entry.files {
        if let Some(keys) = source_keys {
            if !keys.contains(source_file) {
                continue;
            }
        }
        for mapping in mappings {
            let action = uninstall_one(package, mapping, read_target, write_target, delete_target)?;
            if let Some(parent) = action_path(&action).parent() {
                touched_dirs.insert(parent.to_path_buf());
            }
            outcome.actions.push(action);
        }
    }

    for dir in touched_dirs {
        prune_upward(&dir, workspace_root, preserved_dirs, dir_is_empty, &mut outcome.directories_removed);
    }

    Ok(outcome)
}

fn action_path(action: &TargetAction) -> &Utf8Path {
    match action {
        TargetAction::Deleted(p)
        | TargetAction::Rewritten(p)
        | TargetAction::EmptiedAndDeleted(p)
        | TargetAction::AlreadyGone(p) => p,
    }
}

fn uninstall_one(
    package: &PackageName,
    mapping: &TargetMapping,
    read_target: &dyn Fn(&Utf8Path) -> Option<String>,
    write_target: &mut dyn FnMut(&Utf8Path, &str) -> Result<()>,
    delete_target: &mut dyn FnMut(&Utf8Path) -> Result<()>,
) -> Result<TargetAction> {
    let target = mapping.target_path();
    let Some(content) = read_target(target) else {
        return Ok(TargetAction::AlreadyGone(target.clone()));
    };

    match mapping {
        TargetMapping::Bare(_) => {
            delete_target(target)?;
            Ok(TargetAction::Deleted(target.clone()))
        }
        TargetMapping::Structured { merge: MergeStrategy::Composite, .. } => {
            let rewritten = composite_remove(&content, package);
            if rewritten.trim().is_empty() {
                delete_target(target)?;
                Ok(TargetAction::EmptiedAndDeleted(target.clone()))
            } else {
                write_target(target, &rewritten)?;
                Ok(TargetAction::Rewritten(target.clone()))
            }
        }
        TargetMapping::Structured { merge, keys, .. } => {
            if !matches!(merge, MergeStrategy::Deep | MergeStrategy::Shallow) || keys.is_empty() {
                delete_target(target)?;
                return Ok(TargetAction::Deleted(target.clone()));
            }
            let format = formats::format_for_path(target);
            let mut doc = formats::parse(&content, format)?;
            for key in keys {
                doc.remove_path(key);
            }
            if doc.is_empty_value() {
                delete_target(target)?;
                Ok(TargetAction::EmptiedAndDeleted(target.clone()))
            } else {
                let rewritten = formats::serialize(&doc, format)?;
                write_target(target, &rewritten)?;
                Ok(TargetAction::Rewritten(target.clone()))
            }
        }
    }
}

/// Walk upward from `start`, removing directories found empty, stopping
/// at `workspace_root` or any `preserved_dirs` entry.
fn prune_upward(
    start: &Utf8Path,
    workspace_root: &Utf8Path,
    preserved_dirs: &[Utf8PathBuf],
    dir_is_empty: &dyn Fn(&Utf8Path) -> bool,
    removed: &mut Vec<Utf8PathBuf>,
) {
    let mut current = start.to_path_buf();
    loop {
        if current == workspace_root || !current.starts_with(workspace_root) {
            break;
        }
        if preserved_dirs.iter().any(|p| current == *p) {
            break;
        }
        if !dir_is_empty(&current) {
            break;
        }
        if axoasset::LocalAsset::remove_dir(&current).is_ok() {
            removed.push(current.clone());
        } else {
            break;
        }
        let Some(parent) = current.parent() else { break };
        current = parent.to_path_buf();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opkg_schema::PackageIndexEntry;
    use std::cell::RefCell;
    use std::collections::BTreeMap as Map;

    fn index_with_bare_target(package: &str, target: &str) -> WorkspaceIndex {
        let mut index = WorkspaceIndex::default();
        let mut files = Map::new();
        files.insert(
            Utf8PathBuf::from("rules/tech.mdc"),
            vec![TargetMapping::Bare(Utf8PathBuf::from(target))],
        );
        index.packages.insert(
            PackageName::normalize(package),
            PackageIndexEntry {
                version: None,
                path: "/pkgs/tech".into(),
                files,
            },
        );
        index
    }

    #[test]
    fn bare_target_is_deleted_and_entry_removed() {
        let index = index_with_bare_target("tech", ".cursor/rules/tech.mdc");
        let package = PackageName::normalize("tech");
        let entry = index.packages.get(&package).cloned().unwrap();
        let planned = plan_removal(&index, &package, None);
        assert!(!index::is_fully_installed(&planned, &package));

        let deleted = RefCell::new(Vec::new());
        let outcome = apply_file_removals(
            &entry,
            &package,
            None,
            Utf8Path::new("/work"),
            &[],
            &|_| Some("content".to_string()),
            &mut |_, _| Ok(()),
            &mut |p| {
                deleted.borrow_mut().push(p.to_path_buf());
                Ok(())
            },
            &|_| false,
        )
        .unwrap();

        assert_eq!(deleted.borrow().len(), 1);
        assert!(matches!(outcome.actions[0], TargetAction::Deleted(_)));
    }

    #[test]
    fn structured_target_keeps_file_when_other_keys_remain() {
        let mut index = WorkspaceIndex::default();
        let mut files = Map::new();
        files.insert(
            Utf8PathBuf::from("mcp.jsonc"),
            vec![TargetMapping::Structured {
                target: Utf8PathBuf::from(".cursor/mcp.json"),
                merge: MergeStrategy::Deep,
                keys: vec!["mcpServers.tech.url".to_string()],
            }],
        );
        index.packages.insert(
            PackageName::normalize("tech"),
            PackageIndexEntry {
                version: None,
                path: "/pkgs/tech".into(),
                files,
            },
        );

        let written = RefCell::new(Vec::new());
        let content = serde_json::json!({
            "mcpServers": {"tech": {"url": "https://a"}, "other": {"url": "https://b"}}
        })
        .to_string();

        let package = PackageName::normalize("tech");
        let entry = index.packages.get(&package).cloned().unwrap();

        apply_file_removals(
            &entry,
            &package,
            None,
            Utf8Path::new("/work"),
            &[],
            &|_| Some(content.clone()),
            &mut |p, s| {
                written.borrow_mut().push((p.to_path_buf(), s.to_string()));
                Ok(())
            },
            &mut |_| Ok(()),
            &|_| false,
        )
        .unwrap();

        assert_eq!(written.borrow().len(), 1);
        let (_, rewritten) = &written.borrow()[0];
        let doc: Doc = Doc::from(serde_json::from_str::<serde_json::Value>(rewritten).unwrap());
        assert!(doc.get_path("mcpServers.tech").is_none());
        assert!(doc.get_path("mcpServers.other.url").is_some());
    }

    #[test]
    fn composite_target_removes_only_this_package_block() {
        let mut index = WorkspaceIndex::default();
        let mut files = Map::new();
        files.insert(
            Utf8PathBuf::from("rules/tech.md"),
            vec![TargetMapping::Structured {
                target: Utf8PathBuf::from("AGENTS.md"),
                merge: MergeStrategy::Composite,
                keys: vec![],
            }],
        );
        index.packages.insert(
            PackageName::normalize("tech"),
            PackageIndexEntry {
                version: None,
                path: "/pkgs/tech".into(),
                files,
            },
        );

        let content = "intro\n<!-- opkg:begin tech -->\ntech body\n<!-- opkg:end tech -->\n<!-- opkg:begin other -->\nother body\n<!-- opkg:end other -->\n".to_string();
        let written = RefCell::new(Vec::new());

        let package = PackageName::normalize("tech");
        let entry = index.packages.get(&package).cloned().unwrap();

        let outcome = apply_file_removals(
            &entry,
            &package,
            None,
            Utf8Path::new("/work"),
            &[],
            &|_| Some(content.clone()),
            &mut |p, s| {
                written.borrow_mut().push((p.to_path_buf(), s.to_string()));
                Ok(())
            },
            &mut |_| Ok(()),
            &|_| false,
        )
        .unwrap();

        assert_eq!(written.borrow().len(), 1);
        let (_, rewritten) = &written.borrow()[0];
        assert!(!rewritten.contains("opkg:begin tech"));
        assert!(rewritten.contains("opkg:begin other"));
        assert!(rewritten.contains("other body"));
        assert!(matches!(outcome.actions[0], TargetAction::Rewritten(_)));
    }

    #[test]
    fn composite_target_deletes_file_when_last_block_removed() {
        let mut index = WorkspaceIndex::default();
        let mut files = Map::new();
        files.insert(
            Utf8PathBuf::from("rules/tech.md"),
            vec![TargetMapping::Structured {
                target: Utf8PathBuf::from("AGENTS.md"),
                merge: MergeStrategy::Composite,
                keys: vec![],
            }],
        );
        index.packages.insert(
            PackageName::normalize("tech"),
            PackageIndexEntry {
                version: None,
                path: "/pkgs/tech".into(),
                files,
            },
        );

        let content = "<!-- opkg:begin tech -->\ntech body\n<!-- opkg:end tech -->\n".to_string();
        let deleted = RefCell::new(Vec::new());

        let package = PackageName::normalize("tech");
        let entry = index.packages.get(&package).cloned().unwrap();

        let outcome = apply_file_removals(
            &entry,
            &package,
            None,
            Utf8Path::new("/work"),
            &[],
            &|_| Some(content.clone()),
            &mut |_, _| Ok(()),
            &mut |p| {
                deleted.borrow_mut().push(p.to_path_buf());
                Ok(())
            },
            &|_| false,
        )
        .unwrap();

        assert_eq!(deleted.borrow().len(), 1);
        assert!(matches!(outcome.actions[0], TargetAction::EmptiedAndDeleted(_)));
    }
}
