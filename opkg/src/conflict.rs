//! The conflict & priority resolver: given every flow write
//! a batch of packages wants to make, decide per target whether the
//! writers are compatible (mergeable, disjoint keys) or must be
//! arbitrated by priority, and whether a losing write is dropped or
//! relocated under a per-package namespace.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use opkg_schema::{ConflictReport, LoserRecord, MergeStrategy, PackageName};

use crate::flow::FlowWrite;

/// One package's flow output for a single install, keyed by the priority
/// the wave resolver (or an explicit manifest priority) assigned it.
///
/// Lower numeric priority wins a conflict — a root dependency resolved
/// first (priority 0) always beats one pulled in transitively later,
/// matching the default `install-order` conflict policy (`config.rs`).
#[derive(Debug, Clone)]
pub struct PackageWrites {
    pub package: PackageName,
    pub priority: i64,
    pub writes: Vec<FlowWrite>,
}

/// The arbitrated outcome for one target path.
#[derive(Debug, Clone)]
pub struct Decision {
    pub target: Utf8PathBuf,
    /// Writes to actually commit, each tagged with the (possibly
    /// relocated) path it should be written to and its owning package.
    pub commits: Vec<(PackageName, Utf8PathBuf, FlowWrite)>,
    /// Present only when more than one package contended for `target`.
    pub report: Option<ConflictReport>,
}

/// Arbitrate every target path written by `batch`, highest priority first.
///
/// A target is compatible (no report) when every writer's merge strategy
/// is mergeable (`shallow`, `deep`, or `composite`) and the writers'
/// `keys[]` are pairwise disjoint — invariant I3. Otherwise the
/// highest-priority writer wins outright and the rest are relocated
/// under `<original-parent>/_conflicts/<package>/<filename>` (so
/// uninstall can reverse the relocation by name alone).
pub fn resolve(batch: &[PackageWrites]) -> Vec<Decision> {
    let mut by_target: HashMap<Utf8PathBuf, Vec<(PackageName, i64, FlowWrite)>> = HashMap::new();
    for pw in batch {
        for write in &pw.writes {
            by_target
                .entry(write.target.clone())
                .or_default()
                .push((pw.package.clone(), pw.priority, write.clone()));
        }
    }

    let mut decisions: Vec<Decision> = by_target
        .into_iter()
        .map(|(target, mut writers)| {
            writers.sort_by(|a, b| a.1.cmp(&b.1));

            if writers.len() == 1 {
                let (package, _priority, write) = writers.into_iter().next().unwrap();
                return Decision {
                    target,
                    commits: vec![(package, write.target.clone(), write)],
                    report: None,
                };
            }

            if all_compatible(&writers) {
                let commits = writers
                    .into_iter()
                    .map(|(package, _priority, write)| {
                        let path = write.target.clone();
                        (package, path, write)
                    })
                    .collect();
                return Decision {
                    target,
                    commits,
                    report: None,
                };
            }

            let (winner, _winner_priority, winner_write) = writers.remove(0);
            let mut losers = Vec::new();
            let mut commits = vec![(winner.clone(), winner_write.target.clone(), winner_write)];
            for (package, _priority, write) in writers {
                let relocated = relocate(&target, &package);
                losers.push(LoserRecord {
                    package: package.clone(),
                    relocated_to: Some(relocated.clone()),
                });
                let mut relocated_write = write;
                relocated_write.target = relocated.clone();
                commits.push((package, relocated, relocated_write));
            }

            Decision {
                target: target.clone(),
                commits,
                report: Some(ConflictReport {
                    target,
                    winner,
                    losers,
                }),
            }
        })
        .collect();

    decisions.sort_by(|a, b| a.target.cmp(&b.target));
    decisions
}

fn all_compatible(writers: &[(PackageName, i64, FlowWrite)]) -> bool {
    let mut seen_keys: Vec<&str> = Vec::new();
    for (_, _, write) in writers {
        if !matches!(
            write.merge,
            MergeStrategy::Shallow | MergeStrategy::Deep | MergeStrategy::Composite
        ) {
            return false;
        }
        for key in &write.keys {
            if seen_keys.contains(&key.as_str()) {
                return false;
            }
        }
        seen_keys.extend(write.keys.iter().map(String::as_str));
    }
    true
}

fn relocate(target: &Utf8Path, package: &PackageName) -> Utf8PathBuf {
    let parent = target.parent().unwrap_or_else(|| Utf8Path::new(""));
    let filename = target.file_name().unwrap_or("target");
    parent.join("_conflicts").join(package.as_str()).join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(target: &str, merge: MergeStrategy, keys: &[&str]) -> FlowWrite {
        FlowWrite {
            source_file: "src.json".into(),
            target: target.into(),
            merge,
            keys: keys.iter().map(|s| s.to_string()).collect(),
            incoming: opkg_schema::Doc::empty_object(),
            rendered: "{}".to_string(),
            conflicts: vec![],
        }
    }

    #[test]
    fn single_writer_commits_unchanged() {
        let batch = vec![PackageWrites {
            package: PackageName::normalize("tech"),
            priority: 0,
            writes: vec![write(".cursor/rules/tech.mdc", MergeStrategy::Replace, &[])],
        }];
        let decisions = resolve(&batch);
        assert_eq!(decisions.len(), 1);
        assert!(decisions[0].report.is_none());
        assert_eq!(decisions[0].commits.len(), 1);
    }

    #[test]
    fn disjoint_deep_merge_keys_is_compatible() {
        let batch = vec![
            PackageWrites {
                package: PackageName::normalize("tech"),
                priority: 0,
                writes: vec![write(".cursor/mcp.json", MergeStrategy::Deep, &["mcpServers.tech.url"])],
            },
            PackageWrites {
                package: PackageName::normalize("other"),
                priority: 1,
                writes: vec![write(".cursor/mcp.json", MergeStrategy::Deep, &["mcpServers.other.url"])],
            },
        ];
        let decisions = resolve(&batch);
        assert_eq!(decisions.len(), 1);
        assert!(decisions[0].report.is_none());
        assert_eq!(decisions[0].commits.len(), 2);
    }

    #[test]
    fn replace_strategy_conflict_relocates_loser() {
        let batch = vec![
            PackageWrites {
                package: PackageName::normalize("tech"),
                priority: 0,
                writes: vec![write(".cursor/rules/shared.mdc", MergeStrategy::Replace, &[])],
            },
            PackageWrites {
                package: PackageName::normalize("other"),
                priority: 1,
                writes: vec![write(".cursor/rules/shared.mdc", MergeStrategy::Replace, &[])],
            },
        ];
        let decisions = resolve(&batch);
        assert_eq!(decisions.len(), 1);
        let decision = &decisions[0];
        let report = decision.report.as_ref().unwrap();
        assert_eq!(report.winner, PackageName::normalize("tech"));
        assert_eq!(report.losers.len(), 1);
        assert_eq!(report.losers[0].package, PackageName::normalize("other"));
        let relocated = report.losers[0].relocated_to.as_ref().unwrap();
        assert!(relocated.as_str().contains("_conflicts/other/"));
    }

    #[test]
    fn overlapping_keys_in_deep_merge_is_a_conflict() {
        let batch = vec![
            PackageWrites {
                package: PackageName::normalize("tech"),
                priority: 0,
                writes: vec![write(".cursor/mcp.json", MergeStrategy::Deep, &["mcpServers.tech.url"])],
            },
            PackageWrites {
                package: PackageName::normalize("other"),
                priority: 1,
                writes: vec![write(".cursor/mcp.json", MergeStrategy::Deep, &["mcpServers.tech.url"])],
            },
        ];
        let decisions = resolve(&batch);
        assert!(decisions[0].report.is_some());
    }
}
