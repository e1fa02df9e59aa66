//! Resource discovery: scans a package's detected
//! base for the typed sub-assets — agents, skills, rules, commands, hooks,
//! MCP-server entries — that `--agents`/`--skills`/`--plugins` filters and
//! the `view`/`status` commands report on.
//!
//! Grounded on `opkg_source::base`'s flat walk-and-glob idiom: no new
//! traversal machinery, just a different convention table to match against.

use camino::{Utf8Path, Utf8PathBuf};
use opkg_schema::{Resource, ResourceKind};

use crate::errors::Result;

/// One directory-glob convention a [`ResourceKind`] is recognized by,
/// relative to a package's base. The first convention whose pattern
/// matches a file wins; conventions are tried in [`ResourceKind::ALL`]
/// order so e.g. `agents/` is never miscounted as a generic `rule`.
fn conventions(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Agent => &["agents/**/*", "agent/**/*"],
        ResourceKind::Skill => &["skills/**/*", "skill/**/*"],
        ResourceKind::Rule => &["rules/**/*", "rule/**/*"],
        ResourceKind::Command => &["commands/**/*", "command/**/*"],
        ResourceKind::Hook => &["hooks/**/*", "hook/**/*"],
        ResourceKind::McpServer => &["mcp/**/*", "mcp-servers/**/*", "mcpservers/**/*"],
    }
}

/// Files that never count as a resource on their own even if they'd
/// otherwise fall under a convention directory.
fn is_ignored(rel: &Utf8Path) -> bool {
    let Some(name) = rel.file_name() else { return true };
    name == opkg_source::MANIFEST_FILENAME || name.starts_with('.')
}

/// Derive a resource's display name from its source path: the filename
/// without extension, dots included in a multi-dot name collapsed to the
/// first extension only (`review.skill.md` -> `review.skill`... kept as
/// the full stem, since assistants often encode kind in the stem itself).
fn resource_name(rel: &Utf8Path) -> String {
    rel.file_stem().map(str::to_string).unwrap_or_else(|| rel.as_str().to_string())
}

/// Scan `base` (a directory under a package's content root, already
/// resolved by [`opkg_source::base::detect_base`]) for typed resources.
///
/// `list_files` enumerates every file path relative to `base` (the same
/// shape `opkg_source::base`'s internal walker produces); injected so
/// callers can reuse an existing listing instead of re-walking disk.
pub fn discover(base: &Utf8Path, list_files: &dyn Fn(&Utf8Path) -> Result<Vec<Utf8PathBuf>>) -> Result<Vec<Resource>> {
    let files = list_files(base)?;
    let mut out = Vec::new();

    'file: for rel in files {
        if is_ignored(&rel) {
            continue;
        }
        for kind in ResourceKind::ALL {
            for pattern in conventions(kind) {
                let Ok(glob_pattern) = glob::Pattern::new(pattern) else { continue };
                if glob_pattern.matches(rel.as_str()) {
                    out.push(Resource {
                        kind,
                        name: resource_name(&rel),
                        source_path: rel.clone(),
                    });
                    continue 'file;
                }
            }
        }
    }

    out.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    Ok(out)
}

/// Filter resources by kind and/or name, the shape `--agents <names...>`
/// / `--skills <names...>` / `--plugins <names...>` CLI options need:
/// `kinds` narrows by type (empty = no narrowing), `names` narrows by
/// exact resource name (empty = no narrowing, i.e. "all of these kinds").
pub fn filter<'a>(resources: &'a [Resource], kinds: &[ResourceKind], names: &[String]) -> Vec<&'a Resource> {
    resources
        .iter()
        .filter(|r| kinds.is_empty() || kinds.contains(&r.kind))
        .filter(|r| names.is_empty() || names.iter().any(|n| n == &r.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lister(paths: &'static [&'static str]) -> impl Fn(&Utf8Path) -> Result<Vec<Utf8PathBuf>> {
        move |_| Ok(paths.iter().map(Utf8PathBuf::from).collect())
    }

    #[test]
    fn discovers_each_kind_by_its_convention_directory() {
        let resources = discover(
            Utf8Path::new("base"),
            &lister(&[
                "agents/reviewer.md",
                "skills/summarize.md",
                "rules/tech.mdc",
                "commands/deploy.md",
                "hooks/pre-commit.sh",
                "mcp/server.json",
                "opkg.json",
                "README.md",
            ]),
        )
        .unwrap();

        assert_eq!(resources.len(), 6);
        assert!(resources.iter().any(|r| r.kind == ResourceKind::Agent && r.name == "reviewer"));
        assert!(resources.iter().any(|r| r.kind == ResourceKind::McpServer && r.name == "server"));
        assert!(!resources.iter().any(|r| r.source_path.as_str() == "opkg.json"));
        assert!(!resources.iter().any(|r| r.source_path.as_str() == "README.md"));
    }

    #[test]
    fn filter_narrows_by_kind_and_name() {
        let resources = discover(
            Utf8Path::new("base"),
            &lister(&["agents/reviewer.md", "agents/planner.md", "skills/summarize.md"]),
        )
        .unwrap();

        let agents_only = filter(&resources, &[ResourceKind::Agent], &[]);
        assert_eq!(agents_only.len(), 2);

        let named = filter(&resources, &[], &["planner".to_string()]);
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].name, "planner");
    }
}
