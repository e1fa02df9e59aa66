//! Merge strategies: how a flow's source content
//! combines with a pre-existing workspace target.

use opkg_schema::{Doc, MergeStrategy, PackageName, ScalarConflict};

/// The textual marker opkg wraps a package's contribution in for
/// [`MergeStrategy::Composite`] targets, so the contribution can be
/// located and individually removed later without disturbing any other
/// package's block in the same file.
const BLOCK_START_PREFIX: &str = "<!-- opkg:begin ";
const BLOCK_END_PREFIX: &str = "<!-- opkg:end ";
const BLOCK_SUFFIX: &str = " -->";

/// Merge `incoming` into `existing` per `strategy`, returning the merged
/// document and any scalar conflicts recorded along the way (deep merge
/// only; the other strategies can't produce one by construction).
///
/// `package` names whose incoming value wins a scalar conflict; the loser
/// side is left for the caller to fill in (merge.rs has no visibility into
/// which package previously owned the overwritten value — that's the
/// workspace index's job, see `opkg::index`).
pub fn merge(
    existing: &Doc,
    incoming: &Doc,
    strategy: MergeStrategy,
    package: &PackageName,
) -> (Doc, Vec<ScalarConflict>) {
    match strategy {
        MergeStrategy::Replace => (incoming.clone(), Vec::new()),
        MergeStrategy::Shallow => (merge_shallow(existing, incoming), Vec::new()),
        MergeStrategy::Deep => {
            let mut conflicts = Vec::new();
            let merged = merge_deep(existing, incoming, package, "", &mut conflicts);
            (merged, conflicts)
        }
        MergeStrategy::Composite => {
            // Composite merging is text-level, not
            // structural; the flow engine handles it directly against raw
            // file contents via [`composite_merge`] rather than routing
            // through this `Doc`-shaped entry point.
            (incoming.clone(), Vec::new())
        }
    }
}

fn merge_shallow(existing: &Doc, incoming: &Doc) -> Doc {
    match (existing, incoming) {
        (Doc::Object(e), Doc::Object(i)) => {
            let mut out = e.clone();
            for (k, v) in i {
                out.insert(k.clone(), v.clone());
            }
            Doc::Object(out)
        }
        _ => incoming.clone(),
    }
}

fn merge_deep(
    existing: &Doc,
    incoming: &Doc,
    package: &PackageName,
    path: &str,
    conflicts: &mut Vec<ScalarConflict>,
) -> Doc {
    match (existing, incoming) {
        (Doc::Object(e), Doc::Object(i)) => {
            let mut out = e.clone();
            for (k, v) in i {
                let child_path = if path.is_empty() {
                    k.clone()
                } else {
                    format!("{path}.{k}")
                };
                let merged = match out.get(k) {
                    Some(existing_v) => merge_deep(existing_v, v, package, &child_path, conflicts),
                    None => v.clone(),
                };
                out.insert(k.clone(), merged);
            }
            Doc::Object(out)
        }
        (Doc::Array(e), Doc::Array(i)) => {
            let mut out = e.clone();
            out.extend(i.clone());
            Doc::Array(out)
        }
        (existing_scalar, incoming_scalar) => {
            if !existing_scalar.is_null() && existing_scalar != incoming_scalar {
                conflicts.push(ScalarConflict {
                    path: path.to_string(),
                    winner: package.clone(),
                    losers: Vec::new(),
                });
            }
            incoming_scalar.clone()
        }
    }
}

/// Insert or replace `package`'s delimited contribution (`incoming_text`)
/// inside `existing_text`, a [`MergeStrategy::Composite`] target's raw
/// contents.
pub fn composite_merge(existing_text: &str, incoming_text: &str, package: &PackageName) -> String {
    let start = format!("{BLOCK_START_PREFIX}{package}{BLOCK_SUFFIX}");
    let end = format!("{BLOCK_END_PREFIX}{package}{BLOCK_SUFFIX}");
    let block = format!("{start}\n{incoming_text}\n{end}");

    match find_block(existing_text, &start, &end) {
        Some((block_start, block_end)) => {
            format!(
                "{}{}{}",
                &existing_text[..block_start],
                block,
                &existing_text[block_end..]
            )
        }
        None => {
            let mut out = existing_text.to_string();
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&block);
            out.push('\n');
            out
        }
    }
}

/// Remove `package`'s delimited block from `existing_text`, leaving every
/// other package's contribution untouched — uninstalling one composite
/// contributor doesn't disturb a co-installed one.
pub fn composite_remove(existing_text: &str, package: &PackageName) -> String {
    let start = format!("{BLOCK_START_PREFIX}{package}{BLOCK_SUFFIX}");
    let end = format!("{BLOCK_END_PREFIX}{package}{BLOCK_SUFFIX}");
    match find_block(existing_text, &start, &end) {
        Some((block_start, block_end)) => {
            format!("{}{}", &existing_text[..block_start], &existing_text[block_end..])
        }
        None => existing_text.to_string(),
    }
}

fn find_block(text: &str, start_marker: &str, end_marker: &str) -> Option<(usize, usize)> {
    let start = text.find(start_marker)?;
    let rest = &text[start..];
    let end_rel = rest.find(end_marker)?;
    let end = start + end_rel + end_marker.len();
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn pkg() -> PackageName {
        PackageName::normalize("tech")
    }

    #[test]
    fn scenario_1_deep_merge_with_key_tracking() {
        let mut existing = IndexMap::new();
        let mut existing_servers = IndexMap::new();
        let mut existing_entry = IndexMap::new();
        existing_entry.insert("url".to_string(), Doc::String("https://e".into()));
        existing_servers.insert("existing".to_string(), Doc::Object(existing_entry));
        existing.insert("mcpServers".to_string(), Doc::Object(existing_servers));
        let existing = Doc::Object(existing);

        let mut incoming = IndexMap::new();
        let mut incoming_servers = IndexMap::new();
        let mut incoming_entry = IndexMap::new();
        incoming_entry.insert("url".to_string(), Doc::String("https://t".into()));
        incoming_servers.insert("tech".to_string(), Doc::Object(incoming_entry));
        incoming.insert("mcpServers".to_string(), Doc::Object(incoming_servers));
        let incoming = Doc::Object(incoming);

        let (merged, conflicts) = merge(&existing, &incoming, MergeStrategy::Deep, &pkg());
        assert!(conflicts.is_empty());
        assert_eq!(
            merged.get_path("mcpServers.existing.url"),
            Some(&Doc::String("https://e".into()))
        );
        assert_eq!(
            merged.get_path("mcpServers.tech.url"),
            Some(&Doc::String("https://t".into()))
        );
    }

    #[test]
    fn deep_merge_records_scalar_conflict_source_wins() {
        let mut existing = IndexMap::new();
        existing.insert("value".to_string(), Doc::String("old".into()));
        let existing = Doc::Object(existing);

        let mut incoming = IndexMap::new();
        incoming.insert("value".to_string(), Doc::String("new".into()));
        let incoming = Doc::Object(incoming);

        let (merged, conflicts) = merge(&existing, &incoming, MergeStrategy::Deep, &pkg());
        assert_eq!(merged.get_path("value"), Some(&Doc::String("new".into())));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, "value");
    }

    #[test]
    fn deep_merge_concatenates_arrays() {
        let existing = Doc::Array(vec![Doc::String("a".into())]);
        let incoming = Doc::Array(vec![Doc::String("b".into())]);
        let (merged, _) = merge(&existing, &incoming, MergeStrategy::Deep, &pkg());
        assert_eq!(
            merged,
            Doc::Array(vec![Doc::String("a".into()), Doc::String("b".into())])
        );
    }

    #[test]
    fn composite_merge_and_remove_round_trip_without_disturbing_other_packages() {
        let other = PackageName::normalize("other");
        let base = "# Rules\n".to_string();
        let with_other = composite_merge(&base, "other's rule", &other);
        let with_both = composite_merge(&with_other, "tech's rule", &pkg());
        assert!(with_both.contains("other's rule"));
        assert!(with_both.contains("tech's rule"));

        let removed_tech = composite_remove(&with_both, &pkg());
        assert!(!removed_tech.contains("tech's rule"));
        assert!(removed_tech.contains("other's rule"));
    }

    #[test]
    fn composite_merge_replaces_existing_block_for_same_package() {
        let base = "intro\n".to_string();
        let first = composite_merge(&base, "v1", &pkg());
        let second = composite_merge(&first, "v2", &pkg());
        assert!(!second.contains("v1"));
        assert!(second.contains("v2"));
    }
}
