//! The flow engine: runs one platform's global + per-platform
//! flows against a loaded package, producing rendered target content plus
//! the bookkeeping (`keys[]`, scalar conflicts, warnings) the workspace
//! index and conflict resolver need.
//!
//! This module performs no I/O itself — `read_source`/`read_target`
//! closures are supplied by the caller (`ops::install`), which is what
//! keeps the step-by-step pipeline below unit-testable without a real
//! filesystem.

use camino::{Utf8Path, Utf8PathBuf};
use opkg_schema::{Doc, Flow, MapOp, MergeStrategy, ScalarConflict, ToTarget};

use crate::errors::{OpkgError, Result};
use crate::flow::context::FlowContext;
use crate::flow::{merge as merge_ops, target, when};

/// One target a single matched source file rendered, ready to be written
/// and recorded in the workspace index.
#[derive(Debug, Clone)]
pub struct FlowWrite {
    /// The source file (relative to the package base) that produced this
    /// write.
    pub source_file: Utf8PathBuf,
    /// The workspace-relative target path.
    pub target: Utf8PathBuf,
    /// The merge strategy this target was written with.
    pub merge: MergeStrategy,
    /// This package's contributed leaf key paths, if `merge` is
    /// `deep`/`shallow`.
    pub keys: Vec<String>,
    /// This package's own contribution, after pick/omit/map-ops/embed but
    /// before merging against any pre-existing target content. Kept
    /// alongside `rendered` so a caller folding several compatible
    /// writers onto the same target can re-merge each one's contribution
    /// in turn, rather than relying on `rendered` (which was computed
    /// against the pre-command target and would clobber a sibling
    /// writer's contribution if written as-is).
    pub incoming: Doc,
    /// The final file content to write, as if this were the only writer
    /// for this target.
    pub rendered: String,
    /// Scalar conflicts recorded during a `deep` merge against a
    /// pre-existing target.
    pub conflicts: Vec<ScalarConflict>,
}

/// Everything one `run_flows` call produced: writes, non-fatal warnings
/// (a flow emits one when it skips lower-priority `from` patterns that
/// also matched), and per-flow failures that didn't abort the rest of
/// the run.
#[derive(Debug, Clone, Default)]
pub struct FlowRunOutcome {
    /// Every rendered write produced across all flows.
    pub writes: Vec<FlowWrite>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
    /// Per-flow failure messages (the flow that failed is named in the
    /// message; siblings still ran).
    pub failures: Vec<String>,
}

/// Run `flows` (global flows followed by platform-specific flows, already
/// concatenated by the caller) against a package whose base-relative file
/// list is `files`.
pub fn run_flows(
    flows: &[&Flow],
    files: &[Utf8PathBuf],
    ctx: &FlowContext,
    read_source: &dyn Fn(&Utf8Path) -> Result<String>,
    read_target: &dyn Fn(&Utf8Path) -> Option<String>,
) -> FlowRunOutcome {
    let mut outcome = FlowRunOutcome::default();

    for flow in flows {
        let Some(resolution) = target::resolve_from(&flow.from, files) else {
            continue;
        };
        for skipped in &resolution.skipped_patterns {
            outcome.warnings.push(format!(
                "pattern `{skipped}` also matched files but was skipped in favor of higher-priority pattern `{}`",
                resolution.matched_pattern
            ));
        }
        for source_file in &resolution.files {
            if let Err(e) = process_source(
                flow,
                &resolution.matched_pattern,
                source_file,
                ctx,
                read_source,
                read_target,
                &mut outcome,
            ) {
                outcome.failures.push(format!("{source_file}: {e}"));
            }
        }
    }

    outcome
}

fn process_source(
    flow: &Flow,
    from_pattern: &str,
    source_file: &Utf8Path,
    ctx: &FlowContext,
    read_source: &dyn Fn(&Utf8Path) -> Result<String>,
    read_target: &dyn Fn(&Utf8Path) -> Option<String>,
    outcome: &mut FlowRunOutcome,
) -> Result<()> {
    let mut file_ctx = ctx.clone();
    file_ctx.source_file = source_file.to_path_buf();

    // step 2: condition eval, before parse — `exists` checks the
    // workspace, not the (not yet parsed) source document.
    if let Some(when_expr) = &flow.when {
        let exists_check = |p: &str| read_target(Utf8Path::new(p)).is_some();
        if !when::eval(when_expr, &file_ctx, &exists_check)? {
            return Ok(());
        }
    }

    // step 3: parse
    let content = read_source(source_file)?;
    let format = crate::formats::format_for_path(source_file);
    let mut doc = crate::formats::parse(&content, format)?;

    // step 4: dotted-path extract
    if let Some(path) = &flow.path {
        doc = doc.get_path(path).cloned().unwrap_or(Doc::Null);
    }

    match &flow.to {
        ToTarget::Single(to_pattern) => run_sub_flow(
            from_pattern,
            to_pattern,
            source_file,
            &doc,
            &file_ctx,
            flow.merge.unwrap_or_default(),
            flow.pick.as_deref(),
            flow.omit.as_deref(),
            flow.embed.as_deref(),
            flow.map.as_deref(),
            read_target,
            outcome,
        ),
        ToTarget::Multi(targets) => {
            for (to_pattern, over) in targets {
                if let Some(when_expr) = &over.when {
                    let exists_check = |p: &str| read_target(Utf8Path::new(p)).is_some();
                    if !when::eval(when_expr, &file_ctx, &exists_check)? {
                        continue;
                    }
                }
                let merge_strategy = over.merge.or(flow.merge).unwrap_or_default();
                let pick = over.pick.as_deref().or(flow.pick.as_deref());
                let omit = over.omit.as_deref().or(flow.omit.as_deref());
                let embed = over.embed.as_deref().or(flow.embed.as_deref());
                let map_ops = over.map.as_deref().or(flow.map.as_deref());
                run_sub_flow(
                    from_pattern,
                    to_pattern,
                    source_file,
                    &doc,
                    &file_ctx,
                    merge_strategy,
                    pick,
                    omit,
                    embed,
                    map_ops,
                    read_target,
                    outcome,
                )?;
            }
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_sub_flow(
    from_pattern: &str,
    to_pattern: &str,
    source_file: &Utf8Path,
    extracted_doc: &Doc,
    ctx: &FlowContext,
    merge_strategy: MergeStrategy,
    pick: Option<&[String]>,
    omit: Option<&[String]>,
    embed: Option<&str>,
    map_ops: Option<&[MapOp]>,
    read_target: &dyn Fn(&Utf8Path) -> Option<String>,
    outcome: &mut FlowRunOutcome,
) -> Result<()> {
    if pick.is_some() && omit.is_some() {
        return Err(OpkgError::validation(
            "a flow may not set both `pick` and `omit`",
        ));
    }

    let mut doc = extracted_doc.clone();

    // step 5: pick / omit
    if let Some(paths) = pick {
        doc = apply_pick(&doc, paths);
    }
    if let Some(paths) = omit {
        doc = apply_omit(&doc, paths);
    }

    // step 6: schema map ops (non-`$pipe`)
    if let Some(ops) = map_ops {
        crate::map_pipeline::run_schema_ops(&mut doc, ops, ctx)?;
    }

    // step 8: embed
    if let Some(embed_key) = embed {
        let mut wrapped = Doc::empty_object();
        wrapped.set_path(embed_key, doc);
        doc = wrapped;
    }

    // step 7: key-tracking snapshot. Taken after embed (rather than on the
    // pre-embed data) so the recorded paths match where this package's
    // contribution actually lands in the merged target — uninstall removes
    // exactly these paths from the real target, so they have to be in its
    // namespace, not the pre-embed one.
    let keys = if matches!(merge_strategy, MergeStrategy::Deep | MergeStrategy::Shallow) {
        doc.leaf_key_paths()
    } else {
        Vec::new()
    };

    let target_path =
        target::resolve_to(from_pattern, to_pattern, source_file, ctx.platform.as_str());
    let target_format = crate::formats::format_for_path(&target_path);
    let existing_raw = read_target(&target_path);

    let rendered = if matches!(merge_strategy, MergeStrategy::Composite) {
        let incoming_text = crate::formats::serialize(&doc, target_format)?;
        match &existing_raw {
            Some(existing) => merge_ops::composite_merge(existing, &incoming_text, &ctx.package_name),
            None => incoming_text,
        }
    } else {
        let mut conflicts_holder = Vec::new();
        let merged_doc = match &existing_raw {
            Some(existing) => {
                let existing_doc = crate::formats::parse(existing, target_format)?;
                let (merged, conflicts) =
                    merge_ops::merge(&existing_doc, &doc, merge_strategy, &ctx.package_name);
                conflicts_holder = conflicts;
                merged
            }
            None => doc.clone(),
        };

        let piped = match map_ops {
            Some(ops) => crate::map_pipeline::run_pipe_ops(&merged_doc, ops)?,
            None => None,
        };

        let rendered = match piped {
            Some(s) => s,
            None => crate::formats::serialize(&merged_doc, target_format)?,
        };

        outcome.writes.push(FlowWrite {
            source_file: source_file.to_path_buf(),
            target: target_path,
            merge: merge_strategy,
            keys,
            incoming: doc,
            rendered,
            conflicts: conflicts_holder,
        });
        return Ok(());
    };

    outcome.writes.push(FlowWrite {
        source_file: source_file.to_path_buf(),
        target: target_path,
        merge: merge_strategy,
        keys,
        incoming: doc,
        rendered,
        conflicts: Vec::new(),
    });
    Ok(())
}

fn apply_pick(doc: &Doc, paths: &[String]) -> Doc {
    let mut out = Doc::empty_object();
    for path in paths {
        if let Some(value) = doc.get_path(path) {
            out.set_path(path, value.clone());
        }
    }
    out
}

fn apply_omit(doc: &Doc, paths: &[String]) -> Doc {
    let mut out = doc.clone();
    for path in paths {
        out.remove_path(path);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use opkg_schema::{GlobList, PackageName, PlatformId};
    use std::cell::RefCell;
    use std::collections::HashMap;

    fn ctx() -> FlowContext {
        FlowContext {
            package_name: PackageName::normalize("tech"),
            package_version: None,
            priority: 0,
            platform: PlatformId::new("cursor"),
            source_kind: "registry",
            target_root: "/work".into(),
            source_file: "".into(),
            dry_run: false,
        }
    }

    fn flow(from: &str, to: &str, merge: MergeStrategy) -> Flow {
        Flow {
            from: GlobList::Single(from.to_string()),
            to: ToTarget::Single(to.to_string()),
            when: None,
            merge: Some(merge),
            pick: None,
            omit: None,
            path: None,
            embed: None,
            map: None,
        }
    }

    #[test]
    fn scenario_1_deep_merge_tracks_keys() {
        let flows = vec![flow("mcp.jsonc", ".cursor/mcp.json", MergeStrategy::Deep)];
        let flow_refs: Vec<&Flow> = flows.iter().collect();
        let files = vec![Utf8PathBuf::from("mcp.jsonc")];

        let sources: HashMap<&str, &str> =
            HashMap::from([("mcp.jsonc", r#"{"mcpServers":{"tech":{"url":"https://t"}}}"#)]);
        let targets: RefCell<HashMap<&str, &str>> = RefCell::new(HashMap::from([(
            ".cursor/mcp.json",
            r#"{"mcpServers":{"existing":{"url":"https://e"}}}"#,
        )]));

        let read_source = |p: &Utf8Path| -> Result<String> {
            Ok(sources.get(p.as_str()).unwrap().to_string())
        };
        let read_target = |p: &Utf8Path| -> Option<String> {
            targets.borrow().get(p.as_str()).map(|s| s.to_string())
        };

        let outcome = run_flows(&flow_refs, &files, &ctx(), &read_source, &read_target);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.writes.len(), 1);
        let write = &outcome.writes[0];
        assert_eq!(write.keys, vec!["mcpServers.tech.url".to_string()]);
        assert!(write.rendered.contains("existing"));
        assert!(write.rendered.contains("tech"));
    }

    #[test]
    fn embedded_deep_merge_tracks_keys_under_the_embed_prefix() {
        let mut embedded_flow = flow("rule.json", ".cursor/mcp.json", MergeStrategy::Deep);
        embedded_flow.embed = Some("mcpServers.tech".to_string());
        let flow_refs = vec![&embedded_flow];
        let files = vec![Utf8PathBuf::from("rule.json")];

        let sources: HashMap<&str, &str> = HashMap::from([("rule.json", r#"{"url":"https://t"}"#)]);
        let targets: RefCell<HashMap<&str, &str>> = RefCell::new(HashMap::new());

        let read_source = |p: &Utf8Path| -> Result<String> {
            Ok(sources.get(p.as_str()).unwrap().to_string())
        };
        let read_target = |p: &Utf8Path| -> Option<String> {
            targets.borrow().get(p.as_str()).map(|s| s.to_string())
        };

        let outcome = run_flows(&flow_refs, &files, &ctx(), &read_source, &read_target);
        assert!(outcome.failures.is_empty());
        let write = &outcome.writes[0];
        // `keys` must name the path the data actually lands at in the
        // merged target (under the embed wrapper), not its pre-embed shape
        // — otherwise uninstall's `remove_path` targets a path that was
        // never written and leaves the embedded data behind.
        assert_eq!(write.keys, vec!["mcpServers.tech.url".to_string()]);
        assert!(write.rendered.contains("mcpServers"));
    }

    #[test]
    fn priority_list_warns_on_skipped_lower_priority_match() {
        let flow_def = Flow {
            from: GlobList::Priority(vec!["config.jsonc".to_string(), "config.json".to_string()]),
            to: ToTarget::Single("settings.json".to_string()),
            when: None,
            merge: None,
            pick: None,
            omit: None,
            path: None,
            embed: None,
            map: None,
        };
        let flow_refs = vec![&flow_def];
        let files = vec![
            Utf8PathBuf::from("config.jsonc"),
            Utf8PathBuf::from("config.json"),
        ];
        let read_source = |_: &Utf8Path| -> Result<String> { Ok("{}".to_string()) };
        let read_target = |_: &Utf8Path| -> Option<String> { None };

        let outcome = run_flows(&flow_refs, &files, &ctx(), &read_source, &read_target);
        assert_eq!(outcome.warnings.len(), 1);
    }
}
