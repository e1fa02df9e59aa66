//! The map pipeline: an ordered list of structural
//! operations executed left-to-right over a parsed [`Doc`].
//!
//! `MapOp` is a closed, externally-tagged enum in `opkg-schema`; this
//! module is the single `apply` dispatcher over that closed set, rather
//! than a `dyn Trait` per op.

use indexmap::IndexMap;
use opkg_schema::{Doc, MapArrayOp, MapOp, PartitionOn, ReduceKind, StringOp};

use crate::errors::{OpkgError, Result};
use crate::flow::context::FlowContext;

/// Validate a pipeline's structural shape before running any of it.
/// Structural errors are surfaced with the path `operations[i].$op`.
pub fn validate(ops: &[MapOp]) -> Result<()> {
    for (i, op) in ops.iter().enumerate() {
        if let MapOp::MapArray(MapArrayOp { each, replace, .. }) = op {
            match (each, replace) {
                (Some(_), Some(_)) => {
                    return Err(OpkgError::validation(format!(
                        "operations[{i}].$map: `each` and `replace` are mutually exclusive"
                    )))
                }
                (None, None) => {
                    return Err(OpkgError::validation(format!(
                        "operations[{i}].$map: exactly one of `each`/`replace` is required"
                    )))
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Run every op in `ops` that is not a `$pipe` conversion; schema ops run
/// before merge. `$pipe` entries are skipped here; [`run_pipe_ops`] handles
/// them separately, after merge.
pub fn run_schema_ops(doc: &mut Doc, ops: &[MapOp], ctx: &FlowContext) -> Result<()> {
    validate(ops)?;
    for op in ops {
        if matches!(op, MapOp::Pipe(_)) {
            continue;
        }
        apply(doc, op, ctx)?;
    }
    Ok(())
}

/// Run every `$pipe` entry in `ops`, in order, against `doc`. Runs after
/// merge, and may replace the in-memory document with a serialized string.
/// Returns `None` if no `$pipe` op was present.
pub fn run_pipe_ops(doc: &Doc, ops: &[MapOp]) -> Result<Option<String>> {
    let mut current: Option<String> = None;
    for op in ops {
        let MapOp::Pipe(pipe_op) = op else { continue };
        let input = match &current {
            None => doc.clone(),
            Some(prior) => {
                let (_from, to) = split_pipe_name(&pipe_op.name);
                crate::formats::parse(prior, to)?
            }
        };
        current = Some(crate::formats::pipe(&pipe_op.name, &input)?);
    }
    Ok(current)
}

fn split_pipe_name(name: &str) -> (opkg_schema::DocFormat, opkg_schema::DocFormat) {
    use opkg_schema::DocFormat;
    match name.split_once("-to-") {
        Some(("json", rest)) => (DocFormat::Json, format_named(rest)),
        Some(("toml", rest)) => (DocFormat::Toml, format_named(rest)),
        Some(("yaml", rest)) => (DocFormat::Yaml, format_named(rest)),
        _ => (DocFormat::Json, DocFormat::Json),
    }
}

fn format_named(name: &str) -> opkg_schema::DocFormat {
    use opkg_schema::DocFormat;
    match name {
        "toml" => DocFormat::Toml,
        "yaml" => DocFormat::Yaml,
        "json" => DocFormat::Json,
        _ => DocFormat::Json,
    }
}

/// Apply a single [`MapOp`] to `doc`.
pub fn apply(doc: &mut Doc, op: &MapOp, ctx: &FlowContext) -> Result<()> {
    match op {
        MapOp::Rename(r) => {
            apply_rename(doc, &r.from, &r.to);
            Ok(())
        }
        MapOp::Set(s) => {
            let value = ctx.resolve_value(&s.value);
            doc.set_path(&s.path, value);
            Ok(())
        }
        MapOp::Unset(u) => {
            doc.remove_path(&u.path);
            Ok(())
        }
        MapOp::Pipeline(p) => {
            let segments: Vec<&str> = p.field.split('.').collect();
            for_each_value(doc, &segments, &mut |value| {
                for nested in &p.ops {
                    // Nested validation errors surface from the first
                    // failing field, matching the flat pipeline's own
                    // fail-fast behavior.
                    apply(value, nested, ctx)?;
                }
                Ok(())
            })
        }
        MapOp::Extract(e) => {
            apply_extract(doc, e)
        }
        MapOp::Partition(p) => apply_partition(doc, p),
        MapOp::MapValues(m) => {
            let segments: Vec<&str> = m.field.split('.').collect();
            for_each_value(doc, &segments, &mut |value| {
                if let Doc::Object(map) = value {
                    for v in map.values_mut() {
                        for nested in &m.ops {
                            apply(v, nested, ctx)?;
                        }
                    }
                }
                Ok(())
            })
        }
        MapOp::Reduce(r) => apply_reduce(doc, r),
        MapOp::MapArray(m) => apply_map_array(doc, m),
        MapOp::Transform(t) => apply_transform(doc, t, ctx),
        MapOp::Pipe(_) => Ok(()), // handled separately, post-merge
    }
}

/// Navigate `doc` along `segments` (each either a literal key or `*`,
/// which fans out over every array element / mapping entry), invoking `f`
/// on the value found at the end of the path.
fn for_each_value(doc: &mut Doc, segments: &[&str], f: &mut dyn FnMut(&mut Doc) -> Result<()>) -> Result<()> {
    match segments.split_first() {
        None => f(doc),
        Some((&"*", rest)) => match doc {
            Doc::Object(map) => {
                for v in map.values_mut() {
                    for_each_value(v, rest, f)?;
                }
                Ok(())
            }
            Doc::Array(items) => {
                for v in items.iter_mut() {
                    for_each_value(v, rest, f)?;
                }
                Ok(())
            }
            _ => Ok(()),
        },
        Some((head, rest)) => {
            if let Doc::Object(map) = doc {
                if let Some(v) = map.get_mut(*head) {
                    for_each_value(v, rest, f)?;
                }
            }
            Ok(())
        }
    }
}

/// Like [`for_each_value`], but invokes `f` on the *containing* mapping of
/// the final path segment, passing that segment's key name — used by
/// `$rename`, which needs to remove-then-reinsert under a new key rather
/// than mutate a value in place.
fn for_each_container(doc: &mut Doc, segments: &[&str], f: &mut dyn FnMut(&mut IndexMap<String, Doc>, &str)) {
    match segments.split_last() {
        None => {}
        Some((last, prefix)) => {
            // Infallible: `$rename`'s own callback never fails, so the
            // `Result` `for_each_value` threads back here is always `Ok`.
            let _ = for_each_value(doc, prefix, &mut |value| {
                if let Doc::Object(map) = value {
                    f(map, last);
                }
                Ok(())
            });
        }
    }
}

fn apply_rename(doc: &mut Doc, from: &str, to: &str) {
    let segments: Vec<&str> = from.split('.').collect();
    let to = to.to_string();
    for_each_container(doc, &segments, &mut |map, key| {
        if let Some(v) = map.shift_remove(key) {
            map.insert(to.clone(), v);
        }
    });
}

fn apply_extract(doc: &mut Doc, op: &opkg_schema::ExtractOp) -> Result<()> {
    let re = regex::Regex::new(&op.pattern)
        .map_err(|e| OpkgError::validation(format!("invalid $extract pattern: {e}")))?;
    let extracted = match doc.as_str() {
        Some(s) => re
            .captures(s)
            .and_then(|caps| caps.get(op.group))
            .map(|m| m.as_str().to_string())
            .or_else(|| op.default.clone()),
        None => op.default.clone(),
    };
    *doc = match extracted {
        Some(s) => Doc::String(s),
        None => Doc::Null,
    };
    Ok(())
}

fn apply_partition(doc: &mut Doc, op: &opkg_schema::PartitionOp) -> Result<()> {
    let segments: Vec<&str> = op.field.split('.').collect();
    let mut err = None;
    for_each_value(doc, &segments, &mut |value| {
        if err.is_some() {
            return Ok(());
        }
        let Doc::Object(source) = value else {
            return Ok(());
        };
        let mut buckets: IndexMap<String, Doc> = op
            .buckets
            .keys()
            .map(|name| (name.clone(), Doc::empty_object()))
            .collect();
        let compiled: Vec<(String, Result<regex::Regex>)> = op
            .buckets
            .iter()
            .map(|(name, pattern)| {
                (
                    name.clone(),
                    regex::Regex::new(pattern).map_err(|e| {
                        OpkgError::validation(format!("invalid $partition pattern: {e}"))
                    }),
                )
            })
            .collect();
        for (key, v) in source.iter() {
            let subject = match op.on {
                PartitionOn::Key => key.as_str(),
                PartitionOn::Value => v.as_str().unwrap_or(""),
            };
            for (name, re) in &compiled {
                match re {
                    Ok(re) if re.is_match(subject) => {
                        if let Some(Doc::Object(bucket)) = buckets.get_mut(name) {
                            bucket.insert(key.clone(), v.clone());
                        }
                        break;
                    }
                    Err(e) => {
                        err = Some(e.clone_as_validation());
                    }
                    _ => {}
                }
            }
        }
        *value = Doc::Object(buckets);
        Ok(())
    })?;
    if let Some(e) = err {
        return Err(e);
    }
    Ok(())
}

fn apply_reduce(doc: &mut Doc, op: &opkg_schema::ReduceOp) -> Result<()> {
    let segments: Vec<&str> = op.field.split('.').collect();
    let mut err = None;
    for_each_value(doc, &segments, &mut |value| {
        match &op.kind {
            ReduceKind::Split { separator } => {
                let Some(s) = value.as_str() else {
                    return Ok(());
                };
                let parts = if separator.is_empty() {
                    vec![s.to_string()]
                } else {
                    s.split(separator.as_str())
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .collect()
                };
                *value = Doc::Array(parts.into_iter().map(Doc::String).collect());
            }
            ReduceKind::Join { separator } => {
                let Some(items) = value.as_array() else {
                    return Ok(());
                };
                let joined = items
                    .iter()
                    .filter_map(Doc::as_str)
                    .collect::<Vec<_>>()
                    .join(separator);
                *value = Doc::String(joined);
            }
        }
        Ok(())
    })?;
    if let Some(e) = err.take() {
        return Err(e);
    }
    Ok(())
}

fn apply_map_array(doc: &mut Doc, op: &MapArrayOp) -> Result<()> {
    let segments: Vec<&str> = op.field.split('.').collect();
    for_each_value(doc, &segments, &mut |value| {
        let Doc::Array(items) = value else {
            return Ok(());
        };
        for item in items.iter_mut() {
            if let Some(string_op) = op.each {
                if let Doc::String(s) = item {
                    *s = apply_string_op(s, string_op);
                }
            }
            if let Some(table) = &op.replace {
                if let Some(s) = item.as_str() {
                    if let Some(replacement) = table.get(s) {
                        *item = Doc::String(replacement.clone());
                    }
                }
            }
        }
        Ok(())
    })?;
    Ok(())
}

fn apply_string_op(s: &str, op: StringOp) -> String {
    match op {
        StringOp::Lowercase => s.to_lowercase(),
        StringOp::Uppercase => s.to_uppercase(),
        StringOp::Trim => s.trim().to_string(),
    }
}

fn apply_transform(doc: &mut Doc, op: &opkg_schema::TransformOp, ctx: &FlowContext) -> Result<()> {
    let segments: Vec<&str> = op.field.split('.').collect();
    let mut err = None;
    for_each_container(doc, &segments, &mut |map, key| {
        let Some(mut value) = map.shift_remove(key) else {
            return;
        };
        for step in &op.steps {
            if let Err(e) = apply(&mut value, step, ctx) {
                err = Some(e);
                return;
            }
        }
        if !value.is_empty_value() {
            map.insert(key.to_string(), value);
        }
        // else: leave unset rather than assign an empty collection.
    });
    if let Some(e) = err {
        return Err(e);
    }
    Ok(())
}

impl OpkgError {
    fn clone_as_validation(&self) -> OpkgError {
        OpkgError::validation(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opkg_schema::{MapArrayOp, ReduceOp, SetOp};

    fn ctx() -> FlowContext {
        FlowContext {
            package_name: opkg_schema::PackageName::normalize("tech"),
            package_version: None,
            priority: 0,
            platform: opkg_schema::PlatformId::new("cursor"),
            source_kind: "registry",
            target_root: "/work".into(),
            source_file: "a.json".into(),
            dry_run: false,
        }
    }

    #[test]
    fn scenario_3_reduce_split_map_replace() {
        let mut doc = Doc::empty_object();
        doc.set_path("tools", Doc::String("Read, Write, AskUserQuestion".into()));

        let split = MapOp::Reduce(ReduceOp {
            field: "tools".to_string(),
            kind: ReduceKind::Split {
                separator: ", ".to_string(),
            },
        });
        let lower = MapOp::MapArray(MapArrayOp {
            field: "tools".to_string(),
            each: Some(StringOp::Lowercase),
            replace: None,
        });
        let mut replace_table = IndexMap::new();
        replace_table.insert("askuserquestion".to_string(), "question".to_string());
        let replace = MapOp::MapArray(MapArrayOp {
            field: "tools".to_string(),
            each: None,
            replace: Some(replace_table),
        });

        run_schema_ops(&mut doc, &[split, lower, replace], &ctx()).unwrap();

        let tools = doc.get_path("tools").unwrap().as_array().unwrap();
        let rendered: Vec<&str> = tools.iter().map(|d| d.as_str().unwrap()).collect();
        assert_eq!(rendered, vec!["read", "write", "question"]);
    }

    #[test]
    fn rename_moves_nested_key() {
        let mut doc = Doc::empty_object();
        doc.set_path("a.old", Doc::String("v".into()));
        apply_rename(&mut doc, "a.old", "new");
        assert_eq!(doc.get_path("a.new"), Some(&Doc::String("v".into())));
        assert_eq!(doc.get_path("a.old"), None);
    }

    #[test]
    fn set_substitutes_context_variable() {
        let mut doc = Doc::empty_object();
        apply(
            &mut doc,
            &MapOp::Set(SetOp {
                path: "platform".to_string(),
                value: Doc::String("$$platform".into()),
            }),
            &ctx(),
        )
        .unwrap();
        assert_eq!(doc.get_path("platform"), Some(&Doc::String("cursor".into())));
    }

    #[test]
    fn transform_unsets_field_when_result_is_empty() {
        let mut doc = Doc::empty_object();
        doc.set_path("tags", Doc::String(String::new()));
        let transform = opkg_schema::TransformOp {
            field: "tags".to_string(),
            steps: vec![],
        };
        apply_transform(&mut doc, &transform, &ctx()).unwrap();
        assert_eq!(doc.get_path("tags"), None);
    }

    #[test]
    fn map_array_rejects_both_each_and_replace_set() {
        let op = MapOp::MapArray(MapArrayOp {
            field: "x".to_string(),
            each: Some(StringOp::Lowercase),
            replace: Some(IndexMap::new()),
        });
        assert!(validate(&[op]).is_err());
    }
}
