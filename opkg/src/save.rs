//! The save engine: walk the workspace targets a package
//! owns, reverse the platform-specific rendering back into universal
//! source form, and write only the files that actually changed.

use camino::{Utf8Path, Utf8PathBuf};
use opkg_schema::{Doc, Flow, MergeStrategy, PackageName, PlatformDefinition, TargetMapping};
use sha2::{Digest, Sha256};

use crate::errors::Result;
use crate::flow::context::FlowContext;
use crate::flow::{target, when};
use crate::formats;
use crate::index;
use crate::map_pipeline;

/// One file this package's content root would be updated with, or
/// confirmed unchanged.
#[derive(Debug, Clone)]
pub struct SaveCandidate {
    pub source_file: Utf8PathBuf,
    pub target: Utf8PathBuf,
}

/// The result of running [`save`] for one package.
#[derive(Debug, Clone, Default)]
pub struct SaveOutcome {
    /// Source files actually (re)written because their content changed.
    pub written: Vec<Utf8PathBuf>,
    /// Candidates whose canonical content matched the existing source
    /// file — nothing written.
    pub unchanged: Vec<Utf8PathBuf>,
    /// Non-fatal conversion failures; the raw target content was used
    /// instead.
    pub warnings: Vec<String>,
}

/// Compute the canonical, comparable string for `candidate`'s current
/// on-disk target content:
///
/// - A merged target is first narrowed to just this package's
///   contribution via its tracked `keys[]` (structured subtract).
/// - A platform-specific target is converted back to universal form by
///   running a matching `import[]` flow, if one is found.
///
/// Falls back to the raw target content, with a warning, if either step
/// fails or doesn't apply.
#[allow(clippy::too_many_arguments)]
pub fn canonicalize(
    candidate: &SaveCandidate,
    mapping: &TargetMapping,
    target_content: &str,
    platform: &PlatformDefinition,
    ctx: &FlowContext,
    warnings: &mut Vec<String>,
) -> String {
    let format = formats::format_for_path(&candidate.target);
    let Ok(mut doc) = formats::parse(target_content, format) else {
        warnings.push(format!(
            "{}: failed to parse target for save, using raw content",
            candidate.target
        ));
        return target_content.to_string();
    };

    if let TargetMapping::Structured { merge, keys, .. } = mapping {
        if matches!(merge, MergeStrategy::Deep | MergeStrategy::Shallow) && !keys.is_empty() {
            doc = extract_keys(&doc, keys);
        }
    }

    match convert_via_import(&doc, &candidate.target, platform, ctx) {
        Ok(Some(converted)) => converted,
        Ok(None) => match formats::serialize(&doc, format) {
            Ok(s) => s,
            Err(_) => target_content.to_string(),
        },
        Err(e) => {
            warnings.push(format!("{}: import conversion failed ({e}), using raw content", candidate.target));
            match formats::serialize(&doc, format) {
                Ok(s) => s,
                Err(_) => target_content.to_string(),
            }
        }
    }
}

/// Narrow `doc` to just the leaf paths in `keys`, mirroring the shape the
/// flow engine's pick step builds.
fn extract_keys(doc: &Doc, keys: &[String]) -> Doc {
    let mut out = Doc::empty_object();
    for path in keys {
        if let Some(value) = doc.get_path(path) {
            out.set_path(path, value.clone());
        }
    }
    out
}

/// Find the first of `platform.import` whose `to` pattern matches
/// `target` (and whose `when`, if present, is satisfied), run it, and
/// return the reconstructed universal-form content.
fn convert_via_import(
    doc: &Doc,
    target_path: &Utf8Path,
    platform: &PlatformDefinition,
    ctx: &FlowContext,
) -> Result<Option<String>> {
    for flow in &platform.import {
        if !matches_to(&flow.to, target_path) {
            continue;
        }
        if let Some(expr) = &flow.when {
            if !when::eval(expr, ctx, &|_| true)? {
                continue;
            }
        }
        let mut working = doc.clone();
        if let Some(ops) = &flow.map {
            map_pipeline::run_schema_ops(&mut working, ops, ctx)?;
        }
        let source_format = formats::format_for_path(&source_hint(flow));
        return Ok(Some(formats::serialize(&working, source_format)?));
    }
    Ok(None)
}

fn matches_to(to: &opkg_schema::ToTarget, target_path: &Utf8Path) -> bool {
    match to {
        opkg_schema::ToTarget::Single(pattern) => glob_matches(pattern, target_path),
        opkg_schema::ToTarget::Multi(variants) => variants.keys().any(|p| glob_matches(p, target_path)),
    }
}

fn glob_matches(pattern: &str, target_path: &Utf8Path) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(target_path.as_str()))
        .unwrap_or(false)
}

/// An import flow doesn't declare its own destination extension directly
/// (that's the job of the original `from` it's reversing); use `from`'s
/// own pattern as a format hint since most platforms roundtrip the same
/// extension both ways.
fn source_hint(flow: &Flow) -> Utf8PathBuf {
    Utf8PathBuf::from(flow.from.patterns().first().cloned().unwrap_or_default())
}

/// Hash `content` for change detection; full SHA-256, hex-encoded.
pub fn comparable_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Run a full save for `package`: for every candidate, canonicalize the
/// current target content, compare its hash against the existing source
/// file (if any), and write only when they differ.
///
/// `platform_for` resolves which platform definition governs a given
/// target — a package's candidates can span more than one platform, so
/// this is a lookup rather than a single fixed value; a target it
/// returns `None` for is skipped. `ctx_for` builds the per-candidate flow
/// context. `read_target`/`read_source` load file content (returning
/// `None` if absent); `write_source` persists updated universal-form
/// content under the package's content root.
#[allow(clippy::too_many_arguments)]
pub fn save(
    index: &opkg_schema::WorkspaceIndex,
    package: &PackageName,
    platform_for: &dyn Fn(&Utf8Path) -> Option<&PlatformDefinition>,
    ctx_for: &dyn Fn(&SaveCandidate) -> FlowContext,
    read_target: &dyn Fn(&Utf8Path) -> Option<String>,
    read_source: &dyn Fn(&Utf8Path) -> Option<String>,
    write_source: &mut dyn FnMut(&Utf8Path, &str) -> Result<()>,
) -> Result<SaveOutcome> {
    let mut outcome = SaveOutcome::default();
    let Some(entry) = index.packages.get(package) else {
        return Ok(outcome);
    };
    for (source_file, mappings) in &entry.files {
        for mapping in mappings {
            let candidate = SaveCandidate {
                source_file: source_file.clone(),
                target: mapping.target_path().clone(),
            };
            let Some(platform) = platform_for(&candidate.target) else {
                continue;
            };
            let Some(target_content) = read_target(&candidate.target) else {
                continue;
            };
            let ctx = ctx_for(&candidate);
            let canonical = canonicalize(&candidate, mapping, &target_content, platform, &ctx, &mut outcome.warnings);
            let existing_hash = read_source(&candidate.source_file).map(|s| comparable_hash(&s));
            let new_hash = comparable_hash(&canonical);
            if existing_hash.as_deref() == Some(new_hash.as_str()) {
                outcome.unchanged.push(candidate.source_file.clone());
                continue;
            }
            write_source(&candidate.source_file, &canonical)?;
            outcome.written.push(candidate.source_file);
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparable_hash_is_stable_and_content_sensitive() {
        let a = comparable_hash("{\"x\":1}");
        let b = comparable_hash("{\"x\":1}");
        let c = comparable_hash("{\"x\":2}");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn extract_keys_narrows_to_tracked_paths() {
        let doc = Doc::from(serde_json::json!({
            "mcpServers": {"tech": {"url": "https://a"}, "other": {"url": "https://b"}}
        }));
        let narrowed = extract_keys(&doc, &["mcpServers.tech.url".to_string()]);
        assert_eq!(
            narrowed.get_path("mcpServers.tech.url").and_then(Doc::as_str),
            Some("https://a")
        );
        assert!(narrowed.get_path("mcpServers.other.url").is_none());
    }
}
