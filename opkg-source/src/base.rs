//! The base detector: finds the directory inside a loaded
//! package's content root that acts as the package root for flow
//! discovery.
//!
//! Each platform's `detection[]` glob list is tried in turn and the
//! result folded into a `Found`/`Missing`/`Broken`-shaped outcome, so
//! adding a new platform never touches this fan-out.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use opkg_schema::PlatformDefinition;

use crate::errors::Result;

/// The conventional filename that marks a content root as a marketplace
/// catalog rather than an ordinary installable package.
pub const MARKETPLACE_MANIFEST_FILE: &str = "opkg-marketplace.json";

/// Where a resolved [`BaseOutcome::Base`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseSource {
    /// The package manifest named its base explicitly.
    Manifest,
    /// Exactly one distinct directory matched some platform's detection
    /// globs.
    Detection,
    /// A caller (interactive prompt, or a non-interactive deepest-match
    /// policy) picked one candidate out of an ambiguous set.
    UserSelection {
        /// Whether the selection was made without user interaction (the
        /// "pick the deepest match" default for non-interactive callers).
        auto_select: bool,
    },
    /// No detection pattern matched anything; the whole content root is
    /// used because there was nothing to disambiguate against.
    Single,
}

/// One candidate base directory found during detection, before
/// disambiguation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseCandidate {
    /// The candidate base directory, relative to the content root.
    pub base: Utf8PathBuf,
    /// The detection pattern that matched inside it.
    pub pattern: String,
    /// Path depth (component count) of `base`, used for the deepest-match
    /// tie-break.
    pub depth: usize,
}

/// The result of running the base detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseOutcome {
    /// A single base was found.
    Base {
        /// The resolved base directory, relative to the content root.
        base: Utf8PathBuf,
        /// The detection pattern that picked it out, if any.
        matched_pattern: Option<String>,
        /// How this base was decided.
        source: BaseSource,
    },
    /// The content root is a marketplace catalog, not an installable
    /// package.
    Marketplace,
    /// More than one distinct base directory was found; the caller must
    /// choose.
    Ambiguous {
        /// Candidates, deepest first.
        candidates: Vec<BaseCandidate>,
    },
}

/// Run the base detector over `content_root`.
///
/// `manifest_base`, if present, short-circuits detection entirely.
pub fn detect_base(
    content_root: &Utf8Path,
    manifest_base: Option<&Utf8Path>,
    platforms: &[PlatformDefinition],
) -> Result<BaseOutcome> {
    if let Some(base) = manifest_base {
        return Ok(BaseOutcome::Base {
            base: base.to_path_buf(),
            matched_pattern: None,
            source: BaseSource::Manifest,
        });
    }

    let files = list_files(content_root)?;
    let mut candidates: BTreeMap<Utf8PathBuf, (String, usize)> = BTreeMap::new();

    for platform in platforms {
        for pattern in &platform.detection {
            let Ok(glob_pattern) = glob::Pattern::new(pattern) else {
                continue;
            };
            for file in &files {
                if glob_pattern.matches(file.as_str()) {
                    let dir = file
                        .parent()
                        .map(|p| p.to_path_buf())
                        .unwrap_or_else(Utf8PathBuf::new);
                    let depth = dir.components().count();
                    candidates
                        .entry(dir)
                        .or_insert_with(|| (pattern.clone(), depth));
                }
            }
        }
    }

    match candidates.len() {
        0 => {
            let marketplace_marker = content_root.join(MARKETPLACE_MANIFEST_FILE);
            if marketplace_marker.is_file() {
                return Ok(BaseOutcome::Marketplace);
            }
            Ok(BaseOutcome::Base {
                base: Utf8PathBuf::new(),
                matched_pattern: None,
                source: BaseSource::Single,
            })
        }
        1 => {
            let (base, (pattern, _depth)) = candidates.into_iter().next().unwrap();
            Ok(BaseOutcome::Base {
                base,
                matched_pattern: Some(pattern),
                source: BaseSource::Detection,
            })
        }
        _ => {
            let marketplace_marker = content_root.join(MARKETPLACE_MANIFEST_FILE);
            if marketplace_marker.is_file() {
                return Ok(BaseOutcome::Marketplace);
            }
            let mut candidates: Vec<BaseCandidate> = candidates
                .into_iter()
                .map(|(base, (pattern, depth))| BaseCandidate {
                    base,
                    pattern,
                    depth,
                })
                .collect();
            candidates.sort_by(|a, b| b.depth.cmp(&a.depth).then_with(|| a.base.cmp(&b.base)));
            Ok(BaseOutcome::Ambiguous { candidates })
        }
    }
}

fn list_files(content_root: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(content_root)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(path) = Utf8PathBuf::from_path_buf(entry.into_path()) else {
            continue;
        };
        if let Ok(rel) = path.strip_prefix(content_root) {
            out.push(rel.to_path_buf());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opkg_schema::Flow;
    use temp_dir::TempDir;

    fn platform(detection: &[&str]) -> PlatformDefinition {
        PlatformDefinition {
            name: "cursor".into(),
            root_dir: Utf8PathBuf::from(".cursor"),
            root_file: None,
            detection: detection.iter().map(|s| s.to_string()).collect(),
            import: Vec::<Flow>::new(),
            export: Vec::<Flow>::new(),
        }
    }

    #[test]
    fn manifest_base_short_circuits_detection() {
        let dir = TempDir::new().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let outcome = detect_base(root, Some(Utf8Path::new("sub")), &[]).unwrap();
        assert_eq!(
            outcome,
            BaseOutcome::Base {
                base: Utf8PathBuf::from("sub"),
                matched_pattern: None,
                source: BaseSource::Manifest,
            }
        );
    }

    #[test]
    fn single_distinct_match_is_unambiguous() {
        let dir = TempDir::new().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::create_dir_all(root.join("pkg/.cursor")).unwrap();
        std::fs::write(root.join("pkg/.cursor/rules.mdc"), "x").unwrap();

        let outcome =
            detect_base(root, None, &[platform(&["**/.cursor/*.mdc"])]).unwrap();
        match outcome {
            BaseOutcome::Base { base, source, .. } => {
                assert_eq!(base, Utf8PathBuf::from("pkg/.cursor"));
                assert_eq!(source, BaseSource::Detection);
            }
            other => panic!("expected Base, got {other:?}"),
        }
    }

    #[test]
    fn zero_matches_falls_back_to_single() {
        let dir = TempDir::new().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let outcome = detect_base(root, None, &[platform(&["**/.cursor/*.mdc"])]).unwrap();
        assert_eq!(
            outcome,
            BaseOutcome::Base {
                base: Utf8PathBuf::new(),
                matched_pattern: None,
                source: BaseSource::Single,
            }
        );
    }

    #[test]
    fn multiple_distinct_matches_are_ambiguous_deepest_first() {
        let dir = TempDir::new().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::create_dir_all(root.join("a/.cursor")).unwrap();
        std::fs::write(root.join("a/.cursor/rules.mdc"), "x").unwrap();
        std::fs::create_dir_all(root.join("a/b/.cursor")).unwrap();
        std::fs::write(root.join("a/b/.cursor/rules.mdc"), "x").unwrap();

        let outcome =
            detect_base(root, None, &[platform(&["**/.cursor/*.mdc"])]).unwrap();
        match outcome {
            BaseOutcome::Ambiguous { candidates } => {
                assert_eq!(candidates.len(), 2);
                assert!(candidates[0].depth >= candidates[1].depth);
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }
}
