//! Glob resolution for a flow's `from`/`to` patterns, including target
//! path resolution when `to` itself is a glob.

use camino::{Utf8Path, Utf8PathBuf};
use opkg_schema::GlobList;

/// The outcome of resolving a (possibly priority-listed) `from` pattern
/// against a package's file list.
pub struct FromResolution {
    /// The pattern that was actually used.
    pub matched_pattern: String,
    /// Every source file (relative to the base) that matched it.
    pub files: Vec<Utf8PathBuf>,
    /// Lower-priority patterns in the same list that also had matches and
    /// were therefore skipped — surfaced as a flow warning.
    pub skipped_patterns: Vec<String>,
}

/// Resolve `from` against `files` (every file under the package's base,
/// relative paths). Returns `None` if no pattern in the list matched
/// anything.
pub fn resolve_from(from: &GlobList, files: &[Utf8PathBuf]) -> Option<FromResolution> {
    let patterns = from.patterns();
    let mut winner: Option<(usize, String, Vec<Utf8PathBuf>)> = None;
    let mut skipped = Vec::new();

    for (i, pattern) in patterns.iter().enumerate() {
        let Ok(glob_pattern) = glob::Pattern::new(pattern) else {
            continue;
        };
        let matches: Vec<Utf8PathBuf> = files
            .iter()
            .filter(|f| glob_pattern.matches(f.as_str()))
            .cloned()
            .collect();
        if matches.is_empty() {
            continue;
        }
        match &winner {
            None => winner = Some((i, pattern.clone(), matches)),
            Some(_) => skipped.push(pattern.clone()),
        }
    }

    winner.map(|(_, matched_pattern, files)| FromResolution {
        matched_pattern,
        files,
        skipped_patterns: skipped,
    })
}

/// Resolve a single matched source file's target path under `to_pattern`.
///
/// - A `**` in `to_pattern` is replaced with whatever sub-path `**` in
///   `from_pattern` captured for this particular source file.
/// - A single-level `*` is replaced with the source's base filename (and,
///   if the text right after `*` begins with `.`, that dotted suffix is
///   taken as the target's extension instead of the source's own).
/// - A `name.<platformId>.ext`-shaped result has the platform-id infix
///   stripped from the final filename.
pub fn resolve_to(
    from_pattern: &str,
    to_pattern: &str,
    source_rel: &Utf8Path,
    platform_id: &str,
) -> Utf8PathBuf {
    let resolved = if to_pattern.contains("**") {
        match capture_double_star(from_pattern, source_rel.as_str()) {
            Some(captured) => Utf8PathBuf::from(to_pattern.replacen("**", &captured, 1)),
            None => Utf8PathBuf::from(to_pattern),
        }
    } else if let Some(star_idx) = to_pattern.find('*') {
        resolve_single_star(to_pattern, star_idx, source_rel)
    } else {
        Utf8PathBuf::from(to_pattern)
    };
    strip_platform_suffix(resolved, platform_id)
}

fn capture_double_star(from_pattern: &str, source_rel: &str) -> Option<String> {
    let idx = from_pattern.find("**")?;
    let prefix = &from_pattern[..idx];
    let suffix = &from_pattern[idx + 2..];
    if !source_rel.starts_with(prefix) || !source_rel.ends_with(suffix) {
        return None;
    }
    let rest = &source_rel[prefix.len()..source_rel.len() - suffix.len()];
    Some(rest.trim_start_matches('/').to_string())
}

fn resolve_single_star(to_pattern: &str, star_idx: usize, source_rel: &Utf8Path) -> Utf8PathBuf {
    let prefix = &to_pattern[..star_idx];
    let suffix = &to_pattern[star_idx + 1..];
    let replacement = if suffix.starts_with('.') {
        source_rel
            .file_stem()
            .unwrap_or_else(|| source_rel.as_str())
    } else {
        source_rel.file_name().unwrap_or_else(|| source_rel.as_str())
    };
    Utf8PathBuf::from(format!("{prefix}{replacement}{suffix}"))
}

fn strip_platform_suffix(mut path: Utf8PathBuf, platform_id: &str) -> Utf8PathBuf {
    let Some(name) = path.file_name().map(str::to_string) else {
        return path;
    };
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() >= 3 {
        let infix_idx = parts.len() - 2;
        if parts[infix_idx] == platform_id {
            let mut kept: Vec<&str> = parts.clone();
            kept.remove(infix_idx);
            path.set_file_name(kept.join("."));
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_2_priority_list_fallback_no_warning() {
        let from = GlobList::Priority(vec!["config.jsonc".to_string(), "config.json".to_string()]);
        let files = vec![Utf8PathBuf::from("config.json")];
        let resolved = resolve_from(&from, &files).unwrap();
        assert_eq!(resolved.matched_pattern, "config.json");
        assert!(resolved.skipped_patterns.is_empty());
    }

    #[test]
    fn priority_list_warns_when_lower_priority_also_matches() {
        let from = GlobList::Priority(vec!["config.jsonc".to_string(), "config.json".to_string()]);
        let files = vec![
            Utf8PathBuf::from("config.jsonc"),
            Utf8PathBuf::from("config.json"),
        ];
        let resolved = resolve_from(&from, &files).unwrap();
        assert_eq!(resolved.matched_pattern, "config.jsonc");
        assert_eq!(resolved.skipped_patterns, vec!["config.json".to_string()]);
    }

    #[test]
    fn recursive_glob_captures_subpath_verbatim() {
        let target = resolve_to(
            "agents/**",
            "**",
            Utf8Path::new("agents/sub/linter.md"),
            "cursor",
        );
        assert_eq!(target, Utf8PathBuf::from("sub/linter.md"));
    }

    #[test]
    fn single_star_substitutes_basename_and_keeps_source_extension() {
        let target = resolve_to("*", "rules/*", Utf8Path::new("tech.mdc"), "cursor");
        assert_eq!(target, Utf8PathBuf::from("rules/tech.mdc"));
    }

    #[test]
    fn single_star_with_dotted_suffix_overrides_extension() {
        let target = resolve_to("*", "settings/*.json", Utf8Path::new("config.jsonc"), "cursor");
        assert_eq!(target, Utf8PathBuf::from("settings/config.json"));
    }

    #[test]
    fn platform_suffix_is_stripped_from_final_filename() {
        let target = resolve_to("*", "*", Utf8Path::new("mcp.cursor.json"), "cursor");
        assert_eq!(target, Utf8PathBuf::from("mcp.json"));
    }
}
