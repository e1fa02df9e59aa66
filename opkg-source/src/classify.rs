//! Turns a user-supplied input string into a [`SourceVariant`] without
//! touching the filesystem or the network beyond a single existence check
//! for local paths.

use camino::{Utf8Path, Utf8PathBuf};
use opkg_schema::{PackageName, SourceVariant};

use crate::errors::{Result, SourceError};

/// Classify `input` (as typed on a command line, or found in a manifest's
/// dependency list) relative to `cwd`.
///
/// Rules are applied in order; the first that matches wins:
/// 1. a trailing `/` means a local directory,
/// 2. a bare name with a short file extension means a local file,
/// 3. `gh@owner/repo[/subpath]` or any URL means Git,
/// 4. `name[@version]` means a registry package,
/// 5. anything else is a validation error.
pub fn classify(input: &str, cwd: &Utf8Path) -> Result<SourceVariant> {
    let trimmed = input.trim();

    if let Some(dir) = trimmed.strip_suffix('/') {
        let path = resolve_local(cwd, dir);
        if !path.is_dir() {
            return Err(SourceError::LocalDirNotFound { path });
        }
        return Ok(SourceVariant::LocalPath { path });
    }

    if looks_like_local_file(trimmed) {
        let path = resolve_local(cwd, trimmed);
        if !path.is_file() {
            return Err(SourceError::LocalFileNotFound { path });
        }
        return Ok(SourceVariant::LocalPath { path });
    }

    if let Some(git) = classify_git(trimmed) {
        return Ok(git);
    }

    if let Some(registry) = classify_registry(trimmed) {
        return Ok(registry);
    }

    Err(SourceError::UnknownSourceShape {
        input: input.to_string(),
    })
}

fn resolve_local(cwd: &Utf8Path, raw: &str) -> Utf8PathBuf {
    let raw = Utf8Path::new(raw);
    if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        cwd.join(raw)
    }
}

/// A bare (no `/`, no `@`) name ending in a short alphanumeric extension,
/// e.g. `bundle.tar.gz` or `notes.json`.
fn looks_like_local_file(s: &str) -> bool {
    if s.contains('/') || s.contains('@') || s.contains("://") {
        return false;
    }
    match s.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 4
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

fn classify_git(s: &str) -> Option<SourceVariant> {
    if let Some(rest) = s.strip_prefix("gh@") {
        let (rest, git_ref) = split_git_ref(rest);
        let mut parts = rest.splitn(3, '/');
        let owner = parts.next()?;
        let repo = parts.next()?;
        if owner.is_empty() || repo.is_empty() {
            return None;
        }
        let resource_filter = parts.next().map(|s| s.to_string());
        return Some(SourceVariant::Git {
            url: format!("https://github.com/{owner}/{repo}"),
            git_ref,
            resource_filter,
        });
    }

    let is_url = s.contains("://") || s.starts_with("git@");
    if !is_url {
        return None;
    }
    let (url, git_ref) = split_git_ref(s);
    Some(SourceVariant::Git {
        url: url.to_string(),
        git_ref,
        resource_filter: None,
    })
}

/// Splits a trailing `#ref` off a Git URL.
fn split_git_ref(s: &str) -> (&str, Option<String>) {
    match s.split_once('#') {
        Some((base, git_ref)) if !git_ref.is_empty() => (base, Some(git_ref.to_string())),
        _ => (s, None),
    }
}

/// A `name` or `name@version` where `name` looks like a registry package
/// name: lowercase-ish, no slashes, no scheme.
fn classify_registry(s: &str) -> Option<SourceVariant> {
    let (name, version) = match s.split_once('@') {
        Some((name, version)) => (name, Some(version.to_string())),
        None => (s, None),
    };
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return None;
    }
    Some(SourceVariant::Registry {
        name: PackageName::normalize(name),
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cwd() -> Utf8PathBuf {
        Utf8PathBuf::from("/work")
    }

    #[test]
    fn classifies_git_url_with_ref() {
        let result = classify("https://example.com/foo.git#v2", &cwd()).unwrap();
        match result {
            SourceVariant::Git { url, git_ref, .. } => {
                assert_eq!(url, "https://example.com/foo.git");
                assert_eq!(git_ref.as_deref(), Some("v2"));
            }
            other => panic!("expected Git, got {other:?}"),
        }
    }

    #[test]
    fn classifies_gh_shorthand_with_subpath() {
        let result = classify("gh@acme/rules-pack/skills/linting", &cwd()).unwrap();
        match result {
            SourceVariant::Git {
                url,
                resource_filter,
                ..
            } => {
                assert_eq!(url, "https://github.com/acme/rules-pack");
                assert_eq!(resource_filter.as_deref(), Some("skills/linting"));
            }
            other => panic!("expected Git, got {other:?}"),
        }
    }

    #[test]
    fn classifies_registry_name_and_version() {
        let result = classify("Tech-Rules@1.2.3", &cwd()).unwrap();
        match result {
            SourceVariant::Registry { name, version } => {
                assert_eq!(name.as_str(), "tech-rules");
                assert_eq!(version.as_deref(), Some("1.2.3"));
            }
            other => panic!("expected Registry, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unrecognized_shape() {
        let err = classify("!!!not a thing", &cwd()).unwrap_err();
        assert!(matches!(err, SourceError::UnknownSourceShape { .. }));
    }

    #[test]
    fn local_file_extension_is_recognized_over_registry() {
        assert!(looks_like_local_file("bundle.tar.gz"));
        assert!(looks_like_local_file("notes.json"));
        assert!(!looks_like_local_file("name@1.2.3"));
    }
}
