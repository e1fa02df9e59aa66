//! Cache & temp-dir manager: partitions a Git source's
//! conversion cache by install scope (`_full/` vs `_subset.<hash>/`) and
//! allocates/releases the shared temp root used for one-off conversions.

use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest, Sha256};

use crate::errors::Result;

/// The install scope a conversion cache directory belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// The whole package was installed.
    Full,
    /// Only resources matching `pattern` were installed.
    Subset(String),
}

impl Scope {
    /// The directory name this scope occupies under a content-addressed
    /// source cache entry.
    pub fn dir_name(&self) -> String {
        match self {
            Scope::Full => "_full".to_string(),
            Scope::Subset(pattern) => format!("_subset.{}", short_hash(pattern)),
        }
    }
}

fn short_hash(pattern: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pattern.as_bytes());
    let digest = hasher.finalize();
    digest[..4].iter().map(|b| format!("{b:02x}")).collect()
}

/// The conversion-cache directory for `scope` under one source's cache
/// entry (e.g. `git_cache_path(..)` or `registry_cache_path(..)`).
///
/// Before returning, every other `_full`/`_subset.*` sibling is removed —
/// a scope change invalidates whatever a prior install's scope converted.
pub fn scope_dir(source_entry: &Utf8Path, scope: &Scope, list_siblings: &dyn Fn(&Utf8Path) -> Vec<Utf8PathBuf>) -> Result<Utf8PathBuf> {
    let wanted = source_entry.join(scope.dir_name());
    for sibling in list_siblings(source_entry) {
        let is_scope_dir = sibling
            .file_name()
            .map(|name| name.starts_with("_full") || name.starts_with("_subset."))
            .unwrap_or(false);
        if is_scope_dir && sibling != wanted {
            axoasset::LocalAsset::remove_dir_all(&sibling)?;
        }
    }
    axoasset::LocalAsset::create_dir_all(&wanted)?;
    Ok(wanted)
}

/// A process-scoped root for ad-hoc conversion temp files, released by the
/// caller in a guaranteed cleanup block at the end of a command.
pub struct TempRoot {
    dir: temp_dir::TempDir,
}

impl TempRoot {
    /// Allocate a new temp root.
    pub fn new() -> std::io::Result<Self> {
        Ok(TempRoot {
            dir: temp_dir::TempDir::new()?,
        })
    }

    /// The root path; dropped (and removed from disk) when `self` is.
    pub fn path(&self) -> &Utf8Path {
        Utf8Path::from_path(self.dir.path()).expect("temp dir path is always valid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_and_subset_scopes_have_distinct_stable_names() {
        let full = Scope::Full;
        let subset_a = Scope::Subset("agents/*".to_string());
        let subset_b = Scope::Subset("agents/*".to_string());
        let subset_c = Scope::Subset("skills/*".to_string());

        assert_eq!(full.dir_name(), "_full");
        assert_eq!(subset_a.dir_name(), subset_b.dir_name());
        assert_ne!(subset_a.dir_name(), subset_c.dir_name());
        assert!(subset_a.dir_name().starts_with("_subset."));
    }

    #[test]
    fn scope_dir_removes_stale_siblings() {
        let dir = temp_dir::TempDir::new().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let stale = root.join("_full");
        axoasset::LocalAsset::create_dir_all(&stale).unwrap();

        let result = scope_dir(root, &Scope::Subset("x".to_string()), &|p| {
            std::fs::read_dir(p)
                .unwrap()
                .filter_map(|e| e.ok())
                .map(|e| Utf8PathBuf::from_path_buf(e.path()).unwrap())
                .collect()
        })
        .unwrap();

        assert!(!stale.exists());
        assert!(result.exists());
    }
}
