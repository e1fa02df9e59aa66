//! Loading a classified source into a [`LoadedPackage`]: reading its
//! manifest and establishing its content root.
//!
//! `SourceFile::load_local` followed by a plain deserialize — the same
//! two-step every source kind in this module uses, just pointed at a
//! different manifest shape.

use axoasset::SourceFile;
use camino::{Utf8Path, Utf8PathBuf};
use opkg_schema::{Manifest, PackageName, SourceVariant};

use crate::errors::{Result, SourceError};

/// The conventional filename for a package's manifest, at its content root.
pub const MANIFEST_FILENAME: &str = "opkg.json";

/// A package that has been loaded onto local disk (whether it was local to
/// begin with, or a collaborator fetched it into a cache) but not yet
/// base-detected.
#[derive(Debug, Clone)]
pub struct LoadedPackage {
    /// The package's resolved name (from the manifest, or derived from the
    /// source when the manifest doesn't declare one).
    pub name: PackageName,
    /// The package's resolved version, if any.
    pub version: Option<semver::Version>,
    /// Where this package's files live on disk.
    pub content_root: Utf8PathBuf,
    /// The package's parsed manifest.
    pub manifest: Manifest,
    /// The source this package was loaded from.
    pub source: SourceVariant,
    /// Whether this source is a marketplace catalog rather than an
    /// ordinary package. Decided by the base detector; `false` until then.
    pub is_marketplace: bool,
}

impl LoadedPackage {
    /// Reads and parses the manifest at `content_root/opkg.json`.
    ///
    /// A missing manifest is not fatal everywhere in the pipeline — a
    /// package with no manifest is just a leaf with no declared deps — so
    /// callers that can tolerate it should match on
    /// `SourceError::ManifestNotFound` rather than propagating it blindly.
    pub fn read_manifest(content_root: &Utf8Path) -> Result<Manifest> {
        let manifest_path = content_root.join(MANIFEST_FILENAME);
        if !manifest_path.is_file() {
            return Err(SourceError::ManifestNotFound {
                content_root: content_root.to_path_buf(),
            });
        }
        let source = SourceFile::load_local(&manifest_path)?;
        let manifest: Manifest = source.deserialize_json()?;
        Ok(manifest)
    }

    /// Builds a `LoadedPackage` from an already-materialized content root
    /// and the source it came from.
    pub fn from_content_root(content_root: Utf8PathBuf, source: SourceVariant) -> Result<Self> {
        let manifest = match Self::read_manifest(&content_root) {
            Ok(manifest) => manifest,
            Err(SourceError::ManifestNotFound { .. }) => empty_manifest(),
            Err(e) => return Err(e),
        };

        let name = manifest
            .name
            .as_deref()
            .map(PackageName::normalize)
            .unwrap_or_else(|| PackageName::normalize(&fallback_name(&source, &content_root)));

        let version = manifest
            .version
            .as_deref()
            .and_then(|v| semver::Version::parse(v).ok());

        Ok(LoadedPackage {
            name,
            version,
            content_root,
            manifest,
            source,
            is_marketplace: false,
        })
    }
}

fn empty_manifest() -> Manifest {
    Manifest {
        name: None,
        version: None,
        dependencies: Vec::new(),
        base: None,
        metadata: None,
    }
}

fn fallback_name(source: &SourceVariant, content_root: &Utf8Path) -> String {
    match source {
        SourceVariant::Registry { name, .. } => name.as_str().to_string(),
        SourceVariant::Git { url, .. } => url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(url)
            .trim_end_matches(".git")
            .to_string(),
        SourceVariant::LocalPath { .. } => content_root
            .file_name()
            .unwrap_or("package")
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    #[test]
    fn missing_manifest_yields_empty_manifest_not_error() {
        let dir = TempDir::new().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().to_path_buf();
        let loaded = LoadedPackage::from_content_root(
            root.clone(),
            SourceVariant::LocalPath { path: root },
        )
        .unwrap();
        assert!(loaded.manifest.dependencies.is_empty());
    }

    #[test]
    fn manifest_name_is_normalized() {
        let dir = TempDir::new().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().to_path_buf();
        std::fs::write(root.join(MANIFEST_FILENAME), r#"{"name": "Tech-Rules"}"#).unwrap();
        let loaded = LoadedPackage::from_content_root(
            root.clone(),
            SourceVariant::LocalPath { path: root },
        )
        .unwrap();
        assert_eq!(loaded.name.as_str(), "tech-rules");
    }
}
