//! Registry loading. The actual network transport is out of scope here;
//! callers supply a [`RegistryClient`] collaborator that knows how to talk
//! to whatever registry backend they use.

use camino::{Utf8Path, Utf8PathBuf};
use opkg_schema::{PackageName, SourceVariant};

use crate::errors::{Result, SourceError};
use crate::load::LoadedPackage;

/// A caller-supplied registry transport. `opkg-source` never constructs
/// HTTP requests itself; it only decides *when* to call this and *where*
/// the result should land on disk.
pub trait RegistryClient {
    /// Fetch `name` (at `version`, or the latest if `None`) into `dest`,
    /// which is guaranteed to exist and be empty.
    fn fetch(
        &self,
        name: &PackageName,
        version: Option<&str>,
        dest: &Utf8Path,
    ) -> std::result::Result<(), String>;
}

/// Whether the local registry cache is consulted first, or bypassed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryMode {
    /// Use the local cache if present; only fetch on a cache miss.
    #[default]
    CacheFirst,
    /// Always re-fetch, even if a cached copy exists.
    RemotePrimary,
}

/// Load a registry-sourced package, consulting the cache per `mode`:
/// the local registry cache first, unless `mode` is `remote-primary`,
/// in which case always fetch.
pub fn load_registry(
    name: &PackageName,
    version: Option<&str>,
    cache_root: &Utf8Path,
    mode: RegistryMode,
    client: &dyn RegistryClient,
) -> Result<LoadedPackage> {
    let dest = registry_cache_path(cache_root, name, version);
    let cache_hit = dest.is_dir();

    if mode == RegistryMode::RemotePrimary || !cache_hit {
        std::fs::create_dir_all(&dest).map_err(|e| {
            SourceError::Internal(format!("couldn't create registry cache dir {dest}: {e}"))
        })?;
        client
            .fetch(name, version, &dest)
            .map_err(|details| SourceError::RegistryFetch {
                name: name.as_str().to_string(),
                details,
            })?;
    }

    LoadedPackage::from_content_root(
        dest,
        SourceVariant::Registry {
            name: name.clone(),
            version: version.map(str::to_string),
        },
    )
}

/// The content-addressed cache path for a registry package, keyed by
/// `(name, version)`.
pub fn registry_cache_path(
    cache_root: &Utf8Path,
    name: &PackageName,
    version: Option<&str>,
) -> Utf8PathBuf {
    cache_root
        .join("registry")
        .join(name.as_str())
        .join(version.unwrap_or("latest"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRegistry;
    impl RegistryClient for FakeRegistry {
        fn fetch(
            &self,
            name: &PackageName,
            _version: Option<&str>,
            dest: &Utf8Path,
        ) -> std::result::Result<(), String> {
            std::fs::write(dest.join("opkg.json"), format!(r#"{{"name":"{name}"}}"#))
                .map_err(|e| e.to_string())
        }
    }

    #[test]
    fn fetches_on_cache_miss() {
        let dir = temp_dir::TempDir::new().unwrap();
        let cache_root = Utf8Path::from_path(dir.path()).unwrap();
        let name = PackageName::normalize("tech-rules");
        let loaded = load_registry(
            &name,
            Some("1.0.0"),
            cache_root,
            RegistryMode::CacheFirst,
            &FakeRegistry,
        )
        .unwrap();
        assert_eq!(loaded.name.as_str(), "tech-rules");
    }

    #[test]
    fn cache_first_skips_fetch_on_hit() {
        let dir = temp_dir::TempDir::new().unwrap();
        let cache_root = Utf8Path::from_path(dir.path()).unwrap();
        let name = PackageName::normalize("tech-rules");
        let dest = registry_cache_path(cache_root, &name, Some("1.0.0"));
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("opkg.json"), r#"{"name":"tech-rules","version":"1.0.0"}"#)
            .unwrap();

        struct PanicsIfCalled;
        impl RegistryClient for PanicsIfCalled {
            fn fetch(
                &self,
                _: &PackageName,
                _: Option<&str>,
                _: &Utf8Path,
            ) -> std::result::Result<(), String> {
                panic!("fetch should not be called on a cache hit");
            }
        }

        let loaded = load_registry(
            &name,
            Some("1.0.0"),
            cache_root,
            RegistryMode::CacheFirst,
            &PanicsIfCalled,
        )
        .unwrap();
        assert_eq!(loaded.version.unwrap().to_string(), "1.0.0");
    }
}
