//! `OpkgConfig`: the small set of knobs that aren't part of any one
//! package's manifest or any one platform's definition (cache root,
//! concurrency, default conflict policy, registry mode).
//!
//! Loaded via `axoasset::SourceFile` plus a plain `serde::Deserialize`
//! struct — load/parse kept separate so the format ("whatever the config
//! file's extension says") stays swappable without touching the shape.

use axoasset::SourceFile;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use opkg_source::registry::RegistryMode;

/// The conventional filename for `opkg`'s own configuration, searched for
/// at the workspace root.
pub const CONFIG_FILENAME: &str = "opkg.config.json";

/// Default conflict-arbitration policy when a manifest doesn't declare an
/// explicit priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Earlier in install order wins (the default).
    #[default]
    InstallOrder,
    /// The package that declares the higher explicit `priority` wins,
    /// falling back to install order on a tie.
    ExplicitPriority,
}

/// Top-level, workspace-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OpkgConfig {
    /// Root directory for the registry/Git content-addressed caches
    ///.
    #[serde(default = "default_cache_root")]
    pub cache_root: Utf8PathBuf,
    /// Upper bound on how many independent flows/package loads a caller
    /// may run concurrently. `opkg`'s own `ops` entry points
    /// run sequentially regardless; this is a ceiling for callers that
    /// choose to parallelize.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// How to resolve conflicting writers when a manifest doesn't declare
    /// an explicit priority.
    #[serde(default)]
    pub default_conflict_policy: ConflictPolicy,
    /// Whether to consult the local registry cache first or always refetch.
    #[serde(default)]
    pub registry_mode: RegistryMode,
}

impl Default for OpkgConfig {
    fn default() -> Self {
        OpkgConfig {
            cache_root: default_cache_root(),
            concurrency: default_concurrency(),
            default_conflict_policy: ConflictPolicy::default(),
            registry_mode: RegistryMode::default(),
        }
    }
}

fn default_cache_root() -> Utf8PathBuf {
    Utf8PathBuf::from(".opkg-cache")
}

fn default_concurrency() -> usize {
    1
}

impl OpkgConfig {
    /// Load `opkg.config.json` from `workspace_root`, or fall back to
    /// defaults if it isn't present, same as the workspace index.
    pub fn load(workspace_root: &Utf8Path) -> Result<Self> {
        let path = workspace_root.join(CONFIG_FILENAME);
        if !path.is_file() {
            return Ok(OpkgConfig::default());
        }
        let source = SourceFile::load_local(&path)?;
        let config: OpkgConfig = source.deserialize_json()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let config = OpkgConfig::load(root).unwrap();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.default_conflict_policy, ConflictPolicy::InstallOrder);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::write(root.join(CONFIG_FILENAME), r#"{"concurrency": 4}"#).unwrap();
        let config = OpkgConfig::load(root).unwrap();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.cache_root, default_cache_root());
    }
}
