//! Platform-definition loading. The document itself is owned by a
//! collaborator; this module only knows how to find and parse one off
//! disk.

use camino::Utf8Path;
use opkg_schema::{PlatformDefinition, GLOBAL_PLATFORM_ID};

use crate::errors::Result;
use axoasset::SourceFile;

/// Load every `*.json` platform definition found directly inside `dir`.
///
/// Each file is expected to deserialize to a single [`PlatformDefinition`];
/// the reserved `global` platform (see [`GLOBAL_PLATFORM_ID`]) is an
/// ordinary file among the rest, distinguished only by its `name` field.
pub fn load_platform_definitions(dir: &Utf8Path) -> Result<Vec<PlatformDefinition>> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    let mut entries: Vec<_> = dir
        .read_dir_utf8()
        .map_err(|e| crate::errors::OpkgError::Io(e))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension() == Some("json"))
        .collect();
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    for entry in entries {
        let source = SourceFile::load_local(entry.path())?;
        let definition: PlatformDefinition = source.deserialize_json()?;
        out.push(definition);
    }
    Ok(out)
}

/// Split a loaded set of platform definitions into the reserved global
/// bucket of flows (if present) and the ordinary per-platform entries.
pub fn split_global<'a>(
    platforms: &'a [PlatformDefinition],
) -> (Option<&'a PlatformDefinition>, Vec<&'a PlatformDefinition>) {
    let global = platforms.iter().find(|p| p.is_global());
    let rest = platforms
        .iter()
        .filter(|p| p.name.as_str() != GLOBAL_PLATFORM_ID)
        .collect();
    (global, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    #[test]
    fn missing_dir_yields_empty_list() {
        let dir = TempDir::new().unwrap();
        let missing = Utf8Path::from_path(dir.path()).unwrap().join("nope");
        assert!(load_platform_definitions(&missing).unwrap().is_empty());
    }

    #[test]
    fn loads_and_splits_global_platform() {
        let dir = TempDir::new().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::write(
            root.join("global.json"),
            r#"{"name": "global", "rootDir": ".", "detection": [], "import": [], "export": []}"#,
        )
        .unwrap();
        std::fs::write(
            root.join("cursor.json"),
            r#"{"name": "cursor", "rootDir": ".cursor", "detection": [], "import": [], "export": []}"#,
        )
        .unwrap();

        let platforms = load_platform_definitions(root).unwrap();
        assert_eq!(platforms.len(), 2);
        let (global, rest) = split_global(&platforms);
        assert!(global.is_some());
        assert_eq!(rest.len(), 1);
    }
}
