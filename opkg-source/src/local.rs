//! Local-path loading: the only loader with no network/VCS collaborator,
//! since it touches neither.

use std::fs::File;

use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest, Sha256};

use crate::errors::{Result, SourceError};
use crate::load::LoadedPackage;
use opkg_schema::SourceVariant;

/// Load a local-path source. Directories are used directly; recognized
/// archive files are extracted into a subdirectory of `temp_root` first.
pub fn load_local(path: &Utf8Path, temp_root: &Utf8Path) -> Result<LoadedPackage> {
    if path.is_dir() {
        return LoadedPackage::from_content_root(
            path.to_path_buf(),
            SourceVariant::LocalPath {
                path: path.to_path_buf(),
            },
        );
    }

    if !path.is_file() {
        return Err(SourceError::LocalFileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content_root = if is_archive(path) {
        extract_archive(path, temp_root)?
    } else {
        path.parent().map(Utf8Path::to_path_buf).unwrap_or_default()
    };

    LoadedPackage::from_content_root(
        content_root,
        SourceVariant::LocalPath {
            path: path.to_path_buf(),
        },
    )
}

fn is_archive(path: &Utf8Path) -> bool {
    let name = path.file_name().unwrap_or_default();
    name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".tar")
}

fn extract_archive(archive: &Utf8Path, temp_root: &Utf8Path) -> Result<Utf8PathBuf> {
    let dest = temp_root.join(archive_dest_name(archive));
    std::fs::create_dir_all(&dest).map_err(|details| SourceError::ArchiveExtract {
        archive: archive.to_path_buf(),
        details,
    })?;

    let file = File::open(archive).map_err(|details| SourceError::ArchiveExtract {
        archive: archive.to_path_buf(),
        details,
    })?;

    let unpack_result = if archive.as_str().ends_with(".tar.gz") || archive.as_str().ends_with(".tgz") {
        let decoder = flate2::read::GzDecoder::new(file);
        tar::Archive::new(decoder).unpack(&dest)
    } else {
        tar::Archive::new(file).unpack(&dest)
    };
    unpack_result.map_err(|details| SourceError::ArchiveExtract {
        archive: archive.to_path_buf(),
        details,
    })?;

    Ok(dest)
}

/// A stable, collision-resistant directory name for one archive's
/// extraction target, so re-extracting the same archive path reuses the
/// same temp subdirectory within a run.
fn archive_dest_name(archive: &Utf8Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(archive.as_str().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    #[test]
    fn directory_source_uses_itself_as_content_root() {
        let dir = TempDir::new().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let loaded = load_local(root, root).unwrap();
        assert_eq!(loaded.content_root, root);
    }

    #[test]
    fn missing_path_is_not_found() {
        let dir = TempDir::new().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let missing = root.join("nope");
        let err = load_local(&missing, root).unwrap_err();
        assert!(matches!(err, SourceError::LocalFileNotFound { .. }));
    }

    #[test]
    fn archive_dest_name_is_stable_for_same_path() {
        let a = archive_dest_name(Utf8Path::new("/tmp/foo.tar.gz"));
        let b = archive_dest_name(Utf8Path::new("/tmp/foo.tar.gz"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }
}
