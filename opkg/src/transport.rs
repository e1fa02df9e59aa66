//! Concrete [`GitFetcher`]/[`RegistryClient`] implementations for the real
//! `opkg` binary. Network and Git transport are explicit external
//! collaborator concerns, so `opkg-source` and `ops` only ever see the
//! trait objects; this module is where a caller actually has to pick
//! something.

use axoprocess::Cmd;
use camino::Utf8Path;
use opkg_schema::PackageName;
use opkg_source::{GitFetcher, RegistryClient};

/// Shells out to a real `git` binary for commit resolution and checkout
/// via `Cmd`-wrapped `git ls-remote`/`git clone`/`git checkout`.
pub struct ShellGitFetcher {
    git: String,
}

impl ShellGitFetcher {
    /// Build a fetcher that invokes `git` found on `PATH`.
    pub fn new() -> Self {
        Self { git: "git".to_string() }
    }
}

impl Default for ShellGitFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl GitFetcher for ShellGitFetcher {
    fn resolve_commit(&self, url: &str, git_ref: Option<&str>) -> Result<String, String> {
        let refspec = git_ref.unwrap_or("HEAD");
        let mut cmd = Cmd::new(&self.git, "resolve a git ref to a commit sha");
        cmd.arg("ls-remote")
            .arg(url)
            .arg(refspec)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .check(false);
        let output = cmd.output().map_err(|e| e.to_string())?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Some(line) = stdout.lines().next() {
            if let Some((sha, _)) = line.split_once('\t') {
                return Ok(sha.to_string());
            }
        }
        // `ls-remote` found nothing for a symbolic/short ref (e.g. a
        // literal commit sha was passed as `git_ref`); trust the caller.
        Ok(refspec.to_string())
    }

    fn checkout(&self, url: &str, commit_sha: &str, dest: &Utf8Path) -> Result<(), String> {
        let mut clone = Cmd::new(&self.git, "clone a git repository");
        clone
            .arg("clone")
            .arg("--quiet")
            .arg(url)
            .arg(dest.as_str())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .check(false);
        let status = clone.output().map_err(|e| e.to_string())?;
        if !status.status.success() {
            return Err(format!("git clone of {url} failed"));
        }

        let mut checkout = Cmd::new(&self.git, "check out a specific commit");
        checkout
            .arg("checkout")
            .arg("--quiet")
            .arg(commit_sha)
            .current_dir(dest)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .check(false);
        let status = checkout.output().map_err(|e| e.to_string())?;
        if !status.status.success() {
            return Err(format!("git checkout of {commit_sha} failed"));
        }
        Ok(())
    }
}

/// A registry client reading from a local mirror directory laid out as
/// `<mirror_root>/<name>/<version>/…` — the shape a registry fetch would
/// populate the cache with anyway. `--profile` selects which mirror root
/// to read from (e.g. a per-environment or per-auth-context directory);
/// `--api-key` is accepted for forward compatibility with a real HTTP
/// registry and currently unused by this offline implementation.
pub struct OfflineRegistryClient {
    mirror_root: camino::Utf8PathBuf,
}

impl OfflineRegistryClient {
    /// Build a client that reads packages from `mirror_root`.
    pub fn new(mirror_root: camino::Utf8PathBuf) -> Self {
        Self { mirror_root }
    }
}

impl RegistryClient for OfflineRegistryClient {
    fn fetch(
        &self,
        name: &PackageName,
        version: Option<&str>,
        dest: &Utf8Path,
    ) -> Result<(), String> {
        let mut src = self.mirror_root.join(name.as_str());
        if let Some(version) = version {
            src = src.join(version);
        } else {
            let mut versions: Vec<_> = src
                .read_dir_utf8()
                .map_err(|e| format!("couldn't list versions of {name} in mirror: {e}"))?
                .filter_map(|e| e.ok())
                .filter_map(|e| semver::Version::parse(e.file_name()).ok().map(|v| (v, e.file_name().to_string())))
                .collect();
            versions.sort_by(|a, b| a.0.cmp(&b.0));
            let (_, latest) = versions
                .pop()
                .ok_or_else(|| format!("no versions of {name} found in mirror"))?;
            src = src.join(latest);
        }
        copy_dir(&src, dest).map_err(|e| format!("couldn't copy {name} from mirror: {e}"))
    }
}

fn copy_dir(src: &Utf8Path, dest: &Utf8Path) -> std::io::Result<()> {
    for entry in walkdir::WalkDir::new(src).into_iter().filter_map(|e| e.ok()) {
        let Ok(path) = camino::Utf8PathBuf::from_path_buf(entry.path().to_path_buf()) else {
            continue;
        };
        let rel = path.strip_prefix(src).expect("walkdir yields children of src");
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&path, &target)?;
        }
    }
    Ok(())
}
