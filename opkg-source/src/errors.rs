//! Errors produced while classifying, loading, or base-detecting a source.

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

/// A Result returned by `opkg-source`.
pub type Result<T> = std::result::Result<T, SourceError>;

/// An error raised while turning a user-supplied input string into a
/// loaded, base-detected package.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum SourceError {
    /// Axoasset returned an error reading or parsing a file.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Axoasset(#[from] axoasset::AxoassetError),

    /// The input string didn't match any of the recognized source shapes.
    #[error("couldn't figure out what kind of source `{input}` is")]
    #[diagnostic(help(
        "expected a registry name, a `name@version`, a Git URL or `gh@owner/repo`, or a local path"
    ))]
    UnknownSourceShape {
        /// The raw input string.
        input: String,
    },

    /// A local path input pointed at a directory that doesn't exist.
    #[error("no such directory: {path}")]
    LocalDirNotFound {
        /// The path that was looked up.
        path: Utf8PathBuf,
    },

    /// A local path input pointed at a file that doesn't exist.
    #[error("no such file: {path}")]
    LocalFileNotFound {
        /// The path that was looked up.
        path: Utf8PathBuf,
    },

    /// A package manifest was missing or unreadable where one was required.
    #[error("couldn't find a manifest for this package at {content_root}")]
    ManifestNotFound {
        /// The content root that was searched.
        content_root: Utf8PathBuf,
    },

    /// Extracting a tarball into a temp dir failed.
    #[error("failed to extract archive {archive}")]
    ArchiveExtract {
        /// The archive path.
        archive: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        details: std::io::Error,
    },

    /// A collaborator-supplied registry client reported a failure.
    #[error("registry fetch failed for {name}: {details}")]
    RegistryFetch {
        /// The package that was requested.
        name: String,
        /// The collaborator's error message. Kept as a string since the
        /// collaborator's own error type is opaque to this crate (its
        /// network transport is out of scope here).
        details: String,
    },

    /// A collaborator-supplied Git fetcher reported a failure.
    #[error("git fetch failed for {url}: {details}")]
    GitFetch {
        /// The repository URL that was requested.
        url: String,
        /// The collaborator's error message.
        details: String,
    },

    /// The base detector found more than one distinct candidate base and no
    /// caller-supplied selection was made.
    #[error("ambiguous package base: {} candidates found", candidates.len())]
    AmbiguousBase {
        /// The candidate base directories, deepest-first.
        candidates: Vec<Utf8PathBuf>,
    },

    /// A catch-all for invariants this crate assumes can't be broken but
    /// has no more specific variant for.
    #[error("internal error in opkg-source: {0}")]
    Internal(String),
}
