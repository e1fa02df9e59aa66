//! Errors!
//!
//! `OpkgError` maps 1:1 onto the error taxonomy every component is
//! expected to raise into: `Validation`, `NotFound`, `Io`, `Network`,
//! `Parse`, `Conflict`, `Precondition`, `Cancelled`, `Internal`. Individual
//! modules raise the taxonomy variant that fits; nothing downstream needs
//! to know which module a given failure came from to decide how to react
//! to it (fatal vs. collectable-and-continue).

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

/// An alias for the common Result type for this crate.
pub type Result<T> = std::result::Result<T, OpkgError>;

/// Errors `opkg` can raise.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum OpkgError {
    /// Random i/o error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Random axoasset error (file read/write/parse).
    #[error(transparent)]
    #[diagnostic(transparent)]
    Asset(#[from] axoasset::AxoassetError),

    /// An error surfaced by `opkg-source` (classification, loading, base
    /// detection).
    #[error(transparent)]
    #[diagnostic(transparent)]
    Source(#[from] opkg_source::SourceError),

    /// The input, manifest, or flow document was malformed in a way the
    /// user can fix.
    #[error("{message}")]
    Validation {
        /// What's wrong.
        message: String,
    },

    /// Something the operation needed (a package, a target file, a
    /// workspace-index entry) wasn't there.
    #[error("not found: {what}")]
    NotFound {
        /// A human description of the missing thing.
        what: String,
    },

    /// A stand-in for errors from a network/VCS collaborator. No network
    /// code lives in this crate, but the variant exists so a collaborator's
    /// error can be wrapped without inventing a new taxonomy bucket for it.
    #[error("network error: {message}")]
    Network {
        /// The collaborator's error message.
        message: String,
    },

    /// A source document failed to parse in its declared format.
    #[error("failed to parse {path} as {format}")]
    Parse {
        /// The file that failed to parse.
        path: Utf8PathBuf,
        /// The format it was parsed as.
        format: String,
        /// The underlying error, if the format's parser produced one.
        #[source]
        details: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    /// An unresolvable version or file conflict: either a dependency's
    /// version requirements couldn't be unified and no conflict handler
    /// was supplied to break the tie, or two or more packages contended
    /// for the same file target in a way arbitration couldn't settle.
    #[error("{message}")]
    Conflict {
        /// What's in conflict, and why it couldn't be resolved
        /// automatically.
        message: String,
    },

    /// A precondition the operation depends on wasn't met, other than an
    /// unresolvable conflict (see [`OpkgError::Conflict`] for that case).
    #[error("{message}")]
    Precondition {
        /// What precondition was violated.
        message: String,
    },

    /// The operation was interactively cancelled by the user.
    #[error("cancelled")]
    Cancelled,

    /// A catch-all for invariants this crate assumes can't be broken but
    /// has no more specific variant for.
    #[error("internal error in opkg: {0}")]
    Internal(String),
}

impl OpkgError {
    /// Build a [`OpkgError::Validation`] from a `format!`-style message.
    pub fn validation(message: impl Into<String>) -> Self {
        OpkgError::Validation {
            message: message.into(),
        }
    }

    /// Build a [`OpkgError::NotFound`] from a `format!`-style description.
    pub fn not_found(what: impl Into<String>) -> Self {
        OpkgError::NotFound { what: what.into() }
    }

    /// Build a [`OpkgError::Precondition`] from a `format!`-style message.
    pub fn precondition(message: impl Into<String>) -> Self {
        OpkgError::Precondition {
            message: message.into(),
        }
    }

    /// Build a [`OpkgError::Conflict`] from a `format!`-style message.
    pub fn conflict(message: impl Into<String>) -> Self {
        OpkgError::Conflict {
            message: message.into(),
        }
    }
}
