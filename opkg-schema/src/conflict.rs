//! Records produced by the conflict & priority resolver, and by a deep
//! merge's scalar-conflict bookkeeping.

use camino::Utf8PathBuf;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::package::PackageName;

/// A single target path multiple packages would write, and who won.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct ConflictReport {
    /// The contested target path.
    pub target: Utf8PathBuf,
    /// The package whose write was committed.
    pub winner: PackageName,
    /// The packages whose write was not committed (or was relocated).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub losers: Vec<LoserRecord>,
}

/// What happened to a losing package's write in a [`ConflictReport`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct LoserRecord {
    /// The package that lost arbitration for this target.
    pub package: PackageName,
    /// If the resolver relocated this package's write rather than simply
    /// dropping it, the path it was relocated to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relocated_to: Option<Utf8PathBuf>,
}

/// A single scalar conflict recorded during a `deep` merge (spec §4.4 step
/// 9): two values disagreed at `path` and the source's value won.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct ScalarConflict {
    /// The dotted path at which the conflict occurred.
    pub path: String,
    /// The package whose value was kept.
    pub winner: PackageName,
    /// The packages whose value at this path was discarded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub losers: Vec<PackageName>,
}
