//! Flows: declarative rules mapping package source files to workspace
//! targets, and the map pipeline operations a flow may run along the way.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::doc::Doc;

/// A `from`/`to` glob pattern, or an ordered list of them (first match
/// wins; the flow engine warns when a later pattern in the list also had a
/// match, since that match was silently skipped).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum GlobList {
    /// A single glob pattern.
    Single(String),
    /// An ordered priority list of glob patterns.
    Priority(Vec<String>),
}

impl GlobList {
    /// View this as a slice of patterns, in priority order.
    pub fn patterns(&self) -> &[String] {
        match self {
            GlobList::Single(s) => std::slice::from_ref(s),
            GlobList::Priority(list) => list,
        }
    }
}

/// A flow's `to` target: either one target path, or a mapping from target
/// paths to per-target overrides (a "multi-target flow", spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ToTarget {
    /// A single target glob/path.
    Single(String),
    /// Several targets, each with its own override of the enclosing flow's
    /// merge/pick/omit/embed/map settings.
    Multi(IndexMap<String, ToOverride>),
}

/// Per-target overrides available on a [`ToTarget::Multi`] entry. Any field
/// left `None` falls back to the enclosing [`Flow`]'s setting.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct ToOverride {
    /// Override of the enclosing flow's `when` condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<WhenExpr>,
    /// Override of the enclosing flow's merge strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeStrategy>,
    /// Override of the enclosing flow's `pick` list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pick: Option<Vec<String>>,
    /// Override of the enclosing flow's `omit` list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omit: Option<Vec<String>>,
    /// Override of the enclosing flow's `embed` key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<String>,
    /// Override of the enclosing flow's map pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<Vec<MapOp>>,
}

/// How a flow's source content is merged into a pre-existing target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// The source content replaces the target wholesale.
    #[default]
    Replace,
    /// Union of top-level keys; source wins on overlap.
    Shallow,
    /// Recursive merge; source wins scalar conflicts, arrays concatenate.
    Deep,
    /// Text-level merge for Markdown-like files using per-package
    /// delimiter comments.
    Composite,
}

/// A boolean condition over the flow context's well-known variables
/// (`$$platform`, `$$source`, `$$targetRoot`) plus `exists` path checks.
///
/// Represented as a raw [`Doc`] rather than a closed Rust enum: its shape
/// is a small nested-object grammar (`{"$eq": [lhs, rhs]}`,
/// `{"$and": [...]}`, `{"$not": expr}`, `{"exists": "path"}`) that's far
/// more natural to walk generically than to force through serde's tagged-
/// enum machinery. The evaluator lives in `opkg::flow::when`, next to the
/// rest of the flow engine's logic.
pub type WhenExpr = Doc;

/// A declarative transformation rule belonging to a platform.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct Flow {
    /// Source glob pattern(s), matched against the package's base.
    pub from: GlobList,
    /// Target path(s) in the workspace.
    pub to: ToTarget,
    /// Condition gating whether this flow runs at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<WhenExpr>,
    /// How to merge into a pre-existing target file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeStrategy>,
    /// Keys to keep (dotted paths); mutually exclusive with `omit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pick: Option<Vec<String>>,
    /// Keys to drop (dotted paths); mutually exclusive with `pick`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omit: Option<Vec<String>>,
    /// A JSONPath-style expression to extract a sub-document before
    /// further processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// If set, wraps the document as `{<embed>: <data>}` before merging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<String>,
    /// The map pipeline to run (schema ops before merge, `$pipe` ops
    /// after).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<Vec<MapOp>>,
}

/// One structural operation in a map pipeline.
///
/// Modeled as a closed, externally-tagged enum (spec Design Notes: "tagged
/// variants over dynamic dispatch") rather than a trait object — an
/// unrecognized `$foo` key is a deserialization error, which is exactly
/// the "unknown variants are validation errors at load time" behavior the
/// spec wants.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub enum MapOp {
    /// Rename a (possibly dotted, possibly wildcarded) key.
    #[serde(rename = "$rename")]
    Rename(RenameOp),
    /// Set a dotted path to a literal or a `$$variable` reference.
    #[serde(rename = "$set")]
    Set(SetOp),
    /// Delete a dotted path.
    #[serde(rename = "$unset")]
    Unset(UnsetOp),
    /// Apply a nested operation sequence restricted to a field selector.
    #[serde(rename = "$pipeline")]
    Pipeline(PipelineOp),
    /// Regex-extract a value out of the current field.
    #[serde(rename = "$extract")]
    Extract(ExtractOp),
    /// Split a mapping into named sub-mappings by key/value regex buckets.
    #[serde(rename = "$partition")]
    Partition(PartitionOp),
    /// Apply a nested pipeline to each value of a mapping.
    #[serde(rename = "$mapValues")]
    MapValues(MapValuesOp),
    /// Aggregate an array (or turn a scalar into one), e.g. a string
    /// split.
    #[serde(rename = "$reduce")]
    Reduce(ReduceOp),
    /// Transform every element of an array.
    #[serde(rename = "$map")]
    MapArray(MapArrayOp),
    /// An arbitrary step sequence on a field; unsets the field if the
    /// final result is empty rather than assigning empty.
    #[serde(rename = "$transform")]
    Transform(TransformOp),
    /// A named format/codec transform, run after merge.
    #[serde(rename = "$pipe")]
    Pipe(PipeOp),
}

/// `$rename` parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct RenameOp {
    /// The (possibly dotted, possibly `*`-wildcarded) source key path.
    pub from: String,
    /// The new key name to use at that position.
    pub to: String,
}

/// `$set` parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct SetOp {
    /// The dotted path to assign.
    pub path: String,
    /// The value to assign. A string equal to a recognized `$$variable`
    /// (`$$filename`, `$$dirname`, `$$path`, `$$ext`, or a context
    /// variable) is substituted at apply time instead of taken literally.
    pub value: Doc,
}

/// `$unset` parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct UnsetOp {
    /// The dotted path to delete.
    pub path: String,
}

/// `$pipeline` parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineOp {
    /// The field selector this pipeline is restricted to (supports `*` to
    /// match each entry of an array or mapping).
    pub field: String,
    /// The nested operation sequence to run against the selected field.
    pub ops: Vec<MapOp>,
}

/// `$extract` parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct ExtractOp {
    /// The regex pattern to match against the current field's string
    /// value.
    pub pattern: String,
    /// Which capture group to extract.
    pub group: usize,
    /// The value to use if the pattern doesn't match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Which part of a mapping entry [`PartitionOp`] buckets by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum PartitionOn {
    /// Bucket by matching the entry's key.
    Key,
    /// Bucket by matching the entry's (string) value.
    Value,
}

/// `$partition` parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionOp {
    /// The field (a mapping) to partition.
    pub field: String,
    /// Whether buckets match against keys or values.
    pub on: PartitionOn,
    /// Bucket name -> regex pattern. An entry goes to the first bucket
    /// whose pattern matches.
    pub buckets: IndexMap<String, String>,
}

/// `$mapValues` parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct MapValuesOp {
    /// The field (a mapping) whose values the nested pipeline runs over.
    pub field: String,
    /// The nested operation sequence, run with the mapping value as the
    /// pipeline's current document.
    pub ops: Vec<MapOp>,
}

/// The aggregation a [`ReduceOp`] performs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum ReduceKind {
    /// Split a string field into an array on `separator`.
    Split {
        /// The separator string to split on.
        separator: String,
    },
    /// Join an array field into a string with `separator`.
    Join {
        /// The separator string to join with.
        separator: String,
    },
}

/// `$reduce` parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct ReduceOp {
    /// The field to aggregate.
    pub field: String,
    /// How to aggregate it.
    #[serde(flatten)]
    pub kind: ReduceKind,
}

/// A named, closed set of scalar string transforms usable by `$map`'s
/// `each`. Unknown names are a load-time validation error (serde rejects
/// them), matching the spec's "unknown variants are validation errors"
/// rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum StringOp {
    /// Lowercase the string.
    Lowercase,
    /// Uppercase the string.
    Uppercase,
    /// Trim leading/trailing whitespace.
    Trim,
}

/// `$map` parameters: array transform. Exactly one of `each`/`replace`
/// should be set (both or neither is a validation error, checked by the
/// map pipeline's pre-execution validation pass, not by the type system,
/// since the spec treats "neither set" as an error rather than a no-op).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct MapArrayOp {
    /// The field (an array) to transform.
    pub field: String,
    /// Apply this named scalar op to every element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub each: Option<StringOp>,
    /// Replace each element found as a key in this lookup table with its
    /// value; elements not present pass through unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace: Option<IndexMap<String, String>>,
}

/// `$transform` parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct TransformOp {
    /// The field the step sequence runs against.
    pub field: String,
    /// The steps to run, in order.
    pub steps: Vec<MapOp>,
}

/// `$pipe` parameters: a named post-merge format/codec conversion.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct PipeOp {
    /// The named conversion to run, e.g. `json-to-toml`.
    pub name: String,
}
