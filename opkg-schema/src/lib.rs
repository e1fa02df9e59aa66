#![deny(missing_docs)]

//! # opkg-schema
//!
//! Pure data model for `opkg`: packages, manifests, dependencies,
//! resources, flows, platform definitions, and the workspace index.
//! Nothing in this crate touches a filesystem, a network socket, or a
//! subprocess — that's `opkg-source` and `opkg`'s job. Keeping the schema
//! this thin means it can be shared, in principle, with a reporting tool
//! or a platform-definition author's linter without pulling in the rest
//! of the install pipeline.

mod conflict;
mod doc;
mod flow;
mod index;
mod macros;
mod manifest;
mod package;
mod platform;
mod resource;

pub use conflict::{ConflictReport, LoserRecord, ScalarConflict};
pub use doc::{Doc, DocFormat};
pub use flow::{
    ExtractOp, Flow, GlobList, MapArrayOp, MapOp, MapValuesOp, MergeStrategy, PartitionOn,
    PartitionOp, PipeOp, PipelineOp, ReduceKind, ReduceOp, RenameOp, SetOp, StringOp, ToOverride,
    ToTarget, TransformOp, UnsetOp, WhenExpr,
};
pub use index::{PackageIndexEntry, SortedMap, TargetMapping, WorkspaceIndex};
pub use manifest::{DependencyKind, DependencyShapeError, Manifest, ManifestDependency};
pub use package::{Package, PackageName, PackageNameRef, PlatformId, PlatformIdRef, SourceVariant};
pub use platform::{PlatformDefinition, GLOBAL_PLATFORM_ID};
pub use resource::{Resource, ResourceKind};
