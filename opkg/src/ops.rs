//! The orchestration layer: wires every already-built collaborator
//! (`opkg_source`, `resolver`, `flow`, `conflict`, `index`, `save`,
//! `uninstall`, `resources`, `cache`) into the end-to-end control flow for
//! each command — this is the only module that actually touches the
//! filesystem outside of the collaborators' injected closures.
//!
//! `ops` is also where deliberately-unspecified ambiguities get a concrete
//! answer: mixing `--plugins` with `--agents`/`--skills` is a
//! [`OpkgError::Validation`] raised here, not in any collaborator.

use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};
use opkg_schema::{
    ManifestDependency, Package, PackageName, PlatformDefinition, PlatformId, Resource,
    ResourceKind, SourceVariant,
};

use crate::cache::{Scope, TempRoot};
use crate::conflict::{self, Decision, PackageWrites};
use crate::config::OpkgConfig;
use crate::errors::{OpkgError, Result};
use crate::flow::{self, FlowContext, FlowWrite};
use crate::index;
use crate::platform;
use crate::resolver::{self, DependencyLoader, ResolveOutcome};
use crate::resources;
use crate::save;
use crate::uninstall;
use opkg_source::{GitFetcher, RegistryClient};

/// The conventional directory platform definitions are loaded from,
/// relative to the workspace root.
pub const PLATFORMS_DIR: &str = ".opkg/platforms";

/// What happens to a write contended by more than one package, selected by
/// `--conflicts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// The winner is written in place; losers are relocated under
    /// `_conflicts/<package>/…` (the default).
    #[default]
    KeepBoth,
    /// The winner is written in place; losers are dropped entirely.
    Overwrite,
    /// The whole contested target is left untouched; nothing is written
    /// for it by anyone.
    Skip,
    /// An interactive caller is asked to pick; non-interactively this
    /// behaves like `KeepBoth`.
    Ask,
}

/// A loaded, not-yet-base-detected workspace session: configuration,
/// platform definitions, and the collaborators needed to load sources.
pub struct Workspace<'a> {
    /// The workspace root every target path is relative to.
    pub root: Utf8PathBuf,
    /// Workspace-wide configuration (cache root, concurrency, default
    /// conflict policy, registry mode).
    pub config: OpkgConfig,
    /// Every loaded platform definition, including the reserved `global`
    /// bucket if present.
    pub platforms: Vec<PlatformDefinition>,
    /// The registry transport collaborator.
    pub registry: &'a dyn RegistryClient,
    /// The Git transport collaborator.
    pub git: &'a dyn GitFetcher,
    /// The process-scoped temp root for archive extraction.
    pub temp_root: TempRoot,
    /// An interactive version-conflict handler, consulted when a wave
    /// resolution can't unify a package's version ranges. `None` in
    /// non-interactive contexts (tests, `--force`, piped stdin), in which
    /// case an unresolvable version conflict is always fatal.
    pub conflict_handler: Option<&'a dyn resolver::ConflictHandler>,
}

impl<'a> Workspace<'a> {
    /// Open a workspace rooted at `root`: loads `opkg.config.json` and
    /// every platform definition under [`PLATFORMS_DIR`].
    pub fn open(
        root: Utf8PathBuf,
        registry: &'a dyn RegistryClient,
        git: &'a dyn GitFetcher,
    ) -> Result<Self> {
        let config = OpkgConfig::load(&root)?;
        let platforms = platform::load_platform_definitions(&root.join(PLATFORMS_DIR))?;
        let temp_root = TempRoot::new()?;
        Ok(Workspace {
            root,
            config,
            platforms,
            registry,
            git,
            temp_root,
            conflict_handler: None,
        })
    }

    /// Attach an interactive version-conflict handler to an already-opened
    /// workspace (the CLI binary does this when stdin is a TTY and
    /// `--force` isn't set).
    pub fn with_conflict_handler(mut self, handler: &'a dyn resolver::ConflictHandler) -> Self {
        self.conflict_handler = Some(handler);
        self
    }

    fn cache_root(&self) -> Utf8PathBuf {
        self.root.join(&self.config.cache_root)
    }
}

/// Narrows which of a package's resources an install/view/remove command
/// actually touches.
#[derive(Debug, Clone, Default)]
pub struct ResourceFilter {
    /// Resource kinds selected by `--agents`/`--skills`/`--plugins`
    /// (`--plugins` selects every kind; the others narrow to one).
    pub kinds: Vec<ResourceKind>,
    /// Exact resource names selected alongside `kinds`.
    pub names: Vec<String>,
}

impl ResourceFilter {
    fn is_empty(&self) -> bool {
        self.kinds.is_empty() && self.names.is_empty()
    }
}

/// `--plugins` (meaning "every resource kind") cannot be combined with a
/// kind-narrowing flag like `--agents`/`--skills` — treated as a
/// validation error rather than a silent precedence rule.
pub fn validate_resource_flags(plugins: bool, agents: &[String], skills: &[String]) -> Result<()> {
    if plugins && (!agents.is_empty() || !skills.is_empty()) {
        return Err(OpkgError::validation(
            "--plugins selects every resource kind and cannot be combined with --agents/--skills",
        ));
    }
    Ok(())
}

/// Options controlling a single [`install`] call.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// The raw input string (CLI arg, or a manifest dependency's own
    /// fields folded into one string form by the caller).
    pub input: String,
    /// Restrict installation to these platforms; empty means every loaded
    /// platform.
    pub platforms: Vec<PlatformId>,
    /// Restrict installation to these resources; empty means everything.
    pub resources: ResourceFilter,
    /// Don't write anything; just report what would happen.
    pub dry_run: bool,
    /// Proceed without interactive prompts, taking the non-interactive
    /// default at every decision point.
    pub force: bool,
    /// How to arbitrate a target more than one package wants to write.
    pub conflicts: ConflictPolicy,
    /// The registry mode override for this command, if any (`--remote`/
    /// `--local`).
    pub registry_mode: Option<opkg_source::RegistryMode>,
}

/// One package's outcome within an [`InstallReport`].
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    /// The package's normalized name.
    pub name: PackageName,
    /// The package's resolved version, if any.
    pub version: Option<semver::Version>,
    /// Targets actually written (or that would be, under `--dry-run`).
    pub written: Vec<Utf8PathBuf>,
    /// Non-fatal warnings collected while running this package's flows.
    pub warnings: Vec<String>,
}

/// The full outcome of an [`install`] call.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    /// Every package actually (or hypothetically, under `--dry-run`)
    /// installed.
    pub installed: Vec<InstalledPackage>,
    /// Packages skipped because they were already fully installed
    /// (subsumption) when only a subset install was requested.
    pub already_covered: Vec<PackageName>,
    /// Conflicts arbitrated during this install.
    pub conflicts: Vec<opkg_schema::ConflictReport>,
    /// Per-flow failures, prefixed with the package they belong to; these
    /// don't abort the install — collected so siblings keep running.
    pub failures: Vec<String>,
}

struct OpsLoader<'a> {
    workspace: &'a Workspace<'a>,
    registry_mode: opkg_source::RegistryMode,
}

impl<'a> DependencyLoader for OpsLoader<'a> {
    fn load(&self, dep: &ManifestDependency) -> Result<Package> {
        load_dependency(self.workspace, dep, self.registry_mode).map(loaded_to_package)
    }

    fn available_versions(&self, name: &PackageName) -> Result<Vec<semver::Version>> {
        let registry_dir = self.workspace.cache_root().join("registry").join(name.as_str());
        if !registry_dir.is_dir() {
            return Ok(vec![]);
        }
        let mut versions = Vec::new();
        for entry in registry_dir
            .read_dir_utf8()
            .map_err(OpkgError::Io)?
            .filter_map(|e| e.ok())
        {
            if let Ok(version) = semver::Version::parse(entry.file_name()) {
                versions.push(version);
            }
        }
        Ok(versions)
    }
}

fn loaded_to_package(loaded: opkg_source::LoadedPackage) -> Package {
    Package {
        name: loaded.name,
        version: loaded.version,
        manifest: loaded.manifest,
        content_root: loaded.content_root,
        source: loaded.source,
        is_marketplace: loaded.is_marketplace,
    }
}

/// Load a single source variant into a [`opkg_source::LoadedPackage`],
/// dispatching to whichever loader matches the dependency's source kind.
fn load_dependency(
    workspace: &Workspace,
    dep: &ManifestDependency,
    registry_mode: opkg_source::RegistryMode,
) -> Result<opkg_source::LoadedPackage> {
    use opkg_schema::DependencyKind;
    match dep.kind() {
        DependencyKind::Registry => {
            let name = dep.package_name();
            Ok(opkg_source::load_registry(
                &name,
                dep.version.as_deref(),
                &workspace.cache_root(),
                registry_mode,
                workspace.registry,
            )?)
        }
        DependencyKind::Git => {
            let url = dep.url.as_deref().ok_or_else(|| {
                OpkgError::validation(format!("dependency `{}` has no url", dep.name))
            })?;
            Ok(opkg_source::load_git(
                url,
                dep.git_ref.as_deref(),
                dep.path.as_deref(),
                &workspace.cache_root(),
                workspace.git,
            )?)
        }
        DependencyKind::Local => {
            let path = dep.path.as_deref().ok_or_else(|| {
                OpkgError::validation(format!("dependency `{}` has no path", dep.name))
            })?;
            let resolved = resolve_local_path(&workspace.root, path);
            Ok(opkg_source::load_local(&resolved, workspace.temp_root.path())?)
        }
    }
}

fn resolve_local_path(cwd: &Utf8Path, raw: &str) -> Utf8PathBuf {
    let raw_path = Utf8Path::new(raw);
    if raw_path.is_absolute() {
        raw_path.to_path_buf()
    } else {
        cwd.join(raw_path)
    }
}

/// Build the synthetic root [`ManifestDependency`] a raw CLI/`add` input
/// resolves to, after peeking the source just enough to learn its real
/// name (resolution keys every node by `dep.name`, so the root needs one
/// just like any transitive dependency would).
fn root_dependency(
    workspace: &Workspace,
    input: &str,
    registry_mode: opkg_source::RegistryMode,
) -> Result<(ManifestDependency, opkg_source::LoadedPackage)> {
    let variant = opkg_source::classify(input, &workspace.root)?;
    let loaded = load_variant(workspace, &variant, registry_mode)?;
    let dep = match &variant {
        SourceVariant::Registry { name, version } => ManifestDependency {
            name: loaded.name.as_str().to_string(),
            version: version.clone(),
            url: None,
            git_ref: None,
            path: None,
            base: None,
        },
        SourceVariant::Git { url, git_ref, resource_filter } => ManifestDependency {
            name: loaded.name.as_str().to_string(),
            version: None,
            url: Some(url.clone()),
            git_ref: git_ref.clone(),
            path: resource_filter.clone(),
            base: None,
        },
        SourceVariant::LocalPath { path } => ManifestDependency {
            name: loaded.name.as_str().to_string(),
            version: None,
            url: None,
            git_ref: None,
            path: Some(path.as_str().to_string()),
            base: None,
        },
    };
    Ok((dep, loaded))
}

fn load_variant(
    workspace: &Workspace,
    variant: &SourceVariant,
    registry_mode: opkg_source::RegistryMode,
) -> Result<opkg_source::LoadedPackage> {
    match variant {
        SourceVariant::Registry { name, version } => Ok(opkg_source::load_registry(
            name,
            version.as_deref(),
            &workspace.cache_root(),
            registry_mode,
            workspace.registry,
        )?),
        SourceVariant::Git { url, git_ref, resource_filter } => Ok(opkg_source::load_git(
            url,
            git_ref.as_deref(),
            resource_filter.as_deref(),
            &workspace.cache_root(),
            workspace.git,
        )?),
        SourceVariant::LocalPath { path } => {
            Ok(opkg_source::load_local(path, workspace.temp_root.path())?)
        }
    }
}

/// List every file under `dir`, relative to `dir` itself, skipping the
/// workspace index/config files one would never find inside a package
/// anyway (those live at the workspace root, not a package's content
/// root).
fn list_files_under(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(path) = Utf8PathBuf::from_path_buf(entry.path().to_path_buf()) else {
            continue;
        };
        if let Ok(rel) = path.strip_prefix(dir) {
            out.push(rel.to_path_buf());
        }
    }
    out.sort();
    Ok(out)
}

fn detect_base(package: &Package, platforms: &[PlatformDefinition]) -> Result<Utf8PathBuf> {
    let outcome = opkg_source::detect_base(
        &package.content_root,
        package.manifest.base.as_deref(),
        platforms,
    )?;
    match outcome {
        opkg_source::BaseOutcome::Base { base, .. } => Ok(base),
        opkg_source::BaseOutcome::Marketplace => Ok(Utf8PathBuf::new()),
        opkg_source::BaseOutcome::Ambiguous { candidates } => {
            // Non-interactive default: the
            // deepest match wins, annotated as an auto-selected choice.
            let deepest = candidates
                .into_iter()
                .max_by_key(|c| c.depth)
                .expect("ambiguous outcome always carries at least one candidate");
            Ok(deepest.base)
        }
    }
}

/// Resolve `input` and its transitive dependencies, base-
/// detecting every resolved node along the way.
fn resolve_graph(
    workspace: &Workspace,
    input: &str,
    registry_mode: opkg_source::RegistryMode,
) -> Result<(PackageName, ResolveOutcome, std::collections::HashMap<PackageName, Utf8PathBuf>)> {
    let (root_dep, _root_loaded) = root_dependency(workspace, input, registry_mode)?;
    let root_name = root_dep.package_name();

    let loader = OpsLoader { workspace, registry_mode };
    let outcome = resolver::resolve(&[root_dep], &loader, workspace.conflict_handler)?;

    let mut bases = std::collections::HashMap::new();
    for (name, node) in &outcome.nodes {
        if node.is_marketplace {
            continue;
        }
        let base = detect_base(&node.package, &workspace.platforms)?;
        bases.insert(name.clone(), base);
    }

    Ok((root_name, outcome, bases))
}

/// For a Git-sourced package, the conversion-cache directory its install
/// scope (`--agents`/`--skills`/a resource path filter, or none of those)
/// occupies, with stale sibling scopes pruned. Copies
/// `files` into it and returns the directory to read them back from.
///
/// Registry and local-path sources skip this — their cache entries are
/// already keyed by `(name, version)` or aren't cached at all, so there's
/// no cross-scope contamination to guard against.
fn materialize_git_scope(
    package: &Package,
    files: &[Utf8PathBuf],
    scope_key: Option<&str>,
) -> Result<Option<Utf8PathBuf>> {
    if !matches!(package.source, SourceVariant::Git { .. }) {
        return Ok(None);
    }
    let scope = match scope_key {
        Some(key) => Scope::Subset(key.to_string()),
        None => Scope::Full,
    };
    let converted_root = package.content_root.join(".opkg-converted");
    let dest = crate::cache::scope_dir(&converted_root, &scope, &list_siblings)?;
    for file in files {
        let src = package.content_root.join(file);
        let dst = dest.join(file);
        if let Some(parent) = dst.parent() {
            axoasset::LocalAsset::create_dir_all(parent)?;
        }
        std::fs::copy(&src, &dst).map_err(OpkgError::Io)?;
    }
    Ok(Some(dest))
}

fn list_siblings(dir: &Utf8Path) -> Vec<Utf8PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return vec![];
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| Utf8PathBuf::from_path_buf(e.path()).ok())
        .collect()
}

/// A stable key describing an active install-scope filter, for naming the
/// Git conversion-cache subset directory. `None` means the full package.
fn scope_key(resource_filter: &ResourceFilter, resource_path_filter: Option<&str>) -> Option<String> {
    if resource_filter.is_empty() && resource_path_filter.is_none() {
        return None;
    }
    let mut parts = Vec::new();
    if let Some(path) = resource_path_filter {
        parts.push(format!("path={path}"));
    }
    if !resource_filter.kinds.is_empty() {
        parts.push(format!("kinds={:?}", resource_filter.kinds));
    }
    if !resource_filter.names.is_empty() {
        let mut names = resource_filter.names.clone();
        names.sort();
        parts.push(format!("names={}", names.join(",")));
    }
    Some(parts.join(";"))
}

/// Run every selected platform's global+platform flows for one resolved
/// node, returning its writes tagged with a conflict-arbitration priority.
fn plan_package_writes(
    workspace: &Workspace,
    package: &Package,
    base: &Utf8Path,
    priority: i64,
    selected_platforms: &[&PlatformDefinition],
    global: Option<&PlatformDefinition>,
    resource_filter: &ResourceFilter,
    resource_path_filter: Option<&str>,
) -> Result<(Vec<FlowWrite>, Vec<String>, Vec<String>)> {
    let package_root = package.content_root.join(base);
    let all_files = list_files_under(&package_root)?;

    let files: Vec<Utf8PathBuf> = if resource_filter.is_empty() && resource_path_filter.is_none() {
        all_files.clone()
    } else {
        let resources = resources::discover(base, &|_| Ok(all_files.clone()))?;
        let wanted: BTreeSet<Utf8PathBuf> = resources::filter(&resources, &resource_filter.kinds, &resource_filter.names)
            .into_iter()
            .map(|r| r.source_path.clone())
            .collect();
        all_files
            .iter()
            .filter(|f| {
                let kept_by_resource = wanted.is_empty() || wanted.contains(*f);
                let kept_by_path = resource_path_filter
                    .map(|p| f.as_str().starts_with(p))
                    .unwrap_or(true);
                kept_by_resource && kept_by_path
            })
            .cloned()
            .collect()
    };

    let scope = scope_key(resource_filter, resource_path_filter);
    let effective_root = materialize_git_scope(package, &files, scope.as_deref())?.unwrap_or_else(|| package_root.clone());

    let mut writes = Vec::new();
    let mut warnings = Vec::new();
    let mut failures = Vec::new();

    for platform in selected_platforms {
        let mut flows: Vec<&opkg_schema::Flow> = Vec::new();
        if let Some(global) = global {
            flows.extend(global.export.iter());
        }
        flows.extend(platform.export.iter());
        if flows.is_empty() {
            continue;
        }

        let read_source = {
            let root = effective_root.clone();
            move |p: &Utf8Path| -> Result<String> {
                axoasset::LocalAsset::load_string(&root.join(p)).map_err(OpkgError::from)
            }
        };
        let target_root = workspace.root.clone();
        let read_target = move |p: &Utf8Path| -> Option<String> {
            let full = target_root.join(p);
            axoasset::LocalAsset::load_string(&full).ok()
        };

        let ctx = FlowContext {
            package_name: package.name.clone(),
            package_version: package.version.clone(),
            priority,
            platform: platform.name.clone(),
            source_kind: package.source.kind_str(),
            target_root: workspace.root.clone(),
            source_file: Utf8PathBuf::new(),
            dry_run: false,
        };

        let outcome = flow::run_flows(&flows, &files, &ctx, &read_source, &read_target);
        warnings.extend(outcome.warnings.into_iter().map(|w| format!("{}/{}: {w}", package.name, platform.name)));
        failures.extend(outcome.failures.into_iter().map(|f| format!("{}/{}: {f}", package.name, platform.name)));
        writes.extend(outcome.writes);
    }

    Ok((writes, warnings, failures))
}

/// Install `options.input` and its transitive dependencies into
/// `workspace`.
pub fn install(workspace: &Workspace, options: &InstallOptions) -> Result<InstallReport> {
    let mut report = InstallReport::default();
    let registry_mode = options.registry_mode.unwrap_or(workspace.config.registry_mode);
    let (_root_name, outcome, bases) = resolve_graph(workspace, &options.input, registry_mode)?;
    let (global, all_platforms) = platform::split_global(&workspace.platforms);

    let selected: Vec<&PlatformDefinition> = if options.platforms.is_empty() {
        all_platforms
    } else {
        all_platforms
            .into_iter()
            .filter(|p| options.platforms.contains(&p.name))
            .collect()
    };

    let mut index = index::load(&workspace.root)?;
    let is_subset = !options.resources.is_empty();

    let mut batch = Vec::new();
    let mut per_package_meta = Vec::new();

    for (i, name) in outcome.install_order.iter().enumerate() {
        let node = &outcome.nodes[name];
        if node.is_marketplace {
            continue;
        }
        if is_subset && index::is_fully_installed(&index, name) {
            report.already_covered.push(name.clone());
            continue;
        }

        if !is_subset && index::is_fully_installed(&index, name) {
            // A full reinstall of an already-installed package must land on
            // the same state a fresh install would, not merge its new
            // contribution on top of its own prior one (`deep` merge would
            // otherwise duplicate array entries every time). Revert the
            // package to its pre-install baseline before planning so the
            // merge below reads pre-P content, same as a first install.
            revert_existing_contribution(workspace, &mut index, name, options.dry_run)?;
        }

        let base = bases.get(name).cloned().unwrap_or_default();
        // Lower numeric priority wins (`conflict.rs`); install_order is
        // leaves-first, so invert the position to give root-adjacent
        // packages the lowest numbers.
        let priority = (outcome.install_order.len() - 1 - i) as i64;

        let resource_path_filter = match &node.package.source {
            SourceVariant::Git { resource_filter, .. } => resource_filter.as_deref(),
            _ => None,
        };

        let (writes, warnings, failures) = plan_package_writes(
            workspace,
            &node.package,
            &base,
            priority,
            &selected,
            global,
            &options.resources,
            resource_path_filter,
        )?;
        report.failures.extend(failures);

        batch.push(PackageWrites {
            package: name.clone(),
            priority,
            writes,
        });
        per_package_meta.push((name.clone(), node.package.version.clone(), node.package.content_root.clone(), warnings));
    }

    let decisions = conflict::resolve(&batch);
    let applied = apply_decisions(workspace, &decisions, options.conflicts, options.dry_run)?;
    report.conflicts = applied.conflicts;

    for (name, version, content_root, warnings) in per_package_meta {
        let written: Vec<Utf8PathBuf> = applied
            .commits
            .iter()
            .filter(|(pkg, _, _)| pkg == &name)
            .map(|(_, path, _)| path.clone())
            .collect();
        let package_writes: Vec<FlowWrite> = applied
            .commits
            .iter()
            .filter(|(pkg, _, _)| pkg == &name)
            .map(|(_, _, write)| write.clone())
            .collect();

        if !options.dry_run {
            index::record_package(&mut index, &name, version.as_ref().map(ToString::to_string), content_root, &package_writes);
        }

        report.installed.push(InstalledPackage {
            name,
            version,
            written,
            warnings,
        });
    }

    if !options.dry_run {
        index::save(&workspace.root, &index)?;
    }

    Ok(report)
}

struct AppliedDecisions {
    commits: Vec<(PackageName, Utf8PathBuf, FlowWrite)>,
    conflicts: Vec<opkg_schema::ConflictReport>,
}

/// Apply `--conflicts`'s policy to the arbitrated [`Decision`]s, then
/// (unless `dry_run`) actually write every surviving commit to disk.
fn apply_decisions(
    workspace: &Workspace,
    decisions: &[Decision],
    policy: ConflictPolicy,
    dry_run: bool,
) -> Result<AppliedDecisions> {
    let mut commits = Vec::new();
    let mut conflicts = Vec::new();

    for decision in decisions {
        if decision.report.is_some() && policy == ConflictPolicy::Skip {
            continue;
        }

        let kept: Vec<&(PackageName, Utf8PathBuf, FlowWrite)> = if decision.report.is_some()
            && policy == ConflictPolicy::Overwrite
        {
            decision.commits.iter().take(1).collect()
        } else {
            decision.commits.iter().collect()
        };

        if decision.report.is_none() && kept.len() > 1 {
            // Every writer here planned its `rendered` output independently
            // against the same pre-command target, so writing each one in
            // turn would have the last writer clobber every sibling's
            // contribution. Fold them into one document instead, applying
            // each writer's own contribution on top of the last in
            // priority order (`kept` is already priority-sorted).
            if !dry_run {
                let path = kept[0].1.clone();
                let full = workspace.root.join(&path);
                let folded = fold_compatible_writes(&full, &kept)?;
                axoasset::LocalAsset::write_new_all(&folded, &full)?;
            }
            for (package, path, write) in &kept {
                commits.push((package.clone(), path.clone(), (*write).clone()));
            }
        } else {
            for (package, path, write) in &kept {
                if !dry_run {
                    let full = workspace.root.join(path);
                    axoasset::LocalAsset::write_new_all(&write.rendered, &full)?;
                }
                commits.push((package.clone(), path.clone(), (*write).clone()));
            }
        }

        if let Some(report) = &decision.report {
            if policy != ConflictPolicy::Overwrite {
                conflicts.push(report.clone());
            } else {
                conflicts.push(opkg_schema::ConflictReport {
                    target: report.target.clone(),
                    winner: report.winner.clone(),
                    losers: report
                        .losers
                        .iter()
                        .map(|l| opkg_schema::LoserRecord {
                            package: l.package.clone(),
                            relocated_to: None,
                        })
                        .collect(),
                });
            }
        }
    }

    Ok(AppliedDecisions { commits, conflicts })
}

/// Fold every writer in `kept` (already priority-sorted, all sharing one
/// target and a mergeable strategy) into a single document, applying each
/// writer's own `incoming` contribution on top of the last. Starts from
/// `full`'s current on-disk content, same as each writer's own
/// independent plan did.
fn fold_compatible_writes(full: &Utf8Path, kept: &[&(PackageName, Utf8PathBuf, FlowWrite)]) -> Result<String> {
    use crate::flow::merge as flow_merge;

    let format = crate::formats::format_for_path(full);
    let mut text = axoasset::LocalAsset::load_string(full).ok();

    for (package, _, write) in kept {
        text = Some(if matches!(write.merge, opkg_schema::MergeStrategy::Composite) {
            let incoming_text = crate::formats::serialize(&write.incoming, format)?;
            match &text {
                Some(existing) => flow_merge::composite_merge(existing, &incoming_text, package),
                None => incoming_text,
            }
        } else {
            let merged = match &text {
                Some(existing) => {
                    let existing_doc = crate::formats::parse(existing, format)?;
                    let (merged, _conflicts) =
                        flow_merge::merge(&existing_doc, &write.incoming, write.merge, package);
                    merged
                }
                None => write.incoming.clone(),
            };
            crate::formats::serialize(&merged, format)?
        });
    }

    Ok(text.unwrap_or_default())
}

/// Revert `package`'s previously-installed targets back to their pre-`P`
/// state and drop its index entry, so a subsequent fresh plan for the same
/// package merges against the same baseline a first install would have
/// seen. A no-op if the package has no index entry yet. Skips the file
/// side entirely in a dry run, since nothing else in a dry-run install
/// touches disk either.
fn revert_existing_contribution(
    workspace: &Workspace,
    index: &mut opkg_schema::WorkspaceIndex,
    package: &PackageName,
    dry_run: bool,
) -> Result<()> {
    let Some(entry) = index.packages.get(package).cloned() else {
        return Ok(());
    };

    if !dry_run {
        let preserved: Vec<Utf8PathBuf> = workspace.platforms.iter().map(|p| workspace.root.join(&p.root_dir)).collect();
        let workspace_root = workspace.root.clone();
        let read_target = |p: &Utf8Path| axoasset::LocalAsset::load_string(&workspace_root.join(p)).ok();
        let workspace_root_w = workspace.root.clone();
        let mut write_target = |p: &Utf8Path, content: &str| -> Result<()> {
            axoasset::LocalAsset::write_new_all(content, &workspace_root_w.join(p))?;
            Ok(())
        };
        let workspace_root_d = workspace.root.clone();
        let mut delete_target = |p: &Utf8Path| -> Result<()> {
            let full = workspace_root_d.join(p);
            if full.is_file() {
                std::fs::remove_file(&full).map_err(OpkgError::Io)?;
            }
            Ok(())
        };
        let dir_is_empty = |p: &Utf8Path| {
            std::fs::read_dir(p).map(|mut d| d.next().is_none()).unwrap_or(false)
        };

        uninstall::apply_file_removals(
            &entry,
            package,
            None,
            &workspace.root,
            &preserved,
            &read_target,
            &mut write_target,
            &mut delete_target,
            &dir_is_empty,
        )?;
    }

    index::remove_package(index, package);
    Ok(())
}

/// The outcome of an [`uninstall_package`] call.
pub type UninstallReport = uninstall::UninstallOutcome;

/// Uninstall `package` from `workspace`, restricted to `source_keys` if
/// given (selective uninstall driven by a resource filter).
pub fn uninstall_package(
    workspace: &Workspace,
    package: &PackageName,
    source_keys: Option<&[Utf8PathBuf]>,
) -> Result<UninstallReport> {
    let index = index::load(&workspace.root)?;
    let Some(entry) = index.packages.get(package).cloned() else {
        return Ok(UninstallReport::default());
    };
    let preserved: Vec<Utf8PathBuf> = workspace.platforms.iter().map(|p| workspace.root.join(&p.root_dir)).collect();

    // The index is updated and persisted before any file on disk is
    // touched: a package's ownership of a target is the durable source of
    // truth, so a crash or I/O failure midway through the file side must
    // never leave it claiming files that are already gone. If the file
    // side fails partway, the pre-removal index is restored so the two
    // stay consistent with whatever actually happened to the files.
    let planned = uninstall::plan_removal(&index, package, source_keys);
    index::save(&workspace.root, &planned)?;

    let workspace_root = workspace.root.clone();
    let read_target = |p: &Utf8Path| axoasset::LocalAsset::load_string(&workspace_root.join(p)).ok();
    let workspace_root_w = workspace.root.clone();
    let mut write_target = |p: &Utf8Path, content: &str| -> Result<()> {
        axoasset::LocalAsset::write_new_all(content, &workspace_root_w.join(p))?;
        Ok(())
    };
    let workspace_root_d = workspace.root.clone();
    let mut delete_target = |p: &Utf8Path| -> Result<()> {
        let full = workspace_root_d.join(p);
        if full.is_file() {
            std::fs::remove_file(&full).map_err(OpkgError::Io)?;
        }
        Ok(())
    };
    let dir_is_empty = |p: &Utf8Path| {
        std::fs::read_dir(p).map(|mut d| d.next().is_none()).unwrap_or(false)
    };

    match uninstall::apply_file_removals(
        &entry,
        package,
        source_keys,
        &workspace.root,
        &preserved,
        &read_target,
        &mut write_target,
        &mut delete_target,
        &dir_is_empty,
    ) {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            index::save(&workspace.root, &index)?;
            Err(e)
        }
    }
}

/// Remove just the single resource named `resource_name`, wherever it's
/// installed: finds the owning package
/// and performs a selective uninstall of that one source key.
pub fn remove_resource(workspace: &Workspace, resource_name: &str) -> Result<UninstallReport> {
    let index = index::load(&workspace.root)?;
    for (name, entry) in &index.packages {
        for source_file in entry.files.keys() {
            if source_file
                .file_stem()
                .map(|stem| stem == resource_name)
                .unwrap_or(false)
            {
                return uninstall_package(workspace, name, Some(std::slice::from_ref(source_file)));
            }
        }
    }
    Err(OpkgError::not_found(format!(
        "no installed resource named `{resource_name}`"
    )))
}

/// The per-package outcome of a [`save_all`] call.
#[derive(Debug, Clone, Default)]
pub struct SaveReport {
    /// Source files rewritten because their canonical content changed.
    pub written: Vec<Utf8PathBuf>,
    /// Source files confirmed unchanged.
    pub unchanged: Vec<Utf8PathBuf>,
    /// Non-fatal conversion warnings.
    pub warnings: Vec<String>,
}

/// Run the save engine for every installed package.
pub fn save_all(workspace: &Workspace) -> Result<SaveReport> {
    let index = index::load(&workspace.root)?;
    let mut report = SaveReport::default();

    for (name, entry) in &index.packages {
        let version = entry.version.clone();
        let content_root = entry.path.clone();
        let root = &workspace.root;
        let platforms = &workspace.platforms;

        let outcome = save::save(
            &index,
            name,
            &|target| platform_for_target(target, platforms),
            &|candidate| FlowContext {
                package_name: name.clone(),
                package_version: version.as_deref().and_then(|v| semver::Version::parse(v).ok()),
                priority: 0,
                platform: platform_for_target(&candidate.target, platforms)
                    .map(|p| p.name.clone())
                    .unwrap_or_default(),
                source_kind: "registry",
                target_root: root.clone(),
                source_file: candidate.source_file.clone(),
                dry_run: false,
            },
            &|target| axoasset::LocalAsset::load_string(&root.join(target)).ok(),
            &|source_file| axoasset::LocalAsset::load_string(&content_root.join(source_file)).ok(),
            &mut |source_file, content| {
                axoasset::LocalAsset::write_new_all(content, &content_root.join(source_file))?;
                Ok(())
            },
        )?;

        report.written.extend(outcome.written);
        report.unchanged.extend(outcome.unchanged);
        report.warnings.extend(outcome.warnings);
    }

    Ok(report)
}

/// Find the platform whose `root_dir` is the longest matching prefix of
/// `target`, the lookup the save/view engines need since the workspace
/// index itself doesn't record which platform wrote a given mapping.
fn platform_for_target<'a>(target: &Utf8Path, platforms: &'a [PlatformDefinition]) -> Option<&'a PlatformDefinition> {
    platforms
        .iter()
        .filter(|p| !p.is_global() && target.starts_with(&p.root_dir))
        .max_by_key(|p| p.root_dir.as_str().len())
}

/// A package's resources, for `view <name>`: loads and
/// base-detects the package fresh, without installing it.
pub fn view(workspace: &Workspace, input: &str) -> Result<(Package, Utf8PathBuf, Vec<Resource>)> {
    let variant = opkg_source::classify(input, &workspace.root)?;
    let loaded = load_variant(workspace, &variant, workspace.config.registry_mode)?;
    let package = loaded_to_package(loaded);
    let base = detect_base(&package, &workspace.platforms)?;
    let package_root = package.content_root.join(&base);
    let files = list_files_under(&package_root)?;
    let resources = resources::discover(&base, &|_| Ok(files.clone()))?;
    Ok((package, base, resources))
}

/// One installed package's summary, for `status`.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    /// The package's normalized name.
    pub name: PackageName,
    /// The installed version, if any.
    pub version: Option<String>,
    /// Where this package's content root was loaded from.
    pub path: Utf8PathBuf,
    /// How many distinct targets this package currently owns.
    pub target_count: usize,
}

/// Summarize every package currently recorded in the workspace index.
pub fn status(workspace: &Workspace) -> Result<Vec<StatusEntry>> {
    let index = index::load(&workspace.root)?;
    let mut entries: Vec<StatusEntry> = index
        .packages
        .iter()
        .map(|(name, entry)| StatusEntry {
            name: name.clone(),
            version: entry.version.clone(),
            path: entry.path.clone(),
            target_count: entry.files.values().map(Vec::len).sum(),
        })
        .collect();
    entries.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
    Ok(entries)
}
