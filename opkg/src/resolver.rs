//! The dependency graph / wave resolver: breadth-first
//! traversal over package manifests, SemVer version unification, and a
//! final topological install order.
//!
//! A plain BFS/queue over a flat `HashMap<PackageName, _>` — nodes
//! reference each other by normalized name rather than by pointer, so a
//! cyclic graph just means a node gets visited again and skipped rather
//! than a borrow-checker fight over an arena.

use std::collections::{HashMap, HashSet, VecDeque};

use opkg_schema::{ManifestDependency, Package, PackageName};
use semver::{Version, VersionReq};

use crate::errors::{OpkgError, Result};

/// A caller-supplied collaborator that loads one dependency into a
/// [`Package`] (classification, fetch/clone, base detection — all already
/// implemented by `opkg-source`; this trait just keeps the resolver itself
/// agnostic of how that happens).
pub trait DependencyLoader {
    /// Load `dep`.
    fn load(&self, dep: &ManifestDependency) -> Result<Package>;

    /// List every version available for the registry package `name`, used
    /// to pick the highest version satisfying several intersecting ranges.
    /// Never called for Git/local-path dependencies.
    fn available_versions(&self, name: &PackageName) -> Result<Vec<Version>>;
}

/// Lets an interactive caller choose a version when ranges don't intersect:
/// prompt with the candidate versions, and the chosen version is adopted
/// and noted in the resolution report.
pub trait ConflictHandler {
    /// Offer `candidates` (one requester/range pair per dependent) for
    /// `package`; return the chosen version, or `None` if the user
    /// cancelled.
    fn resolve(&self, package: &PackageName, candidates: &[(PackageName, String)]) -> Option<Version>;
}

/// One resolved node in the dependency graph.
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    /// The resolved package.
    pub package: Package,
    /// Every package that declared a dependency on this one (the virtual
    /// root is named `$root`).
    pub requested_by: Vec<PackageName>,
    /// Every `(requester, range)` pair seen for this package.
    pub ranges: Vec<(PackageName, String)>,
    /// Whether this node is a marketplace catalog, tagged and skipped
    /// during ordinary install.
    pub is_marketplace: bool,
}

/// A version-range intersection failure recorded for one package.
#[derive(Debug, Clone)]
pub struct VersionConflict {
    /// The package whose ranges didn't intersect.
    pub package: PackageName,
    /// Every `(requester, range)` pair that contributed to the conflict.
    pub ranges: Vec<(PackageName, String)>,
}

/// The full result of a wave resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    /// Every visited package, keyed by normalized name.
    pub nodes: HashMap<PackageName, ResolvedNode>,
    /// Topological install order (leaves first).
    pub install_order: Vec<PackageName>,
}

/// The name the BFS attributes root-level dependencies to; never collides
/// with a real package name since it isn't a valid registry/git/local
/// classification.
const ROOT: &str = "$root";

/// Resolve `roots` (the top-level dependencies being installed) via
/// breadth-first traversal, following transitive manifests.
///
/// Missing manifests are non-fatal (`opkg_source::LoadedPackage` already
/// treats that as an empty manifest — a leaf with no further deps).
/// Cyclic edges are accepted via single-visit idempotence. Version
/// conflicts are fatal (`OpkgError::Conflict`) unless `handler` resolves
/// them.
pub fn resolve(
    roots: &[ManifestDependency],
    loader: &dyn DependencyLoader,
    handler: Option<&dyn ConflictHandler>,
) -> Result<ResolveOutcome> {
    let root_name = PackageName::normalize(ROOT);
    let mut edges: HashMap<PackageName, Vec<PackageName>> = HashMap::new();
    let mut packages: HashMap<PackageName, Package> = HashMap::new();
    let mut ranges: HashMap<PackageName, Vec<(PackageName, String)>> = HashMap::new();
    let mut requested_by: HashMap<PackageName, Vec<PackageName>> = HashMap::new();
    let mut marketplaces: HashSet<PackageName> = HashSet::new();
    let mut visited: HashSet<PackageName> = HashSet::new();

    let mut queue: VecDeque<(PackageName, ManifestDependency)> = VecDeque::new();
    for dep in roots {
        queue.push_back((root_name.clone(), dep.clone()));
    }

    while let Some((requester, dep)) = queue.pop_front() {
        let name = dep.package_name();
        let range = dep.version.clone().unwrap_or_else(|| "*".to_string());
        ranges.entry(name.clone()).or_default().push((requester.clone(), range));
        requested_by.entry(name.clone()).or_default().push(requester.clone());
        edges.entry(requester.clone()).or_default().push(name.clone());

        if visited.contains(&name) {
            continue;
        }
        visited.insert(name.clone());

        let package = loader.load(&dep)?;
        if package.is_marketplace {
            marketplaces.insert(name.clone());
        } else {
            for child in &package.manifest.dependencies {
                queue.push_back((name.clone(), child.clone()));
            }
        }
        packages.insert(name.clone(), package);
    }

    let mut conflicts = Vec::new();
    finalize_versions(&ranges, &mut packages, loader, handler, &mut conflicts)?;

    if !conflicts.is_empty() {
        let summary = conflicts
            .iter()
            .map(|c| {
                let ranges = c
                    .ranges
                    .iter()
                    .map(|(who, r)| format!("{who}@{r}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}: {ranges}", c.package)
            })
            .collect::<Vec<_>>()
            .join("; ");
        return Err(OpkgError::conflict(format!(
            "version unification failed for: {summary}"
        )));
    }

    let install_order = topological_order(&root_name, &edges);

    let nodes = packages
        .into_iter()
        .map(|(name, package)| {
            let node = ResolvedNode {
                package,
                requested_by: requested_by.remove(&name).unwrap_or_default(),
                ranges: ranges.remove(&name).unwrap_or_default(),
                is_marketplace: marketplaces.contains(&name),
            };
            (name, node)
        })
        .collect();

    Ok(ResolveOutcome {
        nodes,
        install_order,
    })
}

fn finalize_versions(
    ranges: &HashMap<PackageName, Vec<(PackageName, String)>>,
    packages: &mut HashMap<PackageName, Package>,
    loader: &dyn DependencyLoader,
    handler: Option<&dyn ConflictHandler>,
    conflicts: &mut Vec<VersionConflict>,
) -> Result<()> {
    for (name, reqs) in ranges {
        if !packages.contains_key(name) {
            continue;
        }
        let parsed: Vec<(PackageName, VersionReq)> = reqs
            .iter()
            .filter_map(|(who, r)| parse_req(r).map(|req| (who.clone(), req)))
            .collect();
        if parsed.len() <= 1 {
            continue;
        }

        let satisfies_all = |v: &Version| parsed.iter().all(|(_, req)| req.matches(v));

        if let Some(current) = packages.get(name).and_then(|p| p.version.as_ref()) {
            if satisfies_all(current) {
                continue;
            }
        }

        let mut candidates = loader.available_versions(name)?;
        candidates.sort();
        let chosen = candidates.into_iter().rev().find(|v| satisfies_all(v));

        let resolved = match chosen {
            Some(v) => Some(v),
            None => handler.and_then(|h| h.resolve(name, reqs)),
        };

        match resolved {
            Some(v) => {
                if let Some(pkg) = packages.get_mut(name) {
                    pkg.version = Some(v);
                }
            }
            None => conflicts.push(VersionConflict {
                package: name.clone(),
                ranges: reqs.clone(),
            }),
        }
    }
    Ok(())
}

fn parse_req(range: &str) -> Option<VersionReq> {
    if range == "*" {
        return VersionReq::parse("*").ok();
    }
    VersionReq::parse(range).ok()
}

/// Post-order traversal of `edges` starting from the virtual root's
/// children: every node is pushed only after its own dependencies, giving
/// a leaves-first install order.
fn topological_order(
    root_name: &PackageName,
    edges: &HashMap<PackageName, Vec<PackageName>>,
) -> Vec<PackageName> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();

    fn visit(
        node: &PackageName,
        edges: &HashMap<PackageName, Vec<PackageName>>,
        seen: &mut HashSet<PackageName>,
        order: &mut Vec<PackageName>,
    ) {
        if !seen.insert(node.clone()) {
            return;
        }
        if let Some(children) = edges.get(node) {
            for child in children {
                visit(child, edges, seen, order);
            }
        }
        order.push(node.clone());
    }

    if let Some(children) = edges.get(root_name) {
        for child in children {
            visit(child, edges, &mut seen, &mut order);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use opkg_schema::{Manifest, SourceVariant};

    fn dep(name: &str, version: Option<&str>) -> ManifestDependency {
        ManifestDependency {
            name: name.to_string(),
            version: version.map(str::to_string),
            url: None,
            git_ref: None,
            path: None,
            base: None,
        }
    }

    fn package(name: &str, version: &str, deps: Vec<ManifestDependency>) -> Package {
        Package {
            name: PackageName::normalize(name),
            version: Some(Version::parse(version).unwrap()),
            manifest: Manifest {
                name: Some(name.to_string()),
                version: Some(version.to_string()),
                dependencies: deps,
                base: None,
                metadata: None,
            },
            content_root: format!("/pkgs/{name}").into(),
            source: SourceVariant::Registry {
                name: PackageName::normalize(name),
                version: Some(version.to_string()),
            },
            is_marketplace: false,
        }
    }

    struct FakeLoader {
        packages: HashMap<String, Package>,
        available: HashMap<String, Vec<Version>>,
    }

    impl DependencyLoader for FakeLoader {
        fn load(&self, dep: &ManifestDependency) -> Result<Package> {
            Ok(self.packages.get(&dep.name).cloned().unwrap_or_else(|| {
                package(&dep.name, dep.version.as_deref().unwrap_or("1.0.0"), vec![])
            }))
        }

        fn available_versions(&self, name: &PackageName) -> Result<Vec<Version>> {
            Ok(self.available.get(name.as_str()).cloned().unwrap_or_default())
        }
    }

    #[test]
    fn simple_chain_resolves_leaves_first() {
        let mut packages = HashMap::new();
        packages.insert(
            "a".to_string(),
            package("a", "1.0.0", vec![dep("b", Some("^1.0"))]),
        );
        packages.insert("b".to_string(), package("b", "1.2.0", vec![]));
        let loader = FakeLoader {
            packages,
            available: HashMap::new(),
        };

        let outcome = resolve(&[dep("a", None)], &loader, None).unwrap();
        assert_eq!(
            outcome.install_order,
            vec![PackageName::normalize("b"), PackageName::normalize("a")]
        );
    }

    #[test]
    fn version_conflict_without_handler_is_fatal() {
        let mut packages = HashMap::new();
        packages.insert(
            "a".to_string(),
            package("a", "1.0.0", vec![dep("shared", Some("^1.0"))]),
        );
        packages.insert(
            "b".to_string(),
            package("b", "1.0.0", vec![dep("shared", Some("^2.0"))]),
        );
        packages.insert("shared".to_string(), package("shared", "1.5.0", vec![]));
        let loader = FakeLoader {
            packages,
            available: HashMap::from([(
                "shared".to_string(),
                vec![Version::parse("1.5.0").unwrap()],
            )]),
        };

        let err = resolve(&[dep("a", None), dep("b", None)], &loader, None).unwrap_err();
        assert!(matches!(err, OpkgError::Conflict { .. }));
    }

    #[test]
    fn conflict_handler_adopts_chosen_version() {
        let mut packages = HashMap::new();
        packages.insert(
            "a".to_string(),
            package("a", "1.0.0", vec![dep("shared", Some("^1.0"))]),
        );
        packages.insert(
            "b".to_string(),
            package("b", "1.0.0", vec![dep("shared", Some("^2.0"))]),
        );
        packages.insert("shared".to_string(), package("shared", "1.5.0", vec![]));
        let loader = FakeLoader {
            packages,
            available: HashMap::from([(
                "shared".to_string(),
                vec![Version::parse("1.5.0").unwrap()],
            )]),
        };

        struct PickSecond;
        impl ConflictHandler for PickSecond {
            fn resolve(&self, _package: &PackageName, _candidates: &[(PackageName, String)]) -> Option<Version> {
                Some(Version::parse("2.0.5").unwrap())
            }
        }

        let outcome = resolve(&[dep("a", None), dep("b", None)], &loader, Some(&PickSecond)).unwrap();
        let shared = &outcome.nodes[&PackageName::normalize("shared")];
        assert_eq!(shared.package.version, Some(Version::parse("2.0.5").unwrap()));
    }

    #[test]
    fn marketplace_node_is_tagged_and_not_walked() {
        let mut packages = HashMap::new();
        let mut marketplace = package("catalog", "1.0.0", vec![dep("should-not-load", None)]);
        marketplace.is_marketplace = true;
        packages.insert("catalog".to_string(), marketplace);
        let loader = FakeLoader {
            packages,
            available: HashMap::new(),
        };

        let outcome = resolve(&[dep("catalog", None)], &loader, None).unwrap();
        let node = &outcome.nodes[&PackageName::normalize("catalog")];
        assert!(node.is_marketplace);
        assert!(!outcome.nodes.contains_key(&PackageName::normalize("should-not-load")));
    }
}
