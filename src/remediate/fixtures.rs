//! In-memory registry and resolver shared by the remediation tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::model::{
    Advisory, Affected, AffectedRange, DepAttr, DepType, Ecosystem, Edge, Graph, GraphNode,
    Manifest, NodeId, PackageKey, RequirementVersion, ResolutionResult, Subgraph, SubgraphNode,
    VersionKey, Vulnerability, ORIGIN_MANAGEMENT,
};
use crate::remediate::options::ResolveOptions;
use crate::traits::{ClientError, DependencyClient, Resolver};

pub(crate) const ROOT_NAME: &str = "org.example:app";

pub(crate) fn advisory_in(
    ecosystem: Ecosystem,
    id: &str,
    package: &str,
    introduced: &str,
    fixed: &str,
) -> Advisory {
    Advisory {
        id: id.to_string(),
        aliases: vec![],
        summary: None,
        severity: None,
        affected: vec![Affected {
            package: PackageKey::new(ecosystem, package),
            ranges: vec![AffectedRange {
                introduced: Some(introduced.to_string()),
                fixed: Some(fixed.to_string()),
                last_affected: None,
            }],
            versions: vec![],
        }],
    }
}

/// Maven advisory affecting every version of `package` below `fixed`.
pub(crate) fn advisory(id: &str, package: &str, fixed: &str) -> Advisory {
    advisory_in(Ecosystem::Maven, id, package, "0", fixed)
}

pub(crate) fn advisory_range(id: &str, package: &str, introduced: &str, fixed: &str) -> Advisory {
    advisory_in(Ecosystem::Maven, id, package, introduced, fixed)
}

/// A vulnerability without reachability information.
pub(crate) fn vulnerability(advisory: Advisory) -> Vulnerability {
    Vulnerability {
        advisory,
        dev_only: false,
        subgraphs: vec![],
    }
}

/// Registry of known versions, their dependencies and advisories.
///
/// Resolution is breadth first from the manifest root. Direct requirements
/// (no dependency origin) use their declared version; transitive dependencies
/// use a dependency-management entry when the manifest has one. With
/// `maven_management` set, management entries are also resolved as direct
/// dependencies. The first version seen for a package wins.
#[derive(Debug, Clone)]
pub(crate) struct FakeRegistry {
    ecosystem: Ecosystem,
    packages: BTreeMap<String, Vec<String>>,
    deps: BTreeMap<(String, String), Vec<(String, String)>>,
    advisories: Vec<Advisory>,
    failing: BTreeSet<String>,
}

impl FakeRegistry {
    pub(crate) fn new() -> Self {
        Self::with_ecosystem(Ecosystem::Maven)
    }

    pub(crate) fn with_ecosystem(ecosystem: Ecosystem) -> Self {
        Self {
            ecosystem,
            packages: BTreeMap::new(),
            deps: BTreeMap::new(),
            advisories: Vec::new(),
            failing: BTreeSet::new(),
        }
    }

    pub(crate) fn with_package(mut self, name: &str, versions: &[&str]) -> Self {
        self.packages
            .entry(name.to_string())
            .or_default()
            .extend(versions.iter().map(|v| v.to_string()));
        self
    }

    pub(crate) fn with_deps(mut self, name: &str, version: &str, deps: &[(&str, &str)]) -> Self {
        self.deps
            .entry((name.to_string(), version.to_string()))
            .or_default()
            .extend(deps.iter().map(|(dep, req)| (dep.to_string(), req.to_string())));
        self
    }

    pub(crate) fn with_advisory(mut self, advisory: Advisory) -> Self {
        self.advisories.push(advisory);
        self
    }

    /// Listing versions of `name` fails with a registry error.
    pub(crate) fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub(crate) fn manifest_with(&self, requirements: &[(&str, &str, DepType)]) -> Manifest {
        Manifest {
            root: VersionKey::concrete(PackageKey::new(self.ecosystem, ROOT_NAME), "1.0.0"),
            requirements: requirements
                .iter()
                .map(|(name, version, dep_type)| {
                    RequirementVersion::new(
                        VersionKey::requirement(PackageKey::new(self.ecosystem, *name), *version),
                        dep_type.clone(),
                    )
                })
                .collect(),
        }
    }

    /// Manifest with plain direct requirements.
    pub(crate) fn manifest(&self, requirements: &[(&str, &str)]) -> Manifest {
        let requirements: Vec<(&str, &str, DepType)> = requirements
            .iter()
            .map(|(name, version)| (*name, *version, DepType::new()))
            .collect();
        self.manifest_with(&requirements)
    }

    pub(crate) async fn resolve_direct(&self, requirements: &[(&str, &str)]) -> ResolutionResult {
        self.resolve(&self.manifest(requirements), &ResolveOptions::default())
            .await
            .unwrap()
    }

    fn vulnerabilities(&self, graph: &Graph, distances: &[usize]) -> Vec<Vulnerability> {
        let mut vulns = Vec::new();
        for advisory in &self.advisories {
            let subgraphs: Vec<Subgraph> = (1..graph.nodes.len())
                .filter(|&id| advisory.is_affected(&graph.nodes[id].version))
                .map(|id| witness(graph, distances, id))
                .collect();
            if !subgraphs.is_empty() {
                vulns.push(Vulnerability {
                    advisory: advisory.clone(),
                    dev_only: false,
                    subgraphs,
                });
            }
        }
        vulns
    }
}

/// Subgraph of `dependency` and all of its ancestors.
fn witness(graph: &Graph, distances: &[usize], dependency: NodeId) -> Subgraph {
    let mut nodes = BTreeMap::new();
    let mut queue = VecDeque::from([dependency]);
    while let Some(id) = queue.pop_front() {
        if nodes.contains_key(&id) {
            continue;
        }
        let parents: Vec<Edge> = graph.edges.iter().filter(|e| e.to == id).cloned().collect();
        queue.extend(parents.iter().map(|e| e.from));
        nodes.insert(
            id,
            SubgraphNode {
                version: graph.nodes[id].version.clone(),
                distance: distances[id],
                parents,
            },
        );
    }
    Subgraph { dependency, nodes }
}

struct GraphBuilder<'a> {
    registry: &'a FakeRegistry,
    graph: Graph,
    distances: Vec<usize>,
    index: HashMap<String, NodeId>,
    queue: VecDeque<NodeId>,
}

impl GraphBuilder<'_> {
    fn link(
        &mut self,
        from: NodeId,
        name: &str,
        requirement: &str,
        version: &str,
        dep_type: DepType,
    ) -> Result<(), ClientError> {
        let to = match self.index.get(name) {
            Some(&id) => id,
            None => {
                let known = self
                    .registry
                    .packages
                    .get(name)
                    .ok_or_else(|| ClientError::PackageNotFound(name.to_string()))?;
                if !known.iter().any(|v| v == version) {
                    return Err(ClientError::VersionNotFound(format!("{name}@{version}")));
                }
                let id = self.graph.nodes.len();
                self.graph.nodes.push(GraphNode {
                    version: VersionKey::concrete(
                        PackageKey::new(self.registry.ecosystem, name),
                        version,
                    ),
                });
                self.distances.push(self.distances[from] + 1);
                self.index.insert(name.to_string(), id);
                self.queue.push_back(id);
                id
            }
        };
        self.graph.edges.push(Edge {
            from,
            to,
            requirement: requirement.to_string(),
            dep_type,
        });
        Ok(())
    }
}

#[async_trait]
impl DependencyClient for FakeRegistry {
    async fn versions(&self, package: &PackageKey) -> Result<Vec<VersionKey>, ClientError> {
        if self.failing.contains(&package.name) {
            return Err(ClientError::Registry(format!("{package} unavailable")));
        }
        let versions = self
            .packages
            .get(&package.name)
            .ok_or_else(|| ClientError::PackageNotFound(package.name.clone()))?;
        Ok(versions
            .iter()
            .map(|v| VersionKey::concrete(package.clone(), v.as_str()))
            .collect())
    }
}

#[async_trait]
impl Resolver for FakeRegistry {
    async fn resolve(
        &self,
        manifest: &Manifest,
        opts: &ResolveOptions,
    ) -> Result<ResolutionResult, ClientError> {
        fn origin(r: &RequirementVersion) -> Option<&str> {
            r.dep_type.get_attr(DepAttr::MavenDependencyOrigin)
        }
        let managed: HashMap<&str, &str> = manifest
            .requirements
            .iter()
            .filter(|&r| origin(r) == Some(ORIGIN_MANAGEMENT))
            .map(|r| (r.package().name.as_str(), r.version_key.version.as_str()))
            .collect();

        let mut builder = GraphBuilder {
            registry: self,
            graph: Graph {
                nodes: vec![GraphNode {
                    version: manifest.root.clone(),
                }],
                edges: vec![],
            },
            distances: vec![0],
            index: HashMap::new(),
            queue: VecDeque::new(),
        };

        for req in manifest.requirements.iter().filter(|&r| origin(r).is_none()) {
            let version = req.version_key.version.as_str();
            builder.link(0, &req.package().name, version, version, req.dep_type.clone())?;
        }
        if opts.maven_management {
            for req in manifest
                .requirements
                .iter()
                .filter(|&r| origin(r) == Some(ORIGIN_MANAGEMENT))
            {
                let version = req.version_key.version.as_str();
                builder.link(0, &req.package().name, version, version, req.dep_type.clone())?;
            }
        }

        while let Some(id) = builder.queue.pop_front() {
            let vk = builder.graph.nodes[id].version.clone();
            let Some(deps) = self.deps.get(&(vk.package.name.clone(), vk.version.clone())) else {
                continue;
            };
            for (dep, requirement) in deps {
                let version = managed.get(dep.as_str()).copied().unwrap_or(requirement.as_str());
                builder.link(id, dep, requirement, version, DepType::new())?;
            }
        }

        let vulns = self.vulnerabilities(&builder.graph, &builder.distances);
        Ok(ResolutionResult {
            manifest: manifest.clone(),
            graph: builder.graph,
            vulns,
        })
    }
}
