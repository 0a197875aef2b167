//! Core data model shared by the resolver contracts and the remediation engine.
//!
//! Everything here is plain data: package identities, manifests, resolved
//! dependency graphs and the vulnerabilities attached to them. All types are
//! serializable so callers can persist or ship resolution results.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::version::Version;

// ============================================================================
// Identities
// ============================================================================

/// Package ecosystem a manifest or package belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Maven,
    Npm,
    Cargo,
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Ecosystem::Maven => "Maven",
            Ecosystem::Npm => "npm",
            Ecosystem::Cargo => "crates.io",
        };
        f.write_str(name)
    }
}

/// Version-independent package identity (ecosystem + name).
///
/// Maven names use the `groupId:artifactId` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageKey {
    pub ecosystem: Ecosystem,
    pub name: String,
}

impl PackageKey {
    pub fn new(ecosystem: Ecosystem, name: impl Into<String>) -> Self {
        Self {
            ecosystem,
            name: name.into(),
        }
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ecosystem, self.name)
    }
}

/// Whether a version string is a declared requirement or a resolved version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionType {
    Requirement,
    Concrete,
}

/// A package paired with one specific version string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionKey {
    pub package: PackageKey,
    pub version: String,
    pub version_type: VersionType,
}

impl VersionKey {
    /// A resolved (concrete) version of a package.
    pub fn concrete(package: PackageKey, version: impl Into<String>) -> Self {
        Self {
            package,
            version: version.into(),
            version_type: VersionType::Concrete,
        }
    }

    /// A declared version requirement of a package.
    pub fn requirement(package: PackageKey, version: impl Into<String>) -> Self {
        Self {
            package,
            version: version.into(),
            version_type: VersionType::Requirement,
        }
    }

    pub fn name(&self) -> &str {
        &self.package.name
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.package.ecosystem
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.package, self.version)
    }
}

// ============================================================================
// Dependency types
// ============================================================================

/// Dependency origin marking a requirement that lives in dependency management.
pub const ORIGIN_MANAGEMENT: &str = "management";
/// Dependency origin for requirements inherited from a parent project.
pub const ORIGIN_PARENT: &str = "parent";
/// Dependency origin for plugin-scoped requirements.
pub const ORIGIN_PLUGIN: &str = "plugin";
/// Dependency origin for profile-scoped requirements.
pub const ORIGIN_PROFILE: &str = "profile";

/// Attribute keys that can be attached to a dependency edge or requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepAttr {
    Dev,
    Optional,
    Test,
    Scope,
    MavenClassifier,
    MavenArtifactType,
    MavenDependencyOrigin,
}

/// Attribute set describing how a dependency is declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DepType {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attrs: BTreeMap<DepAttr, String>,
}

impl DepType {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`DepType::add_attr`].
    pub fn with_attr(mut self, attr: DepAttr, value: impl Into<String>) -> Self {
        self.add_attr(attr, value);
        self
    }

    pub fn add_attr(&mut self, attr: DepAttr, value: impl Into<String>) {
        self.attrs.insert(attr, value.into());
    }

    pub fn get_attr(&self, attr: DepAttr) -> Option<&str> {
        self.attrs.get(&attr).map(String::as_str)
    }

    pub fn has_attr(&self, attr: DepAttr) -> bool {
        self.attrs.contains_key(&attr)
    }

    /// Whether this edge names an artifact sub-identity (classifier or type)
    /// that registries cannot tell apart.
    pub fn has_artifact_qualifier(&self) -> bool {
        self.has_attr(DepAttr::MavenClassifier) || self.has_attr(DepAttr::MavenArtifactType)
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// A single declared requirement of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementVersion {
    pub version_key: VersionKey,
    #[serde(default)]
    pub dep_type: DepType,
}

impl RequirementVersion {
    pub fn new(version_key: VersionKey, dep_type: DepType) -> Self {
        Self {
            version_key,
            dep_type,
        }
    }

    pub fn package(&self) -> &PackageKey {
        &self.version_key.package
    }
}

/// In-memory manifest: the root project plus its declared requirements.
///
/// `Clone` is a full deep copy; patching always works on a clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub root: VersionKey,
    pub requirements: Vec<RequirementVersion>,
}

impl Manifest {
    pub fn ecosystem(&self) -> Ecosystem {
        self.root.package.ecosystem
    }
}

// ============================================================================
// Dependency graph
// ============================================================================

/// Index of a node within a [`Graph`]. Node `0` is the manifest root.
pub type NodeId = usize;

/// A dependency edge, pointing from the dependent to the dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    /// Requirement string declared on this edge
    pub requirement: String,
    #[serde(default)]
    pub dep_type: DepType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub version: VersionKey,
}

/// A resolved dependency graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<Edge>,
}

impl Graph {
    /// Resolved version of `package`, if it is part of the graph.
    pub fn resolved_version(&self, package: &PackageKey) -> Option<&str> {
        self.nodes
            .iter()
            .skip(1)
            .find(|node| &node.version.package == package)
            .map(|node| node.version.version.as_str())
    }
}

// ============================================================================
// Advisories & vulnerabilities
// ============================================================================

/// A range of affected versions. `introduced` absent or `"0"` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedRange {
    pub introduced: Option<String>,
    pub fixed: Option<String>,
    pub last_affected: Option<String>,
}

impl AffectedRange {
    /// Checks `version` against this range using the plain ecosystem ordering.
    ///
    /// Bounds that fail to parse are ignored.
    pub fn contains(&self, ecosystem: Ecosystem, version: &Version) -> bool {
        let bound = |raw: &Option<String>| {
            raw.as_deref()
                .filter(|raw| *raw != "0")
                .and_then(|raw| Version::parse(ecosystem, raw).ok())
        };

        if let Some(introduced) = bound(&self.introduced) {
            if version.compare(&introduced).is_lt() {
                return false;
            }
        }
        if let Some(fixed) = bound(&self.fixed) {
            if version.compare(&fixed).is_ge() {
                return false;
            }
        }
        if let Some(last) = bound(&self.last_affected) {
            if version.compare(&last).is_gt() {
                return false;
            }
        }
        true
    }
}

/// The packages an advisory applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affected {
    pub package: PackageKey,
    #[serde(default)]
    pub ranges: Vec<AffectedRange>,
    /// Explicitly enumerated affected versions
    #[serde(default)]
    pub versions: Vec<String>,
}

/// A vulnerability advisory as published by a vulnerability database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    /// Advisory identifier (e.g., `GHSA-xxxx-xxxx-xxxx`)
    pub id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub summary: Option<String>,
    /// CVSS base score, when known
    pub severity: Option<f64>,
    #[serde(default)]
    pub affected: Vec<Affected>,
}

impl Advisory {
    /// Whether the advisory applies to the given package version.
    pub fn is_affected(&self, vk: &VersionKey) -> bool {
        let mut matching = self
            .affected
            .iter()
            .filter(|affected| affected.package == vk.package)
            .peekable();
        if matching.peek().is_none() {
            return false;
        }

        let parsed = Version::parse(vk.ecosystem(), &vk.version).ok();
        matching.any(|affected| {
            affected.versions.iter().any(|v| *v == vk.version)
                || parsed.as_ref().is_some_and(|version| {
                    affected
                        .ranges
                        .iter()
                        .any(|range| range.contains(vk.ecosystem(), version))
                })
        })
    }

    /// Whether `id` names this advisory, either directly or through an alias.
    pub fn matches_id(&self, id: &str) -> bool {
        self.id == id || self.aliases.iter().any(|alias| alias == id)
    }
}

/// A node of a [`Subgraph`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgraphNode {
    pub version: VersionKey,
    /// Shortest number of edges from the root
    pub distance: usize,
    pub parents: Vec<Edge>,
}

/// Reachability witness: the part of the graph through which the vulnerable
/// dependency is reached from the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subgraph {
    /// The vulnerable node
    pub dependency: NodeId,
    pub nodes: BTreeMap<NodeId, SubgraphNode>,
}

impl Subgraph {
    pub fn dependency_node(&self) -> Option<&SubgraphNode> {
        self.nodes.get(&self.dependency)
    }

    /// Distance of the vulnerable node from the root.
    pub fn depth(&self) -> Option<usize> {
        self.dependency_node().map(|node| node.distance)
    }
}

/// An advisory affecting a resolved graph, with its reachability witnesses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub advisory: Advisory,
    /// Only reachable through development dependencies
    #[serde(default)]
    pub dev_only: bool,
    pub subgraphs: Vec<Subgraph>,
}

impl Vulnerability {
    pub fn id(&self) -> &str {
        &self.advisory.id
    }
}

// ============================================================================
// Resolution results & patches
// ============================================================================

/// Output of resolving a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub manifest: Manifest,
    pub graph: Graph,
    pub vulns: Vec<Vulnerability>,
}

impl ResolutionResult {
    /// Narrows the vulnerability list to those accepted by `matches`.
    pub fn filter_vulns(&mut self, matches: impl Fn(&Vulnerability) -> bool) {
        self.vulns.retain(|vuln| matches(vuln));
    }

    /// Sorted, de-duplicated IDs of the vulnerabilities in this result.
    pub fn vuln_ids(&self) -> BTreeSet<&str> {
        self.vulns.iter().map(Vulnerability::id).collect()
    }
}

/// One change to a manifest requirement.
///
/// An empty `orig_require` marks an override rather than an edit of an
/// existing constraint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyPatch {
    pub package: PackageKey,
    #[serde(default)]
    pub dep_type: DepType,
    pub orig_require: String,
    pub orig_resolved: String,
    pub new_require: String,
    pub new_resolved: String,
}

/// A forced version replacement for a single package, relative to the
/// original manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverridePatch {
    pub package: PackageKey,
    pub orig_version: String,
    pub new_version: String,
}

impl From<&OverridePatch> for DependencyPatch {
    fn from(patch: &OverridePatch) -> Self {
        DependencyPatch {
            package: patch.package.clone(),
            dep_type: DepType::default(),
            orig_require: String::new(),
            orig_resolved: patch.orig_version.clone(),
            new_require: patch.new_version.clone(),
            new_resolved: patch.new_version.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maven(name: &str) -> PackageKey {
        PackageKey::new(Ecosystem::Maven, name)
    }

    fn advisory(ranges: Vec<AffectedRange>, versions: Vec<&str>) -> Advisory {
        Advisory {
            id: "GHSA-test".to_string(),
            aliases: vec!["CVE-2024-0001".to_string()],
            summary: None,
            severity: Some(7.5),
            affected: vec![Affected {
                package: maven("org.example:lib"),
                ranges,
                versions: versions.into_iter().map(String::from).collect(),
            }],
        }
    }

    #[test]
    fn test_advisory_range_matching() {
        let adv = advisory(
            vec![AffectedRange {
                introduced: Some("0".to_string()),
                fixed: Some("1.2.0".to_string()),
                last_affected: None,
            }],
            vec![],
        );
        let pkg = maven("org.example:lib");

        assert!(adv.is_affected(&VersionKey::concrete(pkg.clone(), "1.0.0")));
        assert!(adv.is_affected(&VersionKey::concrete(pkg.clone(), "1.1.9")));
        assert!(!adv.is_affected(&VersionKey::concrete(pkg.clone(), "1.2.0")));
        assert!(!adv.is_affected(&VersionKey::concrete(pkg, "2.0")));
    }

    #[test]
    fn test_advisory_last_affected_and_explicit_versions() {
        let adv = advisory(
            vec![AffectedRange {
                introduced: Some("2.0".to_string()),
                fixed: None,
                last_affected: Some("2.3".to_string()),
            }],
            vec!["1.5"],
        );
        let pkg = maven("org.example:lib");

        assert!(adv.is_affected(&VersionKey::concrete(pkg.clone(), "1.5")));
        assert!(!adv.is_affected(&VersionKey::concrete(pkg.clone(), "1.6")));
        assert!(adv.is_affected(&VersionKey::concrete(pkg.clone(), "2.3")));
        assert!(!adv.is_affected(&VersionKey::concrete(pkg, "2.3.1")));
    }

    #[test]
    fn test_advisory_ignores_other_packages() {
        let adv = advisory(vec![AffectedRange::default()], vec![]);
        let other = VersionKey::concrete(maven("org.example:other"), "1.0.0");
        assert!(!adv.is_affected(&other));
        assert!(adv.matches_id("CVE-2024-0001"));
        assert!(!adv.matches_id("CVE-2024-0002"));
    }

    #[test]
    fn test_override_patch_to_dependency_patch() {
        let patch = OverridePatch {
            package: maven("org.example:lib"),
            orig_version: "1.0.0".to_string(),
            new_version: "1.2.0".to_string(),
        };
        let dep = DependencyPatch::from(&patch);
        assert!(dep.orig_require.is_empty());
        assert_eq!(dep.orig_resolved, "1.0.0");
        assert_eq!(dep.new_require, "1.2.0");
        assert_eq!(dep.new_resolved, "1.2.0");
    }

    #[test]
    fn test_dep_type_serialization() {
        let dep_type = DepType::new().with_attr(DepAttr::MavenDependencyOrigin, ORIGIN_MANAGEMENT);

        let json = serde_json::to_string(&dep_type).unwrap();
        let deserialized: DepType = serde_json::from_str(&json).unwrap();

        assert_eq!(
            deserialized.get_attr(DepAttr::MavenDependencyOrigin),
            Some(ORIGIN_MANAGEMENT)
        );
        assert!(!deserialized.has_artifact_qualifier());
    }
}
