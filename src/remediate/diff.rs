//! Differences between two resolution results, see
//! [`ResolutionResult::calculate_diff`].

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::model::{DepAttr, DependencyPatch, ResolutionResult, Vulnerability};

/// The outcome of one remediation candidate relative to the original result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Difference {
    /// The result after applying `deps`
    pub new_result: ResolutionResult,

    /// Vulnerabilities of the original result no longer present
    pub removed_vulns: Vec<Vulnerability>,

    /// Vulnerabilities not present in the original result
    pub added_vulns: Vec<Vulnerability>,

    /// The manifest changes leading from the original to `new_result`
    pub deps: Vec<DependencyPatch>,
}

impl Difference {
    /// Sorted IDs of the vulnerabilities left in `new_result`.
    pub fn remaining_vuln_ids(&self) -> Vec<&str> {
        self.new_result.vuln_ids().into_iter().collect()
    }

    /// Canonical ordering: by patches, then by the remaining vulnerabilities.
    ///
    /// Two differences comparing equal are duplicates.
    pub fn compare(&self, other: &Difference) -> Ordering {
        self.deps
            .cmp(&other.deps)
            .then_with(|| self.remaining_vuln_ids().cmp(&other.remaining_vuln_ids()))
    }
}

impl ResolutionResult {
    /// Computes the difference from `self` to `other`.
    ///
    /// Vulnerabilities are matched by ID. `deps` holds one entry per
    /// requirement of `other`'s manifest that is new or declares a different
    /// version than in `self`'s manifest.
    pub fn calculate_diff(&self, other: ResolutionResult) -> Difference {
        let old_ids = self.vuln_ids();
        let new_ids = other.vuln_ids();

        let removed_vulns = unique_by_id(self.vulns.iter().filter(|v| !new_ids.contains(v.id())));
        let added_vulns = unique_by_id(other.vulns.iter().filter(|v| !old_ids.contains(v.id())));

        let deps = other
            .manifest
            .requirements
            .iter()
            .filter_map(|new_req| {
                let origin = new_req.dep_type.get_attr(DepAttr::MavenDependencyOrigin);
                let old_req = self.manifest.requirements.iter().find(|old| {
                    old.package() == new_req.package()
                        && old.dep_type.get_attr(DepAttr::MavenDependencyOrigin) == origin
                });
                if old_req.is_some_and(|old| old.version_key.version == new_req.version_key.version) {
                    return None;
                }

                let resolved = |result: &ResolutionResult| {
                    result
                        .graph
                        .resolved_version(new_req.package())
                        .unwrap_or_default()
                        .to_string()
                };
                Some(DependencyPatch {
                    package: new_req.package().clone(),
                    dep_type: new_req.dep_type.clone(),
                    orig_require: old_req
                        .map(|old| old.version_key.version.clone())
                        .unwrap_or_default(),
                    orig_resolved: resolved(self),
                    new_require: new_req.version_key.version.clone(),
                    new_resolved: resolved(&other),
                })
            })
            .collect();

        Difference {
            new_result: other,
            removed_vulns,
            added_vulns,
            deps,
        }
    }
}

fn unique_by_id<'a>(vulns: impl Iterator<Item = &'a Vulnerability>) -> Vec<Vulnerability> {
    let mut seen = BTreeSet::new();
    vulns
        .filter(|v| seen.insert(v.id().to_string()))
        .cloned()
        .collect()
}
