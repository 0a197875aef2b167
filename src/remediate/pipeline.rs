//! The convergence loop: patch, re-resolve, repeat.
//!
//! [`override_patch_vulns`] tries to fix one set of vulnerabilities by
//! overriding the versions of the packages they affect. Each round:
//! 1. **Discovery**: map every targeted vulnerability to the version keys it affects
//! 2. **Selection**: pick a replacement version per key via [`select_best`]
//! 3. **Patch & resolve**: apply the round's patches and resolve again
//!
//! The loop ends once nothing targeted is left, or a round produces no new
//! patch.

use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, instrument};

use crate::model::{OverridePatch, ResolutionResult, VersionKey, Vulnerability};
use crate::remediate::options::RemediationOptions;
use crate::remediate::patcher::patch_manifest;
use crate::remediate::selector::select_best;
use crate::remediate::traits::{RemediationError, UpgradeLevel};
use crate::traits::ResolutionClient;
use crate::version::Version;

/// Groups the targeted vulnerabilities of `result` by the version key they
/// affect, as indices into `result.vulns`.
///
/// A vulnerability contributes at most once per version key, however many
/// edges lead to the vulnerable node.
///
/// # Errors
///
/// Returns [`RemediationError::Infeasible`] if an edge into a vulnerable node
/// names a classifier or artifact type. Registries cannot tell whether a
/// given version exists for that classifier/type.
pub fn affected_version_keys(
    result: &ResolutionResult,
    vuln_ids: &[String],
) -> Result<BTreeMap<VersionKey, Vec<usize>>, RemediationError> {
    let mut affected: BTreeMap<VersionKey, Vec<usize>> = BTreeMap::new();

    for (idx, vuln) in result.vulns.iter().enumerate() {
        if !vuln_ids.iter().any(|id| id == vuln.id()) {
            continue;
        }

        let mut seen = HashSet::new();
        for node in vuln.subgraphs.iter().filter_map(|sg| sg.dependency_node()) {
            for edge in &node.parents {
                if edge.dep_type.has_artifact_qualifier() {
                    return Err(RemediationError::Infeasible(
                        "cannot fix vulns in artifacts with classifier or type".to_string(),
                    ));
                }
                if seen.insert(&node.version) {
                    affected.entry(node.version.clone()).or_default().push(idx);
                }
            }
        }
    }

    Ok(affected)
}

/// Folds a round's patches into the running list of effective patches.
///
/// A patch continuing an earlier one (same package, starting from the
/// version the earlier patch moved to) extends that patch instead of adding
/// a second entry for the package.
pub fn merge_patches(effective: &mut Vec<OverridePatch>, round: Vec<OverridePatch>) {
    for patch in round {
        match effective
            .iter_mut()
            .find(|p| p.package == patch.package && p.new_version == patch.orig_version)
        {
            Some(existing) => existing.new_version = patch.new_version,
            None => effective.push(patch),
        }
    }
}

/// Orders patches by package, then by original version.
fn sort_patches(patches: &mut [OverridePatch]) {
    patches.sort_by(|a, b| {
        a.package.cmp(&b.package).then_with(|| {
            let eco = a.package.ecosystem;
            match (
                Version::parse(eco, &a.orig_version),
                Version::parse(eco, &b.orig_version),
            ) {
                (Ok(va), Ok(vb)) => va.compare(&vb),
                _ => a.orig_version.cmp(&b.orig_version),
            }
        })
    });
}

/// Fixes as many of `vuln_ids` in `result` as possible by overriding
/// dependency versions.
///
/// Returns the final resolution result (vulnerabilities filtered by the
/// options' predicate) with the effective patches relative to `result`'s
/// manifest, sorted by package and original version.
///
/// # Errors
///
/// - [`RemediationError::Infeasible`] if no targeted vulnerability could be
///   fixed, or an affected edge carries a classifier/artifact type
/// - [`RemediationError::Client`] if resolving or listing versions fails
/// - [`RemediationError::UnsupportedEcosystem`] if the manifest cannot be
///   patched
#[instrument(skip(client, result, options), fields(vuln_ids = ?vuln_ids))]
pub async fn override_patch_vulns<C>(
    client: &C,
    mut result: ResolutionResult,
    vuln_ids: &[String],
    options: &RemediationOptions,
) -> Result<(ResolutionResult, Vec<OverridePatch>), RemediationError>
where
    C: ResolutionClient + ?Sized,
{
    let mut effective: Vec<OverridePatch> = Vec::new();
    let mut round = 0usize;

    loop {
        round += 1;
        let affected = affected_version_keys(&result, vuln_ids)?;
        if affected.is_empty() {
            debug!(round, "All targeted vulnerabilities fixed");
            break;
        }

        let mut new_patches = Vec::with_capacity(affected.len());
        for (vk, indices) in &affected {
            let level = options.upgrade_config.get(vk.name());
            if level == UpgradeLevel::None {
                debug!(package = %vk.package, "Package may not be upgraded, skipping");
                continue;
            }

            let vulns: Vec<&Vulnerability> = indices.iter().map(|&i| &result.vulns[i]).collect();
            let best = select_best(client, vk, &vulns, level).await?;
            if best.remaining < vulns.len() {
                new_patches.push(OverridePatch {
                    package: vk.package.clone(),
                    orig_version: vk.version.clone(),
                    new_version: best.version.version,
                });
            }
        }

        if new_patches.is_empty() {
            debug!(round, "No further progress possible");
            break;
        }

        let manifest = patch_manifest(&new_patches, &result.manifest)?;
        result = client.resolve(&manifest, &options.resolve).await?;
        result.filter_vulns(|v| options.matches(v));

        debug!(round, patches = new_patches.len(), remaining = result.vulns.len(), "Re-resolved patched manifest");
        merge_patches(&mut effective, new_patches);
    }

    if effective.is_empty() {
        return Err(RemediationError::Infeasible(
            "no targeted vulnerability can be fixed".to_string(),
        ));
    }

    sort_patches(&mut effective);
    info!(rounds = round, patches = effective.len(), "Override remediation converged");
    Ok((result, effective))
}
