//! Minimal safe version selection for a single package.
//!
//! Given the version a package currently resolves to and the vulnerabilities
//! affecting it, [`select_best`] scans the package's newer versions in
//! ascending order and returns the smallest one that leaves the fewest of
//! those vulnerabilities, without exceeding the package's upgrade level.

use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::model::{Vulnerability, VersionKey};
use crate::remediate::traits::{RemediationError, UpgradeLevel};
use crate::traits::DependencyClient;
use crate::version::{ordering_for, Version};

/// Outcome of a version scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// The chosen version; the current one if nothing better exists
    pub version: VersionKey,

    /// How many of the affecting vulnerabilities still apply to `version`
    pub remaining: usize,
}

/// Returns the known versions of `vk`'s package that sort after `current`,
/// ascending under the package's [`VersionOrdering`](crate::version::VersionOrdering).
///
/// Registry versions that fail to parse are skipped.
pub async fn versions_greater<C>(
    client: &C,
    vk: &VersionKey,
    current: &Version,
) -> Result<Vec<(VersionKey, Version)>, RemediationError>
where
    C: DependencyClient + ?Sized,
{
    let listed = client.versions(&vk.package).await?;

    let mut versions: Vec<(VersionKey, Version)> = listed
        .into_iter()
        .filter_map(|candidate| match Version::parse(vk.ecosystem(), &candidate.version) {
            Ok(parsed) => Some((candidate, parsed)),
            Err(e) => {
                warn!(package = %vk.package, version = %candidate.version, error = %e, "Skipping unparseable version");
                None
            }
        })
        .collect();

    let ordering = ordering_for(vk);
    versions.sort_by(|(_, a), (_, b)| ordering.compare(a, b));

    // If the current version is not listed, this is already the next higher one.
    let offset = versions.partition_point(|(_, v)| ordering.compare(v, current) != Ordering::Greater);
    Ok(versions.split_off(offset))
}

/// Finds the minimal version greater than `vk` that fixes as many of
/// `vulns` as possible within `level`.
///
/// The scan stops at the first version whose distance from `vk` is not
/// allowed by `level`, and as soon as a version with no remaining
/// vulnerabilities is found.
///
/// # Errors
///
/// Returns [`RemediationError::VersionParse`] if the current version cannot
/// be parsed, or [`RemediationError::Client`] if listing versions fails.
pub async fn select_best<C>(
    client: &C,
    vk: &VersionKey,
    vulns: &[&Vulnerability],
    level: UpgradeLevel,
) -> Result<Selection, RemediationError>
where
    C: DependencyClient + ?Sized,
{
    let mut best = Selection {
        version: vk.clone(),
        remaining: vulns.len(),
    };
    if vulns.is_empty() || level == UpgradeLevel::None {
        return Ok(best);
    }

    let current = Version::parse(vk.ecosystem(), &vk.version)?;
    for (candidate, version) in versions_greater(client, vk, &current).await? {
        if !level.allows(current.difference(&version)) {
            break;
        }

        let remaining = vulns
            .iter()
            .filter(|vuln| vuln.advisory.is_affected(&candidate))
            .count();
        if remaining < best.remaining {
            best = Selection {
                version: candidate,
                remaining,
            };
            if remaining == 0 {
                break;
            }
        }
    }

    debug!(
        package = %vk.package,
        from = %vk.version,
        to = %best.version.version,
        remaining = best.remaining,
        "Selected version"
    );
    Ok(best)
}
