//! In-memory manifest patching.
//!
//! [`patch_manifest`] applies override patches to a clone of a manifest; the
//! input manifest is never modified.

use tracing::trace;

use crate::model::{
    DepAttr, DepType, Ecosystem, Manifest, OverridePatch, RequirementVersion, VersionKey,
    ORIGIN_MANAGEMENT,
};
use crate::remediate::traits::RemediationError;

/// Whether an override for the requirement's package may rewrite it.
///
/// Only regular requirements and dependency-management entries qualify;
/// plugin, profile or parent scoped requirements stay as declared.
fn is_overridable(requirement: &RequirementVersion) -> bool {
    match requirement.dep_type.get_attr(DepAttr::MavenDependencyOrigin) {
        None => true,
        Some(origin) => origin == ORIGIN_MANAGEMENT,
    }
}

/// Returns a copy of `manifest` with `patches` applied.
///
/// Existing overridable requirements of a patched package get the patch's new
/// version. A package without one gets a new dependency-management entry,
/// appended after the existing requirements. Requirement order is preserved.
///
/// # Errors
///
/// Returns [`RemediationError::UnsupportedEcosystem`] unless the manifest is
/// a Maven manifest.
pub fn patch_manifest(
    patches: &[OverridePatch],
    manifest: &Manifest,
) -> Result<Manifest, RemediationError> {
    if manifest.ecosystem() != Ecosystem::Maven {
        return Err(RemediationError::UnsupportedEcosystem(manifest.ecosystem()));
    }

    // TODO: override patches carry no classifier/type, so requirements that
    // declare one are matched on package identity alone.
    let mut patched = manifest.clone();
    for patch in patches {
        let mut found = false;
        for requirement in patched
            .requirements
            .iter_mut()
            .filter(|r| r.package() == &patch.package && is_overridable(r))
        {
            requirement.version_key.version = patch.new_version.clone();
            found = true;
        }

        if !found {
            trace!(package = %patch.package, version = %patch.new_version, "Adding managed override");
            patched.requirements.push(RequirementVersion::new(
                VersionKey::requirement(patch.package.clone(), patch.new_version.clone()),
                DepType::new().with_attr(DepAttr::MavenDependencyOrigin, ORIGIN_MANAGEMENT),
            ));
        }
    }

    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PackageKey, ORIGIN_PLUGIN, ORIGIN_PROFILE};

    fn pkg(name: &str) -> PackageKey {
        PackageKey::new(Ecosystem::Maven, name)
    }

    fn req(name: &str, version: &str, origin: Option<&str>) -> RequirementVersion {
        let dep_type = match origin {
            Some(origin) => DepType::new().with_attr(DepAttr::MavenDependencyOrigin, origin),
            None => DepType::new(),
        };
        RequirementVersion::new(VersionKey::requirement(pkg(name), version), dep_type)
    }

    fn manifest(requirements: Vec<RequirementVersion>) -> Manifest {
        Manifest {
            root: VersionKey::concrete(pkg("org.example:app"), "1.0.0"),
            requirements,
        }
    }

    fn patch(name: &str, from: &str, to: &str) -> OverridePatch {
        OverridePatch {
            package: pkg(name),
            orig_version: from.to_string(),
            new_version: to.to_string(),
        }
    }

    #[test]
    fn test_rewrites_direct_and_managed_requirements() {
        let original = manifest(vec![
            req("org.example:a", "1.0", None),
            req("org.example:b", "2.0", Some(ORIGIN_MANAGEMENT)),
            req("org.example:c", "3.0", None),
        ]);

        let patched = patch_manifest(
            &[patch("org.example:a", "1.0", "1.1"), patch("org.example:b", "2.0", "2.5")],
            &original,
        )
        .unwrap();

        let versions: Vec<&str> = patched
            .requirements
            .iter()
            .map(|r| r.version_key.version.as_str())
            .collect();
        assert_eq!(versions, vec!["1.1", "2.5", "3.0"]);
        // The original is untouched.
        assert_eq!(original.requirements[0].version_key.version, "1.0");
    }

    #[test]
    fn test_adds_management_entry_for_transitive_package() {
        let original = manifest(vec![req("org.example:a", "1.0", None)]);

        let patched = patch_manifest(&[patch("org.example:q", "1.0", "1.1")], &original).unwrap();

        assert_eq!(patched.requirements.len(), 2);
        let added = &patched.requirements[1];
        assert_eq!(added.package(), &pkg("org.example:q"));
        assert_eq!(added.version_key.version, "1.1");
        assert_eq!(added.version_key.version_type, crate::model::VersionType::Requirement);
        assert_eq!(
            added.dep_type.get_attr(DepAttr::MavenDependencyOrigin),
            Some(ORIGIN_MANAGEMENT)
        );
    }

    #[test]
    fn test_scoped_requirements_are_left_alone() {
        let original = manifest(vec![
            req("org.example:a", "1.0", Some(ORIGIN_PLUGIN)),
            req("org.example:a", "1.0", Some(ORIGIN_PROFILE)),
        ]);

        let patched = patch_manifest(&[patch("org.example:a", "1.0", "1.2")], &original).unwrap();

        assert_eq!(patched.requirements.len(), 3);
        assert_eq!(patched.requirements[0].version_key.version, "1.0");
        assert_eq!(patched.requirements[1].version_key.version, "1.0");
        assert_eq!(patched.requirements[2].version_key.version, "1.2");
        assert_eq!(
            patched.requirements[2].dep_type.get_attr(DepAttr::MavenDependencyOrigin),
            Some(ORIGIN_MANAGEMENT)
        );
    }

    #[test]
    fn test_rejects_unsupported_ecosystem() {
        let npm = Manifest {
            root: VersionKey::concrete(PackageKey::new(Ecosystem::Npm, "app"), "1.0.0"),
            requirements: vec![],
        };
        let err = patch_manifest(&[], &npm).unwrap_err();
        assert!(matches!(
            err,
            RemediationError::UnsupportedEcosystem(Ecosystem::Npm)
        ));
    }
}
