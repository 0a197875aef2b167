use crate::model::{Manifest, PackageKey, ResolutionResult, VersionKey};
use crate::remediate::options::ResolveOptions;
use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by the resolver and registry collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Package not found: {0}")]
    PackageNotFound(String),
    #[error("Version not found: {0}")]
    VersionNotFound(String),
    #[error("Resolution failed: {0}")]
    Resolution(String),
    #[error("Registry request failed: {0}")]
    Registry(String),
}

/// Resolves a manifest into a dependency graph annotated with vulnerabilities.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolves `manifest`. Must be deterministic for a given manifest and
    /// options pair.
    async fn resolve(
        &self,
        manifest: &Manifest,
        opts: &ResolveOptions,
    ) -> Result<ResolutionResult, ClientError>;
}

/// Lists the published versions of a package.
#[async_trait]
pub trait DependencyClient: Send + Sync {
    /// Returns every known version of `package`, in no particular order.
    async fn versions(&self, package: &PackageKey) -> Result<Vec<VersionKey>, ClientError>;
}

/// A client that can both resolve manifests and list package versions.
pub trait ResolutionClient: Resolver + DependencyClient {}

impl<T: Resolver + DependencyClient + ?Sized> ResolutionClient for T {}
