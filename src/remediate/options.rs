//! Configuration for a remediation run.
//!
//! [`RemediationOptions`] bundles everything the engine needs besides the
//! resolution client: resolver options, the upgrade policy, the vulnerability
//! match predicate and the concurrency cap.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::model::Vulnerability;
use crate::remediate::traits::UpgradeConfig;

/// Default number of remediation branches resolved at the same time.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Predicate deciding which vulnerabilities are in scope.
pub type MatchVuln = Arc<dyn Fn(&Vulnerability) -> bool + Send + Sync>;

/// Options forwarded untouched to the [`Resolver`](crate::traits::Resolver)
/// on every resolve of a remediation run.
///
/// The engine never reads them; they only have to stay the same between the
/// initial resolution and the re-resolutions of patched manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOptions {
    /// Resolve Maven dependency management entries as dependencies. Read by
    /// resolver implementations only.
    #[serde(default)]
    pub maven_management: bool,
}

/// The standard vulnerability match predicate.
///
/// A vulnerability is in scope when it is not ignored, is explicitly listed
/// (if an explicit list is given), and passes the dev-only, severity and
/// depth checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulnFilter {
    /// Vulnerability IDs or aliases never targeted
    pub ignore_vulns: Vec<String>,

    /// If non-empty, only these IDs or aliases are targeted
    pub explicit_vulns: Vec<String>,

    /// Whether vulnerabilities only reachable through dev dependencies count
    pub dev_deps: bool,

    /// Minimum CVSS score; vulnerabilities without a score always pass
    pub min_severity: Option<f64>,

    /// Maximum distance of the vulnerable package from the root
    pub max_depth: Option<usize>,
}

impl Default for VulnFilter {
    fn default() -> Self {
        Self {
            ignore_vulns: Vec::new(),
            explicit_vulns: Vec::new(),
            dev_deps: true,
            min_severity: None,
            max_depth: None,
        }
    }
}

impl VulnFilter {
    pub fn matches(&self, vuln: &Vulnerability) -> bool {
        let named = |ids: &[String]| ids.iter().any(|id| vuln.advisory.matches_id(id));

        if named(&self.ignore_vulns) {
            return false;
        }
        if !self.explicit_vulns.is_empty() && !named(&self.explicit_vulns) {
            return false;
        }
        if !self.dev_deps && vuln.dev_only {
            return false;
        }
        if let (Some(min), Some(score)) = (self.min_severity, vuln.advisory.severity) {
            if score < min {
                return false;
            }
        }
        match self.max_depth {
            Some(max) => vuln
                .subgraphs
                .iter()
                .filter_map(|sg| sg.depth())
                .any(|depth| depth <= max),
            None => true,
        }
    }

    pub fn into_predicate(self) -> MatchVuln {
        Arc::new(move |vuln: &Vulnerability| self.matches(vuln))
    }
}

/// Options for [`OverrideExecutor`](crate::executor::OverrideExecutor) and
/// the convergence loop.
///
/// # Example
///
/// ```ignore
/// let options = RemediationOptions::default()
///     .with_upgrade_config(UpgradeConfig::parse_entries(["minor"])?)
///     .with_filter(VulnFilter { max_depth: Some(3), ..Default::default() })
///     .with_max_concurrency(4);
/// ```
#[derive(Clone)]
pub struct RemediationOptions {
    pub resolve: ResolveOptions,
    pub upgrade_config: UpgradeConfig,
    pub match_vuln: MatchVuln,
    pub max_concurrency: usize,
}

impl Default for RemediationOptions {
    fn default() -> Self {
        Self {
            resolve: ResolveOptions::default(),
            upgrade_config: UpgradeConfig::default(),
            match_vuln: VulnFilter::default().into_predicate(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl fmt::Debug for RemediationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemediationOptions")
            .field("resolve", &self.resolve)
            .field("upgrade_config", &self.upgrade_config)
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

impl RemediationOptions {
    pub fn with_resolve_options(mut self, resolve: ResolveOptions) -> Self {
        self.resolve = resolve;
        self
    }

    pub fn with_upgrade_config(mut self, config: UpgradeConfig) -> Self {
        self.upgrade_config = config;
        self
    }

    /// Uses the standard [`VulnFilter`] as match predicate.
    pub fn with_filter(mut self, filter: VulnFilter) -> Self {
        self.match_vuln = filter.into_predicate();
        self
    }

    /// Uses a custom match predicate.
    pub fn with_match_vuln<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Vulnerability) -> bool + Send + Sync + 'static,
    {
        self.match_vuln = Arc::new(predicate);
        self
    }

    /// Caps the number of branches resolved concurrently. Zero is raised to one.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    pub fn matches(&self, vuln: &Vulnerability) -> bool {
        (self.match_vuln)(vuln)
    }
}
