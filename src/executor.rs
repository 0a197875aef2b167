use crate::model::{DependencyPatch, OverridePatch, ResolutionResult};
use crate::remediate::diff::Difference;
use crate::remediate::options::RemediationOptions;
use crate::remediate::pipeline::override_patch_vulns;
use crate::remediate::traits::RemediationError;
use crate::traits::ResolutionClient;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

type BranchResult = Result<(ResolutionResult, Vec<OverridePatch>), RemediationError>;

/// What a finished remediation branch reports back to the collector.
struct BranchOutcome {
    vuln_ids: Vec<String>,
    result: BranchResult,
}

/// Explores override remediations for every vulnerability of a resolution
/// result, one branch per target set.
///
/// Branches run as tokio tasks; at most `max_concurrency` of them resolve at
/// the same time.
pub struct OverrideExecutor<C: ?Sized> {
    client: Arc<C>,
    options: Arc<RemediationOptions>,
    semaphore: Arc<Semaphore>,
}

impl<C> OverrideExecutor<C>
where
    C: ResolutionClient + ?Sized + 'static,
{
    pub fn new(client: Arc<C>, options: RemediationOptions) -> Self {
        let permits = options.max_concurrency.max(1);
        Self {
            client,
            options: Arc::new(options),
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Computes every distinct override remediation of `result`.
    ///
    /// One branch is started per vulnerability in scope. A branch whose
    /// patches introduce vulnerabilities absent from `result` starts a
    /// follow-up branch targeting its own set plus the introduced ones.
    /// Vulnerabilities already present in `result` are left to their own
    /// branches. Branches that turn out
    /// infeasible, or fail to resolve, are dropped.
    ///
    /// The returned differences are sorted by [`Difference::compare`] with
    /// duplicates removed, so the output does not depend on task scheduling.
    ///
    /// # Errors
    ///
    /// Returns [`RemediationError::UnsupportedEcosystem`] if the manifest
    /// cannot be patched, or [`RemediationError::TaskFailed`] if a branch
    /// panics. Remaining branches are cancelled.
    #[instrument(skip(self, result), fields(root = %result.manifest.root))]
    pub async fn compute_override_patches(
        &self,
        mut result: ResolutionResult,
    ) -> Result<Vec<Difference>, RemediationError> {
        result.filter_vulns(|v| self.options.matches(v));
        let original = Arc::new(result);

        let mut branches = JoinSet::new();
        for id in original.vuln_ids() {
            self.spawn_branch(&mut branches, &original, vec![id.to_string()]);
        }
        info!(branches = branches.len(), "Started remediation branches");

        let mut diffs = Vec::new();
        while let Some(joined) = branches.join_next().await {
            let outcome = joined.map_err(|e| RemediationError::TaskFailed(e.to_string()))?;
            let (new_result, patches) = match outcome.result {
                Ok(found) => found,
                Err(RemediationError::Infeasible(reason)) => {
                    debug!(vuln_ids = ?outcome.vuln_ids, %reason, "Dropping infeasible branch");
                    continue;
                }
                Err(e) if e.is_branch_local() => {
                    warn!(vuln_ids = ?outcome.vuln_ids, error = %e, "Dropping failed branch");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut diff = original.calculate_diff(new_result);
            diff.deps = patches.iter().map(DependencyPatch::from).collect();

            let introduced: Vec<&str> = diff
                .added_vulns
                .iter()
                .map(|v| v.id())
                .filter(|id| !outcome.vuln_ids.iter().any(|target| target.as_str() == *id))
                .collect();
            if !introduced.is_empty() {
                let targets: BTreeSet<String> = outcome
                    .vuln_ids
                    .iter()
                    .map(String::as_str)
                    .chain(introduced)
                    .map(str::to_string)
                    .collect();
                debug!(vuln_ids = ?targets, "Patches introduced new vulnerabilities, starting follow-up branch");
                self.spawn_branch(&mut branches, &original, targets.into_iter().collect());
            }

            diffs.push(diff);
        }

        diffs.sort_by(|a, b| a.compare(b));
        diffs.dedup_by(|a, b| a.compare(b).is_eq());

        info!(differences = diffs.len(), "Override remediation finished");
        Ok(diffs)
    }

    fn spawn_branch(
        &self,
        branches: &mut JoinSet<BranchOutcome>,
        original: &Arc<ResolutionResult>,
        vuln_ids: Vec<String>,
    ) {
        let client = Arc::clone(&self.client);
        let options = Arc::clone(&self.options);
        let semaphore = Arc::clone(&self.semaphore);
        let original = Arc::clone(original);

        branches.spawn(async move {
            let result: BranchResult = async {
                let _permit = semaphore.acquire_owned().await.map_err(|e| {
                    RemediationError::TaskFailed(format!("Semaphore error: {}", e))
                })?;
                override_patch_vulns(client.as_ref(), (*original).clone(), &vuln_ids, &options)
                    .await
            }
            .await;
            BranchOutcome { vuln_ids, result }
        });
    }
}
