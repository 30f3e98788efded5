//! Run orchestration across repositories and packages.
//!
//! Repositories are processed one at a time, in the order given; within a
//! repository, packages are processed in catalog order. A failure abandons
//! only the package it happened in, except that a permission denial skips the
//! rest of its repository. Only a rejected credential, or cancellation, stops
//! the run.

use std::fmt;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::PatchCatalog;
use crate::config::RunConfig;
use crate::effects::GitHubInterpreter;
use crate::github::{GitHubApiError, GitHubErrorKind};
use crate::reconcile::{
    ExecutionMode, PackageContext, PackageStatus, ReconcileError, RemoteProbe, reconcile_package,
};
use crate::types::{ContentResult, PackageIdentity, RepoId};

/// Errors that stop the whole run.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("GitHub rejected the credential while processing {repo}: {source}")]
    FatalAuth {
        repo: RepoId,
        #[source]
        source: GitHubApiError,
    },

    #[error("run cancelled")]
    Cancelled,
}

/// Why a repository was not reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoSkipReason {
    /// Listed in the exclusion set.
    Excluded,
    /// The base branch has no patch directory.
    NoPatchDirectory,
    /// The token cannot read or write the repository.
    Inaccessible,
    /// Probing the patch directory failed for another reason.
    ProbeFailed(String),
}

impl fmt::Display for RepoSkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoSkipReason::Excluded => write!(f, "excluded"),
            RepoSkipReason::NoPatchDirectory => write!(f, "no patch directory"),
            RepoSkipReason::Inaccessible => write!(f, "inaccessible"),
            RepoSkipReason::ProbeFailed(message) => write!(f, "probe failed: {message}"),
        }
    }
}

/// What happened to one package in one repository.
#[derive(Debug, Clone)]
pub struct PackageReport {
    pub repo: RepoId,
    pub package: PackageIdentity,
    pub status: PackageStatus,
    /// Mutating actions in the plan.
    pub planned: usize,
    /// Mutating actions that changed the remote.
    pub applied: usize,
    /// Set when `status` is `Error`.
    pub error: Option<String>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub packages: Vec<PackageReport>,
    pub skipped_repos: Vec<(RepoId, RepoSkipReason)>,
}

impl RunSummary {
    /// Returns true if any convergence action changed a remote anywhere.
    pub fn changed(&self) -> bool {
        self.packages.iter().any(|p| p.applied > 0)
    }

    /// Number of packages that ended with `status`.
    pub fn count(&self, status: PackageStatus) -> usize {
        self.packages.iter().filter(|p| p.status == status).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &PackageReport> {
        self.packages
            .iter()
            .filter(|p| p.status == PackageStatus::Error)
    }
}

/// Reconciles a catalog against a sequence of repositories.
pub struct RepositoryDriver<'a> {
    catalog: &'a PatchCatalog,
    config: &'a RunConfig,
    cancel: CancellationToken,
}

impl<'a> RepositoryDriver<'a> {
    pub fn new(catalog: &'a PatchCatalog, config: &'a RunConfig, cancel: CancellationToken) -> Self {
        RepositoryDriver {
            catalog,
            config,
            cancel,
        }
    }

    fn mode(&self) -> ExecutionMode {
        if self.config.dry_run {
            ExecutionMode::DryRun
        } else {
            ExecutionMode::Apply
        }
    }

    /// Processes every repository in `repos`, using `connect` to get an
    /// interpreter scoped to each one.
    pub async fn run<G, F>(&self, repos: &[RepoId], connect: F) -> Result<RunSummary, DriverError>
    where
        G: GitHubInterpreter,
        F: Fn(&RepoId) -> G,
    {
        let mut summary = RunSummary::default();

        for repo in repos {
            if self.cancel.is_cancelled() {
                return Err(DriverError::Cancelled);
            }
            if self.config.is_excluded(repo) {
                debug!(%repo, "Repository excluded");
                summary
                    .skipped_repos
                    .push((repo.clone(), RepoSkipReason::Excluded));
                continue;
            }
            let github = connect(repo);
            self.process_repo(repo, &github, &mut summary).await?;
        }

        info!(
            repos = repos.len(),
            skipped = summary.skipped_repos.len(),
            converged = summary.count(PackageStatus::Converged),
            in_sync = summary.count(PackageStatus::InSync),
            failed = summary.count(PackageStatus::Error),
            changed = summary.changed(),
            "Run complete"
        );
        Ok(summary)
    }

    /// Reconciles every catalog package in one repository.
    #[instrument(skip(self, github, summary), fields(repo = %repo))]
    pub async fn process_repo<G: GitHubInterpreter>(
        &self,
        repo: &RepoId,
        github: &G,
        summary: &mut RunSummary,
    ) -> Result<(), DriverError> {
        if let Some(reason) = self.probe_patch_directory(repo, github).await? {
            info!(%reason, "Skipping repository");
            summary.skipped_repos.push((repo.clone(), reason));
            return Ok(());
        }

        for patch in self.catalog.patches() {
            if self.cancel.is_cancelled() {
                return Err(DriverError::Cancelled);
            }
            let ctx = PackageContext {
                patch,
                base_branch: &self.config.base_branch,
                remote_dir: &self.config.remote_dir,
                force: self.config.is_forced(&patch.identity),
            };

            let report = match reconcile_package(github, &ctx, self.mode(), &self.cancel).await {
                Ok(outcome) => {
                    let planned = outcome.plan.mutation_count();
                    if self.config.dry_run && planned > 0 {
                        for action in outcome.plan.actions.iter().filter(|a| a.is_mutating()) {
                            info!(package = %patch.identity, %action, "Would apply");
                        }
                    }
                    info!(
                        package = %patch.identity,
                        status = %outcome.plan.status,
                        applied = outcome.applied,
                        "Package reconciled"
                    );
                    PackageReport {
                        repo: repo.clone(),
                        package: patch.identity.clone(),
                        status: outcome.plan.status,
                        planned,
                        applied: outcome.applied,
                        error: None,
                    }
                }
                Err(ReconcileError::Cancelled) => return Err(DriverError::Cancelled),
                Err(ReconcileError::GitHub(source)) if source.kind.is_fatal() => {
                    return Err(DriverError::FatalAuth {
                        repo: repo.clone(),
                        source,
                    });
                }
                Err(ReconcileError::GitHub(e)) if e.kind == GitHubErrorKind::Forbidden => {
                    info!(package = %patch.identity, error = %e, "Access denied; skipping repository");
                    summary
                        .skipped_repos
                        .push((repo.clone(), RepoSkipReason::Inaccessible));
                    return Ok(());
                }
                Err(e) => {
                    error!(package = %patch.identity, error = %e, "Package reconciliation failed");
                    PackageReport {
                        repo: repo.clone(),
                        package: patch.identity.clone(),
                        status: PackageStatus::Error,
                        planned: 0,
                        applied: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            summary.packages.push(report);
        }
        Ok(())
    }

    /// Returns why the repository should be skipped, if it should.
    async fn probe_patch_directory<G: GitHubInterpreter>(
        &self,
        repo: &RepoId,
        github: &G,
    ) -> Result<Option<RepoSkipReason>, DriverError> {
        let probe = RemoteProbe::new(github);
        match probe
            .content(&self.config.remote_dir, &self.config.base_branch)
            .await
        {
            Ok(ContentResult::DirectoryListing(_)) => Ok(None),
            Ok(ContentResult::NotFound | ContentResult::SingleFile(_)) => {
                Ok(Some(RepoSkipReason::NoPatchDirectory))
            }
            Err(ReconcileError::GitHub(source)) if source.kind.is_fatal() => {
                Err(DriverError::FatalAuth {
                    repo: repo.clone(),
                    source,
                })
            }
            Err(ReconcileError::GitHub(e))
                if e.is_not_found() || e.kind == GitHubErrorKind::Forbidden =>
            {
                Ok(Some(RepoSkipReason::Inaccessible))
            }
            Err(e) => {
                warn!(error = %e, "Could not probe patch directory");
                Ok(Some(RepoSkipReason::ProbeFailed(e.to_string())))
            }
        }
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod driver_tests;
