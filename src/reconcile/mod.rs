//! Per-package reconciliation.
//!
//! This module brings one package in one repository in line with the local
//! catalog. It follows the effects-as-data pattern:
//!
//! - `probe` turns read-only effects into typed observations
//! - `engine` decides, purely, what to do with those observations
//! - `executor` applies the resulting plan one action at a time
//!
//! # Key Invariants
//!
//! 1. **One proposal per package**: after a package is processed, at most one
//!    open pull request carries it, either the self-managed one or an adopted
//!    dependency-bot one.
//!
//! 2. **One file per package**: a converged working branch holds exactly one
//!    patch file for the package, at the canonical path.
//!
//! 3. **Fresh observations**: every package is probed from scratch, since
//!    earlier packages in the same run may have changed the remote.

pub mod action;
pub mod engine;
pub mod executor;
pub mod probe;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::effects::{GitHubInterpreter, GitHubResponse};
use crate::github::GitHubApiError;

pub use action::{PackageStatus, Plan, ReconciliationAction};
pub use engine::{BranchObservation, BranchSelection, PackageContext, WorkingRef, WorkingSnapshot};
pub use executor::{ActionExecutor, ActionOutcome};
pub use probe::RemoteProbe;

/// Errors that abandon one package.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    GitHub(#[from] GitHubApiError),

    /// The interpreter answered an effect with the wrong kind of response.
    #[error("unexpected response to {effect}: {response}")]
    UnexpectedResponse {
        effect: &'static str,
        response: String,
    },

    /// The chosen working branch vanished between selection and listing.
    #[error("working branch '{0}' does not exist")]
    WorkingBranchMissing(String),

    #[error("reconciliation cancelled")]
    Cancelled,
}

impl ReconcileError {
    pub(crate) fn unexpected(effect: &'static str, response: &GitHubResponse) -> Self {
        ReconcileError::UnexpectedResponse {
            effect,
            response: format!("{response:?}"),
        }
    }

    /// Returns true if the whole run must stop.
    pub fn is_fatal(&self) -> bool {
        match self {
            ReconcileError::GitHub(e) => e.kind.is_fatal(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReconcileError::Cancelled)
    }
}

/// Whether plans are applied or only computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Apply,
    DryRun,
}

/// The plan for one package and how much of it changed the remote.
#[derive(Debug, Clone)]
pub struct PackageOutcome {
    pub plan: Plan,
    /// Actions that changed remote state. Always zero in dry-run mode.
    pub applied: usize,
}

/// Probes, plans and (unless dry-running) applies one package.
#[instrument(skip_all, fields(package = %ctx.patch.identity))]
pub async fn reconcile_package<G: GitHubInterpreter>(
    github: &G,
    ctx: &PackageContext<'_>,
    mode: ExecutionMode,
    cancel: &CancellationToken,
) -> Result<PackageOutcome, ReconcileError> {
    let probe = RemoteProbe::new(github);
    let self_branch = ctx.self_branch();

    let open_prs = probe.open_prs(ctx.base_branch).await?;
    let self_branch_exists = probe.branch(&self_branch).await?.exists;
    let base_canonical_content = if engine::find_self_pr(ctx, &open_prs).is_some() {
        probe
            .file_content(&ctx.patch.canonical_path, ctx.base_branch)
            .await?
    } else {
        None
    };

    let selection = engine::select_working_ref(
        ctx,
        &BranchObservation {
            open_prs,
            self_branch_exists,
            base_canonical_content,
        },
    );

    let working_ref = selection.working.ref_name(ctx, &self_branch).to_string();
    let head_sha = probe
        .branch(&working_ref)
        .await?
        .head_sha
        .ok_or_else(|| ReconcileError::WorkingBranchMissing(working_ref.clone()))?;

    // Read at the commit, not the branch name, so the listing and the
    // branch created from it agree even if the ref moves meanwhile.
    let entries = probe.list_directory(ctx.remote_dir, head_sha.as_str()).await?;
    let canonical_content = match engine::canonical_entry(ctx, &entries) {
        Some(entry) => probe.file_content(&entry.path, head_sha.as_str()).await?,
        None => None,
    };

    let plan = engine::plan_convergence(
        ctx,
        selection,
        &WorkingSnapshot {
            head_sha,
            entries,
            canonical_content,
        },
    );
    debug!(
        status = %plan.status,
        working_ref = %working_ref,
        actions = plan.actions.len(),
        "Planned package"
    );

    let applied = match mode {
        ExecutionMode::Apply => ActionExecutor::new(github, cancel).apply_plan(&plan).await?,
        ExecutionMode::DryRun => 0,
    };

    Ok(PackageOutcome { plan, applied })
}
