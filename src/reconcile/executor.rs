//! Plan execution with cancellation support.
//!
//! `ActionExecutor` applies a plan's actions strictly in order. Before each
//! action it checks the cancellation token, and where the API allows it
//! re-validates the action's precondition against the remote:
//!
//! - Deleting something that is already gone is already satisfied
//! - Creating a branch or pull request that already exists is already satisfied
//! - A content-hash mismatch on a file write is surfaced, never retried
//! - Before opening a pull request the remote is asked again whether one exists

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::effects::{GitHubEffect, GitHubInterpreter, GitHubResponse};
use crate::github::GitHubApiError;

use super::ReconcileError;
use super::action::{Plan, ReconciliationAction};
use super::probe::RemoteProbe;

/// What applying one action did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Remote state changed.
    Applied,
    /// The remote already satisfied the action; nothing changed.
    AlreadySatisfied,
    /// The action has no remote effect.
    Skipped,
}

/// Applies reconciliation actions to one repository.
pub struct ActionExecutor<'a, G> {
    github: &'a G,
    cancel: &'a CancellationToken,
}

impl<'a, G: GitHubInterpreter> ActionExecutor<'a, G> {
    pub fn new(github: &'a G, cancel: &'a CancellationToken) -> Self {
        ActionExecutor { github, cancel }
    }

    /// Applies every action of `plan` in order, returning how many changed remote state.
    ///
    /// The first failure stops the plan; actions already applied stay applied.
    pub async fn apply_plan(&self, plan: &Plan) -> Result<usize, ReconcileError> {
        let mut applied = 0;
        for action in &plan.actions {
            if self.apply(action).await? == ActionOutcome::Applied {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Applies one action.
    #[instrument(skip(self, action), fields(action = action.name()))]
    pub async fn apply(
        &self,
        action: &ReconciliationAction,
    ) -> Result<ActionOutcome, ReconcileError> {
        if self.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }
        debug!(%action, "Applying action");

        match action {
            ReconciliationAction::NoOp => Ok(ActionOutcome::Skipped),

            ReconciliationAction::AdoptBotBranch { branch, pr } => {
                info!(%branch, %pr, "Adopting dependency bot branch");
                Ok(ActionOutcome::Skipped)
            }

            ReconciliationAction::DeleteStaleBranch { branch } => {
                let effect = GitHubEffect::DeleteBranch {
                    branch: branch.clone(),
                };
                self.run_idempotent(effect, |e| e.is_not_found()).await
            }

            ReconciliationAction::ClosePrAndDeleteBranch { pr, branch } => {
                let close = self
                    .run_idempotent(GitHubEffect::ClosePr { pr: *pr }, |e| e.is_not_found())
                    .await?;
                let delete = self
                    .run_idempotent(
                        GitHubEffect::DeleteBranch {
                            branch: branch.clone(),
                        },
                        |e| e.is_not_found(),
                    )
                    .await?;
                Ok(combine(close, delete))
            }

            ReconciliationAction::CreateBranch { branch, from_sha } => {
                let effect = GitHubEffect::CreateBranch {
                    branch: branch.clone(),
                    from_sha: from_sha.clone(),
                };
                let outcome = self.run_idempotent(effect, |e| e.is_duplicate()).await?;
                if outcome == ActionOutcome::AlreadySatisfied {
                    warn!(%branch, "Branch already exists; writing on top of it");
                }
                Ok(outcome)
            }

            ReconciliationAction::DeleteObsoleteFile {
                branch,
                path,
                sha,
                message,
            } => {
                let effect = GitHubEffect::DeleteFile {
                    branch: branch.clone(),
                    path: path.clone(),
                    sha: sha.clone(),
                    message: message.clone(),
                };
                self.run_idempotent(effect, |e| e.is_not_found()).await
            }

            ReconciliationAction::UpsertCanonicalFile {
                branch,
                path,
                content,
                expected_sha,
                message,
            } => {
                let effect = GitHubEffect::PutFile {
                    branch: branch.clone(),
                    path: path.clone(),
                    content: content.clone(),
                    message: message.clone(),
                    expected_sha: expected_sha.clone(),
                };
                match self.github.interpret(effect).await? {
                    GitHubResponse::FileWritten { sha } => {
                        debug!(%path, sha = %sha.short(), "Wrote canonical patch");
                        Ok(ActionOutcome::Applied)
                    }
                    other => Err(ReconcileError::unexpected("put_file", &other)),
                }
            }

            ReconciliationAction::OpenPr {
                head,
                base,
                title,
                body,
            } => {
                let existing = RemoteProbe::new(self.github)
                    .open_prs_for_head(head, base)
                    .await?;
                if let Some(pr) = existing.first() {
                    info!(%head, pr = %pr.number, "Pull request already open");
                    return Ok(ActionOutcome::AlreadySatisfied);
                }

                let effect = GitHubEffect::CreatePr {
                    head: head.clone(),
                    base: base.clone(),
                    title: title.clone(),
                    body: body.clone(),
                };
                match self.github.interpret(effect).await {
                    Ok(GitHubResponse::PrCreated { pr }) => {
                        info!(%head, %pr, "Opened pull request");
                        Ok(ActionOutcome::Applied)
                    }
                    Ok(other) => Err(ReconcileError::unexpected("create_pr", &other)),
                    Err(e) if e.is_duplicate() => {
                        info!(%head, "Pull request opened concurrently");
                        Ok(ActionOutcome::AlreadySatisfied)
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Runs a mutating effect, treating errors matched by `satisfied` as
    /// "the remote is already in the requested state".
    async fn run_idempotent(
        &self,
        effect: GitHubEffect,
        satisfied: impl Fn(&GitHubApiError) -> bool,
    ) -> Result<ActionOutcome, ReconcileError> {
        let name = effect.name();
        match self.github.interpret(effect).await {
            Ok(_) => Ok(ActionOutcome::Applied),
            Err(e) if satisfied(&e) => {
                debug!(effect = name, error = %e, "Already satisfied");
                Ok(ActionOutcome::AlreadySatisfied)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn combine(a: ActionOutcome, b: ActionOutcome) -> ActionOutcome {
    if a == ActionOutcome::Applied || b == ActionOutcome::Applied {
        ActionOutcome::Applied
    } else {
        ActionOutcome::AlreadySatisfied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::GitHubErrorKind;
    use crate::test_utils::{FakeRemote, blob_sha};
    use crate::types::{PrNumber, Sha};

    fn upsert(expected_sha: Option<Sha>) -> ReconciliationAction {
        ReconciliationAction::UpsertCanonicalFile {
            branch: "main".into(),
            path: "patches/a+1.0.0.patch".into(),
            content: b"new".to_vec(),
            expected_sha,
            message: "chore(patch): update patch for package a".into(),
        }
    }

    #[tokio::test]
    async fn deleting_missing_branch_is_already_satisfied() {
        let remote = FakeRemote::new("main");
        let cancel = CancellationToken::new();
        let executor = ActionExecutor::new(&remote, &cancel);

        let outcome = executor
            .apply(&ReconciliationAction::DeleteStaleBranch {
                branch: "updatepatchfilesbot-a".into(),
            })
            .await
            .unwrap();

        assert_eq!(outcome, ActionOutcome::AlreadySatisfied);
    }

    #[tokio::test]
    async fn existing_branch_is_already_satisfied() {
        let remote = FakeRemote::new("main").with_branch("updatepatchfilesbot-a", "main");
        let cancel = CancellationToken::new();
        let executor = ActionExecutor::new(&remote, &cancel);

        let outcome = executor
            .apply(&ReconciliationAction::CreateBranch {
                branch: "updatepatchfilesbot-a".into(),
                from_sha: Sha::new(format!("{:0>40x}", 1)),
            })
            .await
            .unwrap();

        assert_eq!(outcome, ActionOutcome::AlreadySatisfied);
    }

    #[tokio::test]
    async fn stale_content_hash_is_surfaced() {
        let remote = FakeRemote::new("main").with_file("main", "patches/a+1.0.0.patch", "theirs");
        let cancel = CancellationToken::new();
        let executor = ActionExecutor::new(&remote, &cancel);

        let err = executor
            .apply(&upsert(Some(blob_sha(b"ours"))))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::GitHub(ref e) if e.kind == GitHubErrorKind::PreconditionFailed
        ));
    }

    #[tokio::test]
    async fn matching_content_hash_writes() {
        let remote = FakeRemote::new("main").with_file("main", "patches/a+1.0.0.patch", "old");
        let cancel = CancellationToken::new();
        let executor = ActionExecutor::new(&remote, &cancel);

        let outcome = executor.apply(&upsert(Some(blob_sha(b"old")))).await.unwrap();

        assert_eq!(outcome, ActionOutcome::Applied);
        assert_eq!(
            remote.files("main").unwrap()["patches/a+1.0.0.patch"],
            b"new".to_vec()
        );
    }

    #[tokio::test]
    async fn open_pr_is_not_duplicated() {
        let remote = FakeRemote::new("main")
            .with_branch("updatepatchfilesbot-a", "main")
            .with_pr("updatepatchfilesbot-a", "main");
        let cancel = CancellationToken::new();
        let executor = ActionExecutor::new(&remote, &cancel);

        let outcome = executor
            .apply(&ReconciliationAction::OpenPr {
                head: "updatepatchfilesbot-a".into(),
                base: "main".into(),
                title: "t".into(),
                body: "b".into(),
            })
            .await
            .unwrap();

        assert_eq!(outcome, ActionOutcome::AlreadySatisfied);
        assert_eq!(remote.open_prs().len(), 1);
    }

    #[tokio::test]
    async fn close_and_delete_tolerates_missing_pieces() {
        let remote = FakeRemote::new("main");
        let cancel = CancellationToken::new();
        let executor = ActionExecutor::new(&remote, &cancel);

        let outcome = executor
            .apply(&ReconciliationAction::ClosePrAndDeleteBranch {
                pr: PrNumber(12),
                branch: "updatepatchfilesbot-a".into(),
            })
            .await
            .unwrap();

        assert_eq!(outcome, ActionOutcome::AlreadySatisfied);
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_action() {
        let remote = FakeRemote::new("main");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let executor = ActionExecutor::new(&remote, &cancel);
        let plan = Plan {
            actions: vec![upsert(None)],
            status: crate::reconcile::PackageStatus::Converged,
            working_branch: Some("main".into()),
        };

        let err = executor.apply_plan(&plan).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(remote.effects().is_empty());
    }

    #[tokio::test]
    async fn markers_touch_nothing() {
        let remote = FakeRemote::new("main");
        let cancel = CancellationToken::new();
        let executor = ActionExecutor::new(&remote, &cancel);
        let plan = Plan {
            actions: vec![
                ReconciliationAction::NoOp,
                ReconciliationAction::AdoptBotBranch {
                    branch: "dependabot-npm_and_yarn-a-1.0.0".into(),
                    pr: PrNumber(3),
                },
            ],
            status: crate::reconcile::PackageStatus::InSync,
            working_branch: None,
        };

        assert_eq!(executor.apply_plan(&plan).await.unwrap(), 0);
        assert!(remote.effects().is_empty());
    }
}
