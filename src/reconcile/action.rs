//! Reconciliation actions and plans.
//!
//! A plan is an ordered list of actions for one (repository, package) pair.
//! Later actions assume earlier ones have already taken effect on the working
//! branch, so a plan is always applied front to back.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{PrNumber, Sha};

/// One atomic step towards convergence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconciliationAction {
    /// Nothing to change; the working ref already carries the canonical patch.
    NoOp,

    /// Delete a self-managed branch that no open pull request uses.
    DeleteStaleBranch { branch: String },

    /// Close a pull request and delete its head branch.
    ClosePrAndDeleteBranch { pr: PrNumber, branch: String },

    /// Work on the dependency bot's branch instead of our own. No remote change.
    AdoptBotBranch { branch: String, pr: PrNumber },

    /// Create `branch` at `from_sha`.
    CreateBranch { branch: String, from_sha: Sha },

    /// Delete a patch for an outdated version of the package.
    DeleteObsoleteFile {
        branch: String,
        path: String,
        sha: Sha,
        message: String,
    },

    /// Write the canonical patch. `expected_sha` is the blob hash of the file
    /// being replaced, or `None` when the file is being created.
    UpsertCanonicalFile {
        branch: String,
        path: String,
        content: Vec<u8>,
        expected_sha: Option<Sha>,
        message: String,
    },

    /// Open a pull request from `head` into `base`.
    OpenPr {
        head: String,
        base: String,
        title: String,
        body: String,
    },
}

impl ReconciliationAction {
    /// Returns true if applying this action changes remote state.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            ReconciliationAction::NoOp | ReconciliationAction::AdoptBotBranch { .. }
        )
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ReconciliationAction::NoOp => "no_op",
            ReconciliationAction::DeleteStaleBranch { .. } => "delete_stale_branch",
            ReconciliationAction::ClosePrAndDeleteBranch { .. } => "close_pr_and_delete_branch",
            ReconciliationAction::AdoptBotBranch { .. } => "adopt_bot_branch",
            ReconciliationAction::CreateBranch { .. } => "create_branch",
            ReconciliationAction::DeleteObsoleteFile { .. } => "delete_obsolete_file",
            ReconciliationAction::UpsertCanonicalFile { .. } => "upsert_canonical_file",
            ReconciliationAction::OpenPr { .. } => "open_pr",
        }
    }
}

impl fmt::Display for ReconciliationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationAction::NoOp => write!(f, "no-op"),
            ReconciliationAction::DeleteStaleBranch { branch } => {
                write!(f, "delete stale branch {branch}")
            }
            ReconciliationAction::ClosePrAndDeleteBranch { pr, branch } => {
                write!(f, "close {pr} and delete {branch}")
            }
            ReconciliationAction::AdoptBotBranch { branch, pr } => {
                write!(f, "adopt bot branch {branch} ({pr})")
            }
            ReconciliationAction::CreateBranch { branch, from_sha } => {
                write!(f, "create branch {branch} at {}", from_sha.short())
            }
            ReconciliationAction::DeleteObsoleteFile { branch, path, .. } => {
                write!(f, "delete {path} on {branch}")
            }
            ReconciliationAction::UpsertCanonicalFile {
                branch,
                path,
                expected_sha,
                ..
            } => match expected_sha {
                Some(_) => write!(f, "update {path} on {branch}"),
                None => write!(f, "create {path} on {branch}"),
            },
            ReconciliationAction::OpenPr { head, base, .. } => {
                write!(f, "open pull request {head} -> {base}")
            }
        }
    }
}

/// Terminal status of one package in one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageStatus {
    /// The remote has no patch for the package and it is not in the force set.
    SkippedNoRemotePatch,
    /// The working ref already carries the canonical content.
    InSync,
    /// The plan writes the canonical content.
    Converged,
    /// Probing or applying failed; the package was abandoned.
    Error,
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PackageStatus::SkippedNoRemotePatch => "skipped-no-remote-patch",
            PackageStatus::InSync => "in-sync",
            PackageStatus::Converged => "converged",
            PackageStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// The engine's decision for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<ReconciliationAction>,
    pub status: PackageStatus,
    /// The branch the content comparison ran against (`None` when it was the base branch).
    pub working_branch: Option<String>,
}

impl Plan {
    /// Number of actions that change remote state.
    pub fn mutation_count(&self) -> usize {
        self.actions.iter().filter(|a| a.is_mutating()).count()
    }

    /// Returns true if applying the plan changes nothing.
    pub fn is_noop(&self) -> bool {
        self.mutation_count() == 0
    }

    /// Position of the first action matching `pred`.
    pub fn position(&self, pred: impl Fn(&ReconciliationAction) -> bool) -> Option<usize> {
        self.actions.iter().position(pred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_not_mutations() {
        let plan = Plan {
            actions: vec![
                ReconciliationAction::NoOp,
                ReconciliationAction::AdoptBotBranch {
                    branch: "dependabot-npm_and_yarn-left-pad-1.2.0".into(),
                    pr: PrNumber(7),
                },
            ],
            status: PackageStatus::InSync,
            working_branch: None,
        };
        assert!(plan.is_noop());
    }

    #[test]
    fn status_display_matches_report_names() {
        assert_eq!(
            PackageStatus::SkippedNoRemotePatch.to_string(),
            "skipped-no-remote-patch"
        );
        assert_eq!(PackageStatus::InSync.to_string(), "in-sync");
    }

    #[test]
    fn display_distinguishes_create_and_update() {
        let upsert = |expected_sha| ReconciliationAction::UpsertCanonicalFile {
            branch: "b".into(),
            path: "patches/a+1.0.0.patch".into(),
            content: vec![],
            expected_sha,
            message: String::new(),
        };
        assert_eq!(upsert(None).to_string(), "create patches/a+1.0.0.patch on b");
        assert_eq!(
            upsert(Some(Sha::new("abc"))).to_string(),
            "update patches/a+1.0.0.patch on b"
        );
    }
}
