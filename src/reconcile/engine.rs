//! The per-package decision procedure.
//!
//! Everything here is pure: callers probe the remote, pass the observations in
//! as plain data, and get back actions to execute. The procedure runs in two
//! stages because the second stage needs a listing taken at the ref the first
//! stage chose:
//!
//! 1. [`select_working_ref`] cleans up self-managed branches that are done or
//!    unreferenced, adopts a matching dependency-bot branch, and picks the ref
//!    to compare against.
//! 2. [`plan_convergence`] gates on whether the remote tracks the package at
//!    all, compares content, and plans the writes that bring the working ref in
//!    line with the local catalog.

use crate::naming::{self, ChangeKind};
use crate::types::{PatchFile, PrNumber, PullRequestRef, RemotePatchEntry, Sha};

use super::action::{PackageStatus, Plan, ReconciliationAction};

/// What the engine is reconciling, and against what.
#[derive(Debug, Clone, Copy)]
pub struct PackageContext<'a> {
    /// The local canonical patch.
    pub patch: &'a PatchFile,

    /// The branch pull requests target.
    pub base_branch: &'a str,

    /// Directory holding patch files in the downstream repository.
    pub remote_dir: &'a str,

    /// Whether a brand-new patch may be created when the remote has none.
    pub force: bool,
}

impl PackageContext<'_> {
    /// Name of the branch this engine manages for the package.
    pub fn self_branch(&self) -> String {
        naming::self_branch(&self.patch.identity)
    }
}

/// Remote state needed to pick a working ref.
#[derive(Debug, Clone, Default)]
pub struct BranchObservation {
    /// Open pull requests based on the base branch.
    pub open_prs: Vec<PullRequestRef>,

    /// Whether the self-managed branch exists.
    pub self_branch_exists: bool,

    /// Canonical file content on the base branch. Only needs probing when a
    /// self-managed pull request is open; `None` means absent or not probed.
    pub base_canonical_content: Option<Vec<u8>>,
}

/// The ref the content comparison and all writes run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkingRef {
    /// The base branch itself; writes need a fresh self-managed branch first.
    Base,

    /// The self-managed branch, which already has an open pull request.
    SelfManaged { pr: PrNumber },

    /// The dependency bot's branch for this exact package version.
    Bot { branch: String, pr: PrNumber },
}

impl WorkingRef {
    /// The git ref name to probe.
    pub fn ref_name<'a>(&'a self, ctx: &'a PackageContext<'_>, self_branch: &'a str) -> &'a str {
        match self {
            WorkingRef::Base => ctx.base_branch,
            WorkingRef::SelfManaged { .. } => self_branch,
            WorkingRef::Bot { branch, .. } => branch,
        }
    }

    /// Returns true if an open pull request already carries this ref.
    pub fn has_open_pr(&self) -> bool {
        !matches!(self, WorkingRef::Base)
    }
}

/// Result of the first stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchSelection {
    /// Cleanup and adoption actions, in order.
    pub actions: Vec<ReconciliationAction>,
    pub working: WorkingRef,
}

/// Remote state at the chosen working ref.
#[derive(Debug, Clone)]
pub struct WorkingSnapshot {
    /// Tip of the working ref at the time of listing.
    pub head_sha: Sha,

    /// Files in the patch directory at `head_sha`. Empty if the directory is absent.
    pub entries: Vec<RemotePatchEntry>,

    /// Content of the entry at the canonical path, if there is one.
    pub canonical_content: Option<Vec<u8>>,
}

fn is_open_against_base(pr: &PullRequestRef, ctx: &PackageContext<'_>) -> bool {
    pr.open && pr.base_ref == ctx.base_branch
}

/// Finds the open pull request whose head is the self-managed branch.
pub fn find_self_pr<'p>(
    ctx: &PackageContext<'_>,
    open_prs: &'p [PullRequestRef],
) -> Option<&'p PullRequestRef> {
    let self_branch = ctx.self_branch();
    open_prs
        .iter()
        .find(|pr| is_open_against_base(pr, ctx) && pr.head_ref == self_branch)
}

/// Finds the dependency bot's open pull request for this package and version.
pub fn find_bot_pr<'p>(
    ctx: &PackageContext<'_>,
    open_prs: &'p [PullRequestRef],
) -> Option<&'p PullRequestRef> {
    let identity = &ctx.patch.identity;
    let matches = naming::bot_branch_match(identity, &identity.version);
    open_prs
        .iter()
        .find(|pr| is_open_against_base(pr, ctx) && matches(&pr.head_ref))
}

/// Stage one: branch cleanup, bot adoption and working ref selection.
pub fn select_working_ref(
    ctx: &PackageContext<'_>,
    observation: &BranchObservation,
) -> BranchSelection {
    let self_branch = ctx.self_branch();
    let mut actions = Vec::new();

    let mut self_pr = find_self_pr(ctx, &observation.open_prs).map(|pr| pr.number);
    match self_pr {
        Some(pr) => {
            let merged_upstream = observation.base_canonical_content.as_deref()
                == Some(ctx.patch.content.as_slice());
            if merged_upstream {
                actions.push(ReconciliationAction::ClosePrAndDeleteBranch {
                    pr,
                    branch: self_branch.clone(),
                });
                self_pr = None;
            }
        }
        None if observation.self_branch_exists => {
            actions.push(ReconciliationAction::DeleteStaleBranch {
                branch: self_branch.clone(),
            });
        }
        None => {}
    }

    let working = if let Some(bot) = find_bot_pr(ctx, &observation.open_prs) {
        // Two proposals for one package is never acceptable; the bot's wins.
        if let Some(pr) = self_pr.take() {
            actions.push(ReconciliationAction::ClosePrAndDeleteBranch {
                pr,
                branch: self_branch,
            });
        }
        actions.push(ReconciliationAction::AdoptBotBranch {
            branch: bot.head_ref.clone(),
            pr: bot.number,
        });
        WorkingRef::Bot {
            branch: bot.head_ref.clone(),
            pr: bot.number,
        }
    } else if let Some(pr) = self_pr {
        WorkingRef::SelfManaged { pr }
    } else {
        WorkingRef::Base
    };

    BranchSelection { actions, working }
}

/// Returns the entry at exactly the canonical path, if present.
pub fn canonical_entry<'e>(
    ctx: &PackageContext<'_>,
    entries: &'e [RemotePatchEntry],
) -> Option<&'e RemotePatchEntry> {
    entries
        .iter()
        .find(|entry| entry.path == ctx.patch.canonical_path)
}

/// Stage two: gate, compare and plan the writes.
pub fn plan_convergence(
    ctx: &PackageContext<'_>,
    selection: BranchSelection,
    snapshot: &WorkingSnapshot,
) -> Plan {
    let BranchSelection {
        mut actions,
        working,
    } = selection;
    let identity = &ctx.patch.identity;
    let self_branch = ctx.self_branch();
    let working_branch = match &working {
        WorkingRef::Base => None,
        WorkingRef::SelfManaged { .. } => Some(self_branch.clone()),
        WorkingRef::Bot { branch, .. } => Some(branch.clone()),
    };

    let tracked: Vec<&RemotePatchEntry> = snapshot
        .entries
        .iter()
        .filter(|entry| entry.belongs_to(identity))
        .collect();

    if tracked.is_empty() && !ctx.force {
        return Plan {
            actions,
            status: PackageStatus::SkippedNoRemotePatch,
            working_branch,
        };
    }

    let canonical = canonical_entry(ctx, &snapshot.entries);
    if canonical.is_some()
        && snapshot.canonical_content.as_deref() == Some(ctx.patch.content.as_slice())
    {
        if actions.is_empty() {
            actions.push(ReconciliationAction::NoOp);
        }
        return Plan {
            actions,
            status: PackageStatus::InSync,
            working_branch,
        };
    }

    let kind = if tracked.is_empty() {
        ChangeKind::Create
    } else {
        ChangeKind::Update
    };
    let message = naming::commit_message(identity, kind);

    let branch = match &working {
        WorkingRef::Base => {
            actions.push(ReconciliationAction::CreateBranch {
                branch: self_branch.clone(),
                from_sha: snapshot.head_sha.clone(),
            });
            self_branch.clone()
        }
        WorkingRef::SelfManaged { .. } => self_branch.clone(),
        WorkingRef::Bot { branch, .. } => branch.clone(),
    };

    for obsolete in tracked
        .iter()
        .filter(|entry| entry.path != ctx.patch.canonical_path)
    {
        actions.push(ReconciliationAction::DeleteObsoleteFile {
            branch: branch.clone(),
            path: obsolete.path.clone(),
            sha: obsolete.sha.clone(),
            message: message.clone(),
        });
    }

    actions.push(ReconciliationAction::UpsertCanonicalFile {
        branch: branch.clone(),
        path: ctx.patch.canonical_path.clone(),
        content: ctx.patch.content.clone(),
        expected_sha: canonical.map(|entry| entry.sha.clone()),
        message,
    });

    if !working.has_open_pr() {
        actions.push(ReconciliationAction::OpenPr {
            head: branch.clone(),
            base: ctx.base_branch.to_string(),
            title: naming::pr_title(identity, kind),
            body: naming::pr_body(identity, &ctx.patch.canonical_path),
        });
    }

    Plan {
        actions,
        status: PackageStatus::Converged,
        working_branch: Some(branch),
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
