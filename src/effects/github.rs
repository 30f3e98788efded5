//! GitHub API effect types.
//!
//! These types describe the remote operations the reconciler needs as data,
//! without executing them. The interpreter in `crate::github` executes them
//! against the real API; tests execute them against an in-memory remote.

use serde::{Deserialize, Serialize};

use crate::types::{BranchRef, ContentResult, PrNumber, PullRequestRef, Sha};

/// A GitHub API effect.
///
/// Effects are repo-scoped: the interpreter is constructed with a `RepoId`,
/// so effects don't include it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GitHubEffect {
    // ─── Queries ──────────────────────────────────────────────────────────────
    /// Look up a branch. A missing branch is a successful `exists: false` answer.
    GetBranch { branch: String },

    /// List open pull requests targeting `base`.
    ListOpenPrs { base: String },

    /// List open pull requests from `head` into `base`.
    ListOpenPrsForHead { head: String, base: String },

    /// Read a file or directory at a ref.
    GetContent { path: String, git_ref: String },

    // ─── Branch Mutations ─────────────────────────────────────────────────────
    /// Create `branch` pointing at `from_sha`.
    CreateBranch { branch: String, from_sha: Sha },

    /// Delete `branch`.
    DeleteBranch { branch: String },

    // ─── File Mutations ───────────────────────────────────────────────────────
    /// Create or update a file on a branch.
    ///
    /// `expected_sha` is the blob hash the file must currently have; `None`
    /// means the file must not exist yet.
    PutFile {
        branch: String,
        path: String,
        content: Vec<u8>,
        message: String,
        expected_sha: Option<Sha>,
    },

    /// Delete a file on a branch, guarded by its current blob hash.
    DeleteFile {
        branch: String,
        path: String,
        sha: Sha,
        message: String,
    },

    // ─── PR Mutations ─────────────────────────────────────────────────────────
    /// Open a pull request from `head` into `base`.
    CreatePr {
        head: String,
        base: String,
        title: String,
        body: String,
    },

    /// Close a pull request without merging.
    ClosePr { pr: PrNumber },
}

impl GitHubEffect {
    /// Returns true if executing this effect changes remote state.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            GitHubEffect::GetBranch { .. }
                | GitHubEffect::ListOpenPrs { .. }
                | GitHubEffect::ListOpenPrsForHead { .. }
                | GitHubEffect::GetContent { .. }
        )
    }

    /// Short name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            GitHubEffect::GetBranch { .. } => "get_branch",
            GitHubEffect::ListOpenPrs { .. } => "list_open_prs",
            GitHubEffect::ListOpenPrsForHead { .. } => "list_open_prs_for_head",
            GitHubEffect::GetContent { .. } => "get_content",
            GitHubEffect::CreateBranch { .. } => "create_branch",
            GitHubEffect::DeleteBranch { .. } => "delete_branch",
            GitHubEffect::PutFile { .. } => "put_file",
            GitHubEffect::DeleteFile { .. } => "delete_file",
            GitHubEffect::CreatePr { .. } => "create_pr",
            GitHubEffect::ClosePr { .. } => "close_pr",
        }
    }
}

// ─── Response Types ───────────────────────────────────────────────────────────

/// Response from a GitHub effect.
///
/// Each variant corresponds to the response from a particular effect type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GitHubResponse {
    /// Response to `GetBranch`.
    Branch(BranchRef),

    /// Response to `ListOpenPrs` and `ListOpenPrsForHead`.
    PrList(Vec<PullRequestRef>),

    /// Response to `GetContent`.
    Content(ContentResult),

    /// Response to `CreateBranch`.
    BranchCreated,

    /// Response to `DeleteBranch`.
    BranchDeleted,

    /// Response to `PutFile`, with the new blob hash.
    FileWritten { sha: Sha },

    /// Response to `DeleteFile`.
    FileDeleted,

    /// Response to `CreatePr`.
    PrCreated { pr: PrNumber },

    /// Response to `ClosePr`.
    PrClosed,
}
