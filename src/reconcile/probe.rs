//! Typed remote queries.
//!
//! `RemoteProbe` issues read-only effects and unpacks their responses, so the
//! orchestration code never matches on `GitHubResponse` directly. Each call
//! goes to the remote; nothing is cached between calls.

use tracing::{trace, warn};

use crate::effects::{GitHubEffect, GitHubInterpreter, GitHubResponse};
use crate::types::{BranchRef, ContentResult, PullRequestRef, RemotePatchEntry};

use super::ReconcileError;

/// Read-only view of one repository.
pub struct RemoteProbe<'a, G> {
    github: &'a G,
}

impl<'a, G: GitHubInterpreter> RemoteProbe<'a, G> {
    pub fn new(github: &'a G) -> Self {
        RemoteProbe { github }
    }

    /// Open pull requests targeting `base`.
    pub async fn open_prs(&self, base: &str) -> Result<Vec<PullRequestRef>, ReconcileError> {
        let effect = GitHubEffect::ListOpenPrs {
            base: base.to_string(),
        };
        self.pr_list(effect).await
    }

    /// Open pull requests from `head` into `base`.
    pub async fn open_prs_for_head(
        &self,
        head: &str,
        base: &str,
    ) -> Result<Vec<PullRequestRef>, ReconcileError> {
        let effect = GitHubEffect::ListOpenPrsForHead {
            head: head.to_string(),
            base: base.to_string(),
        };
        self.pr_list(effect).await
    }

    async fn pr_list(&self, effect: GitHubEffect) -> Result<Vec<PullRequestRef>, ReconcileError> {
        let name = effect.name();
        match self.github.interpret(effect).await? {
            GitHubResponse::PrList(prs) => Ok(prs),
            other => Err(ReconcileError::unexpected(name, &other)),
        }
    }

    /// Looks up a branch; a missing branch comes back with `exists: false`.
    pub async fn branch(&self, name: &str) -> Result<BranchRef, ReconcileError> {
        let effect = GitHubEffect::GetBranch {
            branch: name.to_string(),
        };
        match self.github.interpret(effect).await? {
            GitHubResponse::Branch(branch) => Ok(branch),
            other => Err(ReconcileError::unexpected("get_branch", &other)),
        }
    }

    /// Reads whatever is at `path` on `git_ref`.
    pub async fn content(&self, path: &str, git_ref: &str) -> Result<ContentResult, ReconcileError> {
        let effect = GitHubEffect::GetContent {
            path: path.to_string(),
            git_ref: git_ref.to_string(),
        };
        match self.github.interpret(effect).await? {
            GitHubResponse::Content(content) => Ok(content),
            other => Err(ReconcileError::unexpected("get_content", &other)),
        }
    }

    /// Lists the files directly inside `dir` on `git_ref`.
    ///
    /// An absent directory lists as empty.
    pub async fn list_directory(
        &self,
        dir: &str,
        git_ref: &str,
    ) -> Result<Vec<RemotePatchEntry>, ReconcileError> {
        match self.content(dir, git_ref).await? {
            ContentResult::DirectoryListing(entries) => {
                trace!(dir, git_ref, count = entries.len(), "Listed patch directory");
                Ok(entries)
            }
            ContentResult::NotFound => Ok(Vec::new()),
            ContentResult::SingleFile(entry) => {
                warn!(path = %entry.path, git_ref, "Patch directory is a file; treating as empty");
                Ok(Vec::new())
            }
        }
    }

    /// Reads a file's bytes on `git_ref`, or `None` if there is no file there.
    pub async fn file_content(
        &self,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<Vec<u8>>, ReconcileError> {
        match self.content(path, git_ref).await? {
            ContentResult::SingleFile(entry) => Ok(Some(entry.content.unwrap_or_default())),
            ContentResult::NotFound | ContentResult::DirectoryListing(_) => Ok(None),
        }
    }
}
