//! Shared test utilities: an in-memory remote and arbitrary generators for
//! property-based testing.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use proptest::prelude::*;

use crate::catalog::canonical_path;
use crate::effects::{GitHubEffect, GitHubInterpreter, GitHubResponse};
use crate::github::{GitHubApiError, GitHubErrorKind};
use crate::types::{
    BranchRef, ContentResult, PackageIdentity, PatchFile, PrNumber, PullRequestRef,
    RemotePatchEntry, Sha,
};

pub fn arb_pr_number() -> impl Strategy<Value = PrNumber> {
    any::<u64>().prop_map(PrNumber)
}

pub fn arb_sha() -> impl Strategy<Value = Sha> {
    "[0-9a-f]{40}".prop_map(Sha::new)
}

/// Package names in the shapes patch-package produces: plain, scoped, nested.
pub fn arb_package_name() -> impl Strategy<Value = String> {
    let plain = "[a-z][a-z0-9-]{0,12}";
    prop_oneof![
        plain.prop_map(String::from),
        (plain, plain).prop_map(|(scope, name)| format!("@{scope}+{name}")),
        (plain, plain).prop_map(|(parent, child)| format!("{parent}++{child}")),
    ]
}

pub fn arb_version() -> impl Strategy<Value = String> {
    (0u8..20, 0u8..20, 0u8..20).prop_map(|(a, b, c)| format!("{a}.{b}.{c}"))
}

pub fn arb_package_identity() -> impl Strategy<Value = PackageIdentity> {
    (arb_package_name(), arb_version()).prop_map(|(n, v)| PackageIdentity::new(n, v))
}

/// Builds a catalog patch stored under `patches/`.
pub fn make_patch(file_name: &str, content: &str) -> PatchFile {
    PatchFile {
        identity: PackageIdentity::parse_file_name(file_name)
            .unwrap_or_else(|e| panic!("bad test patch name: {e}")),
        file_name: file_name.to_string(),
        canonical_path: canonical_path("patches", file_name),
        content: content.as_bytes().to_vec(),
    }
}

// ─── In-memory remote ─────────────────────────────────────────────────────────

/// Blob hash of some content. Not git's algorithm, but stable and content-addressed.
pub fn blob_sha(content: &[u8]) -> Sha {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    Sha::new(format!("{:0>40x}", hasher.finish()))
}

type Tree = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone)]
struct FakePr {
    number: PrNumber,
    head: String,
    base: String,
    open: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    commits: HashMap<Sha, Tree>,
    branches: BTreeMap<String, Sha>,
    prs: Vec<FakePr>,
    next_commit: u64,
    next_pr: u64,
    log: Vec<GitHubEffect>,
    /// Errors returned, once each, by the next effect with the given name.
    injected: Vec<(&'static str, GitHubErrorKind)>,
    /// Error returned by every effect.
    deny_all: Option<GitHubErrorKind>,
}

/// A repository held in memory, answering effects the way GitHub does.
///
/// - Every file write or delete makes a new commit on the branch
/// - Deleting a branch closes the pull requests whose head it is
/// - Writes and deletes are guarded by blob hashes
#[derive(Debug)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    /// A repository whose `base` branch holds an empty tree.
    pub fn new(base: &str) -> Self {
        let remote = FakeRemote {
            state: Mutex::new(FakeState::default()),
        };
        {
            let mut state = remote.lock();
            let sha = state.commit(Tree::new());
            state.branches.insert(base.to_string(), sha);
        }
        remote
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seeds a file on a branch without logging an effect.
    pub fn with_file(self, branch: &str, path: &str, content: &str) -> Self {
        {
            let mut state = self.lock();
            let mut tree = state.tree_of(branch).cloned().unwrap_or_default();
            tree.insert(path.to_string(), content.as_bytes().to_vec());
            let sha = state.commit(tree);
            state.branches.insert(branch.to_string(), sha);
        }
        self
    }

    /// Seeds `branch` as a copy of `from`.
    pub fn with_branch(self, branch: &str, from: &str) -> Self {
        {
            let mut state = self.lock();
            let sha = state.branches.get(from).cloned().expect("source branch exists");
            state.branches.insert(branch.to_string(), sha);
        }
        self
    }

    /// Seeds an open pull request.
    pub fn with_pr(self, head: &str, base: &str) -> Self {
        self.lock().open_pr(head, base);
        self
    }

    /// Makes every effect fail with `kind`.
    pub fn deny_all(self, kind: GitHubErrorKind) -> Self {
        self.lock().deny_all = Some(kind);
        self
    }

    /// Makes the next effect called `effect` fail with `kind`.
    pub fn fail_next(&self, effect: &'static str, kind: GitHubErrorKind) {
        self.lock().injected.push((effect, kind));
    }

    /// Every effect interpreted so far.
    pub fn effects(&self) -> Vec<GitHubEffect> {
        self.lock().log.clone()
    }

    /// Number of state-changing effects interpreted so far.
    pub fn mutation_count(&self) -> usize {
        self.lock().log.iter().filter(|e| e.is_mutating()).count()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    /// Files on a branch, or `None` if the branch does not exist.
    pub fn files(&self, branch: &str) -> Option<Tree> {
        self.lock().tree_of(branch).cloned()
    }

    pub fn branch_exists(&self, branch: &str) -> bool {
        self.lock().branches.contains_key(branch)
    }

    /// Open pull requests as `(number, head, base)`.
    pub fn open_prs(&self) -> Vec<(PrNumber, String, String)> {
        self.lock()
            .prs
            .iter()
            .filter(|pr| pr.open)
            .map(|pr| (pr.number, pr.head.clone(), pr.base.clone()))
            .collect()
    }

    fn apply(&self, effect: GitHubEffect) -> Result<GitHubResponse, GitHubApiError> {
        let mut state = self.lock();
        state.log.push(effect.clone());

        if let Some(kind) = state.deny_all {
            return Err(GitHubApiError::new(kind, "denied"));
        }
        let name = effect.name();
        if let Some(pos) = state.injected.iter().position(|(n, _)| *n == name) {
            let (_, kind) = state.injected.remove(pos);
            return Err(GitHubApiError::new(kind, format!("injected failure in {name}")));
        }

        state.interpret(effect)
    }
}

impl GitHubInterpreter for FakeRemote {
    fn interpret(
        &self,
        effect: GitHubEffect,
    ) -> impl Future<Output = Result<GitHubResponse, GitHubApiError>> + Send {
        let result = self.apply(effect);
        async move { result }
    }
}

fn not_found(what: impl std::fmt::Display) -> GitHubApiError {
    GitHubApiError::new(GitHubErrorKind::NotFound, format!("{what} not found"))
}

fn conflict(what: impl std::fmt::Display) -> GitHubApiError {
    GitHubApiError::new(GitHubErrorKind::PreconditionFailed, format!("{what} does not match"))
}

impl FakeState {
    fn commit(&mut self, tree: Tree) -> Sha {
        self.next_commit += 1;
        let sha = Sha::new(format!("{:0>40x}", self.next_commit));
        self.commits.insert(sha.clone(), tree);
        sha
    }

    fn resolve(&self, git_ref: &str) -> Option<&Sha> {
        self.branches
            .get(git_ref)
            .or_else(|| self.commits.get_key_value(&Sha::new(git_ref)).map(|(k, _)| k))
    }

    fn tree_of(&self, git_ref: &str) -> Option<&Tree> {
        self.resolve(git_ref).and_then(|sha| self.commits.get(sha))
    }

    fn open_pr(&mut self, head: &str, base: &str) -> PrNumber {
        self.next_pr += 1;
        let number = PrNumber(self.next_pr);
        self.prs.push(FakePr {
            number,
            head: head.to_string(),
            base: base.to_string(),
            open: true,
        });
        number
    }

    fn update_tree(
        &mut self,
        branch: &str,
        edit: impl FnOnce(&mut Tree) -> Result<(), GitHubApiError>,
    ) -> Result<(), GitHubApiError> {
        let mut tree = self
            .tree_of(branch)
            .cloned()
            .ok_or_else(|| not_found(format_args!("branch {branch}")))?;
        edit(&mut tree)?;
        let sha = self.commit(tree);
        self.branches.insert(branch.to_string(), sha);
        Ok(())
    }

    fn pr_list(&self, base: &str, head: Option<&str>) -> Vec<PullRequestRef> {
        self.prs
            .iter()
            .filter(|pr| pr.open && pr.base == base)
            .filter(|pr| head.is_none_or(|h| pr.head == h))
            .map(|pr| PullRequestRef {
                number: pr.number,
                head_ref: pr.head.clone(),
                base_ref: pr.base.clone(),
                open: true,
            })
            .collect()
    }

    fn interpret(&mut self, effect: GitHubEffect) -> Result<GitHubResponse, GitHubApiError> {
        match effect {
            GitHubEffect::GetBranch { branch } => {
                let found = match self.branches.get(&branch) {
                    Some(sha) => BranchRef::present(branch, sha.clone()),
                    None => BranchRef::absent(branch),
                };
                Ok(GitHubResponse::Branch(found))
            }

            GitHubEffect::ListOpenPrs { base } => {
                Ok(GitHubResponse::PrList(self.pr_list(&base, None)))
            }

            GitHubEffect::ListOpenPrsForHead { head, base } => {
                Ok(GitHubResponse::PrList(self.pr_list(&base, Some(&head))))
            }

            GitHubEffect::GetContent { path, git_ref } => {
                let Some(tree) = self.tree_of(&git_ref) else {
                    return Ok(GitHubResponse::Content(ContentResult::NotFound));
                };
                let path = path.trim_matches('/').to_string();
                if let Some(content) = tree.get(&path) {
                    return Ok(GitHubResponse::Content(ContentResult::SingleFile(
                        RemotePatchEntry {
                            name: path.rsplit('/').next().unwrap_or(&path).to_string(),
                            path: path.clone(),
                            sha: blob_sha(content),
                            content: Some(content.clone()),
                        },
                    )));
                }
                let prefix = format!("{path}/");
                let children: Vec<RemotePatchEntry> = tree
                    .iter()
                    .filter_map(|(p, content)| {
                        let name = p.strip_prefix(&prefix)?;
                        (!name.contains('/')).then(|| RemotePatchEntry {
                            name: name.to_string(),
                            path: p.clone(),
                            sha: blob_sha(content),
                            content: None,
                        })
                    })
                    .collect();
                let is_dir = tree.keys().any(|p| p.starts_with(&prefix));
                Ok(GitHubResponse::Content(if is_dir {
                    ContentResult::DirectoryListing(children)
                } else {
                    ContentResult::NotFound
                }))
            }

            GitHubEffect::CreateBranch { branch, from_sha } => {
                if self.branches.contains_key(&branch) {
                    return Err(GitHubApiError::new(
                        GitHubErrorKind::DuplicateResource,
                        "Reference already exists",
                    ));
                }
                if !self.commits.contains_key(&from_sha) {
                    return Err(GitHubApiError::new(
                        GitHubErrorKind::Permanent,
                        "Object does not exist",
                    ));
                }
                self.branches.insert(branch, from_sha);
                Ok(GitHubResponse::BranchCreated)
            }

            GitHubEffect::DeleteBranch { branch } => {
                if self.branches.remove(&branch).is_none() {
                    return Err(not_found(format_args!("branch {branch}")));
                }
                for pr in self.prs.iter_mut().filter(|pr| pr.head == branch) {
                    pr.open = false;
                }
                Ok(GitHubResponse::BranchDeleted)
            }

            GitHubEffect::PutFile {
                branch,
                path,
                content,
                expected_sha,
                ..
            } => {
                let written = blob_sha(&content);
                self.update_tree(&branch, |tree| {
                    let current = tree.get(&path).map(|c| blob_sha(c));
                    if current != expected_sha {
                        return Err(conflict(format_args!("sha for {path}")));
                    }
                    tree.insert(path.clone(), content);
                    Ok(())
                })?;
                Ok(GitHubResponse::FileWritten { sha: written })
            }

            GitHubEffect::DeleteFile {
                branch, path, sha, ..
            } => {
                self.update_tree(&branch, |tree| {
                    let current = tree
                        .get(&path)
                        .map(|c| blob_sha(c))
                        .ok_or_else(|| not_found(&path))?;
                    if current != sha {
                        return Err(conflict(format_args!("sha for {path}")));
                    }
                    tree.remove(&path);
                    Ok(())
                })?;
                Ok(GitHubResponse::FileDeleted)
            }

            GitHubEffect::CreatePr { head, base, .. } => {
                if !self.branches.contains_key(&head) {
                    return Err(GitHubApiError::new(
                        GitHubErrorKind::Permanent,
                        format!("head branch {head} does not exist"),
                    ));
                }
                if !self.pr_list(&base, Some(&head)).is_empty() {
                    return Err(GitHubApiError::new(
                        GitHubErrorKind::DuplicateResource,
                        "A pull request already exists",
                    ));
                }
                let pr = self.open_pr(&head, &base);
                Ok(GitHubResponse::PrCreated { pr })
            }

            GitHubEffect::ClosePr { pr } => {
                let found = self
                    .prs
                    .iter_mut()
                    .find(|p| p.number == pr)
                    .ok_or_else(|| not_found(pr))?;
                found.open = false;
                Ok(GitHubResponse::PrClosed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deleting_a_branch_closes_its_prs() {
        let remote = FakeRemote::new("main")
            .with_branch("feature", "main")
            .with_pr("feature", "main");

        remote
            .interpret(GitHubEffect::DeleteBranch {
                branch: "feature".into(),
            })
            .await
            .unwrap();

        assert!(remote.open_prs().is_empty());
    }

    #[tokio::test]
    async fn writes_are_guarded_by_blob_sha() {
        let remote = FakeRemote::new("main").with_file("main", "patches/a+1.0.0.patch", "x");

        let err = remote
            .interpret(GitHubEffect::PutFile {
                branch: "main".into(),
                path: "patches/a+1.0.0.patch".into(),
                content: b"y".to_vec(),
                message: "m".into(),
                expected_sha: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind, GitHubErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn directory_listing_excludes_nested_files() {
        let remote = FakeRemote::new("main")
            .with_file("main", "patches/a+1.0.0.patch", "x")
            .with_file("main", "patches/sub/b+1.0.0.patch", "y");

        let response = remote
            .interpret(GitHubEffect::GetContent {
                path: "patches".into(),
                git_ref: "main".into(),
            })
            .await
            .unwrap();

        match response {
            GitHubResponse::Content(ContentResult::DirectoryListing(entries)) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].name, "a+1.0.0.patch");
            }
            other => panic!("expected a listing, got {other:?}"),
        }
    }
}
