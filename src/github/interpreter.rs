//! GitHub effect interpreter using octocrab.
//!
//! This module implements the `GitHubInterpreter` trait, executing effects
//! against the real GitHub API.
//!
//! Key implementation details:
//! - The contents endpoint answers with a file object or a directory array;
//!   both shapes are resolved here into `ContentResult`
//! - Files over the contents API inline limit are read through the blob API
//! - Missing branches and paths are answers, not errors
//! - Retry logic with exponential backoff for transient errors

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::effects::{GitHubEffect, GitHubInterpreter, GitHubResponse};
use crate::types::{BranchRef, ContentResult, PrNumber, PullRequestRef, RemotePatchEntry, Sha};

use super::client::OctocrabClient;
use super::error::GitHubApiError;
use super::retry::{RetryConfig, RetryPolicy, retry_with_backoff};

const PAGE_SIZE: u8 = 100;

// ─── Interpreter Implementation ───────────────────────────────────────────────

impl GitHubInterpreter for OctocrabClient {
    async fn interpret(&self, effect: GitHubEffect) -> Result<GitHubResponse, GitHubApiError> {
        interpret_github_effect(self, effect, self.retry_config(), self.retry_policy()).await
    }
}

/// Interprets a GitHub effect, executing it against the GitHub API.
///
/// This is the main entry point for effect interpretation. It handles retry
/// logic and error categorization.
pub async fn interpret_github_effect(
    client: &OctocrabClient,
    effect: GitHubEffect,
    retry_config: RetryConfig,
    retry_policy: RetryPolicy,
) -> Result<GitHubResponse, GitHubApiError> {
    let result = retry_with_backoff(retry_config, retry_policy, || {
        execute_effect(client, effect.clone())
    })
    .await;

    result.into_result()
}

/// Executes a single effect without retry logic.
async fn execute_effect(
    client: &OctocrabClient,
    effect: GitHubEffect,
) -> Result<GitHubResponse, GitHubApiError> {
    match effect {
        GitHubEffect::GetBranch { branch } => get_branch(client, branch).await,
        GitHubEffect::ListOpenPrs { base } => list_open_prs(client, base, None).await,
        GitHubEffect::ListOpenPrsForHead { head, base } => {
            list_open_prs(client, base, Some(head)).await
        }
        GitHubEffect::GetContent { path, git_ref } => get_content(client, path, git_ref).await,
        GitHubEffect::CreateBranch { branch, from_sha } => {
            create_branch(client, branch, from_sha).await
        }
        GitHubEffect::DeleteBranch { branch } => delete_branch(client, branch).await,
        GitHubEffect::PutFile {
            branch,
            path,
            content,
            message,
            expected_sha,
        } => put_file(client, branch, path, content, message, expected_sha).await,
        GitHubEffect::DeleteFile {
            branch,
            path,
            sha,
            message,
        } => delete_file(client, branch, path, sha, message).await,
        GitHubEffect::CreatePr {
            head,
            base,
            title,
            body,
        } => create_pr(client, head, base, title, body).await,
        GitHubEffect::ClosePr { pr } => close_pr(client, pr).await,
    }
}

/// Percent-encodes each segment of a repository path or branch name.
///
/// Patch file names contain `+` and `@`, and branch names may contain `/`.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

// ─── Branches ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

async fn get_branch(
    client: &OctocrabClient,
    branch: String,
) -> Result<GitHubResponse, GitHubApiError> {
    let url = format!(
        "/repos/{}/{}/git/ref/heads/{}",
        client.owner(),
        client.repo_name(),
        encode_path(&branch)
    );

    let result: Result<RefResponse, _> = client.inner().get(&url, None::<&()>).await;

    match result {
        Ok(reference) => Ok(GitHubResponse::Branch(BranchRef::present(
            branch,
            Sha::new(reference.object.sha),
        ))),
        Err(e) => {
            let err = GitHubApiError::from_octocrab(e);
            if err.is_not_found() {
                Ok(GitHubResponse::Branch(BranchRef::absent(branch)))
            } else {
                Err(err)
            }
        }
    }
}

async fn create_branch(
    client: &OctocrabClient,
    branch: String,
    from_sha: Sha,
) -> Result<GitHubResponse, GitHubApiError> {
    let url = format!("/repos/{}/{}/git/refs", client.owner(), client.repo_name());

    #[derive(Serialize)]
    struct CreateRefRequest<'a> {
        #[serde(rename = "ref")]
        git_ref: String,
        sha: &'a str,
    }

    let request = CreateRefRequest {
        git_ref: format!("refs/heads/{branch}"),
        sha: from_sha.as_str(),
    };

    let result: Result<serde_json::Value, _> = client.inner().post(&url, Some(&request)).await;

    match result {
        Ok(_) => Ok(GitHubResponse::BranchCreated),
        Err(e) => Err(GitHubApiError::from_octocrab(e)),
    }
}

async fn delete_branch(
    client: &OctocrabClient,
    branch: String,
) -> Result<GitHubResponse, GitHubApiError> {
    let result = client
        .inner()
        .repos(client.owner(), client.repo_name())
        .delete_ref(&octocrab::params::repos::Reference::Branch(branch))
        .await;

    match result {
        Ok(()) => Ok(GitHubResponse::BranchDeleted),
        Err(e) => Err(GitHubApiError::from_octocrab(e)),
    }
}

// ─── Contents ─────────────────────────────────────────────────────────────────

/// The contents endpoint returns an array for directories and an object for files.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContents {
    Directory(Vec<RawEntry>),
    File(RawEntry),
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    path: String,
    sha: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

impl RawEntry {
    fn into_entry(self, content: Option<Vec<u8>>) -> RemotePatchEntry {
        RemotePatchEntry {
            name: self.name,
            path: self.path,
            sha: Sha::new(self.sha),
            content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
    encoding: String,
}

/// Decodes the base64 payload GitHub returns, which is wrapped at 60 columns.
pub fn decode_base64_content(encoded: &str) -> Result<Vec<u8>, GitHubApiError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).map_err(|e| {
        GitHubApiError::permanent_without_source(format!("Invalid base64 file content: {e}"))
    })
}

async fn get_content(
    client: &OctocrabClient,
    path: String,
    git_ref: String,
) -> Result<GitHubResponse, GitHubApiError> {
    let url = format!(
        "/repos/{}/{}/contents/{}",
        client.owner(),
        client.repo_name(),
        encode_path(path.trim_matches('/'))
    );

    let result: Result<RawContents, _> = client
        .inner()
        .get(&url, Some(&[("ref", git_ref.as_str())]))
        .await;

    let raw = match result {
        Ok(raw) => raw,
        Err(e) => {
            let err = GitHubApiError::from_octocrab(e);
            if err.is_not_found() {
                return Ok(GitHubResponse::Content(ContentResult::NotFound));
            }
            return Err(err);
        }
    };

    match raw {
        RawContents::Directory(entries) => {
            let files = entries
                .into_iter()
                .filter(|entry| entry.kind == "file")
                .map(|entry| entry.into_entry(None))
                .collect();
            Ok(GitHubResponse::Content(ContentResult::DirectoryListing(
                files,
            )))
        }
        RawContents::File(entry) if entry.kind == "file" => {
            let content = file_bytes(client, &entry).await?;
            Ok(GitHubResponse::Content(ContentResult::SingleFile(
                entry.into_entry(Some(content)),
            )))
        }
        RawContents::File(entry) => {
            tracing::warn!(path = %entry.path, kind = %entry.kind, "Path is not a regular file");
            Ok(GitHubResponse::Content(ContentResult::NotFound))
        }
    }
}

/// Returns a file's bytes, falling back to the blob API when the contents
/// API omitted them (files over 1 MB come back with encoding `none`).
async fn file_bytes(client: &OctocrabClient, entry: &RawEntry) -> Result<Vec<u8>, GitHubApiError> {
    let inline = entry
        .content
        .as_deref()
        .filter(|c| !c.is_empty() && entry.encoding.as_deref() == Some("base64"));
    if let Some(encoded) = inline {
        return decode_base64_content(encoded);
    }
    if entry.size == 0 {
        return Ok(Vec::new());
    }

    let url = format!(
        "/repos/{}/{}/git/blobs/{}",
        client.owner(),
        client.repo_name(),
        entry.sha
    );
    let blob: BlobResponse = client
        .inner()
        .get(&url, None::<&()>)
        .await
        .map_err(GitHubApiError::from_octocrab)?;

    match blob.encoding.as_str() {
        "base64" => decode_base64_content(&blob.content),
        "utf-8" => Ok(blob.content.into_bytes()),
        other => Err(GitHubApiError::permanent_without_source(format!(
            "Unsupported blob encoding '{other}' for {}",
            entry.path
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct PutFileResponse {
    content: Option<PutFileContent>,
}

#[derive(Debug, Deserialize)]
struct PutFileContent {
    sha: String,
}

async fn put_file(
    client: &OctocrabClient,
    branch: String,
    path: String,
    content: Vec<u8>,
    message: String,
    expected_sha: Option<Sha>,
) -> Result<GitHubResponse, GitHubApiError> {
    let url = format!(
        "/repos/{}/{}/contents/{}",
        client.owner(),
        client.repo_name(),
        encode_path(&path)
    );

    #[derive(Serialize)]
    struct PutFileRequest<'a> {
        message: &'a str,
        content: String,
        branch: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha: Option<&'a str>,
    }

    let request = PutFileRequest {
        message: &message,
        content: STANDARD.encode(&content),
        branch: &branch,
        sha: expected_sha.as_ref().map(Sha::as_str),
    };

    let result: Result<PutFileResponse, _> = client.inner().put(&url, Some(&request)).await;

    match result {
        Ok(response) => {
            let sha = response.content.map(|c| c.sha).ok_or_else(|| {
                GitHubApiError::permanent_without_source(format!(
                    "Write to {path} returned no content sha"
                ))
            })?;
            Ok(GitHubResponse::FileWritten { sha: Sha::new(sha) })
        }
        Err(e) => Err(GitHubApiError::from_octocrab(e)),
    }
}

async fn delete_file(
    client: &OctocrabClient,
    branch: String,
    path: String,
    sha: Sha,
    message: String,
) -> Result<GitHubResponse, GitHubApiError> {
    let url = format!(
        "/repos/{}/{}/contents/{}",
        client.owner(),
        client.repo_name(),
        encode_path(&path)
    );

    #[derive(Serialize)]
    struct DeleteFileRequest<'a> {
        message: &'a str,
        sha: &'a str,
        branch: &'a str,
    }

    let request = DeleteFileRequest {
        message: &message,
        sha: sha.as_str(),
        branch: &branch,
    };

    let result: Result<serde_json::Value, _> = client.inner().delete(&url, Some(&request)).await;

    match result {
        Ok(_) => Ok(GitHubResponse::FileDeleted),
        Err(e) => Err(GitHubApiError::from_octocrab(e)),
    }
}

// ─── Pull Requests ────────────────────────────────────────────────────────────

async fn list_open_prs(
    client: &OctocrabClient,
    base: String,
    head: Option<String>,
) -> Result<GitHubResponse, GitHubApiError> {
    let mut page = 1u32;
    let mut all_prs = Vec::new();

    loop {
        let pulls = client.inner().pulls(client.owner(), client.repo_name());
        let mut request = pulls
            .list()
            .state(octocrab::params::State::Open)
            .base(base.clone())
            .per_page(PAGE_SIZE)
            .page(page);
        if let Some(head) = &head {
            // The head filter requires `owner:branch`.
            request = request.head(format!("{}:{}", client.owner(), head));
        }

        match request.send().await {
            Ok(page_result) => {
                let items = page_result.items;
                let is_last_page = items.len() < usize::from(PAGE_SIZE);

                all_prs.extend(items.into_iter().map(|pull| PullRequestRef {
                    number: PrNumber(pull.number),
                    head_ref: pull.head.ref_field,
                    base_ref: pull.base.ref_field,
                    open: true,
                }));

                if is_last_page {
                    break;
                }
                page += 1;
            }
            Err(e) => return Err(GitHubApiError::from_octocrab(e)),
        }
    }

    Ok(GitHubResponse::PrList(all_prs))
}

async fn create_pr(
    client: &OctocrabClient,
    head: String,
    base: String,
    title: String,
    body: String,
) -> Result<GitHubResponse, GitHubApiError> {
    let result = client
        .inner()
        .pulls(client.owner(), client.repo_name())
        .create(title, head, base)
        .body(body)
        .send()
        .await;

    match result {
        Ok(pull) => Ok(GitHubResponse::PrCreated {
            pr: PrNumber(pull.number),
        }),
        Err(e) => Err(GitHubApiError::from_octocrab(e)),
    }
}

async fn close_pr(client: &OctocrabClient, pr: PrNumber) -> Result<GitHubResponse, GitHubApiError> {
    let result = client
        .inner()
        .pulls(client.owner(), client.repo_name())
        .update(pr.0)
        .state(octocrab::params::pulls::State::Closed)
        .send()
        .await;

    match result {
        Ok(_) => Ok(GitHubResponse::PrClosed),
        Err(e) => Err(GitHubApiError::from_octocrab(e)),
    }
}
