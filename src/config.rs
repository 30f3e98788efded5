//! Command-line and environment configuration.
//!
//! Every flag can also be set through an environment variable, so the tool
//! runs unchanged from a shell or from a CI job. [`Cli`] is the raw parsed
//! form; [`RunConfig`] is the validated value threaded through a run.

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use crate::catalog::PatchCatalog;
use crate::github::RetryPolicy;
use crate::types::{InvalidRepoId, PackageIdentity, RepoId};

/// Mirror canonical patch files into downstream repositories via pull requests.
#[derive(Parser, Debug)]
#[command(name = "patch-mirror")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// GitHub token used for every API call
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Local directory holding the canonical patch files
    #[arg(
        long,
        value_name = "DIR",
        env = "PATCH_MIRROR_CATALOG_DIR",
        default_value = "patches"
    )]
    pub catalog_dir: PathBuf,

    /// Patch directory inside each target repository
    #[arg(
        long,
        value_name = "PATH",
        env = "PATCH_MIRROR_REMOTE_DIR",
        default_value = "patches"
    )]
    pub remote_dir: String,

    /// Branch pull requests are opened against
    #[arg(
        long,
        value_name = "BRANCH",
        env = "PATCH_MIRROR_BASE_BRANCH",
        default_value = "main"
    )]
    pub base_branch: String,

    /// Packages allowed to get a brand-new patch where none exists yet
    #[arg(
        long,
        value_name = "PACKAGE",
        env = "PATCH_MIRROR_FORCE",
        value_delimiter = ','
    )]
    pub force: Vec<String>,

    /// Repositories to reconcile (owner/repo); defaults to every accessible repository
    #[arg(
        long = "repo",
        value_name = "OWNER/REPO",
        env = "PATCH_MIRROR_REPOS",
        value_delimiter = ','
    )]
    pub repos: Vec<String>,

    /// Repositories to leave alone
    #[arg(
        long = "exclude-repo",
        value_name = "OWNER/REPO",
        env = "PATCH_MIRROR_EXCLUDE_REPOS",
        value_delimiter = ','
    )]
    pub exclude_repos: Vec<String>,

    /// Plan and log actions without changing anything
    #[arg(long, env = "PATCH_MIRROR_DRY_RUN")]
    pub dry_run: bool,

    /// Fail on the first transient API error instead of backing off and retrying
    #[arg(long, env = "PATCH_MIRROR_NO_RETRY")]
    pub no_retry: bool,
}

/// Errors from validating the parsed command line.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GitHub token is empty")]
    EmptyToken,

    #[error("base branch is empty")]
    EmptyBaseBranch,

    #[error(transparent)]
    InvalidRepo(#[from] InvalidRepoId),
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub catalog_dir: PathBuf,
    pub remote_dir: String,
    pub base_branch: String,
    /// Package names (escaped or display form) that may be bootstrapped.
    pub force: BTreeSet<String>,
    /// Explicit targets; empty means "every accessible repository".
    pub repos: Vec<RepoId>,
    pub exclude_repos: HashSet<RepoId>,
    pub dry_run: bool,
    pub retry_policy: RetryPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            catalog_dir: PathBuf::from("patches"),
            remote_dir: "patches".to_string(),
            base_branch: "main".to_string(),
            force: BTreeSet::new(),
            repos: Vec::new(),
            exclude_repos: HashSet::new(),
            dry_run: false,
            retry_policy: RetryPolicy::RetryTransient,
        }
    }
}

impl RunConfig {
    /// Returns true if `identity` may get a new patch where the remote has none.
    pub fn is_forced(&self, identity: &PackageIdentity) -> bool {
        self.force.iter().any(|name| identity.is_named(name))
    }

    pub fn is_excluded(&self, repo: &RepoId) -> bool {
        self.exclude_repos.contains(repo)
    }

    /// Forced package names with no patch in `catalog`.
    pub fn unmatched_force<'a>(
        &'a self,
        catalog: &'a PatchCatalog,
    ) -> impl Iterator<Item = &'a str> {
        self.force
            .iter()
            .filter(|name| catalog.find(name).is_none())
            .map(String::as_str)
    }
}

fn parse_repos<'a>(
    values: impl IntoIterator<Item = &'a String>,
) -> Result<Vec<RepoId>, InvalidRepoId> {
    values
        .into_iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.parse())
        .collect()
}

impl Cli {
    /// Validates the command line, returning the token separately so it never
    /// ends up in a `Debug` print of the configuration.
    pub fn into_config(self) -> Result<(String, RunConfig), ConfigError> {
        let token = self.token.trim().to_string();
        if token.is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        let base_branch = self.base_branch.trim().to_string();
        if base_branch.is_empty() {
            return Err(ConfigError::EmptyBaseBranch);
        }

        let config = RunConfig {
            catalog_dir: self.catalog_dir,
            remote_dir: self.remote_dir.trim_matches('/').to_string(),
            base_branch,
            force: self
                .force
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
            repos: parse_repos(&self.repos)?,
            exclude_repos: parse_repos(&self.exclude_repos)?.into_iter().collect(),
            dry_run: self.dry_run,
            retry_policy: if self.no_retry {
                RetryPolicy::NoRetry
            } else {
                RetryPolicy::RetryTransient
            },
        };
        Ok((token, config))
    }
}
