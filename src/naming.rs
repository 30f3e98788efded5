//! Branch names, bot-branch recognition and commit/PR titles.
//!
//! These strings are matched against branches and pull requests that already
//! exist in downstream repositories, so their formats are fixed:
//!
//! - self-managed branch: `updatepatchfilesbot-<identity>`
//! - dependency bot branch: `dependabot-npm_and_yarn-<package>-<version>`
//! - title: `chore(patch): <create|update> patch for package <display name>`

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::PackageIdentity;

/// Prefix of every branch this tool creates.
pub const SELF_BRANCH_PREFIX: &str = "updatepatchfilesbot-";

/// Prefix the dependency bot uses for npm/yarn update branches (with `-` as separator).
pub const BOT_BRANCH_PREFIX: &str = "dependabot-npm_and_yarn-";

/// Whether a commit or pull request introduces a patch or replaces one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The branch this tool owns for a package.
///
/// The escaped identity is embedded verbatim, so distinct identities always map
/// to distinct branches. The version is deliberately absent: one branch carries
/// a package's patch across version bumps.
pub fn self_branch(identity: &PackageIdentity) -> String {
    format!("{SELF_BRANCH_PREFIX}{}", identity.name)
}

/// The package segment the dependency bot puts in its branch names.
///
/// The bot drops the leading `@` of a scope and replaces `/` with the branch
/// separator, so `@types/node` appears as `types-node`.
pub fn bot_package_segment(identity: &PackageIdentity) -> String {
    identity
        .display_name()
        .replace(" => ", "-")
        .trim_start_matches('@')
        .replace('/', "-")
}

/// The bot's branch name for `identity` at `version` in the repository root.
pub fn bot_branch(identity: &PackageIdentity, version: &str) -> String {
    format!(
        "{BOT_BRANCH_PREFIX}{}-{version}",
        bot_package_segment(identity)
    )
}

/// Returns true if `head_ref` is the bot's branch for exactly this package and version.
///
/// Only the exact branch name matches. Names that merely end in
/// `-<package>-<version>` belong to other packages (`left-pad` vs `pad`).
pub fn is_bot_branch_for(head_ref: &str, identity: &PackageIdentity, version: &str) -> bool {
    head_ref == bot_branch(identity, version)
}

/// The predicate form of [`is_bot_branch_for`], for filtering pull requests.
pub fn bot_branch_match<'a>(
    identity: &'a PackageIdentity,
    version: &'a str,
) -> impl Fn(&str) -> bool + 'a {
    move |head_ref| is_bot_branch_for(head_ref, identity, version)
}

/// Commit message for writes and deletes of a package's patch.
pub fn commit_message(identity: &PackageIdentity, kind: ChangeKind) -> String {
    format!(
        "chore(patch): {kind} patch for package {}",
        identity.display_name()
    )
}

/// Pull request title; identical to the commit message so squash merges read well.
pub fn pr_title(identity: &PackageIdentity, kind: ChangeKind) -> String {
    commit_message(identity, kind)
}

/// Pull request body.
pub fn pr_body(identity: &PackageIdentity, canonical_path: &str) -> String {
    format!(
        "Syncs `{canonical_path}` with the canonical patch for `{}` version `{}`.\n\n\
         This pull request is maintained automatically; it is closed once the base \
         branch already carries the canonical patch.",
        identity.display_name(),
        identity.version
    )
}
