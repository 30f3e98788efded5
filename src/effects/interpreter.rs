//! Effect interpreter trait.
//!
//! The trait-based design enables:
//! - The octocrab-backed interpreter in `crate::github`
//! - An in-memory remote for tests
//! - Scripted interpreters for unit tests of the executor

use std::future::Future;

use super::github::{GitHubEffect, GitHubResponse};
use crate::github::GitHubApiError;

/// Interprets GitHub effects against one repository.
///
/// Implementations are constructed with a `RepoId`, so all effects executed
/// through a single interpreter instance are scoped to that repository.
///
/// Errors are always [`GitHubApiError`]: the reconciler branches on its
/// [`kind`](GitHubApiError::kind) (not found, duplicate, precondition failed)
/// rather than on message text.
///
/// # Example (mock for testing)
///
/// ```ignore
/// struct ScriptedInterpreter {
///     responses: HashMap<GitHubEffect, GitHubResponse>,
/// }
///
/// impl GitHubInterpreter for ScriptedInterpreter {
///     async fn interpret(&self, effect: GitHubEffect) -> Result<GitHubResponse, GitHubApiError> {
///         self.responses.get(&effect).cloned().ok_or_else(|| {
///             GitHubApiError::permanent_without_source(format!("unexpected effect: {effect:?}"))
///         })
///     }
/// }
/// ```
pub trait GitHubInterpreter {
    /// Execute a GitHub effect and return its response.
    fn interpret(
        &self,
        effect: GitHubEffect,
    ) -> impl Future<Output = Result<GitHubResponse, GitHubApiError>> + Send;
}

impl<T: GitHubInterpreter + Sync> GitHubInterpreter for &T {
    fn interpret(
        &self,
        effect: GitHubEffect,
    ) -> impl Future<Output = Result<GitHubResponse, GitHubApiError>> + Send {
        (**self).interpret(effect)
    }
}
