//! GitHub API client and effect interpreter.
//!
//! This module provides the implementation for executing GitHub effects via the
//! octocrab library. It implements the `GitHubInterpreter` trait defined in the
//! effects module.
//!
//! Key features:
//! - One-time classification of every failure into the error taxonomy the
//!   reconciler branches on
//! - Exponential backoff retry for transient failures
//! - Content-hash guarded file writes and deletes

mod client;
mod error;
mod interpreter;
mod repos;
mod retry;

pub use client::OctocrabClient;
pub use error::{GitHubApiError, GitHubErrorKind};
pub use interpreter::{decode_base64_content, encode_path, interpret_github_effect};
pub use repos::list_accessible_repos;
pub use retry::{RetryConfig, RetryPolicy, RetryResult, retry_with_backoff};
