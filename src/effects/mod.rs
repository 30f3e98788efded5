//! Effects-as-data for GitHub operations.
//!
//! This module defines effect types that describe remote operations without
//! executing them. This enables:
//! - A pure reconciliation engine that only sees plain probe results
//! - Testability via an in-memory interpreter
//! - Dry runs and logging of intended mutations

pub mod github;
pub mod interpreter;

pub use github::{GitHubEffect, GitHubResponse};
pub use interpreter::GitHubInterpreter;
