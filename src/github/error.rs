//! GitHub API error types.
//!
//! Every remote failure is classified exactly once, here, into a
//! [`GitHubErrorKind`]. Callers branch on the kind:
//!
//! - **NotFound** / **Forbidden** are benign: "nothing to do here".
//! - **DuplicateResource** means a concurrent run (or the dependency bot)
//!   already did what we were about to do.
//! - **PreconditionFailed** means a file changed under us; the package's plan
//!   is abandoned rather than retried blindly.
//! - **Transient** errors are retriable with backoff.
//! - **Unauthorized** is fatal for the whole run.

use std::fmt;
use thiserror::Error;

/// The kind of GitHub API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHubErrorKind {
    /// The repository, branch, ref or path does not exist (HTTP 404, or 422
    /// "Reference does not exist" from the refs API).
    NotFound,

    /// The token cannot access the resource (HTTP 403 other than rate limits).
    Forbidden,

    /// A content-hash precondition did not hold (HTTP 409 from the contents
    /// API, or 422 complaining about the `sha` parameter).
    ///
    /// Someone else changed the file between our read and our write. The
    /// caller must re-probe; retrying the same request would fail again.
    PreconditionFailed,

    /// The branch or pull request already exists (HTTP 422 "already exists").
    DuplicateResource,

    /// Transient error - safe to retry with backoff.
    ///
    /// Examples:
    /// - HTTP 5xx (server errors)
    /// - HTTP 429 (rate limited)
    /// - HTTP 403 with rate limit message
    /// - Network timeouts
    Transient,

    /// Any other failure; requires human attention.
    Permanent,

    /// The credential was rejected (HTTP 401). Nothing else can succeed.
    Unauthorized,
}

impl GitHubErrorKind {
    /// Returns true if this error is retriable.
    pub fn is_retriable(&self) -> bool {
        matches!(self, GitHubErrorKind::Transient)
    }

    /// Returns true if the run cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GitHubErrorKind::Unauthorized)
    }

    /// Classifies an HTTP status and GitHub error message.
    ///
    /// This is a pure function extracted for testability.
    pub fn classify(status_code: Option<u16>, message: &str) -> Self {
        let message_lower = message.to_lowercase();
        match status_code {
            Some(401) => GitHubErrorKind::Unauthorized,
            Some(403) if is_rate_limit_error(&message_lower) => GitHubErrorKind::Transient,
            Some(403) => GitHubErrorKind::Forbidden,
            Some(404) => GitHubErrorKind::NotFound,
            Some(409) => GitHubErrorKind::PreconditionFailed,
            Some(422) => classify_unprocessable(&message_lower),
            Some(429) => GitHubErrorKind::Transient,
            Some(code) if (500..600).contains(&code) => GitHubErrorKind::Transient,
            Some(_) => GitHubErrorKind::Permanent,
            None if is_network_error(&message_lower) => GitHubErrorKind::Transient,
            None => GitHubErrorKind::Permanent,
        }
    }
}

impl fmt::Display for GitHubErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GitHubErrorKind::NotFound => "not found",
            GitHubErrorKind::Forbidden => "forbidden",
            GitHubErrorKind::PreconditionFailed => "precondition failed",
            GitHubErrorKind::DuplicateResource => "already exists",
            GitHubErrorKind::Transient => "transient",
            GitHubErrorKind::Permanent => "permanent",
            GitHubErrorKind::Unauthorized => "unauthorized",
        };
        f.write_str(s)
    }
}

/// A GitHub API error with its classification.
#[derive(Debug, Error)]
pub struct GitHubApiError {
    /// The kind of error.
    pub kind: GitHubErrorKind,

    /// The HTTP status code, if available.
    pub status_code: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,

    /// The underlying octocrab error, if available.
    #[source]
    pub source: Option<octocrab::Error>,
}

impl fmt::Display for GitHubApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "GitHub API error (HTTP {}): {}", code, self.message),
            None => write!(f, "GitHub API error: {}", self.message),
        }
    }
}

impl GitHubApiError {
    /// Creates an error of the given kind without an octocrab source.
    pub fn new(kind: GitHubErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a permanent error without an octocrab source.
    pub fn permanent_without_source(message: impl Into<String>) -> Self {
        Self::new(GitHubErrorKind::Permanent, message)
    }

    /// Creates a transient error without an octocrab source.
    pub fn transient_without_source(message: impl Into<String>) -> Self {
        Self::new(GitHubErrorKind::Transient, message)
    }

    /// Returns true for a missing resource.
    pub fn is_not_found(&self) -> bool {
        self.kind == GitHubErrorKind::NotFound
    }

    /// Returns true if the resource we tried to create already exists.
    pub fn is_duplicate(&self) -> bool {
        self.kind == GitHubErrorKind::DuplicateResource
    }

    /// Categorizes an octocrab error.
    ///
    /// API errors carry their HTTP status; transport errors are categorized
    /// from their message.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let (status_code, message) = match &err {
            octocrab::Error::GitHub { source, .. } => {
                let mut message = source.message.clone();
                if let Some(details) = &source.errors {
                    for detail in details {
                        if let Some(text) = detail.get("message").and_then(|m| m.as_str()) {
                            message.push_str(": ");
                            message.push_str(text);
                        }
                    }
                }
                (Some(source.status_code.as_u16()), message)
            }
            other => {
                let message = other.to_string();
                (extract_status_code(&message), message)
            }
        };

        Self {
            kind: GitHubErrorKind::classify(status_code, &message),
            status_code,
            message,
            source: Some(err),
        }
    }
}

/// Classifies an HTTP 422 by message.
///
/// GitHub uses 422 for "Reference already exists", "A pull request already
/// exists for ...", "Reference does not exist", and for a missing or wrong
/// `sha` on the contents API.
fn classify_unprocessable(message_lower: &str) -> GitHubErrorKind {
    if message_lower.contains("already exists") {
        GitHubErrorKind::DuplicateResource
    } else if message_lower.contains("does not exist") {
        GitHubErrorKind::NotFound
    } else if message_lower.contains("sha") {
        GitHubErrorKind::PreconditionFailed
    } else {
        GitHubErrorKind::Permanent
    }
}

/// Extracts an HTTP status code from a transport-level error message.
///
/// Only used for octocrab errors that are not `Error::GitHub`, which carry no
/// structured status.
fn extract_status_code(err_str: &str) -> Option<u16> {
    let idx = err_str.find("status: ")?;
    let rest = err_str.get(idx + 8..)?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Checks if an error message indicates a rate limit.
fn is_rate_limit_error(message_lower: &str) -> bool {
    message_lower.contains("rate limit")
        || message_lower.contains("api rate")
        || message_lower.contains("secondary rate")
        || message_lower.contains("abuse detection")
}

/// Checks if an error message indicates a network-level error.
fn is_network_error(message_lower: &str) -> bool {
    message_lower.contains("timeout")
        || message_lower.contains("connection")
        || message_lower.contains("network")
        || message_lower.contains("dns")
        || message_lower.contains("timed out")
}
