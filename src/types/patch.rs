//! Patch files, package identities and the remote entities they are compared against.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::ids::{PrNumber, Sha};

/// Separator between the package identity and the version in a patch file name.
const VERSION_SEPARATOR: char = '+';

/// The package a patch applies to, recovered from the patch file name.
///
/// File names have the form `<identity>+<version>.<ext>`. The identity may itself
/// contain `+` (patch-package escapes `/` in scoped names as `+` and joins nested
/// dependencies with `++`), so the version is always split off at the *last* `+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageIdentity {
    /// Escaped package identity, e.g. `@types+node`.
    pub name: String,
    /// Version the patch targets, e.g. `18.11.9`.
    pub version: String,
}

/// Error returned when a patch file name does not encode a package identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("patch file name '{0}' has no '+' separating package and version")]
    MissingVersionSeparator(String),

    #[error("patch file name '{0}' has an empty package name")]
    EmptyName(String),

    #[error("patch file name '{0}' has no file extension")]
    MissingExtension(String),

    #[error("patch file name '{0}' has an empty version")]
    EmptyVersion(String),
}

impl PackageIdentity {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        PackageIdentity {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Parses `<identity>+<version>.<ext>`.
    pub fn parse_file_name(file_name: &str) -> Result<Self, IdentityError> {
        let (name, rest) = file_name
            .rsplit_once(VERSION_SEPARATOR)
            .ok_or_else(|| IdentityError::MissingVersionSeparator(file_name.to_string()))?;
        if name.is_empty() {
            return Err(IdentityError::EmptyName(file_name.to_string()));
        }
        let (version, _extension) = rest
            .rsplit_once('.')
            .ok_or_else(|| IdentityError::MissingExtension(file_name.to_string()))?;
        if version.is_empty() {
            return Err(IdentityError::EmptyVersion(file_name.to_string()));
        }
        Ok(PackageIdentity::new(name, version))
    }

    /// The npm package name as a human would write it.
    ///
    /// `@types+node` becomes `@types/node`; a nested dependency `parent++child`
    /// becomes `parent => child`.
    pub fn display_name(&self) -> String {
        self.name
            .split("++")
            .map(|segment| segment.replace(VERSION_SEPARATOR, "/"))
            .collect::<Vec<_>>()
            .join(" => ")
    }

    /// Returns true if `candidate` names this package, in escaped or display form.
    pub fn is_named(&self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        candidate == self.name || candidate == self.display_name()
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.display_name(), self.version)
    }
}

/// An authoritative patch from the local catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchFile {
    pub identity: PackageIdentity,
    /// Bare file name, e.g. `left-pad+1.2.0.patch`.
    pub file_name: String,
    /// Path of this patch inside a target repository, e.g. `patches/left-pad+1.2.0.patch`.
    pub canonical_path: String,
    pub content: Vec<u8>,
}

/// A file observed in a repository's patch directory at some ref.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemotePatchEntry {
    pub name: String,
    pub path: String,
    /// Blob hash, used as the precondition for updates and deletes.
    pub sha: Sha,
    /// Raw bytes, present only when the entry was fetched individually.
    pub content: Option<Vec<u8>>,
}

impl RemotePatchEntry {
    /// The package this entry patches, if its name parses as a patch file name.
    pub fn identity(&self) -> Option<PackageIdentity> {
        PackageIdentity::parse_file_name(&self.name).ok()
    }

    /// Returns true if this entry patches the same package as `identity`, at any version.
    pub fn belongs_to(&self, identity: &PackageIdentity) -> bool {
        self.identity().is_some_and(|id| id.name == identity.name)
    }
}

/// A branch as observed on the remote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchRef {
    pub name: String,
    pub exists: bool,
    pub head_sha: Option<Sha>,
}

impl BranchRef {
    pub fn present(name: impl Into<String>, head_sha: Sha) -> Self {
        BranchRef {
            name: name.into(),
            exists: true,
            head_sha: Some(head_sha),
        }
    }

    pub fn absent(name: impl Into<String>) -> Self {
        BranchRef {
            name: name.into(),
            exists: false,
            head_sha: None,
        }
    }
}

/// A pull request as observed on the remote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: PrNumber,
    pub head_ref: String,
    pub base_ref: String,
    pub open: bool,
}

/// The contents endpoint answers with either a file or a directory listing;
/// this resolves that shape once, at the probe boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ContentResult {
    /// The path is a file; its content is populated.
    SingleFile(RemotePatchEntry),
    /// The path is a directory; entries carry no content.
    DirectoryListing(Vec<RemotePatchEntry>),
    /// Nothing exists at the path for the requested ref.
    NotFound,
}
